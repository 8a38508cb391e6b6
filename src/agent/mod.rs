//! Reply generation against the conversation history
//!
//! Turns a finalized caller utterance into reply text. The generator loads
//! prior turns from the conversation store, calls the LLM with the agent's
//! system prompt, and persists both sides of the exchange on success.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::db::{AgentDirectory, ConversationStore, ConversationTurn, TurnRole};
use crate::{Error, Result};

/// Agent configuration resolved once per caller connection
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub welcome_text: String,
    pub system_prompt: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "Alex".to_string(),
            welcome_text: "Hi, you've reached Alex. How can I help you today?".to_string(),
            system_prompt: "You are Alex, a friendly and efficient phone assistant. \
                Your replies are spoken aloud, so keep them short, natural, and free of \
                formatting symbols or lists. Ask a follow-up question when you need more \
                information, and never invent details the caller has not confirmed."
                .to_string(),
        }
    }
}

/// Generates reply text for a finalized utterance
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply for the session's latest utterance
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if no agent profile is registered for the
    /// session, or `Upstream` on provider failure.
    async fn generate(&self, session_id: &str, utterance: &str) -> Result<String>;
}

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini-backed reply generator
pub struct GeminiResponder {
    client: reqwest::Client,
    config: LlmConfig,
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn AgentDirectory>,
}

impl GeminiResponder {
    /// Create a new Gemini responder
    #[must_use]
    pub fn new(
        config: LlmConfig,
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            store,
            directory,
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        utterance: &str,
    ) -> Result<String> {
        let mut contents: Vec<Content> = history.iter().map(Content::from_turn).collect();
        contents.push(Content::user(utterance));

        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = format!("{GENERATE_URL}/{}:generateContent", self.config.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Gemini API error {status}: {body}")));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("failed to parse Gemini response: {e}")))?;

        result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Upstream("Gemini returned no candidates".to_string()))
    }
}

#[async_trait]
impl ResponseGenerator for GeminiResponder {
    async fn generate(&self, session_id: &str, utterance: &str) -> Result<String> {
        let agent_id = self.store.agent_id(session_id)?.ok_or_else(|| {
            Error::ConfigMissing(format!("no agent registered for session {session_id}"))
        })?;
        let profile = self.directory.agent_profile(&agent_id)?;
        let history = self.store.turns(session_id)?;

        tracing::debug!(
            session_id = %session_id,
            history_turns = history.len(),
            "generating reply"
        );

        let reply = self
            .complete(&profile.system_prompt, &history, utterance)
            .await?;

        // The reply is already on its way to the caller; a persistence
        // failure should not turn a good answer into an apology
        for (role, text) in [(TurnRole::Caller, utterance), (TurnRole::Assistant, reply.as_str())] {
            if let Err(e) = self.store.append_turn(session_id, role, text) {
                tracing::warn!(session_id = %session_id, error = %e, "failed to persist turn");
            }
        }

        tracing::info!(session_id = %session_id, chars = reply.len(), "reply generated");
        Ok(reply)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    fn from_turn(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::Caller => "user",
            TurnRole::Assistant => "model",
        };
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_wire_field_names() {
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "Be brief".to_string(),
                }],
            },
            contents: vec![Content::user("hello")],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: 2048,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"systemInstruction\""));
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"maxOutputTokens\":2048"));
        assert!(json.contains("\"topP\":1.0") || json.contains("\"topP\":1"));
    }

    #[test]
    fn history_roles_map_to_wire_roles() {
        let caller = Content::from_turn(&ConversationTurn {
            role: TurnRole::Caller,
            text: "hi".to_string(),
        });
        let assistant = Content::from_turn(&ConversationTurn {
            role: TurnRole::Assistant,
            text: "hello".to_string(),
        });

        assert_eq!(caller.role, "user");
        assert_eq!(assistant.role, "model");
    }

    #[test]
    fn response_parses_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "We have a room available."}], "role": "model"}}
            ]
        }"#;

        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap();
        assert_eq!(text, "We have a room available.");
    }

    #[test]
    fn empty_response_parses_to_no_candidates() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.candidates.is_empty());
    }
}
