//! Conversation history and agent profile repository

use chrono::Utc;
use uuid::Uuid;

use super::DbPool;
use crate::agent::AgentProfile;
use crate::{Error, Result};

/// A single turn in a conversation
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    Caller,
    Assistant,
}

impl TurnRole {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Assistant => "assistant",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "caller" => Some(Self::Caller),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Persisted conversation history, keyed by session id
pub trait ConversationStore: Send + Sync {
    /// Record the start of a conversation between an agent and a caller session
    fn create_conversation(&self, agent_id: &str, session_id: &str) -> Result<()>;

    /// Append one turn to the session's conversation
    fn append_turn(&self, session_id: &str, role: TurnRole, text: &str) -> Result<()>;

    /// All turns of the session's conversation, oldest first
    fn turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>>;

    /// The agent a session is talking to, if a conversation was recorded
    fn agent_id(&self, session_id: &str) -> Result<Option<String>>;
}

/// Agent configuration lookup
pub trait AgentDirectory: Send + Sync {
    /// Resolve the profile for an agent id
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if no profile is registered for the id
    fn agent_profile(&self, agent_id: &str) -> Result<AgentProfile>;
}

/// Conversation repository over SQLite
#[derive(Clone)]
pub struct ConversationRepo {
    pool: DbPool,
}

impl ConversationRepo {
    /// Create a new conversation repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register or replace an agent profile
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert_agent(&self, agent_id: &str, profile: &AgentProfile) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO agents (id, name, welcome_text, system_prompt)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 welcome_text = excluded.welcome_text,
                 system_prompt = excluded.system_prompt",
            rusqlite::params![
                agent_id,
                profile.name,
                profile.welcome_text,
                profile.system_prompt
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    fn conversation_id(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = conn
            .query_row(
                "SELECT id FROM conversations WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .ok();

        Ok(id)
    }
}

impl ConversationStore for ConversationRepo {
    fn create_conversation(&self, agent_id: &str, session_id: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (id, agent_id, session_id, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, agent_id, session_id, now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    fn append_turn(&self, session_id: &str, role: TurnRole, text: &str) -> Result<()> {
        let conversation_id = self.conversation_id(session_id)?.ok_or_else(|| {
            Error::Database(format!("no conversation for session {session_id}"))
        })?;

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO turns (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, conversation_id, role.as_str(), text, now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    fn turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let Some(conversation_id) = self.conversation_id(session_id)? else {
            return Ok(Vec::new());
        };

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT role, content FROM turns
                 WHERE conversation_id = ?1
                 ORDER BY created_at, rowid",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let turns = stmt
            .query_map([&conversation_id], |row| {
                let role: String = row.get(0)?;
                Ok(ConversationTurn {
                    role: TurnRole::from_str(&role).unwrap_or(TurnRole::Caller),
                    text: row.get(1)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(turns)
    }

    fn agent_id(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let agent_id = conn
            .query_row(
                "SELECT agent_id FROM conversations WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .ok();

        Ok(agent_id)
    }
}

impl AgentDirectory for ConversationRepo {
    fn agent_profile(&self, agent_id: &str) -> Result<AgentProfile> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let profile = conn
            .query_row(
                "SELECT name, welcome_text, system_prompt FROM agents WHERE id = ?1",
                [agent_id],
                |row| {
                    Ok(AgentProfile {
                        name: row.get(0)?,
                        welcome_text: row.get(1)?,
                        system_prompt: row.get(2)?,
                    })
                },
            )
            .ok();

        // Unregistered agents fall back to the built-in profile so a bare
        // deployment still answers calls
        Ok(profile.unwrap_or_else(|| {
            tracing::debug!(agent_id = %agent_id, "agent not registered, using default profile");
            AgentProfile::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> ConversationRepo {
        ConversationRepo::new(init_memory().unwrap())
    }

    #[test]
    fn create_and_lookup_conversation() {
        let repo = setup();

        repo.create_conversation("agent-1", "session-1").unwrap();

        assert_eq!(
            repo.agent_id("session-1").unwrap(),
            Some("agent-1".to_string())
        );
        assert_eq!(repo.agent_id("session-2").unwrap(), None);
    }

    #[test]
    fn turns_round_trip_in_order() {
        let repo = setup();
        repo.create_conversation("agent-1", "session-1").unwrap();

        repo.append_turn("session-1", TurnRole::Caller, "I need a room")
            .unwrap();
        repo.append_turn("session-1", TurnRole::Assistant, "For which night?")
            .unwrap();
        repo.append_turn("session-1", TurnRole::Caller, "Tonight")
            .unwrap();

        let turns = repo.turns("session-1").unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, TurnRole::Caller);
        assert_eq!(turns[0].text, "I need a room");
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(turns[2].text, "Tonight");
    }

    #[test]
    fn turns_for_unknown_session_are_empty() {
        let repo = setup();
        assert!(repo.turns("missing").unwrap().is_empty());
    }

    #[test]
    fn append_without_conversation_fails() {
        let repo = setup();
        let result = repo.append_turn("missing", TurnRole::Caller, "hello");
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn registered_profile_wins_over_default() {
        let repo = setup();

        let profile = AgentProfile {
            name: "Mira".to_string(),
            welcome_text: "Hello from Mira".to_string(),
            system_prompt: "You are Mira.".to_string(),
        };
        repo.upsert_agent("agent-1", &profile).unwrap();

        let found = repo.agent_profile("agent-1").unwrap();
        assert_eq!(found.name, "Mira");

        let fallback = repo.agent_profile("unknown").unwrap();
        assert_eq!(fallback.name, AgentProfile::default().name);
    }
}
