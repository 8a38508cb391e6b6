//! Running utterance buffer for one listening phase
//!
//! The recognizer delivers a mix of interim guesses and final fragments.
//! Interim fragments replace the current live guess; final fragments are
//! appended to the durable transcript and will not be revised.

/// Merges incremental recognition fragments into a running utterance
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    /// Finalized fragments, single-space separated
    durable: String,
    /// Latest interim guess, revised as more audio arrives
    live: String,
}

impl TranscriptAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one recognition fragment
    pub fn push(&mut self, text: &str, is_final: bool) {
        if text.is_empty() {
            return;
        }
        if is_final {
            if !self.durable.is_empty() {
                self.durable.push(' ');
            }
            self.durable.push_str(text);
            self.live.clear();
        } else {
            self.live = text.to_string();
        }
    }

    /// Everything heard so far this phase, durable plus live guess.
    /// Used for responsive transcript display, not for the reply.
    #[must_use]
    pub fn display(&self) -> String {
        if self.live.is_empty() {
            self.durable.clone()
        } else if self.durable.is_empty() {
            self.live.clone()
        } else {
            format!("{} {}", self.durable, self.live)
        }
    }

    /// Finalize the durable transcript into an utterance and reset for the
    /// next listening phase
    pub fn finalize(&mut self) -> String {
        let utterance = self.durable.trim().to_string();
        self.durable.clear();
        self.live.clear();
        utterance
    }

    /// Whether any fragment has been heard this phase
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.durable.is_empty() && self.live.is_empty()
    }
}
