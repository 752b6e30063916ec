//! Single-use clipboard verification token

use rand::{distributions::Alphanumeric, Rng};

pub const TOKEN_PREFIX: &str = "__promptrelay_token_";
const TOKEN_LEN: usize = 24;

/// Random marker written to the clipboard before a copy is triggered.
///
/// Deliberately not `Clone`: [`ExtractionToken::into_witness`] consumes it,
/// so one token serves exactly one extraction attempt.
#[derive(Debug, PartialEq, Eq)]
pub struct ExtractionToken(String);

impl ExtractionToken {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(format!("{}{}", TOKEN_PREFIX, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_witness(self) -> TokenWitness {
        TokenWitness(self.0)
    }
}

/// Judges clipboard content against the token it replaced
#[derive(Debug)]
pub struct TokenWitness(String);

impl TokenWitness {
    /// Content counts only when non-empty and not the token itself.
    pub fn accepts(&self, content: &str) -> bool {
        let trimmed = content.trim();
        !trimmed.is_empty() && trimmed != self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_prefixed_and_fresh() {
        let a = ExtractionToken::generate();
        let b = ExtractionToken::generate();
        assert!(a.as_str().starts_with(TOKEN_PREFIX));
        assert_eq!(a.as_str().len(), TOKEN_PREFIX.len() + TOKEN_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn witness_rejects_token_echo_and_empty_content() {
        let token = ExtractionToken::generate();
        let echoed = token.as_str().to_string();
        let witness = token.into_witness();
        assert!(!witness.accepts(&echoed));
        assert!(!witness.accepts(&format!("  {}\n", echoed)));
        assert!(!witness.accepts("   "));
        assert!(witness.accepts("The answer is 42."));
    }
}
