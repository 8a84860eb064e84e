//! Text tokenization for text fields.

/// Tokenizer settings.
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Shorter tokens are dropped.
    pub min_token_length: usize,
    /// Longer tokens are dropped.
    pub max_token_length: usize,
    /// Characters splitting tokens besides whitespace and ASCII punctuation.
    pub extra_separators: Vec<char>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 256,
            extra_separators: Vec::new(),
        }
    }
}

impl TokenizerConfig {
    /// Splits `text` into lowercase tokens, in order, duplicates kept.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| {
            c.is_whitespace() || c.is_ascii_punctuation() || self.extra_separators.contains(&c)
        })
        .filter(|token| {
            let len = token.chars().count();
            len >= self.min_token_length && len <= self.max_token_length
        })
        .map(str::to_lowercase)
        .collect()
    }
}
