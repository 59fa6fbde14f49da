//! Token accounting.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Tokens consumed by one backend call (or a running total).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

impl From<openai_client::Usage> for TokenUsage {
    fn from(usage: openai_client::Usage) -> Self {
        Self::new(usage.prompt_tokens.into(), usage.completion_tokens.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(10, 2);
        total += TokenUsage::new(5, 1);
        assert_eq!(total, TokenUsage::new(15, 3));
        assert_eq!(total.total(), 18);
    }

    #[test]
    fn test_from_openai_usage() {
        let usage = openai_client::Usage {
            prompt_tokens: 120,
            completion_tokens: 30,
            total_tokens: 150,
        };
        assert_eq!(TokenUsage::from(usage), TokenUsage::new(120, 30));
    }
}
