use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod category;
pub mod store;

pub use category::CategoryIndex;
pub use store::{QuoteStore, SharedStore};

/// Category assigned to remote records that arrive without one.
pub const DEFAULT_CATEGORY: &str = "General";
/// Sentinel filter value selecting every category.
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub text: String,
    pub category: String,
}

/// A quote as received from the remote source, already normalized.
pub type RemoteQuote = Quote;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quote text cannot be empty")]
    MissingText,
    #[error("quote category cannot be empty")]
    MissingCategory,
}

impl Quote {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }

    /// Builds a quote from user input, trimming both fields.
    pub fn new_checked(text: &str, category: &str) -> Result<Self, QuoteError> {
        let text = text.trim();
        let category = category.trim();
        if text.is_empty() {
            return Err(QuoteError::MissingText);
        }
        if category.is_empty() {
            return Err(QuoteError::MissingCategory);
        }
        Ok(Self::new(text, category))
    }
}

pub fn default_quotes() -> Vec<Quote> {
    vec![
        Quote::new(
            "The best way to get started is to quit talking and begin doing.",
            "Motivation",
        ),
        Quote::new(
            "Life is what happens when you're busy making other plans.",
            "Life",
        ),
        Quote::new("Do one thing every day that scares you.", "Courage"),
        Quote::new("Happiness depends upon ourselves.", "Philosophy"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_constructor_trims_and_validates() {
        let quote = Quote::new_checked("  Stay hungry.  ", " Drive ").expect("valid quote");
        assert_eq!(quote, Quote::new("Stay hungry.", "Drive"));

        assert_eq!(Quote::new_checked("   ", "Drive"), Err(QuoteError::MissingText));
        assert_eq!(
            Quote::new_checked("Stay hungry.", ""),
            Err(QuoteError::MissingCategory)
        );
    }

    #[test]
    fn missing_fields_deserialize_as_empty() -> anyhow::Result<()> {
        let quote: Quote = serde_json::from_str(r#"{"text":"Only text"}"#)?;
        assert_eq!(quote.category, "");
        assert_eq!(serde_json::to_string(&quote)?, r#"{"text":"Only text","category":""}"#);
        Ok(())
    }
}
