use thiserror::Error;

/// Everything that can go wrong while turning a condition into a backend
///  filter. None of these are recoverable for the operation in progress:
///  translation stops and nothing partial is handed to the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unterminated string literal starting at {position}")]
    UnterminatedString { position: usize },

    #[error("Unbalanced parentheses near byte {position}")]
    UnbalancedParens { position: usize },

    #[error("Parentheses nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("Empty parenthesised group")]
    EmptyGroup,

    #[error("Malformed clause: '{0}'")]
    MalformedClause(String),

    #[error("Condition has {placeholders} placeholder(s) but {values} value(s) were bound")]
    PlaceholderMismatch { placeholders: usize, values: usize },

    #[error("Unknown DB system not supported: {0}")]
    UnsupportedBackend(String),

    #[error("Clause '{0}' cannot be expressed for this backend")]
    UnsupportedClause(String),

    #[error("Field {field} was given a {found} value it cannot use")]
    TypeMismatch { field: String, found: &'static str },

    #[error("No field configuration for '{0}'")]
    MissingFieldConfiguration(String),

    #[error("Invalid field configuration: {0}")]
    Config(String),

    #[error("Invalid sort order: '{0}'")]
    InvalidOrder(String),

    #[error("Codec error in field {field}: {message}")]
    Codec { field: String, message: String },

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_names_field() {
        let err = Error::TypeMismatch {
            field: "tags".to_string(),
            found: "list",
        };
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn placeholder_mismatch_display() {
        let err = Error::PlaceholderMismatch {
            placeholders: 2,
            values: 1,
        };
        assert_eq!(
            err.to_string(),
            "Condition has 2 placeholder(s) but 1 value(s) were bound"
        );
    }
}
