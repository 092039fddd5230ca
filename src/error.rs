//! Error types shared by the compiler, the lexicon loader and the extraction pipeline.
//!
//! Only a few conditions are real errors. Empty attribute filters and pruned subtree
//! branches are ordinary outcomes and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A rule line could not be compiled. Loading stops at the first one.
    #[error("pattern syntax error on line {line}: {message}")]
    PatternSyntax { line: usize, message: String },

    /// The clause is not a single rooted, acyclic dependency tree.
    #[error("malformed clause: {0}")]
    MalformedClause(String),

    /// An external collaborator (classifier, coreference, annotator) failed.
    #[error("external service `{service}` unavailable: {message}")]
    ExternalService { service: &'static str, message: String },

    #[error("lexicon file {path}: {message}")]
    Lexicon { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn pattern(line: usize, message: impl Into<String>) -> Self {
        Error::PatternSyntax { line, message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedClause(message.into())
    }

    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Error::ExternalService { service, message: message.into() }
    }

    pub fn lexicon(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Lexicon { path: path.into(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_error_mentions_line() {
        let err = Error::pattern(7, "unit count must be 2");
        assert_eq!(err.to_string(), "pattern syntax error on line 7: unit count must be 2");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
