//! Subject syntax: `ORDERS.new` (exact), `ORDERS.*` (one level),
//! `ORDERS.>` (all descendants).

use thiserror::Error;

/// Matches exactly one token.
pub const WILDCARD_ONE: &str = "*";

/// Matches one or more trailing tokens.
pub const WILDCARD_ALL: &str = ">";

/// Reasons a subject is rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubjectError {
    /// The subject is empty.
    #[error("subject is empty")]
    Empty,

    /// The subject contains an empty token, e.g. `ORDERS..new`.
    #[error("subject `{0}` contains an empty token")]
    EmptyToken(String),

    /// The subject contains whitespace.
    #[error("subject `{0}` contains whitespace")]
    Whitespace(String),

    /// A wildcard is part of a token or `>` is not the last token.
    #[error("subject `{0}` contains a misplaced wildcard")]
    MisplacedWildcard(String),

    /// The first token, which names the stream, is a wildcard.
    #[error("subject `{0}` does not name a stream")]
    MissingStream(String),

    /// A stream name is not a single concrete token.
    #[error("`{0}` is not a valid stream name")]
    StreamName(String),

    /// A wildcard was used where a concrete subject is required.
    #[error("subject `{0}` must not contain wildcards")]
    Wildcard(String),
}

/// Checks `subject` against the subject syntax. Wildcards are allowed.
///
/// # Errors
///
/// Returns a [`SubjectError`] describing the first violation found.
pub fn validate(subject: &str) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }

    if subject.chars().any(char::is_whitespace) {
        return Err(SubjectError::Whitespace(subject.to_string()));
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    let last = tokens.len() - 1;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(SubjectError::EmptyToken(subject.to_string()));
        }

        let is_wildcard = *token == WILDCARD_ONE || *token == WILDCARD_ALL;
        if !is_wildcard && (token.contains('*') || token.contains('>')) {
            return Err(SubjectError::MisplacedWildcard(subject.to_string()));
        }

        if *token == WILDCARD_ALL && index != last {
            return Err(SubjectError::MisplacedWildcard(subject.to_string()));
        }
    }

    Ok(())
}

/// Checks that `subject` is valid and free of wildcards, as required for publishing.
///
/// # Errors
///
/// Returns a [`SubjectError`] if the subject is invalid or contains a wildcard.
pub fn validate_concrete(subject: &str) -> Result<(), SubjectError> {
    validate(subject)?;

    if subject
        .split('.')
        .any(|token| token == WILDCARD_ONE || token == WILDCARD_ALL)
    {
        return Err(SubjectError::Wildcard(subject.to_string()));
    }

    Ok(())
}

/// Returns the stream named by the first token of `subject`.
///
/// # Errors
///
/// Returns a [`SubjectError`] if the subject is invalid or starts with a wildcard.
pub fn stream_name(subject: &str) -> Result<&str, SubjectError> {
    validate(subject)?;

    match subject.split('.').next() {
        Some(token) if token != WILDCARD_ONE && token != WILDCARD_ALL => Ok(token),
        _ => Err(SubjectError::MissingStream(subject.to_string())),
    }
}

/// Checks that `name` can name a stream: a single token without wildcards.
///
/// # Errors
///
/// Returns a [`SubjectError`] if the name is empty, malformed or spans several tokens.
pub fn validate_stream_name(name: &str) -> Result<(), SubjectError> {
    validate_concrete(name)?;

    if name.contains('.') {
        return Err(SubjectError::StreamName(name.to_string()));
    }

    Ok(())
}

/// Whether the concrete `subject` is matched by `filter`.
#[must_use]
pub fn matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(WILDCARD_ALL), Some(_)) => return true,
            (Some(WILDCARD_ONE), Some(_)) => {}
            (Some(f), Some(s)) if f == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
