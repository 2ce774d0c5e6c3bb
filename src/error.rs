//! Error types for the rewriting core.
//!
//! Mirrors the error-kind taxonomy the spec assigns to this subsystem:
//! reference-level failures are recoverable (the caller gets a passthrough
//! plus a log line), record- and payload-level failures are reported so the
//! surrounding pipeline can count them, and only I/O failures are fatal.

use thiserror::Error;

/// Errors raised while canonicalizing, classifying, or rewriting a single
/// reference or payload.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The URL had no host, or carried a scheme other than `http`/`https`.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The payload's media class could not be determined, or is a class
    /// this crate does not know how to rewrite.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// The HTML/CSS/JS parser could not make sense of the payload.
    #[error("failed to parse {kind} payload: {message}")]
    ParseError {
        /// `"html"`, `"css"`, or `"js"`.
        kind: &'static str,
        message: String,
    },

    /// A canonical path was already claimed by an earlier record.
    #[error("canonical path collision: {0}")]
    Collision(String),

    /// The payload had zero length.
    #[error("empty payload")]
    EmptyPayload,

    /// Surfaced as-is from the caller's I/O layer; never constructed inside
    /// this crate's own logic.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RewriteError>;
