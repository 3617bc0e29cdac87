//! Error types for quire operations.

use thiserror::Error;

/// Errors that can occur while setting up a parse session.
///
/// Once parsing has begun, the core never fails: malformed input degrades to
/// best-effort output and the only caller-visible signal is the boolean
/// returned by the top-level parse entry points.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty stream: {0}")]
    EmptyStream(String),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),
}

pub type Result<T> = std::result::Result<T, Error>;
