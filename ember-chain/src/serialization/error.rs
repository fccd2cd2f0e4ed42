use std::io;

use thiserror::Error;

/// A serialization error.
// XXX refine error types -- better to use boxed errors?
#[derive(Error, Debug)]
pub enum SerializationError {
    /// An io error that prevented deserialization
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    // XXX refine errors
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// The data was syntactically valid but used a non-canonical encoding
    /// (e.g. a `CompactInt` written with a wider prefix than necessary).
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),
}
