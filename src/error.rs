// src/error.rs

//! Crate-wide error type and result alias

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the cataloging engine
#[derive(Error, Debug)]
pub enum Error {
    /// No source provider could resolve the user input
    #[error("unable to resolve source {input:?}:{}", join_errors(.errors))]
    SourceResolution {
        input: String,
        errors: Vec<String>,
    },

    /// Transient I/O failure while reading the virtual filesystem
    #[error("resolver I/O failure at {path:?}: {source}")]
    ResolverIo {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Non-fatal per-file parse failure, collected by the runtime
    #[error("failed to parse {path:?}: {reason}")]
    Parse { path: String, reason: String },

    /// A decoder recognized the format family but not the version
    #[error("sbom format found to be {id:?} but the version is not supported")]
    FormatUnsupported { id: String },

    /// No decoder matched the input
    #[error("sbom format not recognized")]
    FormatUnrecognized,

    /// Inconsistent settings, fatal at setup time
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The operation was canceled via its cancellation token
    #[error("operation canceled")]
    Canceled,

    /// Archive structure could not be read
    #[error("unable to read archive {path:?}: {reason}")]
    Archive { path: String, reason: String },

    /// Failure while encoding or decoding a specific format
    #[error("{format}: {reason}")]
    Format { format: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when this error stems from a missing path ("not found" family).
    ///
    /// Source providers use this to hold back not-found errors until every
    /// provider has failed.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Error::ResolverIo { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Render a list of inner errors one per line, indented with a dash.
fn join_errors(errors: &[String]) -> String {
    let mut out = String::new();
    for e in errors {
        out.push_str("\n  - ");
        out.push_str(e);
    }
    out
}
