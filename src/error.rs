//! Error taxonomy.
//!
//! Every variant here is non-fatal for the host: callers log and degrade to
//! untranslated text. Only the lifecycle boundaries decide that.

use std::path::PathBuf;

use thiserror::Error;

/// Failure loading the translation dictionary.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("dictionary {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by the host while answering a capability query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("type {0} failed to load")]
    TypeLoad(String),

    #[error("member {0} cannot be inspected")]
    Member(String),

    #[error("patch rejected for {site}: {reason}")]
    Patch { site: String, reason: String },

    #[error("object {0} is no longer alive")]
    ObjectGone(u64),

    #[error("host error: {0}")]
    Other(String),
}

/// Failure installing a wrapper on a discovered call site.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("call site {site} has shape {shape:?} which does not match its signature")]
    ShapeMismatch {
        site: String,
        shape: crate::host::CallShape,
    },

    #[error("host refused to patch {site}: {source}")]
    Install {
        site: String,
        #[source]
        source: HostError,
    },
}

/// No call site could be discovered within the full retry and fallback budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no text call site found after {attempts} attempts and {fallback_rounds} fallback rounds")]
pub struct DiscoveryFailure {
    pub attempts: u32,
    pub fallback_rounds: u32,
}

/// Failure persisting the missing-key report.
#[derive(Error, Debug)]
pub enum ReportWriteFailure {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode missing keys: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Unexpected fault inside a wrapper callback. Never leaves the wrapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationLookupFailure {
    #[error("wrapper panicked: {0}")]
    Panicked(String),

    #[error("value of type {0} cannot be read as text")]
    NotText(String),
}
