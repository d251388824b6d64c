//! Error types for the logstore operator
//!
//! Errors carry the configuration kind or cluster they concern so the
//! controller can log a useful reason before requeueing.

use std::time::Duration;

use thiserror::Error;

use crate::naming::NamingError;
use crate::registry::ConfigKind;
use crate::store::StoreError;

/// Main error type for logstore operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A configuration kind was requested that the registry never saw
    #[error("unknown config kind: {kind:?}")]
    UnknownConfigKind {
        /// The unregistered kind
        kind: ConfigKind,
    },

    /// The same configuration kind was registered twice
    #[error("config kind registered twice: {kind:?}")]
    DuplicateConfigKind {
        /// The duplicated kind
        kind: ConfigKind,
    },

    /// The cluster identity cannot produce a valid resource name
    #[error("naming error: {0}")]
    Naming(#[from] NamingError),

    /// An override document could not be merged into the default template
    #[error("merge error for {kind:?}: {message}")]
    Merge {
        /// Kind whose override is malformed
        kind: ConfigKind,
        /// Description of what's wrong with the override
        message: String,
    },

    /// Object store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error outside the object store seam
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for the custom resource
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A reconciliation pass ran past its deadline
    #[error("reconciliation pass exceeded deadline of {}s", timeout.as_secs())]
    DeadlineExceeded {
        /// The configured pass deadline
        timeout: Duration,
    },

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a merge error for the given kind
    pub fn merge(kind: ConfigKind, msg: impl Into<String>) -> Self {
        Self::Merge {
            kind,
            message: msg.into(),
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Wiring defects and malformed input stay broken until someone edits
    /// the resource or the operator; store failures and deadlines are
    /// transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::UnknownConfigKind { .. } | Error::DuplicateConfigKind { .. } => false,
            Error::Naming(_) => false,
            Error::Merge { .. } => false,
            Error::Store(e) => e.is_retryable(),
            Error::Kube(source) => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Serialization(_) => false,
            Error::DeadlineExceeded { .. } => true,
            Error::Config(_) => false,
        }
    }

    /// Get the config kind if this error concerns a specific kind
    pub fn kind(&self) -> Option<ConfigKind> {
        match self {
            Error::UnknownConfigKind { kind }
            | Error::DuplicateConfigKind { kind }
            | Error::Merge { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
