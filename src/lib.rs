//! Logstore - Kubernetes operator for log-storage cluster configuration
//!
//! Each `StorageCluster` custom resource is rendered into a fixed set of
//! ConfigMaps, one per configuration kind, which the storage nodes mount.
//! The operator is level-triggered: every pass re-reads the ConfigMaps and
//! writes only what drifted from the desired state.
//!
//! # Modules
//!
//! - [`crd`] - StorageCluster Custom Resource Definition
//! - [`registry`] - Configuration kinds and their ConfigMap conventions
//! - [`naming`] - Deterministic ConfigMap names
//! - [`cluster`] - Per-pass snapshot of a StorageCluster
//! - [`desired`] - Template + override merging into ConfigMap payloads
//! - [`store`] - ConfigMap access seam
//! - [`reconcile`] - Resource convergence and the ordered step pipeline
//! - [`requeue`] - Requeue signals and backoff
//! - [`controller`] - kube-rs controller wiring
//! - [`config`] - Operator flags and timing policy
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod desired;
pub mod error;
pub mod naming;
pub mod reconcile;
pub mod registry;
pub mod requeue;
pub mod store;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
