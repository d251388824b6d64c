//! Controller for the StorageCluster CRD
//!
//! Follows the Kubernetes controller pattern: each pass observes the
//! managed ConfigMaps, diffs them against the desired state and writes
//! only what drifted.

mod cluster;

pub use cluster::{error_policy, reconcile, run, Context, KubeStatusWriter, StatusWriter};
