//! Custom Resource Definitions for the logstore operator

mod cluster;

pub use cluster::{StorageCluster, StorageClusterSpec, StorageClusterStatus, StorageConfigSpec};
