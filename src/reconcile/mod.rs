//! ConfigMap convergence
//!
//! [`ResourceReconciler`] converges one ConfigMap; [`Pipeline`] runs it for
//! every configured kind of a cluster in order.

mod pipeline;
mod resource;

pub use pipeline::{ConfigStep, Pipeline};
pub use resource::{ResourceReconciler, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
