//! Deterministic names for managed resources
//!
//! Names are `<cluster-name>-<suffix>` and must be valid RFC 1123 DNS
//! subdomains, since ConfigMap names are.

use std::fmt;

use thiserror::Error;

/// Maximum length of a DNS subdomain name
const MAX_NAME_LEN: usize = 253;

/// Namespaced identity of a cluster custom resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterIdentity {
    /// Resource name
    pub name: String,
    /// Resource namespace; managed resources inherit it
    pub namespace: String,
}

impl ClusterIdentity {
    /// Create a new identity
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Why a name could not be derived
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// The cluster has no name
    #[error("cluster name is empty")]
    EmptyClusterName,

    /// The descriptor has no suffix
    #[error("name suffix is empty")]
    EmptySuffix,

    /// The combined name is not a valid DNS subdomain
    #[error("derived name '{name}' is invalid: {reason}")]
    Invalid {
        /// The rejected name
        name: String,
        /// What rule it breaks
        reason: String,
    },
}

/// Derive the name of a managed resource from its owning cluster.
///
/// Pure: the same identity and suffix always yield the same name.
pub fn derive_name(identity: &ClusterIdentity, suffix: &str) -> Result<String, NamingError> {
    if identity.name.is_empty() {
        return Err(NamingError::EmptyClusterName);
    }
    if suffix.is_empty() {
        return Err(NamingError::EmptySuffix);
    }

    let name = format!("{}-{}", identity.name, suffix);
    validate_dns_subdomain(&name).map_err(|reason| NamingError::Invalid {
        name: name.clone(),
        reason,
    })?;
    Ok(name)
}

fn validate_dns_subdomain(name: &str) -> Result<(), String> {
    if name.len() > MAX_NAME_LEN {
        return Err(format!("longer than {MAX_NAME_LEN} characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(format!("contains invalid character '{c}'"));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.starts_with(alnum) || !name.ends_with(alnum) {
        return Err("must start and end with an alphanumeric character".to_string());
    }
    Ok(())
}
