use crate::config::MutationConfig;
use crate::mutate::Mutate;
use crate::patch::PatchOperation;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::core::GroupVersionResource;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Resource addressed by an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Pod,
    PersistentVolumeClaim,
    Other(String),
}

impl From<&GroupVersionResource> for ResourceKind {
    fn from(gvr: &GroupVersionResource) -> Self {
        match (gvr.group.as_str(), gvr.version.as_str(), gvr.resource.as_str()) {
            ("", "v1", "pods") => ResourceKind::Pod,
            ("", "v1", "persistentvolumeclaims") => ResourceKind::PersistentVolumeClaim,
            ("", version, resource) => ResourceKind::Other(format!("{}/{}", version, resource)),
            (group, version, resource) => {
                ResourceKind::Other(format!("{}/{}/{}", group, version, resource))
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Pod => write!(f, "v1/pods"),
            ResourceKind::PersistentVolumeClaim => write!(f, "v1/persistentvolumeclaims"),
            ResourceKind::Other(resource) => write!(f, "{}", resource),
        }
    }
}

#[derive(Debug)]
pub enum MutationError {
    /// The object does not match the schema of its declared resource.
    Decode {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MutationError::Decode { source, .. } => Some(source),
        }
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationError::Decode { kind, source } => {
                write!(f, "could not deserialize {} object: {}", kind, source)
            }
        }
    }
}

/// Routes an admitted object to the mutator of its kind.
///
/// The webhook is only registered for pods and claims; anything else is let
/// through untouched with a warning rather than blocking admission.
pub fn dispatch(
    kind: &ResourceKind,
    object: Value,
    config: &MutationConfig,
) -> Result<Vec<PatchOperation>, MutationError> {
    match kind {
        ResourceKind::Pod => mutate_object::<Pod>(object, config),
        ResourceKind::PersistentVolumeClaim => {
            mutate_object::<PersistentVolumeClaim>(object, config)
        }
        ResourceKind::Other(resource) => {
            warn!(
                "Got an unexpected resource {}, admitting it without mutation",
                resource
            );
            Ok(Vec::new())
        }
    }
}

fn mutate_object<K: Mutate>(
    object: Value,
    config: &MutationConfig,
) -> Result<Vec<PatchOperation>, MutationError> {
    let resource: K = serde_json::from_value(object).map_err(|source| MutationError::Decode {
        kind: K::kind_name(),
        source,
    })?;

    let patches = resource.mutate(config);
    for patch in &patches {
        debug!("{} patch: {}", K::kind_name(), patch);
    }
    Ok(patches)
}
