use crate::config::MutationConfig;
use crate::patch::PatchOperation;
use serde::de::DeserializeOwned;

/// A Kubernetes object kind the webhook knows how to mutate.
///
/// Implementations only read the object and describe the intended edits as
/// JSON patches; they never fail, a rule that does not apply simply emits
/// nothing.
pub trait Mutate
where
    Self: k8s_openapi::Resource + DeserializeOwned,
{
    fn kind_name() -> &'static str {
        Self::KIND
    }

    fn mutate(&self, config: &MutationConfig) -> Vec<PatchOperation>;
}
