use crate::config::MutationConfig;
use crate::mutate::Mutate;
use crate::patch::PatchOperation;
use json_patch::jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use tracing::debug;

impl Mutate for PersistentVolumeClaim {
    fn mutate(&self, config: &MutationConfig) -> Vec<PatchOperation> {
        let Some(default_class) = config.default_storage_class.as_deref() else {
            return Vec::new();
        };
        let Some(spec) = self.spec.as_ref() else {
            debug!(
                "PersistentVolumeClaim {} has no spec, nothing to mutate",
                self.metadata.name.as_deref().unwrap_or_default()
            );
            return Vec::new();
        };

        let path = PointerBuf::from_tokens(["spec", "storageClassName"]);
        match spec.storage_class_name.as_deref() {
            None => vec![PatchOperation::add(path, default_class)],
            Some(current) if current != default_class => {
                debug!(
                    "Replacing storage class {} with {}",
                    current, default_class
                );
                vec![PatchOperation::replace(path, default_class)]
            }
            Some(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn pvc(spec: Value) -> PersistentVolumeClaim {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "default"},
            "spec": spec,
        }))
        .expect("valid pvc")
    }

    fn config(default_class: &str) -> MutationConfig {
        MutationConfig {
            default_storage_class: Some(default_class.to_string()),
            ..Default::default()
        }
    }

    fn spec(storage_class: Option<&str>) -> Value {
        let mut spec = json!({
            "accessModes": ["ReadWriteOnce"],
            "resources": {"requests": {"storage": "1Gi"}},
        });
        if let Some(class) = storage_class {
            spec["storageClassName"] = json!(class);
        }
        spec
    }

    #[test]
    fn test_unset_storage_class_is_added() {
        let patches = pvc(spec(None)).mutate(&config("fast"));
        assert_eq!(
            serde_json::to_value(&patches).unwrap(),
            json!([{"op": "add", "path": "/spec/storageClassName", "value": "fast"}])
        );
    }

    #[test]
    fn test_matching_storage_class_is_kept() {
        assert!(pvc(spec(Some("fast"))).mutate(&config("fast")).is_empty());
    }

    #[test]
    fn test_different_storage_class_is_replaced() {
        let patches = pvc(spec(Some("slow"))).mutate(&config("fast"));
        assert_eq!(
            serde_json::to_value(&patches).unwrap(),
            json!([{"op": "replace", "path": "/spec/storageClassName", "value": "fast"}])
        );
    }

    #[test]
    fn test_explicit_empty_storage_class_is_replaced() {
        let patches = pvc(spec(Some(""))).mutate(&config("fast"));
        assert!(matches!(patches.as_slice(), [PatchOperation::Replace { .. }]));
    }

    #[test]
    fn test_rule_disabled_without_default() {
        let pvc = pvc(spec(None));
        assert!(pvc.mutate(&MutationConfig::default()).is_empty());
    }

    #[test]
    fn test_pvc_without_spec() {
        assert!(PersistentVolumeClaim::default().mutate(&config("fast")).is_empty());
    }

    #[test]
    fn test_patched_claim_is_a_fixed_point() {
        let claim = pvc(spec(Some("slow")));
        let config = config("fast");

        let mut doc = serde_json::to_value(&claim).unwrap();
        let patch = crate::patch::into_json_patch(claim.mutate(&config));
        json_patch::patch(&mut doc, &patch.0).unwrap();
        let patched: PersistentVolumeClaim = serde_json::from_value(doc).unwrap();

        assert_eq!(
            patched.spec.as_ref().unwrap().storage_class_name.as_deref(),
            Some("fast")
        );
        assert!(patched.mutate(&config).is_empty());
    }
}
