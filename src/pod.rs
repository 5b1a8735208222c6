use crate::config::{MutationConfig, PullPolicy};
use crate::image_reference;
use crate::mutate::Mutate;
use crate::patch::{PatchOperation, container_field};
use json_patch::jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, trace};

static INIT_CONTAINERS: &str = "initContainers";
static CONTAINERS: &str = "containers";

impl Mutate for Pod {
    /// Registry rewrite, then pull policy, then pull secret. Every rule targets
    /// its own pointers so the order only affects how the patch reads.
    fn mutate(&self, config: &MutationConfig) -> Vec<PatchOperation> {
        let Some(spec) = self.spec.as_ref() else {
            debug!(
                "Pod {} has no spec, nothing to mutate",
                self.metadata.name.as_deref().unwrap_or_default()
            );
            return Vec::new();
        };

        let mut patches = Vec::new();

        if !config.registries.is_empty() {
            patches.extend(patch_registry(spec, &config.registries));
        }

        if let Some(policy) = config.forced_pull_policy {
            patches.extend(patch_image_pull_policy(spec, policy));
        }

        if let Some(secret) = config.image_pull_secret.as_deref() {
            patches.extend(patch_image_pull_secret(
                spec,
                secret,
                config.append_image_pull_secret,
            ));
        }

        patches
    }
}

/// Init containers first, then regular containers, each with its position in
/// its own list.
fn containers(spec: &PodSpec) -> impl Iterator<Item = (&'static str, usize, &Container)> {
    let init = spec
        .init_containers
        .iter()
        .flatten()
        .enumerate()
        .map(|(index, container)| (INIT_CONTAINERS, index, container));
    let regular = spec
        .containers
        .iter()
        .enumerate()
        .map(|(index, container)| (CONTAINERS, index, container));
    init.chain(regular)
}

fn patch_registry(spec: &PodSpec, registries: &BTreeMap<String, String>) -> Vec<PatchOperation> {
    containers(spec)
        .filter_map(|(list, index, container)| {
            let image = container.image.as_deref().filter(|image| !image.is_empty())?;
            trace!("/spec/{}/{}/image = {}", list, index, image);

            let rewritten = image_reference::resolve(image, registries)?;
            debug!(
                "Rewriting image of container {} from {} to {}",
                container.name, image, rewritten
            );
            Some(PatchOperation::replace(
                container_field(list, index, "image"),
                rewritten,
            ))
        })
        .collect()
}

fn patch_image_pull_policy(spec: &PodSpec, policy: PullPolicy) -> Vec<PatchOperation> {
    containers(spec)
        .filter_map(|(list, index, container)| {
            let current = container.image_pull_policy.as_deref().unwrap_or_default();
            trace!("/spec/{}/{}/imagePullPolicy = {}", list, index, current);

            if current == policy.as_str() {
                return None;
            }

            let path = container_field(list, index, "imagePullPolicy");
            // the API server defaults the field, but admission may still see it unset
            Some(if current.is_empty() {
                PatchOperation::add(path, policy.as_str())
            } else {
                PatchOperation::replace(path, policy.as_str())
            })
        })
        .collect()
}

fn patch_image_pull_secret(spec: &PodSpec, secret: &str, append: bool) -> Option<PatchOperation> {
    let path = PointerBuf::from_tokens(["spec", "imagePullSecrets"]);

    let existing = match spec.image_pull_secrets.as_deref() {
        Some(existing) if !existing.is_empty() => existing,
        // append and replace are the same edit on an empty list
        _ => return Some(PatchOperation::add(path, json!([{ "name": secret }]))),
    };

    if append {
        if existing.iter().any(|reference| reference.name == secret) {
            trace!("Image pull secret {} already present", secret);
            return None;
        }
        let index = existing.len().to_string();
        Some(PatchOperation::add(
            PointerBuf::from_tokens(["spec", "imagePullSecrets", index.as_str()]),
            json!({ "name": secret }),
        ))
    } else if existing.len() == 1 && existing[0].name == secret {
        None
    } else {
        Some(PatchOperation::replace(path, json!([{ "name": secret }])))
    }
}
