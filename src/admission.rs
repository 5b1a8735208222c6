use crate::config::MutationConfig;
use crate::dispatcher::{ResourceKind, dispatch};
use crate::patch::into_json_patch;
use crate::state::AppState;
use axum::{Json, extract::State};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Takes the raw body so that an object which fails to decode is still
/// answered with an AdmissionReview instead of an extractor rejection.
pub async fn mutate_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match decode_request(body) {
        Ok(request) => request,
        Err(response) => return Json(response.into_review()),
    };

    Json(review_request(&state.config, &request).into_review())
}

fn decode_request(mut body: Value) -> Result<AdmissionRequest<DynamicObject>, AdmissionResponse> {
    let error = match AdmissionReview::<DynamicObject>::deserialize(&body) {
        Ok(review) => {
            let request: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
            return request.map_err(|e| {
                error!("Failed to extract admission request: {}", e);
                AdmissionResponse::invalid(e.to_string())
            });
        }
        Err(e) => e,
    };

    // retry without the objects to recover the uid the answer must carry
    if let Some(request) = body.get_mut("request").and_then(Value::as_object_mut) {
        request.remove("object");
        request.remove("oldObject");
    }
    let envelope: Option<AdmissionRequest<DynamicObject>> =
        AdmissionReview::<DynamicObject>::deserialize(&body)
            .ok()
            .and_then(|review| review.try_into().ok());

    match envelope {
        Some(request) => {
            warn!(uid = %request.uid, "Failed to decode admission object: {}", error);
            Err(AdmissionResponse::from(&request)
                .deny(format!("could not deserialize admission object: {}", error)))
        }
        None => {
            error!("Failed to decode AdmissionReview: {}", error);
            Err(AdmissionResponse::invalid(format!(
                "Invalid AdmissionReview: {}",
                error
            )))
        }
    }
}

/// Evaluates one admission request. The object is never rejected for what it
/// contains; only an object that cannot be decoded fails the request.
pub fn review_request(
    config: &MutationConfig,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = &request.uid;
    let kind = ResourceKind::from(&request.resource);
    let namespace = request.namespace.as_deref();

    if config.excluded_namespaces.is_excluded(namespace) {
        info!(
            uid = %uid,
            "Skipping {} {} in excluded namespace {}",
            kind,
            request.name,
            namespace.unwrap_or_default()
        );
        return AdmissionResponse::from(request);
    }

    let Some(object) = request.object.as_ref() else {
        debug!(uid = %uid, operation = ?request.operation, "No object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let patches = match serde_json::to_value(object)
        .map_err(|e| e.to_string())
        .and_then(|object| dispatch(&kind, object, config).map_err(|e| e.to_string()))
    {
        Ok(patches) => patches,
        Err(message) => {
            warn!(uid = %uid, "Failed to evaluate {} {}: {}", kind, request.name, message);
            return AdmissionResponse::from(request).deny(message);
        }
    };

    if patches.is_empty() {
        debug!(uid = %uid, "No mutation needed for {} {}", kind, request.name);
        return AdmissionResponse::from(request);
    }

    info!(
        uid = %uid,
        patches = patches.len(),
        "Mutating {} {} in namespace {}",
        kind,
        request.name,
        namespace.unwrap_or_default()
    );

    match AdmissionResponse::from(request).with_patch(into_json_patch(patches)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, "Failed to serialize patch: {}", e);
            AdmissionResponse::from(request).deny(format!("patch serialization error: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PullPolicy;
    use crate::namespace::NamespaceFilter;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn config() -> MutationConfig {
        MutationConfig {
            registries: BTreeMap::from([("default".to_string(), "mirror.example.com".to_string())]),
            forced_pull_policy: Some(PullPolicy::IfNotPresent),
            default_storage_class: Some("fast".to_string()),
            excluded_namespaces: NamespaceFilter::new(["kube-*"]).unwrap(),
            ..Default::default()
        }
    }

    fn review(resource: &str, namespace: &str, object: Option<Value>) -> Value {
        let mut request = json!({
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": resource},
            "name": "web",
            "namespace": namespace,
            "operation": "CREATE",
            "userInfo": {"username": "admin"},
            "dryRun": false,
        });
        if let Some(object) = object {
            request["object"] = object;
        }
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": request,
        })
    }

    fn pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"containers": [{"name": "app", "image": "nginx", "imagePullPolicy": "IfNotPresent"}]},
        })
    }

    async fn call(review: Value) -> Value {
        let Json(response) = mutate_handler(State(AppState::new(config())), Json(review)).await;
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_pod_is_patched() {
        let response = call(review("pods", "default", Some(pod()))).await;

        let response = &response["response"];
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");
        assert!(!response["patch"].is_null());
    }

    #[tokio::test]
    async fn test_conforming_pod_is_allowed_without_patch() {
        let mut pod = pod();
        pod["spec"]["containers"][0]["image"] = json!("mirror.example.com/nginx");

        let response = call(review("pods", "default", Some(pod))).await;

        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"]["patch"].is_null());
    }

    #[tokio::test]
    async fn test_excluded_namespace_is_not_mutated() {
        let response = call(review("pods", "kube-system", Some(pod()))).await;

        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"]["patch"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_resource_is_allowed() {
        let service = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"}});

        let response = call(review("services", "default", Some(service))).await;

        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"]["patch"].is_null());
    }

    #[tokio::test]
    async fn test_missing_object_is_allowed() {
        let response = call(review("pods", "default", None)).await;

        assert_eq!(response["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_review_without_request_is_invalid() {
        let response = call(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
        }))
        .await;

        assert_eq!(response["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_denied_with_uid() {
        let mut pod = pod();
        pod["metadata"]["name"] = json!(5);

        let response = call(review("pods", "default", Some(pod))).await;

        let response = &response["response"];
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response["allowed"], false);
        assert!(response.to_string().contains("could not deserialize admission object"));
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid() {
        let response = call(json!({"request": "not a request"})).await;

        assert_eq!(response["response"]["allowed"], false);
        assert!(response.to_string().contains("Invalid AdmissionReview"));
    }

    #[tokio::test]
    async fn test_undecodable_object_fails_the_request() {
        let mut pod = pod();
        pod["spec"]["containers"] = json!("nginx");

        let response = call(review("pods", "default", Some(pod))).await;

        assert_eq!(response["response"]["allowed"], false);
        assert!(response.to_string().contains("could not deserialize Pod object"));
    }

    #[test]
    fn test_review_request_for_pvc() {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(review(
            "persistentvolumeclaims",
            "default",
            Some(json!({
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": {"name": "data", "namespace": "default"},
                "spec": {"storageClassName": "slow"},
            })),
        ))
        .unwrap();
        let request: AdmissionRequest<DynamicObject> = review.try_into().unwrap();

        let response = review_request(&config(), &request);

        assert!(response.allowed);
        let response = serde_json::to_value(&response).unwrap();
        assert_eq!(response["patchType"], "JSONPatch");
    }
}
