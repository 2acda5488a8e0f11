//! Thin axum glue for webhook ingress.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use cascade_core::TriggerId;
use serde_json::json;

use crate::webhook::{WebhookDispatcher, WebhookRequest};

/// Build the webhook ingress router: `POST /webhooks/{trigger_id}`.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the dispatcher sees real source addresses.
#[must_use]
pub fn webhook_router(dispatcher: Arc<WebhookDispatcher>) -> Router {
    Router::new()
        .route("/webhooks/:trigger_id", post(handle_webhook))
        .with_state(dispatcher)
}

async fn handle_webhook(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    Path(trigger_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(trigger_id) = TriggerId::parse(&trigger_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown trigger"})),
        )
            .into_response();
    };

    let header_pairs = headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|value| (name.as_str().to_string(), value.to_string()))
    });
    let request = WebhookRequest::new(body.to_vec(), header_pairs, peer.ip());

    match dispatcher.handle(trigger_id, request).await {
        Ok(execution_id) => (
            StatusCode::OK,
            Json(json!({"execution_id": execution_id})),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(json!({"error": err.to_string(), "class": err.class()})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::testing::RecordingLauncher;
    use crate::repo::{MemoryTriggerRepository, TriggerRepository};
    use crate::trigger::{TriggerConfig, TriggerDefinition, TriggerType, WebhookConfig};
    use axum::http::Request;
    use cascade_core::WorkflowId;
    use cascade_storage::MemoryCache;
    use hmac::Mac;
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac =
            hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    async fn router_with_trigger(secret: &str) -> (Router, TriggerId) {
        let repo = Arc::new(MemoryTriggerRepository::new());
        let trigger = TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Webhook,
            TriggerConfig::Webhook(WebhookConfig {
                secret: Some(SecretString::new(secret.into())),
                ..WebhookConfig::default()
            }),
        );
        let id = trigger.id;
        repo.create(trigger).await.unwrap();
        let dispatcher = Arc::new(WebhookDispatcher::new(
            repo,
            Arc::new(RecordingLauncher::default()),
            Arc::new(MemoryCache::new()),
        ));
        (webhook_router(dispatcher), id)
    }

    fn request(uri: &str, body: &'static str, signature: &str) -> Request<axum::body::Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-webhook-signature", signature)
            .body(axum::body::Body::from(body))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));
        request
    }

    #[tokio::test]
    async fn signed_post_returns_execution_id() {
        let (router, id) = router_with_trigger("s3cret").await;
        let body = r#"{"n": 1}"#;
        let response = router
            .oneshot(request(
                &format!("/webhooks/{id}"),
                body,
                &sign("s3cret", body.as_bytes()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["execution_id"].is_string());
    }

    #[tokio::test]
    async fn tampered_signature_is_401() {
        let (router, id) = router_with_trigger("s3cret").await;
        let body = r#"{"n": 1}"#;
        let mut signature = sign("s3cret", body.as_bytes());
        // Flip one hex digit.
        let flipped = if signature.ends_with('0') { "1" } else { "0" };
        signature.replace_range(signature.len() - 1.., flipped);

        let response = router
            .oneshot(request(&format!("/webhooks/{id}"), body, &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unparseable_trigger_id_is_404() {
        let (router, _id) = router_with_trigger("s3cret").await;
        let response = router
            .oneshot(request("/webhooks/not-a-uuid", "{}", "00"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
