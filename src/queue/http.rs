//! HTTP queue client.
//!
//! Posts each dispatch message as JSON to a queue ingestion endpoint. The
//! job id is also sent as the `X-Job-Id` header so consumers can route or
//! deduplicate without parsing the body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::error::QueueError;
use crate::jobs::DispatchMessage;
use crate::queue::WorkQueue;

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Configuration for the HTTP queue client.
#[derive(Debug, Clone)]
pub struct HttpQueueConfig {
    pub url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

/// Work queue reached over HTTP.
pub struct HttpWorkQueue {
    config: HttpQueueConfig,
    client: Client,
}

impl HttpWorkQueue {
    pub fn new(config: HttpQueueConfig) -> Result<Self, QueueError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl WorkQueue for HttpWorkQueue {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header("X-Job-Id", message.job_id.to_string())
            .json(message);
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QueueError::Timeout(self.config.timeout)
            } else {
                QueueError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        tracing::debug!(job_id = %message.job_id, status = %status, "Dispatch accepted by queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::jobs::{Hyperparameters, Job, JobStatus};

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(HeaderMap, serde_json::Value)>>>,
    }

    async fn accept(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        captured.requests.lock().await.push((headers, body));
        StatusCode::ACCEPTED
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}/enqueue", addr)
    }

    fn message() -> DispatchMessage {
        let now = Utc::now();
        DispatchMessage::start_training(&Job {
            id: Uuid::new_v4(),
            owner: Some("u1".into()),
            name: "grasp-v1".into(),
            model_type: "policy_network".into(),
            dataset_path: None,
            hyperparameters: Hyperparameters::new(),
            status: JobStatus::Pending,
            dispatch_reference: None,
            error_message: None,
            training_logs: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn config(url: String) -> HttpQueueConfig {
        HttpQueueConfig {
            url,
            token: Some(SecretString::from("queue-token")),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_send_posts_message() {
        let captured = Captured::default();
        let url = serve(
            Router::new()
                .route("/enqueue", post(accept))
                .with_state(captured.clone()),
        )
        .await;

        let queue = HttpWorkQueue::new(config(url)).unwrap();
        let msg = message();
        queue.send(&msg).await.unwrap();

        let requests = captured.requests.lock().await;
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        assert_eq!(headers["x-job-id"], msg.job_id.to_string().as_str());
        assert_eq!(headers["authorization"], "Bearer queue-token");
        assert_eq!(body["action"], "start_training");
        assert_eq!(body["job_data"]["name"], "grasp-v1");
    }

    #[tokio::test]
    async fn test_rejection_surfaces_status() {
        let url = serve(Router::new().route(
            "/enqueue",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "queue full") }),
        ))
        .await;

        let queue = HttpWorkQueue::new(config(url)).unwrap();
        match queue.send(&message()).await {
            Err(QueueError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "queue full");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let queue = HttpWorkQueue::new(config(format!("http://{}/enqueue", addr))).unwrap();
        assert!(queue.send(&message()).await.is_err());
    }
}
