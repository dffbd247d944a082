//! Tinify HTTP optimizer.
//!
//! Uploads the staged JPEG to the shrink endpoint with basic auth (`api` and
//! the API key), reads `output.url` from the JSON reply, then downloads the
//! optimized bytes from that URL.

use async_trait::async_trait;
use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::optimizer::{ImageOptimizer, OptimizeError};
use super::staging::StagedFile;
use crate::config::TinifyConfig;

#[derive(Debug, Deserialize)]
struct ShrinkResponse {
    output: Option<ShrinkOutput>,
}

#[derive(Debug, Deserialize)]
struct ShrinkOutput {
    url: Option<String>,
}

/// Optimizer backed by the Tinify API.
pub struct TinifyOptimizer {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    timeout: std::time::Duration,
}

impl TinifyOptimizer {
    /// Create a new Tinify client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &TinifyConfig) -> Result<Self, OptimizeError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            timeout: config.timeout,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> OptimizeError {
        if e.is_timeout() {
            OptimizeError::Timeout(self.timeout)
        } else {
            OptimizeError::Request(e)
        }
    }
}

#[async_trait]
impl ImageOptimizer for TinifyOptimizer {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn optimize(&self, source: &StagedFile) -> Result<Vec<u8>, OptimizeError> {
        let bytes = tokio::fs::read(source.path()).await?;
        let file_name = source
            .path()
            .file_name()
            .map_or_else(|| "photo.jpg".to_owned(), |n| n.to_string_lossy().into_owned());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        debug!(status = status.as_u16(), body = %body, "Tinify response");

        if !status.is_success() {
            return Err(OptimizeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let url = serde_json::from_str::<ShrinkResponse>(&body)
            .ok()
            .and_then(|r| r.output)
            .and_then(|o| o.url)
            .ok_or(OptimizeError::MissingOutput)?;

        let download = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = download.status();
        if !status.is_success() {
            let body = download.text().await.unwrap_or_default();
            return Err(OptimizeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let optimized = download.bytes().await.map_err(|e| self.map_transport(e))?;
        debug!(bytes = optimized.len(), "Downloaded optimized image");
        Ok(optimized.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::{
        Json, Router,
        extract::{Multipart, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    };

    use super::*;
    use crate::services::photo::StagingArea;
    use crate::test_support::jpeg_bytes;

    const API_KEY: &str = "Vq3kT9mZ1xLp7RwN5bHc2GdJ8fYs4KtQ";

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Unauthorized,
        NoOutputUrl,
        Slow,
    }

    #[derive(Clone)]
    struct Fake {
        base: String,
        behavior: Behavior,
        uploads: Arc<AtomicUsize>,
    }

    async fn shrink(
        State(fake): State<Fake>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> axum::response::Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Basic "));
        assert!(authorized, "missing basic auth");

        let field = multipart.next_field().await.unwrap().unwrap();
        assert_eq!(field.name(), Some("file"));
        let _ = field.bytes().await.unwrap();
        fake.uploads.fetch_add(1, Ordering::SeqCst);

        match fake.behavior {
            Behavior::Succeed => Json(serde_json::json!({
                "input": { "size": 2000 },
                "output": { "size": 1500, "url": format!("{}/output/abc", fake.base) }
            }))
            .into_response(),
            Behavior::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Unauthorized", "message": "Credentials are invalid." })),
            )
                .into_response(),
            Behavior::NoOutputUrl => {
                Json(serde_json::json!({ "output": { "size": 1500 } })).into_response()
            }
            Behavior::Slow => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        }
    }

    async fn output() -> Vec<u8> {
        jpeg_bytes(70, 70)
    }

    async fn spawn_fake(behavior: Behavior) -> Fake {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let fake = Fake {
            base,
            behavior,
            uploads: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/shrink", post(shrink))
            .route("/output/abc", get(output))
            .with_state(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        fake
    }

    fn optimizer_for(fake: &Fake, timeout: Duration) -> TinifyOptimizer {
        TinifyOptimizer::new(&TinifyConfig {
            api_key: SecretString::from(API_KEY),
            endpoint: format!("{}/shrink", fake.base),
            timeout,
        })
        .unwrap()
    }

    async fn staged(dir: &tempfile::TempDir) -> StagedFile {
        StagingArea::new(dir.path())
            .stage(&jpeg_bytes(70, 70))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_uploads_then_downloads_result() {
        let fake = spawn_fake(Behavior::Succeed).await;
        let tmp = tempfile::tempdir().unwrap();
        let source = staged(&tmp).await;

        let bytes = optimizer_for(&fake, Duration::from_secs(5))
            .optimize(&source)
            .await
            .unwrap();

        assert_eq!(bytes, jpeg_bytes(70, 70));
        assert_eq!(fake.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let fake = spawn_fake(Behavior::Unauthorized).await;
        let tmp = tempfile::tempdir().unwrap();
        let source = staged(&tmp).await;

        let err = optimizer_for(&fake, Duration::from_secs(5))
            .optimize(&source)
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_missing_output_url_fails() {
        let fake = spawn_fake(Behavior::NoOutputUrl).await;
        let tmp = tempfile::tempdir().unwrap();
        let source = staged(&tmp).await;

        let err = optimizer_for(&fake, Duration::from_secs(5))
            .optimize(&source)
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::MissingOutput));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let fake = spawn_fake(Behavior::Slow).await;
        let tmp = tempfile::tempdir().unwrap();
        let source = staged(&tmp).await;

        let err = optimizer_for(&fake, Duration::from_millis(200))
            .optimize(&source)
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::Timeout(_)));
    }
}
