//! Service errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cluster_client::ClusterError;
use pod_watch::WatchError;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Watch(WatchError::Connectivity(_)) | ServerError::Cluster(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServerError::Watch(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidConfig(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!("Request failed with {}: {}", status, self);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
