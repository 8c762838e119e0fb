pub mod basalam;
pub mod description;
pub mod media;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info};

pub const USER_INFO: &str = "user_info";
pub const IMAGE_UPLOADER: &str = "image_uploader";
pub const VIDEO_CHECKER: &str = "video_checker";
pub const DESCRIPTION_SERVICE: &str = "description_service";
pub const PRODUCT_SUBMISSION: &str = "product_submission";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error for {url}: {message}")]
    Transport {
        service: &'static str,
        url: String,
        message: String,
    },
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        service: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid response from {url}: {message}")]
    Decode {
        service: &'static str,
        url: String,
        message: String,
    },
}

impl GatewayError {
    pub fn service(&self) -> &'static str {
        match self {
            GatewayError::Transport { service, .. }
            | GatewayError::Status { service, .. }
            | GatewayError::Decode { service, .. } => service,
        }
    }
}

/// Sends `request`, rejects non-2xx answers and decodes the JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    url: &str,
    request: RequestBuilder,
) -> Result<T, GatewayError> {
    let response = request.send().await.map_err(|err| {
        error!(target = "orchestrator.gateway", service, url, error = %err, "transport_error");
        GatewayError::Transport {
            service,
            url: url.to_string(),
            message: err.to_string(),
        }
    })?;

    let status = response.status();
    info!(target = "orchestrator.gateway", service, url, status = status.as_u16(), "response_received");

    let body = response.text().await.map_err(|err| GatewayError::Transport {
        service,
        url: url.to_string(),
        message: err.to_string(),
    })?;

    if !status.is_success() {
        error!(
            target = "orchestrator.gateway",
            service,
            url,
            status = status.as_u16(),
            body = %body,
            "downstream_rejected"
        );
        return Err(GatewayError::Status {
            service,
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| {
        error!(target = "orchestrator.gateway", service, url, body = %body, "invalid_json");
        GatewayError::Decode {
            service,
            url: url.to_string(),
            message: err.to_string(),
        }
    })
}
