use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound webhook body as delivered by the message relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WebhookPayload {
    pub raw_data_json: RawDataJson,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDataJson {
    pub raw_message: RawMessage,
    pub photos: Vec<String>,
    pub stock: i64,
    #[serde(default)]
    pub video: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub message: String,
}

impl WebhookPayload {
    pub fn description(&self) -> &str {
        &self.raw_data_json.raw_message.message
    }

    pub fn photo_links(&self) -> &[String] {
        &self.raw_data_json.photos
    }

    pub fn video_link(&self) -> Option<&str> {
        self.raw_data_json
            .video
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
    }

    pub fn stock(&self) -> i64 {
        self.raw_data_json.stock
    }

    /// Every media link must be an absolute http(s) URL. A blank `video` is rejected, only `null`
    /// or an absent field means "no video".
    pub fn validate(&self) -> Result<(), String> {
        for link in self.photo_links() {
            check_http_url("photos", link)?;
        }
        if let Some(link) = self.raw_data_json.video.as_deref() {
            check_http_url("video", link.trim())?;
        }
        Ok(())
    }
}

fn check_http_url(field: &str, url: &str) -> Result<(), String> {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        Ok(_) => Err(format!("{field}: unsupported_url_scheme: {url}")),
        Err(_) => Err(format!("{field}: invalid_url: {url}")),
    }
}

/// Body of a successful orchestration.
#[derive(Debug, Serialize, Clone)]
pub struct OrchestrationResponse {
    pub status: &'static str,
    pub message: String,
    pub submitted_payload: Map<String, Value>,
    pub basalam_response: Value,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
