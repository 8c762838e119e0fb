use super::{GatewayError, IMAGE_UPLOADER, VIDEO_CHECKER, send_json};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ImageUploadRequest<'a> {
    photo_links: &'a [String],
}

#[derive(Debug, Serialize)]
struct VideoCheckRequest<'a> {
    #[serde(rename = "video-link")]
    video_link: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageBatch {
    #[serde(default)]
    pub processed_images: Vec<Value>,
}

impl ImageBatch {
    /// Ids of the processed images, in upload order. Entries without an integer id are skipped.
    pub fn image_ids(&self) -> Vec<i64> {
        self.processed_images
            .iter()
            .filter_map(|image| image.get("id").and_then(Value::as_i64))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoVerdict {
    #[serde(default)]
    pub is_forbidden: Option<bool>,
    #[serde(default)]
    pub id: Option<i64>,
}

impl VideoVerdict {
    pub fn forbidden(&self) -> bool {
        self.is_forbidden.unwrap_or(false)
    }

    pub fn accepted_id(&self) -> Option<i64> {
        if self.forbidden() { None } else { self.id }
    }
}

pub async fn process_images(
    client: &Client,
    url: &str,
    photo_links: &[String],
) -> Result<ImageBatch, GatewayError> {
    let request = client.post(url).json(&ImageUploadRequest { photo_links });
    send_json(IMAGE_UPLOADER, url, request).await
}

pub async fn check_video(
    client: &Client,
    url: &str,
    video_link: &str,
) -> Result<VideoVerdict, GatewayError> {
    let request = client.post(url).json(&VideoCheckRequest { video_link });
    send_json(VIDEO_CHECKER, url, request).await
}
