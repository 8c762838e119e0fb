use super::{DESCRIPTION_SERVICE, GatewayError, send_json};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
struct DescriptionRequest<'a> {
    raw_text: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionReply {
    #[serde(default)]
    pub data: Option<Value>,
}

impl DescriptionReply {
    /// The product fields generated from the raw text. `None` unless `data` is a non-empty object.
    pub fn into_draft(self) -> Option<Map<String, Value>> {
        match self.data {
            Some(Value::Object(map)) if !map.is_empty() => Some(map),
            _ => None,
        }
    }
}

pub async fn generate_description(
    client: &Client,
    url: &str,
    raw_text: &str,
) -> Result<DescriptionReply, GatewayError> {
    let request = client.post(url).json(&DescriptionRequest { raw_text });
    send_json(DESCRIPTION_SERVICE, url, request).await
}
