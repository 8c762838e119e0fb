use super::{GatewayError, PRODUCT_SUBMISSION, USER_INFO, send_json};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub vendor: Option<VendorRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorRef {
    #[serde(default)]
    pub id: Option<i64>,
}

impl UserInfo {
    /// Vendor id of the account, if the user owns a booth.
    pub fn vendor_id(&self) -> Option<i64> {
        self.vendor
            .as_ref()
            .and_then(|vendor| vendor.id)
            .filter(|id| *id != 0)
    }
}

pub async fn fetch_user_info(
    client: &Client,
    url: &str,
    access_token: &str,
) -> Result<UserInfo, GatewayError> {
    let request = client.get(url).bearer_auth(access_token);
    send_json(USER_INFO, url, request).await
}

pub async fn submit_product(
    client: &Client,
    url: &str,
    access_token: &str,
    draft: &Map<String, Value>,
) -> Result<Value, GatewayError> {
    let request = client.post(url).bearer_auth(access_token).json(draft);
    send_json(PRODUCT_SUBMISSION, url, request).await
}
