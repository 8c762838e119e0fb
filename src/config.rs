use std::env;

const DEFAULT_SMART_UPLOADER_URL: &str = "https://smart-uploader.basalam.dev/process-images";
const DEFAULT_VIDEO_CHECK_URL: &str = "https://dwh-n8n.basalam.dev/webhook-test/Video-Check";
const DEFAULT_DESCRIPTION_SERVICE_URL: &str =
    "https://request-maker.basalam.dev/api/v1/generate-description";
const DEFAULT_BASALAM_CORE_URL: &str = "https://core.basalam.com";

/// Downstream service locations plus the client timeouts applied to every call.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub smart_uploader_url: String,
    pub video_check_url: String,
    pub description_service_url: String,
    pub basalam_core_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl ServiceEndpoints {
    pub fn from_env() -> Self {
        Self {
            smart_uploader_url: env_or("SMART_UPLOADER_URL", DEFAULT_SMART_UPLOADER_URL),
            video_check_url: env_or("VIDEO_CHECK_URL", DEFAULT_VIDEO_CHECK_URL),
            description_service_url: env_or(
                "DESCRIPTION_SERVICE_URL",
                DEFAULT_DESCRIPTION_SERVICE_URL,
            ),
            basalam_core_url: env_or("BASALAM_CORE_URL", DEFAULT_BASALAM_CORE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: env_secs("HTTP_TIMEOUT_SECS", 60),
            connect_timeout_secs: env_secs("HTTP_CONNECT_TIMEOUT_SECS", 10),
        }
    }

    pub fn user_info_url(&self) -> String {
        format!("{}/v3/users/me", self.basalam_core_url)
    }

    pub fn vendor_products_url(&self, vendor_id: i64) -> String {
        format!("{}/v3/vendors/{vendor_id}/products", self.basalam_core_url)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_secs(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Optional shared secret; unset or blank disables the gate.
pub fn secret_from_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn port_from_env() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000)
}

pub fn body_limit_from_env() -> usize {
    env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}
