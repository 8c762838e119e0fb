use crate::config::ServiceEndpoints;
use reqwest::Client;
use std::time::Duration;

/// Client carrying the uniform per-call timeout. A builder failure is returned, never replaced
/// by an unconfigured client.
pub fn build_client(endpoints: &ServiceEndpoints) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(endpoints.timeout_secs))
        .connect_timeout(Duration::from_secs(endpoints.connect_timeout_secs))
        .build()
}
