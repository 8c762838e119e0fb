use crate::config::ServiceEndpoints;
use crate::http::build_client;
use crate::models::{OrchestrationResponse, WebhookPayload};
use crate::services::GatewayError;
use serde_json::{Map, Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const PREPARATION_DAYS: i64 = 1;
/// Basalam unit id for "piece".
pub const UNIT_TYPE: i64 = 6304;
pub const UNIT_QUANTITY: i64 = 1;

const SUCCESS_MESSAGE: &str = "Product orchestrated and submitted successfully.";

#[derive(Clone)]
pub struct Pipeline {
    pub endpoints: Arc<ServiceEndpoints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorContext {
    pub vendor_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResult {
    pub image_ids: Vec<i64>,
    pub video_id: Option<i64>,
}

impl Pipeline {
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ServiceEndpoints::from_env())
    }

    /// Runs vendor lookup, media processing, draft generation and submission for one webhook.
    ///
    /// The HTTP client lives for the duration of this call only. The first failing stage
    /// ends the run; earlier stages are not undone.
    pub async fn run(&self, payload: WebhookPayload) -> Result<OrchestrationResponse, PipelineError> {
        let run_id = Uuid::new_v4();
        let client = build_client(&self.endpoints)
            .map_err(|err| PipelineError::internal("http_client", err.to_string()))?;
        let endpoints = self.endpoints.as_ref();
        info!(
            target = "orchestrator.pipeline",
            %run_id,
            photos = payload.photo_links().len(),
            has_video = payload.video_link().is_some(),
            "orchestration_started"
        );

        let vendor = self
            .capture_stage(
                run_id,
                stages::RESOLVE_VENDOR,
                stages::resolve_vendor(&client, endpoints, &payload.access_token),
            )
            .await?;

        let media = self
            .capture_stage(
                run_id,
                stages::PROCESS_MEDIA,
                stages::process_media(
                    &client,
                    endpoints,
                    payload.photo_links(),
                    payload.video_link(),
                ),
            )
            .await?;

        let draft = self
            .capture_stage(
                run_id,
                stages::GENERATE_DRAFT,
                stages::generate_draft(&client, endpoints, payload.description()),
            )
            .await?;

        let draft = merge_media(draft, vendor, &media, payload.stock());
        info!(target = "orchestrator.pipeline", %run_id, vendor_id = vendor.vendor_id, "final_payload_ready");

        let receipt = self
            .capture_stage(
                run_id,
                stages::SUBMIT_PRODUCT,
                stages::submit_product(&client, endpoints, vendor, &payload.access_token, &draft),
            )
            .await?;

        info!(target = "orchestrator.pipeline", %run_id, vendor_id = vendor.vendor_id, "orchestration_completed");
        Ok(OrchestrationResponse {
            status: "success",
            message: SUCCESS_MESSAGE.to_string(),
            submitted_payload: draft,
            basalam_response: receipt,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        run_id: Uuid,
        name: &'static str,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed_ms = started.elapsed().as_millis();
        crate::telemetry::record_stage(name, elapsed_ms, result.is_err());
        if let Err(err) = &result {
            warn!(
                target = "orchestrator.pipeline",
                %run_id,
                stage = name,
                kind = ?err.kind(),
                elapsed_ms = elapsed_ms as u64,
                error = %err,
                "stage_failed"
            );
        }
        result
    }
}

/// Injects media ids, vendor and inventory defaults into the generated draft.
pub fn merge_media(
    mut draft: Map<String, Value>,
    vendor: VendorContext,
    media: &MediaResult,
    stock: i64,
) -> Map<String, Value> {
    if let Some((first, rest)) = media.image_ids.split_first() {
        draft.insert("photo".into(), json!(first));
        draft.insert("photos".into(), json!(rest));
    }
    match media.video_id {
        Some(video_id) => {
            draft.insert("video".into(), json!(video_id));
        }
        None => {
            draft.remove("video");
        }
    }
    draft.insert("vendor_id".into(), json!(vendor.vendor_id));
    draft.insert("preparation_days".into(), json!(PREPARATION_DAYS));
    draft.insert("stock".into(), json!(stock));
    draft.insert("unit_type".into(), json!(UNIT_TYPE));
    draft.insert("unit_quantity".into(), json!(UNIT_QUANTITY));
    draft
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    Authentication,
    InvalidInput,
    BadGateway,
    GatewayTimeout,
    Internal,
}

impl PipelineError {
    fn new(stage: &'static str, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn authentication(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::Authentication, message)
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::InvalidInput, message)
    }

    pub fn bad_gateway(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::BadGateway, message)
    }

    pub fn gateway_timeout(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::GatewayTimeout, message)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::Internal, message)
    }

    /// Default translation of a downstream failure. Stages with special status handling
    /// match on the error themselves first.
    fn from_gateway(stage: &'static str, err: &GatewayError, status_prefix: &str) -> Self {
        match err {
            GatewayError::Transport { url, .. } => {
                Self::gateway_timeout(stage, format!("Network error for {url}"))
            }
            GatewayError::Status { body, .. } => {
                Self::bad_gateway(stage, format!("{status_prefix}: {body}"))
            }
            GatewayError::Decode { service, url, .. } => Self::internal(
                stage,
                format!("Received invalid payload from {service} at {url}"),
            ),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

pub mod stages {
    use super::*;
    use crate::services::{basalam, description, media};
    use reqwest::Client;

    pub const RESOLVE_VENDOR: &str = "resolve_vendor";
    pub const PROCESS_MEDIA: &str = "process_media";
    pub const GENERATE_DRAFT: &str = "generate_draft";
    pub const SUBMIT_PRODUCT: &str = "submit_product";

    pub async fn resolve_vendor(
        client: &Client,
        endpoints: &ServiceEndpoints,
        access_token: &str,
    ) -> Result<VendorContext, PipelineError> {
        let url = endpoints.user_info_url();
        info!(target = "orchestrator.pipeline", url = %url, "fetching_user_info");
        let user = basalam::fetch_user_info(client, &url, access_token)
            .await
            .map_err(|err| match err {
                GatewayError::Status { body, .. } => {
                    PipelineError::authentication(RESOLVE_VENDOR, format!("Authentication failed: {body}"))
                }
                other => PipelineError::from_gateway(RESOLVE_VENDOR, &other, "Authentication failed"),
            })?;

        let Some(vendor_id) = user.vendor_id() else {
            warn!(target = "orchestrator.pipeline", "vendor_missing");
            return Err(PipelineError::invalid_input(
                RESOLVE_VENDOR,
                "User does not have a valid vendor account.",
            ));
        };
        info!(target = "orchestrator.pipeline", vendor_id, "vendor_resolved");
        Ok(VendorContext { vendor_id })
    }

    /// Uploads images and, when a link is given, checks the video. Both calls run
    /// concurrently and are joined before any result is inspected.
    pub async fn process_media(
        client: &Client,
        endpoints: &ServiceEndpoints,
        photo_links: &[String],
        video_link: Option<&str>,
    ) -> Result<MediaResult, PipelineError> {
        info!(
            target = "orchestrator.pipeline",
            url = %endpoints.smart_uploader_url,
            photos = photo_links.len(),
            "calling_image_uploader"
        );
        let images = media::process_images(client, &endpoints.smart_uploader_url, photo_links);
        let video = async {
            match video_link {
                Some(link) => {
                    info!(target = "orchestrator.pipeline", url = %endpoints.video_check_url, "calling_video_checker");
                    Some(media::check_video(client, &endpoints.video_check_url, link).await)
                }
                None => {
                    info!(target = "orchestrator.pipeline", "no_video_link");
                    None
                }
            }
        };
        let (images, video) = tokio::join!(images, video);

        // Network failures win over HTTP rejections, uploader before checker.
        let transport = [
            images.as_ref().err(),
            video.as_ref().and_then(|result| result.as_ref().err()),
        ];
        if let Some(err) = transport
            .into_iter()
            .flatten()
            .find(|err| matches!(err, GatewayError::Transport { .. }))
        {
            return Err(media_failure(err));
        }

        let batch = images.map_err(|err| media_failure(&err))?;
        let image_ids = batch.image_ids();
        if image_ids.is_empty() {
            warn!(target = "orchestrator.pipeline", "uploader_returned_no_ids");
            return Err(PipelineError::invalid_input(
                PROCESS_MEDIA,
                "Uploader service returned no valid image IDs.",
            ));
        }
        info!(target = "orchestrator.pipeline", count = image_ids.len(), "images_processed");

        let video_id = match video {
            Some(result) => {
                let verdict = result.map_err(|err| media_failure(&err))?;
                if verdict.forbidden() {
                    warn!(target = "orchestrator.pipeline", "video_forbidden");
                    None
                } else {
                    let id = verdict.accepted_id();
                    info!(target = "orchestrator.pipeline", video_id = ?id, "video_accepted");
                    id
                }
            }
            None => None,
        };

        Ok(MediaResult {
            image_ids,
            video_id,
        })
    }

    fn media_failure(err: &GatewayError) -> PipelineError {
        warn!(target = "orchestrator.pipeline", service = err.service(), error = %err, "media_service_failed");
        match err {
            GatewayError::Status { url, body, .. } => PipelineError::bad_gateway(
                PROCESS_MEDIA,
                format!("Error from media service {url}: {body}"),
            ),
            other => PipelineError::from_gateway(PROCESS_MEDIA, other, "Error from media service"),
        }
    }

    pub async fn generate_draft(
        client: &Client,
        endpoints: &ServiceEndpoints,
        raw_text: &str,
    ) -> Result<Map<String, Value>, PipelineError> {
        let url = endpoints.description_service_url.as_str();
        info!(target = "orchestrator.pipeline", url, "calling_description_service");
        let reply = description::generate_description(client, url, raw_text)
            .await
            .map_err(|err| {
                PipelineError::from_gateway(GENERATE_DRAFT, &err, "Error from Description service")
            })?;

        reply.into_draft().ok_or_else(|| {
            warn!(target = "orchestrator.pipeline", "description_data_missing");
            PipelineError::internal(
                GENERATE_DRAFT,
                "Received invalid payload from description service.",
            )
        })
    }

    pub async fn submit_product(
        client: &Client,
        endpoints: &ServiceEndpoints,
        vendor: VendorContext,
        access_token: &str,
        draft: &Map<String, Value>,
    ) -> Result<Value, PipelineError> {
        let url = endpoints.vendor_products_url(vendor.vendor_id);
        info!(target = "orchestrator.pipeline", url = %url, "submitting_product");
        basalam::submit_product(client, &url, access_token, draft)
            .await
            .map_err(|err| {
                PipelineError::from_gateway(
                    SUBMIT_PRODUCT,
                    &err,
                    "Final submission to Basalam API failed",
                )
            })
    }
}
