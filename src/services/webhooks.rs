//! # Webhook Delivery
//!
//! Signs and POSTs domain events to subscriber URLs, retrying with
//! exponential backoff and recording every delivery.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::error::{FieldErrors, RepositoryError};
use crate::models::webhook::WILDCARD_EVENT;
use crate::models::{post, tenant, timestamp_now, webhook, webhook_delivery};
use crate::repositories::WebhookRepository;
use crate::repositories::webhook::DeliveryRecord;

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_POST_PUBLISHED: &str = "post.published";
pub const EVENT_JOB_POSTED: &str = "job.posted";
pub const EVENT_CIRCLE_JOINED: &str = "circle.joined";
pub const EVENT_WEBHOOK_TEST: &str = "webhook.test";

/// Events a webhook may subscribe to, besides `*`.
pub const KNOWN_EVENTS: &[&str] = &[
    EVENT_POST_PUBLISHED,
    EVENT_JOB_POSTED,
    EVENT_CIRCLE_JOINED,
    EVENT_WEBHOOK_TEST,
];

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const EVENT_HEADER: &str = "x-webhook-event";
pub const DELIVERY_HEADER: &str = "x-webhook-delivery";

const MAX_URL_LEN: usize = 2048;
const SECRET_LEN: usize = 40;
/// Error text kept per delivery
const MAX_ERROR_LEN: usize = 500;

/// `sha256=<hex HMAC-SHA256(secret, body)>`
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// `data` of a `post.published` event.
pub fn post_published_data(post: &post::Model) -> Value {
    json!({
        "post_id": post.id,
        "author_id": post.author_id,
        "circle_id": post.circle_id,
        "visibility": post.visibility,
        "content": post.content,
        "published_at": post.published_at,
    })
}

/// Shortens a URL to `scheme://host` for logs.
fn redacted_target(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|parsed| {
            format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown")
            )
        })
        .unwrap_or_else(|| "[invalid-url]".to_string())
}

pub struct WebhookService {
    db: DatabaseConnection,
    client: Client,
    config: WebhookConfig,
    allow_plain_http: bool,
}

impl WebhookService {
    pub fn new(
        db: DatabaseConnection,
        config: WebhookConfig,
        allow_plain_http: bool,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            db,
            client,
            config,
            allow_plain_http,
        })
    }

    /// Absolute http(s) URL of at most 2048 characters; https only outside
    /// development profiles.
    pub fn validate_url(&self, url: &str, errors: &mut FieldErrors) {
        if url.len() > MAX_URL_LEN {
            errors.add("url", "The url may not be greater than 2048 characters.");
            return;
        }

        let Ok(parsed) = Url::parse(url) else {
            errors.add("url", "The url must be a valid absolute URL.");
            return;
        };

        match parsed.scheme() {
            "https" => {}
            "http" if self.allow_plain_http => {}
            "http" => errors.add("url", "The url must use https."),
            _ => errors.add("url", "The url must use http or https."),
        }

        if parsed.host_str().is_none_or(str::is_empty) {
            errors.add("url", "The url must include a host.");
        }
    }

    pub fn validate_events(events: &[String], errors: &mut FieldErrors) {
        if events.is_empty() {
            errors.add("events", "At least one event is required.");
        }
        for event in events {
            if event != WILDCARD_EVENT && !KNOWN_EVENTS.contains(&event.as_str()) {
                errors.add("events", format!("Unknown event '{event}'."));
            }
        }
    }

    /// Envelope delivered for every event.
    pub fn envelope(event: &str, tenant: &tenant::Model, data: Value) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "event": event,
            "tenant": tenant.slug,
            "occurred_at": timestamp_now(),
            "data": data,
        })
    }

    /// Sends `payload` to one webhook and records the outcome.
    pub async fn deliver(
        &self,
        webhook: &webhook::Model,
        event: &str,
        payload: Value,
    ) -> Result<webhook_delivery::Model, RepositoryError> {
        let outcome = self.send_with_retries(webhook, event, &payload).await;

        if outcome.success {
            metrics::counter!("webhook_deliveries_succeeded_total").increment(1);
        } else {
            metrics::counter!("webhook_deliveries_failed_total").increment(1);
        }

        WebhookRepository::new(&self.db)
            .record_delivery(DeliveryRecord {
                webhook_id: webhook.id,
                event: event.to_string(),
                payload,
                status_code: outcome.status_code,
                success: outcome.success,
                attempts: outcome.attempts,
                error: outcome.error,
            })
            .await
    }

    async fn send_with_retries(
        &self,
        webhook: &webhook::Model,
        event: &str,
        payload: &Value,
    ) -> DeliveryOutcome {
        let target = redacted_target(&webhook.url);
        let delivery_id = payload
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(err) => {
                return DeliveryOutcome::failed(0, None, format!("failed to encode payload: {err}"));
            }
        };
        let signature = sign(&webhook.secret, &body);

        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.backoff_base_ms);
        let mut last = DeliveryOutcome::failed(0, None, "not attempted".to_string());

        for attempt in 1..=max_attempts {
            let result = self
                .client
                .post(&webhook.url)
                .header(CONTENT_TYPE, "application/json")
                .header(USER_AGENT, concat!("alumni-webhooks/", env!("CARGO_PKG_VERSION")))
                .header(EVENT_HEADER, event)
                .header(DELIVERY_HEADER, &delivery_id)
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(
                        webhook_id = %webhook.id,
                        target = %target,
                        event,
                        attempt,
                        "Webhook delivered"
                    );
                    return DeliveryOutcome {
                        status_code: Some(response.status().as_u16()),
                        success: true,
                        attempts: attempt,
                        error: None,
                    };
                }
                Ok(response) => {
                    let status = response.status();
                    tracing::warn!(
                        webhook_id = %webhook.id,
                        target = %target,
                        status = status.as_u16(),
                        attempt,
                        "Webhook endpoint returned an error status"
                    );
                    last = DeliveryOutcome::failed(
                        attempt,
                        Some(status.as_u16()),
                        format!("endpoint responded with {status}"),
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        webhook_id = %webhook.id,
                        target = %target,
                        attempt,
                        error = %err,
                        "Webhook request failed"
                    );
                    last = DeliveryOutcome::failed(attempt, None, err.to_string());
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        tracing::error!(
            webhook_id = %webhook.id,
            target = %target,
            event,
            attempts = max_attempts,
            "Webhook delivery gave up"
        );
        last
    }

    /// Delivers `event` to every subscriber of the tenant on a background task.
    pub fn dispatch(self: &Arc<Self>, tenant: tenant::Model, event: &'static str, data: Value) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = service.deliver_to_subscribers(&tenant, event, data).await {
                tracing::error!(tenant = %tenant.slug, event, error = %err, "Webhook dispatch failed");
            }
        });
    }

    /// Delivers `event` to every subscriber, each under its own delivery id,
    /// and returns the number of deliveries recorded.
    pub async fn deliver_to_subscribers(
        &self,
        tenant: &tenant::Model,
        event: &str,
        data: Value,
    ) -> Result<usize, RepositoryError> {
        let subscribers = WebhookRepository::new(&self.db)
            .subscribers(tenant.id, event)
            .await?;

        let mut recorded = 0;
        for webhook in &subscribers {
            let payload = Self::envelope(event, tenant, data.clone());
            match self.deliver(webhook, event, payload).await {
                Ok(_) => recorded += 1,
                Err(err) => tracing::error!(
                    webhook_id = %webhook.id,
                    event,
                    error = %err,
                    "Failed to record webhook delivery"
                ),
            }
        }

        Ok(recorded)
    }
}

#[derive(Debug, Clone)]
struct DeliveryOutcome {
    status_code: Option<u16>,
    success: bool,
    attempts: u32,
    error: Option<String>,
}

impl DeliveryOutcome {
    fn failed(attempts: u32, status_code: Option<u16>, mut error: String) -> Self {
        if error.len() > MAX_ERROR_LEN {
            let mut cut = MAX_ERROR_LEN;
            while !error.is_char_boundary(cut) {
                cut -= 1;
            }
            error.truncate(cut);
        }
        Self {
            status_code,
            success: false,
            attempts,
            error: Some(error),
        }
    }
}
