//! # Federation
//!
//! Maps users and posts onto ActivityPub and Matrix shapes. Pure data
//! translation; nothing here talks to a remote server.

pub mod activitypub;
pub mod matrix;

use chrono::{SecondsFormat, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::config::FederationConfig;
use crate::models::{post, tenant};

pub use activitypub::ActivityPubMapper;
pub use matrix::MatrixEventMapper;

pub struct FederationBridge {
    base_url: String,
    matrix_server_name: String,
}

impl FederationBridge {
    pub fn new(config: &FederationConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            matrix_server_name: config.matrix_server_name.clone(),
        }
    }

    /// `<base url>/tenants/<slug>`
    pub fn tenant_root(&self, tenant: &tenant::Model) -> String {
        format!("{}/tenants/{}", self.base_url, tenant.slug)
    }

    pub fn matrix_server_name(&self) -> &str {
        &self.matrix_server_name
    }

    pub fn activitypub(&self) -> ActivityPubMapper<'_> {
        ActivityPubMapper::new(self)
    }

    pub fn matrix(&self) -> MatrixEventMapper<'_> {
        MatrixEventMapper::new(self)
    }

    /// Only published, live, public posts leave the tenant.
    pub fn is_federatable(post: &post::Model) -> bool {
        post.is_published() && post.is_public()
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(crate) fn rfc3339(at: DateTimeWithTimeZone) -> String {
    at.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
