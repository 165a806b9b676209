//! # Alumni Engagement Library
//!
//! Multi-tenant alumni networking service: ranked timelines, circles, job
//! matching, A/B-tested personalisation, login throttling, webhooks and
//! federation mappers, served over an axum JSON API.

pub mod auth;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod services;
pub mod telemetry;
pub mod tenancy;
pub use migration;
