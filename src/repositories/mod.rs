//! # Repository Layer
//!
//! Repository structs wrapping SeaORM operations. Every tenant-owned table is
//! queried through a `tenant_id` filter.

pub mod circle;
pub mod job;
pub mod post;
pub mod security;
pub mod tenant;
pub mod user;
pub mod webhook;

pub use ab_test::AbTestRepository;
pub use circle::CircleRepository;
pub use job::JobRepository;
pub use post::PostRepository;
pub use security::SecurityRepository;
pub use tenant::TenantRepository;
pub use user::UserRepository;
pub use webhook::WebhookRepository;
