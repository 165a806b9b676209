//! Database migrations for the alumni engagement service.
//!
//! Every table is tenant-scoped except `blocked_ips`, which guards the whole
//! deployment.

pub use sea_orm_migration::prelude::*;

mod m2025_01_06_000001_create_tenants;
mod m2025_01_06_000002_create_users;
mod m2025_01_06_000003_create_circles;
mod m2025_01_06_000004_create_posts;
mod m2025_01_13_000001_create_jobs;
mod m2025_01_27_000001_create_security;
mod m2025_02_03_000001_create_webhooks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_06_000001_create_tenants::Migration),
            Box::new(m2025_01_06_000002_create_users::Migration),
            Box::new(m2025_01_06_000003_create_circles::Migration),
            Box::new(m2025_01_06_000004_create_posts::Migration),
            Box::new(m2025_01_13_000001_create_jobs::Migration),
            Box::new(m2025_01_20_000001_create_ab_tests::Migration),
            Box::new(m2025_01_27_000001_create_security::Migration),
            Box::new(m2025_02_03_000001_create_webhooks::Migration),
        ]
    }
}
