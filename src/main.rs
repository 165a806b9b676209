//! # Alumni Engagement API Entry Point
//!
//! `serve` (the default) runs pending migrations and starts the HTTP server;
//! the other subcommands are operator tooling.

use alumni::{
    auth::hash_password,
    config::{AppConfig, ConfigLoader},
    db,
    migration::{Migrator, MigratorTrait},
    models::user::Role,
    repositories::{
        TenantRepository, UserRepository, tenant::CreateTenantRequest, user::CreateUserRequest,
    },
    server::run_server,
    telemetry,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;

#[derive(Debug, Parser)]
#[command(name = "alumni", version, about = "Multi-tenant alumni engagement API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run migrations and start the HTTP server
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Create a tenant
    CreateTenant {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        name: String,
        /// Custom domain serving the tenant
        #[arg(long)]
        domain: Option<String>,
    },
    /// Create a user inside a tenant
    CreateUser {
        /// Tenant slug or UUID
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        /// alumni, employer or admin
        #[arg(long, default_value = "alumni")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    telemetry::init_tracing(&config).context("Failed to initialise tracing")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            migrate(&db).await?;
            run_server(config, db).await
        }
        Command::Migrate => migrate(&db).await,
        Command::CreateTenant { slug, name, domain } => {
            let tenant = TenantRepository::new(&db)
                .create(CreateTenantRequest { slug, name, domain })
                .await?;
            println!("Created tenant {} ({})", tenant.slug, tenant.id);
            Ok(())
        }
        Command::CreateUser {
            tenant,
            email,
            name,
            password,
            role,
        } => create_user(&config, &db, &tenant, email, name, &password, &role).await,
    }
}

async fn migrate(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .context("Failed to apply migrations")?;
    tracing::info!("Migrations applied");
    Ok(())
}

async fn create_user(
    config: &AppConfig,
    db: &DatabaseConnection,
    tenant: &str,
    email: String,
    name: String,
    password: &str,
    role: &str,
) -> Result<()> {
    let role: Role = role.parse().map_err(|err: String| anyhow!(err))?;
    if password.chars().count() < 8 {
        return Err(anyhow!("password must be at least 8 characters"));
    }

    let tenant = TenantRepository::new(db)
        .find_by_identifier(tenant)
        .await?
        .ok_or_else(|| anyhow!("tenant '{tenant}' not found"))?;

    let user = UserRepository::new(db)
        .create(CreateUserRequest {
            tenant_id: tenant.id,
            name,
            email,
            password_hash: hash_password(password)?,
            role,
            skills: Vec::new(),
        })
        .await?;

    println!(
        "Created {} {} in tenant {} (profile {})",
        user.role, user.email, tenant.slug, config.profile
    );
    Ok(())
}
