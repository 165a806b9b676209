//! # Server Configuration
//!
//! Application state, router and server lifecycle for the alumni API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{ip_block_guard, resolve_user};
use crate::config::AppConfig;
use crate::handlers::{
    self, ab_tests, auth, circles, federation, homepage, jobs, posts, security, timeline, webhooks,
};
use crate::services::{
    AbTestingService, FederationBridge, MatchingService, PersonalizationService,
    ScheduledPostPublisher, SecurityService, TimelineService, WebhookService,
};
use crate::telemetry::trace_id_middleware;
use crate::tenancy::{TenantResolver, resolve_tenant};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub tenants: Arc<TenantResolver>,
    pub timeline: Arc<TimelineService>,
    pub matching: Arc<MatchingService>,
    pub ab_testing: Arc<AbTestingService>,
    pub personalization: Arc<PersonalizationService>,
    pub security: Arc<SecurityService>,
    pub webhooks: Arc<WebhookService>,
    pub federation: Arc<FederationBridge>,
}

impl AppState {
    /// Wires every service onto one connection pool.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<Self> {
        let ab_testing = Arc::new(AbTestingService::new(db.clone(), &config.ab_testing));
        let webhooks = WebhookService::new(
            db.clone(),
            config.webhooks.clone(),
            config.is_development(),
        )
        .context("Failed to build webhook HTTP client")?;

        Ok(Self {
            tenants: Arc::new(TenantResolver::new(db.clone(), config.base_domain.clone())),
            timeline: Arc::new(TimelineService::new(db.clone(), config.timeline.clone())),
            matching: Arc::new(MatchingService::new(db.clone(), config.matching.clone())),
            personalization: Arc::new(PersonalizationService::new(
                db.clone(),
                Arc::clone(&ab_testing),
            )),
            security: Arc::new(SecurityService::new(db.clone(), config.security.clone())),
            webhooks: Arc::new(webhooks),
            federation: Arc::new(FederationBridge::new(&config.federation)),
            ab_testing,
            config,
            db,
        })
    }

    /// Publisher sharing this state's timeline cache and webhook client.
    pub fn publisher(&self) -> ScheduledPostPublisher {
        ScheduledPostPublisher::new(
            self.db.clone(),
            self.config.publisher.clone(),
            Arc::clone(&self.timeline),
            Arc::clone(&self.webhooks),
        )
    }
}

/// Routes under `/api/v1`, all tenant-scoped.
fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/me/skills", put(auth::update_skills))
        .route("/timeline", get(timeline::get_timeline))
        .route("/posts", post(posts::create_post))
        .route("/posts/{id}", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/{id}/engagements", post(posts::engage))
        .route(
            "/circles",
            get(circles::list_my_circles).post(circles::create_circle),
        )
        .route("/circles/{id}/join", post(circles::join_circle))
        .route("/circles/{id}/leave", post(circles::leave_circle))
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/recommended", get(jobs::recommended_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/close", post(jobs::close_job))
        .route("/jobs/{id}/candidates", get(jobs::job_candidates))
        .route("/jobs/{id}/refresh-matches", post(jobs::refresh_matches))
        .route(
            "/ab-tests",
            get(ab_tests::list_tests).post(ab_tests::create_test),
        )
        .route("/ab-tests/{id}/status", put(ab_tests::update_status))
        .route("/ab-tests/{id}/results", get(ab_tests::test_results))
        .route("/experiments/{name}/assignment", get(ab_tests::assignment))
        .route("/experiments/{name}/conversions", post(ab_tests::convert))
        .route("/homepage", get(homepage::homepage))
        .route("/homepage/cta-click", post(homepage::cta_click))
        .route("/security/blocks", get(security::list_blocks))
        .route("/security/blocks/{ip}", delete(security::unblock_ip))
        .route(
            "/webhooks",
            get(webhooks::list_webhooks).post(webhooks::create_webhook),
        )
        .route("/webhooks/{id}", delete(webhooks::delete_webhook))
        .route("/webhooks/{id}/test", post(webhooks::test_webhook))
        .route("/webhooks/{id}/deliveries", get(webhooks::list_deliveries))
        .route("/federation/users/{id}", get(federation::actor))
        .route("/federation/users/{id}/outbox", get(federation::outbox))
        .route("/federation/posts/{id}", get(federation::note))
        .route(
            "/federation/posts/{id}/activity",
            get(federation::create_activity),
        )
        .route("/federation/posts/{id}/matrix", get(federation::matrix_event))
        // Layers run outermost-last: IP guard, then tenant, then user.
        .layer(from_fn_with_state(state.clone(), resolve_user))
        .layer(from_fn_with_state(state.clone(), resolve_tenant))
        .layer(from_fn_with_state(state.clone(), ip_block_guard))
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes(&state))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Starts the server and the scheduled post publisher; both stop on Ctrl-C.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config.bind_addr().context("Invalid server address")?;
    let state = AppState::new(Arc::new(config), db)?;

    let shutdown = CancellationToken::new();
    let publisher = tokio::spawn(state.publisher().run(shutdown.child_token()));

    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    })
    .await
    .context("Server error")?;

    shutdown.cancel();
    if let Err(err) = publisher.await {
        tracing::error!(error = %err, "Publisher task ended abnormally");
    }

    Ok(())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::update_skills,
        crate::handlers::timeline::get_timeline,
        crate::handlers::posts::create_post,
        crate::handlers::posts::get_post,
        crate::handlers::posts::delete_post,
        crate::handlers::posts::engage,
        crate::handlers::circles::create_circle,
        crate::handlers::circles::list_my_circles,
        crate::handlers::circles::join_circle,
        crate::handlers::circles::leave_circle,
        crate::handlers::jobs::create_job,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::close_job,
        crate::handlers::jobs::recommended_jobs,
        crate::handlers::jobs::job_candidates,
        crate::handlers::jobs::refresh_matches,
        crate::handlers::ab_tests::create_test,
        crate::handlers::ab_tests::list_tests,
        crate::handlers::ab_tests::update_status,
        crate::handlers::ab_tests::test_results,
        crate::handlers::ab_tests::assignment,
        crate::handlers::ab_tests::convert,
        crate::handlers::homepage::homepage,
        crate::handlers::homepage::cta_click,
        crate::handlers::security::list_blocks,
        crate::handlers::security::unblock_ip,
        crate::handlers::webhooks::create_webhook,
        crate::handlers::webhooks::list_webhooks,
        crate::handlers::webhooks::delete_webhook,
        crate::handlers::webhooks::test_webhook,
        crate::handlers::webhooks::list_deliveries,
        crate::handlers::federation::actor,
        crate::handlers::federation::outbox,
        crate::handlers::federation::note,
        crate::handlers::federation::create_activity,
        crate::handlers::federation::matrix_event,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and profile"),
        (name = "timeline", description = "Ranked, paginated timeline"),
        (name = "posts", description = "Posts and engagement"),
        (name = "circles", description = "Circles and groups"),
        (name = "jobs", description = "Job postings and skill matching"),
        (name = "ab_tests", description = "A/B tests and variant assignment"),
        (name = "homepage", description = "Personalised homepage"),
        (name = "security", description = "Login throttling administration"),
        (name = "webhooks", description = "Outbound webhooks"),
        (name = "federation", description = "ActivityPub and Matrix views")
    ),
    info(
        title = "Alumni Engagement API",
        description = "Multi-tenant alumni networking: timeline, circles, jobs, experiments and integrations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
