//! Registration, login, token lifecycle and login throttling through the
//! real router.

mod test_utils;

use alumni::models::timestamp_now;
use alumni::models::user::Role;
use alumni::repositories::SecurityRepository;
use alumni::services::security::FailureOutcome;
use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;
use test_utils::{TestRequest, create_tenant, create_user, issue_token, send, test_app};

const ATTACKER_IP: &str = "203.0.113.7";

#[tokio::test]
async fn register_login_and_logout_round() {
    let (db, _state, app) = test_app().await.unwrap();
    create_tenant(&db, "state-u").await.unwrap();

    let registered = send(
        &app,
        TestRequest::post("/api/v1/auth/register", "state-u").json(json!({
            "name": "Ada Lovelace",
            "email": "Ada@Example.edu",
            "password": "analytical-engine",
            "skills": ["Rust", " rust ", "SQL"]
        })),
    )
    .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["user"]["email"], "ada@example.edu");
    assert_eq!(registered.body["user"]["role"], "alumni");
    assert_eq!(registered.body["token_type"], "Bearer");

    let login = send(
        &app,
        TestRequest::post("/api/v1/auth/login", "state-u").json(json!({
            "email": "ada@example.edu",
            "password": "analytical-engine"
        })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    let token = login.body["token"].as_str().unwrap().to_string();

    let me = send(&app, TestRequest::get("/api/v1/me", "state-u").token(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["name"], "Ada Lovelace");

    let logout = send(
        &app,
        TestRequest::post("/api/v1/auth/logout", "state-u").token(&token),
    )
    .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let after = send(&app, TestRequest::get("/api/v1/me", "state-u").token(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_validates_input() {
    let (db, _state, app) = test_app().await.unwrap();
    create_tenant(&db, "state-u").await.unwrap();

    let response = send(
        &app,
        TestRequest::post("/api/v1/auth/register", "state-u").json(json!({
            "name": "Mallory",
            "email": "not-an-email",
            "password": "short",
            "role": "admin"
        })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["code"], "VALIDATION_FAILED");
    let details = &response.body["details"];
    assert!(details.get("email").is_some());
    assert!(details.get("password").is_some());
    assert!(details.get("role").is_some());
}

#[tokio::test]
async fn guests_are_rejected_from_protected_routes() {
    let (db, _state, app) = test_app().await.unwrap();
    create_tenant(&db, "state-u").await.unwrap();

    let response = send(&app, TestRequest::get("/api/v1/me", "state-u")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let bad_token = send(
        &app,
        TestRequest::get("/api/v1/me", "state-u").token("not-a-real-token"),
    )
    .await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn updating_skills_replaces_the_list() {
    let (db, _state, app) = test_app().await.unwrap();
    let tenant = create_tenant(&db, "state-u").await.unwrap();
    let user = create_user(&db, tenant.id, "grace@example.edu", Role::Alumni, &["cobol"])
        .await
        .unwrap();
    let token = issue_token(&db, &user).await.unwrap();

    let response = send(
        &app,
        TestRequest::new(Method::PUT, "/api/v1/me/skills", "state-u")
            .token(&token)
            .json(json!({ "skills": ["Rust", "Distributed Systems"] })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["data"]["skills"],
        json!(["Rust", "Distributed Systems"])
    );
}

#[tokio::test]
async fn repeated_failed_logins_block_the_ip_until_an_admin_unblocks_it() {
    let (db, _state, app) = test_app().await.unwrap();
    let tenant = create_tenant(&db, "state-u").await.unwrap();
    let admin = create_user(&db, tenant.id, "admin@example.edu", Role::Admin, &[])
        .await
        .unwrap();
    let admin_token = issue_token(&db, &admin).await.unwrap();

    let attempt = || {
        TestRequest::post("/api/v1/auth/login", "state-u")
            .header("x-forwarded-for", ATTACKER_IP)
            .json(json!({ "email": "nobody@example.edu", "password": "guess-guess" }))
    };

    for _ in 0..4 {
        let response = send(&app, attempt()).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let fifth = send(&app, attempt()).await;
    assert_eq!(fifth.status, StatusCode::FORBIDDEN);
    assert_eq!(fifth.body["code"], "IP_BLOCKED");
    assert!(fifth.body["retry_after"].as_u64().unwrap() > 0);

    let blocked = send(
        &app,
        TestRequest::get("/api/v1/homepage", "state-u").header("x-forwarded-for", ATTACKER_IP),
    )
    .await;
    assert_eq!(blocked.status, StatusCode::FORBIDDEN);
    assert_eq!(blocked.body["code"], "IP_BLOCKED");
    assert!(blocked.headers.get("retry-after").is_some());

    let blocks = send(
        &app,
        TestRequest::get("/api/v1/security/blocks", "state-u").token(&admin_token),
    )
    .await;
    assert_eq!(blocks.status, StatusCode::OK);
    assert_eq!(blocks.body["data"][0]["ip_address"], ATTACKER_IP);

    let unblock = send(
        &app,
        TestRequest::new(
            Method::DELETE,
            &format!("/api/v1/security/blocks/{ATTACKER_IP}"),
            "state-u",
        )
        .token(&admin_token),
    )
    .await;
    assert_eq!(unblock.status, StatusCode::NO_CONTENT);

    let allowed = send(
        &app,
        TestRequest::get("/api/v1/homepage", "state-u").header("x-forwarded-for", ATTACKER_IP),
    )
    .await;
    assert_eq!(allowed.status, StatusCode::OK);

    // The unblock starts the count afresh: one more typo is just a 401.
    let typo = send(&app, attempt()).await;
    assert_eq!(typo.status, StatusCode::UNAUTHORIZED);
    assert!(typo.body.get("retry_after").is_none());
}

#[tokio::test]
async fn login_without_a_password_names_the_missing_field() {
    let (db, _state, app) = test_app().await.unwrap();
    create_tenant(&db, "state-u").await.unwrap();

    let response = send(
        &app,
        TestRequest::post("/api/v1/auth/login", "state-u")
            .json(json!({ "email": "ada@example.edu" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["code"], "VALIDATION_FAILED");
    assert_eq!(
        response.body["details"]["password"][0],
        "The password field is required."
    );
}

#[tokio::test]
async fn only_admins_manage_blocks() {
    let (db, _state, app) = test_app().await.unwrap();
    let tenant = create_tenant(&db, "state-u").await.unwrap();
    let alumni = create_user(&db, tenant.id, "ada@example.edu", Role::Alumni, &[])
        .await
        .unwrap();
    let token = issue_token(&db, &alumni).await.unwrap();

    let response = send(
        &app,
        TestRequest::get("/api/v1/security/blocks", "state-u").token(&token),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failures_outside_the_window_do_not_count() {
    let (db, state, app) = test_app().await.unwrap();
    let tenant = create_tenant(&db, "state-u").await.unwrap();
    let ip = "198.51.100.4";

    let stale = timestamp_now() - Duration::minutes(state.config.security.window_minutes + 5);
    let security = SecurityRepository::new(&db);
    for _ in 0..4 {
        security
            .record_failure(Some(tenant.id), ip, "nobody@example.edu", stale)
            .await
            .unwrap();
    }

    let attempt = || {
        TestRequest::post("/api/v1/auth/login", "state-u")
            .header("x-forwarded-for", ip)
            .json(json!({ "email": "nobody@example.edu", "password": "guess-guess" }))
    };

    for _ in 0..4 {
        assert_eq!(send(&app, attempt()).await.status, StatusCode::UNAUTHORIZED);
    }
    let fifth = send(&app, attempt()).await;
    assert_eq!(fifth.status, StatusCode::FORBIDDEN);
    assert_eq!(fifth.body["code"], "IP_BLOCKED");
}

#[tokio::test]
async fn tripping_the_threshold_again_extends_a_block() {
    let (db, state, _app) = test_app().await.unwrap();
    let ip = "198.51.100.9";

    let security = SecurityRepository::new(&db);
    security
        .upsert_block(ip, "manual", timestamp_now() + Duration::minutes(1))
        .await
        .unwrap();

    let mut outcome = None;
    for _ in 0..state.config.security.max_failed_attempts {
        outcome = Some(
            state
                .security
                .record_failed_login(None, ip, "nobody@example.edu")
                .await
                .unwrap(),
        );
    }

    let block_seconds = (state.config.security.block_minutes * 60) as u64;
    match outcome {
        Some(FailureOutcome::Blocked {
            retry_after_seconds,
        }) => assert!(retry_after_seconds > block_seconds - 60),
        other => panic!("expected a block, got {other:?}"),
    }

    let block = security.find_block(ip).await.unwrap().unwrap();
    assert!(
        block.blocked_until
            > timestamp_now() + Duration::minutes(state.config.security.block_minutes - 1)
    );
}
