//! A/B test lifecycle, sticky assignment, results and the personalised
//! homepage.

mod test_utils;

use alumni::models::ab_test::Variant;
use alumni::models::user::Role;
use alumni::services::ab_testing::assign_variant;
use axum::Router;
use axum::http::{Method, StatusCode};
use serde_json::{Value, json};
use test_utils::{TestRequest, create_tenant, create_user, issue_token, send, test_app};

async fn admin_token(db: &sea_orm::DatabaseConnection) -> String {
    let tenant = create_tenant(db, "state-u").await.unwrap();
    let admin = create_user(db, tenant.id, "admin@example.edu", Role::Admin, &[])
        .await
        .unwrap();
    issue_token(db, &admin).await.unwrap()
}

async fn create_running_test(app: &Router, token: &str, name: &str, variants: Value) -> String {
    let created = send(
        app,
        TestRequest::post("/api/v1/ab-tests", "state-u")
            .token(token)
            .json(json!({ "name": name, "variants": variants })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["data"]["status"], "draft");
    let id = created.body["data"]["id"].as_str().unwrap().to_string();

    let started = send(
        app,
        TestRequest::new(Method::PUT, &format!("/api/v1/ab-tests/{id}/status"), "state-u")
            .token(token)
            .json(json!({ "status": "running" })),
    )
    .await;
    assert_eq!(started.status, StatusCode::OK);
    assert_eq!(started.body["data"]["status"], "running");

    id
}

fn variant_list(names: &[&str]) -> Vec<Variant> {
    names
        .iter()
        .map(|name| Variant {
            name: name.to_string(),
            weight: 1,
        })
        .collect()
}

#[tokio::test]
async fn sessions_keep_their_variant_and_results_count_once() {
    let (db, _state, app) = test_app().await.unwrap();
    let token = admin_token(&db).await;
    let test_id = create_running_test(
        &app,
        &token,
        "signup_button",
        json!([{ "name": "control" }, { "name": "green" }]),
    )
    .await;

    let expected = assign_variant(
        "signup_button",
        "session:visitor-1",
        &variant_list(&["control", "green"]),
    )
    .unwrap()
    .name
    .clone();

    for _ in 0..3 {
        let assigned = send(
            &app,
            TestRequest::get("/api/v1/experiments/signup_button/assignment", "state-u")
                .header("x-session-id", "visitor-1"),
        )
        .await;
        assert_eq!(assigned.status, StatusCode::OK);
        assert_eq!(assigned.body["data"]["variant"], expected.as_str());
        assert_eq!(assigned.body["data"]["running"], true);
        assert_eq!(
            assigned.headers.get("x-session-id").unwrap().to_str().unwrap(),
            "visitor-1"
        );
    }

    let converted = send(
        &app,
        TestRequest::post("/api/v1/experiments/signup_button/conversions", "state-u")
            .header("x-session-id", "visitor-1")
            .json(json!({ "goal": "signup" })),
    )
    .await;
    assert_eq!(converted.status, StatusCode::OK);
    assert_eq!(converted.body["data"]["recorded"], true);
    assert_eq!(converted.body["data"]["variant"], expected.as_str());

    let results = send(
        &app,
        TestRequest::get(&format!("/api/v1/ab-tests/{test_id}/results"), "state-u")
            .token(&token),
    )
    .await;
    assert_eq!(results.status, StatusCode::OK);
    let rows = results.body["data"]["results"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        if row["variant"] == expected.as_str() {
            assert_eq!(row["exposures"], 1);
            assert_eq!(row["conversions"], 1);
            assert_eq!(row["conversion_rate"], 1.0);
        } else {
            assert_eq!(row["exposures"], 0);
            assert_eq!(row["conversions"], 0);
            assert_eq!(row["conversion_rate"], 0.0);
        }
    }
}

#[tokio::test]
async fn guests_without_a_session_receive_one() {
    let (db, _state, app) = test_app().await.unwrap();
    let token = admin_token(&db).await;
    create_running_test(
        &app,
        &token,
        "pricing_copy",
        json!([{ "name": "control" }, { "name": "short" }]),
    )
    .await;

    let assigned = send(
        &app,
        TestRequest::get("/api/v1/experiments/pricing_copy/assignment", "state-u"),
    )
    .await;
    assert_eq!(assigned.status, StatusCode::OK);
    let session = assigned.body["data"]["session_id"].as_str().unwrap();
    assert!(!session.is_empty());
    assert_eq!(
        assigned.headers.get("x-session-id").unwrap().to_str().unwrap(),
        session
    );
}

#[tokio::test]
async fn stopped_tests_serve_control_and_record_nothing() {
    let (db, _state, app) = test_app().await.unwrap();
    let token = admin_token(&db).await;
    let test_id = create_running_test(
        &app,
        &token,
        "onboarding",
        json!([{ "name": "control" }, { "name": "video", "weight": 5 }]),
    )
    .await;

    let stopped = send(
        &app,
        TestRequest::new(
            Method::PUT,
            &format!("/api/v1/ab-tests/{test_id}/status"),
            "state-u",
        )
        .token(&token)
        .json(json!({ "status": "stopped" })),
    )
    .await;
    assert_eq!(stopped.body["data"]["status"], "stopped");

    let assigned = send(
        &app,
        TestRequest::get("/api/v1/experiments/onboarding/assignment", "state-u")
            .header("x-session-id", "visitor-2"),
    )
    .await;
    assert_eq!(assigned.body["data"]["variant"], "control");
    assert_eq!(assigned.body["data"]["running"], false);

    let converted = send(
        &app,
        TestRequest::post("/api/v1/experiments/onboarding/conversions", "state-u")
            .header("x-session-id", "visitor-2")
            .json(json!({})),
    )
    .await;
    assert_eq!(converted.body["data"]["recorded"], false);

    let results = send(
        &app,
        TestRequest::get(&format!("/api/v1/ab-tests/{test_id}/results"), "state-u")
            .token(&token),
    )
    .await;
    for row in results.body["data"]["results"].as_array().unwrap() {
        assert_eq!(row["exposures"], 0);
        assert_eq!(row["conversions"], 0);
    }
}

#[tokio::test]
async fn test_definitions_are_validated() {
    let (db, _state, app) = test_app().await.unwrap();
    let token = admin_token(&db).await;

    let invalid = send(
        &app,
        TestRequest::post("/api/v1/ab-tests", "state-u")
            .token(&token)
            .json(json!({
                "name": "Has Spaces",
                "variants": [{ "name": "only" }]
            })),
    )
    .await;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(invalid.body["details"].get("name").is_some());
    assert!(invalid.body["details"].get("variants").is_some());

    create_running_test(
        &app,
        &token,
        "duplicate",
        json!([{ "name": "a" }, { "name": "b" }]),
    )
    .await;
    let duplicate = send(
        &app,
        TestRequest::post("/api/v1/ab-tests", "state-u")
            .token(&token)
            .json(json!({ "name": "duplicate", "variants": [{ "name": "a" }, { "name": "b" }] })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::UNPROCESSABLE_ENTITY);

    let missing = send(
        &app,
        TestRequest::get("/api/v1/experiments/nonexistent/assignment", "state-u"),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn managing_tests_requires_an_admin() {
    let (db, _state, app) = test_app().await.unwrap();
    let tenant = create_tenant(&db, "state-u").await.unwrap();
    let alumni = create_user(&db, tenant.id, "ada@example.edu", Role::Alumni, &[])
        .await
        .unwrap();
    let token = issue_token(&db, &alumni).await.unwrap();

    let response = send(
        &app,
        TestRequest::post("/api/v1/ab-tests", "state-u")
            .token(&token)
            .json(json!({ "name": "sneaky", "variants": [{ "name": "a" }, { "name": "b" }] })),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let listing = send(
        &app,
        TestRequest::get("/api/v1/ab-tests", "state-u").token(&token),
    )
    .await;
    assert_eq!(listing.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn homepage_serves_audience_content_and_hero_variants() {
    let (db, _state, app) = test_app().await.unwrap();
    let token = admin_token(&db).await;

    let default = send(&app, TestRequest::get("/api/v1/homepage", "state-u")).await;
    assert_eq!(default.status, StatusCode::OK);
    assert_eq!(default.body["data"]["audience"], "individual");
    assert!(default.body["data"]["variant"].is_null());
    assert_eq!(default.body["data"]["hero"]["cta"], "Join your network");

    let institutional = send(
        &app,
        TestRequest::get("/api/v1/homepage", "state-u").header("x-audience", "institutional"),
    )
    .await;
    assert_eq!(institutional.body["data"]["audience"], "institutional");
    assert_eq!(institutional.body["data"]["hero"]["cta"], "Request a demo");

    let unknown = send(
        &app,
        TestRequest::get("/api/v1/homepage?audience=martians", "state-u"),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    create_running_test(
        &app,
        &token,
        "homepage_hero_individual",
        json!([{ "name": "control" }, { "name": "career_focus" }]),
    )
    .await;

    let expected = assign_variant(
        "homepage_hero_individual",
        "session:visitor-3",
        &variant_list(&["control", "career_focus"]),
    )
    .unwrap()
    .name
    .clone();

    let personalised = send(
        &app,
        TestRequest::get("/api/v1/homepage?audience=individual", "state-u")
            .header("x-session-id", "visitor-3"),
    )
    .await;
    assert_eq!(personalised.body["data"]["variant"], expected.as_str());
    let expected_cta = if expected == "career_focus" {
        "Find matching jobs"
    } else {
        "Join your network"
    };
    assert_eq!(personalised.body["data"]["hero"]["cta"], expected_cta);

    let clicked = send(
        &app,
        TestRequest::post("/api/v1/homepage/cta-click", "state-u")
            .header("x-session-id", "visitor-3")
            .json(json!({ "audience": "individual" })),
    )
    .await;
    assert_eq!(clicked.status, StatusCode::OK);
    assert_eq!(clicked.body["data"]["recorded"], true);
    assert_eq!(clicked.body["data"]["variant"], expected.as_str());

    let no_test = send(
        &app,
        TestRequest::post("/api/v1/homepage/cta-click", "state-u")
            .json(json!({ "audience": "institutional" })),
    )
    .await;
    assert_eq!(no_test.body["data"]["recorded"], false);
}
