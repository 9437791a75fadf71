//! HTTP API against the in-memory backend

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use profile_service::app::{create_app, AppState};
use profile_service::config::Settings;
use profile_service::storage::MemoryStorage;

fn app() -> Router {
    let services = profile_service::build_services(Arc::new(MemoryStorage::new()));
    create_app(AppState::new(services, Settings::for_memory()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let resp = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn seed(app: &Router) -> i64 {
    let (status, _) = call(
        app,
        "POST",
        "/profile-types",
        Some(json!({"id": "main", "label": "Main", "registration": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(
        app,
        "POST",
        "/profile-types/main/fields",
        Some(json!({"name": "profile_fullname", "label": "Full name", "kind": "string", "required": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        app,
        "POST",
        "/accounts",
        Some(json!({"name": "jane", "mail": "jane@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_i64().unwrap()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_storage_backend() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));

        let (_, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"]["backend"], "memory");
    }
}

mod profile_types {
    use super::*;

    #[tokio::test]
    async fn create_list_and_conflict() {
        let app = app();
        seed(&app).await;

        let (status, body) = call(&app, "GET", "/profile-types", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], "main");

        let (status, body) = call(
            &app,
            "POST",
            "/profile-types",
            Some(json!({"id": "main", "label": "Again"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = call(&app, "GET", "/profile-types/main/fields", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "profile_fullname");

        let (status, _) = call(&app, "GET", "/profile-types/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_updates_and_creates() {
        let app = app();
        seed(&app).await;

        let (status, body) = call(
            &app,
            "PUT",
            "/profile-types/main",
            Some(json!({"label": "Main profile", "weight": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["label"], "Main profile");
        assert_eq!(body["data"]["registration"], true);

        let (status, _) = call(&app, "PUT", "/profile-types/extra", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "PUT",
            "/profile-types/extra",
            Some(json!({"label": "Extra"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "extra");

        let (status, _) = call(&app, "DELETE", "/profile-types/extra", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

mod profiles {
    use super::*;

    #[tokio::test]
    async fn crud_and_cascade() {
        let app = app();
        let uid = seed(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/profiles",
            Some(json!({"type": "main", "uid": uid, "fields": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["errors"][0]["message"], "Full name field is required.");

        let (status, body) = call(
            &app,
            "POST",
            "/profiles",
            Some(json!({"type": "main", "uid": uid, "fields": {"profile_fullname": ["Jane Doe"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().unwrap();
        assert_eq!(
            body["data"]["label"],
            format!("Main profile of jane (uid: {})", uid)
        );
        assert_eq!(body["data"]["created"], body["data"]["changed"]);

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/profiles/{}", id),
            Some(json!({"fields": {"profile_fullname": ["Jane Q. Doe"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["fields"]["profile_fullname"][0], "Jane Q. Doe");

        let (status, body) = call(&app, "GET", &format!("/accounts/{}/profiles?type=main", uid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        // Type in use
        let (status, _) = call(&app, "DELETE", "/profile-types/main", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "DELETE", &format!("/accounts/{}", uid), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, "GET", &format!("/profiles/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", &format!("/accounts/{}", uid), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_owner_is_a_reference_error() {
        let app = app();
        seed(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/profiles",
            Some(json!({"type": "main", "uid": 9999, "fields": {"profile_fullname": ["X"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "REFERENCE_ERROR");
    }

    #[tokio::test]
    async fn unknown_type_is_reported_before_missing_fields() {
        let app = app();
        let uid = seed(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/profiles",
            Some(json!({"type": "nonexistent", "uid": uid, "fields": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "REFERENCE_ERROR");
    }
}

mod registration {
    use super::*;

    #[tokio::test]
    async fn form_then_submit() {
        let app = app();
        seed(&app).await;

        let (status, body) = call(&app, "GET", "/user/register", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["form_id"], "user_register_form");
        let keys: Vec<&str> = body["data"]["elements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["name", "mail", "entity_main[profile_fullname]"]);

        let (status, body) = call(
            &app,
            "POST",
            "/user/register",
            Some(json!({"name": "john", "mail": "john@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["field"], "entity_main[profile_fullname]");
        assert_eq!(body["errors"][0]["message"], "Full name field is required.");

        let (status, body) = call(
            &app,
            "POST",
            "/user/register",
            Some(json!({
                "name": "john",
                "mail": "john@example.com",
                "entity_main[profile_fullname][0][value]": "John Doe"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["message"], "Registration successful.");
        assert_eq!(body["data"]["account"]["name"], "john");
        assert_eq!(body["data"]["profiles"][0]["fields"]["profile_fullname"][0], "John Doe");
    }
}
