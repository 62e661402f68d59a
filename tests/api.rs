use std::time::Duration;

use axum_todo_api::{build_app, config::Config, model::Claims, StartupError};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        development: false,
        database_url: "sqlite::memory:".into(),
        database_max_connections: 1,
        redis_url: None,
        cache_ttl: Duration::from_secs(3600),
        jwt_secret: "test-secret".into(),
        jwt_ttl: Duration::from_secs(3600),
        password_hash_iterations: 1_000,
        cors_origin: "http://localhost:3000".into(),
    }
}

async fn start_server(config: Config) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(config).await.expect("build app");

    // Bind to an ephemeral port
    let listener = std::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::Server::from_tcp(listener)
            .expect("server from listener")
            .serve(app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}/api"), tx, server)
}

async fn register(client: &reqwest::Client, base: &str, email: &str) -> String {
    let resp = client
        .post(format!("{base}/auth/register"))
        .json(&json!({ "email": email, "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().expect("token").to_string()
}

async fn create_todo(client: &reqwest::Client, base: &str, token: &str, title: &str) -> Value {
    let resp = client
        .post(format!("{base}/todos"))
        .bearer_auth(token)
        .json(&json!({ "title": title }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    body["todo"].clone()
}

#[tokio::test]
async fn todo_lifecycle_end_to_end() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    register(&client, &base, "ci@example.com").await;

    // Login
    let resp = client
        .post(format!("{base}/auth/login"))
        .json(&json!({ "email": "ci@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().expect("token").to_string();
    assert!(body["user"].get("password_hash").is_none());

    // Create
    let todo = create_todo(&client, &base, &token, "x").await;
    assert_eq!(todo["title"], "x");
    assert_eq!(todo["description"], "");
    assert_eq!(todo["is_completed"], false);
    assert!(todo.get("user_id").is_none());
    for field in ["id", "created_at", "updated_at"] {
        assert!(todo.get(field).is_some(), "missing {field}");
    }
    let id = todo["id"].as_i64().unwrap();

    // List includes it
    let resp = client
        .get(format!("{base}/todos"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["todos"][0]["id"], id);

    // Mark completed
    let resp = client
        .put(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .json(&json!({ "is_completed": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["todo"]["is_completed"], true);
    assert_eq!(body["todo"]["title"], "x");

    // The cached list reflects the update too
    let body: Value = client
        .get(format!("{base}/todos"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["todos"][0]["is_completed"], true);

    // Delete, then the todo is gone
    let resp = client
        .delete(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn users_cannot_reach_each_others_todos() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let alice = register(&client, &base, "alice@example.com").await;
    let bob = register(&client, &base, "bob@example.com").await;
    let todo = create_todo(&client, &base, &alice, "alice only").await;
    let id = todo["id"].as_i64().unwrap();

    let body: Value = client
        .get(format!("{base}/todos"))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["todos"], json!([]));

    let get = client.get(format!("{base}/todos/{id}")).bearer_auth(&bob);
    let put = client
        .put(format!("{base}/todos/{id}"))
        .bearer_auth(&bob)
        .json(&json!({ "title": "mine now" }));
    let delete = client.delete(format!("{base}/todos/{id}")).bearer_auth(&bob);
    for request in [get, put, delete] {
        let resp = request.send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Todo not found");
    }

    let resp = client
        .get(format!("{base}/todos/{id}"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["todo"]["title"], "alice only");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();
    let token = register(&client, &base, "v@example.com").await;

    // Empty title
    let resp = client
        .post(format!("{base}/todos"))
        .bearer_auth(&token)
        .json(&json!({ "title": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["errors"][0]["field"], "title");

    // Update with no recognised field
    let todo = create_todo(&client, &base, &token, "keep").await;
    let id = todo["id"].as_i64().unwrap();
    let resp = client
        .put(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .json(&json!({ "priority": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "No valid fields to update");

    // Non-boolean completion flag
    let resp = client
        .put(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .json(&json!({ "is_completed": "yes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = client
        .get(format!("{base}/todos/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["todo"], todo);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn auth_failures() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    // No token, malformed token
    let resp = client.get(format!("{base}/todos")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = client
        .get(format!("{base}/todos"))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = client
        .get(format!("{base}/todos"))
        .header("authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Correctly signed but expired
    let now = jsonwebtoken::get_current_timestamp();
    let expired = encode(
        &Header::default(),
        &Claims {
            sub: "1".into(),
            email: "dup@example.com".into(),
            iat: now - 7_200,
            exp: now - 3_600,
        },
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();
    let resp = client
        .get(format!("{base}/todos"))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Invalid or expired token");

    register(&client, &base, "dup@example.com").await;

    // Duplicate email, case-insensitively
    let resp = client
        .post(format!("{base}/auth/register"))
        .json(&json!({ "email": "DUP@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Wrong password and unknown user look the same
    for (email, password) in [
        ("dup@example.com", "wrong-password"),
        ("nobody@example.com", "password123"),
    ] {
        let resp = client
            .post(format!("{base}/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Invalid credentials");
    }

    // Weak registration input
    let resp = client
        .post(format!("{base}/auth/register"))
        .json(&json!({ "email": "nope", "password": "123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unparsable_todo_ids_are_not_found() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();
    let token = register(&client, &base, "ids@example.com").await;

    for id in ["abc", "99999999999999999999999"] {
        let get = client.get(format!("{base}/todos/{id}")).bearer_auth(&token);
        let put = client
            .put(format!("{base}/todos/{id}"))
            .bearer_auth(&token)
            .json(&json!({ "is_completed": true }));
        let delete = client.delete(format!("{base}/todos/{id}")).bearer_auth(&token);
        for request in [get, put, delete] {
            let resp = request.send().await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["message"], "Todo not found");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn wildcard_cors_origin_fails_startup_cleanly() {
    let config = Config {
        cors_origin: "*".into(),
        ..test_config()
    };
    assert!(matches!(
        build_app(config).await,
        Err(StartupError::Config(_))
    ));
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let (base, shutdown_tx, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["cache"], "local");
    assert!(body["timestamp"].is_string());

    let resp = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Route not found");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unreachable_redis_does_not_break_the_api() {
    let config = Config {
        redis_url: Some("redis://127.0.0.1:1/".into()),
        ..test_config()
    };
    let (base, shutdown_tx, handle) = start_server(config).await;
    let client = reqwest::Client::new();

    let token = register(&client, &base, "r@example.com").await;
    create_todo(&client, &base, &token, "still works").await;

    let resp = client
        .get(format!("{base}/todos"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["todos"][0]["title"], "still works");

    let body: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["cache"], "redis");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
