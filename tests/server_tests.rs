//! End-to-end tests against a real listener.
//!
//! Each test binds an ephemeral port, serves the router with connection info
//! (so the per-client limiter sees real peer addresses) and talks to it with
//! `reqwest`.
//!
//! Run with: `cargo test --test server_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use greenlight::config::AdminAccount;
use greenlight::{AppState, Config, build_router};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-pa55word";

struct TestServer {
    base_url: String,
    state: AppState,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let state = AppState::in_memory(config);
        state.bootstrap_admin().await.unwrap();
        let app = build_router(state.clone()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            stop: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn stop(mut self) -> bool {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap();
        self.state.shutdown().await
    }
}

fn config() -> Config {
    Config {
        bcrypt_cost: 4,
        admin: Some(AdminAccount {
            name: "Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_admin_can_manage_catalog_over_http() {
    let server = TestServer::start(config()).await;
    let client = Client::new();

    let response = client
        .post(server.url("/v1/tokens/jwt"))
        .basic_auth(ADMIN_EMAIL, Some(ADMIN_PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let jwt = body["result"]["token"].as_str().unwrap().to_string();

    let response = client
        .post(server.url("/v1/movies"))
        .bearer_auth(&jwt)
        .json(&json!({
            "title": "The Matrix",
            "year": 1999,
            "runtime": "136 mins",
            "genres": ["action", "sci-fi"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()["location"].to_str().unwrap().to_string();

    let response = client
        .get(server.url(&location))
        .bearer_auth(&jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["title"], "The Matrix");
    assert_eq!(body["result"]["runtime"], "136 mins");

    assert!(server.stop().await);
}

#[tokio::test]
async fn test_registration_mail_job_drains_on_shutdown() {
    let server = TestServer::start(config()).await;
    let client = Client::new();

    let response = client
        .post(server.url("/v1/users"))
        .json(&json!({"name": "Carol", "email": "carol@example.com", "password": "pa55word-carol"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(server.stop().await);
}

#[tokio::test]
async fn test_rate_limit_uses_peer_address() {
    let server = TestServer::start(Config {
        rate_limit_enabled: true,
        global_rate_limit: 1000,
        per_client_rate_limit: 3,
        ..config()
    })
    .await;
    let client = Client::new();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = client
            .get(server.url("/v1/healthcheck"))
            // Ignored: loopback is not a trusted proxy.
            .header("x-forwarded-for", "198.51.100.77")
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        [
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );

    assert!(server.stop().await);
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = TestServer::start(config()).await;
    let client = Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, server.url("/v1/movies"))
        .header("origin", "https://example.com")
        .header("access-control-request-method", "PATCH")
        .header("access-control-request-headers", "authorization")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );

    assert!(server.stop().await);
}
