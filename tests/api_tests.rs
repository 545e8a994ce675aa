//! Router-level tests driving the full middleware stack in process.
//!
//! Requests go through `tower::ServiceExt::oneshot` with the client address
//! attached by hand, the way `into_make_service_with_connect_info` would.
//!
//! Run with: `cargo test --test api_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;

use greenlight::auth::password::Password;
use greenlight::auth::token::{self, TokenScope};
use greenlight::mailer::{MailError, MailMessage, Mailer};
use greenlight::models::User;
use greenlight::routes::{MOVIES_READ, MOVIES_WRITE};
use greenlight::store::Models;
use greenlight::{AppState, Config, build_router};

const PASSWORD: &str = "pa55word-123";

#[derive(Default)]
struct CapturingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl Mailer for CapturingMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct TestApp {
    state: AppState,
    router: Router,
    mailer: Arc<CapturingMailer>,
}

fn test_config() -> Config {
    Config {
        bcrypt_cost: 4,
        ..Config::default()
    }
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: Config) -> Self {
        let mailer = Arc::new(CapturingMailer::default());
        let models = Models::in_memory(config.query_timeout);
        let state = AppState::new(config, models, mailer.clone());
        let router = build_router(state.clone()).unwrap();
        Self {
            state,
            router,
            mailer,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    /// Store an account directly, bypassing registration.
    async fn seed_user(&self, email: &str, activated: bool, grants: &[&str]) -> User {
        let mut user = User::new(
            "Test User".to_string(),
            email.to_string(),
            Password::set(PASSWORD, 4).unwrap(),
        );
        user.activated = activated;
        self.state.models.users.insert(&mut user).await.unwrap();
        if !grants.is_empty() {
            self.state
                .models
                .permissions
                .add_for_user(user.id, grants)
                .await
                .unwrap();
        }
        user
    }

    async fn bearer_token(&self, email: &str) -> String {
        let (status, _, body) = self
            .send(
                RequestBuilder::new(Method::POST, "/v1/tokens/auth")
                    .basic(email, PASSWORD)
                    .build(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["result"]["token"].as_str().unwrap().to_string()
    }

    async fn jwt(&self, email: &str) -> String {
        let (status, _, body) = self
            .send(
                RequestBuilder::new(Method::POST, "/v1/tokens/jwt")
                    .basic(email, PASSWORD)
                    .build(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["result"]["token"].as_str().unwrap().to_string()
    }

    /// An activated account allowed to read and write movies, with its token.
    async fn editor(&self) -> String {
        self.seed_user("editor@example.com", true, &[MOVIES_READ, MOVIES_WRITE])
            .await;
        self.bearer_token("editor@example.com").await
    }

    async fn sent_mail(&self) -> Vec<MailMessage> {
        for _ in 0..100 {
            let sent = self.mailer.sent.lock().unwrap().clone();
            if !sent.is_empty() {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }
}

struct RequestBuilder {
    inner: axum::http::request::Builder,
    body: Body,
    peer: SocketAddr,
}

impl RequestBuilder {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            inner: Request::builder().method(method).uri(uri),
            body: Body::empty(),
            peer: SocketAddr::from(([203, 0, 113, 7], 50000)),
        }
    }

    fn bearer(mut self, token: &str) -> Self {
        self.inner = self
            .inner
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        self
    }

    fn basic(mut self, email: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{email}:{password}"));
        self.inner = self
            .inner
            .header(header::AUTHORIZATION, format!("Basic {encoded}"));
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    fn json(mut self, body: Value) -> Self {
        self.inner = self.inner.header(header::CONTENT_TYPE, "application/json");
        self.body = Body::from(body.to_string());
        self
    }

    fn raw(mut self, body: &'static str) -> Self {
        self.body = Body::from(body);
        self
    }

    fn peer(mut self, peer: [u8; 4]) -> Self {
        self.peer = SocketAddr::from((peer, 50000));
        self
    }

    fn build(self) -> Request<Body> {
        let mut req = self.inner.body(self.body).unwrap();
        req.extensions_mut().insert(ConnectInfo(self.peer));
        req
    }
}

fn get(uri: &str) -> RequestBuilder {
    RequestBuilder::new(Method::GET, uri)
}

fn moana() -> Value {
    json!({
        "title": "Moana",
        "year": 2016,
        "runtime": "107 mins",
        "genres": ["animation", "adventure"]
    })
}

// =============================================================================
// Health and fallbacks
// =============================================================================

#[tokio::test]
async fn test_healthcheck_anonymous() {
    let app = TestApp::new();
    let (status, headers, body) = app.send(get("/v1/healthcheck").build()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["status"], "available");
    assert_eq!(body["health"]["environment"], "development");
    assert!(body["health"].get("caller").is_none());
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_healthcheck_with_jwt_reports_caller() {
    let app = TestApp::new();
    app.seed_user("alice@example.com", true, &[]).await;
    let jwt = app.jwt("alice@example.com").await;

    let (status, _, body) = app
        .send(get("/v1/healthcheck").bearer(&jwt).build())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["caller"], "alice@example.com");
}

#[tokio::test]
async fn test_healthcheck_with_tampered_jwt() {
    let app = TestApp::new();
    app.seed_user("alice@example.com", true, &[]).await;
    let mut jwt = app.jwt("alice@example.com").await;
    jwt.push('x');

    let (status, headers, _) = app
        .send(get("/v1/healthcheck").bearer(&jwt).build())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();
    let (status, _, body) = app.send(get("/v1/nothing-here").build()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "the requested resource could not be found");
}

#[tokio::test]
async fn test_wrong_method_is_not_allowed() {
    let app = TestApp::new();
    let (status, _, body) = app
        .send(RequestBuilder::new(Method::PUT, "/v1/healthcheck").build())
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body["error"],
        "the PUT method is not supported for this resource"
    );
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let app = TestApp::new();
    let (status, _, _) = app.send(get("/metrics").build()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Registration and activation
// =============================================================================

#[tokio::test]
async fn test_register_activate_flow() {
    let app = TestApp::new();

    let (status, headers, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/users")
                .json(json!({"name": "Alice", "email": "alice@example.com", "password": PASSWORD}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    let id = body["result"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["result"]["activated"], false);
    assert!(body["result"].get("password").is_none());
    assert_eq!(
        headers[header::LOCATION].to_str().unwrap(),
        format!("/v1/users/{id}")
    );

    let mail = app.sent_mail().await;
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "alice@example.com");
    let token = mail[0]
        .plain_body
        .split("{\"token\": \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string();
    assert_eq!(token.len(), 22);

    // Inactive accounts can sign in but not use the catalog.
    let bearer = app.bearer_token("alice@example.com").await;
    let (status, _, _) = app.send(get("/v1/movies").bearer(&bearer).build()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let activate = |token: &str| {
        RequestBuilder::new(Method::PUT, &format!("/v1/users/{id}/activate"))
            .json(json!({ "token": token }))
            .build()
    };
    let (status, _, body) = app.send(activate(&token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"]["activated"], true);

    // Activation tokens are single use.
    let (status, _, body) = app.send(activate(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or expired activation token");

    // New accounts start with read access only.
    let (status, _, _) = app.send(get("/v1/movies").bearer(&bearer).build()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = TestApp::new();
    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/users")
                .json(json!({"name": "", "email": "not-an-email", "password": "short"}))
                .build(),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["name"], "must be provided");
    assert_eq!(body["error"]["email"], "must be a valid email address");
    assert!(body["error"]["password"].is_string());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new();
    app.seed_user("alice@example.com", false, &[]).await;

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/users")
                .json(json!({"name": "Alice", "email": "alice@example.com", "password": PASSWORD}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn test_activate_rejects_malformed_and_unknown() {
    let app = TestApp::new();
    let user = app.seed_user("alice@example.com", false, &[]).await;

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::PUT, &format!("/v1/users/{}/activate", user.id))
                .json(json!({"token": "too-short"}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["token"], "must be 22 bytes long");

    let (status, _, _) = app
        .send(
            RequestBuilder::new(
                Method::PUT,
                &format!("/v1/users/{}/activate", uuid::Uuid::new_v4()),
            )
            .json(json!({"token": "ABCDEFGHIJKLMNOPQRSTUV"}))
            .build(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app
        .send(
            RequestBuilder::new(Method::PUT, &format!("/v1/users/{}/activate", user.id))
                .json(json!({"token": "ABCDEFGHIJKLMNOPQRSTUV"}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn activate(app: &TestApp, user_id: uuid::Uuid, plaintext: &str) -> (StatusCode, Value) {
    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::PUT, &format!("/v1/users/{user_id}/activate"))
                .json(json!({ "token": plaintext }))
                .build(),
        )
        .await;
    (status, body)
}

#[tokio::test]
async fn test_activate_rejects_expired_token() {
    let app = TestApp::new();
    let user = app.seed_user("alice@example.com", false, &[]).await;

    let issued = token::generate(user.id, chrono::Duration::seconds(-60), TokenScope::Activation);
    app.state.models.tokens.insert(&issued.record).await.unwrap();

    let (status, body) = activate(&app, user.id, &issued.plaintext).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or expired activation token");

    let stored = app.state.models.users.get_by_id(user.id).await.unwrap();
    assert!(!stored.activated);
}

#[tokio::test]
async fn test_activate_rejects_token_issued_to_another_user() {
    let app = TestApp::new();
    let alice = app.seed_user("alice@example.com", false, &[]).await;
    let bob = app.seed_user("bob@example.com", false, &[]).await;

    let issued = token::generate(alice.id, chrono::Duration::hours(1), TokenScope::Activation);
    app.state.models.tokens.insert(&issued.record).await.unwrap();

    let (status, body) = activate(&app, bob.id, &issued.plaintext).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or expired activation token");

    for id in [alice.id, bob.id] {
        let stored = app.state.models.users.get_by_id(id).await.unwrap();
        assert!(!stored.activated);
    }

    // The token still activates its own account
    let (status, body) = activate(&app, alice.id, &issued.plaintext).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(app.state.models.users.get_by_id(alice.id).await.unwrap().activated);
}

#[tokio::test]
async fn test_list_and_delete_users() {
    let app = TestApp::new();
    let bearer = app.editor().await;
    let other = app.seed_user("bob@example.com", false, &[]).await;

    let (status, _, _) = app.send(get("/v1/users").build()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app
        .send(get("/v1/users?email=bob&sort=-email").bearer(&bearer).build())
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["metadata"]["total_records"], 1);
    assert_eq!(body["result"][0]["email"], "bob@example.com");

    let (status, _, body) = app
        .send(get("/v1/users?sort=password").bearer(&bearer).build())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["sort"], "invalid sort value");

    let delete = |id: String| {
        RequestBuilder::new(Method::DELETE, &format!("/v1/users/{id}"))
            .bearer(&bearer)
            .build()
    };
    let (status, _, body) = app.send(delete(other.id.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "user deleted successfully");

    let (status, _, _) = app.send(delete(other.id.to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = app.send(delete("not-a-uuid".to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Tokens
// =============================================================================

#[tokio::test]
async fn test_authentication_token_issued() {
    let app = TestApp::new();
    app.seed_user("alice@example.com", false, &[]).await;

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/tokens/auth")
                .basic("alice@example.com", PASSWORD)
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["result"]["scope"], "authentication");
    assert_eq!(body["result"]["token"].as_str().unwrap().len(), 22);
    assert!(body["result"]["expiry"].is_string());
}

#[tokio::test]
async fn test_basic_failures_are_uniform() {
    let app = TestApp::new();
    app.seed_user("alice@example.com", false, &[]).await;

    let attempts = [
        RequestBuilder::new(Method::POST, "/v1/tokens/auth")
            .basic("alice@example.com", "wrong-password")
            .build(),
        RequestBuilder::new(Method::POST, "/v1/tokens/auth")
            .basic("nobody@example.com", PASSWORD)
            .build(),
        RequestBuilder::new(Method::POST, "/v1/tokens/jwt")
            .header("authorization", "Basic !!!not-base64")
            .build(),
        RequestBuilder::new(Method::POST, "/v1/tokens/jwt").build(),
    ];
    for req in attempts {
        let (status, headers, body) = app.send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid authentication credentials or token");
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));
    }
}

// =============================================================================
// Movies
// =============================================================================

#[tokio::test]
async fn test_movies_require_authentication() {
    let app = TestApp::new();
    let (status, headers, body) = app.send(get("/v1/movies").build()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"],
        "you must be authenticated to access this resource"
    );
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));

    let (status, _, body) = app
        .send(get("/v1/movies").bearer("ABCDEFGHIJKLMNOPQRSTUV").build())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid authentication credentials or token");
}

#[tokio::test]
async fn test_read_only_account_cannot_write() {
    let app = TestApp::new();
    app.seed_user("reader@example.com", true, &[MOVIES_READ]).await;
    let bearer = app.bearer_token("reader@example.com").await;

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/movies")
                .bearer(&bearer)
                .json(moana())
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account doesn't have the necessary permissions to access this resource"
    );
}

#[tokio::test]
async fn test_movie_lifecycle() {
    let app = TestApp::new();
    let bearer = app.editor().await;

    let (status, headers, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/movies")
                .bearer(&bearer)
                .json(moana())
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["result"]["id"].as_i64().unwrap();
    assert_eq!(body["result"]["runtime"], "107 mins");
    assert_eq!(body["result"]["version"], 1);
    assert_eq!(
        headers[header::LOCATION].to_str().unwrap(),
        format!("/v1/movies/{id}")
    );

    let uri = format!("/v1/movies/{id}");
    let (status, _, body) = app.send(get(&uri).bearer(&bearer).build()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["title"], "Moana");

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::PATCH, &uri)
                .bearer(&bearer)
                .header("x-expected-version", "1")
                .json(json!({"year": 2017}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"]["year"], 2017);
    assert_eq!(body["result"]["title"], "Moana");
    assert_eq!(body["result"]["version"], 2);

    // Stale version
    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::PATCH, &uri)
                .bearer(&bearer)
                .header("x-expected-version", "1")
                .json(json!({"year": 2018}))
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::DELETE, &uri)
                .bearer(&bearer)
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "movie deleted successfully");

    let (status, _, _) = app.send(get(&uri).bearer(&bearer).build()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_movie_ids_must_be_positive_integers() {
    let app = TestApp::new();
    let bearer = app.editor().await;

    for uri in ["/v1/movies/0", "/v1/movies/-3", "/v1/movies/abc"] {
        let (status, _, _) = app.send(get(uri).bearer(&bearer).build()).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_movie_validation_and_body_errors() {
    let app = TestApp::new();
    let bearer = app.editor().await;
    let post = |body: Value| {
        RequestBuilder::new(Method::POST, "/v1/movies")
            .bearer(&bearer)
            .json(body)
            .build()
    };

    let (status, _, body) = app
        .send(post(json!({"title": "", "year": 1500, "runtime": "0 mins", "genres": ["a", "a"]})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["title"], "must be provided");
    assert!(body["error"]["year"].is_string());
    assert!(body["error"]["runtime"].is_string());
    assert_eq!(body["error"]["genres"], "must not contain duplicate values");

    let (status, _, body) = app
        .send(post(json!({"title": "Moana", "rating": "PG"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "body contains unknown key \"rating\"");

    let (status, _, body) = app
        .send(
            RequestBuilder::new(Method::POST, "/v1/movies")
                .bearer(&bearer)
                .raw("")
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "body must not be empty");
}

#[tokio::test]
async fn test_movie_listing_filters_and_pages() {
    let app = TestApp::new();
    let bearer = app.editor().await;

    let movies = [
        ("Moana", 2016, vec!["animation", "adventure"]),
        ("Black Panther", 2018, vec!["action", "adventure"]),
        ("Deadpool", 2016, vec!["action", "comedy"]),
        ("The Breakfast Club", 1986, vec!["drama"]),
    ];
    for (title, year, genres) in movies {
        let (status, _, _) = app
            .send(
                RequestBuilder::new(Method::POST, "/v1/movies")
                    .bearer(&bearer)
                    .json(json!({"title": title, "year": year, "runtime": "100 mins", "genres": genres}))
                    .build(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _, body) = app
        .send(
            get("/v1/movies?genres=adventure&sort=-year")
                .bearer(&bearer)
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["total_records"], 2);
    assert_eq!(body["result"][0]["title"], "Black Panther");
    assert_eq!(body["result"][1]["title"], "Moana");

    let (status, _, body) = app
        .send(get("/v1/movies?page=2&page_size=3").bearer(&bearer).build())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["current_page"], 2);
    assert_eq!(body["metadata"]["last_page"], 2);
    assert_eq!(body["result"].as_array().unwrap().len(), 1);

    let (status, _, body) = app
        .send(get("/v1/movies?title=nothing+matches").bearer(&bearer).build())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"].as_array().unwrap().len(), 0);

    let (status, _, body) = app
        .send(get("/v1/movies?page=0&page_size=x").bearer(&bearer).build())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["page"].is_string());
    assert_eq!(body["error"]["page_size"], "must be an integer value");
}

#[tokio::test]
async fn test_movies_accept_jwt() {
    let app = TestApp::new();
    app.seed_user("reader@example.com", true, &[MOVIES_READ]).await;
    let jwt = app.jwt("reader@example.com").await;

    let (status, _, body) = app.send(get("/v1/movies").bearer(&jwt).build()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"], json!([]));
}

// =============================================================================
// Rate limiting
// =============================================================================

fn limited_config() -> Config {
    Config {
        rate_limit_enabled: true,
        global_rate_limit: 1000,
        per_client_rate_limit: 2,
        ..test_config()
    }
}

#[tokio::test]
async fn test_per_client_limit_isolates_clients() {
    let app = TestApp::with_config(limited_config());

    for _ in 0..2 {
        let (status, _, _) = app.send(get("/v1/healthcheck").build()).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = app.send(get("/v1/healthcheck").build()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded, please try again later");
    assert!(headers.contains_key(header::RETRY_AFTER));

    let (status, _, _) = app
        .send(get("/v1/healthcheck").peer([198, 51, 100, 1]).build())
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_runs_before_authentication() {
    let app = TestApp::with_config(limited_config());

    for _ in 0..2 {
        let (status, _, _) = app.send(get("/v1/movies").build()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, _) = app.send(get("/v1/movies").build()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_missing_peer_address_is_internal_error() {
    let app = TestApp::with_config(limited_config());
    let req = Request::get("/v1/healthcheck").body(Body::empty()).unwrap();

    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );
}
