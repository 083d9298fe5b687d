use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use rostrum_api::{AppState, AppStateInner, router};
use rostrum_crypto::{PasswordHasher, TokenIssuer};
use rostrum_db::Database;
use rostrum_identity::{IdentityResolver, ProviderError, ProviderIdentity, ProviderVerifier};
use rostrum_types::api::SessionIdentity;
use rostrum_types::models::{FederatedProvider, PostId, UserId};

struct StubVerifier {
    provider: FederatedProvider,
    identities: HashMap<&'static str, (&'static str, &'static str)>,
}

#[async_trait]
impl ProviderVerifier for StubVerifier {
    fn provider(&self) -> FederatedProvider {
        self.provider
    }

    async fn verify(&self, token: &str) -> Result<ProviderIdentity, ProviderError> {
        let (subject, email) = self
            .identities
            .get(token)
            .ok_or(ProviderError::Malformed("unknown token"))?;
        Ok(ProviderIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            picture: None,
        })
    }
}

struct TestApp {
    _dir: TempDir,
    state: AppState,
    app: Router,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("rostrum.db")).unwrap());

    let google = StubVerifier {
        provider: FederatedProvider::Google,
        identities: HashMap::from([
            ("google-alice", ("g-1", "a@x.com")),
            ("google-bob-x", ("g-2", "bob@x.com")),
            ("google-bob-y", ("g-3", "bob@y.com")),
        ]),
    };
    let apple = StubVerifier {
        provider: FederatedProvider::Apple,
        identities: HashMap::new(),
    };

    let identity = IdentityResolver::new(
        db.clone(),
        PasswordHasher::with_cost(1024, 1).unwrap(),
        TokenIssuer::new("test-secret").unwrap(),
        Arc::new(google),
        Arc::new(apple),
    );
    let state: AppState = Arc::new(AppStateInner { db, identity });
    let app = router(state.clone());

    TestApp {
        _dir: dir,
        state,
        app,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> (String, i64) {
        let (status, body) = self
            .post(
                "/api/register",
                None,
                json!({ "username": username, "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }

    fn seed_posts(&self, author: i64, count: usize) -> PostId {
        let mut last = PostId(0);
        for n in 0..count {
            last = self
                .state
                .db
                .insert_post(UserId(author), &format!("post {n}"), "body")
                .unwrap();
        }
        last
    }
}

#[tokio::test]
async fn end_to_end_scenario() {
    let t = test_app();

    // Register.
    let (status, body) = t
        .post(
            "/api/register",
            None,
            json!({ "username": "alice", "email": "a@x.com", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["auth_provider"], "email");
    let alice_id = body["user"]["id"].as_i64().unwrap();

    // Wrong password.
    let (status, body) = t
        .post(
            "/api/login",
            None,
            json!({ "email": "a@x.com", "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");

    // Google sign-in with the same email links onto alice.
    let (status, body) = t
        .post("/api/auth/google", None, json!({ "token": "google-alice" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], alice_id);
    assert_eq!(body["user"]["username"], "alice");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = t.get("/api/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], alice_id);
    assert_eq!(me["email"], "a@x.com");

    let row = t
        .state
        .db
        .get_user_by_id(UserId(alice_id))
        .unwrap()
        .unwrap();
    assert_eq!(row.google_id.as_deref(), Some("g-1"));
    assert!(t.state.db.get_user_by_email("a@x.com").unwrap().is_some());

    // Toggle a vote on post #5.
    let post = t.seed_posts(alice_id, 5);
    assert_eq!(post, PostId(5));

    let (status, body) = t
        .post("/api/posts/5/vote", Some(&token), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Vote recorded");

    let (_, tally) = t.get("/api/posts/5/votes", None).await;
    assert_eq!(tally, json!({ "upvotes": 1, "downvotes": 0 }));

    let (status, body) = t
        .post("/api/posts/5/vote", Some(&token), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Vote removed");

    let (_, tally) = t.get("/api/posts/5/votes", None).await;
    assert_eq!(tally, json!({ "upvotes": 0, "downvotes": 0 }));

    // Two fresh accounts whose emails share a local part.
    let (_, bob) = t
        .post("/api/auth/google", None, json!({ "token": "google-bob-x" }))
        .await;
    let (_, bob1) = t
        .post("/api/auth/google", None, json!({ "token": "google-bob-y" }))
        .await;
    assert_eq!(bob["user"]["username"], "bob");
    assert_eq!(bob1["user"]["username"], "bob1");
    assert_eq!(bob1["user"]["auth_provider"], "google");
}

#[tokio::test]
async fn login_returns_token_and_user() {
    let t = test_app();
    let (_, alice_id) = t.register("alice", "a@x.com", "secret1").await;

    let (status, body) = t
        .post(
            "/api/login",
            None,
            json!({ "email": "a@x.com", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["id"], alice_id);

    let (status, _) = t
        .get("/api/me", Some(body["token"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Unknown account looks the same as a wrong password.
    let (status, body) = t
        .post(
            "/api/login",
            None,
            json!({ "email": "nobody@x.com", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");
}

#[tokio::test]
async fn user_json_hides_credentials() {
    let t = test_app();
    let (token, _) = t.register("alice", "a@x.com", "secret1").await;
    t.post("/api/auth/google", None, json!({ "token": "google-alice" }))
        .await;

    let (_, me) = t.get("/api/me", Some(&token)).await;
    let keys: Vec<&str> = me.as_object().unwrap().keys().map(String::as_str).collect();
    for key in [
        "id",
        "username",
        "email",
        "bio",
        "avatar",
        "auth_provider",
        "created_at",
    ] {
        assert!(keys.contains(&key), "missing {key}");
    }
    for hidden in ["password", "password_hash", "google_id", "apple_id"] {
        assert!(!keys.contains(&hidden), "leaked {hidden}");
    }
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_bodies() {
    let t = test_app();
    t.register("alice", "a@x.com", "secret1").await;

    let (status, body) = t
        .post(
            "/api/register",
            None,
            json!({ "username": "alice", "email": "other@x.com", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username or email already exists");

    let (status, body) = t
        .post("/api/register", None, json!({ "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = t
        .post(
            "/api/register",
            None,
            json!({ "username": "bob", "email": "bob@x.com", "password": "123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn provider_rejection_is_unauthorized() {
    let t = test_app();

    let (status, body) = t
        .post("/api/auth/google", None, json!({ "token": "forged" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid google token");

    let (status, body) = t
        .post("/api/auth/apple", None, json!({ "token": "a.b.c" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid apple token");

    let (status, _) = t.post("/api/auth/google", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A bad username never masks a bad token.
    let (status, body) = t
        .post(
            "/api/auth/google",
            None,
            json!({ "token": "forged", "username": "two words" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid google token");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let t = test_app();

    let (status, body) = t.get("/api/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = t.get("/api/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signed with a different secret.
    let foreign = TokenIssuer::new("another-secret")
        .unwrap()
        .issue(&SessionIdentity {
            user_id: UserId(1),
            username: "mallory".into(),
            email: "m@x.com".into(),
        })
        .unwrap();
    let (status, _) = t.get("/api/me", Some(&foreign)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .post("/api/posts/1/vote", None, json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.send(Method::POST, "/api/comments/1/upvote", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_for_vanished_user_is_not_found() {
    let t = test_app();
    let token = t
        .state
        .identity
        .tokens()
        .issue(&SessionIdentity {
            user_id: UserId(4242),
            username: "ghost".into(),
            email: "ghost@x.com".into(),
        })
        .unwrap();

    let (status, body) = t.get("/api/me", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user not found");
}

#[tokio::test]
async fn vote_by_vanished_user_is_not_found() {
    let t = test_app();
    let (_, alice_id) = t.register("alice", "a@x.com", "secret1").await;
    t.seed_posts(alice_id, 1);
    let token = t
        .state
        .identity
        .tokens()
        .issue(&SessionIdentity {
            user_id: UserId(4242),
            username: "ghost".into(),
            email: "ghost@x.com".into(),
        })
        .unwrap();

    let (status, body) = t
        .post("/api/posts/1/vote", Some(&token), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user not found");

    let (_, tally) = t.get("/api/posts/1/votes", None).await;
    assert_eq!(tally["upvotes"], 0);
}

#[tokio::test]
async fn post_vote_validation() {
    let t = test_app();
    let (token, alice_id) = t.register("alice", "a@x.com", "secret1").await;
    t.seed_posts(alice_id, 1);

    for bad in [json!({ "vote_type": 0 }), json!({ "vote_type": 2 })] {
        let (status, body) = t.post("/api/posts/1/vote", Some(&token), bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("vote type"));
    }

    let (status, _) = t
        .post("/api/posts/1/vote", Some(&token), json!({ "vote": "up" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .post("/api/posts/abc/vote", Some(&token), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .post("/api/posts/99/vote", Some(&token), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.get("/api/posts/99/votes", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_vote_switches_direction() {
    let t = test_app();
    let (alice, alice_id) = t.register("alice", "a@x.com", "secret1").await;
    let (bob, _) = t.register("bob", "b@x.com", "secret1").await;
    t.seed_posts(alice_id, 1);

    let (_, body) = t
        .post("/api/posts/1/vote", Some(&alice), json!({ "vote_type": 1 }))
        .await;
    assert_eq!(body["message"], "Vote recorded");
    let (_, body) = t
        .post("/api/posts/1/vote", Some(&alice), json!({ "vote_type": -1 }))
        .await;
    assert_eq!(body["message"], "Vote updated");
    let (_, body) = t
        .post("/api/posts/1/vote", Some(&bob), json!({ "vote_type": -1 }))
        .await;
    assert_eq!(body["message"], "Vote recorded");

    let (_, tally) = t.get("/api/posts/1/votes", None).await;
    assert_eq!(tally, json!({ "upvotes": 0, "downvotes": 2 }));
}

#[tokio::test]
async fn comment_votes_toggle_and_switch() {
    let t = test_app();
    let (token, alice_id) = t.register("alice", "a@x.com", "secret1").await;
    let post = t.seed_posts(alice_id, 1);
    let comment = t
        .state
        .db
        .insert_comment(post, UserId(alice_id), "first")
        .unwrap();
    let base = format!("/api/comments/{}", comment.0);

    let (status, body) = t
        .send(Method::POST, &format!("{base}/upvote"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Vote recorded");

    let (_, body) = t
        .send(Method::POST, &format!("{base}/downvote"), Some(&token), None)
        .await;
    assert_eq!(body["message"], "Vote updated");

    let (_, tally) = t.get(&format!("{base}/votes"), None).await;
    assert_eq!(tally, json!({ "upvotes": 0, "downvotes": 1 }));

    let (_, body) = t
        .send(Method::POST, &format!("{base}/downvote"), Some(&token), None)
        .await;
    assert_eq!(body["message"], "Vote removed");

    // Post and comment ledgers are separate.
    let (_, tally) = t.get(&format!("/api/posts/{}/votes", post.0), None).await;
    assert_eq!(tally, json!({ "upvotes": 0, "downvotes": 0 }));

    let (status, _) = t
        .send(Method::POST, "/api/comments/77/upvote", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
