use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use gatekeep_api::app::services::AppServices;
use gatekeep_auth::{Argon2PasswordHasher, CredentialClaims, PermissionCode};
use gatekeep_core::UserId;
use gatekeep_infra::config::AdminBootstrap;
use gatekeep_infra::{AppConfig, InMemoryDirectory};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

const JWT_SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "root@example.com";
const ADMIN_PASSWORD: &str = "changeme";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory directory, cheap hashing, ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            using_dev_secret: false,
            ..AppConfig::default()
        };
        let services = Arc::new(AppServices::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(Argon2PasswordHasher::with_params(8, 1, 1).unwrap()),
            &config,
        ));
        services
            .bootstrap_admin(&AdminBootstrap {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            })
            .await
            .expect("failed to bootstrap admin");

        let app = gatekeep_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> i64 {
        let res = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        assert!(body.get("password_hash").is_none());
        body["id"].as_i64().unwrap()
    }

    async fn create(&self, token: &str, path: &str, body: Value) -> i64 {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        if res.status() != StatusCode::CREATED {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            panic!("expected 201 Created from {path}, got {status} body={body}");
        }
        let created: Value = res.json().await.unwrap();
        created["id"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, user_id: i64, permissions: &[&str], issued_ago: ChronoDuration) -> String {
    let claims = CredentialClaims::new(
        UserId::new(user_id),
        "someone@example.com",
        "Someone",
        permissions.iter().map(|p| PermissionCode::new(p.to_string())).collect(),
        Utc::now() - issued_ago,
        ChronoDuration::hours(1),
    );

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_grant_flows_into_login_credential() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let edit_doc = srv
        .create(&admin, "/permissions", json!({ "name": "Edit documents", "code": "edit_doc" }))
        .await;
    let editor = srv
        .create(&admin, "/roles", json!({ "name": "Editor", "code": "editor" }))
        .await;
    let ada = srv.register("Ada", "ada@example.com", "hunter2").await;

    let res = srv
        .client
        .post(srv.url(&format!("/roles/{editor}/permissions")))
        .bearer_auth(&admin)
        .json(&json!({ "ids": [edit_doc] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .post(srv.url(&format!("/users/{ada}/roles")))
        .bearer_auth(&admin)
        .json(&json!({ "ids": [editor] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roles: Value = res.json().await.unwrap();
    assert_eq!(roles[0]["code"], "editor");

    let token = srv.login("ada@example.com", "hunter2").await;
    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["user_id"], ada);
    assert_eq!(me["permissions"], json!(["edit_doc"]));
    assert_eq!(me["elevated"], false);

    let res = srv
        .client
        .get(srv.url(&format!("/users/{ada}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["permissions"][0]["code"], "edit_doc");
}

#[tokio::test]
async fn non_elevated_principals_may_only_mutate_themselves() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;
    let ada = srv.register("Ada", "ada@example.com", "hunter2").await;
    let bob = srv.register("Bob", "bob@example.com", "hunter2").await;
    let token = srv.login("ada@example.com", "hunter2").await;

    let res = srv
        .client
        .patch(srv.url(&format!("/users/{ada}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "Ada Lovelace" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .patch(srv.url(&format!("/users/{bob}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "Mallory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = srv
        .client
        .patch(srv.url(&format!("/users/{bob}")))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Robert" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .post(srv.url("/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Owner", "code": "owner" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn forged_and_expired_tokens_are_rejected() {
    let srv = TestServer::spawn().await;

    let wrong_secret = mint_jwt("other-secret", 1, &["admin"], ChronoDuration::zero());
    let expired = mint_jwt(JWT_SECRET, 1, &[], ChronoDuration::hours(2));
    let valid = mint_jwt(JWT_SECRET, 1, &[], ChronoDuration::zero());
    let sig_start = valid.rfind('.').unwrap() + 1;
    let flipped = if valid[sig_start..].starts_with('A') { "B" } else { "A" };
    let mut tampered = valid.clone();
    tampered.replace_range(sig_start..sig_start + 1, flipped);

    for token in [wrong_secret, expired, tampered] {
        let res = srv
            .client
            .get(srv.url("/whoami"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth(&valid)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn errors_use_the_json_error_envelope() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({ "name": "Ada", "email": "ada@example.com", "password": "abcd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");

    srv.register("Ada", "ada@example.com", "abcde").await;

    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({ "name": "Ada", "email": "ADA@example.com", "password": "abcde" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_failed");

    let res = srv
        .client
        .get(srv.url("/users/999"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = srv
        .client
        .get(srv.url("/users/abc"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_role_cascades_to_assignments() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;
    let editor = srv
        .create(&admin, "/roles", json!({ "name": "Editor", "code": "editor" }))
        .await;
    let ada = srv.register("Ada", "ada@example.com", "hunter2").await;

    let res = srv
        .client
        .post(srv.url(&format!("/users/{ada}/roles")))
        .bearer_auth(&admin)
        .json(&json!({ "ids": [editor, 999] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .client
        .post(srv.url(&format!("/users/{ada}/roles")))
        .bearer_auth(&admin)
        .json(&json!({ "ids": [editor] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .delete(srv.url(&format!("/roles/{editor}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .get(srv.url(&format!("/users/{ada}/roles")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roles: Value = res.json().await.unwrap();
    assert_eq!(roles, json!([]));
}

#[tokio::test]
async fn organization_tariff_assignment() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let org = srv.create(&admin, "/organizations", json!({ "name": "Acme" })).await;
    let tariff = srv
        .create(&admin, "/tariffs", json!({ "name": "Pro", "price": 4900 }))
        .await;

    let res = srv
        .client
        .put(srv.url(&format!("/organizations/{org}/tariff")))
        .bearer_auth(&admin)
        .json(&json!({ "tariff_id": tariff }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Pro");

    let res = srv
        .client
        .delete(srv.url(&format!("/organizations/{org}/tariff")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .get(srv.url(&format!("/organizations/{org}/tariff")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transport_rejections_use_the_json_error_envelope() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({ "name": "Ada", "email": "a@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");
    assert!(!body["message"].as_str().unwrap().contains("password"));

    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");

    let res = srv.client.get(srv.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_failed");

    let res = srv
        .client
        .get(srv.url("/users"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_failed");
}

#[tokio::test]
async fn deleting_an_organization_releases_its_members() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let org = srv.create(&admin, "/organizations", json!({ "name": "Acme" })).await;
    let ada = srv
        .create(
            &admin,
            "/users",
            json!({
                "name": "Ada",
                "email": "ada@example.com",
                "password": "hunter2",
                "organization_id": org
            }),
        )
        .await;

    let res = srv
        .client
        .delete(srv.url(&format!("/organizations/{org}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .get(srv.url(&format!("/organizations/{org}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .client
        .get(srv.url(&format!("/users/{ada}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["organization_id"], Value::Null);
}

#[tokio::test]
async fn non_positive_body_ids_are_invalid_arguments() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;
    let ada = srv.register("Ada", "ada@example.com", "hunter2").await;

    let res = srv
        .client
        .put(srv.url(&format!("/users/{ada}/tariff")))
        .bearer_auth(&admin)
        .json(&json!({ "tariff_id": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");

    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({
            "name": "Bob",
            "email": "bob@example.com",
            "password": "hunter2",
            "organization_id": -1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
