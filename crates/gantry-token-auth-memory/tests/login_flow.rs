//! End-to-end login flow tests against the in-memory backend with a
//! wiremock-stubbed identity provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gantry_token_auth::{
    AccessTokenAuthService, AuthConfig, LocalUser, LoginRequest, ProvisionAction,
    RegistrationNotifier,
};
use gantry_token_auth_memory::MemoryStore;

/// Counts registration signals.
#[derive(Default)]
struct CountingNotifier {
    registered: AtomicUsize,
}

#[async_trait]
impl RegistrationNotifier for CountingNotifier {
    async fn user_registered(&self, _user: &LocalUser) -> Result<(), String> {
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn userinfo_body(guid: &str, email: &str, groups: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "sub": guid,
        "preferred_username": "jdoe",
        "email": email,
        "name": "Jane Doe",
        "groups": groups
    })
}

async fn mount_userinfo(server: &MockServer, token: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("Authorization", format!("Bearer {token}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn base_config(server: &MockServer) -> AuthConfig {
    AuthConfig::new()
        .with_userinfo_endpoint(Url::parse(&format!("{}/userinfo", server.uri())).unwrap())
        .with_project("SECURITY", 42)
        .with_project("OPS", 7)
        .with_request_timeout(Duration::from_secs(5))
        .with_allow_http(true)
}

async fn store_with_projects() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_project(42).await;
    store.add_project(7).await;
    store
}

#[tokio::test]
async fn repeat_login_is_idempotent() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let first = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(first.action, ProvisionAction::Registered);

    let second = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(second.action, ProvisionAction::ExistingLink);
    assert_eq!(second.user.id, first.user.id);

    assert_eq!(store.user_count().await, 1);
    assert_eq!(store.link_count().await, 1);
    assert_eq!(store.membership_count().await, 1);
}

#[tokio::test]
async fn email_fallback_binds_existing_user() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "existing@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let existing = LocalUser::new("existing", "existing@example.com", "Existing User");
    store.seed_user(existing.clone()).await;

    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let response = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(response.action, ProvisionAction::LinkedByEmail);
    assert_eq!(response.user.id, existing.id);

    // No duplicate user; the link points at the pre-existing account.
    assert_eq!(store.user_count().await, 1);
    assert_eq!(store.link_count().await, 1);

    // The link, once created, is authoritative for the next login.
    let again = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(again.action, ProvisionAction::ExistingLink);
    assert_eq!(store.link_count().await, 1);
}

#[tokio::test]
async fn new_user_fires_one_registration_signal() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let notifier = Arc::new(CountingNotifier::default());
    let service = AccessTokenAuthService::with_notifier(
        Arc::new(base_config(&server)),
        store.clone(),
        notifier.clone(),
    );

    service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    service.login(&LoginRequest::bearer("at-1")).await.unwrap();

    assert_eq!(notifier.registered.load(Ordering::SeqCst), 1);
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn group_claim_resolves_project_and_role() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let response = service.login(&LoginRequest::bearer("at-1")).await.unwrap();

    let membership = response.membership.unwrap();
    assert_eq!(membership.project_id, 42);
    assert!(!membership.is_admin);

    let role = store.role(membership.role_id).await.unwrap();
    assert_eq!(role.name, "member");
    assert_eq!(role.project_id, 42);
}

#[tokio::test]
async fn unmatched_groups_fall_back_to_default() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["engineering"]),
    )
    .await;

    let store = store_with_projects().await;
    let config = base_config(&server)
        .with_default_project(7)
        .with_default_role("viewer");
    let service =
        AccessTokenAuthService::new(Arc::new(config), store.clone());

    let response = service.login(&LoginRequest::bearer("at-1")).await.unwrap();

    let membership = response.membership.unwrap();
    assert_eq!(membership.project_id, 7);
    let role = store.role(membership.role_id).await.unwrap();
    assert_eq!(role.name, "viewer");
}

#[tokio::test]
async fn filtering_mode_denies_and_writes_nothing() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["engineering"]),
    )
    .await;

    let store = store_with_projects().await;
    let config = base_config(&server).with_filter_groups(true);
    let service =
        AccessTokenAuthService::new(Arc::new(config), store.clone());

    let failure = service
        .login(&LoginRequest::bearer("at-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, "access_denied");

    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.link_count().await, 0);
    assert_eq!(store.membership_count().await, 0);
}

#[tokio::test]
async fn admin_elevation_is_monotonic() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-admin",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security", "admin:security"]),
    )
    .await;
    mount_userinfo(
        &server,
        "at-plain",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let elevated = service
        .login(&LoginRequest::bearer("at-admin"))
        .await
        .unwrap();
    assert!(elevated.membership.unwrap().is_admin);

    // A later login without the admin group must not clear the flag.
    let plain = service
        .login(&LoginRequest::bearer("at-plain"))
        .await
        .unwrap();
    assert!(plain.membership.unwrap().is_admin);
}

#[tokio::test]
async fn role_is_not_downgraded_on_repeat_login() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-member",
        userinfo_body("guid-1", "jdoe@example.com", &["member:security"]),
    )
    .await;
    mount_userinfo(
        &server,
        "at-viewer",
        userinfo_body("guid-1", "jdoe@example.com", &["viewer:security"]),
    )
    .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let first = service
        .login(&LoginRequest::bearer("at-member"))
        .await
        .unwrap();
    let original_role = first.membership.unwrap().role_id;

    let second = service
        .login(&LoginRequest::bearer("at-viewer"))
        .await
        .unwrap();
    assert_eq!(second.membership.unwrap().role_id, original_role);

    let role = store.role(original_role).await.unwrap();
    assert_eq!(role.name, "member");
}

#[tokio::test]
async fn missing_required_claim_writes_nothing() {
    let server = MockServer::start().await;

    let mut body = userinfo_body("guid-1", "jdoe@example.com", &["member:security"]);
    body.as_object_mut().unwrap().remove("email");
    mount_userinfo(&server, "at-1", body).await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let failure = service
        .login(&LoginRequest::bearer("at-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, "incomplete_identity");
    assert!(failure.detail.contains("email"));

    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.link_count().await, 0);
}

#[tokio::test]
async fn provider_failure_writes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let failure = service
        .login(&LoginRequest::bearer("at-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, "identity_provider_error");

    assert_eq!(store.user_count().await, 0);
}

#[tokio::test]
async fn username_collisions_get_numeric_suffixes() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "second@example.com", &["member:security"]),
    )
    .await;

    let store = store_with_projects().await;
    // A different person already holds the slugified username.
    store
        .seed_user(LocalUser::new("jdoe", "first@example.com", "Other Jdoe"))
        .await;

    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let response = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(response.user.username, "jdoe-1");
    assert_eq!(store.user_count().await, 2);
}

#[tokio::test]
async fn unknown_project_in_config_is_fatal() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &["member:billing"]),
    )
    .await;

    let store = Arc::new(MemoryStore::new());
    // BILLING is configured but the project row does not exist.
    let config = base_config(&server).with_project("BILLING", 99);
    let service =
        AccessTokenAuthService::new(Arc::new(config), store.clone());

    let failure = service
        .login(&LoginRequest::bearer("at-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.reason, "unknown_project");

    // The whole transaction rolled back: not even the user persists.
    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.link_count().await, 0);
}

#[tokio::test]
async fn missing_parameters_are_rejected() {
    let server = MockServer::start().await;
    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let failure = service.login(&LoginRequest::default()).await.unwrap_err();
    assert_eq!(failure.reason, "missing_parameter");

    let code_without_redirect = LoginRequest {
        code: Some("code-1".to_string()),
        ..LoginRequest::default()
    };
    let failure = service.login(&code_without_redirect).await.unwrap_err();
    assert_eq!(failure.reason, "missing_parameter");
    assert!(failure.detail.contains("redirect_uri"));
}

#[tokio::test]
async fn no_membership_without_match_or_default() {
    let server = MockServer::start().await;
    mount_userinfo(
        &server,
        "at-1",
        userinfo_body("guid-1", "jdoe@example.com", &[]),
    )
    .await;

    let store = store_with_projects().await;
    let service = AccessTokenAuthService::new(
        Arc::new(base_config(&server)),
        store.clone(),
    );

    let response = service.login(&LoginRequest::bearer("at-1")).await.unwrap();
    assert_eq!(response.action, ProvisionAction::Registered);
    assert!(response.membership.is_none());
    assert_eq!(store.membership_count().await, 0);
    assert_eq!(store.user_count().await, 1);
}
