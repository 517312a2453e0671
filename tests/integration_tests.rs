use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticklist::config::Config;
use ticklist::error::{DataStoreErrorKind, Error};
use ticklist::identity::{ProviderSession, ProviderUser};
use ticklist::models::UserRole;
use ticklist::services::{NewChecklist, NewItem, UserPatch};
use ticklist::session::AuthState;
use ticklist::Ticklist;

fn client_for(server: &MockServer) -> Ticklist {
    let config = Config::new("test-key", "app.ticklist.dev", "ticklist-test")
        .with_identity_url(&server.uri())
        .with_store_url(&server.uri());
    Ticklist::new(config)
}

fn provider_session(local_id: &str, email: Option<&str>, is_anonymous: bool) -> serde_json::Value {
    json!({
        "idToken": "id-token-1",
        "refreshToken": "refresh-token-1",
        "expiresIn": 3600,
        "user": {
            "localId": local_id,
            "email": email,
            "emailVerified": false,
            "isAnonymous": is_anonymous
        }
    })
}

fn user_doc(id: &str, email: &str, display_name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "email": email,
        "displayName": display_name,
        "emailVerified": true,
        "isActive": true,
        "isAnonymous": false,
        "role": "user",
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
        "metadata": {
            "lastLogin": "2026-01-01T00:00:00Z",
            "failedLoginAttempts": 0,
            "preferences": {
                "theme": "system",
                "notifications": { "email": true, "push": true, "sms": false }
            }
        }
    })
}

async fn wait_for_state<F>(rx: &mut watch::Receiver<AuthState>, pred: F) -> AuthState
where
    F: Fn(&AuthState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = rx.borrow().clone();
                if pred(&state) {
                    return state;
                }
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("timed out waiting for session state")
}

#[tokio::test]
async fn sign_up_with_taken_email_sets_shared_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signUp"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "email-already-in-use", "message": "EMAIL_EXISTS" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let manager = client.session_manager("test-agent");
    manager.start();

    let result = manager.sign_up("taken@example.com", "password123").await;
    assert!(result.is_err());

    let state = manager.state();
    let error = state.error.expect("shared error should be set");
    assert_eq!(error.code, "email-already-in-use");
    assert_eq!(
        error.message,
        "An account with this email address already exists."
    );
    assert!(!state.loading);
}

#[tokio::test]
async fn anonymous_sign_in_provisions_a_guest_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signUp"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(provider_session("anon-1", None, true)),
        )
        .mount(&server)
        .await;

    // No record yet, then the provisioning write.
    Mock::given(method("GET"))
        .and(path("/store/v1/users/anon-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/store/v1/users/anon-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let manager = client.session_manager("test-agent");
    manager.start();
    let mut states = manager.subscribe();

    manager.sign_in_anonymously().await.unwrap();

    let settled = wait_for_state(&mut states, |s| s.user.is_some()).await;
    let user = settled.user.unwrap();
    assert_eq!(user.id, "anon-1");
    assert_eq!(user.role, UserRole::Guest);
    assert!(user.is_anonymous);
    assert!(user.password.is_some(), "guest records carry a placeholder");
    assert!(settled.is_anonymous);
    assert!(settled.is_initialized);
}

#[tokio::test]
async fn sign_in_maps_the_existing_record_through_the_listener() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signInWithPassword"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(provider_session("u1", Some("a@b.com"), false)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_doc("u1", "a@b.com", "Ada")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let manager = client.session_manager("test-agent");
    manager.start();
    let mut states = manager.subscribe();

    manager.sign_in("a@b.com", "password123").await.unwrap();

    let settled = wait_for_state(&mut states, |s| s.user.is_some()).await;
    let user = settled.user.unwrap();
    assert_eq!(user.display_name, "Ada");
    assert!(!settled.is_anonymous);
    assert!(settled.error.is_none());
}

#[tokio::test]
async fn sign_out_settles_into_unauthenticated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signInWithPassword"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(provider_session("u1", Some("a@b.com"), false)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_doc("u1", "a@b.com", "Ada")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signOut"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let manager = client.session_manager("test-agent");
    manager.start();
    let mut states = manager.subscribe();

    manager.sign_in("a@b.com", "password123").await.unwrap();
    wait_for_state(&mut states, |s| s.user.is_some()).await;

    manager.sign_out().await.unwrap();
    let settled = wait_for_state(&mut states, |s| s.is_initialized && s.user.is_none()).await;
    assert!(!settled.is_anonymous);
    assert!(!settled.loading);
}

#[tokio::test]
async fn apple_sign_in_on_unsupported_browser_makes_no_network_call() {
    let server = MockServer::start().await;

    let client = client_for(&server);
    let chrome = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    let manager = client.session_manager(chrome);
    manager.start();

    let err = manager.sign_in_with_apple("apple-id-token").await.unwrap_err();
    assert!(matches!(err, Error::Capability(_)));
    assert_eq!(manager.state().error.unwrap().code, "unsupported-browser");

    let link_err = manager.link_with_apple("apple-id-token").await.unwrap_err();
    assert!(matches!(link_err, Error::Capability(_)));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "capability gate must fire before any request");
}

#[tokio::test]
async fn google_sign_in_provisions_on_first_visit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signInWithIdp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "id-token-1",
            "refreshToken": "refresh-token-1",
            "expiresIn": 3600,
            "user": {
                "localId": "g1",
                "email": "ada@gmail.example",
                "displayName": "Ada Lovelace",
                "emailVerified": true,
                "isAnonymous": false
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/v1/users/g1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/store/v1/users/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let manager = client.session_manager("test-agent");
    manager.start();
    let mut states = manager.subscribe();

    manager.sign_in_with_google("google-id-token").await.unwrap();

    let settled = wait_for_state(&mut states, |s| s.user.is_some()).await;
    let user = settled.user.unwrap();
    assert_eq!(user.id, "g1");
    assert_eq!(user.display_name, "Ada Lovelace");
    assert_eq!(user.role, UserRole::User);
}

#[tokio::test]
async fn create_then_get_round_trips_the_record() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let users = client.users();

    let created = users
        .create_user(ticklist::services::CreateUserInput {
            id: "u1".into(),
            email: "a@b.com".into(),
            display_name: "A".into(),
            photo_url: None,
            email_verified: false,
            is_anonymous: false,
            role: UserRole::User,
            password: None,
        })
        .await
        .unwrap();

    assert_eq!(created.created_at, created.updated_at);
    assert!(created.is_active);

    // The store now holds exactly what was written.
    Mock::given(method("GET"))
        .and(path("/store/v1/users/u1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::to_value(&created).unwrap()),
        )
        .mount(&server)
        .await;

    let fetched = users.get_user("u1").await.unwrap().unwrap();
    assert_eq!(fetched.email, "a@b.com");
    assert_eq!(fetched.display_name, "A");
    assert_eq!(fetched.created_at, fetched.updated_at);
}

#[tokio::test]
async fn empty_user_patch_skips_the_network_write() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .users()
        .update_user("u1", UserPatch::default())
        .await
        .unwrap();

    // Mock verification on drop asserts zero PATCH requests.
}

#[tokio::test]
async fn deactivation_marks_inactive_and_stamps_deleted_at() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.users().deactivate_user("u1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["isActive"], false);
    assert!(body["deletedAt"].is_string());
    assert!(body["updatedAt"].is_string());
}

#[tokio::test]
async fn deleting_a_missing_user_record_is_idempotent() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/store/v1/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.users().delete_user("ghost").await.is_ok());
}

#[tokio::test]
async fn adding_an_item_to_an_empty_checklist_writes_one_item() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/store/v1/checklists/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "title": "Groceries",
            "isPublic": false,
            "createdBy": "u1",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "items": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/store/v1/checklists/c1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.identity().set_session(Some(ProviderSession {
        id_token: "t".into(),
        refresh_token: "r".into(),
        expires_in: 3600,
        user: ProviderUser {
            local_id: "u1".into(),
            email: Some("a@b.com".into()),
            display_name: None,
            photo_url: None,
            email_verified: true,
            is_anonymous: false,
        },
    }));

    let item = client
        .checklists()
        .add_checklist_item("c1", NewItem { title: "Buy milk".into() })
        .await
        .unwrap();

    assert_eq!(item.title, "Buy milk");
    assert!(!item.completed);
    assert!(!item.id.is_empty());

    // The whole items array is written back.
    let requests = server.received_requests().await.unwrap();
    let patch = requests
        .iter()
        .find(|r| r.method.to_string() == "PATCH")
        .expect("a PATCH request");
    let body: serde_json::Value = serde_json::from_slice(&patch.body).unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Buy milk");
    assert_eq!(items[0]["completed"], false);
}

#[tokio::test]
async fn checklist_ops_without_a_session_fail_as_unauthenticated() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let err = client
        .checklists()
        .create_checklist(NewChecklist {
            title: "Groceries".into(),
            description: None,
            is_public: false,
        })
        .await
        .unwrap_err();

    match err {
        Error::DataStore(e) => assert_eq!(e.kind, DataStoreErrorKind::Unauthenticated),
        other => panic!("expected data-store error, got {:?}", other),
    }
}

#[tokio::test]
async fn get_all_checklists_distinguishes_permission_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/store/v1/checklists"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.identity().set_session(Some(ProviderSession {
        id_token: "t".into(),
        refresh_token: "r".into(),
        expires_in: 3600,
        user: ProviderUser {
            local_id: "u1".into(),
            email: Some("a@b.com".into()),
            display_name: None,
            photo_url: None,
            email_verified: true,
            is_anonymous: false,
        },
    }));

    let err = client.checklists().get_all_checklists().await.unwrap_err();
    match err {
        Error::DataStore(e) => {
            assert_eq!(e.kind, DataStoreErrorKind::PermissionDenied);
            assert_eq!(e.operation, "getAllChecklists");
        }
        other => panic!("expected data-store error, got {:?}", other),
    }
}

#[tokio::test]
async fn user_service_failures_are_generic() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/store/v1/users/u1"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.users().get_user("u1").await.unwrap_err();
    match err {
        Error::DataStore(e) => {
            // Permission detail is discarded at this boundary.
            assert_eq!(e.kind, DataStoreErrorKind::Failed);
            assert_eq!(e.operation, "getUser");
        }
        other => panic!("expected data-store error, got {:?}", other),
    }
}
