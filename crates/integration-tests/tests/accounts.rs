use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use auth_adapters::RecaptchaVerifier;
use axum::routing::post;
use axum::{Form, Json, Router};
use domains::{
    AccountUpdate, DomainError, PostUpdate, ProfileUpdate, PublicationStatus, SYSTEM_USER_ID,
};
use integration_tests::{registration, TestApp, PASSWORD};
use secrecy::SecretString;
use serde_json::{json, Value};

#[tokio::test]
async fn test_duplicate_email_is_rejected_case_insensitively() {
    let app = TestApp::new().await;
    let alice = app.user("alice", "alice@example.com").await;

    let err = app
        .accounts
        .register(registration("alice2", "Alice@Example.COM"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { field: "email", .. }));

    let err = app
        .accounts
        .register(registration("alice", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { field: "username", .. }));

    let unchanged = app.accounts.get(alice.id).await.unwrap();
    assert_eq!(unchanged.email, "alice@example.com");
    assert_eq!(app.count("users").await, 2);
    assert_eq!(app.accounts.profile(alice.id).await.unwrap().bio, "");
}

#[tokio::test]
async fn test_account_update_cannot_take_someone_elses_email() {
    let app = TestApp::new().await;
    let alice = app.user("alice", "alice@example.com").await;
    app.user("bob", "bob@example.com").await;

    let update = |email: &str| AccountUpdate {
        username: "alice".into(),
        email: email.into(),
        first_name: "Alice".into(),
        last_name: "Liddell".into(),
    };
    let err = app
        .accounts
        .update_account(alice.id, update("BOB@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { field: "email", .. }));

    // Own address in another case is fine.
    let updated = app
        .accounts
        .update_account(alice.id, update("ALICE@example.com"))
        .await
        .unwrap();
    assert_eq!(updated.first_name, "Alice");
}

#[tokio::test]
async fn test_profile_keeps_avatar_when_omitted() {
    let app = TestApp::new().await;
    let alice = app.user("alice", "alice@example.com").await;

    let profile = app
        .accounts
        .update_profile(
            alice.id,
            ProfileUpdate {
                bio: "Writes about tea.".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.bio, "Writes about tea.");
    assert_eq!(profile.avatar, None);

    let err = app
        .accounts
        .update_profile(
            alice.id,
            ProfileUpdate {
                bio: "x".repeat(501),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { field: "bio", .. }));
}

#[tokio::test]
async fn test_login_checks_password_after_captcha() {
    let app = TestApp::new().await;
    let alice = app.user("alice", "alice@example.com").await;

    let user = app
        .accounts
        .authenticate("alice", PASSWORD, "token", None)
        .await
        .unwrap();
    assert_eq!(user.id, alice.id);

    let err = app
        .accounts
        .authenticate("alice", "wrong-password-1", "token", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Auth));
    let err = app
        .accounts
        .authenticate("nobody", PASSWORD, "token", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Auth));
}

async fn siteverify(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    if form.get("response").map(String::as_str) == Some("slow") {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Json(json!({ "success": form.get("response").map(String::as_str) == Some("human") }))
}

#[tokio::test]
async fn test_recaptcha_failures_fail_closed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/siteverify", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let app = Router::new().route("/siteverify", post(siteverify));
        axum::serve(listener, app).await.unwrap();
    });

    let verifier =
        RecaptchaVerifier::new(SecretString::from("secret"), url, Duration::from_secs(5)).unwrap();
    let app = TestApp::with_captcha(Arc::new(verifier), Duration::from_millis(200)).await;
    app.user("alice", "alice@example.com").await;
    let ip = Some("1.2.3.4".parse().unwrap());

    assert!(app
        .accounts
        .authenticate("alice", PASSWORD, "human", ip)
        .await
        .is_ok());

    for response in ["robot", "slow"] {
        let err = app
            .accounts
            .authenticate("alice", PASSWORD, response, ip)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Challenge(_)), "{response}: {err:?}");
    }

    let unreachable = RecaptchaVerifier::new(
        SecretString::from("secret"),
        "http://127.0.0.1:1/siteverify",
        Duration::from_millis(200),
    )
    .unwrap();
    let app = TestApp::with_captcha(Arc::new(unreachable), Duration::from_secs(1)).await;
    app.user("alice", "alice@example.com").await;
    let err = app
        .accounts
        .authenticate("alice", PASSWORD, "human", ip)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Challenge(_)));
}

#[tokio::test]
async fn test_deleting_a_user_applies_each_relation_policy() {
    let app = TestApp::new().await;
    let alice = app.user("alice", "alice@example.com").await;
    let bob = app.user("bob", "bob@example.com").await;
    let cat = app.category("General", None).await;

    let by_alice = app.post(alice.id, "By Alice", cat.id).await;
    let by_bob = app.post(bob.id, "By Bob", cat.id).await;
    app.posts
        .update(
            by_alice.id,
            bob.id,
            PostUpdate {
                title: by_alice.title.clone(),
                description: by_alice.description.clone(),
                text: "edited by bob".into(),
                category_id: cat.id,
                status: PublicationStatus::Published,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let alice_says = app.comment(alice.id, by_bob.id, None, "nice").await;
    app.comment(bob.id, by_bob.id, Some(alice_says.id), "thanks").await;
    app.comment(bob.id, by_bob.id, None, "bump").await;
    app.ratings
        .cast_vote(by_bob.id, "1.1.1.1", 1, Some(alice.id))
        .await
        .unwrap();
    app.ratings.cast_vote(by_bob.id, "2.2.2.2", 1, None).await.unwrap();

    app.accounts.delete_account(alice.id).await.unwrap();

    // Posts: author falls back to the system user.
    let orphan = app.posts.get(by_alice.id).await.unwrap();
    assert_eq!(orphan.author_id, SYSTEM_USER_ID);
    assert_eq!(orphan.updater_id, Some(bob.id));
    // Comments: hers and the replies under them are gone.
    let left: Vec<_> = app
        .comments
        .thread(by_bob.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(left, ["bump"]);
    // Votes and profile go too.
    assert_eq!(app.ratings.score_of(by_bob.id).await.unwrap(), 1);
    assert!(matches!(
        app.accounts.profile(alice.id).await.unwrap_err(),
        DomainError::NotFound { .. }
    ));

    app.accounts.delete_account(bob.id).await.unwrap();
    let orphan = app.posts.get(by_alice.id).await.unwrap();
    assert_eq!(orphan.updater_id, None);
    assert_eq!(app.posts.get(by_bob.id).await.unwrap().author_id, SYSTEM_USER_ID);
    assert_eq!(app.count("comments").await, 0);
    assert_eq!(app.count("users").await, 1);
}

#[tokio::test]
async fn test_system_user_cannot_be_deleted() {
    let app = TestApp::new().await;
    let err = app.accounts.delete_account(SYSTEM_USER_ID).await.unwrap_err();
    assert!(matches!(err, DomainError::Referential(_)));
    assert_eq!(app.count("users").await, 1);
}
