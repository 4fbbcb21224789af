//! End-to-end: a real listener, REST over reqwest, the gateway over
//! tokio-tungstenite through `flock-client`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TokenTtl;
use reqwest::StatusCode;
use tokio_tungstenite::tungstenite;

use flock_client::{LiveFeed, Session};
use flock_db::Database;
use flock_server::config::Config;
use flock_server::{app_state, build_router};
use flock_types::Id;
use flock_types::api::{AuthResponse, LikeSummary};
use flock_types::models::{Message, NotificationKind, Post};

const WAIT: Duration = Duration::from_secs(5);

struct Server {
    base: String,
    http: reqwest::Client,
}

struct Account {
    id: Id,
    session: Session,
}

async fn spawn_server() -> Server {
    spawn_server_on(Database::open_in_memory().unwrap()).await
}

async fn spawn_server_on(db: Database) -> Server {
    let config = Config {
        jwt_secret: "e2e-secret".into(),
        db_path: "unused.db".into(),
        host: "127.0.0.1".into(),
        port: 0,
        token_ttl: TokenTtl::hours(1),
    };
    let app = build_router(app_state(Arc::new(db), &config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
    }
}

impl Server {
    async fn register(&self, username: &str) -> Account {
        let response = self
            .http
            .post(format!("{}/register", self.base))
            .json(&serde_json::json!({
                "username": username,
                "email": format!("{username}@flock.test"),
                "password": "correct horse battery",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let auth: AuthResponse = response.json().await.unwrap();
        Account {
            id: auth.user.id,
            session: Session::new(&self.base, auth.token),
        }
    }

    async fn post(&self, who: &Account, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http
            .post(format!("{}{}", self.base, path))
            .bearer_auth(who.session.token())
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn create_post(&self, who: &Account, content: &str) -> Post {
        let response = self.post(who, "/posts", serde_json::json!({ "content": content })).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn follow(&self, who: &Account, target: &Account) {
        let response = self
            .post(who, &format!("/users/{}/follow", target.id), serde_json::json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut).await.expect("timed out")
}

/// Poll `check` until it holds. Gateway commands have no reply, so their
/// effect is observed through REST.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    within(async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}

async fn wait_for_count(feed: &mut LiveFeed, count: usize) {
    within(feed.wait_until(|store| store.len() >= count)).await.unwrap();
}

#[tokio::test]
async fn follow_reaches_every_open_tab() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let mut tab_one = bob.session.mount().await.unwrap();
    let mut tab_two = bob.session.mount().await.unwrap();
    assert_eq!(tab_one.user_id(), bob.id);

    server.follow(&alice, &bob).await;

    for tab in [&mut tab_one, &mut tab_two] {
        wait_for_count(tab, 1).await;
        let notifications = tab.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Follow);
        assert_eq!(notifications[0].actor_id, alice.id);
        assert_eq!(notifications[0].actor_username, "alice");
        assert_eq!(tab.unread_count(), 1);
    }
}

#[tokio::test]
async fn notification_created_offline_is_in_history() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    server.follow(&alice, &bob).await;

    let feed = bob.session.mount().await.unwrap();
    let notifications = feed.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Follow);
    assert!(!notifications[0].is_read);
    assert_eq!(feed.unread_count(), 1);
}

#[tokio::test]
async fn mark_read_is_scoped_to_the_recipient() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let carol = server.register("carol").await;

    server.follow(&alice, &bob).await;
    server.follow(&bob, &carol).await;

    let bobs = bob.session.fetch_notifications().await.unwrap();
    let carols = carol.session.fetch_notifications().await.unwrap();
    let (bobs_id, carols_id) = (bobs[0].id, carols[0].id);

    // Carol tries Bob's notification, then reads her own. Commands on one
    // connection are handled in order, so once hers is read the attempt
    // on Bob's has been processed.
    let carol_feed = carol.session.mount().await.unwrap();
    carol_feed.mark_read(bobs_id);
    carol_feed.mark_read(carols_id);
    let carol_session = &carol.session;
    eventually(|| async move { carol_session.fetch_notifications().await.unwrap()[0].is_read }).await;

    assert!(!bob.session.fetch_notifications().await.unwrap()[0].is_read);

    let bob_feed = bob.session.mount().await.unwrap();
    bob_feed.mark_read(bobs_id);
    bob_feed.mark_read(bobs_id);
    assert_eq!(bob_feed.unread_count(), 0);
    let bob_session = &bob.session;
    eventually(|| async move { bob_session.fetch_notifications().await.unwrap()[0].is_read }).await;

    let remounted = bob.session.mount().await.unwrap();
    assert_eq!(remounted.unread_count(), 0);
}

#[tokio::test]
async fn duplicate_like_conflicts_and_notifies_once() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let post = server.create_post(&bob, "first light").await;

    let mut feed = bob.session.mount().await.unwrap();
    let path = format!("/posts/{}/like", post.id);

    let first = server.post(&alice, &path, serde_json::json!({})).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let summary: LikeSummary = first.json().await.unwrap();
    assert_eq!(summary.likes, 1);
    assert!(summary.is_liked_by_user);

    let second = server.post(&alice, &path, serde_json::json!({})).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    wait_for_count(&mut feed, 1).await;
    let notifications = feed.notifications();
    assert_eq!(notifications[0].kind, NotificationKind::Like);
    assert_eq!(notifications[0].target_id, Some(post.id));

    let history = bob.session.fetch_notifications().await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn liking_and_commenting_on_own_post_is_silent() {
    let server = spawn_server().await;
    let bob = server.register("bob").await;
    let post = server.create_post(&bob, "talking to myself").await;

    let like = server.post(&bob, &format!("/posts/{}/like", post.id), serde_json::json!({})).await;
    assert_eq!(like.status(), StatusCode::CREATED);
    let comment = server
        .post(&bob, &format!("/posts/{}/comments", post.id), serde_json::json!({ "content": "hm" }))
        .await;
    assert_eq!(comment.status(), StatusCode::CREATED);

    assert!(bob.session.fetch_notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn self_follow_is_a_bad_request() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;

    let response = server
        .post(&alice, &format!("/users/{}/follow", alice.id), serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_to_offline_user_is_kept() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let response = server
        .post(&alice, &format!("/messages/{}", bob.id), serde_json::json!({ "content": "you there?" }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let conversation = bob.session.fetch_conversation(alice.id).await.unwrap();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].sender_id, alice.id);
    assert_eq!(conversation[0].content, "you there?");
}

#[tokio::test]
async fn message_is_pushed_to_a_joined_conversation() {
    let server = spawn_server().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let mut bob_feed = bob.session.mount().await.unwrap();
    bob_feed.join_conversation(alice.id);
    // Sent after the join on the same connection, so seeing it stored
    // means the join is in effect.
    bob_feed.send_message(alice.id, "ready when you are");
    let (alice_session, bob_id) = (&alice.session, bob.id);
    eventually(|| async move { !alice_session.fetch_conversation(bob_id).await.unwrap().is_empty() }).await;

    let response = server
        .post(&alice, &format!("/messages/{}", bob.id), serde_json::json!({ "content": "hello" }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let sent: Message = response.json().await.unwrap();

    let pushed = within(bob_feed.next_message()).await.unwrap();
    assert_eq!(pushed, sent);

    let conversation = alice.session.fetch_conversation(bob.id).await.unwrap();
    let contents: Vec<_> = conversation.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["ready when you are", "hello"]);
}

#[tokio::test]
async fn gateway_refuses_bad_credentials() {
    let server = spawn_server().await;
    let ws_base = server.base.replacen("http://", "ws://", 1);

    for url in [format!("{ws_base}/gateway"), format!("{ws_base}/gateway?token=not-a-jwt")] {
        match tokio_tungstenite::connect_async(url).await.err() {
            Some(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401);
            }
            Some(other) => panic!("expected 401, got {other}"),
            None => panic!("gateway accepted a bad credential"),
        }
    }
}

#[tokio::test]
async fn notifications_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flock.db");

    let first = spawn_server_on(Database::open(&path).unwrap()).await;
    let alice = first.register("alice").await;
    let bob = first.register("bob").await;
    first.follow(&alice, &bob).await;

    let second = spawn_server_on(Database::open(&path).unwrap()).await;
    let session = Session::new(&second.base, bob.session.token());
    let history = session.fetch_notifications().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor_id, alice.id);
}
