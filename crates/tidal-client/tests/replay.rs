mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    gated_client, grant, http_client, signed_in_store, GatedExchange, RecordingNotifier,
};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tidal_client::{
    ApiRequest, AuthFailure, ClientError, EndpointKind, ExchangeError, Notice, RequestReplayer,
    TokenStore,
};

async fn wait_for_parked(replayer: &RequestReplayer, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while replayer.pending_len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("calls parked");
}

#[tokio::test]
async fn parked_calls_replay_with_new_token() {
    let mut server = Server::new_async().await;
    for name in ["a", "b", "c"] {
        let path = format!("/items/{name}");
        server
            .mock("GET", path.as_str())
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", path.as_str())
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body(json!({"name": name}).to_string())
            .expect(1)
            .create_async()
            .await;
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let exchange = GatedExchange::new(vec![Ok(grant("new", None))]);
    let client = gated_client(
        &server.url(),
        signed_in_store("old", "r1"),
        notifier.clone(),
        exchange.clone(),
    );
    let replayer = client.requests().clone();

    let calls: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let replayer = replayer.clone();
            tokio::spawn(async move { replayer.send(ApiRequest::get(format!("/items/{name}"))).await })
        })
        .collect();
    wait_for_parked(&replayer, 3).await;
    assert_eq!(exchange.calls(), 1);

    exchange.release();
    let mut bodies = Vec::new();
    for call in calls {
        bodies.push(call.await.expect("join").expect("replayed"));
    }

    assert_eq!(
        bodies,
        vec![json!({"name": "a"}), json!({"name": "b"}), json!({"name": "c"})]
    );
    assert_eq!(replayer.pending_len(), 0);
    assert_eq!(exchange.calls(), 1);
    assert!(notifier.notices().is_empty());
}

#[tokio::test]
async fn failed_refresh_rejects_every_parked_call_then_next_cycle_recovers() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Any)
        .match_header("authorization", Matcher::Regex("^Bearer (old|stale)$".into()))
        .with_status(401)
        .create_async()
        .await;
    let replayed = server
        .mock("GET", "/items/9")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"id":9}"#)
        .expect(1)
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let exchange = GatedExchange::new(vec![
        Err(ExchangeError::Rejected { status: 401 }),
        Ok(grant("new", None)),
    ]);
    let store = signed_in_store("old", "r1");
    let client = gated_client(&server.url(), store.clone(), notifier.clone(), exchange.clone());
    let replayer = client.requests().clone();

    let calls: Vec<_> = (0..3)
        .map(|index| {
            let replayer = replayer.clone();
            tokio::spawn(async move { replayer.send(ApiRequest::get(format!("/items/{index}"))).await })
        })
        .collect();
    wait_for_parked(&replayer, 3).await;
    assert_eq!(client.refresher().in_flight().expect("in flight").cycle(), 1);
    exchange.release();

    for call in calls {
        assert_eq!(
            call.await.expect("join"),
            Err(ClientError::AuthTerminal(AuthFailure::RefreshRejected {
                status: 401
            }))
        );
    }
    assert_eq!(replayer.pending_len(), 0);
    assert_eq!(notifier.notices(), vec![Notice::SessionExpired]);
    assert_eq!(notifier.redirects(), 1);
    assert_eq!(store.get("access_token").expect("get"), None);

    client.tokens().store_access_token("stale").expect("store");
    client.tokens().store_refresh_token("r2").expect("store");
    let call = {
        let replayer = replayer.clone();
        tokio::spawn(async move { replayer.send(ApiRequest::get("/items/9")).await })
    };
    wait_for_parked(&replayer, 1).await;
    assert_eq!(client.refresher().in_flight().expect("in flight").cycle(), 2);
    exchange.release();

    assert_eq!(call.await.expect("join"), Ok(json!({"id": 9})));
    replayed.assert_async().await;
    assert_eq!(replayer.pending_len(), 0);
    assert_eq!(exchange.calls(), 2);
    assert_eq!(notifier.notices(), vec![Notice::SessionExpired]);
}

#[tokio::test]
async fn replayed_unauthorized_is_terminal() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/items/1")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let exchange = GatedExchange::new(vec![Ok(grant("new", None))]);
    exchange.release();
    let client = gated_client(
        &server.url(),
        signed_in_store("old", "r1"),
        notifier.clone(),
        exchange,
    );

    let err = client
        .requests()
        .send(ApiRequest::delete("/items/1"))
        .await
        .expect_err("terminal");

    assert_eq!(err, ClientError::AuthTerminal(AuthFailure::RetryUnauthorized));
    assert_eq!(notifier.notices(), vec![Notice::Unauthorized]);
}

#[tokio::test]
async fn login_failure_reports_server_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/login")
        .with_status(401)
        .with_body(r#"{"code":401,"msg":"Wrong password"}"#)
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let client = http_client(&server.url(), signed_in_store("old", "r1"), notifier.clone());

    let err = client
        .login(json!({"username": "ana", "password": "nope"}))
        .await
        .expect_err("rejected");

    assert_eq!(
        err,
        ClientError::AuthTerminal(AuthFailure::Unrefreshable(EndpointKind::Login))
    );
    assert_eq!(
        notifier.notices(),
        vec![Notice::InvalidCredentials("Wrong password".into())]
    );
    assert_eq!(notifier.redirects(), 0);
}

#[tokio::test]
async fn login_stores_issued_grant() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/login")
        .with_status(200)
        .with_body(r#"{"code":0,"msg":"OK","data":{"access_token":"a1","refresh_token":"r1"}}"#)
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(tidal_client::MemoryTokenStore::new(common::DOMAIN));
    let client = http_client(&server.url(), store.clone(), notifier);

    let grant = client
        .login(json!({"username": "ana", "password": "secret"}))
        .await
        .expect("login");

    assert_eq!(grant.access_token, "a1");
    assert!(client.is_authenticated().expect("store"));
    assert_eq!(store.get("refresh_token").expect("get"), Some("r1".into()));
}

#[tokio::test]
async fn logout_unauthorized_tears_session_down() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/logout")
        .with_status(401)
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let store = signed_in_store("old", "r1");
    let client = http_client(&server.url(), store.clone(), notifier.clone());

    let err = client.logout().await.expect_err("logout 401");

    assert_eq!(
        err,
        ClientError::AuthTerminal(AuthFailure::Unrefreshable(EndpointKind::Logout))
    );
    assert_eq!(notifier.notices(), vec![Notice::SessionExpired]);
    assert_eq!(store.get("refresh_token").expect("get"), None);
}

#[tokio::test]
async fn empty_and_text_bodies_decode_leniently() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/empty")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("GET", "/text")
        .with_status(200)
        .with_body("pong")
        .create_async()
        .await;
    let notifier = Arc::new(RecordingNotifier::default());
    let client = http_client(&server.url(), signed_in_store("old", "r1"), notifier);

    let empty = client.requests().send(ApiRequest::get("/empty")).await;
    let text = client.requests().send(ApiRequest::get("/text")).await;

    assert_eq!(empty, Ok(Value::Null));
    assert_eq!(text, Ok(Value::String("pong".into())));
}
