mod common;

use common::{phone, Answer, FakeAgent};
use hmdriver::testing::RecordingBridge;
use hmdriver::{Command, DriverError, Session, SessionConfig};
use serde_json::json;

#[tokio::test]
async fn request_round_trip_strips_correlation_id() {
    let agent = FakeAgent::start(phone).await;
    let bridge = RecordingBridge::new();
    let mut session = Session::open(bridge.clone(), &agent.config()).await.unwrap();
    assert!(session.is_connected());

    let reply = session
        .request(&Command::Get {
            euid: "E1".into(),
            property: "text".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.as_map(), json!({"ret": "ok", "data": "Sign in"}).as_object().unwrap());

    let frames = agent.frames();
    assert_eq!(frames.len(), 1);
    let id = frames[0]["uuid"].as_str().unwrap();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    // forward set up and agent launched through the bridge
    let port = agent.port;
    assert!(bridge
        .lines()
        .contains(&format!("-t FAKE0001 fport tcp:{port} tcp:29100")));
    assert_eq!(bridge.invocations().iter().filter(|i| i.detached).count(), 1);

    session.stop().await;
}

#[tokio::test]
async fn every_request_gets_a_fresh_id() {
    let agent = FakeAgent::start(phone).await;
    let mut session = Session::open(RecordingBridge::new(), &agent.config()).await.unwrap();

    session.request(&Command::Home).await.unwrap();
    session.request(&Command::Home).await.unwrap();

    let frames = agent.frames();
    assert_ne!(frames[0]["uuid"], frames[1]["uuid"]);
    session.stop().await;
}

#[tokio::test]
async fn nothing_listening_times_out() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let config = SessionConfig {
        local_port: Some(port),
        connect_timeout_s: 1,
        ..SessionConfig::new("FAKE0001")
    };
    let err = Session::open(RecordingBridge::new(), &config).await.unwrap_err();
    assert!(matches!(err, DriverError::TransportTimeout(1)));
    assert_eq!(err.to_string(), "socket client init timeout after 1 seconds");
}

#[tokio::test]
async fn hangup_reconnects_and_resends() {
    let agent = FakeAgent::start(|frame, seen| {
        if seen == 0 {
            Answer::Hangup
        } else {
            phone(frame, seen)
        }
    })
    .await;
    let bridge = RecordingBridge::new();
    let mut session = Session::open(bridge.clone(), &agent.config()).await.unwrap();

    let reply = session.request(&Command::CurrentBundle).await.unwrap();
    assert_eq!(reply.data(), Some(&json!("com.huawei.hmos.settings")));

    assert_eq!(agent.connections(), 2);
    let frames = agent.frames();
    assert_eq!(frames.len(), 2);
    assert_ne!(frames[0]["uuid"], frames[1]["uuid"]);
    // the agent is restarted on the way
    assert_eq!(bridge.count_containing("aa force-stop com.harmony.uitest"), 1);
    assert_eq!(bridge.invocations().iter().filter(|i| i.detached).count(), 2);

    session.stop().await;
}

#[tokio::test]
async fn agent_error_is_not_retried() {
    let agent = FakeAgent::start(|_, _| {
        Answer::Reply(json!({"ret": "error", "description": "operate failed"}))
    })
    .await;
    let mut session = Session::open(RecordingBridge::new(), &agent.config()).await.unwrap();

    let err = session.request(&Command::Back).await.unwrap_err();
    assert!(matches!(err, DriverError::Agent(ref d) if d == "operate failed"));
    assert_eq!(agent.frames().len(), 1);
    assert_eq!(agent.connections(), 1);
    session.stop().await;
}

#[tokio::test]
async fn not_found_is_typed() {
    let agent = FakeAgent::start(phone).await;
    let mut session = Session::open(RecordingBridge::new(), &agent.config()).await.unwrap();

    let err = session
        .request(&Command::Find {
            by: hmdriver::By::Text,
            data: "missing".into(),
            params: None,
            timeout_s: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::ElementNotFound(_)));
    session.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_session() {
    let agent = FakeAgent::start(phone).await;
    let bridge = RecordingBridge::new();
    let mut session = Session::open(bridge.clone(), &agent.config()).await.unwrap();

    session.stop().await;
    session.stop().await;

    assert!(!session.is_connected());
    assert_eq!(bridge.count_containing("fport rm"), 1);
    assert!(matches!(
        session.request(&Command::Home).await,
        Err(DriverError::SessionClosed)
    ));
}
