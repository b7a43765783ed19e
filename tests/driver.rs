mod common;

use common::{phone, Answer, FakeAgent};
use hmdriver::testing::RecordingBridge;
use hmdriver::{
    By, DisplayRotation, Driver, DriverError, Params, Point, Rect, ScreenSize, WindowMode,
};
use serde_json::json;

async fn driver_for(agent: &FakeAgent) -> (Driver<RecordingBridge>, RecordingBridge) {
    let bridge = RecordingBridge::new();
    let driver = Driver::start(
        bridge.clone(),
        &agent.config(),
        "com.example.app",
        "EntryAbility",
    )
    .await
    .unwrap();
    (driver, bridge)
}

#[tokio::test]
async fn find_element_and_read_properties() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let mut element = driver
        .find_element_by_id("btn_sign", None, 10)
        .await
        .unwrap()
        .expect("element");
    assert_eq!(element.euid(), "E1");
    assert_eq!(agent.frames()[0]["timeout_s"], "10");

    // text came with the find reply, so no request is made
    assert_eq!(element.text().await.unwrap(), "Sign in");
    assert_eq!(agent.frames().len(), 1);

    assert_eq!(element.bounds().await.unwrap(), Rect::new(0, 100, 200, 300));
    assert!(element.is_clickable().await.unwrap());
    assert_eq!(agent.frames().len(), 3);

    // both cached now
    element.bounds().await.unwrap();
    element.is_clickable().await.unwrap();
    assert_eq!(agent.frames().len(), 3);

    driver.stop().await;
}

#[tokio::test]
async fn invalidate_refetches_info() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let mut element = driver
        .find_element(By::Id, "btn_sign", None, 5)
        .await
        .unwrap()
        .unwrap();
    element.invalidate();
    assert!(element.cached().is_empty());

    assert_eq!(element.id().await.unwrap(), "btn_sign");
    let last = agent.frames().pop().unwrap();
    assert_eq!(last["action"], "get");
    assert_eq!(last["property"], "info");
    assert_eq!(last["euid"], "E1");

    driver.stop().await;
}

#[tokio::test]
async fn missing_element_is_none() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let found = driver.find_element_by_text("nothing here", None, 0).await.unwrap();
    assert!(found.is_none());
    driver.stop().await;
}

#[tokio::test]
async fn element_operations_carry_operands() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let element = driver
        .find_element_by_id("btn_sign", None, 10)
        .await
        .unwrap()
        .unwrap();
    element.input_text("hello").await.unwrap();
    element.scroll_to_bottom(2.0).await.unwrap();

    let frames = agent.frames();
    assert_eq!(frames[1]["operate"], "input");
    assert_eq!(frames[1]["text"], "hello");
    assert_eq!(frames[2]["operate"], "scrollToBottom");
    assert_eq!(frames[2]["param"], 2.0);

    driver.stop().await;
}

#[tokio::test]
async fn find_elements_returns_every_match() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let mut filters = Params::new();
    filters.insert("enabled".into(), json!(false));
    let elements = driver
        .find_elements(By::Text, "设置", filters, 5)
        .await
        .unwrap()
        .unwrap();
    let euids: Vec<&str> = elements.iter().map(|e| e.euid()).collect();
    assert_eq!(euids, ["E2", "E3"]);
    assert_eq!(agent.frames()[0]["enabled"], false);

    driver.stop().await;
}

#[tokio::test]
async fn find_elements_polls_until_something_shows_up() {
    let agent = FakeAgent::start(|frame, seen| match seen {
        0 => Answer::Reply(json!({"ret": "ok", "data": []})),
        _ => phone(frame, seen),
    })
    .await;
    let (driver, _) = driver_for(&agent).await;

    let elements = driver
        .find_elements_by_text("设置", Params::new(), 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(elements.len(), 2);
    assert_eq!(agent.actions(), ["finds", "finds"]);

    driver.stop().await;
}

#[tokio::test]
async fn find_elements_gives_up_after_timeout() {
    let agent = FakeAgent::start(|_, _| Answer::Reply(json!({"ret": "ok", "data": []}))).await;
    let (driver, _) = driver_for(&agent).await;

    let found = driver
        .find_elements_by_id("nothing", Params::new(), 1)
        .await
        .unwrap();
    assert!(found.is_none());
    driver.stop().await;
}

#[tokio::test]
async fn find_elements_with_no_budget_sends_nothing() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let found = driver
        .find_elements_by_text("设置", Params::new(), 0)
        .await
        .unwrap();
    assert!(found.is_none());
    assert!(agent.frames().is_empty());
    driver.stop().await;
}

#[tokio::test]
async fn screen_size_out_of_range_is_a_protocol_error() {
    let agent = FakeAgent::start(|frame, seen| match frame["action"].as_str() {
        Some("screenSize") => Answer::Reply(json!({
            "ret": "ok",
            "data": {"x": 5_000_000_000i64, "y": 10}
        })),
        _ => phone(frame, seen),
    })
    .await;
    let (driver, _) = driver_for(&agent).await;

    assert!(matches!(
        driver.screen_size().await,
        Err(DriverError::Protocol(msg)) if msg.contains("out of range")
    ));
    driver.stop().await;
}

#[tokio::test]
async fn window_lookup_and_properties() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    let mut window = driver
        .find_window_by_title("Settings")
        .await
        .unwrap()
        .expect("window");
    assert_eq!(window.wuid(), "W1");
    assert_eq!(agent.frames()[0]["filter"], json!({"title": "Settings"}));

    assert_eq!(window.title().await.unwrap(), "Settings");
    assert_eq!(window.window_mode().await.unwrap(), WindowMode::Fullscreen);
    assert!(window.is_focused().await.unwrap());
    window.move_to(10, 20).await.unwrap();

    let frames = agent.frames();
    assert_eq!(frames[1]["property"], "info");
    assert_eq!(frames[2]["property"], "isFocused");
    assert_eq!(frames[3]["func"], "moveTo");
    assert_eq!(frames[3]["x"], 10);

    driver.stop().await;
}

#[tokio::test]
async fn device_queries_decode() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    assert_eq!(
        driver.screen_size().await.unwrap(),
        ScreenSize {
            width: 1260,
            height: 2720
        }
    );
    assert_eq!(driver.get_rotation().await.unwrap(), DisplayRotation::Rotation90);
    assert_eq!(driver.current_bundle().await.unwrap(), "com.huawei.hmos.settings");

    driver.stop().await;
}

#[tokio::test]
async fn gestures_encode_their_operands() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;

    driver.click(10, 20).await.unwrap();
    driver
        .swipe(Point::new(200, 1500), Point::new(200, 500), 0.5)
        .await
        .unwrap();
    driver.fling_up().await.unwrap();
    driver.press_key(hmdriver::KeyCode::Enter).await.unwrap();

    let frames = agent.frames();
    assert_eq!(frames[0]["x"], "10");
    assert_eq!(frames[1]["speed"], "2000");
    assert_eq!(frames[1]["time_s"], "0.5");
    assert_eq!(frames[2]["direction"], 2);
    assert_eq!(frames[3]["key"], 2054);

    driver.stop().await;
}

#[tokio::test]
async fn handles_fail_after_stop() {
    let agent = FakeAgent::start(phone).await;
    let (driver, bridge) = driver_for(&agent).await;

    let mut element = driver
        .find_element_by_id("btn_sign", None, 10)
        .await
        .unwrap()
        .unwrap();
    driver.stop().await;

    assert!(matches!(element.click().await, Err(DriverError::SessionClosed)));
    element.invalidate();
    assert!(matches!(element.text().await, Err(DriverError::SessionClosed)));
    assert!(matches!(driver.home().await, Err(DriverError::SessionClosed)));
    assert_eq!(bridge.count_containing("aa force-stop com.harmony.uitest"), 1);
}

#[tokio::test]
async fn handles_fail_after_driver_is_dropped() {
    let agent = FakeAgent::start(phone).await;
    let (driver, _) = driver_for(&agent).await;
    let element = driver
        .find_element_by_id("btn_sign", None, 10)
        .await
        .unwrap()
        .unwrap();
    driver.stop().await;
    drop(driver);

    assert!(matches!(element.click().await, Err(DriverError::SessionClosed)));
}

#[tokio::test]
async fn dropping_a_running_driver_tears_the_agent_down() {
    let agent = FakeAgent::start(phone).await;
    let (driver, bridge) = driver_for(&agent).await;
    let element = driver
        .find_element_by_id("btn_sign", None, 10)
        .await
        .unwrap()
        .unwrap();
    drop(driver);

    let port = agent.port;
    let detached: Vec<String> = bridge
        .invocations()
        .iter()
        .filter(|i| i.detached)
        .map(|i| i.line())
        .collect();
    assert!(detached.contains(&"-t FAKE0001 shell aa force-stop com.harmony.uitest".to_string()));
    assert!(detached.contains(&format!("-t FAKE0001 fport rm tcp:{port} tcp:29100")));
    assert!(matches!(element.click().await, Err(DriverError::SessionClosed)));
}

#[tokio::test]
async fn dropping_a_stopped_driver_spawns_nothing_more() {
    let agent = FakeAgent::start(phone).await;
    let (driver, bridge) = driver_for(&agent).await;
    driver.stop().await;
    let before = bridge.invocations().len();
    drop(driver);

    assert_eq!(bridge.invocations().len(), before);
    assert_eq!(bridge.count_containing("fport rm"), 1);
}

#[tokio::test]
async fn app_lifecycle_goes_through_the_bridge() {
    let agent = FakeAgent::start(phone).await;
    let (driver, bridge) = driver_for(&agent).await;

    driver.start_app().await.unwrap();
    driver.stop_app().await.unwrap();

    let lines = bridge.lines();
    let start = "-t FAKE0001 shell aa start -a EntryAbility -b com.example.app -D";
    assert!(lines.iter().any(|l| l == start));
    assert!(lines
        .iter()
        .any(|l| l == "-t FAKE0001 shell aa force-stop com.example.app"));
    driver.stop().await;
}

#[tokio::test]
async fn helper_packages_are_installed_before_connecting() {
    let agent = FakeAgent::start(phone).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("entry-default-unsigned.hap"), b"hap").unwrap();

    let bridge = RecordingBridge::new();
    bridge.respond(" install ", "install bundle successfully.");
    let config = hmdriver::SessionConfig {
        hap_dir: Some(dir.path().to_path_buf()),
        ..agent.config()
    };
    let driver = Driver::start(bridge.clone(), &config, "", "").await.unwrap();

    let lines = bridge.lines();
    let install = lines.iter().position(|l| l.contains(" install ")).unwrap();
    let forward = lines.iter().position(|l| l.contains("fport tcp:")).unwrap();
    assert!(install < forward);
    // the missing test package is skipped
    assert_eq!(bridge.count_containing(" install "), 1);
    driver.stop().await;
}
