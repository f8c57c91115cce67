#![allow(clippy::unwrap_used)]
// End-to-end tests for `Bridge`: cloud API on wiremock, broker replaced by
// an in-process connector that lets the test inject encrypted messages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tuyabridge_api::mq::{BrokerConnection, BrokerConnector, InboundMessage};
use tuyabridge_api::{AccessConfig, Error};
use tuyabridge_core::{
    Bridge, BridgeConfig, ChannelState, Credentials, ProjectType, ProtocolVersion, RegistryEvent,
    StatusValue,
};

const PASSWORD: &str = "abcdefgh0123456789ABCDEFtail";
const TOPIC: &str = "cloud/token/in/test";
const WAIT: Duration = Duration::from_secs(5);

// ── Fake broker ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeConnector {
    senders: Arc<Mutex<Vec<mpsc::Sender<InboundMessage>>>>,
}

struct FakeConnection;

impl BrokerConnection for FakeConnection {
    async fn close(self) {}
}

impl BrokerConnector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        config: &AccessConfig,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<FakeConnection, Error> {
        assert_eq!(config.source_topic.device, TOPIC);
        self.senders.lock().unwrap().push(inbound);
        Ok(FakeConnection)
    }
}

impl FakeConnector {
    fn sender(&self) -> mpsc::Sender<InboundMessage> {
        self.senders.lock().unwrap().last().cloned().unwrap()
    }
}

/// Encrypt a payload the way the broker does for protocol 1.0.
fn message(payload: &Value) -> InboundMessage {
    let key = &PASSWORD.as_bytes()[8..24];
    let ct = ecb::Encryptor::<Aes128>::new_from_slice(key)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(payload.to_string().as_bytes());
    let envelope = json!({ "protocol": 4, "pv": "1.0", "t": 1, "data": BASE64.encode(ct) });
    InboundMessage {
        topic: TOPIC.to_owned(),
        payload: envelope.to_string().into_bytes().into(),
    }
}

// ── Cloud fixtures ──────────────────────────────────────────────────

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": result }))
}

async fn mount_cloud(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1.0/iot-03/users/login"))
        .respond_with(ok(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "uid": "u1",
            // milliseconds for custom projects
            "expire": 7_200_000
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/users/assets"))
        .respond_with(ok(json!({ "assets": [{ "asset_id": "home" }] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-02/assets/home/devices"))
        .respond_with(ok(json!({ "list": [{ "device_id": "d1" }, { "device_id": "d2" }] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices"))
        .and(query_param("device_ids", "d1,d2"))
        .respond_with(ok(json!({ "list": [
            { "id": "d1", "name": "Lamp", "category": "dj", "online": true },
            { "id": "d2", "name": "Plug", "category": "cz", "online": true }
        ]})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices/status"))
        .respond_with(ok(json!([
            { "id": "d1", "status": [{ "code": "switch_led", "value": false }] },
            { "id": "d2", "status": [{ "code": "switch_1", "value": false }] }
        ])))
        .mount(server)
        .await;
    for (id, category) in [("d1", "dj"), ("d2", "cz"), ("d3", "kg")] {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/iot-03/devices/{id}/functions")))
            .respond_with(ok(json!({ "category": category, "functions": [] })))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices/d3"))
        .respond_with(ok(json!({
            "id": "d3", "name": "Relay", "online": true,
            "status": [{ "code": "switch_1", "value": true }]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1.0/iot-03/open-hub/access-config"))
        .respond_with(ok(json!({
            "url": "tcp://fake:1883",
            "client_id": "c",
            "username": "u",
            "password": PASSWORD,
            "expire_time": 7200,
            "source_topic": { "device": TOPIC }
        })))
        .mount(server)
        .await;
}

async fn setup() -> (MockServer, Bridge<FakeConnector>, FakeConnector) {
    let server = MockServer::start().await;
    mount_cloud(&server).await;

    let credentials = Credentials {
        access_id: "id".into(),
        access_key: SecretString::from("key"),
        username: "alice".into(),
        password: SecretString::from("secret"),
        country_code: Some(1),
        app_schema: None,
    };
    let mut config = BridgeConfig::new(credentials, ProjectType::Custom)
        .with_endpoint(Url::parse(&server.uri()).unwrap());
    config.protocol_version = ProtocolVersion::V1;

    let connector = FakeConnector::default();
    let bridge = Bridge::with_connector(config, connector.clone()).unwrap();
    (server, bridge, connector)
}

async fn connected(bridge: &Bridge<FakeConnector>) {
    bridge.connect().await.unwrap();
    let mut state = bridge.channel_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ChannelState::Connected))
        .await
        .unwrap()
        .unwrap();
}

/// Wait for the first event matching `pred`.
async fn next_matching(
    rx: &mut broadcast::Receiver<RegistryEvent>,
    pred: impl Fn(&RegistryEvent) -> bool,
) -> RegistryEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

// ── Lifecycle tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_loads_directory() {
    let (_server, bridge, _connector) = setup().await;
    connected(&bridge).await;

    let snapshot = bridge.devices_snapshot();
    let ids: Vec<&str> = snapshot.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2"]);
    assert_eq!(
        bridge.device("d1").unwrap().status_value("switch_led"),
        Some(&StatusValue::Bool(false))
    );

    bridge.disconnect().await;
    assert_eq!(*bridge.channel_state().borrow(), ChannelState::Stopped);
}

#[tokio::test]
async fn test_deleted_device_ignores_later_status() {
    let (_server, bridge, connector) = setup().await;
    connected(&bridge).await;
    let mut events = bridge.events();
    let tx = connector.sender();

    tx.send(message(&json!({ "bizCode": "delete", "devId": "d1" })))
        .await
        .unwrap();
    tx.send(message(&json!({
        "devId": "d1",
        "status": [{ "code": "switch_led", "value": true }]
    })))
    .await
    .unwrap();
    // Events are routed in order; this one marks the end of the batch.
    tx.send(message(&json!({
        "devId": "d2",
        "status": [{ "code": "switch_1", "value": true }]
    })))
    .await
    .unwrap();

    let event = next_matching(&mut events, |e| matches!(e, RegistryEvent::StatusChanged(_))).await;
    assert_eq!(event.device_id(), "d2");

    assert!(bridge.device("d1").is_err());
    assert_eq!(bridge.devices_snapshot().len(), 1);
    assert_eq!(
        bridge.device("d2").unwrap().status_value("switch_1"),
        Some(&StatusValue::Bool(true))
    );

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_bind_fetches_and_adds_device() {
    let (_server, bridge, connector) = setup().await;
    connected(&bridge).await;
    let mut events = bridge.events();

    connector
        .sender()
        .send(message(&json!({
            "bizCode": "bindUser",
            "bizData": { "devId": "d3", "uid": "u1" }
        })))
        .await
        .unwrap();

    let event = next_matching(&mut events, |e| {
        matches!(e, RegistryEvent::DeviceDiscovered(d) if d.id == "d3")
    })
    .await;
    let RegistryEvent::DeviceDiscovered(summary) = event else {
        unreachable!()
    };
    assert_eq!(summary.category, "kg");
    assert_eq!(summary.category_name, "Switch");

    let initial = next_matching(&mut events, |e| e.device_id() == "d3").await;
    assert!(matches!(initial, RegistryEvent::StatusChanged(ref c) if c.code == "switch_1"));
    assert_eq!(bridge.devices_snapshot().len(), 3);

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_server, bridge, _connector) = setup().await;
    connected(&bridge).await;
    // second connect is a no-op (login mock expects exactly one call)
    bridge.connect().await.unwrap();

    bridge.disconnect().await;
    bridge.disconnect().await;
    assert!(!bridge.is_connected().await);
}

// ── Command tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_returns_envelope() {
    let (server, bridge, _connector) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/iot-03/devices/d2/commands"))
        .and(body_json(json!({ "commands": [{ "code": "switch_1", "value": true }] })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    // Commands log in on demand; no channel needed.
    let resp = bridge
        .send_command("d2", "switch_1", json!(true))
        .await
        .unwrap();
    assert!(resp.success);
}
