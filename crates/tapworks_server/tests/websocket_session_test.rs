//! End-to-end test: a real listener, a real WebSocket client.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tapworks_economy::{Economy, ItemCatalog, ItemFormula, MemoryLedger};
use tapworks_server::{LocalHostDirectory, RoomServer, ServerConfig};
use tapworks_shared::{GameResponse, ServerMessage};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

fn catalog() -> ItemCatalog {
    ItemCatalog::new([ItemFormula {
        item_id: 1,
        power_a: 0,
        power_b: 1,
        power_c: 0,
        power_d: 5,
        price_a: 0,
        price_b: 1,
        price_c: 0,
        price_d: 10,
    }])
    .unwrap()
}

fn now_ms() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis()).unwrap()
}

fn next_message(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) -> ServerMessage {
    loop {
        match socket.read().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

#[test]
fn test_websocket_round_trip() {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        host_name: "app1".to_string(),
        hosts: vec!["app1".to_string()],
        broadcast_interval_ms: 200,
        ..ServerConfig::default()
    };
    let economy = Arc::new(Economy::new(Arc::new(catalog()), Arc::new(MemoryLedger::new())));
    let hosts = Arc::new(LocalHostDirectory::new(["app1"]));
    let server = RoomServer::bind(config, economy, hosts.clone()).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let server_thread = thread::spawn(move || server.run());

    let (mut socket, _response) = connect(format!("ws://{addr}/ws/lobby")).unwrap();

    // Status on connect.
    assert!(matches!(next_message(&mut socket), ServerMessage::Status(_)));

    let time = now_ms() + 60_000;
    let request = format!(
        r#"{{"request_id":11,"action":"add_currency","time":{time},"amount":"25"}}"#
    );
    socket.send(Message::Text(request)).unwrap();

    // Ticks may land in between; the applied request yields status then response.
    let mut saw_pending = false;
    loop {
        match next_message(&mut socket) {
            ServerMessage::Status(status) => {
                saw_pending |= status.adding.iter().any(|a| a.time == time && a.amount == "25");
            }
            ServerMessage::Response(response) => {
                assert_eq!(response, GameResponse { request_id: 11, is_success: true });
                break;
            }
        }
    }
    assert!(saw_pending);
    assert_eq!(hosts.member_count("app1"), 1);

    // Periodic broadcast keeps coming without requests.
    assert!(matches!(next_message(&mut socket), ServerMessage::Status(_)));

    socket.close(None).unwrap();
    while socket.read().is_ok() {}

    // The session thread uncounts the member once it sees the close.
    let mut waited = Duration::ZERO;
    while hosts.member_count("app1") != 0 && waited < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    assert_eq!(hosts.member_count("app1"), 0);

    shutdown.shutdown();
    server_thread.join().unwrap().unwrap();
}

#[test]
fn test_unknown_path_is_refused() {
    let config = ServerConfig { bind_address: "127.0.0.1:0".to_string(), ..ServerConfig::default() };
    let economy = Arc::new(Economy::new(Arc::new(catalog()), Arc::new(MemoryLedger::new())));
    let server =
        RoomServer::bind(config, economy, Arc::new(LocalHostDirectory::new(["localhost"]))).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let server_thread = thread::spawn(move || server.run());

    assert!(connect(format!("ws://{addr}/elsewhere")).is_err());

    shutdown.shutdown();
    server_thread.join().unwrap().unwrap();
}
