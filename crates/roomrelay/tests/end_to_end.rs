//! A hub and a worker on loopback, driven by plain WebSocket clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomrelay::prelude::*;
use roomrelay_hub::Availability;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A snake worker with 2 rooms × 4 players behind a hub.
async fn cluster() -> (HubHandle, WorkerHandle) {
    let worker = Worker::start(
        WorkerConfig {
            endpoint: "127.0.0.1:0".into(),
            worker_id: 1,
            tick_interval_ms: 10,
            max_rooms: 2,
            room_capacity: 4,
            status_interval_ms: 50,
            ..WorkerConfig::default()
        },
        |_| SnakeGame::new(),
    )
    .await
    .unwrap();

    let hub = Hub::start(HubConfig {
        endpoint: "127.0.0.1:0".into(),
        lobby_tick_ms: 10,
        worker_status_interval_ms: 100,
        workers: vec![WorkerEntryConfig {
            id: WorkerId(1),
            name: "Loopback".into(),
            flag: "pl".into(),
            address: worker.local_addr().to_string(),
            enabled: true,
        }],
        ..HubConfig::default()
    })
    .await
    .unwrap();

    for _ in 0..200 {
        let snap = hub.snapshot().await.unwrap();
        if snap.workers[0].worker.availability == Availability::Available {
            return (hub, worker);
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("worker never registered with the hub");
}

async fn dial(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, packet: Packet) {
    ws.send(Message::Binary(BinaryCodec.encode(&packet).unwrap().into()))
        .await
        .unwrap();
}

async fn recv(ws: &mut Ws) -> Option<Packet> {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")?;
        match msg {
            Ok(Message::Binary(data)) => return Some(BinaryCodec.decode(&data).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Asks the hub for a room: `(status, address, room, ticket)`.
async fn ask_hub(hub: &mut Ws) -> (JoinStatus, String, RoomId, u64) {
    send(hub, Packet::JoinRoomRequest { room_id: RoomId::ANY, ticket: 0 }).await;
    match recv(hub).await {
        Some(Packet::JoinRoomResponse {
            status,
            address,
            room_id,
            ticket,
            ..
        }) => (status, address, room_id, ticket),
        other => panic!("expected a join response, got {other:?}"),
    }
}

/// Follows a redirect and joins the worker.
async fn join_worker(address: &str, room_id: RoomId, ticket: u64) -> Ws {
    let mut ws = dial(address).await;
    send(&mut ws, Packet::JoinRoomRequest { room_id, ticket }).await;
    match recv(&mut ws).await {
        Some(Packet::JoinRoomResponse { status, room_id: joined, .. }) => {
            assert_eq!(status, JoinStatus::Ok);
            assert_eq!(joined, room_id);
        }
        other => panic!("expected a join response, got {other:?}"),
    }
    ws
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_client_joins_through_hub_and_receives_ticks() {
    let (hub, worker) = cluster().await;
    let mut lobby = dial(&format!("ws://{}", hub.local_addr())).await;

    send(&mut lobby, Packet::PlayerNameRequest).await;
    assert!(matches!(recv(&mut lobby).await, Some(Packet::PlayerNameResponse { .. })));

    send(&mut lobby, Packet::ServerListRequest).await;
    match recv(&mut lobby).await {
        Some(Packet::ServerListResponse { status, servers }) => {
            assert_eq!(status, JoinStatus::Ok);
            assert_eq!(servers[0].address, format!("ws://{}", worker.local_addr()));
        }
        other => panic!("expected a server list, got {other:?}"),
    }

    let (status, address, room_id, ticket) = ask_hub(&mut lobby).await;
    assert_eq!(status, JoinStatus::Ok);
    let mut game = join_worker(&address, room_id, ticket).await;

    loop {
        match recv(&mut game).await {
            Some(Packet::TickData { players, .. }) => {
                assert_eq!(players.len(), 1);
                break;
            }
            Some(_) => continue,
            None => panic!("worker closed the connection"),
        }
    }

    hub.shutdown().await;
    worker.shutdown().await;
}

#[tokio::test]
async fn test_ninth_player_gets_no_capacity() {
    let (hub, worker) = cluster().await;
    let mut lobby = dial(&format!("ws://{}", hub.local_addr())).await;

    let mut players = Vec::new();
    for _ in 0..8 {
        let (status, address, room_id, ticket) = ask_hub(&mut lobby).await;
        assert_eq!(status, JoinStatus::Ok);
        players.push(join_worker(&address, room_id, ticket).await);
    }

    let (status, ..) = ask_hub(&mut lobby).await;
    assert_eq!(status, JoinStatus::NoCapacity);

    let snap = worker.snapshot().await.unwrap();
    assert_eq!(snap.rooms.len(), 2);
    assert!(snap.rooms.iter().all(|r| r.players == 4));

    hub.shutdown().await;
    worker.shutdown().await;
}

#[tokio::test]
async fn test_ticket_is_single_use() {
    let (hub, worker) = cluster().await;
    let mut lobby = dial(&format!("ws://{}", hub.local_addr())).await;

    let (_, address, room_id, ticket) = ask_hub(&mut lobby).await;
    let _first = join_worker(&address, room_id, ticket).await;

    let mut second = dial(&address).await;
    send(&mut second, Packet::JoinRoomRequest { room_id, ticket }).await;
    match recv(&mut second).await {
        Some(Packet::JoinRoomResponse { status, .. }) => {
            assert_eq!(status, JoinStatus::InvalidTicket);
        }
        other => panic!("expected a refusal, got {other:?}"),
    }

    hub.shutdown().await;
    worker.shutdown().await;
}

#[tokio::test]
async fn test_worker_drain_reaches_the_hub() {
    let (hub, worker) = cluster().await;
    worker.command(WorkerCommand::Drain).await.unwrap();
    worker.wait().await;

    for _ in 0..200 {
        let snap = hub.snapshot().await.unwrap();
        let availability = snap.workers[0].worker.availability;
        if availability != Availability::Available {
            assert!(matches!(
                availability,
                Availability::Draining | Availability::Unregistered | Availability::Unavailable
            ));
            let mut lobby = dial(&format!("ws://{}", hub.local_addr())).await;
            let (status, ..) = ask_hub(&mut lobby).await;
            assert_eq!(status, JoinStatus::NoCapacity);
            hub.shutdown().await;
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never noticed the drain");
}
