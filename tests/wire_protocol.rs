use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use covers::engine::Engine;
use covers::notify::NotifyHub;
use covers::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("covers_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("covers.wal"), Arc::new(NotifyHub::new())).unwrap());

    let served = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = served.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    (addr, engine)
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn next_line(&mut self) -> Value {
        let line = self.framed.next().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn send_raw(&mut self, line: &str) -> Value {
        self.framed.send(line.to_string()).await.unwrap();
        let reply = self.framed.next().await.unwrap().unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn call(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await
    }

    /// Call and unwrap the `ok` payload.
    async fn ok(&mut self, request: Value) -> Value {
        let reply = self.call(request).await;
        assert!(reply.get("ok").is_some(), "expected ok, got {reply}");
        reply["ok"].clone()
    }
}

fn error_kind(reply: &Value) -> &str {
    reply["error"]["kind"].as_str().unwrap_or("")
}

const H: i64 = 3_600_000;

// ── Tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn book_and_refuse_over_the_wire() {
    let (addr, _engine) = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let created = client
        .ok(json!({
            "op": "create_restaurant",
            "name": "Corner",
            "tables": {"two": 1, "four": 1, "six": 0},
            "endorsements": ["Vegan"]
        }))
        .await;
    let rid = created["id"].as_str().unwrap().to_string();

    let matches = client
        .ok(json!({"op": "available", "party": {"size": 5}, "start": 18 * H, "end": 20 * H}))
        .await;
    assert_eq!(matches.as_array().unwrap().len(), 1);
    assert_eq!(matches[0]["restaurant_id"], rid);
    assert_eq!(matches[0]["wasted_seats"], 1);

    let booked = client
        .ok(json!({
            "op": "book",
            "restaurant_id": rid,
            "party": {"size": 5, "endorsements": ["vegan"]},
            "start": 18 * H,
            "end": 20 * H
        }))
        .await;
    assert_eq!(booked["reservation"]["tables"], json!({"two": 1, "four": 1, "six": 0}));

    let refused = client
        .call(json!({
            "op": "book",
            "restaurant_id": rid,
            "party": {"size": 3},
            "start": 19 * H,
            "end": 21 * H
        }))
        .await;
    assert_eq!(error_kind(&refused), "no_capacity");
    assert_eq!(refused["error"]["retryable"], false);

    let free = client
        .ok(json!({"op": "free_capacity", "restaurant_id": rid, "start": 20 * H, "end": 21 * H}))
        .await;
    assert_eq!(free, json!({"two": 1, "four": 1, "six": 0}));

    let listed = client
        .ok(json!({"op": "reservations", "restaurant_id": rid}))
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], booked["reservation_id"]);
}

#[tokio::test]
async fn registered_diners_carry_their_preferences() {
    let (addr, engine) = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let plain = client
        .ok(json!({"op": "create_restaurant", "name": "Plain", "tables": {"two": 2, "four": 0, "six": 0}}))
        .await["id"]
        .clone();
    let gf = client
        .ok(json!({
            "op": "create_restaurant",
            "name": "Celiac Safe",
            "tables": {"two": 2, "four": 0, "six": 0},
            "endorsements": ["gluten-free"]
        }))
        .await["id"]
        .clone();
    let diner = client
        .ok(json!({"op": "register_diner", "name": "Gia", "preferences": [" Gluten-Free "]}))
        .await["id"]
        .clone();

    let matches = client
        .ok(json!({"op": "available", "party": {"diners": [diner]}, "start": 12 * H, "end": 13 * H}))
        .await;
    let ids: Vec<&Value> = matches.as_array().unwrap().iter().map(|m| &m["restaurant_id"]).collect();
    assert_eq!(ids, vec![&gf]);

    let mismatch = client
        .call(json!({
            "op": "book",
            "restaurant_id": plain,
            "party": {"diners": [diner]},
            "start": 12 * H,
            "end": 13 * H
        }))
        .await;
    assert_eq!(error_kind(&mismatch), "endorsement_mismatch");

    let booked = client
        .ok(json!({
            "op": "book",
            "restaurant_id": gf,
            "party": {"diners": [diner]},
            "start": 12 * H,
            "end": 13 * H
        }))
        .await;
    assert_eq!(booked["reservation"]["diners"], json!([diner]));

    let reservation_id: Ulid = booked["reservation_id"].as_str().unwrap().parse().unwrap();
    assert!(engine.get_reservation(reservation_id).await.is_ok());

    let cancelled = client
        .ok(json!({"op": "cancel", "reservation_id": reservation_id}))
        .await;
    assert_eq!(cancelled["id"], booked["reservation_id"]);
    assert!(engine.get_reservation(reservation_id).await.is_err());
}

#[tokio::test]
async fn malformed_requests_keep_the_connection_open() {
    let (addr, _engine) = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let garbage = client.send_raw("this is not json").await;
    assert_eq!(error_kind(&garbage), "bad_request");

    let unknown_op = client.call(json!({"op": "teleport"})).await;
    assert_eq!(error_kind(&unknown_op), "bad_request");

    let inverted = client
        .call(json!({"op": "available", "party": {"size": 2}, "start": 10, "end": 5}))
        .await;
    assert_eq!(error_kind(&inverted), "invalid_window");

    let missing = client
        .call(json!({"op": "reservations", "restaurant_id": Ulid::new()}))
        .await;
    assert_eq!(error_kind(&missing), "not_found");

    // Still serving after the errors.
    let restaurants = client.ok(json!({"op": "restaurants"})).await;
    assert!(restaurants.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn clients_race_for_the_last_table() {
    let (addr, engine) = start_test_server().await;
    let mut setup = Client::connect(addr).await;
    let rid = setup
        .ok(json!({"op": "create_restaurant", "name": "Hot", "tables": {"two": 1, "four": 0, "six": 0}}))
        .await["id"]
        .clone();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let rid = rid.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client
                .call(json!({
                    "op": "book",
                    "restaurant_id": rid,
                    "party": {"size": 2},
                    "start": 19 * H,
                    "end": 21 * H
                }))
                .await
        }));
    }

    let mut booked = 0;
    for h in handles {
        let reply = h.await.unwrap();
        if reply.get("ok").is_some() {
            booked += 1;
        } else {
            assert!(matches!(error_kind(&reply), "no_capacity" | "lock_timeout"), "{reply}");
        }
    }
    assert_eq!(booked, 1);

    let rid: Ulid = rid.as_str().unwrap().parse().unwrap();
    assert_eq!(engine.get_reservations(rid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn listeners_receive_commits_and_cancellations() {
    let (addr, _engine) = start_test_server().await;
    let mut listener = Client::connect(addr).await;
    let mut booker = Client::connect(addr).await;

    let rid = booker
        .ok(json!({"op": "create_restaurant", "name": "Watched", "tables": {"two": 1, "four": 0, "six": 0}}))
        .await["id"]
        .clone();

    let missing = listener.call(json!({"op": "listen", "restaurant_id": Ulid::new()})).await;
    assert_eq!(error_kind(&missing), "not_found");

    let listening = listener.ok(json!({"op": "listen", "restaurant_id": rid})).await;
    assert_eq!(listening["restaurant_id"], rid);

    let booked = booker
        .ok(json!({
            "op": "book",
            "restaurant_id": rid,
            "party": {"size": 2},
            "start": 19 * H,
            "end": 21 * H
        }))
        .await;

    let pushed = tokio::time::timeout(std::time::Duration::from_secs(5), listener.next_line())
        .await
        .expect("commit event");
    let committed = &pushed["event"]["reservation_committed"];
    assert_eq!(committed["id"], booked["reservation_id"]);
    assert_eq!(committed["restaurant_id"], rid);
    assert_eq!(committed["tables"], json!({"two": 1, "four": 0, "six": 0}));

    booker
        .ok(json!({"op": "cancel", "reservation_id": booked["reservation_id"]}))
        .await;
    let pushed = tokio::time::timeout(std::time::Duration::from_secs(5), listener.next_line())
        .await
        .expect("cancel event");
    assert_eq!(pushed["event"]["reservation_cancelled"]["id"], booked["reservation_id"]);

    // Requests still get their own replies after events were pushed.
    let restaurants = listener.ok(json!({"op": "restaurants"})).await;
    assert_eq!(restaurants.as_array().unwrap().len(), 1);
}
