//! Stream Tests
//!
//! Ordering, connection release and failure behavior of response streams.

#[path = "../common/mod.rs"]
mod common;

use std::thread;
use std::time::Duration;

use crossbeam::channel::bounded;

use common::FakeServer;
use mcpipe::protocol::Opcode;
use mcpipe::{
    CacheError, Client, Config, CounterOptions, Request, Status, StoreOptions, TypedTranscoder,
    Value,
};

fn seeded(keys: &[&str]) -> (FakeServer, Client) {
    let server = FakeServer::start();
    for key in keys {
        server.seed(key, format!("value-{}", key).as_bytes(), 1);
    }
    let client = server.client();
    (server, client)
}

// =============================================================================
// Release
// =============================================================================

#[test]
fn test_released_once_when_drained() {
    let (_server, client) = seeded(&["a", "b"]);

    let mut stream = client.mget(["a", "b"]).unwrap();
    assert_eq!(client.pool_stats().checkins, 0);

    assert!(stream.next().unwrap().is_ok());
    assert!(!stream.is_halted());
    assert!(stream.next().unwrap().is_ok());
    assert!(stream.is_halted());

    let stats = client.pool_stats();
    assert_eq!(stats.checkouts, 1);
    assert_eq!(stats.checkins, 1);
    assert_eq!(stats.idle, 1);

    assert!(stream.next().is_none());
    drop(stream);
    assert_eq!(client.pool_stats().checkins, 1);
}

#[test]
fn test_released_once_when_dropped_early() {
    let (_server, client) = seeded(&["a", "b", "c"]);

    let mut stream = client.mget(["a", "b", "c"]).unwrap();
    stream.next().unwrap().unwrap();
    drop(stream);

    let stats = client.pool_stats();
    assert_eq!(stats.checkouts, 1);
    assert_eq!(stats.checkins, 1);
    assert_eq!(stats.idle, 1);
}

#[test]
fn test_released_once_on_failure() {
    let (server, client) = seeded(&["a", "c"]);

    let mut stream = client.mget(["a", "poison", "c"]).unwrap();
    assert!(stream.next().unwrap().is_ok());
    assert!(matches!(stream.next(), Some(Err(CacheError::Protocol(_)))));
    assert!(stream.is_halted());
    assert!(stream.next().is_none());

    let stats = client.pool_stats();
    assert_eq!(stats.checkins, 1);
    // Broken connections are discarded
    assert_eq!(stats.total, 0);

    assert!(client.noop().unwrap().is_ok());
    assert_eq!(server.connections(), 2);
}

#[test]
fn test_stale_frames_skipped_after_abandon() {
    let (server, client) = seeded(&["a", "b", "c"]);

    let mut abandoned = client.mget(["a", "b", "c"]).unwrap();
    assert_eq!(abandoned.next().unwrap().unwrap().value, Value::from("value-a"));
    drop(abandoned);

    // Same connection; the unread frames for b and c must not leak in
    let response = client.get("c").unwrap();
    assert_eq!(&response.key[..], b"c");
    assert_eq!(response.value, Value::from("value-c"));

    let values: Vec<_> = client
        .mget(["b", "a"])
        .unwrap()
        .map(|r| r.unwrap().value)
        .collect();
    assert_eq!(values, vec![Value::from("value-b"), Value::from("value-a")]);
    assert_eq!(server.connections(), 1);
}

#[test]
fn test_empty_batch() {
    let server = FakeServer::start();
    let client = server.client();

    let mut stream = client.multi_request(Vec::new()).unwrap();
    assert!(stream.is_halted());
    assert_eq!(stream.remaining(), 0);
    assert!(stream.next().is_none());

    assert_eq!(client.pool_stats().checkouts, 0);
    assert_eq!(server.connections(), 0);
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_one_response_per_request_in_order() {
    let (_server, client) = seeded(&["hit"]);
    let store = |opcode, key: &str| {
        let value = Value::from("v");
        Request::store(opcode, key, &value, StoreOptions::default(), &TypedTranscoder).unwrap()
    };

    let requests = vec![
        Request::get("hit"),
        Request::get("miss"),
        store(Opcode::Set, "new"),
        store(Opcode::Add, "hit"),
        Request::counter(Opcode::Increment, "ctr", 1, CounterOptions::default()).unwrap(),
        Request::delete("miss"),
        Request::get("new"),
        Request::version(),
    ];
    let keys: Vec<_> = requests.iter().map(|r| r.key.clone()).collect();

    let stream = client.multi_request(requests).unwrap();
    assert_eq!(stream.remaining(), 8);
    let responses: Vec<_> = stream.map(|r| r.unwrap()).collect();

    let statuses: Vec<_> = responses.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            Status::Ok,
            Status::KeyNotFound,
            Status::Ok,
            Status::KeyExists,
            Status::Ok,
            Status::KeyNotFound,
            Status::Ok,
            Status::Ok,
        ]
    );
    for (response, key) in responses.iter().zip(&keys) {
        assert_eq!(&response.key, key);
    }
    assert_eq!(responses[0].value, Value::from("value-hit"));
    assert_eq!(responses[6].value, Value::from("v"));
}

#[test]
fn test_remaining_counts_down() {
    let (_server, client) = seeded(&["a", "b", "c"]);

    let mut stream = client.mget(["a", "b", "c"]).unwrap();
    assert_eq!(stream.size_hint(), (1, Some(3)));
    stream.next();
    assert_eq!(stream.remaining(), 2);
    stream.next();
    stream.next();
    assert_eq!(stream.remaining(), 0);
    assert_eq!(stream.size_hint(), (0, Some(0)));
}

#[test]
fn test_large_batch_does_not_stall() {
    // Requests and answers each far larger than the socket buffers
    let server = FakeServer::start();
    let key = "k".repeat(60_000);
    let value = vec![b'v'; 256 * 1024];
    server.seed(&key, &value, 0);
    let client = server.client();

    let (done_tx, done_rx) = bounded(1);
    thread::spawn(move || {
        let keys = vec![key; 200];
        let responses: Vec<_> = client.mget(&keys).unwrap().collect();
        let _ = done_tx.send(responses);
    });

    let responses = done_rx
        .recv_timeout(Duration::from_secs(20))
        .expect("batch stalled");
    assert_eq!(responses.len(), 200);
    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.value, Value::Bytes(value.clone().into()));
    }
}

#[test]
fn test_concurrent_streams_stay_ordered() {
    let server = FakeServer::start();
    let keys: Vec<String> = (0..20).map(|i| format!("k{}", i)).collect();
    for key in &keys {
        server.seed(key, key.as_bytes(), 1);
    }
    let config = Config::builder().addr(server.addr()).pool_size(2).build();
    let client = Client::with_config(config).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let client = client.clone();
            let keys = keys.clone();
            thread::spawn(move || {
                for round in 0..10 {
                    let offset = (t + round) % keys.len();
                    let batch: Vec<_> = keys.iter().cycle().skip(offset).take(7).cloned().collect();
                    let values: Vec<_> = client
                        .mget(&batch)
                        .unwrap()
                        .map(|r| r.unwrap().value)
                        .collect();
                    let expected: Vec<_> = batch.iter().map(|k| Value::from(k.as_str())).collect();
                    assert_eq!(values, expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(server.connections() <= 2);
}

// =============================================================================
// Timeouts
// =============================================================================

#[test]
fn test_response_timeout_discards_connection() {
    let server = FakeServer::start();
    let config = Config::builder()
        .addr(server.addr())
        .pool_size(1)
        .response_timeout(Duration::from_millis(50))
        .build();
    let client = Client::with_config(config).unwrap();

    assert!(matches!(client.get("slow"), Err(CacheError::Timeout)));
    assert_eq!(client.pool_stats().total, 0);

    // A fresh connection serves the next operation
    assert!(client.noop().unwrap().is_ok());
    assert_eq!(server.connections(), 2);
}
