//! In-process memcached double for integration tests
//!
//! Speaks the binary protocol over a real socket with the server's quiet
//! semantics: GETQ misses and successful quiet mutations get no answer.
//!
//! Special keys:
//! - `slow`: answered after `SLOW_DELAY`
//! - `poison`: answered with 24 bytes of garbage

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use mcpipe::protocol::{
    read_request, write_frame, Frame, Opcode, ResponseHeader, Status, WireRequest,
};
use mcpipe::{Client, Config};

pub const SLOW_DELAY: Duration = Duration::from_millis(400);
pub const FAKE_VERSION: &str = "1.6.21-fake";

#[derive(Debug, Clone)]
pub struct Item {
    pub value: Vec<u8>,
    pub flags: u32,
    pub cas: u64,
}

#[derive(Default)]
struct State {
    items: HashMap<Vec<u8>, Item>,
    next_cas: u64,
    /// Every request received, in arrival order
    log: Vec<WireRequest>,
    connections: usize,
    credentials: Option<(String, String)>,
}

pub struct FakeServer {
    addr: String,
    state: Arc<Mutex<State>>,
}

impl FakeServer {
    pub fn start() -> Self {
        Self::start_with(None)
    }

    /// Server that rejects everything until SASL PLAIN succeeds
    pub fn with_credentials(username: &str, password: &str) -> Self {
        Self::start_with(Some((username.to_string(), password.to_string())))
    }

    fn start_with(credentials: Option<(String, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let state = Arc::new(Mutex::new(State {
            credentials,
            ..State::default()
        }));

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                shared.lock().connections += 1;
                let shared = Arc::clone(&shared);
                thread::spawn(move || serve(stream, shared));
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> Config {
        Config::builder().addr(self.addr.clone()).pool_size(1).build()
    }

    pub fn client(&self) -> Client {
        Client::with_config(self.config()).expect("client")
    }

    /// Store raw bytes under `flags`, bypassing the client
    pub fn seed(&self, key: &str, value: &[u8], flags: u32) {
        let mut state = self.state.lock();
        state.next_cas += 1;
        let cas = state.next_cas;
        state.items.insert(
            key.as_bytes().to_vec(),
            Item {
                value: value.to_vec(),
                flags,
                cas,
            },
        );
    }

    pub fn item(&self, key: &str) -> Option<Item> {
        self.state.lock().items.get(key.as_bytes()).cloned()
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.state.lock().log.clone()
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        self.state.lock().log.iter().map(|r| r.opcode).collect()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }
}

fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let Ok(read_half) = stream.try_clone() else { return };
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(stream);
    let mut authenticated = state.lock().credentials.is_none();

    while let Ok(request) = read_request(&mut reader) {
        state.lock().log.push(request.clone());

        if &request.key[..] == b"slow" {
            thread::sleep(SLOW_DELAY);
        }
        if &request.key[..] == b"poison" {
            let _ = writer.write_all(&[0xFF; 24]);
            let _ = writer.flush();
            continue;
        }

        let answer = if request.opcode == Opcode::SaslAuth {
            let (reply, ok) = authenticate(&state, &request);
            authenticated = ok;
            Some(reply)
        } else if !authenticated {
            Some(reply(&request, Status::AuthError))
        } else {
            handle(&state, &request)
        };

        if let Some(frame) = answer {
            if write_frame(&mut writer, &frame).is_err() {
                break;
            }
        }
    }
}

fn reply(request: &WireRequest, status: Status) -> Frame {
    let mut header = ResponseHeader::new(request.opcode, status);
    header.opaque = request.opaque;
    let value = if status.is_ok() {
        Bytes::new()
    } else {
        Bytes::from(status.as_str().to_string())
    };
    Frame {
        header,
        key: Bytes::new(),
        extras: Bytes::new(),
        value,
    }
}

/// Quiet requests only answer failures
fn quiet_ok(request: &WireRequest) -> Option<Frame> {
    if request.opcode.is_quiet() {
        None
    } else {
        Some(reply(request, Status::Ok))
    }
}

fn authenticate(state: &Mutex<State>, request: &WireRequest) -> (Frame, bool) {
    let expected = state.lock().credentials.clone();
    let mut parts = request.value.split(|b| *b == 0).skip(1);
    let user = parts.next().map(|u| String::from_utf8_lossy(u).into_owned());
    let pass = parts.next().map(|p| String::from_utf8_lossy(p).into_owned());

    let matches_expected = match &expected {
        Some((u, p)) => Some(u) == user.as_ref() && Some(p) == pass.as_ref(),
        None => false,
    };
    let ok = &request.key[..] == b"PLAIN" && matches_expected;
    let status = if ok { Status::Ok } else { Status::AuthError };
    (reply(request, status), ok)
}

fn handle(state: &Mutex<State>, request: &WireRequest) -> Option<Frame> {
    let mut state = state.lock();
    let key = request.key.to_vec();

    match request.opcode.to_loud() {
        Opcode::Get => match state.items.get(&key) {
            Some(item) => {
                let mut frame = reply(request, Status::Ok);
                frame.header.cas = item.cas;
                frame.extras = Bytes::copy_from_slice(&item.flags.to_be_bytes());
                frame.value = Bytes::from(item.value.clone());
                Some(frame)
            }
            None if request.opcode.is_quiet() => None,
            None => Some(reply(request, Status::KeyNotFound)),
        },

        opcode @ (Opcode::Set | Opcode::Add | Opcode::Replace) => {
            let existing = state.items.get(&key).map(|item| item.cas);
            let refused = match (opcode, existing) {
                (Opcode::Add, Some(_)) => Some(Status::KeyExists),
                (Opcode::Replace, None) => Some(Status::KeyNotFound),
                (_, Some(cas)) if request.cas != 0 && request.cas != cas => Some(Status::KeyExists),
                (_, None) if request.cas != 0 => Some(Status::KeyNotFound),
                _ => None,
            };
            if let Some(status) = refused {
                return Some(reply(request, status));
            }

            let flags = request
                .extras
                .get(..4)
                .map(|raw| u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
                .unwrap_or(0);
            state.next_cas += 1;
            let cas = state.next_cas;
            state.items.insert(
                key,
                Item {
                    value: request.value.to_vec(),
                    flags,
                    cas,
                },
            );
            quiet_ok(request)
        }

        opcode @ (Opcode::Append | Opcode::Prepend) => {
            if !request.extras.is_empty() {
                return Some(reply(request, Status::InvalidArguments));
            }
            let Some(item) = state.items.get_mut(&key) else {
                return Some(reply(request, Status::ItemNotStored));
            };
            if opcode == Opcode::Append {
                item.value.extend_from_slice(&request.value);
            } else {
                let mut value = request.value.to_vec();
                value.extend_from_slice(&item.value);
                item.value = value;
            }
            quiet_ok(request)
        }

        Opcode::Delete => match state.items.remove(&key) {
            Some(_) => quiet_ok(request),
            None => Some(reply(request, Status::KeyNotFound)),
        },

        opcode @ (Opcode::Increment | Opcode::Decrement) => {
            if request.extras.len() != 20 {
                return Some(reply(request, Status::InvalidArguments));
            }
            let delta = u64::from_be_bytes(request.extras[0..8].try_into().unwrap());
            let initial = u64::from_be_bytes(request.extras[8..16].try_into().unwrap());
            let expires = u32::from_be_bytes(request.extras[16..20].try_into().unwrap());

            let current = match state.items.get(&key) {
                Some(item) => {
                    let parsed = std::str::from_utf8(&item.value)
                        .ok()
                        .and_then(|s| s.trim_end().parse::<u64>().ok());
                    let Some(n) = parsed else {
                        return Some(reply(request, Status::NonNumericValue));
                    };
                    if opcode == Opcode::Increment {
                        n.wrapping_add(delta)
                    } else {
                        n.saturating_sub(delta)
                    }
                }
                None if expires == u32::MAX => return Some(reply(request, Status::KeyNotFound)),
                None => initial,
            };

            state.next_cas += 1;
            let cas = state.next_cas;
            let flags = state.items.get(&key).map(|item| item.flags).unwrap_or(0);
            state.items.insert(
                key,
                Item {
                    value: current.to_string().into_bytes(),
                    flags,
                    cas,
                },
            );

            if request.opcode.is_quiet() {
                return None;
            }
            let mut frame = reply(request, Status::Ok);
            frame.header.cas = cas;
            frame.value = Bytes::copy_from_slice(&current.to_be_bytes());
            Some(frame)
        }

        Opcode::Flush => {
            state.items.clear();
            Some(reply(request, Status::Ok))
        }

        Opcode::Noop => Some(reply(request, Status::Ok)),

        Opcode::Version => {
            let mut frame = reply(request, Status::Ok);
            frame.value = Bytes::from_static(FAKE_VERSION.as_bytes());
            Some(frame)
        }

        _ => Some(reply(request, Status::UnknownCommand)),
    }
}
