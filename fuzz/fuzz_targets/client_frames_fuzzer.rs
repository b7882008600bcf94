//! Fuzz target for the client's server-frame handling
//!
//! Prevent state corruption from a hostile or confused server (HIGH priority)
//!
//! # Strategy
//!
//! - CONNECTED frames: missing, well-formed, and garbage heart-beat offers
//! - MESSAGE frames: live subscription ids, forged ids, stale ids after a
//!   room switch, valid event payloads and raw bytes
//! - Event payloads replaying ids across rooms and impersonating the user
//! - ERROR and RECEIPT frames at arbitrary points in the session
//! - Raw fuzzed bytes replayed into the client when they decode
//! - Clock jumps long enough to cross handshake, heart-beat, and backoff
//!   deadlines
//!
//! # Invariants
//!
//! - `handle_frame` NEVER panics, whatever the server sends
//! - A server id appears at most once in a room's log
//! - A confirmed record always carries a server id

#![no_main]

use std::collections::HashSet;
use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomwire_client::{
    ChatClient, ChatEvent, ClientAction, ConnectionConfig, Delivery, MessageEvent, MessageStatus,
    Session, StatusUpdateEvent, TypingEvent,
};
use roomwire_proto::{Command, Decoded, Frame, Headers, destination, names};

const ROOMS: u64 = 4;

#[derive(Debug, Arbitrary)]
struct Scenario {
    steps: Vec<Step>,
}

#[derive(Debug, Arbitrary)]
enum Step {
    Connected { heart_beat: HeartBeat },
    Select { room: u8 },
    Send { room: u8 },
    Deliver { forged_sub: Option<u8>, body: Body },
    Error { message: Option<String> },
    Receipt { id: u8 },
    Raw { bytes: Vec<u8> },
    Advance { millis: u16 },
}

#[derive(Debug, Arbitrary)]
enum HeartBeat {
    Absent,
    Offer { send: u16, want: u16 },
    Garbage(String),
}

#[derive(Debug, Arbitrary)]
enum Body {
    Message { id: u8, room: u8, sender: u8 },
    Status { id: u8, room: u8, read: bool },
    Typing { room: u8, user: u8 },
    Bytes(Vec<u8>),
}

fn room_id(raw: u8) -> u64 {
    u64::from(raw) % ROOMS
}

fn event_json(body: &Body) -> Vec<u8> {
    let event = match body {
        Body::Message { id, room, sender } => ChatEvent::Message(MessageEvent {
            id: u64::from(*id),
            room_id: room_id(*room),
            sender_id: u64::from(*sender),
            content: "fuzz".to_string(),
            created_at: "2025-04-01T10:00:00Z".to_string(),
            status: MessageStatus::Sent,
        }),
        Body::Status { id, room, read } => ChatEvent::StatusUpdate(StatusUpdateEvent {
            room_id: room_id(*room),
            message_id: u64::from(*id),
            status: if *read { MessageStatus::Read } else { MessageStatus::Delivered },
        }),
        Body::Typing { room, user } => ChatEvent::Typing(TypingEvent {
            room_id: room_id(*room),
            user_id: u64::from(*user),
            user_name: "fuzz".to_string(),
        }),
        Body::Bytes(bytes) => return bytes.clone(),
    };
    event.to_json().expect("chat event serializes").into_bytes()
}

fn live_sub_id(actions: &[ClientAction]) -> Option<String> {
    actions.iter().find_map(|action| match action {
        ClientAction::SendFrame(frame) if frame.command == Command::Subscribe => {
            frame.headers.get(names::ID).map(str::to_string)
        },
        _ => None,
    })
}

fuzz_target!(|scenario: Scenario| {
    let mut now = Instant::now();
    let mut client = ChatClient::new(ConnectionConfig::default());
    let session = Session {
        user_id: 1,
        display_name: "fuzz".to_string(),
        auth_token: "tok".to_string(),
    };
    let _ = client.connect(session, now);
    let _ = client.transport_up(now);
    let mut live_sub: Option<String> = None;

    for step in scenario.steps {
        match step {
            Step::Connected { heart_beat } => {
                let mut headers = Headers::new();
                headers.set(names::VERSION, "1.2");
                match heart_beat {
                    HeartBeat::Absent => {},
                    HeartBeat::Offer { send, want } => {
                        headers.set(names::HEART_BEAT, format!("{send},{want}"));
                    },
                    HeartBeat::Garbage(raw) => headers.set(names::HEART_BEAT, raw),
                }
                let frame = Frame::new(Command::Connected, headers, "");
                let actions = client.handle_frame(&frame, now);
                // A reconnect restores the room under a fresh id.
                if let Some(id) = live_sub_id(&actions) {
                    live_sub = Some(id);
                }
            },
            Step::Select { room } => {
                let actions = client.set_active_room(room_id(room), now);
                if let Some(id) = live_sub_id(&actions) {
                    live_sub = Some(id);
                }
            },
            Step::Send { room } => {
                let _ = client.send_message(room_id(room), "hello".to_string(), now);
            },
            Step::Deliver { forged_sub, body } => {
                let sub = match forged_sub {
                    Some(n) => format!("sub-{n}"),
                    None => live_sub.clone().unwrap_or_else(|| "sub-0".to_string()),
                };
                let payload = event_json(&body);
                let mut headers = Headers::new();
                headers.set(names::SUBSCRIPTION, sub);
                headers.set(names::DESTINATION, destination::room_topic(0));
                headers.set(names::MESSAGE_ID, "f-1");
                let frame = Frame::new(Command::Message, headers, payload);
                let _ = client.handle_frame(&frame, now);
            },
            Step::Error { message } => {
                let mut headers = Headers::new();
                if let Some(text) = message {
                    headers.set(names::MESSAGE, text);
                }
                let frame = Frame::new(Command::Error, headers, "");
                let _ = client.handle_frame(&frame, now);
            },
            Step::Receipt { id } => {
                let mut headers = Headers::new();
                headers.set(names::RECEIPT_ID, format!("r-{id}"));
                let frame = Frame::new(Command::Receipt, headers, "");
                let _ = client.handle_frame(&frame, now);
            },
            Step::Raw { bytes } => {
                if let Ok(Decoded::Frame { frame, .. }) = Frame::decode(&bytes) {
                    let _ = client.handle_frame(&frame, now);
                }
            },
            Step::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis));
                let _ = client.tick(now);
            },
        }
    }

    for room in 0..ROOMS {
        let mut seen = HashSet::new();
        for record in client.messages(room) {
            if let Some(id) = record.id {
                assert!(seen.insert(id), "id {id} appears twice in room {room}");
            }
            if record.delivery == Delivery::Confirmed {
                assert!(record.id.is_some(), "confirmed record without a server id");
            }
        }
    }
});
