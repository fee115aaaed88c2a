#![allow(dead_code)]

use chrono::NaiveDate;
use frontdesk::{
    Config, FrontDesk, LocalCache, MemoryTransport, ReservationDraft, StaticRoomRegistry,
    SyncConfig,
};
use shared::models::{Booker, ReservationKind, Room, RoomStay};
use std::sync::Arc;
use std::time::Duration;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn registry() -> StaticRoomRegistry {
    let room = |number: &str, room_type: &str, floor: i32| Room {
        number: number.to_string(),
        room_type: room_type.to_string(),
        floor: Some(floor),
    };
    StaticRoomRegistry::new([
        room("101", "double", 1),
        room("102", "double", 1),
        room("103", "single", 1),
        room("201", "suite", 2),
    ])
}

pub fn test_config() -> Config {
    let mut config = Config::with_work_dir(std::env::temp_dir().to_string_lossy().to_string());
    config.sync = SyncConfig {
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    };
    config
}

/// Session over an in-memory cache and backend
pub fn open_desk(transport: &MemoryTransport) -> FrontDesk {
    FrontDesk::open_with(
        test_config(),
        LocalCache::open_in_memory().unwrap(),
        Arc::new(registry()),
        Arc::new(transport.clone()),
    )
}

pub fn guest(name: &str, rooms: Vec<RoomStay>) -> ReservationDraft {
    ReservationDraft {
        kind: ReservationKind::Guest,
        booker: Booker {
            name: name.to_string(),
            ..Default::default()
        },
        rooms,
        ..Default::default()
    }
}

pub fn stay(room: &str, from: &str, to: &str) -> RoomStay {
    RoomStay::new(room, d(from), d(to))
}
