//! Room registry collaborator (read-only reference data)

use shared::models::Room;
use std::collections::BTreeMap;
use std::path::Path;

/// Static room registry consumed by the engine; never mutated here
pub trait RoomRegistry: Send + Sync {
    /// All rooms, ordered by room number
    fn all_rooms(&self) -> Vec<Room>;

    fn room_type(&self, room_number: &str) -> Option<String>;
}

/// In-memory registry loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct StaticRoomRegistry {
    rooms: BTreeMap<String, Room>,
}

impl StaticRoomRegistry {
    pub fn new(rooms: impl IntoIterator<Item = Room>) -> Self {
        Self {
            rooms: rooms.into_iter().map(|r| (r.number.clone(), r)).collect(),
        }
    }

    /// Load a JSON array of rooms
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let rooms: Vec<Room> = serde_json::from_str(&raw)?;
        Ok(Self::new(rooms))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomRegistry for StaticRoomRegistry {
    fn all_rooms(&self) -> Vec<Room> {
        self.rooms.values().cloned().collect()
    }

    fn room_type(&self, room_number: &str) -> Option<String> {
        self.rooms.get(room_number).map(|r| r.room_type.clone())
    }
}
