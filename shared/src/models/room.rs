//! Room registry types (read-only reference data)

use serde::{Deserialize, Serialize};

/// Physical room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub number: String,
    pub room_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
}
