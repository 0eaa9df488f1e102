//! Motion record (type 0): physics state of every car.

use serde::{Deserialize, Serialize};

use super::{decode_layout, encode_layout, Payload, RecordType, MAX_NUM_CARS};
use crate::error::Result;

/// Per-car motion sample (60 bytes)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarMotionData {
    pub world_position_x: f32,     // 0..4 metres
    pub world_position_y: f32,     // 4..8
    pub world_position_z: f32,     // 8..12
    pub world_velocity_x: f32,     // 12..16 metres/s
    pub world_velocity_y: f32,     // 16..20
    pub world_velocity_z: f32,     // 20..24
    pub world_forward_dir_x: i16,  // 24..26 normalised
    pub world_forward_dir_y: i16,  // 26..28
    pub world_forward_dir_z: i16,  // 28..30
    pub world_right_dir_x: i16,    // 30..32 normalised
    pub world_right_dir_y: i16,    // 32..34
    pub world_right_dir_z: i16,    // 34..36
    pub g_force_lateral: f32,      // 36..40
    pub g_force_longitudinal: f32, // 40..44
    pub g_force_vertical: f32,     // 44..48
    pub yaw: f32,                  // 48..52 radians
    pub pitch: f32,                // 52..56 radians
    pub roll: f32,                 // 56..60 radians
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MotionPayload {
    pub car_motion_data: [CarMotionData; MAX_NUM_CARS],
}

impl Payload for MotionPayload {
    const RECORD_TYPE: RecordType = RecordType::Motion;

    fn decode(payload: &[u8]) -> Result<Self> {
        decode_layout(Self::RECORD_TYPE, payload)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_layout(self, out)
    }
}
