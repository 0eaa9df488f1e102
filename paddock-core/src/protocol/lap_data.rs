//! Lap data record (type 2): timing and race status of every car.

use serde::{Deserialize, Serialize};

use super::{decode_layout, encode_layout, Payload, RecordType, MAX_NUM_CARS};
use crate::error::Result;

/// Per-car lap data (50 bytes)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct LapData {
    #[serde(rename = "LastLapTimeInMS")]
    pub last_lap_time_ms: u32, // 0..4
    #[serde(rename = "CurrentLapTimeInMS")]
    pub current_lap_time_ms: u32, // 4..8
    #[serde(rename = "Sector1TimeInMS")]
    pub sector1_time_ms: u16, // 8..10 milliseconds part
    pub sector1_time_minutes: u8, // 10
    #[serde(rename = "Sector2TimeInMS")]
    pub sector2_time_ms: u16, // 11..13
    pub sector2_time_minutes: u8, // 13
    #[serde(rename = "DeltaToCarInFrontInMS")]
    pub delta_to_car_in_front_ms: u16, // 14..16
    #[serde(rename = "DeltaToRaceLeaderInMS")]
    pub delta_to_race_leader_ms: u16, // 16..18
    pub lap_distance: f32,                   // 18..22 metres, negative before the line
    pub total_distance: f32,                 // 22..26
    pub safety_car_delta: f32,               // 26..30 seconds
    pub car_position: u8,                    // 30
    pub current_lap_num: u8,                 // 31
    pub pit_status: u8,                      // 32 0 = none, 1 = pitting, 2 = in pit area
    pub num_pit_stops: u8,                   // 33
    pub sector: u8,                          // 34 0 = sector1
    pub current_lap_invalid: u8,             // 35
    pub penalties: u8,                       // 36 seconds
    pub total_warnings: u8,                  // 37
    pub corner_cutting_warnings: u8,         // 38
    pub num_unserved_drive_through_pens: u8, // 39
    pub num_unserved_stop_go_pens: u8,       // 40
    pub grid_position: u8,                   // 41
    pub driver_status: u8,                   // 42
    pub result_status: u8,                   // 43
    pub pit_lane_timer_active: u8,           // 44
    #[serde(rename = "PitLaneTimeInLaneInMS")]
    pub pit_lane_time_in_lane_ms: u16, // 45..47
    #[serde(rename = "PitStopTimerInMS")]
    pub pit_stop_timer_ms: u16, // 47..49
    pub pit_stop_should_serve_pen: u8, // 49
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct LapDataPayload {
    pub lap_data: [LapData; MAX_NUM_CARS],
    pub time_trial_pb_car_idx: u8,    // 255 if invalid
    pub time_trial_rival_car_idx: u8, // 255 if invalid
}

impl Payload for LapDataPayload {
    const RECORD_TYPE: RecordType = RecordType::LapData;

    fn decode(payload: &[u8]) -> Result<Self> {
        decode_layout(Self::RECORD_TYPE, payload)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_layout(self, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lap_data_size() {
        let size = bincode::serialized_size(&LapData::default()).unwrap();
        assert_eq!(size, 50);
    }

    #[test]
    fn test_decode_trailer() {
        let mut payload = vec![0u8; RecordType::LapData.payload_len()];
        payload[0..4].copy_from_slice(&93_456u32.to_le_bytes());
        payload[30] = 4;
        let len = payload.len();
        payload[len - 2] = 7;
        payload[len - 1] = 255;

        let lap = LapDataPayload::decode(&payload).unwrap();
        assert_eq!(lap.lap_data[0].last_lap_time_ms, 93_456);
        assert_eq!(lap.lap_data[0].car_position, 4);
        assert_eq!(lap.time_trial_pb_car_idx, 7);
        assert_eq!(lap.time_trial_rival_car_idx, 255);
    }
}
