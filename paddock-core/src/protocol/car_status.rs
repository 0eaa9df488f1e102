//! Car status record (type 7): fuel, tyres, power unit and assists.

use serde::{Deserialize, Serialize};

use super::{decode_layout, encode_layout, Payload, RecordType, MAX_NUM_CARS};
use crate::error::Result;

/// Per-car status (55 bytes)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarStatusData {
    pub traction_control: u8,     // 0 0 = off, 1 = medium, 2 = full
    pub anti_lock_brakes: u8,     // 1
    pub fuel_mix: u8,             // 2 0 = lean .. 3 = max
    pub front_brake_bias: u8,     // 3 percent
    pub pit_limiter_status: u8,   // 4
    pub fuel_in_tank: f32,        // 5..9
    pub fuel_capacity: f32,       // 9..13
    pub fuel_remaining_laps: f32, // 13..17
    #[serde(rename = "MaxRPM")]
    pub max_rpm: u16, // 17..19
    #[serde(rename = "IdleRPM")]
    pub idle_rpm: u16, // 19..21
    pub max_gears: u8, // 21
    #[serde(rename = "DRSAllowed")]
    pub drs_allowed: u8, // 22
    #[serde(rename = "DRSActivationDistance")]
    pub drs_activation_distance: u16, // 23..25 metres, 0 = not available
    pub actual_tyre_compound: u8, // 25
    pub visual_tyre_compound: u8, // 26
    pub tyres_age_laps: u8,       // 27
    pub vehicle_fia_flags: i8,    // 28 -1 = invalid, 0 = none, 1 = green ..
    #[serde(rename = "EnginePowerICE")]
    pub engine_power_ice: f32, // 29..33 W
    #[serde(rename = "EnginePowerMGUK")]
    pub engine_power_mguk: f32, // 33..37 W
    pub ers_store_energy: f32, // 37..41 J
    pub ers_deploy_mode: u8,   // 41
    #[serde(rename = "ERSHarvestedThisLapMGUK")]
    pub ers_harvested_this_lap_mguk: f32, // 42..46
    #[serde(rename = "ERSHarvestedThisLapMGUH")]
    pub ers_harvested_this_lap_mguh: f32, // 46..50
    pub ers_deployed_this_lap: f32, // 50..54
    pub network_paused: u8,         // 54
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarStatusPayload {
    pub car_status_data: [CarStatusData; MAX_NUM_CARS],
}

impl Payload for CarStatusPayload {
    const RECORD_TYPE: RecordType = RecordType::CarStatus;

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
    fn test_car_status_size() {
        let size = bincode::serialized_size(&CarStatusData::default()).unwrap();
        assert_eq!(size, 55);
    }

    #[test]
    fn test_decode_fuel_and_flags() {
        let mut payload = vec![0u8; RecordType::CarStatus.payload_len()];
        payload[5..9].copy_from_slice(&42.5f32.to_le_bytes());
        payload[28] = (-1i8) as u8;
        payload[54] = 1;

        let status = CarStatusPayload::decode(&payload).unwrap();
        assert_eq!(status.car_status_data[0].fuel_in_tank, 42.5);
        assert_eq!(status.car_status_data[0].vehicle_fia_flags, -1);
        assert_eq!(status.car_status_data[0].network_paused, 1);
    }
}
