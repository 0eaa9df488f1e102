//! Car damage record (type 10): wear and component damage.

use serde::{Deserialize, Serialize};

use super::{decode_layout, encode_layout, Payload, RecordType, MAX_NUM_CARS};
use crate::error::Result;

/// Per-car damage (42 bytes). Damage and wear values are percentages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarDamageData {
    pub tyres_wear: [f32; 4],   // 0..16
    pub tyres_damage: [u8; 4],  // 16..20
    pub brakes_damage: [u8; 4], // 20..24
    pub front_left_wing_damage: u8,
    pub front_right_wing_damage: u8,
    pub rear_wing_damage: u8,
    pub floor_damage: u8,
    pub diffuser_damage: u8,
    pub sidepod_damage: u8,
    #[serde(rename = "DRSFault")]
    pub drs_fault: u8,
    #[serde(rename = "ERSFault")]
    pub ers_fault: u8,
    pub gear_box_damage: u8,
    pub engine_damage: u8,
    #[serde(rename = "EngineMGUHWear")]
    pub engine_mguh_wear: u8,
    #[serde(rename = "EngineESWear")]
    pub engine_es_wear: u8,
    #[serde(rename = "EngineCEWear")]
    pub engine_ce_wear: u8,
    #[serde(rename = "EngineICEWear")]
    pub engine_ice_wear: u8,
    #[serde(rename = "EngineMGUKWear")]
    pub engine_mguk_wear: u8,
    #[serde(rename = "EngineTCWear")]
    pub engine_tc_wear: u8,
    pub engine_blown: u8,
    pub engine_seized: u8, // 41
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarDamagePayload {
    pub car_damage_data: [CarDamageData; MAX_NUM_CARS],
}

impl Payload for CarDamagePayload {
    const RECORD_TYPE: RecordType = RecordType::CarDamage;

    fn decode(payload: &[u8]) -> Result<Self> {
        decode_layout(Self::RECORD_TYPE, payload)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_layout(self, out)
    }
}
