//! Car telemetry record (type 6): driver inputs and car sensors.
//!
//! Throttle, brake and steering arrive as fractions (`0.0..=1.0`, steering
//! `-1.0..=1.0`) and are stored as percentages. Encoding divides them back.
//! The f32 division is not an exact inverse of the multiplication, so after
//! encode and decode these three fields can differ from the originals by a
//! rounding step (well below 0.0001 percentage points). Values whose fraction
//! is exact in binary, such as 50.0 or -100.0, come back unchanged. All other
//! fields are copied bit for bit.

use serde::{Deserialize, Serialize};

use super::{decode_layout, encode_layout, Payload, RecordType, MAX_NUM_CARS};
use crate::error::Result;

const PERCENT: f32 = 100.0;

/// Per-car telemetry sample (60 bytes)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarTelemetryData {
    pub speed: u16,    // 0..2 km/h
    pub throttle: f32, // 2..6
    pub steer: f32,    // 6..10
    pub brake: f32,    // 10..14
    pub clutch: u8,    // 14 0..100
    pub gear: i8,      // 15 N = 0, R = -1
    #[serde(rename = "EngineRPM")]
    pub engine_rpm: u16, // 16..18
    #[serde(rename = "DRS")]
    pub drs: u8, // 18
    pub rev_lights_percent: u8,             // 19
    pub rev_lights_bit_value: u16,          // 20..22 bit 0 = leftmost LED
    pub brakes_temperature: [u16; 4],       // 22..30 celsius
    pub tyres_surface_temperature: [u8; 4], // 30..34 celsius
    pub tyres_inner_temperature: [u8; 4],   // 34..38 celsius
    pub engine_temperature: u16,            // 38..40 celsius
    pub tyres_pressure: [f32; 4],           // 40..56 PSI
    pub surface_type: [u8; 4],              // 56..60
}

impl CarTelemetryData {
    fn scale_to_percent(&mut self) {
        self.throttle *= PERCENT;
        self.brake *= PERCENT;
        self.steer *= PERCENT;
    }

    fn scale_to_fraction(&mut self) {
        self.throttle /= PERCENT;
        self.brake /= PERCENT;
        self.steer /= PERCENT;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CarTelemetryPayload {
    pub car_telemetry_data: [CarTelemetryData; MAX_NUM_CARS],
    pub mfd_panel_index: u8, // 255 = closed
    pub mfd_panel_index_secondary_player: u8,
    pub suggested_gear: i8, // 0 if no suggestion
}

impl Payload for CarTelemetryPayload {
    const RECORD_TYPE: RecordType = RecordType::CarTelemetry;

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut telemetry: CarTelemetryPayload = decode_layout(Self::RECORD_TYPE, payload)?;
        telemetry
            .car_telemetry_data
            .iter_mut()
            .for_each(CarTelemetryData::scale_to_percent);
        Ok(telemetry)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut wire = self.clone();
        wire.car_telemetry_data
            .iter_mut()
            .for_each(CarTelemetryData::scale_to_fraction);
        encode_layout(&wire, out)
    }
}
