//! Event record (type 3).
//!
//! A 4-byte ASCII code followed by a 12-byte detail area whose layout depends
//! on the code. Details shorter than the area are zero padded on encode.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::{Payload, RecordType};
use crate::error::{ParseError, Result};

const EVENT_CODE_SIZE: usize = 4;
const EVENT_DETAILS_SIZE: usize = 12;

bitflags! {
    /// Buttons held down in a `BUTN` event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonFlags: u32 {
        const CROSS = 0x0000_0001;
        const TRIANGLE = 0x0000_0002;
        const CIRCLE = 0x0000_0004;
        const SQUARE = 0x0000_0008;
        const DPAD_LEFT = 0x0000_0010;
        const DPAD_RIGHT = 0x0000_0020;
        const DPAD_UP = 0x0000_0040;
        const DPAD_DOWN = 0x0000_0080;
        const OPTIONS = 0x0000_0100;
        const L1 = 0x0000_0200;
        const R1 = 0x0000_0400;
        const L2 = 0x0000_0800;
        const R2 = 0x0000_1000;
        const LEFT_STICK_CLICK = 0x0000_2000;
        const RIGHT_STICK_CLICK = 0x0000_4000;
        const RIGHT_STICK_LEFT = 0x0000_8000;
        const RIGHT_STICK_RIGHT = 0x0001_0000;
        const RIGHT_STICK_UP = 0x0002_0000;
        const RIGHT_STICK_DOWN = 0x0004_0000;
        const SPECIAL = 0x0008_0000;
        const UDP_ACTION_1 = 0x0010_0000;
        const UDP_ACTION_2 = 0x0020_0000;
        const UDP_ACTION_3 = 0x0040_0000;
        const UDP_ACTION_4 = 0x0080_0000;
        const UDP_ACTION_5 = 0x0100_0000;
        const UDP_ACTION_6 = 0x0200_0000;
        const UDP_ACTION_7 = 0x0400_0000;
        const UDP_ACTION_8 = 0x0800_0000;
        const UDP_ACTION_9 = 0x1000_0000;
        const UDP_ACTION_10 = 0x2000_0000;
        const UDP_ACTION_11 = 0x4000_0000;
        const UDP_ACTION_12 = 0x8000_0000;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FastestLap {
    pub vehicle_idx: u8,
    pub lap_time: f32, // seconds
}

/// Details naming a single car (retirement, race winner, penalty served ...)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Vehicle {
    pub vehicle_idx: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Penalty {
    pub penalty_type: u8,
    pub infringement_type: u8,
    pub vehicle_idx: u8,
    pub other_vehicle_idx: u8,
    pub time: u8, // seconds
    pub lap_num: u8,
    pub places_gained: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SpeedTrap {
    pub vehicle_idx: u8,
    pub speed: f32, // km/h
    pub is_overall_fastest_in_session: u8,
    pub is_driver_fastest_in_session: u8,
    pub fastest_vehicle_idx_in_session: u8,
    pub fastest_speed_in_session: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct StartLights {
    pub num_lights: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Flashback {
    pub flashback_frame_identifier: u32,
    pub flashback_session_time: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Buttons {
    pub button_status: u32,
}

impl Buttons {
    pub fn flags(&self) -> ButtonFlags {
        ButtonFlags::from_bits_retain(self.button_status)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Overtake {
    pub overtaking_vehicle_idx: u8,
    pub being_overtaken_vehicle_idx: u8,
}

/// Decoded event, one variant per event code
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "EventStringCode", content = "EventDetails")]
pub enum EventPayload {
    #[serde(rename = "SSTA")]
    SessionStarted,
    #[serde(rename = "SEND")]
    SessionEnded,
    #[serde(rename = "FTLP")]
    FastestLap(FastestLap),
    #[serde(rename = "RTMT")]
    Retirement(Vehicle),
    #[serde(rename = "DRSE")]
    DrsEnabled,
    #[serde(rename = "DRSD")]
    DrsDisabled,
    #[serde(rename = "TMPT")]
    TeamMateInPits(Vehicle),
    #[serde(rename = "CHQF")]
    ChequeredFlag,
    #[serde(rename = "RCWN")]
    RaceWinner(Vehicle),
    #[serde(rename = "PENA")]
    Penalty(Penalty),
    #[serde(rename = "SPTP")]
    SpeedTrap(SpeedTrap),
    #[serde(rename = "STLG")]
    StartLights(StartLights),
    #[serde(rename = "LGOT")]
    LightsOut,
    #[serde(rename = "DTSV")]
    DriveThroughServed(Vehicle),
    #[serde(rename = "SGSV")]
    StopGoServed(Vehicle),
    #[serde(rename = "FLBK")]
    Flashback(Flashback),
    #[serde(rename = "BUTN")]
    Buttons(Buttons),
    #[serde(rename = "RDFL")]
    RedFlag,
    #[serde(rename = "OVTK")]
    Overtake(Overtake),
}

impl EventPayload {
    /// The 4-byte ASCII code identifying this event on the wire
    pub fn code(&self) -> &'static [u8; 4] {
        match self {
            EventPayload::SessionStarted => b"SSTA",
            EventPayload::SessionEnded => b"SEND",
            EventPayload::FastestLap(_) => b"FTLP",
            EventPayload::Retirement(_) => b"RTMT",
            EventPayload::DrsEnabled => b"DRSE",
            EventPayload::DrsDisabled => b"DRSD",
            EventPayload::TeamMateInPits(_) => b"TMPT",
            EventPayload::ChequeredFlag => b"CHQF",
            EventPayload::RaceWinner(_) => b"RCWN",
            EventPayload::Penalty(_) => b"PENA",
            EventPayload::SpeedTrap(_) => b"SPTP",
            EventPayload::StartLights(_) => b"STLG",
            EventPayload::LightsOut => b"LGOT",
            EventPayload::DriveThroughServed(_) => b"DTSV",
            EventPayload::StopGoServed(_) => b"SGSV",
            EventPayload::Flashback(_) => b"FLBK",
            EventPayload::Buttons(_) => b"BUTN",
            EventPayload::RedFlag => b"RDFL",
            EventPayload::Overtake(_) => b"OVTK",
        }
    }
}

impl Payload for EventPayload {
    const RECORD_TYPE: RecordType = RecordType::Event;

    fn decode(payload: &[u8]) -> Result<Self> {
        let expected = Self::RECORD_TYPE.payload_len();
        if payload.len() < expected {
            return Err(ParseError::TooShort {
                expected,
                actual: payload.len(),
            });
        }

        let mut code = [0u8; EVENT_CODE_SIZE];
        code.copy_from_slice(&payload[..EVENT_CODE_SIZE]);
        let details = &payload[EVENT_CODE_SIZE..expected];

        let event = match &code {
            b"SSTA" => EventPayload::SessionStarted,
            b"SEND" => EventPayload::SessionEnded,
            b"FTLP" => EventPayload::FastestLap(bincode::deserialize(details)?),
            b"RTMT" => EventPayload::Retirement(bincode::deserialize(details)?),
            b"DRSE" => EventPayload::DrsEnabled,
            b"DRSD" => EventPayload::DrsDisabled,
            b"TMPT" => EventPayload::TeamMateInPits(bincode::deserialize(details)?),
            b"CHQF" => EventPayload::ChequeredFlag,
            b"RCWN" => EventPayload::RaceWinner(bincode::deserialize(details)?),
            b"PENA" => EventPayload::Penalty(bincode::deserialize(details)?),
            b"SPTP" => EventPayload::SpeedTrap(bincode::deserialize(details)?),
            b"STLG" => EventPayload::StartLights(bincode::deserialize(details)?),
            b"LGOT" => EventPayload::LightsOut,
            b"DTSV" => EventPayload::DriveThroughServed(bincode::deserialize(details)?),
            b"SGSV" => EventPayload::StopGoServed(bincode::deserialize(details)?),
            b"FLBK" => EventPayload::Flashback(bincode::deserialize(details)?),
            b"BUTN" => EventPayload::Buttons(bincode::deserialize(details)?),
            b"RDFL" => EventPayload::RedFlag,
            b"OVTK" => EventPayload::Overtake(bincode::deserialize(details)?),
            _ => return Err(ParseError::UnknownEventCode(code)),
        };
        Ok(event)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self.code());
        let start = out.len();
        match self {
            EventPayload::FastestLap(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::Retirement(d)
            | EventPayload::TeamMateInPits(d)
            | EventPayload::RaceWinner(d)
            | EventPayload::DriveThroughServed(d)
            | EventPayload::StopGoServed(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::Penalty(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::SpeedTrap(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::StartLights(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::Flashback(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::Buttons(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::Overtake(d) => bincode::serialize_into(&mut *out, d)?,
            EventPayload::SessionStarted
            | EventPayload::SessionEnded
            | EventPayload::DrsEnabled
            | EventPayload::DrsDisabled
            | EventPayload::ChequeredFlag
            | EventPayload::LightsOut
            | EventPayload::RedFlag => {}
        }
        out.resize(start + EVENT_DETAILS_SIZE, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_bytes(code: &[u8; 4], details: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; RecordType::Event.payload_len()];
        payload[..4].copy_from_slice(code);
        payload[4..4 + details.len()].copy_from_slice(details);
        payload
    }

    #[test]
    fn test_detail_sizes_fit() {
        assert_eq!(bincode::serialized_size(&SpeedTrap::default()).unwrap(), 12);
        assert_eq!(bincode::serialized_size(&Flashback::default()).unwrap(), 8);
        assert_eq!(bincode::serialized_size(&Penalty::default()).unwrap(), 7);
        assert_eq!(
            EVENT_CODE_SIZE + EVENT_DETAILS_SIZE,
            RecordType::Event.payload_len()
        );
    }

    #[test]
    fn test_decode_buttons() {
        let status = (ButtonFlags::CROSS | ButtonFlags::UDP_ACTION_12).bits();
        let payload = event_bytes(b"BUTN", &status.to_le_bytes());

        let event = EventPayload::decode(&payload).unwrap();
        let EventPayload::Buttons(buttons) = event else {
            panic!("expected buttons, got {event:?}");
        };
        assert!(buttons.flags().contains(ButtonFlags::CROSS));
        assert!(buttons.flags().contains(ButtonFlags::UDP_ACTION_12));
        assert!(!buttons.flags().contains(ButtonFlags::L1));
    }

    #[test]
    fn test_decode_fastest_lap() {
        let mut details = vec![3u8];
        details.extend_from_slice(&81.25f32.to_le_bytes());
        let payload = event_bytes(b"FTLP", &details);

        assert_eq!(
            EventPayload::decode(&payload).unwrap(),
            EventPayload::FastestLap(FastestLap {
                vehicle_idx: 3,
                lap_time: 81.25
            })
        );
    }

    #[test]
    fn test_unknown_code() {
        let payload = event_bytes(b"XXXX", &[]);
        assert_eq!(
            EventPayload::decode(&payload),
            Err(ParseError::UnknownEventCode(*b"XXXX"))
        );
    }

    #[test]
    fn test_encode_pads_details() {
        let event = EventPayload::Overtake(Overtake {
            overtaking_vehicle_idx: 1,
            being_overtaken_vehicle_idx: 2,
        });
        let mut out = Vec::new();
        event.encode_into(&mut out).unwrap();
        assert_eq!(out, event_bytes(b"OVTK", &[1, 2]));
        assert_eq!(EventPayload::decode(&out).unwrap(), event);
    }

    #[test]
    fn test_json_shape() {
        let buttons = EventPayload::Buttons(Buttons { button_status: 16 });
        let json = serde_json::to_value(buttons).unwrap();
        assert_eq!(json["EventStringCode"], "BUTN");
        assert_eq!(json["EventDetails"]["ButtonStatus"], 16);

        let json = serde_json::to_value(EventPayload::LightsOut).unwrap();
        assert_eq!(json["EventStringCode"], "LGOT");
    }
}
