//! Packet scripts.
//!
//! A script is a JSON document describing the output tracks and the packets
//! a packetizer would hand to the muxer, in muxing order:
//!
//! ```json
//! {
//!   "tracks": [
//!     { "number": 1, "track_type": "video", "codec_id": "V_VP9" }
//!   ],
//!   "packets": [
//!     { "track": 1, "timestamp": 0, "duration": 40000000, "size": 1200 },
//!     { "track": 1, "timestamp": 40000000, "bref": 0, "payload": "deadbeef" }
//!   ]
//! }
//! ```
//!
//! Timestamps and durations are nanoseconds. A packet carries either a hex
//! `payload` or a synthetic `size`.

use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use mkvmux_core::packet::BlockAddition;
use mkvmux_core::{Packet, TrackConfig, TrackType};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("packet {index}: invalid hex in {field}: {source}")]
    Hex {
        index: usize,
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("packet {index}: needs exactly one of `payload` and `size`")]
    Payload { index: usize },

    #[error("packet {index}: track {track} is not declared")]
    UnknownTrack { index: usize, track: u64 },

    #[error("track {number}: invalid hex in codec_private: {source}")]
    CodecPrivate {
        number: u64,
        #[source]
        source: hex::FromHexError,
    },

    #[error("script declares no tracks")]
    NoTracks,
}

/// One declared track.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptTrack {
    #[serde(flatten)]
    pub config: TrackConfig,

    /// CodecPrivate as hex
    #[serde(default)]
    pub codec_private: Option<String>,
}

/// One packet line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptPacket {
    pub track: u64,
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub duration_mandatory: bool,
    pub bref: Option<i64>,
    pub fref: Option<i64>,
    pub key: Option<bool>,
    pub discardable: Option<bool>,
    /// Payload as hex
    pub payload: Option<String>,
    /// Synthetic payload length
    pub size: Option<usize>,
    pub codec_state: Option<String>,
    pub additions: Vec<ScriptAddition>,
    pub discard_padding: Option<i64>,
    pub follows_gap: bool,
    pub reference_priority: u64,
    pub source_file: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptAddition {
    pub id: u64,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacketScript {
    pub tracks: Vec<ScriptTrack>,

    #[serde(default)]
    pub packets: Vec<ScriptPacket>,
}

fn decode_hex(index: usize, field: &'static str, value: &str) -> Result<Bytes, ScriptError> {
    hex::decode(value.trim())
        .map(Bytes::from)
        .map_err(|source| ScriptError::Hex {
            index,
            field,
            source,
        })
}

/// Deterministic filler so synthetic payloads differ between packets.
fn synthetic_payload(index: usize, size: usize) -> Bytes {
    (0..size)
        .map(|i| (index.wrapping_mul(31).wrapping_add(i) & 0xff) as u8)
        .collect::<Vec<u8>>()
        .into()
}

impl ScriptPacket {
    pub fn to_packet(&self, index: usize) -> Result<Packet, ScriptError> {
        let data = match (&self.payload, self.size) {
            (Some(payload), None) => decode_hex(index, "payload", payload)?,
            (None, Some(size)) => synthetic_payload(index, size),
            _ => return Err(ScriptError::Payload { index }),
        };

        let mut packet = Packet::new(self.track, self.timestamp, data);
        packet.duration = self.duration;
        packet.duration_mandatory = self.duration_mandatory;
        packet.bref = self.bref;
        packet.fref = self.fref;
        packet.key_flag = self.key;
        packet.discardable_flag = self.discardable;
        packet.discard_padding = self.discard_padding;
        packet.follows_gap = self.follows_gap;
        packet.reference_priority = self.reference_priority;
        packet.source_file = self.source_file;

        if let Some(state) = &self.codec_state {
            packet.codec_state = Some(decode_hex(index, "codec_state", state)?);
        }
        for addition in &self.additions {
            packet.block_additions.push(BlockAddition {
                id: addition.id,
                data: decode_hex(index, "additions", &addition.data)?,
            });
        }

        Ok(packet)
    }
}

impl PacketScript {
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let script: PacketScript =
            serde_json::from_str(json).context("Failed to parse packet script")?;
        Ok(script)
    }

    pub fn has_video(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.config.track_type == TrackType::Video)
    }

    /// Track configurations with CodecPrivate decoded.
    pub fn track_configs(&self) -> Result<Vec<TrackConfig>, ScriptError> {
        if self.tracks.is_empty() {
            return Err(ScriptError::NoTracks);
        }

        self.tracks
            .iter()
            .map(|track| {
                let mut config = track.config.clone();
                if let Some(private) = &track.codec_private {
                    let data = hex::decode(private.trim()).map_err(|source| {
                        ScriptError::CodecPrivate {
                            number: config.number,
                            source,
                        }
                    })?;
                    config.codec_private = Some(data.into());
                }
                Ok(config)
            })
            .collect()
    }

    /// All packets, checked against the declared tracks.
    pub fn packets(&self) -> Result<Vec<Packet>, ScriptError> {
        self.packets
            .iter()
            .enumerate()
            .map(|(index, packet)| {
                if !self.tracks.iter().any(|t| t.config.number == packet.track) {
                    return Err(ScriptError::UnknownTrack {
                        index,
                        track: packet.track,
                    });
                }
                packet.to_packet(index)
            })
            .collect()
    }
}

/// Load a packet script from a JSON file
pub fn load_script(path: &Path) -> anyhow::Result<PacketScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read packet script: {:?}", path))?;
    PacketScript::parse(&content).with_context(|| format!("Invalid packet script: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SCRIPT: &str = r#"{
        "tracks": [
            { "number": 1, "track_type": "video", "codec_id": "V_VP9", "codec_private": "0102" },
            { "number": 2, "track_type": "audio", "codec_id": "A_OPUS" }
        ],
        "packets": [
            { "track": 1, "timestamp": 0, "duration": 40000000, "size": 16 },
            { "track": 2, "timestamp": 0, "duration": 20000000, "payload": "fc ff" },
            { "track": 1, "timestamp": 40000000, "bref": 0, "payload": "00ff", "codec_state": "aa" }
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script = PacketScript::parse(SCRIPT).unwrap();
        assert!(script.has_video());

        let tracks = script.track_configs().unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].codec_private.as_deref(), Some(&[1u8, 2][..]));
        assert!(tracks[1].lacing);
    }

    #[test]
    fn test_packets() {
        let script = PacketScript::parse(
            &SCRIPT.replace("\"fc ff\"", "\"fcff\""),
        )
        .unwrap();
        let packets = script.packets().unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].data.len(), 16);
        assert!(packets[0].is_key_frame());
        assert_eq!(&packets[1].data[..], &[0xfc, 0xff]);
        assert!(packets[2].is_p_frame());
        assert_eq!(packets[2].codec_state.as_deref(), Some(&[0xaa][..]));
    }

    #[test]
    fn test_bad_hex() {
        let script = PacketScript::parse(SCRIPT).unwrap();
        assert_matches!(
            script.packets(),
            Err(ScriptError::Hex { index: 1, field: "payload", .. })
        );
    }

    #[test]
    fn test_payload_and_size_are_exclusive() {
        let packet = ScriptPacket {
            track: 1,
            payload: Some("00".into()),
            size: Some(4),
            ..Default::default()
        };
        assert_matches!(packet.to_packet(3), Err(ScriptError::Payload { index: 3 }));
    }

    #[test]
    fn test_undeclared_track() {
        let script = PacketScript::parse(
            r#"{ "tracks": [ { "number": 1, "track_type": "audio", "codec_id": "A_AAC" } ],
                 "packets": [ { "track": 5, "timestamp": 0, "size": 1 } ] }"#,
        )
        .unwrap();
        assert_matches!(
            script.packets(),
            Err(ScriptError::UnknownTrack { index: 0, track: 5 })
        );
    }
}
