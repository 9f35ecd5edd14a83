//! Binary command framing and reply-stream decoding for the control socket.
//!
//! Outgoing commands are fixed 5-byte frames: a one-byte opcode followed by
//! a big-endian unsigned 32-bit value. The server answers on the same
//! socket with a 12-byte info header (once per connection, not interpreted
//! here) and then a stream of newline-terminated JSON objects, each a full
//! snapshot of its current parameter set in wire units.

use crate::units;
use bytes::BytesMut;
use sdr_core::error::{SdrError, SdrResult};
use sdr_core::registry::Settings;

/// Length of the one-shot info header the server sends after connect.
pub const REPLY_PREAMBLE_LEN: usize = 12;

/// Encoded command frame length: opcode byte plus 32-bit value.
pub const FRAME_LEN: usize = 5;

/// Wire opcode for a parameter name, if the server understands it.
///
/// The six IF gain stages share one opcode; the stage is disambiguated by
/// the encoded value (see [`units::encode_if_gain`]).
pub fn opcode(name: &str) -> Option<u8> {
    Some(match name {
        "frequency" => 1,
        "rate" => 2,
        "gain_mode" => 3,
        "tuner_gain" => 4,
        "freq_correction" => 5,
        "if_gain1" | "if_gain2" | "if_gain3" | "if_gain4" | "if_gain5" | "if_gain6" => 6,
        "test_mode" => 7,
        "agc_mode" => 8,
        "direct_sampling" => 9,
        "offset_tuning" => 10,
        "rtl_xtal" => 11,
        "tuner_xtal" => 12,
        "tuner_gain_index" => 13,
        "streaming" => 14,
        _ => return None,
    })
}

/// Encode one parameter command as a wire frame.
///
/// Returns `Ok(None)` for names the server does not recognize (callers drop
/// those silently) and an error when the converted value does not fit the
/// unsigned 32-bit wire field.
pub fn encode(name: &str, value: f64) -> SdrResult<Option<[u8; FRAME_LEN]>> {
    let Some(op) = opcode(name) else {
        return Ok(None);
    };
    let wire = units::to_wire(name, value);
    let wire = u32::try_from(wire)
        .map_err(|_| SdrError::Encode(format!("value {value} for '{name}' not a 32-bit integer")))?;

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = op;
    frame[1..].copy_from_slice(&wire.to_be_bytes());
    Ok(Some(frame))
}

/// Incremental decoder for the reply stream.
///
/// Socket reads may split or merge reply records arbitrarily; the decoder
/// accumulates bytes across calls and keeps at most one partial record
/// buffered after each pass. The info header is stripped exactly once per
/// channel lifetime, even if it arrives fragmented.
#[derive(Debug)]
pub struct ReplyDecoder {
    buf: BytesMut,
    preamble_remaining: usize,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            preamble_remaining: REPLY_PREAMBLE_LEN,
        }
    }

    /// Feed received bytes; returns the snapshots completed by this read, in
    /// arrival order, with incoming unit conversion already applied.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<Settings> {
        if self.preamble_remaining > 0 {
            let skip = self.preamble_remaining.min(data.len());
            self.preamble_remaining -= skip;
            data = &data[skip..];
        }
        self.buf.extend_from_slice(data);

        let mut snapshots = Vec::new();
        while let Some(eol) = self.buf.iter().position(|&b| b == b'\n') {
            let record = self.buf.split_to(eol + 1);
            match serde_json::from_slice::<Settings>(&record[..eol]) {
                Ok(raw) => snapshots.push(convert_snapshot(raw)),
                Err(err) => {
                    tracing::warn!(%err, "discarding malformed reply record");
                }
            }
        }
        snapshots
    }
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_snapshot(raw: Settings) -> Settings {
    raw.into_iter()
        .map(|(name, value)| {
            let value = units::from_wire(&name, value);
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PREAMBLE: &[u8] = b"RTL000000000";

    #[test]
    fn test_encode_frequency_frame() {
        let frame = encode("frequency", 166.376).unwrap().unwrap();
        assert_eq!(frame, [0x01, 0x09, 0xEA, 0xB2, 0x40]);
        assert_eq!(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]), 166_376_000);
    }

    #[test]
    fn test_encode_tuner_gain_frame() {
        let frame = encode("tuner_gain", 10.5).unwrap().unwrap();
        assert_eq!(frame, [0x04, 0x00, 0x00, 0x00, 0x69]);
    }

    #[test]
    fn test_encode_if_gain_frame_carries_stage() {
        let frame = encode("if_gain3", 2.5).unwrap().unwrap();
        assert_eq!(frame[0], 0x06);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            (3 << 16) | 25
        );
    }

    #[test]
    fn test_encode_unknown_name_is_none() {
        assert!(encode("bandwidth", 1.0).unwrap().is_none());
    }

    #[test]
    fn test_encode_unrepresentable_value_errors() {
        assert!(matches!(
            encode("frequency", -1.0),
            Err(SdrError::Encode(_))
        ));
        assert!(matches!(
            encode("frequency", 5_000.0),
            Err(SdrError::Encode(_))
        ));
    }

    #[test]
    fn test_decode_fragmented_stream() {
        let mut decoder = ReplyDecoder::new();

        let mut first = PREAMBLE.to_vec();
        first.extend_from_slice(b"{\"a\":1}\n");
        assert_eq!(decoder.push(&first), vec![settings(&[("a", json!(1))])]);

        assert!(decoder.push(b"{\"b\":2").is_empty());

        let rest = decoder.push(b"}\n{\"c\":3}\n");
        assert_eq!(
            rest,
            vec![
                settings(&[("b", json!(2))]),
                settings(&[("c", json!(3))]),
            ]
        );
    }

    #[test]
    fn test_decode_preamble_split_across_reads() {
        let mut decoder = ReplyDecoder::new();
        assert!(decoder.push(&PREAMBLE[..5]).is_empty());
        assert!(decoder.push(&PREAMBLE[5..]).is_empty());

        let got = decoder.push(b"{\"frequency\":166376000}\n");
        assert_eq!(got, vec![settings(&[("frequency", json!(166.376_f64))])]);
    }

    #[test]
    fn test_decode_applies_unit_conversion() {
        let mut decoder = ReplyDecoder::new();
        decoder.push(PREAMBLE);

        let got = decoder.push(b"{\"frequency\":166376000,\"tuner_gain\":105,\"rate\":240000}\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].get("frequency"), Some(&json!(166.376_f64)));
        assert_eq!(got[0].get("tuner_gain"), Some(&json!(10.5)));
        assert_eq!(got[0].get("rate"), Some(&json!(240_000)));
    }

    #[test]
    fn test_decode_skips_malformed_record() {
        let mut decoder = ReplyDecoder::new();
        decoder.push(PREAMBLE);

        let got = decoder.push(b"{not json}\n{\"agc_mode\":1}\n");
        assert_eq!(got, vec![settings(&[("agc_mode", json!(1))])]);
    }

    #[test]
    fn test_decode_coalesced_records_in_one_read() {
        let mut decoder = ReplyDecoder::new();
        decoder.push(PREAMBLE);

        let got = decoder.push(b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
        assert_eq!(got.len(), 3);
        assert_eq!(got[2].get("a"), Some(&json!(3)));
    }

    fn settings(pairs: &[(&str, serde_json::Value)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}
