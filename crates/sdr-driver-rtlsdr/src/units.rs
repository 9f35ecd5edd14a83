//! Conversion between wire-protocol integers and natural units.
//!
//! The sampling server takes integers only: Hz for the listening frequency,
//! tenths of a dB for gains. Plans and the operator side use MHz and dB.
//! IF-stage gains all share one opcode; the stage number rides in the upper
//! 16 bits of the 32-bit wire value, the tenths-of-dB magnitude in the
//! lower 16.
//!
//! Conversions round to nearest on the outgoing path and never clamp; the
//! server is authoritative on rejecting out-of-range values.

use serde_json::Value;

/// True for the per-stage IF gain parameter names (`if_gain1` .. `if_gain6`).
pub fn is_if_gain(name: &str) -> bool {
    if_gain_stage(name).is_some()
}

/// Stage number encoded in an IF gain parameter name.
pub fn if_gain_stage(name: &str) -> Option<u32> {
    let stage: u32 = name.strip_prefix("if_gain")?.parse().ok()?;
    (1..=6).contains(&stage).then_some(stage)
}

/// Pack an IF-stage gain into its 32-bit wire value.
pub fn encode_if_gain(stage: u32, db: f64) -> u32 {
    let tenths = (db * 10.0).round() as i32;
    (stage << 16) | (tenths as u32 & 0xFFFF)
}

/// Recover (stage, dB) from a packed IF-stage gain wire value.
pub fn decode_if_gain(wire: u32) -> (u32, f64) {
    let stage = wire >> 16;
    let tenths = (wire & 0xFFFF) as u16 as i16;
    (stage, f64::from(tenths) / 10.0)
}

/// Outgoing conversion: natural-unit value to the integer the server expects.
///
/// Returned as `i64` so that values outside the unsigned 32-bit wire range
/// surface at framing time instead of wrapping silently.
pub fn to_wire(name: &str, value: f64) -> i64 {
    match name {
        "frequency" => (value * 1.0e6).round() as i64,
        "tuner_gain" => (value * 10.0).round() as i64,
        _ => {
            if let Some(stage) = if_gain_stage(name) {
                i64::from(encode_if_gain(stage, value))
            } else {
                value.round() as i64
            }
        }
    }
}

/// Incoming conversion: one reply-record value back to natural units.
///
/// Keys without a unit-bearing name pass through unconverted, as do
/// non-numeric values.
pub fn from_wire(name: &str, value: Value) -> Value {
    let Some(raw) = value.as_f64() else {
        return value;
    };
    let natural = match name {
        "frequency" => raw / 1.0e6,
        "tuner_gain" => raw / 10.0,
        _ if is_if_gain(name) => raw / 10.0,
        _ => return value,
    };
    Value::from(natural)
}
