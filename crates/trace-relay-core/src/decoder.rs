//! Decoder for inbound realtime trace frames.
//!
//! A frame is a JSON object with an `Events` array. Only events whose
//! `TaskName` is `"Log"` become [`TraceRecord`]s; everything else is dropped.
//! Decoding never fails: malformed frames yield no records and a malformed
//! event only skips itself.

use serde_json::{Map, Value};

use crate::record::{TraceLevel, TraceRecord, from_filetime};

/// Category name of log events.
pub const LOG_TASK_NAME: &str = "Log";

/// Decode one text frame into records, preserving event order.
#[must_use]
pub fn decode_frame(frame: &str) -> Vec<TraceRecord> {
    let value: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Dropping unparsable frame: {e}");
            return Vec::new();
        }
    };
    decode_value(&value)
}

/// Decode an already-parsed frame.
#[must_use]
pub fn decode_value(value: &Value) -> Vec<TraceRecord> {
    let Some(events) = value
        .as_object()
        .and_then(|obj| obj.get("Events"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(Value::as_object)
        .filter(|evt| is_log_event(evt))
        .filter_map(|evt| {
            let record = decode_event(evt);
            if record.is_none() {
                tracing::debug!(event = ?evt, "Skipping malformed log event");
            }
            record
        })
        .collect()
}

fn is_log_event(evt: &Map<String, Value>) -> bool {
    evt.get("TaskName").and_then(Value::as_str) == Some(LOG_TASK_NAME)
}

fn decode_event(evt: &Map<String, Value>) -> Option<TraceRecord> {
    let ticks = ticks(evt.get("Timestamp")?)?;
    let timestamp = from_filetime(ticks)?;
    let level = TraceLevel::from_raw(raw_level(evt.get("Level")?)?)?;
    let message = evt.get("msg")?.as_str()?;
    Some(TraceRecord::new(timestamp, level, message))
}

#[allow(clippy::cast_possible_truncation)]
fn ticks(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    // Large tick counts may arrive as floating point numbers.
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0 && f < i64::MAX as f64).then_some(f as i64)
}

/// Levels are small integers, possibly written as `4.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn raw_level(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&f)).then_some(f as u64)
}
