//! Alarm messages carried on the bus and their tolerant JSON decoding

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AlarmSrvError, Result};

/// One alarm instruction for a sensor
///
/// `duration_ms` and `regen_interval_ms` are already converted from the
/// wire's seconds; `duration_ms` is the remaining countdown while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmMessage {
    pub sensor_id: String,
    pub type_id: String,
    /// Alarm category, e.g. `LED` or `BUZZER`
    pub alarm_type: String,
    /// Category-specific value: a colour, a voice port, a relay index
    pub alarm_value: String,
    pub duration_ms: i64,
    pub regen_interval_ms: i64,
    /// Lower value wins
    pub priority: i64,
    pub on_off: Option<i64>,
}

impl AlarmMessage {
    /// Same slot of the active set: category plus sensor type
    pub fn same_slot(&self, other: &AlarmMessage) -> bool {
        self.alarm_type == other.alarm_type && self.type_id == other.type_id
    }

    /// Decode one object, converting seconds to milliseconds
    ///
    /// Missing or falsy `duration` becomes 1 s; `regenInterval` and
    /// `priority` default to 0. A field that is present but not numeric
    /// rejects the object.
    pub fn from_object(obj: &Map<String, Value>) -> Result<Self> {
        let duration_s = match int_field(obj, "duration")? {
            Some(0) | None => 1,
            Some(v) => v,
        };
        let regen_s = int_field(obj, "regenInterval")?.unwrap_or(0);
        let priority = int_field(obj, "priority")?.unwrap_or(0);

        Ok(Self {
            sensor_id: text_field(obj, "id"),
            type_id: text_field(obj, "typeId"),
            alarm_type: text_field(obj, "alarmType"),
            alarm_value: text_field(obj, "alarmValue"),
            duration_ms: duration_s.saturating_mul(1000),
            regen_interval_ms: regen_s.saturating_mul(1000),
            priority,
            on_off: obj.get("onOff").and_then(|v| lenient_int(v).ok().flatten()),
        })
    }
}

/// Parse an `alarm.updated` payload into messages
///
/// The payload must be a JSON array; non-object items are skipped. Any
/// malformed numeric field rejects the whole payload.
pub fn parse_payload(raw: &[u8]) -> Result<Vec<AlarmMessage>> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| AlarmSrvError::InvalidPayload(format!("not JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(AlarmSrvError::InvalidPayload(
            "expected a JSON array of alarm objects".to_string(),
        ));
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .map(AlarmMessage::from_object)
        .collect()
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn int_field(obj: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => lenient_int(v).map_err(|raw| {
            AlarmSrvError::InvalidPayload(format!("field '{}' is not an integer: {}", key, raw))
        }),
    }
}

/// Number, integral string, bool or null; `Err` carries the offending text
fn lenient_int(value: &Value) -> std::result::Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| n.to_string()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_message() {
        let raw = br#"[{"id":"s1","typeId":"t1","alarmType":"LED","alarmValue":"RED",
            "duration":3,"regenInterval":2,"priority":1,"onOff":1}]"#;
        let msgs = parse_payload(raw).unwrap();
        assert_eq!(msgs.len(), 1);
        let m = &msgs[0];
        assert_eq!(m.sensor_id, "s1");
        assert_eq!(m.alarm_value, "RED");
        assert_eq!(m.duration_ms, 3000);
        assert_eq!(m.regen_interval_ms, 2000);
        assert_eq!(m.priority, 1);
        assert_eq!(m.on_off, Some(1));
    }

    #[test]
    fn test_defaults_and_zero_duration() {
        let msgs = parse_payload(br#"[{"id":"s1","duration":0},{"id":"s2"}]"#).unwrap();
        assert_eq!(msgs[0].duration_ms, 1000);
        assert_eq!(msgs[1].duration_ms, 1000);
        assert_eq!(msgs[1].regen_interval_ms, 0);
        assert_eq!(msgs[1].priority, 0);
        assert_eq!(msgs[1].on_off, None);
    }

    #[test]
    fn test_numeric_alarm_value_and_string_numbers() {
        let msgs =
            parse_payload(br#"[{"id":"s1","alarmValue":3,"duration":"5","priority":"2"}]"#)
                .unwrap();
        assert_eq!(msgs[0].alarm_value, "3");
        assert_eq!(msgs[0].duration_ms, 5000);
        assert_eq!(msgs[0].priority, 2);
    }

    #[test]
    fn test_non_object_items_skipped() {
        let msgs = parse_payload(br#"[1, "x", {"id":"s1"}, null]"#).unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_rejects_non_array_and_bad_json() {
        assert!(matches!(
            parse_payload(br#"{"id":"s1"}"#),
            Err(AlarmSrvError::InvalidPayload(_))
        ));
        assert!(parse_payload(b"not json").is_err());
    }

    #[test]
    fn test_non_numeric_field_rejects_payload() {
        let err = parse_payload(br#"[{"id":"s1"},{"id":"s2","duration":"soon"}]"#).unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_same_slot() {
        let a = AlarmMessage::from_object(
            serde_json::json!({"id":"s1","typeId":"t","alarmType":"LED","alarmValue":"RED"})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        let mut b = a.clone();
        b.alarm_value = "YELLOW".into();
        assert!(a.same_slot(&b));
        b.alarm_type = "BUZZER".into();
        assert!(!a.same_slot(&b));
    }
}
