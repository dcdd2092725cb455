//! Maps a [`sia_common::ParsedEvent`] to the downstream JSON contract.
//!
//! Field-for-field port of `original_source/app/services/mapper.py`'s
//! `map_to_saras_payload`, expressed as a typed builder instead of a
//! dict literal.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sia_common::ParsedEvent;

pub const DEFAULT_HEARTBEAT_CODES: [&str; 5] = ["RP", "NP", "YK", "HE", "HB"];

pub struct Mapper {
    timezone: Tz,
    heartbeat_codes: BTreeSet<String>,
}

impl Mapper {
    pub fn new(timezone: Tz, configured_heartbeat_codes: &[String]) -> Self {
        let heartbeat_codes = if configured_heartbeat_codes.is_empty() {
            DEFAULT_HEARTBEAT_CODES.iter().map(|s| s.to_string()).collect()
        } else {
            configured_heartbeat_codes
                .iter()
                .map(|s| s.to_uppercase())
                .collect()
        };
        Self { timezone, heartbeat_codes }
    }

    pub fn is_heartbeat(&self, code: &str) -> bool {
        self.heartbeat_codes.contains(&code.to_uppercase())
    }

    fn render_timestamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn extras_to_message(event: &ParsedEvent) -> String {
        let mut parts: Vec<String> = event
            .extras
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
            .collect();
        if !event.raw.is_empty() {
            parts.push(format!("raw=\"{}\"", event.raw.replace('"', "\\\"")));
        }
        parts.join(" ")
    }

    /// Build the exact JSON body the downstream API expects.
    pub fn to_payload(&self, event: &ParsedEvent) -> serde_json::Value {
        let partition = event.partition.as_ref().map(|p| format!("{p:0>2}"));
        let zone = event.zone.as_ref().map(|z| format!("{z:0>3}"));

        serde_json::json!({
            "account_code": event.account,
            "event": if event.code.is_empty() { "UNKN".to_string() } else { event.code.clone() },
            "partition": partition,
            "zone": zone,
            "extra_message": Self::extras_to_message(event),
            "timestamp": self.render_timestamp(event.timestamp),
            "is_heartbeat": self.is_heartbeat(&event.code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_event(code: &str, zone: Option<&str>, partition: Option<&str>) -> ParsedEvent {
        ParsedEvent {
            account: "AAA".to_string(),
            sequence: 1,
            receiver: Some("1".to_string()),
            line: "1".to_string(),
            message_type: 'N',
            code: code.to_string(),
            zone: zone.map(str::to_string),
            partition: partition.map(str::to_string),
            extras: BTreeMap::new(),
            timestamp: DateTime::parse_from_rfc3339("2025-10-20T07:52:50+00:00")
                .unwrap()
                .with_timezone(&Utc),
            timestamp_from_panel: true,
            remote_addr: "127.0.0.1:4000".to_string(),
            raw: String::new(),
        }
    }

    #[test]
    fn timestamp_renders_in_jakarta_by_default() {
        let mapper = Mapper::new(Tz::Asia__Jakarta, &[]);
        let event = sample_event("BA", Some("001"), None);
        let payload = mapper.to_payload(&event);
        assert_eq!(payload["timestamp"], "2025-10-20 14:52:50");
    }

    #[test]
    fn zero_pads_partition_and_zone() {
        let mapper = Mapper::new(Tz::UTC, &[]);
        let event = sample_event("BA", Some("5"), Some("2"));
        let payload = mapper.to_payload(&event);
        assert_eq!(payload["zone"], "005");
        assert_eq!(payload["partition"], "02");
    }

    #[test]
    fn absent_zone_and_partition_are_null() {
        let mapper = Mapper::new(Tz::UTC, &[]);
        let event = sample_event("BA", None, None);
        let payload = mapper.to_payload(&event);
        assert!(payload["zone"].is_null());
        assert!(payload["partition"].is_null());
    }

    #[test]
    fn default_heartbeat_codes_classify_yk() {
        let mapper = Mapper::new(Tz::UTC, &[]);
        assert!(mapper.is_heartbeat("YK"));
        assert!(mapper.is_heartbeat("yk"));
        assert!(!mapper.is_heartbeat("BA"));
    }

    #[test]
    fn configured_heartbeat_codes_override_default() {
        let mapper = Mapper::new(Tz::UTC, &["BA".to_string()]);
        assert!(mapper.is_heartbeat("BA"));
        assert!(!mapper.is_heartbeat("YK"));
    }

    #[test]
    fn extras_join_as_key_value_pairs_with_raw_appended() {
        let mapper = Mapper::new(Tz::UTC, &[]);
        let mut event = sample_event("BA", Some("001"), None);
        event.extras.insert("note".to_string(), "a \"quoted\" value".to_string());
        event.raw = "\"SIA-DCS\"0001R1L1#AAA[#AAA|NBA001]".to_string();
        let payload = mapper.to_payload(&event);
        let message = payload["extra_message"].as_str().unwrap();
        assert!(message.contains(r#"note="a \"quoted\" value""#));
        assert!(message.contains(r#"raw="\"SIA-DCS\"0001R1L1#AAA[#AAA|NBA001]""#));
    }
}
