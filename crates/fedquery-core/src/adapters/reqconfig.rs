//! Request-config store adapter.
//!
//! The store answers with one JSON object whose `results` member holds the
//! interesting payload; projection re-homes it under the service key.

use serde_json::Value;

use super::{decode_object, ApiHandler};
use crate::query::QuerySpec;
use crate::record::Record;

pub const SERVICE: &str = "reqconfig";

pub(crate) fn handler(_api: &str) -> ApiHandler {
    ApiHandler {
        decode,
        project: project_results,
    }
}

fn decode(payload: &[u8]) -> Vec<Record> {
    decode_object(SERVICE, payload)
}

fn project_results(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            let results = record.remove("results").unwrap_or(Value::Null);
            let mut entry = Record::new();
            entry.insert(SERVICE, results);
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::normalize;

    #[test]
    fn results_member_is_rehomed_under_the_service_key() {
        let spec = QuerySpec::default();
        let payload = br#"{"results": {"prepid": "cfg-1", "priority": 90000}}"#;
        let records = normalize(SERVICE, "config", payload, &spec);

        assert_eq!(records.len(), 1);
        let nested = records[0].get(SERVICE).expect("service key present");
        assert_eq!(nested.get("prepid").and_then(Value::as_str), Some("cfg-1"));
    }

    #[test]
    fn missing_results_member_maps_to_null() {
        let spec = QuerySpec::default();
        let records = normalize(SERVICE, "config", br#"{"other": 1}"#, &spec);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(SERVICE), Some(&Value::Null));
    }

    #[test]
    fn malformed_payload_degrades_to_error_record() {
        let spec = QuerySpec::default();
        let records = normalize(SERVICE, "config", b"not json", &spec);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind(), Some("parse_error"));
        assert_eq!(records[0].get_str("service"), Some(SERVICE));
    }
}
