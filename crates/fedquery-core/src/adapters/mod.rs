//! Per-backend normalization adapters.
//!
//! Every backend payload enters through [`normalize`], which resolves a
//! dispatch-table entry keyed by `(service, api)`: a decode function that
//! turns raw bytes into Records, and a projection function that applies the
//! api-specific renaming, promotion and QuerySpec-driven filtering.
//!
//! Decoding never aborts a batch: a malformed unit of input contributes one
//! error Record while its well-formed siblings still decode. Error Records
//! bypass projection so a filter cannot silently swallow them.
//!
//! | Service | Backend | Payload shape |
//! |---------|---------|---------------|
//! | [`workflow`] | workflow manager | single JSON object / array |
//! | [`replica`] | replica catalog | newline-delimited object stream |
//! | [`directory`] | site/identity directory | tabular columns + rows |
//! | [`reqconfig`] | request-config store | single JSON object |

pub mod directory;
pub mod replica;
pub mod reqconfig;
pub mod workflow;

use serde_json::Value;

use crate::error::ErrorKind;
use crate::query::QuerySpec;
use crate::record::Record;

/// Decode raw payload bytes into Records.
pub type DecodeFn = fn(&[u8]) -> Vec<Record>;
/// Apply api-specific projection and filtering to decoded Records.
pub type ProjectFn = fn(Vec<Record>, &QuerySpec) -> Vec<Record>;

/// One dispatch-table entry.
#[derive(Clone, Copy)]
pub struct ApiHandler {
    pub decode: DecodeFn,
    pub project: ProjectFn,
}

/// Resolve the dispatch-table entry for a `(service, api)` pair.
pub fn handler(service: &str, api: &str) -> Option<ApiHandler> {
    match service {
        workflow::SERVICE => Some(workflow::handler(api)),
        replica::SERVICE => Some(replica::handler(api)),
        directory::SERVICE => Some(directory::handler(api)),
        reqconfig::SERVICE => Some(reqconfig::handler(api)),
        _ => None,
    }
}

/// Normalize one backend response into canonical Records.
pub fn normalize(service: &str, api: &str, payload: &[u8], spec: &QuerySpec) -> Vec<Record> {
    let Some(entry) = handler(service, api) else {
        return vec![Record::error(
            service,
            ErrorKind::Parse,
            format!("no adapter registered for {service}/{api}"),
        )];
    };

    let decoded = (entry.decode)(payload);
    let (errors, records): (Vec<Record>, Vec<Record>) =
        decoded.into_iter().partition(|record| record.is_error());
    let mut out = (entry.project)(records, spec);
    out.extend(errors);
    out
}

/// Identity projection.
pub(crate) fn passthrough(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    records
}

/// Decode a single JSON object.
pub(crate) fn decode_object(service: &'static str, payload: &[u8]) -> Vec<Record> {
    match serde_json::from_slice::<Record>(payload) {
        Ok(record) => vec![record],
        Err(err) => vec![decode_error(service, payload, &err)],
    }
}

/// Decode a JSON array of objects.
pub(crate) fn decode_object_list(service: &'static str, payload: &[u8]) -> Vec<Record> {
    match serde_json::from_slice::<Vec<Record>>(payload) {
        Ok(records) => records,
        Err(err) => vec![decode_error(service, payload, &err)],
    }
}

/// Decode a newline-delimited stream of JSON objects.
///
/// The final segment need not be newline-terminated. A malformed segment
/// yields one error Record in its place; sibling segments still decode.
pub(crate) fn decode_stream(service: &'static str, payload: &[u8]) -> Vec<Record> {
    let mut out = Vec::new();
    for segment in payload.split(|byte| *byte == b'\n') {
        if segment.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Record>(segment) {
            Ok(record) => out.push(record),
            Err(err) => out.push(decode_error(service, segment, &err)),
        }
    }
    out
}

/// Decode a JSON array of strings into `{name}` Records.
pub(crate) fn decode_name_list(service: &'static str, payload: &[u8]) -> Vec<Record> {
    match serde_json::from_slice::<Vec<String>>(payload) {
        Ok(names) => names
            .into_iter()
            .map(|name| {
                let mut record = Record::new();
                record.insert("name", name);
                record
            })
            .collect(),
        Err(err) => vec![decode_error(service, payload, &err)],
    }
}

/// Column aliases applied to every tabular row.
const TABLE_ALIASES: &[(&str, &str)] = &[("username", "name")];

/// Decode a tabular payload: `desc.columns` names zipped against `result`
/// row-value sequences, one Record per row.
pub(crate) fn decode_table(service: &'static str, payload: &[u8]) -> Vec<Record> {
    let value = match serde_json::from_slice::<Value>(payload) {
        Ok(value) => value,
        Err(err) => return vec![decode_error(service, payload, &err)],
    };

    let columns = value
        .get("desc")
        .and_then(|desc| desc.get("columns"))
        .and_then(Value::as_array);
    let rows = value.get("result").and_then(Value::as_array);
    let (Some(columns), Some(rows)) = (columns, rows) else {
        return vec![Record::error(
            service,
            ErrorKind::Parse,
            format!(
                "tabular payload is missing desc.columns or result: {}",
                payload_preview(payload)
            ),
        )];
    };

    let mut out = Vec::new();
    for row in rows {
        let Some(values) = row.as_array() else {
            out.push(Record::error(
                service,
                ErrorKind::Parse,
                format!("tabular row is not a sequence: {row}"),
            ));
            continue;
        };
        let mut record = Record::new();
        for (column, cell) in columns.iter().zip(values) {
            let Some(key) = column.as_str() else {
                continue;
            };
            record.insert(key, cell.clone());
            for (from, to) in TABLE_ALIASES {
                if key == *from {
                    record.insert(*to, cell.clone());
                }
            }
        }
        out.push(record);
    }
    out
}

fn decode_error(service: &str, payload: &[u8], err: &serde_json::Error) -> Record {
    log::debug!("{service} payload failed to decode: {err}");
    Record::error(
        service,
        ErrorKind::Parse,
        format!(
            "unable to decode payload into a record: {err}, data={}",
            payload_preview(payload)
        ),
    )
}

fn payload_preview(payload: &[u8]) -> String {
    const PREVIEW_LIMIT: usize = 200;
    let text = String::from_utf8_lossy(payload);
    if text.len() <= PREVIEW_LIMIT {
        text.into_owned()
    } else {
        let cut: String = text.chars().take(PREVIEW_LIMIT).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_yields_one_error_record() {
        let spec = QuerySpec::default();
        let records = normalize("nonesuch", "whatever", b"{}", &spec);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind(), Some("parse_error"));
        assert_eq!(records[0].get_str("service"), Some("nonesuch"));
    }

    #[test]
    fn malformed_object_payload_degrades_to_error_record() {
        let records = decode_object("workflow", b"{not json");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind(), Some("parse_error"));
    }

    #[test]
    fn stream_decodes_final_segment_without_trailing_newline() {
        let records = decode_stream("replica", b"{\"a\":1}\n{\"b\":2}");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("a").map(ToString::to_string), Some("1".into()));
        assert_eq!(records[1].get("b").map(ToString::to_string), Some("2".into()));
    }

    #[test]
    fn malformed_stream_segment_keeps_its_siblings() {
        let records = decode_stream("replica", b"{\"a\":1}\n{broken\n{\"b\":2}");

        assert_eq!(records.len(), 3);
        assert!(!records[0].is_error());
        assert!(records[1].is_error());
        assert!(!records[2].is_error());
    }

    #[test]
    fn table_zips_columns_and_applies_aliases() {
        let payload = br#"{
            "desc": {"columns": ["username", "forename"]},
            "result": [["alice", "Alice"], ["bob", "Bob"]]
        }"#;
        let records = decode_table("directory", payload);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("username"), Some("alice"));
        assert_eq!(records[0].get_str("forename"), Some("Alice"));
        assert_eq!(records[0].get_str("name"), Some("alice"));
        assert_eq!(records[1].get_str("name"), Some("bob"));
    }

    #[test]
    fn table_without_columns_degrades_to_error_record() {
        let records = decode_table("directory", b"{\"result\": []}");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_kind(), Some("parse_error"));
    }

    #[test]
    fn error_records_bypass_projection_filters() {
        let spec = QuerySpec::default();
        // rses projection drops records without a matching site; the error
        // Record from the malformed segment must still come through.
        let payload = b"{broken\n";
        let records = normalize("replica", "rses", payload, &spec);

        assert_eq!(records.len(), 1);
        assert!(records[0].is_error());
    }
}
