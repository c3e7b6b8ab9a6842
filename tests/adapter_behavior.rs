//! Behavior tests for payload normalization.
//!
//! These verify HOW heterogeneous backend shapes become canonical Records:
//! stream and tabular decoding, error Records living alongside their
//! siblings, and QuerySpec-driven wildcard filtering.

use fedquery_tests::{adapters, spec_with, QuerySpec};

#[test]
fn stream_without_trailing_newline_decodes_every_segment() {
    // Given: a two-object stream whose last segment has no newline
    let payload = b"{\"a\":1}\n{\"b\":2}";

    // When: the replica adapter decodes it for a pass-through api
    let records = adapters::normalize("replica", "full_record", payload, &QuerySpec::default());

    // Then: exactly two Records, equal to the decoded segments
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("a").map(ToString::to_string), Some("1".into()));
    assert_eq!(records[1].get("b").map(ToString::to_string), Some("2".into()));
}

#[test]
fn malformed_stream_segment_becomes_one_error_record_among_siblings() {
    // Given: a malformed middle segment
    let payload = b"{\"a\":1}\n{oops\n{\"b\":2}";

    // When: the stream is decoded
    let records = adapters::normalize("replica", "full_record", payload, &QuerySpec::default());

    // Then: both valid Records survive and one error Record appears
    assert_eq!(records.len(), 3);
    let errors: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind(), Some("parse_error"));
    assert_eq!(errors[0].get_str("service"), Some("replica"));
}

#[test]
fn tabular_rows_are_zipped_and_username_is_aliased() {
    // Given: the identity directory's column/row shape
    let payload = br#"{
        "desc": {"columns": ["username", "forename"]},
        "result": [["alice", "Alice"], ["bob", "Bob"]]
    }"#;

    // When: decoded through the directory adapter
    let records = adapters::normalize("directory", "people", payload, &QuerySpec::default());

    // Then: each row is one Record and `name` mirrors `username`
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.get_str("name"), record.get_str("username"));
        assert!(record.contains_key("forename"));
    }
}

#[test]
fn wildcard_filter_keeps_matches_and_drops_the_rest() {
    // Given: two storage elements and a wildcarded site pattern
    let payload = b"{\"rse\":\"cms_site_1\"}\n{\"rse\":\"other_site\"}";
    let spec = spec_with("site", "cms*");

    // When: the rses projection filters by the pattern
    let records = adapters::normalize("replica", "rses", payload, &spec);

    // Then: the match survives with a promoted name; the miss is dropped
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_str("name"), Some("cms_site_1"));
}

#[test]
fn numeric_identifiers_keep_arbitrary_precision_through_decoding() {
    // Given: an id too large for an f64 mantissa
    let payload = br#"{"RequestName": "req", "RequestTransition": 9007199254740993}"#;

    // When: decoded as a workflow object
    let records = adapters::normalize("workflow", "outputdataset", payload, &QuerySpec::default());

    // Then: the number round-trips with every digit intact
    assert_eq!(
        records[0].get("RequestTransition").map(ToString::to_string),
        Some("9007199254740993".into())
    );
}

#[test]
fn malformed_single_object_payload_never_aborts_the_caller() {
    let records = adapters::normalize("workflow", "inputdataset", b"<html>", &QuerySpec::default());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind(), Some("parse_error"));
    assert_eq!(records[0].get_str("service"), Some("workflow"));
}

#[test]
fn output_dataset_projection_promotes_the_first_dataset() {
    let payload = br#"{"OutputDatasets": ["/a/b/RECO", "/a/b/AOD"]}"#;
    let records = adapters::normalize("workflow", "outputdataset", payload, &QuerySpec::default());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_str("name"), Some("/a/b/RECO"));
}

#[test]
fn reqconfig_results_are_rehomed_under_the_service_key() {
    let payload = br#"{"results": [{"prepid": "cfg-1"}]}"#;
    let records = adapters::normalize("reqconfig", "config", payload, &QuerySpec::default());

    assert_eq!(records.len(), 1);
    assert!(records[0].get("reqconfig").is_some());
    assert!(!records[0].contains_key("results"));
}
