//! Replica-catalog adapter.
//!
//! The catalog answers with a newline-delimited object stream. Projections
//! range from site explosion over `states` maps to wildcard filtering of
//! storage-element names against the caller's QuerySpec.

use serde_json::Value;

use super::{decode_stream, passthrough, ApiHandler, ProjectFn};
use crate::query::{QuerySpec, WildcardPattern};
use crate::record::Record;

pub const SERVICE: &str = "replica";

pub(crate) fn handler(api: &str) -> ApiHandler {
    let project: ProjectFn = match api {
        "rses" => project_rses,
        "site4dataset" | "site4block" | "site4file" => project_sites,
        "dataset4site" => project_datasets_for_site,
        "block4site" => project_named,
        "rules4dataset" | "rules4block" | "rules4file" | "block4dataset" | "full_record" => {
            passthrough
        }
        "file4dataset_site" | "file4block_site" => project_files_at_site,
        _ => project_replicas,
    };
    ApiHandler { decode, project }
}

fn decode(payload: &[u8]) -> Vec<Record> {
    decode_stream(SERVICE, payload)
}

/// Keep storage elements matching the caller's (possibly wildcarded) site
/// pattern; a non-matching Record is dropped, not kept as an error.
fn project_rses(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(site) = spec.get_str("site") else {
        return Vec::new();
    };
    let Ok(pattern) = WildcardPattern::compile(site) else {
        return Vec::new();
    };

    records
        .into_iter()
        .filter_map(|mut record| {
            let rse = record.get_str("rse")?.to_owned();
            if pattern.matches(&rse) {
                record.insert("name", rse);
                Some(record)
            } else {
                None
            }
        })
        .collect()
}

/// One Record per site found in the `states` map.
fn project_sites(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    let mut out = Vec::new();
    for record in records {
        let Some(states) = record.get("states").and_then(Value::as_object) else {
            continue;
        };
        for site in states.keys() {
            let mut entry = record.clone();
            entry.insert("name", site.clone());
            out.push(entry);
        }
    }
    out
}

/// Strip block suffixes and de-duplicate dataset names, first-seen order.
fn project_datasets_for_site(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    let mut names: Vec<String> = Vec::new();
    for record in &records {
        let Some(name) = record.get_str("name") else {
            continue;
        };
        let dataset = match name.split_once('#') {
            Some((dataset, _block)) => dataset,
            None => name,
        };
        if !names.iter().any(|seen| seen == dataset) {
            names.push(dataset.to_owned());
        }
    }
    names
        .into_iter()
        .map(|name| {
            let mut record = Record::new();
            record.insert("name", name);
            record
        })
        .collect()
}

fn project_named(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| record.contains_key("name"))
        .collect()
}

/// Keep Records whose `states` map lists the requested site.
fn project_files_at_site(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(site) = spec.get_str("site") else {
        return Vec::new();
    };
    records
        .into_iter()
        .filter(|record| {
            record
                .get("states")
                .and_then(Value::as_object)
                .is_some_and(|states| states.contains_key(site))
        })
        .collect()
}

/// Default projection: fold the `states` map into a `replicas` list.
fn project_replicas(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    let mut out = Vec::new();
    for mut record in records {
        let Some(states) = record.get("states").and_then(Value::as_object).cloned() else {
            continue;
        };
        let replicas: Vec<Value> = states
            .into_iter()
            .map(|(name, state)| {
                let mut replica = Record::new();
                replica.insert("name", name);
                replica.insert("state", state);
                Value::from(replica)
            })
            .collect();
        record.insert("replicas", replicas);
        out.push(record);
    }
    out
}
