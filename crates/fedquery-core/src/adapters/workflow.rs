//! Workflow-manager adapter.
//!
//! Single-object JSON payloads with api-specific projections: dataset
//! promotion from `InputDatasets`/`OutputDatasets`, config-id map
//! explosion, and deep scans over prep-id result rows.

use serde_json::Value;

use super::{
    decode_name_list, decode_object, decode_object_list, passthrough, ApiHandler, DecodeFn,
    ProjectFn,
};
use crate::query::QuerySpec;
use crate::record::Record;

pub const SERVICE: &str = "workflow";

pub(crate) fn handler(api: &str) -> ApiHandler {
    let project: ProjectFn = match api {
        "inputdataset" => project_input_dataset,
        "outputdataset" => project_output_dataset,
        "configIDs" => project_config_ids,
        "datasetByPrepID" => project_dataset_by_prep_id,
        _ => passthrough,
    };
    let decode: DecodeFn = match api {
        "recentDatasetByPrepID" => decode_recent_datasets,
        "configIDs" | "datasetByPrepID" | "outputdataset" | "inputdataset" => decode_single,
        _ => decode_list,
    };
    ApiHandler { decode, project }
}

fn decode_single(payload: &[u8]) -> Vec<Record> {
    decode_object(SERVICE, payload)
}

fn decode_list(payload: &[u8]) -> Vec<Record> {
    decode_object_list(SERVICE, payload)
}

fn decode_recent_datasets(payload: &[u8]) -> Vec<Record> {
    decode_name_list(SERVICE, payload)
}

fn project_input_dataset(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    promote_first_entry(records, "InputDatasets")
}

fn project_output_dataset(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    promote_first_entry(records, "OutputDatasets")
}

/// Promote the first element of a dataset list into a top-level `name`.
fn promote_first_entry(mut records: Vec<Record>, field: &str) -> Vec<Record> {
    for record in &mut records {
        let first = record
            .get(field)
            .and_then(Value::as_array)
            .and_then(|datasets| datasets.first())
            .cloned();
        if let Some(dataset) = first {
            record.insert("name", dataset);
        }
    }
    records
}

/// Explode the request-name → config-files map into one Record per entry.
fn project_config_ids(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    let mut out = Vec::new();
    for record in records {
        for (request_name, config_files) in record {
            let mut entry = Record::new();
            entry.insert("request_name", request_name);
            entry.insert("config_files", config_files);
            out.push(entry);
        }
    }
    out
}

/// Collect every output dataset buried in the prep-id result rows. The
/// nesting varies across backend versions, so the scan matches by key name
/// rather than by path.
fn project_dataset_by_prep_id(records: Vec<Record>, _spec: &QuerySpec) -> Vec<Record> {
    let mut out = Vec::new();
    for record in &records {
        for value in record.values_by_key_substring("OutputDatasets") {
            let Some(datasets) = value.as_array() else {
                continue;
            };
            for dataset in datasets {
                let mut entry = Record::new();
                entry.insert("name", dataset.clone());
                out.push(entry);
            }
        }
    }
    out
}
