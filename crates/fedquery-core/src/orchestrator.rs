//! Multi-round resolution orchestrator.
//!
//! Answers queries that chain one backend's results into the URLs of the
//! next call. The template is: validate the key, fan out round 1, scan the
//! responses for identifiers, partition identifiers into directly
//! resolvable and indirect ones, fan out round 2 for the indirect set, fan
//! in under a deadline, and merge everything into one summary Record.
//!
//! Fan-in is a blocking wait on task completion with an explicit per-round
//! deadline: requests still pending at the deadline are treated as failed
//! and the round proceeds with whatever arrived. One bad endpoint never
//! aborts the whole query.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};

use crate::context::ServiceContext;
use crate::error::CoreError;
use crate::fetch::FetchResponse;
use crate::query::QuerySpec;
use crate::record::Record;

/// Key-name fragment identifying configuration ids in workflow payloads.
/// Backend versions disagree about nesting and exact field names, so the
/// scan matches by substring.
const CONFIG_ID_FIELD: &str = "ConfigCacheID";
/// Identifiers of this length resolve directly to a config-file URL.
const DIRECT_ID_LEN: usize = 32;
/// Classification dimension for ids reached via the input-side lookup.
const BY_INPUT: &str = "byinputdataset";
/// Classification dimension for ids reached via the output-side lookup.
const BY_OUTPUT: &str = "byoutputdataset";

static DATASET_PATTERN: OnceLock<Regex> = OnceLock::new();

fn dataset_pattern() -> &'static Regex {
    DATASET_PATTERN
        .get_or_init(|| Regex::new(r"/[\w-]+/[\w-]+/[A-Z-]+").expect("dataset pattern is valid"))
}

/// Scratch state of one resolution call; never outlives it.
#[derive(Debug, Default)]
struct ResolutionState {
    /// De-duplicated identifiers, first-seen order.
    ids: Vec<String>,
    /// Ids reached via the input-side lookup dimension.
    by_input: Vec<String>,
    /// Ids reached via the output-side lookup dimension.
    by_output: Vec<String>,
    /// Resolved config-file URLs, de-duplicated.
    urls: Vec<String>,
}

/// Resolve the configuration files behind a dataset key.
///
/// Round 1 queries the workflow manager by output and by input dataset;
/// round 2 chases identifiers that need the config-cache indirection. The
/// result is one summary Record carrying the key, the identifier list, the
/// classification index and the per-dimension URL lists.
pub async fn resolve_configs(
    ctx: &ServiceContext,
    dataset: &str,
    _spec: &QuerySpec,
) -> Vec<Record> {
    if !dataset_pattern().is_match(dataset) {
        log::warn!("rejecting malformed dataset key {dataset}");
        return Vec::new();
    }

    let base = ctx.settings.workflow_base.trim_end_matches('/').to_owned();
    let deadline = ctx.settings.round_deadline;
    let mut state = ResolutionState::default();

    // Round 1: one URL per lookup dimension, dispatched concurrently.
    let encoded = urlencoding::encode(dataset).into_owned();
    let round_one = vec![
        format!("{base}/workflow/data/request?outputdataset={encoded}"),
        format!("{base}/workflow/data/request?inputdataset={encoded}"),
    ];
    for response in fan_out(ctx, &round_one, deadline).await {
        if let Some(error) = &response.error {
            log::warn!("round-1 lookup {} failed: {error}", response.url);
            continue;
        }
        scan_round_one(&response, &mut state);
    }

    // Partition: fixed-length ids resolve directly, the rest go through the
    // config-cache indirection.
    let mut indirect = Vec::new();
    for id in &state.ids {
        if id.len() == DIRECT_ID_LEN {
            push_unique(&mut state.urls, &config_file_url(&base, id));
        } else {
            indirect.push(format!("{base}/configcache/{id}"));
        }
    }

    // Round 2: chase forwarding identifiers for the indirect set.
    if !indirect.is_empty() {
        for response in fan_out(ctx, &indirect, deadline).await {
            if let Some(error) = &response.error {
                log::warn!("round-2 lookup {} failed: {error}", response.url);
                continue;
            }
            scan_round_two(&response, &base, &mut state);
        }
    }

    vec![merge(dataset, state)]
}

/// Dispatch one fetch task per URL and fan in by URL under the deadline.
async fn fan_out(ctx: &ServiceContext, urls: &[String], deadline: Duration) -> Vec<FetchResponse> {
    let mut tasks = JoinSet::new();
    let mut pending: HashSet<String> = HashSet::new();
    for url in urls {
        pending.insert(url.clone());
        ctx.fetcher.spawn_fetch(&mut tasks, url.clone(), None);
    }

    let expires = Instant::now() + deadline;
    let mut responses = Vec::new();
    while !pending.is_empty() {
        let remaining = expires.saturating_duration_since(Instant::now());
        match timeout(remaining, tasks.join_next()).await {
            Ok(Some(Ok(response))) => {
                pending.remove(&response.url);
                responses.push(response);
            }
            Ok(Some(Err(join_error))) => {
                log::warn!("fetch task aborted: {join_error}");
            }
            Ok(None) => break,
            Err(_elapsed) => {
                tasks.abort_all();
                for url in pending.drain() {
                    log::warn!("round deadline expired while waiting for {url}");
                    responses.push(FetchResponse::failed(
                        url.clone(),
                        CoreError::Timeout(format!("no response from {url} before deadline")),
                    ));
                }
            }
        }
    }
    responses
}

fn scan_round_one(response: &FetchResponse, state: &mut ResolutionState) {
    let Ok(record) = serde_json::from_slice::<Record>(&response.data) else {
        log::warn!("unable to decode round-1 payload from {}", response.url);
        return;
    };

    let lowered = response.url.to_lowercase();
    let dimension = if lowered.contains("inputdataset") {
        Some(BY_INPUT)
    } else if lowered.contains("outputdataset") {
        Some(BY_OUTPUT)
    } else {
        None
    };

    for value in record.values_by_key_substring(CONFIG_ID_FIELD) {
        let Some(id) = value.as_str() else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        match dimension {
            Some(BY_INPUT) => push_unique(&mut state.by_input, id),
            Some(BY_OUTPUT) => push_unique(&mut state.by_output, id),
            _ => {}
        }
        push_unique(&mut state.ids, id);
    }
}

fn scan_round_two(response: &FetchResponse, base: &str, state: &mut ResolutionState) {
    let Ok(record) = serde_json::from_slice::<Record>(&response.data) else {
        log::warn!("unable to decode round-2 payload from {}", response.url);
        return;
    };

    for value in record.values_by_key_substring(CONFIG_ID_FIELD) {
        let Some(id) = value.as_str() else {
            continue;
        };
        if !id.is_empty() {
            push_unique(&mut state.urls, &config_file_url(base, id));
        }
    }
}

fn config_file_url(base: &str, id: &str) -> String {
    format!("{base}/configcache/{id}/configFile")
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_owned());
    }
}

/// Build the summary Record: key, resolver name, de-duplicated ids, the
/// classification index and the URL lists matched back per dimension.
fn merge(dataset: &str, state: ResolutionState) -> Record {
    let mut record = Record::new();
    record.insert("dataset", dataset);
    record.insert("name", "workflow");
    record.insert("ids", state.ids.clone());

    let mut index = Record::new();
    index.insert(BY_INPUT, state.by_input.clone());
    index.insert(BY_OUTPUT, state.by_output.clone());
    record.insert("idict", index);

    let mut urls = Record::new();
    urls.insert("input", urls_for_ids(&state.by_input, &state.urls));
    urls.insert("output", urls_for_ids(&state.by_output, &state.urls));
    record.insert("urls", urls);

    record
}

fn urls_for_ids(ids: &[String], urls: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    for id in ids {
        for url in urls {
            if url.contains(id.as_str()) {
                matched.push(url.clone());
            }
        }
    }
    matched
}
