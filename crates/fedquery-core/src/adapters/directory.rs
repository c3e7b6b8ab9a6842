//! Site/identity directory adapter.
//!
//! Directory APIs answer in tabular form: a column-name sequence plus row
//! value sequences, zipped into Records by the shared table decoder (which
//! also aliases `username` to `name`). Projections filter on QuerySpec
//! fields, with `*` treated as a substring wildcard.

use super::{decode_table, passthrough, ApiHandler, ProjectFn};
use crate::query::QuerySpec;
use crate::record::Record;

pub const SERVICE: &str = "directory";

pub(crate) fn handler(api: &str) -> ApiHandler {
    let project: ProjectFn = match api {
        "site-names" => project_site_names,
        "groups" => project_groups,
        "group-responsibilities" => project_group_responsibilities,
        "people-via-email" => project_people_via_email,
        "people-via-name" => project_people_via_name,
        "roles" => project_roles,
        _ => passthrough,
    };
    ApiHandler { decode, project }
}

fn decode(payload: &[u8]) -> Vec<Record> {
    decode_table(SERVICE, payload)
}

/// Substring fragment of a wildcarded pattern, when one is present.
fn wildcard_fragment(pattern: &str) -> Option<String> {
    if pattern.contains('*') {
        let fragment = pattern.replace('*', "");
        (!fragment.is_empty()).then_some(fragment)
    } else {
        None
    }
}

fn keep(candidate: &str, exact: &str, fragment: Option<&str>) -> bool {
    candidate == exact || fragment.is_some_and(|fragment| candidate.contains(fragment))
}

fn project_site_names(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(site) = spec.get_str("site") else {
        return Vec::new();
    };
    let fragment = wildcard_fragment(site);

    records
        .into_iter()
        .filter_map(|mut record| {
            let site_name = record.get_str("site_name")?.to_owned();
            record.insert("name", site_name.clone());
            keep(&site_name, site, fragment.as_deref()).then_some(record)
        })
        .collect()
}

fn project_groups(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(group) = spec.get_str("group") else {
        return Vec::new();
    };
    let fragment = wildcard_fragment(group);

    records
        .into_iter()
        .filter(|record| {
            record
                .get_str("name")
                .is_some_and(|name| keep(name, group, fragment.as_deref()))
        })
        .collect()
}

fn project_group_responsibilities(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(group) = spec.get_str("group") else {
        return Vec::new();
    };
    let fragment = wildcard_fragment(group);

    records
        .into_iter()
        .filter_map(|mut record| {
            let user_name = record.get_str("user_name")?.to_owned();
            if let Some(user_group) = record.get("user_group").cloned() {
                record.insert("name", user_group);
            }
            keep(&user_name, group, fragment.as_deref()).then_some(record)
        })
        .collect()
}

fn project_people_via_email(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(user) = spec.get_str("user") else {
        return Vec::new();
    };
    records
        .into_iter()
        .filter(|record| record.get_str("email") == Some(user))
        .collect()
}

fn project_people_via_name(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(user) = spec.get_str("user") else {
        return Vec::new();
    };
    let user = user.to_lowercase();

    records
        .into_iter()
        .filter(|record| {
            ["username", "forename", "surname", "email"]
                .iter()
                .any(|field| {
                    record
                        .get_str(field)
                        .is_some_and(|value| value.to_lowercase() == user)
                })
        })
        .collect()
}

fn project_roles(records: Vec<Record>, spec: &QuerySpec) -> Vec<Record> {
    let Some(role) = spec.get_str("role") else {
        return Vec::new();
    };
    let fragment = wildcard_fragment(role);

    records
        .into_iter()
        .filter(|record| {
            record
                .get_str("title")
                .is_some_and(|title| keep(title, role, fragment.as_deref()))
        })
        .collect()
}
