//! Query specification input and wildcard filtering.
//!
//! The external query parser hands the core a [`QuerySpec`]; the core only
//! ever reads it. Adapters use [`WildcardPattern`] to translate user-facing
//! `*` wildcards into anchored regular-expression matches against candidate
//! fields.

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Read-only query specification supplied by the query-language parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec(Map<String, Value>);

impl QuerySpec {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for QuerySpec {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Anchored wildcard matcher.
///
/// `*` translates to `.*`; a pattern without a wildcard matches any
/// candidate it prefixes. `cms*` matches `cms_site_1` and rejects
/// `other_site`.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    regex: Regex,
}

impl WildcardPattern {
    pub fn compile(pattern: &str) -> Result<Self, CoreError> {
        let translated = if pattern.contains('*') {
            pattern.replace('*', ".*")
        } else {
            format!("{pattern}.*")
        };
        let regex = Regex::new(&format!("^{translated}"))
            .map_err(|err| CoreError::InvalidInput(format!("bad pattern '{pattern}': {err}")))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}
