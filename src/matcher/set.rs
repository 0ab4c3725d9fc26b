use super::Matcher;
use crate::error::MatcherSetError;
use crate::model::{BatchResult, PackageRecord};
use futures::future::join_all;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// A set of matchers with unique names.
///
/// Built explicitly by the host at startup; there is no global registry.
#[derive(Default, Clone)]
pub struct MatcherSet {
    set: BTreeMap<String, Arc<dyn Matcher>>,
}

impl MatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a matcher, rejecting a name that is already taken.
    pub fn add(&mut self, matcher: impl Matcher + 'static) -> Result<(), MatcherSetError> {
        self.add_shared(Arc::new(matcher))
    }

    pub fn add_shared(&mut self, matcher: Arc<dyn Matcher>) -> Result<(), MatcherSetError> {
        let name = matcher.name().to_string();
        if self.set.contains_key(&name) {
            return Err(MatcherSetError::Exists(vec![name]));
        }
        self.set.insert(name, matcher);
        Ok(())
    }

    /// Moves every matcher of `other` into this set.
    ///
    /// Fails without modifying this set if any name is already present; the
    /// error lists all of them.
    pub fn merge(&mut self, other: MatcherSet) -> Result<(), MatcherSetError> {
        let exists: Vec<String> = other
            .set
            .keys()
            .filter(|name| self.set.contains_key(*name))
            .cloned()
            .collect();
        if !exists.is_empty() {
            return Err(MatcherSetError::Exists(exists));
        }
        self.set.extend(other.set);
        Ok(())
    }

    /// Drops every matcher whose name does not match `pattern`.
    pub fn retain_matching(&mut self, pattern: &str) -> Result<(), MatcherSetError> {
        let re = Regex::new(pattern)?;
        self.set.retain(|name, _| re.is_match(name));
        Ok(())
    }

    pub fn matchers(&self) -> impl Iterator<Item = &Arc<dyn Matcher>> {
        self.set.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.set.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Runs every matcher against the records it accepts, concurrently.
    ///
    /// Entries for a record found by several matchers are concatenated in
    /// matcher name order. A matcher that rejects its batch is logged and
    /// skipped.
    pub async fn query_remote(&self, records: &[Arc<PackageRecord>]) -> BatchResult {
        let queries = self.set.values().map(|matcher| async move {
            let accepted: Vec<_> = records
                .iter()
                .filter(|r| matcher.filter(r))
                .cloned()
                .collect();
            (matcher.name(), matcher.query_remote(&accepted).await)
        });

        let mut merged = BatchResult::new();
        for (name, result) in join_all(queries).await {
            match result {
                Ok(result) => {
                    for (id, entries) in result {
                        merged.entry(id).or_default().extend(entries);
                    }
                }
                Err(error) => warn!(matcher = name, %error, "remote matcher rejected batch"),
            }
        }
        merged
    }
}

impl std::fmt::Debug for MatcherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.set.keys()).finish()
    }
}
