//! Rule: the pure function from a request's attributes to a bucket key.
//!
//! See [`Rule::matches`] and [`Rule::build_key`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::model::{ParamTag, Request};

/// A pure function mapping an attribute value to a key segment.
///
/// An empty string return drops the segment entirely.
pub type KeyBuilder = Arc<dyn Fn(i64) -> String + Send + Sync>;

/// A pure predicate deciding whether a request is admissible at all.
pub type MatchPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// An immutable, shareable matching rule.
///
/// Rules are value types: cloning is cheap (an `Arc` bump per closure
/// field) and sharing across requests is always safe since nothing here is
/// ever mutated after construction.
#[derive(Clone, Default)]
pub struct Rule {
    /// Ordered sequence of parameter tags defining key composition order.
    pub params: Vec<ParamTag>,
    /// Per-tag override for building a key segment from its value.
    pub key_builders: HashMap<ParamTag, KeyBuilder>,
    /// Absent means "always matches".
    pub match_predicate: Option<MatchPredicate>,
}

impl Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("params", &self.params)
            .field("key_builders", &self.key_builders.keys().collect::<Vec<_>>())
            .field("match_predicate", &self.match_predicate.is_some())
            .finish()
    }
}

impl Rule {
    pub fn new(params: Vec<ParamTag>) -> Self {
        Self {
            params,
            key_builders: HashMap::new(),
            match_predicate: None,
        }
    }

    /// Registers (or replaces) the key builder for `tag`.
    pub fn with_key_builder(
        mut self,
        tag: ParamTag,
        builder: impl Fn(i64) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_builders.insert(tag, Arc::new(builder));
        self
    }

    /// Sets the match predicate. Absent means "always matches".
    pub fn with_match_predicate(
        mut self,
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.match_predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns whether `req` is admissible under this rule at all.
    ///
    /// `BuildKey` is total; rejection is the caller's responsibility via
    /// this method, invoked before `build_key`.
    pub fn matches(&self, req: &Request) -> bool {
        match &self.match_predicate {
            Some(predicate) => predicate(req),
            None => true,
        }
    }

    /// Derives the bucket key for `req`.
    ///
    /// Walks `params` in order; a tag missing from `req.attrs` is skipped,
    /// as is a tag whose key builder returns an empty string. A tag with
    /// no registered builder falls back to the default `"<tag>:<value>"`
    /// segment. Segments are joined with `"|"`. This function never fails:
    /// missing attributes are skipped, not rejected (see [`Rule::matches`]
    /// for rejection).
    pub fn build_key(&self, req: &Request) -> String {
        let mut segments = Vec::with_capacity(self.params.len());
        for tag in &self.params {
            let Some(&value) = req.attrs.get(tag) else {
                continue;
            };
            match self.key_builders.get(tag) {
                Some(builder) => {
                    let segment = builder(value);
                    if !segment.is_empty() {
                        segments.push(segment);
                    }
                }
                None => segments.push(default_segment(*tag, value)),
            }
        }
        segments.join("|")
    }
}

fn default_segment(tag: ParamTag, value: i64) -> String {
    format!("{tag:?}:{value}")
}
