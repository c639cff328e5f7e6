//! In-memory label index.
//!
//! Three mappings kept consistent under a single read-write lock:
//! label key to known values, `(key, value)` pair to stream ids, and
//! stream id back to its full label set. A single lock keeps `register`
//! atomic across all three; read paths take the read lock and return
//! copies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use logwell_model::{LabelSet, MatchOp, Selector, StreamId};

#[derive(Debug, Default)]
struct Inner {
    values_by_key: BTreeMap<String, BTreeSet<String>>,
    streams_by_pair: HashMap<(String, String), BTreeSet<StreamId>>,
    labels_by_stream: HashMap<StreamId, LabelSet>,
}

#[derive(Debug, Default)]
pub struct LabelIndex {
    inner: RwLock<Inner>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label set, returning its stream id. Idempotent.
    pub fn register(&self, labels: &LabelSet) -> StreamId {
        let id = labels.stream_id();
        let mut inner = self.inner.write().expect("label index lock poisoned");
        if inner.labels_by_stream.contains_key(&id) {
            return id;
        }
        for (key, value) in labels.iter() {
            inner
                .values_by_key
                .entry(key.to_string())
                .or_default()
                .insert(value.to_string());
            inner
                .streams_by_pair
                .entry((key.to_string(), value.to_string()))
                .or_default()
                .insert(id.clone());
        }
        inner.labels_by_stream.insert(id.clone(), labels.clone());
        id
    }

    /// Snapshot of known label keys, lexicographic.
    pub fn label_keys(&self) -> Vec<String> {
        let inner = self.inner.read().expect("label index lock poisoned");
        inner.values_by_key.keys().cloned().collect()
    }

    /// Snapshot of known values for a key, lexicographic.
    pub fn values_of(&self, key: &str) -> Vec<String> {
        let inner = self.inner.read().expect("label index lock poisoned");
        inner
            .values_by_key
            .get(key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The label set a stream id was registered with.
    pub fn labels_of(&self, id: &StreamId) -> Option<LabelSet> {
        let inner = self.inner.read().expect("label index lock poisoned");
        inner.labels_by_stream.get(id).cloned()
    }

    pub fn stream_count(&self) -> usize {
        let inner = self.inner.read().expect("label index lock poisoned");
        inner.labels_by_stream.len()
    }

    /// Resolve the positive matchers of a selector to a set of stream ids.
    ///
    /// `=` pairs intersect directly; `=~` pairs union the streams of every
    /// known value of the key that the pattern matches, then intersect
    /// with the accumulator. Negative matchers are ignored here and
    /// applied by the query executor. A selector with no positive
    /// matchers resolves to all known streams.
    pub fn resolve(&self, selector: &Selector) -> BTreeSet<StreamId> {
        let inner = self.inner.read().expect("label index lock poisoned");
        let mut accumulator: Option<BTreeSet<StreamId>> = None;

        for matcher in selector.matchers() {
            let candidate = match matcher.op() {
                MatchOp::Eq => inner
                    .streams_by_pair
                    .get(&(matcher.key().to_string(), matcher.value().to_string()))
                    .cloned()
                    .unwrap_or_default(),
                MatchOp::Re => {
                    let mut union = BTreeSet::new();
                    if let Some(values) = inner.values_by_key.get(matcher.key()) {
                        for value in values {
                            if matcher.matches_value(value)
                                && let Some(streams) = inner
                                    .streams_by_pair
                                    .get(&(matcher.key().to_string(), value.clone()))
                            {
                                union.extend(streams.iter().cloned());
                            }
                        }
                    }
                    union
                }
                MatchOp::Neq | MatchOp::NotRe => continue,
            };

            accumulator = Some(match accumulator {
                None => candidate,
                Some(acc) => acc.intersection(&candidate).cloned().collect(),
            });

            if accumulator.as_ref().is_some_and(BTreeSet::is_empty) {
                return BTreeSet::new();
            }
        }

        accumulator
            .unwrap_or_else(|| inner.labels_by_stream.keys().cloned().collect())
    }
}
