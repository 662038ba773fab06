//! Subscription filters and canonical subscription keys.
//!
//! A filter is a set of named dimensions, each holding a set of string values.
//! Both levels are ordered sets, so two filters built from the same values in
//! any order compare equal and serialize to the same canonical string. That
//! canonical string is what makes [`SubscriptionKey`] a pure function of
//! `(event_type, filter)`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Dimension name for cloud provider filters.
pub const PROVIDERS: &str = "providers";
/// Dimension name for credential id filters.
pub const CREDENTIAL_IDS: &str = "credential_ids";
/// Dimension name for region filters.
pub const REGIONS: &str = "regions";

/// Normalized multi-dimension filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, BTreeSet<String>>",
    from = "BTreeMap<String, Vec<String>>"
)]
pub struct SubscriptionFilter {
    dimensions: BTreeMap<String, BTreeSet<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for SubscriptionFilter {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut filter = Self::new();
        for (dimension, values) in raw {
            filter.insert(dimension, values);
        }
        filter
    }
}

impl From<SubscriptionFilter> for BTreeMap<String, BTreeSet<String>> {
    fn from(filter: SubscriptionFilter) -> Self {
        filter.dimensions
    }
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add values to a dimension. Blank values are ignored, and a dimension
    /// that ends up empty is not stored.
    pub fn with<I, S>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(dimension, values);
        self
    }

    pub fn with_providers<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(PROVIDERS, values)
    }

    pub fn with_credential_ids<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(CREDENTIAL_IDS, values)
    }

    pub fn with_regions<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(REGIONS, values)
    }

    pub fn insert<I, S>(&mut self, dimension: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dimension = dimension.into();
        let dimension = dimension.trim();
        if dimension.is_empty() {
            return;
        }
        let values: BTreeSet<String> = values
            .into_iter()
            .map(Into::into)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return;
        }
        self.dimensions
            .entry(dimension.to_string())
            .or_default()
            .extend(values);
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn get(&self, dimension: &str) -> Option<&BTreeSet<String>> {
        self.dimensions.get(dimension)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.dimensions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical serialized form: dimensions and values in sorted order.
    pub fn canonical(&self) -> String {
        // BTreeMap/BTreeSet serialize in key order; serializing plain strings
        // into a JSON object cannot fail.
        serde_json::to_string(&self.dimensions).unwrap_or_default()
    }
}

/// Canonical identity of a logical `(event_type, filter)` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(event_type: &str, filter: Option<&SubscriptionFilter>) -> Self {
        match filter {
            Some(f) if !f.is_empty() => Self(format!("{}|{}", event_type, f.canonical())),
            _ => Self(event_type.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
