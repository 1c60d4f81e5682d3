//! Authorization-group sets (§3 "Authorization Group Key", §6): the scope
//! under which a SPARQL query is evaluated, and its canonical serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One authorization group: a name plus its bound variables, as found in
/// `search:hasAllowedGroup` / `search:hasUsedGroup` catalog literals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl GroupDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        GroupDescriptor { name: name.into(), variables: BTreeMap::new() }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// An order-independent set of [`GroupDescriptor`]s. Identity and the
/// deterministic index name (§3, §4.4) depend only on the canonical
/// (sorted) form, never on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedGroups(pub Vec<GroupDescriptor>);

impl AllowedGroups {
    pub fn new(mut groups: Vec<GroupDescriptor>) -> Self {
        groups.sort();
        groups.dedup();
        AllowedGroups(groups)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupDescriptor> {
        self.0.iter()
    }

    /// One singleton-subset [`AllowedGroups`] per member, used by
    /// `fetch_indexes_for` when `additive_indexes` is set (§4.4).
    pub fn singleton_subsets(&self) -> Vec<AllowedGroups> {
        self.0.iter().map(|g| AllowedGroups::new(vec![g.clone()])).collect()
    }

    /// The canonical string used both as a map key within a type (§3) and as
    /// the JSON payload for the authorization-group HTTP header (§6).
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}
