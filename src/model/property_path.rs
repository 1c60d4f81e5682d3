//! Property paths: ordered sequences of forward/inverse predicate steps from a
//! root resource to a value (§3, §4.1).

use serde::{Deserialize, Serialize};

/// One step of a property path: a predicate IRI, optionally traversed in reverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyStep {
    pub predicate: String,
    #[serde(default)]
    pub inverse: bool,
}

impl PropertyStep {
    pub fn forward(predicate: impl Into<String>) -> Self {
        PropertyStep { predicate: predicate.into(), inverse: false }
    }

    pub fn inverse(predicate: impl Into<String>) -> Self {
        PropertyStep { predicate: predicate.into(), inverse: true }
    }

    /// Parse the conventional `^iri` (inverse) / `iri` (forward) string form
    /// used in type-definition config files.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('^') {
            Some(rest) => Self::inverse(rest),
            None => Self::forward(raw),
        }
    }

    /// Render one `?from <pred> ?to .` (or swapped, for an inverse step) triple pattern.
    pub fn to_pattern(&self, from_var: &str, to_var: &str) -> String {
        if self.inverse {
            format!("{to_var} <{}> {from_var} .", self.predicate)
        } else {
            format!("{from_var} <{}> {to_var} .", self.predicate)
        }
    }
}

/// An ordered, flattened property path from a document root to a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyPath(pub Vec<PropertyStep>);

impl PropertyPath {
    pub fn new(steps: Vec<PropertyStep>) -> Self {
        PropertyPath(steps)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[PropertyStep] {
        &self.0
    }

    /// True if `predicate` (forward or inverse) appears at any position.
    pub fn contains(&self, predicate: &str) -> bool {
        self.0.iter().any(|s| s.predicate == predicate)
    }

    /// All indices at which `predicate` appears (forward or inverse).
    pub fn positions_of(&self, predicate: &str) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, s)| s.predicate == predicate)
            .map(|(i, _)| i)
            .collect()
    }

    /// `path[0..i]`, the steps strictly before position `i`.
    pub fn prefix(&self, i: usize) -> PropertyPath {
        PropertyPath(self.0[..i].to_vec())
    }

    /// `path[i+1..]`, the steps strictly after position `i`.
    pub fn suffix(&self, i: usize) -> PropertyPath {
        PropertyPath(self.0[i + 1..].to_vec())
    }

    /// Concatenate two paths (used when composing a nested property's own
    /// path onto its parent's path during flattening).
    pub fn concat(&self, other: &PropertyPath) -> PropertyPath {
        let mut steps = self.0.clone();
        steps.extend(other.0.iter().cloned());
        PropertyPath(steps)
    }

    /// Render a full `?root <p0> ?v0 . ?v0 <p1> ?v1 . ... <pn-1> ?object` chain,
    /// binding the path's final variable to `object_var`.
    pub fn to_sparql_chain(&self, root_var: &str, object_var: &str) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let mut patterns = Vec::with_capacity(self.0.len());
        let mut from = root_var.to_string();
        for (i, step) in self.0.iter().enumerate() {
            let to = if i + 1 == self.0.len() { object_var.to_string() } else { format!("?_p{i}") };
            patterns.push(step.to_pattern(&from, &to));
            from = to;
        }
        patterns.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inverse_marker() {
        let step = PropertyStep::parse("^http://ex/hasPart");
        assert!(step.inverse);
        assert_eq!(step.predicate, "http://ex/hasPart");
    }

    #[test]
    fn parses_forward_by_default() {
        let step = PropertyStep::parse("http://ex/title");
        assert!(!step.inverse);
    }

    #[test]
    fn positions_of_finds_all_occurrences() {
        let path = PropertyPath::new(vec![
            PropertyStep::forward("a"),
            PropertyStep::forward("b"),
            PropertyStep::forward("a"),
        ]);
        assert_eq!(path.positions_of("a"), vec![0, 2]);
        assert_eq!(path.positions_of("c"), Vec::<usize>::new());
    }

    #[test]
    fn prefix_and_suffix_split_around_index() {
        let path = PropertyPath::new(vec![
            PropertyStep::forward("a"),
            PropertyStep::forward("b"),
            PropertyStep::forward("c"),
        ]);
        assert_eq!(path.prefix(1).0, vec![PropertyStep::forward("a")]);
        assert_eq!(path.suffix(1).0, vec![PropertyStep::forward("c")]);
    }

    #[test]
    fn concat_appends_steps() {
        let a = PropertyPath::new(vec![PropertyStep::forward("a")]);
        let b = PropertyPath::new(vec![PropertyStep::forward("b")]);
        assert_eq!(a.concat(&b).0.len(), 2);
    }

    #[test]
    fn single_step_sparql_chain() {
        let path = PropertyPath::new(vec![PropertyStep::forward("http://ex/title")]);
        assert_eq!(path.to_sparql_chain("?s", "?v"), "?s <http://ex/title> ?v .");
    }

    #[test]
    fn inverse_step_sparql_chain() {
        let path = PropertyPath::new(vec![PropertyStep::inverse("http://ex/hasPart")]);
        assert_eq!(path.to_sparql_chain("?s", "?v"), "?v <http://ex/hasPart> ?s .");
    }

    #[test]
    fn multi_step_sparql_chain_uses_intermediate_vars() {
        let path = PropertyPath::new(vec![
            PropertyStep::inverse("http://ex/hasPart"),
            PropertyStep::forward("http://ex/title"),
        ]);
        assert_eq!(
            path.to_sparql_chain("?s", "?v"),
            "?_p0 <http://ex/hasPart> ?s . ?_p0 <http://ex/title> ?v ."
        );
    }
}
