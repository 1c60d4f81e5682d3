//! Delta message wire format (§6, v0.0.1).

use super::literal::Term;
use serde::{Deserialize, Serialize};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// One triple-level change, as it appears inside a changeset's `inserts`/`deletes` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Triple { subject, predicate, object }
    }

    pub fn is_rdf_type(&self) -> bool {
        self.predicate.value() == RDF_TYPE
    }
}

fn empty_triples() -> Vec<Triple> {
    Vec::new()
}

/// One element of the delta message array: a batch of inserts and deletes that
/// occurred together (§3 "Delta Message").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    #[serde(default = "empty_triples")]
    pub inserts: Vec<Triple>,
    #[serde(default = "empty_triples")]
    pub deletes: Vec<Triple>,
}

/// An ordered delta message: `Vec<Changeset>`. Deserializing a non-array JSON
/// payload fails, which callers treat as "reject with an error log, no state
/// change" (§6, §8 boundary behaviors).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaMessage {
    pub changesets: Vec<Changeset>,
}

/// Deduplicate a list of triples while preserving first-seen order, as required
/// before the Delta Router processes a changeset's inserts/deletes (§4.5).
pub fn dedup_triples(triples: Vec<Triple>) -> Vec<Triple> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(triples.len());
    for t in triples {
        let key = (
            t.subject.value().to_string(),
            t.predicate.value().to_string(),
            t.object.value().to_string(),
            t.object.lang().map(str::to_string),
            t.object.datatype().map(str::to_string),
        );
        if seen.insert(key) {
            out.push(t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_message_array() {
        let json = r#"[
            {"inserts": [{"subject": {"type":"uri","value":"http://ex/doc5"},
                          "predicate": {"type":"uri","value":"http://purl.org/dc/terms/title"},
                          "object": {"type":"literal","value":"giraffes"}}],
             "deletes": []}
        ]"#;
        let msg: DeltaMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.changesets.len(), 1);
        assert_eq!(msg.changesets[0].inserts.len(), 1);
        assert_eq!(msg.changesets[0].deletes.len(), 0);
    }

    #[test]
    fn missing_inserts_deletes_default_to_empty() {
        let json = r#"[{}]"#;
        let msg: DeltaMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.changesets, vec![Changeset::default()]);
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let json = r#"{"inserts": []}"#;
        assert!(serde_json::from_str::<DeltaMessage>(json).is_err());
    }

    #[test]
    fn dedup_preserves_order_and_drops_duplicates() {
        let t = Triple::new(
            Term::uri("http://ex/s"),
            Term::uri("http://ex/p"),
            Term::plain_literal("v"),
        );
        let deduped = dedup_triples(vec![t.clone(), t.clone(), t]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn is_rdf_type_detection() {
        let t = Triple::new(Term::uri("http://ex/s"), Term::uri(RDF_TYPE), Term::uri("http://ex/Doc"));
        assert!(t.is_rdf_type());
    }
}
