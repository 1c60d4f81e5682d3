//! RDF terms as they appear on the wire, and the coerced literal values a
//! `simple` property produces once a term's datatype has been interpreted.

use serde::{Deserialize, Serialize};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// One RDF term: the subject/predicate/object slot of a [`Triple`](super::triple::Triple).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Term {
    Uri {
        value: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "xml:lang")]
        lang: Option<String>,
    },
}

impl Term {
    pub fn uri(value: impl Into<String>) -> Self {
        Term::Uri { value: value.into() }
    }

    pub fn plain_literal(value: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), datatype: None, lang: None }
    }

    pub fn value(&self) -> &str {
        match self {
            Term::Uri { value } | Term::Literal { value, .. } => value,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Term::Uri { .. })
    }

    pub fn lang(&self) -> Option<&str> {
        match self {
            Term::Literal { lang, .. } => lang.as_deref(),
            Term::Uri { .. } => None,
        }
    }

    pub fn datatype(&self) -> Option<&str> {
        match self {
            Term::Literal { datatype, .. } => datatype.as_deref(),
            Term::Uri { .. } => None,
        }
    }

    /// Lexical/language/datatype-preserving SPARQL term syntax (§4.5).
    pub fn to_sparql_term(&self) -> String {
        match self {
            Term::Uri { value } => format!("<{value}>"),
            Term::Literal { value, datatype, lang } => {
                let escaped = escape_sparql_string(value);
                if let Some(lang) = lang {
                    format!("\"{escaped}\"@{lang}")
                } else if let Some(dt) = datatype {
                    format!("\"{escaped}\"^^<{dt}>")
                } else {
                    format!("\"{escaped}\"")
                }
            }
        }
    }

    /// Coerce this term into a [`Literal`] using the rules in §4.3 ("simple" properties).
    pub fn coerce(&self) -> Literal {
        let Term::Literal { value, datatype, .. } = self else {
            return Literal::String(self.value().to_string());
        };
        let Some(dt) = datatype else {
            return Literal::String(value.clone());
        };
        let local = dt.strip_prefix(XSD).unwrap_or(dt.as_str());
        match local {
            "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
            | "positiveInteger" | "negativeInteger" | "nonPositiveInteger" => value
                .parse::<i64>()
                .map(Literal::Int)
                .unwrap_or_else(|_| Literal::String(value.clone())),
            "decimal" | "double" | "float" => value
                .parse::<f64>()
                .map(Literal::Float)
                .unwrap_or_else(|_| Literal::String(value.clone())),
            "boolean" => value
                .parse::<bool>()
                .map(Literal::Bool)
                .unwrap_or_else(|_| Literal::String(value.clone())),
            // date/datetime/time stay lexical ISO-8601 strings, per §4.3.
            _ => Literal::String(value.clone()),
        }
    }
}

fn escape_sparql_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// A coerced scalar value that goes into a built [`Document`](crate::document_builder::Document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl From<Literal> for serde_json::Value {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Int(i) => serde_json::Value::from(i),
            Literal::Float(f) => serde_json::Value::from(f),
            Literal::Bool(b) => serde_json::Value::from(b),
            Literal::String(s) => serde_json::Value::from(s),
        }
    }
}
