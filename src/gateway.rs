//! Triplestore Gateway (§4.2): authorized SPARQL access plus an
//! administrative sudo channel, over SPARQL 1.1 Query/Update via HTTP (§6).

use crate::auth_groups::AllowedGroups;
use crate::error::IndexSyncError;
use crate::model::Term;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One SPARQL solution row: variable name → bound term.
pub type Bindings = HashMap<String, Term>;

/// Authorized and administrative access to the triplestore. Scoped calls
/// attach the caller's `AllowedGroups` to every request; sudo calls never
/// carry a scope (§4.2, §6).
#[async_trait]
pub trait TriplestoreGateway: Send + Sync {
    async fn select_scoped(&self, query: &str, groups: &AllowedGroups) -> Result<Vec<Bindings>, IndexSyncError>;

    async fn ask_scoped(&self, query: &str, groups: &AllowedGroups) -> Result<bool, IndexSyncError>;

    /// Bypasses authorization; used only for catalog maintenance (§4.4, §6).
    async fn select_sudo(&self, query: &str) -> Result<Vec<Bindings>, IndexSyncError>;

    async fn update_sudo(&self, query: &str) -> Result<(), IndexSyncError>;
}

const AUTH_GROUPS_HEADER: &str = "mu-auth-allowed-groups";

/// Production gateway backed by a SPARQL 1.1 HTTP endpoint.
pub struct HttpSparqlGateway {
    client: reqwest::Client,
    query_endpoint: String,
    update_endpoint: String,
}

impl HttpSparqlGateway {
    pub fn new(query_endpoint: impl Into<String>, update_endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and known-valid");
        HttpSparqlGateway { client, query_endpoint: query_endpoint.into(), update_endpoint: update_endpoint.into() }
    }

    async fn select(&self, query: &str, groups: Option<&AllowedGroups>) -> Result<Vec<Bindings>, IndexSyncError> {
        let mut req = self
            .client
            .post(&self.query_endpoint)
            .header("accept", "application/sparql-results+json")
            .form(&[("query", query)]);
        if let Some(groups) = groups {
            req = req.header(AUTH_GROUPS_HEADER, groups.canonical_key());
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(IndexSyncError::Query(format!("sparql select failed: {}", resp.status())));
        }
        let parsed: SparqlResultsJson = resp.json().await.map_err(IndexSyncError::from)?;
        Ok(parsed.into_bindings())
    }

    async fn ask(&self, query: &str, groups: Option<&AllowedGroups>) -> Result<bool, IndexSyncError> {
        let mut req = self
            .client
            .post(&self.query_endpoint)
            .header("accept", "application/sparql-results+json")
            .form(&[("query", query)]);
        if let Some(groups) = groups {
            req = req.header(AUTH_GROUPS_HEADER, groups.canonical_key());
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(IndexSyncError::Query(format!("sparql ask failed: {}", resp.status())));
        }
        let parsed: SparqlAskJson = resp.json().await.map_err(IndexSyncError::from)?;
        Ok(parsed.boolean)
    }
}

#[async_trait]
impl TriplestoreGateway for HttpSparqlGateway {
    async fn select_scoped(&self, query: &str, groups: &AllowedGroups) -> Result<Vec<Bindings>, IndexSyncError> {
        if groups.is_empty() {
            return Err(IndexSyncError::Auth("scoped query requires a non-empty allowed-groups set".into()));
        }
        self.select(query, Some(groups)).await
    }

    async fn ask_scoped(&self, query: &str, groups: &AllowedGroups) -> Result<bool, IndexSyncError> {
        if groups.is_empty() {
            return Err(IndexSyncError::Auth("scoped query requires a non-empty allowed-groups set".into()));
        }
        self.ask(query, Some(groups)).await
    }

    async fn select_sudo(&self, query: &str) -> Result<Vec<Bindings>, IndexSyncError> {
        self.select(query, None).await
    }

    async fn update_sudo(&self, query: &str) -> Result<(), IndexSyncError> {
        let resp = self
            .client
            .post(&self.update_endpoint)
            .form(&[("update", query)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(IndexSyncError::Query(format!("sparql update failed: {}", resp.status())));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SparqlAskJson {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
struct SparqlResultsJson {
    results: SparqlResultsBody,
}

#[derive(Debug, Deserialize)]
struct SparqlResultsBody {
    bindings: Vec<HashMap<String, SparqlTermJson>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTermJson {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default, rename = "xml:lang")]
    lang: Option<String>,
}

impl SparqlResultsJson {
    fn into_bindings(self) -> Vec<Bindings> {
        self.results
            .bindings
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(var, term)| (var, term.into_term()))
                    .collect()
            })
            .collect()
    }
}

impl SparqlTermJson {
    fn into_term(self) -> Term {
        match self.kind.as_str() {
            "uri" => Term::uri(self.value),
            _ => crate::model::Term::Literal { value: self.value, datatype: self.datatype, lang: self.lang },
        }
    }
}

/// Hermetic in-memory triplestore (§10.4): enough SPARQL BGP evaluation to
/// answer the type/chain/VALUES/FILTER/BIND(LANG()) query shapes this crate
/// generates, over an explicit triple set. Not a general SPARQL engine —
/// `GRAPH` blocks and anything beyond those constructs are unsupported.
pub mod testing {
    use super::{Bindings, TriplestoreGateway};
    use crate::auth_groups::AllowedGroups;
    use crate::error::IndexSyncError;
    use crate::model::{Term, RDF_TYPE};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    struct StoredTriple {
        subject: Term,
        predicate: String,
        object: Term,
    }

    #[derive(Default)]
    pub struct InMemoryGateway {
        triples: Mutex<Vec<StoredTriple>>,
    }

    impl InMemoryGateway {
        pub fn new() -> Self {
            InMemoryGateway::default()
        }

        pub fn insert(&self, subject: impl Into<String>, predicate: impl Into<String>, object: Term) {
            self.triples.lock().push(StoredTriple { subject: Term::uri(subject.into()), predicate: predicate.into(), object });
        }

        pub fn remove(&self, subject: &str, predicate: &str, object_value: &str) {
            self.triples
                .lock()
                .retain(|t| !(t.subject.value() == subject && t.predicate == predicate && t.object.value() == object_value));
        }

        fn select(&self, query: &str) -> Vec<Bindings> {
            evaluate(&extract_body(query), &self.triples.lock())
        }
    }

    #[async_trait]
    impl TriplestoreGateway for InMemoryGateway {
        async fn select_scoped(&self, query: &str, _groups: &AllowedGroups) -> Result<Vec<Bindings>, IndexSyncError> {
            Ok(self.select(query))
        }

        async fn ask_scoped(&self, query: &str, _groups: &AllowedGroups) -> Result<bool, IndexSyncError> {
            Ok(!self.select(query).is_empty())
        }

        async fn select_sudo(&self, query: &str) -> Result<Vec<Bindings>, IndexSyncError> {
            Ok(self.select(query))
        }

        async fn update_sudo(&self, _query: &str) -> Result<(), IndexSyncError> {
            Ok(())
        }
    }

    fn extract_body(query: &str) -> String {
        let start = query.find('{').map_or(0, |i| i + 1);
        let end = query.rfind('}').unwrap_or(query.len());
        query[start..end].trim().to_string()
    }

    /// Splits a query body into top-level clauses. A clause ends at a
    /// top-level `.`, or immediately when a `{...}`/`(...)` compound
    /// (VALUES/FILTER/BIND) that was opened at depth 0 closes — since those
    /// aren't necessarily period-terminated before the next triple pattern.
    fn split_clauses(body: &str) -> Vec<String> {
        let mut clauses = Vec::new();
        let mut stack: Vec<char> = Vec::new();
        let mut in_quotes = false;
        let mut current = String::new();

        for c in body.chars() {
            if c == '"' {
                in_quotes = !in_quotes;
                current.push(c);
                continue;
            }
            if in_quotes {
                current.push(c);
                continue;
            }
            match c {
                '<' | '{' | '(' => {
                    stack.push(c);
                    current.push(c);
                }
                '>' | '}' | ')' => {
                    stack.pop();
                    current.push(c);
                    if stack.is_empty() && c != '>' {
                        clauses.push(current.trim().to_string());
                        current.clear();
                    }
                }
                '.' if stack.is_empty() => {
                    clauses.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            }
        }
        if !current.trim().is_empty() {
            clauses.push(current.trim().to_string());
        }
        clauses.into_iter().filter(|c| !c.is_empty()).collect()
    }

    #[derive(Debug, Clone)]
    enum PatternTerm {
        Iri(String),
        Var(String),
        Literal(Term),
    }

    fn parse_term(tok: &str) -> PatternTerm {
        let tok = tok.trim();
        if tok == "a" {
            PatternTerm::Iri(RDF_TYPE.to_string())
        } else if let Some(iri) = tok.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            PatternTerm::Iri(iri.to_string())
        } else if let Some(var) = tok.strip_prefix('?') {
            PatternTerm::Var(var.to_string())
        } else {
            PatternTerm::Literal(parse_literal(tok))
        }
    }

    fn parse_literal(tok: &str) -> Term {
        let rest = tok.strip_prefix('"').unwrap_or(tok);
        let end = rest.rfind('"').unwrap_or(rest.len());
        let value = rest[..end].replace("\\\"", "\"").replace("\\\\", "\\");
        let tail = &rest[end.saturating_add(1).min(rest.len())..];
        if let Some(lang) = tail.strip_prefix('@') {
            Term::Literal { value, datatype: None, lang: Some(lang.to_string()) }
        } else if let Some(dt) = tail.strip_prefix("^^<").and_then(|s| s.strip_suffix('>')) {
            Term::Literal { value, datatype: Some(dt.to_string()), lang: None }
        } else {
            Term::plain_literal(value)
        }
    }

    /// Splits a triple-pattern clause into its three whitespace-separated
    /// terms, keeping quoted literals intact.
    fn tokenize_pattern(pattern: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        for c in pattern.trim().chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(c);
                }
                ' ' if !in_quotes => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    fn evaluate(body: &str, triples: &[StoredTriple]) -> Vec<Bindings> {
        let mut bindings: Vec<Bindings> = vec![Bindings::new()];
        for clause in split_clauses(body) {
            bindings = if clause.starts_with("VALUES") {
                apply_values(&clause, bindings)
            } else if clause.starts_with("FILTER") {
                apply_filter(&clause, bindings)
            } else if clause.starts_with("BIND") {
                apply_bind(&clause, bindings)
            } else {
                apply_triple_pattern(&clause, bindings, triples)
            };
            if bindings.is_empty() {
                break;
            }
        }
        bindings
    }

    fn apply_triple_pattern(clause: &str, bindings: Vec<Bindings>, triples: &[StoredTriple]) -> Vec<Bindings> {
        let tokens = tokenize_pattern(clause);
        if tokens.len() != 3 {
            return Vec::new();
        }
        let subj = parse_term(&tokens[0]);
        let pred = parse_term(&tokens[1]);
        let obj = parse_term(&tokens[2]);

        let mut out = Vec::new();
        for binding in &bindings {
            for triple in triples {
                let Some(b) = try_match(binding, &subj, &triple.subject) else { continue };
                let Some(b) = (match &pred {
                    PatternTerm::Iri(p) if *p == triple.predicate => Some(b),
                    PatternTerm::Var(name) => {
                        let mut b = b;
                        b.insert(name.clone(), Term::uri(triple.predicate.clone()));
                        Some(b)
                    }
                    _ => None,
                }) else {
                    continue;
                };
                let Some(b) = try_match(&b, &obj, &triple.object) else { continue };
                out.push(b);
            }
        }
        out
    }

    fn try_match(binding: &Bindings, pattern: &PatternTerm, actual: &Term) -> Option<Bindings> {
        match pattern {
            PatternTerm::Iri(iri) => (actual.is_uri() && actual.value() == iri).then(|| binding.clone()),
            PatternTerm::Literal(lit) => (!actual.is_uri() && actual.value() == lit.value()).then(|| binding.clone()),
            PatternTerm::Var(name) => match binding.get(name) {
                Some(existing) if existing.value() == actual.value() && existing.is_uri() == actual.is_uri() => {
                    Some(binding.clone())
                }
                Some(_) => None,
                None => {
                    let mut b = binding.clone();
                    b.insert(name.clone(), actual.clone());
                    Some(b)
                }
            },
        }
    }

    fn apply_values(clause: &str, bindings: Vec<Bindings>) -> Vec<Bindings> {
        let Some(open) = clause.find('{') else { return bindings };
        let Some(close) = clause.rfind('}') else { return bindings };
        let header = clause[..open].trim();
        let Some(var) = header.strip_prefix("VALUES").map(str::trim).and_then(|s| s.strip_prefix('?')) else {
            return bindings;
        };
        let items: Vec<PatternTerm> = clause[open + 1..close].split_whitespace().map(parse_term).collect();

        let mut out = Vec::new();
        for binding in bindings {
            if let Some(existing) = binding.get(var) {
                let matches = items.iter().any(|item| match item {
                    PatternTerm::Iri(iri) => existing.is_uri() && existing.value() == iri,
                    PatternTerm::Literal(lit) => !existing.is_uri() && existing.value() == lit.value(),
                    PatternTerm::Var(_) => false,
                });
                if matches {
                    out.push(binding);
                }
            } else {
                for item in &items {
                    let term = match item {
                        PatternTerm::Iri(iri) => Term::uri(iri.clone()),
                        PatternTerm::Literal(lit) => lit.clone(),
                        PatternTerm::Var(_) => continue,
                    };
                    let mut b = binding.clone();
                    b.insert(var.to_string(), term);
                    out.push(b);
                }
            }
        }
        out
    }

    fn apply_filter(clause: &str, bindings: Vec<Bindings>) -> Vec<Bindings> {
        let Some(open) = clause.find('(') else { return bindings };
        let Some(close) = clause.rfind(')') else { return bindings };
        let inner = clause[open + 1..close].trim();
        let Some((var_part, set_part)) = inner.split_once("IN") else { return bindings };
        let Some(var) = var_part.trim().strip_prefix('?') else { return bindings };
        let set_part = set_part.trim().trim_start_matches('(').trim_end_matches(')');
        let allowed: Vec<String> =
            set_part.split_whitespace().filter_map(|t| t.strip_prefix('<').and_then(|s| s.strip_suffix('>'))).map(str::to_string).collect();

        bindings.into_iter().filter(|b| b.get(var).is_some_and(|t| allowed.iter().any(|a| a == t.value()))).collect()
    }

    fn apply_bind(clause: &str, bindings: Vec<Bindings>) -> Vec<Bindings> {
        let Some(open) = clause.find('(') else { return bindings };
        let Some(close) = clause.rfind(')') else { return bindings };
        let inner = &clause[open + 1..close];
        let Some(lang_start) = inner.find("LANG(") else { return bindings };
        let after = &inner[lang_start + "LANG(".len()..];
        let Some(lang_close) = after.find(')') else { return bindings };
        let source_var = after[..lang_close].trim().trim_start_matches('?');
        let tail = &after[lang_close..];
        let Some(as_idx) = tail.find("AS") else { return bindings };
        let target_var = tail[as_idx + 2..].trim().trim_start_matches('?');

        bindings
            .into_iter()
            .map(|mut b| {
                let lang = b.get(source_var).and_then(|t| t.lang()).unwrap_or("").to_string();
                b.insert(target_var.to_string(), Term::plain_literal(lang));
                b
            })
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparql_json_bindings() {
        let json = r#"{
            "results": { "bindings": [
                { "s": { "type": "uri", "value": "http://ex/doc5" },
                  "title": { "type": "literal", "value": "giraffes" } }
            ] }
        }"#;
        let parsed: SparqlResultsJson = serde_json::from_str(json).unwrap();
        let bindings = parsed.into_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].get("s").unwrap().value(), "http://ex/doc5");
        assert_eq!(bindings[0].get("title").unwrap().value(), "giraffes");
    }

    #[test]
    fn parses_sparql_ask_json() {
        let json = r#"{"boolean": true}"#;
        let parsed: SparqlAskJson = serde_json::from_str(json).unwrap();
        assert!(parsed.boolean);
    }
}
