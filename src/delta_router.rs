//! Delta Router (§4.5): maps each triple of an incoming delta message to the
//! set of affected (index-config, root-subject) pairs.

use crate::auth_groups::AllowedGroups;
use crate::gateway::TriplestoreGateway;
use crate::model::{dedup_triples, Changeset, DeltaMessage, PropertyPath, Term, Triple, TypeCatalog, RDF_TYPE};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOp {
    Update,
    Delete,
}

/// `(subject_iri, type_name, op)` (§3 "Update Job"), emitted by the router
/// for the Update Handler's coalescing queue to collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateJob {
    pub subject_iri: String,
    pub type_name: String,
    pub op: JobOp,
}

/// Parses a delta message and resolves every triple to the Update Jobs it
/// implies. A triple whose root-subject resolution query fails is logged and
/// skipped rather than aborting the whole message (§7 "no error... aborts").
pub async fn route_delta(
    delta: &DeltaMessage,
    catalog: &TypeCatalog,
    gateway: &dyn TriplestoreGateway,
) -> Vec<UpdateJob> {
    let mut jobs = Vec::new();
    for changeset in &delta.changesets {
        route_changeset(changeset, catalog, gateway, &mut jobs).await;
    }
    jobs
}

async fn route_changeset(
    changeset: &Changeset,
    catalog: &TypeCatalog,
    gateway: &dyn TriplestoreGateway,
    jobs: &mut Vec<UpdateJob>,
) {
    for triple in dedup_triples(changeset.inserts.clone()) {
        route_triple(&triple, true, catalog, gateway, jobs).await;
    }
    for triple in dedup_triples(changeset.deletes.clone()) {
        route_triple(&triple, false, catalog, gateway, jobs).await;
    }
}

async fn route_triple(
    triple: &Triple,
    is_insert: bool,
    catalog: &TypeCatalog,
    gateway: &dyn TriplestoreGateway,
    jobs: &mut Vec<UpdateJob>,
) {
    let predicate = triple.predicate.value();

    if predicate == RDF_TYPE {
        let object_type = triple.object.value();
        for type_name in catalog.type_names_for_rdf_type(object_type) {
            if is_insert {
                jobs.push(UpdateJob { subject_iri: triple.subject.value().to_string(), type_name, op: JobOp::Update });
            } else {
                jobs.push(UpdateJob { subject_iri: triple.subject.value().to_string(), type_name, op: JobOp::Delete });
            }
        }
        return;
    }

    for type_name in catalog.type_names_for_property(predicate) {
        let paths = catalog.paths_containing(&type_name, predicate);
        for path in paths {
            for position in path.positions_of(predicate) {
                resolve_root_subjects(
                    triple,
                    is_insert,
                    &type_name,
                    &catalog.related_rdf_types(&type_name),
                    &path,
                    position,
                    gateway,
                    jobs,
                )
                .await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn resolve_root_subjects(
    triple: &Triple,
    is_insert: bool,
    type_name: &str,
    rdf_types: &[String],
    path: &PropertyPath,
    position: usize,
    gateway: &dyn TriplestoreGateway,
    jobs: &mut Vec<UpdateJob>,
) {
    let step = &path.steps()[position];
    let is_tail = position + 1 == path.len();

    // A continuation through a forward step must traverse an IRI (§4.5).
    if !is_tail && !step.inverse && !triple.object.is_uri() {
        return;
    }

    let (anchor_subject, anchor_object) = if step.inverse {
        (triple.object.clone(), triple.subject.clone())
    } else {
        (triple.subject.clone(), triple.object.clone())
    };

    let prefix = path.prefix(position);
    let suffix = path.suffix(position);

    let type_filter = rdf_types.iter().map(|t| format!("<{t}>")).collect::<Vec<_>>().join(" ");
    let mut clauses = vec![format!("?s a ?type . FILTER(?type IN ({type_filter})) .")];

    let anchor_subject_term = anchor_subject.to_sparql_term();
    if prefix.is_empty() {
        clauses.push(format!("VALUES ?s {{ {anchor_subject_term} }}"));
    } else {
        clauses.push(prefix.to_sparql_chain("?s", &anchor_subject_term));
    }

    if is_insert {
        clauses.push(format!(
            "{} {} {} .",
            triple.subject.to_sparql_term(),
            triple.predicate.to_sparql_term(),
            triple.object.to_sparql_term()
        ));
        if !suffix.is_empty() {
            clauses.push(suffix.to_sparql_chain(&anchor_object.to_sparql_term(), "?foo"));
        }
    }

    let query = format!("SELECT DISTINCT ?s WHERE {{ {} }}", clauses.join(" "));
    match gateway.select_sudo(&query).await {
        Ok(rows) => {
            for row in rows {
                if let Some(subject) = row.get("s") {
                    jobs.push(UpdateJob {
                        subject_iri: subject.value().to_string(),
                        type_name: type_name.to_string(),
                        op: JobOp::Update,
                    });
                }
            }
        }
        Err(e) => {
            warn!(error = %e, type_name, "root-subject resolution query failed, skipping triple");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyDefinition, PropertyStep, TypeDefinition};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct RecordingGateway {
        queries: Mutex<Vec<String>>,
        response: Vec<crate::gateway::Bindings>,
    }

    #[async_trait]
    impl TriplestoreGateway for RecordingGateway {
        async fn select_scoped(
            &self,
            _query: &str,
            _groups: &AllowedGroups,
        ) -> Result<Vec<crate::gateway::Bindings>, crate::error::IndexSyncError> {
            Ok(self.response.clone())
        }
        async fn ask_scoped(&self, _query: &str, _groups: &AllowedGroups) -> Result<bool, crate::error::IndexSyncError> {
            Ok(false)
        }
        async fn select_sudo(&self, query: &str) -> Result<Vec<crate::gateway::Bindings>, crate::error::IndexSyncError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.response.clone())
        }
        async fn update_sudo(&self, _query: &str) -> Result<(), crate::error::IndexSyncError> {
            Ok(())
        }
    }

    fn document_catalog() -> TypeCatalog {
        let mut props = HashMap::new();
        props.insert(
            "title".to_string(),
            PropertyDefinition::Simple {
                path: PropertyPath::new(vec![PropertyStep::forward("http://purl.org/dc/terms/title")]),
            },
        );
        let mut defs = HashMap::new();
        defs.insert(
            "document".to_string(),
            TypeDefinition {
                type_name: "document".to_string(),
                rdf_types: vec!["http://ex/Document".to_string()],
                properties: props,
                composite_types: None,
                mappings: None,
                settings: None,
            },
        );
        TypeCatalog::new(defs)
    }

    #[tokio::test]
    async fn rdf_type_insert_emits_update_job_for_subject() {
        let catalog = document_catalog();
        let gateway = RecordingGateway { queries: Mutex::new(vec![]), response: vec![] };
        let delta = DeltaMessage {
            changesets: vec![Changeset {
                inserts: vec![Triple::new(Term::uri("http://ex/doc5"), Term::uri(RDF_TYPE), Term::uri("http://ex/Document"))],
                deletes: vec![],
            }],
        };
        let jobs = route_delta(&delta, &catalog, &gateway).await;
        assert_eq!(jobs, vec![UpdateJob { subject_iri: "http://ex/doc5".into(), type_name: "document".into(), op: JobOp::Update }]);
        assert!(gateway.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rdf_type_delete_emits_exactly_one_delete_job_no_query() {
        let catalog = document_catalog();
        let gateway = RecordingGateway { queries: Mutex::new(vec![]), response: vec![] };
        let delta = DeltaMessage {
            changesets: vec![Changeset {
                inserts: vec![],
                deletes: vec![Triple::new(Term::uri("http://ex/doc5"), Term::uri(RDF_TYPE), Term::uri("http://ex/Document"))],
            }],
        };
        let jobs = route_delta(&delta, &catalog, &gateway).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].op, JobOp::Delete);
        assert!(gateway.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn property_triple_runs_root_subject_query() {
        let catalog = document_catalog();
        let mut row = crate::gateway::Bindings::new();
        row.insert("s".to_string(), Term::uri("http://ex/doc5"));
        let gateway = RecordingGateway { queries: Mutex::new(vec![]), response: vec![row] };
        let delta = DeltaMessage {
            changesets: vec![Changeset {
                inserts: vec![Triple::new(
                    Term::uri("http://ex/doc5"),
                    Term::uri("http://purl.org/dc/terms/title"),
                    Term::plain_literal("giraffes"),
                )],
                deletes: vec![],
            }],
        };
        let jobs = route_delta(&delta, &catalog, &gateway).await;
        assert_eq!(jobs, vec![UpdateJob { subject_iri: "http://ex/doc5".into(), type_name: "document".into(), op: JobOp::Update }]);
        assert_eq!(gateway.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inverse_path_insert_triggers_reindex_of_parent() {
        let mut props = HashMap::new();
        props.insert(
            "title".to_string(),
            PropertyDefinition::Simple {
                path: PropertyPath::new(vec![
                    PropertyStep::inverse("http://ex/hasPart"),
                    PropertyStep::forward("http://purl.org/dc/terms/title"),
                ]),
            },
        );
        let mut defs = HashMap::new();
        defs.insert(
            "document".to_string(),
            TypeDefinition {
                type_name: "document".to_string(),
                rdf_types: vec!["http://ex/Document".to_string()],
                properties: props,
                composite_types: None,
                mappings: None,
                settings: None,
            },
        );
        let catalog = TypeCatalog::new(defs);
        let mut row = crate::gateway::Bindings::new();
        row.insert("s".to_string(), Term::uri("http://ex/parent"));
        let gateway = RecordingGateway { queries: Mutex::new(vec![]), response: vec![row] };
        let delta = DeltaMessage {
            changesets: vec![Changeset {
                inserts: vec![Triple::new(Term::uri("http://ex/child"), Term::uri("http://ex/hasPart"), Term::uri("http://ex/parent"))],
                deletes: vec![],
            }],
        };
        let jobs = route_delta(&delta, &catalog, &gateway).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].subject_iri, "http://ex/parent");
    }

    #[tokio::test]
    async fn literal_object_at_non_tail_forward_step_is_discarded() {
        let mut props = HashMap::new();
        props.insert(
            "name".to_string(),
            PropertyDefinition::Simple {
                path: PropertyPath::new(vec![
                    PropertyStep::forward("http://ex/author"),
                    PropertyStep::forward("http://ex/name"),
                ]),
            },
        );
        let mut defs = HashMap::new();
        defs.insert(
            "document".to_string(),
            TypeDefinition {
                type_name: "document".to_string(),
                rdf_types: vec!["http://ex/Document".to_string()],
                properties: props,
                composite_types: None,
                mappings: None,
                settings: None,
            },
        );
        let catalog = TypeCatalog::new(defs);
        let gateway = RecordingGateway { queries: Mutex::new(vec![]), response: vec![] };
        // `author` is a non-tail forward step; a literal object here is inconsistent.
        let delta = DeltaMessage {
            changesets: vec![Changeset {
                inserts: vec![Triple::new(Term::uri("http://ex/doc5"), Term::uri("http://ex/author"), Term::plain_literal("not an iri"))],
                deletes: vec![],
            }],
        };
        let jobs = route_delta(&delta, &catalog, &gateway).await;
        assert!(jobs.is_empty());
        assert!(gateway.queries.lock().unwrap().is_empty());
    }
}
