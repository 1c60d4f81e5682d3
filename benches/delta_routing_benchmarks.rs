//! Delta Router throughput across rdf:type-only and property-path deltas.

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use indexsync::auth_groups::AllowedGroups;
use indexsync::delta_router::route_delta;
use indexsync::error::IndexSyncError;
use indexsync::gateway::{Bindings, TriplestoreGateway};
use indexsync::model::{
    Changeset, DeltaMessage, PropertyDefinition, PropertyPath, PropertyStep, Term, TypeCatalog, TypeDefinition,
    Triple, RDF_TYPE,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Runtime;

struct EmptyGateway;

#[async_trait]
impl TriplestoreGateway for EmptyGateway {
    async fn select_scoped(&self, _query: &str, _groups: &AllowedGroups) -> Result<Vec<Bindings>, IndexSyncError> {
        Ok(vec![])
    }
    async fn ask_scoped(&self, _query: &str, _groups: &AllowedGroups) -> Result<bool, IndexSyncError> {
        Ok(false)
    }
    async fn select_sudo(&self, _query: &str) -> Result<Vec<Bindings>, IndexSyncError> {
        Ok(vec![])
    }
    async fn update_sudo(&self, _query: &str) -> Result<(), IndexSyncError> {
        Ok(())
    }
}

fn document_catalog() -> TypeCatalog {
    let mut props = HashMap::new();
    props.insert(
        "title".to_string(),
        PropertyDefinition::Simple { path: PropertyPath::new(vec![PropertyStep::forward("http://purl.org/dc/terms/title")]) },
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

fn rdf_type_delta(n: u64) -> DeltaMessage {
    let inserts = (0..n)
        .map(|i| Triple::new(Term::uri(format!("http://ex/doc{i}")), Term::uri(RDF_TYPE), Term::uri("http://ex/Document")))
        .collect();
    DeltaMessage { changesets: vec![Changeset { inserts, deletes: vec![] }] }
}

fn property_delta(n: u64) -> DeltaMessage {
    let inserts = (0..n)
        .map(|i| {
            Triple::new(
                Term::uri(format!("http://ex/doc{i}")),
                Term::uri("http://purl.org/dc/terms/title"),
                Term::plain_literal(format!("title {i}")),
            )
        })
        .collect();
    DeltaMessage { changesets: vec![Changeset { inserts, deletes: vec![] }] }
}

fn bench_rdf_type_inserts(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let catalog = document_catalog();
    let gateway = EmptyGateway;

    let mut group = c.benchmark_group("route_delta_rdf_type");
    for size in [10u64, 100, 1_000] {
        let delta = rdf_type_delta(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &delta, |b, delta| {
            b.iter(|| rt.block_on(route_delta(delta, &catalog, &gateway)));
        });
    }
    group.finish();
}

fn bench_property_path_inserts(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let catalog = document_catalog();
    let gateway = EmptyGateway;

    let mut group = c.benchmark_group("route_delta_property_path");
    for size in [10u64, 100, 1_000] {
        let delta = property_delta(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &delta, |b, delta| {
            b.iter(|| rt.block_on(route_delta(delta, &catalog, &gateway)));
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_rdf_type_inserts, bench_property_path_inserts
}
criterion_main!(benches);
