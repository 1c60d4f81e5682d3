//! The data model: RDF terms, triples, property paths, and type definitions
//! (§3, §4.1 of the index-sync configuration and wire format).

pub mod literal;
pub mod property_path;
pub mod triple;
pub mod type_definition;

pub use literal::{Literal, Term};
pub use property_path::{PropertyPath, PropertyStep};
pub use triple::{dedup_triples, Changeset, DeltaMessage, Triple, RDF_TYPE};
pub use type_definition::{flatten_paths, PropertyDefinition, TypeCatalog, TypeDefinition};
