//! Core types for triagewatch: occurrence records, the document tree the host
//! page is observed through, the host page's DOM contract, and field extraction.

pub mod dom;
pub mod extract;
pub mod record;
pub mod schema;

pub use dom::{Document, MutationBatch, NodeId, ReadyState, Selector, SelectorError};
pub use extract::{detail_url, extract, extract_protocol, listing_protocol};
pub use record::{
    OccurrenceRecord, Protocol, RemoteOccurrence, ResponsibleParty, TriageAnnotation,
    UNKNOWN_BLOCK, UNKNOWN_UNIT, UNRESOLVED,
};
