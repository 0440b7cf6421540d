//! # Repository Layer
//!
//! Repositories encapsulate SeaORM operations for the authoritative store.
//! Every method takes a generic [`sea_orm::ConnectionTrait`] executor so the
//! same code runs against the pool or inside a candidate's transaction.

pub mod candidate;
pub mod event;
pub mod fingerprint;
pub mod reference;
pub mod source;

pub use candidate::CandidateRepository;
pub use event::{EventRepository, ProjectionRow};
pub use fingerprint::FingerprintRepository;
pub use reference::ReferenceRepository;
pub use source::SourceRepository;
