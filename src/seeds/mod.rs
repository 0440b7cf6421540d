//! Database seeding functionality.
//!
//! Seeds the fixed administrative reference data (regions and cities with
//! their recognized name variants) on first start.

pub mod reference;

pub use reference::seed_reference_data;
