//! Field key metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                MetadataStore                 │
//! │  - get_keys(selector)                        │
//! │  - get_keys_multi(selectors)  (join_all)     │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//!             InMemoryMetadataStore
//! ```
//!
//! Deadlines belong to the caller: drop the `build` future to cancel it.

mod memory;
mod provider;

pub use memory::{InMemoryMetadataStore, KeyEntry};
pub use provider::{MetadataResult, MetadataStore};
