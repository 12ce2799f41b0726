//! Pattern-triggered context injection for assistant sessions.
//!
//! Snippet entries pair an uppercase trigger regex with referenced content
//! files. On every user turn the injector tests each enabled trigger against
//! the input and concatenates the matching snippets into one payload for the
//! host process. A CRUD service manages entries across a base and a local
//! config layer, with validation and pre-mutation backups.

pub mod backup;
pub mod error;
pub mod inject;
pub mod paths;
pub mod service;
pub mod store;
pub mod types;
pub mod validate;

pub use {
    error::{Error, Result},
    inject::{InjectionBlock, InjectionResult, inject},
    service::SnippetService,
    store::ConfigStore,
    types::{Layer, Registry, SnippetEntry},
};
