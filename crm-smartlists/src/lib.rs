//! Smart lists: saved filters over CRM entities
//!
//! A smart list is a named filter over one entity type with a cached match
//! count. Counts are refreshed only when a caller asks, by scanning the full
//! entity collection through [`EntitySource`] and evaluating the filter with
//! `crm-filters`. Custom field rows resolve through `crm-fields` when the
//! service is given a [`ValueService`](crm_fields::ValueService).

pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use error::{Result, SmartListError};
pub use service::SmartListService;
pub use store::{
    EntitySnapshot, EntitySource, MemoryEntitySource, MemorySmartListStore, SmartListStore,
};
pub use types::{NewSmartList, RefreshOutcome, SmartList, SmartListId, SmartListPatch};
