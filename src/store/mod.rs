//! The track catalog and its reconciliation with the file system.

mod catalog;
mod index;
mod reconcile;

pub use catalog::{CatalogError, ReloadCallback, TrackCatalog};
pub use reconcile::{Reconciled, apply_event, apply_event_locked};
