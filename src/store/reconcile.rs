use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::io::lock::CatalogLock;
use crate::io::watcher::{TrackEvent, is_track_file};

use super::catalog::{CatalogError, TrackCatalog};

/// What the catalog did in response to a file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Records were re-keyed to a new location
    Moved,
    /// A background reload was started for a cataloged track
    Reloading,
    /// Statistics of a cataloged track were recomputed in place
    Refreshed,
    /// Nothing in the catalog was affected
    Ignored,
}

/// Bring the catalog in line with a change on disk.
///
/// Moves re-key records; writes to cataloged tracks start a background
/// reload. Removed files keep their records: the user decides whether a
/// track that went missing should leave the catalog.
pub fn apply_event(
    catalog: &Arc<TrackCatalog>,
    event: &TrackEvent,
) -> Result<Reconciled, CatalogError> {
    match event {
        TrackEvent::Renamed { from, to } => {
            let from = from.to_string_lossy();
            let to = to.to_string_lossy();
            if catalog.update_folder_name(&to, &from)? {
                Ok(Reconciled::Moved)
            } else {
                Ok(Reconciled::Ignored)
            }
        }
        TrackEvent::Changed(file) => {
            let path = file.to_string_lossy();
            if !is_cataloged_track(catalog, file) {
                return Ok(Reconciled::Ignored);
            }
            let shown = path.to_string();
            catalog.reload_file(&path, move |result| match result {
                Ok(()) => log::info!("refreshed statistics for {}", shown),
                Err(e) => log::warn!("could not refresh {}: {}", shown, e),
            });
            Ok(Reconciled::Reloading)
        }
        TrackEvent::Removed(path) => {
            let path = path.to_string_lossy();
            if catalog.contains_item(&path) {
                log::warn!("track file {} was removed; its record is kept", path);
            }
            Ok(Reconciled::Ignored)
        }
    }
}

/// Apply an event while holding the cross-process catalog lock.
///
/// The catalog is reloaded from disk first, so changes other gpxdb
/// processes made since the last event are kept, and every write
/// (including the statistics refresh, which runs on this thread) happens
/// before the lock is released. Unsaved in-memory changes are discarded
/// by the reload.
pub fn apply_event_locked(
    catalog: &Arc<TrackCatalog>,
    event: &TrackEvent,
    timeout: Duration,
) -> Result<Reconciled, CatalogError> {
    let _lock = CatalogLock::acquire(catalog.path(), timeout)?;
    catalog.load();

    let outcome = match event {
        TrackEvent::Changed(file) if is_cataloged_track(catalog, file) => {
            catalog.refresh_analysis(&file.to_string_lossy())?;
            Reconciled::Refreshed
        }
        TrackEvent::Changed(_) => Reconciled::Ignored,
        _ => apply_event(catalog, event)?,
    };
    if catalog.is_dirty() {
        catalog.save()?;
    }
    Ok(outcome)
}

fn is_cataloged_track(catalog: &TrackCatalog, file: &Path) -> bool {
    is_track_file(file) && catalog.contains_item(&file.to_string_lossy())
}
