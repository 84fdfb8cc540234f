use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use crate::analysis::{AnalysisError, AnalysisProvider};
use crate::io::catalog_io::{self, CatalogIoError};
use crate::io::lock::LockError;
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery, recovery_log_path};
use crate::model::analysis::TrackAnalysis;
use crate::model::bounds::Bounds;
use crate::model::config::CatalogConfig;
use crate::model::track::{TrackRecord, TrackStyle, file_name_of, normalize_path};

use super::index::CatalogIndex;

/// Error type for catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error("track already in catalog: {0}")]
    DuplicateKey(String),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Persist(#[from] CatalogIoError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("analysis of {0} panicked")]
    AnalysisPanicked(String),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Called once when a background reload finishes.
pub type ReloadCallback = Box<dyn FnOnce(&Result<(), CatalogError>) + Send + 'static>;

struct CatalogState {
    index: CatalogIndex,
    /// Mutations not yet written (only with autosave off, or after a failed write)
    dirty: bool,
}

/// The track catalog: every imported track record, indexed by file path and
/// by file name, persisted to one JSON file.
///
/// Construct one per process and share it as `Arc<TrackCatalog>`. Call
/// [`load`](Self::load) before anything else. Lookups return snapshots;
/// a snapshot does not follow later mutations.
pub struct TrackCatalog {
    path: PathBuf,
    config: CatalogConfig,
    provider: Arc<dyn AnalysisProvider>,
    state: RwLock<CatalogState>,
    /// File paths with a reload in flight, and who is waiting on each
    reloads: Mutex<HashMap<String, Vec<ReloadCallback>>>,
}

impl TrackCatalog {
    /// An empty catalog bound to `path`. Nothing is read until `load`.
    pub fn new(
        path: impl Into<PathBuf>,
        config: CatalogConfig,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Self {
        TrackCatalog {
            path: path.into(),
            config,
            provider,
            state: RwLock::new(CatalogState {
                index: CatalogIndex::default(),
                dirty: false,
            }),
            reloads: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Replace the in-memory catalog with the stored one.
    ///
    /// Never fails: a missing file gives an empty catalog, and an unreadable
    /// one is copied to `<name>.bak`, noted in the recovery log, and
    /// replaced by an empty catalog.
    pub fn load(&self) {
        let records = match catalog_io::read_catalog(&self.path) {
            Ok(records) => records,
            Err(CatalogIoError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::debug!("no catalog at {}, starting empty", self.path.display());
                Vec::new()
            }
            Err(e @ CatalogIoError::Parse { .. }) => {
                self.quarantine(&e);
                Vec::new()
            }
            Err(e) => {
                log::warn!("could not load catalog, starting empty: {}", e);
                Vec::new()
            }
        };

        let records = records
            .into_iter()
            .map(|mut r| {
                let normalized = normalize_path(&r.file_path);
                if normalized != r.file_path || r.file_name.is_empty() {
                    r.set_file_path(normalized);
                }
                r
            })
            .collect();
        let (index, dropped) = CatalogIndex::from_records(records);
        for rec in &dropped {
            log::warn!("dropping duplicate catalog entry for {}", rec.file_path);
        }
        log::info!(
            "loaded {} tracks from {}",
            index.len(),
            self.path.display()
        );

        let mut state = self.write();
        state.index = index;
        state.dirty = !dropped.is_empty();
    }

    fn quarantine(&self, err: &CatalogIoError) {
        let mut bak = self.path.clone().into_os_string();
        bak.push(".bak");
        let bak = PathBuf::from(bak);
        let copied = fs::copy(&self.path, &bak).is_ok();
        log::warn!(
            "could not parse {} (backed up as {}): {}",
            self.path.display(),
            bak.display(),
            err
        );
        let mut entry = RecoveryEntry::new(RecoveryCategory::Corrupt, "catalog could not be parsed")
            .field("Source", self.path.display().to_string())
            .field("Error", err.to_string());
        if copied {
            entry = entry.field("Backup", bak.display().to_string());
        }
        log_recovery(&recovery_log_path(&self.path), entry);
    }

    /// Write the whole catalog, atomically replacing the previous file.
    ///
    /// On failure the in-memory catalog is kept as is and stays dirty; the
    /// payload that could not be written goes to the recovery log.
    pub fn save(&self) -> Result<(), CatalogError> {
        let mut state = self.write();
        self.write_state(&mut state)
    }

    /// True when there are mutations that have not reached disk.
    pub fn is_dirty(&self) -> bool {
        self.read().dirty
    }

    fn write_state(&self, state: &mut CatalogState) -> Result<(), CatalogError> {
        let content = catalog_io::serialize_catalog(state.index.records())?;
        if let Err(e) = catalog_io::write_catalog_content(&self.path, &content) {
            log::error!("catalog save failed: {}", e);
            log_recovery(
                &recovery_log_path(&self.path),
                RecoveryEntry::new(RecoveryCategory::Write, "catalog write failed")
                    .field("Target", self.path.display().to_string())
                    .field("Error", e.to_string())
                    .field("Tracks", state.index.len().to_string())
                    .body(content),
            );
            state.dirty = true;
            return Err(e.into());
        }
        state.dirty = false;
        Ok(())
    }

    /// Persist after a mutation, or just mark dirty when autosave is off.
    fn commit(&self, state: &mut CatalogState) -> Result<(), CatalogError> {
        if self.config.catalog.autosave {
            self.write_state(state)
        } else {
            state.dirty = true;
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Building and adding
    // -----------------------------------------------------------------------

    /// Build a record without touching the catalog. Statistics come from
    /// `analysis` when given and stay zeroed otherwise.
    pub fn build_track_item(
        &self,
        file_path: &str,
        title: &str,
        description: &str,
        bounds: Bounds,
        analysis: Option<TrackAnalysis>,
    ) -> TrackRecord {
        let mut record = TrackRecord::new(&normalize_path(file_path));
        record.title = title.to_string();
        record.description = description.to_string();
        if bounds.is_finite() {
            record.bounds = bounds;
        }
        record.style = self.config.style.to_style();
        if let Some(analysis) = analysis {
            record.apply_analysis(analysis);
        }
        record
    }

    /// Build a record and add it. Fails with `DuplicateKey` when the path is
    /// already cataloged; the existing record is left alone.
    pub fn add_track_item(
        &self,
        file_path: &str,
        title: &str,
        description: &str,
        bounds: Bounds,
        analysis: Option<TrackAnalysis>,
    ) -> Result<TrackRecord, CatalogError> {
        let file_path = normalize_path(file_path);
        let record = self.build_track_item(&file_path, title, description, bounds, analysis);
        let mut state = self.write();
        if state.index.contains(&file_path) {
            return Err(CatalogError::DuplicateKey(file_path));
        }
        state.index.push(record.clone());
        log::debug!("added {}", file_path);
        self.commit(&mut state)?;
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn get_item(&self, file_path: &str) -> Option<TrackRecord> {
        self.read().index.get(file_path).cloned()
    }

    /// First record, in catalog order, whose file name matches.
    pub fn get_item_by_file_name(&self, file_name: &str) -> Option<TrackRecord> {
        self.read().index.get_by_file_name(file_name).cloned()
    }

    pub fn contains_item(&self, file_path: &str) -> bool {
        self.read().index.contains(file_path)
    }

    pub fn contains_item_by_file_name(&self, file_name: &str) -> bool {
        self.read().index.contains_file_name(file_name)
    }

    /// All records in catalog order.
    pub fn items(&self) -> Vec<TrackRecord> {
        self.read().index.records().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Replace the record stored under `record.file_path`, keeping its
    /// position in the catalog.
    pub fn replace_item(&self, mut record: TrackRecord) -> Result<(), CatalogError> {
        let mut state = self.write();
        let Some(slot) = state.index.get_mut(&record.file_path) else {
            return Err(CatalogError::NotFound(record.file_path));
        };
        record.file_name = file_name_of(&record.file_path);
        record.analysis.clear_non_finite();
        if !record.bounds.is_finite() {
            record.bounds = Bounds::empty();
        }
        *slot = record;
        self.commit(&mut state)
    }

    /// Remove a record, optionally deleting its file too. Returns whether a
    /// record was removed; removing an unknown path changes nothing.
    pub fn remove_item(&self, file_path: &str, delete_file: bool) -> Result<bool, CatalogError> {
        let removed = {
            let mut state = self.write();
            let Some(removed) = state.index.remove(file_path) else {
                return Ok(false);
            };
            self.commit(&mut state)?;
            removed
        };

        let body = serde_json::to_string_pretty(&removed).unwrap_or_default();
        log_recovery(
            &recovery_log_path(&self.path),
            RecoveryEntry::new(RecoveryCategory::Delete, "track removed from catalog")
                .field("Path", file_path)
                .field("File deleted", delete_file.to_string())
                .body(body),
        );

        if delete_file {
            match fs::remove_file(file_path) {
                Ok(()) => log::info!("deleted {}", file_path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CatalogError::Io {
                        path: PathBuf::from(file_path),
                        source: e,
                    });
                }
            }
        }
        Ok(true)
    }

    /// Apply `f` to one record. Returns false when the path is unknown.
    /// `f` reports whether it changed anything; unchanged records are not
    /// written again.
    fn update_with(
        &self,
        file_path: &str,
        f: impl FnOnce(&mut TrackRecord) -> bool,
    ) -> Result<bool, CatalogError> {
        let mut state = self.write();
        let Some(record) = state.index.get_mut(file_path) else {
            return Ok(false);
        };
        if f(record) {
            self.commit(&mut state)?;
        }
        Ok(true)
    }

    pub fn update_points_count(&self, file_path: &str, count: u32) -> Result<bool, CatalogError> {
        self.update_with(file_path, |r| {
            let changed = r.analysis.points != count;
            r.analysis.points = count;
            changed
        })
    }

    /// Set the color of the record `record` was taken from.
    pub fn update_color(&self, record: &TrackRecord, color: u32) -> Result<bool, CatalogError> {
        self.update_with(&record.file_path, |r| {
            let changed = r.style.color != color;
            r.style.color = color;
            changed
        })
    }

    pub fn update_style(&self, file_path: &str, style: TrackStyle) -> Result<bool, CatalogError> {
        self.update_with(file_path, |r| {
            let changed = r.style != style;
            r.style = style;
            changed
        })
    }

    pub fn add_hidden_group(&self, file_path: &str, group: &str) -> Result<bool, CatalogError> {
        self.update_with(file_path, |r| r.add_hidden_group(group))
    }

    pub fn remove_hidden_group(&self, file_path: &str, group: &str) -> Result<bool, CatalogError> {
        self.update_with(file_path, |r| r.remove_hidden_group(group))
    }

    /// Clear the newly-imported flag.
    pub fn mark_seen(&self, file_path: &str) -> Result<bool, CatalogError> {
        self.update_with(file_path, |r| std::mem::replace(&mut r.is_new, false))
    }

    /// Re-key every record under `old_path` to the same place under
    /// `new_path`, after a folder (or single file) moved on disk.
    ///
    /// Returns false when no record lives under `old_path`. The move is all
    /// or nothing: if a rewritten path would land on a record that is not
    /// itself moving, or two moved records would land on one path, nothing
    /// changes and `DuplicateKey` is returned.
    pub fn update_folder_name(&self, new_path: &str, old_path: &str) -> Result<bool, CatalogError> {
        let old = PathBuf::from(normalize_path(old_path));
        let new = PathBuf::from(normalize_path(new_path));
        let mut state = self.write();

        let moves: HashMap<String, String> = state
            .index
            .records()
            .filter_map(|r| {
                let rest = Path::new(&r.file_path).strip_prefix(&old).ok()?;
                let target = if rest.as_os_str().is_empty() {
                    new.clone()
                } else {
                    new.join(rest)
                };
                let target = target.to_string_lossy().into_owned();
                (target != r.file_path).then(|| (r.file_path.clone(), target))
            })
            .collect();
        if moves.is_empty() {
            return Ok(false);
        }

        let mut targets = HashSet::new();
        for target in moves.values() {
            let hits_resident = state.index.contains(target) && !moves.contains_key(target);
            if hits_resident || !targets.insert(target.as_str()) {
                return Err(CatalogError::DuplicateKey(target.clone()));
            }
        }

        for (from, to) in &moves {
            log::debug!("re-keying {} -> {}", from, to);
        }
        state.index.rekey(&moves);
        log::info!(
            "moved {} tracks from {} to {}",
            moves.len(),
            old.display(),
            new.display()
        );
        self.commit(&mut state)?;
        Ok(true)
    }

    /// Folder of a track: relative to the configured tracks root when the
    /// file lives under it (empty for files directly in the root),
    /// otherwise the absolute parent directory.
    pub fn get_file_dir(&self, file_path: &str) -> String {
        let parent = Path::new(file_path).parent().unwrap_or(Path::new(""));
        if let Some(root) = &self.config.catalog.tracks_root
            && let Ok(rel) = parent.strip_prefix(root)
        {
            return rel.to_string_lossy().into_owned();
        }
        parent.to_string_lossy().into_owned()
    }

    // -----------------------------------------------------------------------
    // Analysis refresh
    // -----------------------------------------------------------------------

    /// Recompute statistics for one track now, on the calling thread.
    ///
    /// The provider runs without holding the catalog lock; the lock is only
    /// taken to store the result.
    pub fn refresh_analysis(&self, file_path: &str) -> Result<(), CatalogError> {
        if !self.contains_item(file_path) {
            return Err(CatalogError::NotFound(file_path.to_string()));
        }
        let analysis = self.provider.compute(Path::new(file_path))?;

        let mut state = self.write();
        // The record may have been removed or moved while we were computing
        let Some(record) = state.index.get_mut(file_path) else {
            return Err(CatalogError::NotFound(file_path.to_string()));
        };
        record.apply_analysis(analysis);
        self.commit(&mut state)
    }

    /// Recompute statistics for one track on a background thread and call
    /// `on_complete` once with the outcome, after the record is updated and
    /// persisted.
    ///
    /// If a reload for the same path is already running, no second one is
    /// started: `on_complete` is queued and receives that reload's outcome.
    pub fn reload_file<F>(self: &Arc<Self>, file_path: &str, on_complete: F)
    where
        F: FnOnce(&Result<(), CatalogError>) + Send + 'static,
    {
        {
            let mut reloads = self.reloads.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(waiters) = reloads.get_mut(file_path) {
                log::debug!("reload of {} already running, waiting on it", file_path);
                waiters.push(Box::new(on_complete));
                return;
            }
            reloads.insert(file_path.to_string(), vec![Box::new(on_complete)]);
        }

        let catalog = Arc::clone(self);
        let path = file_path.to_string();
        let spawned = thread::Builder::new()
            .name("gpxdb-reload".into())
            .spawn(move || {
                log::debug!("reloading {}", path);
                // A panicking provider must still release the waiters
                let result = panic::catch_unwind(AssertUnwindSafe(|| catalog.refresh_analysis(&path)))
                    .unwrap_or_else(|_| Err(CatalogError::AnalysisPanicked(path.clone())));
                if let Err(e) = &result {
                    log::warn!("reload of {} failed: {}", path, e);
                }
                catalog.finish_reload(&path, &result);
            });

        if let Err(e) = spawned {
            let result = Err(CatalogError::Io {
                path: PathBuf::from(file_path),
                source: e,
            });
            self.finish_reload(file_path, &result);
        }
    }

    fn finish_reload(&self, file_path: &str, result: &Result<(), CatalogError>) {
        let waiters = self
            .reloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file_path)
            .unwrap_or_default();
        for callback in waiters {
            callback(result);
        }
    }

    /// True while a background reload for `file_path` is running.
    pub fn is_reloading(&self, file_path: &str) -> bool {
        self.reloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(file_path)
    }
}
