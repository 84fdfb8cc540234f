use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Changes under a watched track folder that matter to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    /// A folder or track file moved from one path to another.
    Renamed { from: PathBuf, to: PathBuf },
    /// A track file was written or created.
    Changed(PathBuf),
    /// A track file or folder went away.
    Removed(PathBuf),
}

/// File system watcher for a folder of track files.
pub struct TrackWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<TrackEvent>,
}

impl TrackWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!("watcher error: {}", e);
                        return;
                    }
                };
                if let Some(track_event) = classify(&event) {
                    let _ = tx.send(track_event);
                }
            },
            Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(TrackWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Non-blocking poll for pending events.
    pub fn poll(&self) -> Vec<TrackEvent> {
        let mut events = Vec::new();
        while let Ok(evt) = self.rx.try_recv() {
            events.push(evt);
        }
        events
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<TrackEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

pub fn is_track_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"))
}

/// Map a raw notify event to a catalog-relevant event.
///
/// Renames are only taken from the paired form (both paths known); the
/// half events some backends also emit are dropped so a move is reported
/// once.
pub fn classify(event: &Event) -> Option<TrackEvent> {
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let [from, to] = event.paths.as_slice() else {
                return None;
            };
            // A folder has no extension; a file must be a track
            if is_track_file(from) || from.extension().is_none() {
                Some(TrackEvent::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                })
            } else {
                None
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .find(|p| is_track_file(p))
            .map(|p| TrackEvent::Changed(p.clone())),
        EventKind::Remove(_) => event
            .paths
            .first()
            .filter(|p| is_track_file(p) || p.extension().is_none())
            .map(|p| TrackEvent::Removed(p.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn paired_folder_rename_is_reported() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/trk/old", "/trk/new"],
        );
        assert_eq!(
            classify(&e),
            Some(TrackEvent::Renamed {
                from: PathBuf::from("/trk/old"),
                to: PathBuf::from("/trk/new"),
            })
        );
    }

    #[test]
    fn half_renames_are_dropped() {
        let from = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/trk/old"],
        );
        let to = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/trk/new"],
        );
        assert_eq!(classify(&from), None);
        assert_eq!(classify(&to), None);
    }

    #[test]
    fn non_track_files_are_ignored() {
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/trk/notes.txt"],
        );
        assert_eq!(classify(&e), None);
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/trk/a.txt", "/trk/b.txt"],
        );
        assert_eq!(classify(&renamed), None);
    }

    #[test]
    fn track_writes_and_removals() {
        let created = event(EventKind::Create(CreateKind::File), &["/trk/a.GPX"]);
        assert_eq!(
            classify(&created),
            Some(TrackEvent::Changed(PathBuf::from("/trk/a.GPX")))
        );
        let removed = event(EventKind::Remove(RemoveKind::File), &["/trk/a.gpx"]);
        assert_eq!(
            classify(&removed),
            Some(TrackEvent::Removed(PathBuf::from("/trk/a.gpx")))
        );
    }
}
