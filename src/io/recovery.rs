use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;

use super::lock::try_lock;

/// Logs past this size are trimmed before the next append.
const MAX_LOG_SIZE: u64 = 1_048_576;

/// Default age cutoff for `prune_recovery`
pub const PRUNE_AGE_DAYS: i64 = 30;

const PRUNE_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Header written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- gpxdb recovery log: append-only
     Catalog data that could not be saved normally ends up here:
     failed catalog writes, unreadable catalog files, removed tracks.
     View with: gpxdb recovery
     Safe to delete once you no longer need it. -->

---
";

/// Line closing every entry
const ENTRY_SEPARATOR: &str = "---";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Category of a recovery entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// The catalog file could not be parsed and was set aside
    Corrupt,
    /// Writing the catalog failed
    Write,
    /// A track record was removed
    Delete,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Corrupt => write!(f, "corrupt"),
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Delete => write!(f, "delete"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "corrupt" => Some(RecoveryCategory::Corrupt),
            "write" => Some(RecoveryCategory::Write),
            "delete" => Some(RecoveryCategory::Delete),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

/// Recovery log path for a catalog file: `recovery.log` beside it.
pub fn recovery_log_path(catalog_path: &Path) -> PathBuf {
    catalog_path
        .parent()
        .unwrap_or(Path::new("."))
        .join("recovery.log")
}

// ---------------------------------------------------------------------------
// Atomic file write
// ---------------------------------------------------------------------------

/// Write `content` to `path` atomically using a temp file + rename.
///
/// The temp file lives in the target directory so the rename never crosses
/// file systems. Readers see either the old file or the new one.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry formatting
// ---------------------------------------------------------------------------

impl RecoveryEntry {
    pub fn new(category: RecoveryCategory, description: impl Into<String>) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: Vec::new(),
            body: String::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The entry as it appears in the log: a `## ` header line, one
    /// `Key: value` line per field, the body in a fenced block, then `---`.
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!(
                "## {} - {}: {}",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                self.category,
                self.description
            ),
            String::new(),
        ];
        lines.extend(self.fields.iter().map(|(k, v)| format!("{}: {}", k, v)));
        if !self.body.is_empty() {
            lines.push(String::new());
            lines.push(format!("```text\n{}\n```", self.body.trim_end_matches('\n')));
        }
        lines.push(String::new());
        lines.push(ENTRY_SEPARATOR.to_string());
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
            "body": self.body,
        })
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Append a recovery entry to the log. Failures are reported through `log`
/// and otherwise swallowed.
pub fn log_recovery(log_path: &Path, entry: RecoveryEntry) {
    if let Err(e) = log_recovery_inner(log_path, &entry) {
        log::warn!(
            "could not write to recovery log {}: {}",
            log_path.display(),
            e
        );
    }
}

fn log_recovery_inner(path: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    append_capped(path, entry, MAX_LOG_SIZE)
}

/// Append `entry`, first dropping the oldest entries if the log has grown
/// past `max_size`. A trimmed log keeps at most half of `max_size`.
fn append_capped(path: &Path, entry: &RecoveryEntry, max_size: u64) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Ok(meta) = std::fs::metadata(path)
        && meta.len() > max_size
    {
        match trim_to_size(path, max_size / 2) {
            Ok(dropped) if dropped > 0 => {
                log::info!("trimmed {} old entries from {}", dropped, path.display())
            }
            Ok(_) => {}
            Err(e) => log::debug!("could not trim {}: {}", path.display(), e),
        }
    }
    let needs_header = std::fs::metadata(path).map_or(true, |m| m.len() == 0);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())?;
    Ok(())
}

/// Drop the oldest entries until the rendered log fits in `target` bytes.
/// Skipped (returns 0) when another process holds the log.
fn trim_to_size(path: &Path, target: u64) -> io::Result<usize> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    if !try_lock(&file)? {
        return Ok(0);
    }
    let mut content = String::new();
    file.read_to_string(&mut content)?;

    let rendered: Vec<String> = parse_entries(&content)
        .iter()
        .map(RecoveryEntry::to_markdown)
        .collect();
    let mut size = (FILE_HEADER.len() + rendered.iter().map(String::len).sum::<usize>()) as u64;
    let mut dropped = 0;
    while size > target && dropped < rendered.len() {
        size -= rendered[dropped].len() as u64;
        dropped += 1;
    }
    rewrite_locked(&mut file, &rendered[dropped..])?;
    Ok(dropped)
}

/// Replace the log content in place. The file keeps its inode so a flock
/// held on it stays meaningful to other processes.
fn rewrite_locked(file: &mut File, rendered: &[String]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(FILE_HEADER.as_bytes())?;
    for entry in rendered {
        file.write_all(entry.as_bytes())?;
    }
    file.sync_all()
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Remove entries older than `before` (default: `PRUNE_AGE_DAYS` ago), or
/// every entry when `all` is set. Returns the number removed.
pub fn prune_recovery(
    log_path: &Path,
    before: Option<DateTime<Utc>>,
    all: bool,
) -> io::Result<usize> {
    let mut file = match OpenOptions::new().read(true).write(true).open(log_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let deadline = Instant::now() + PRUNE_LOCK_TIMEOUT;
    while !try_lock(&file)? {
        if Instant::now() >= deadline {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "recovery log is in use, try again later",
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let entries = parse_entries(&content);
    let cutoff = before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));
    let kept: Vec<String> = entries
        .iter()
        .filter(|e| !all && e.timestamp >= cutoff)
        .map(RecoveryEntry::to_markdown)
        .collect();
    let removed = entries.len() - kept.len();
    if removed > 0 {
        rewrite_locked(&mut file, &kept)?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Reading entries
// ---------------------------------------------------------------------------

/// Read recovery entries, most recent first.
pub fn read_recovery_entries(log_path: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let Ok(content) = std::fs::read_to_string(log_path) else {
        return Vec::new();
    };
    parse_entries(&content)
        .into_iter()
        .rev()
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    content
        .split(&format!("\n{}\n", ENTRY_SEPARATOR))
        .filter_map(parse_block)
        .collect()
}

/// One `---`-delimited block. Blocks without a valid header (the file
/// preamble, hand edits) are skipped.
fn parse_block(block: &str) -> Option<RecoveryEntry> {
    let block = block.trim_start().strip_prefix("## ")?;
    let (header, rest) = block.split_once('\n').unwrap_or((block, ""));
    let (timestamp, category, description) = parse_entry_header(header)?;

    let (meta, body) = match rest.split_once("```text\n") {
        Some((meta, fenced)) => {
            let body = fenced.rsplit_once("```").map_or(fenced, |(b, _)| b);
            (meta, body.trim_end_matches('\n'))
        }
        None => (rest, ""),
    };
    let fields = meta
        .lines()
        .filter_map(|line| line.trim().split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Some(RecoveryEntry {
        timestamp,
        category,
        description,
        fields,
        body: body.to_string(),
    })
}

/// Parse an entry header: `<timestamp> - <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp_str, rest) = header.split_once(" - ")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
        .ok()?
        .with_timezone(&Utc);
    let (category_str, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category_str)?;
    Some((timestamp, category, description.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn atomic_write_into_missing_dir_fails_without_creating_target() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join("catalog.json");
        assert!(atomic_write(&path, b"x").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn entry_formatting() {
        let entry = RecoveryEntry::new(RecoveryCategory::Write, "catalog write failed")
            .field("Target", "/data/catalog.json")
            .body("{\"tracks\": []}");
        let md = entry.to_markdown();
        assert!(md.contains("write: catalog write failed"));
        assert!(md.contains("Target: /data/catalog.json"));
        assert!(md.contains("```text"));
        assert!(md.ends_with("---\n"));
    }

    #[test]
    fn log_and_read_back_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        let log = recovery_log_path(&tmp.path().join("catalog.json"));

        log_recovery(
            &log,
            RecoveryEntry::new(RecoveryCategory::Delete, "track removed")
                .field("Path", "/trk/a.gpx")
                .body("{\n  \"file_path\": \"/trk/a.gpx\"\n}"),
        );
        log_recovery(
            &log,
            RecoveryEntry::new(RecoveryCategory::Corrupt, "catalog set aside"),
        );

        let entries = read_recovery_entries(&log, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, RecoveryCategory::Corrupt);
        assert_eq!(entries[1].category, RecoveryCategory::Delete);
        assert_eq!(
            entries[1].fields,
            vec![("Path".to_string(), "/trk/a.gpx".to_string())]
        );
        assert_eq!(entries[1].body, "{\n  \"file_path\": \"/trk/a.gpx\"\n}");

        let limited = read_recovery_entries(&log, Some(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].category, RecoveryCategory::Corrupt);
    }

    #[test]
    fn oversized_log_drops_oldest_entries() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("recovery.log");
        let padding = "x".repeat(400);
        for i in 0..10 {
            append_capped(
                &log,
                &RecoveryEntry::new(RecoveryCategory::Delete, format!("track {} removed", i))
                    .body(padding.clone()),
                2_000,
            )
            .unwrap();
        }

        let size = std::fs::metadata(&log).unwrap().len();
        assert!(size <= 2_000 + 600, "log grew to {} bytes", size);
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.starts_with(FILE_HEADER));

        let entries = read_recovery_entries(&log, None);
        assert!(entries.len() < 10);
        assert_eq!(entries[0].description, "track 9 removed");
        assert!(entries.iter().all(|e| e.description != "track 0 removed"));
    }

    #[test]
    fn prune_drops_entries_before_cutoff() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("recovery.log");
        let mut old = RecoveryEntry::new(RecoveryCategory::Write, "old failure");
        old.timestamp = Utc::now() - chrono::Duration::days(90);
        log_recovery(&log, old);
        log_recovery(&log, RecoveryEntry::new(RecoveryCategory::Write, "new failure"));

        assert_eq!(prune_recovery(&log, None, false).unwrap(), 1);
        let entries = read_recovery_entries(&log, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "new failure");

        assert_eq!(prune_recovery(&log, None, true).unwrap(), 1);
        assert!(read_recovery_entries(&log, None).is_empty());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), FILE_HEADER);
    }

    #[test]
    fn prune_missing_log_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            prune_recovery(&tmp.path().join("recovery.log"), None, true).unwrap(),
            0
        );
    }

    #[test]
    fn missing_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_recovery_entries(&tmp.path().join("recovery.log"), None).is_empty());
    }
}
