use std::collections::HashMap;

use indexmap::IndexMap;

use crate::model::track::TrackRecord;

/// Records keyed by file path in catalog order, plus the file name index.
///
/// `by_name` maps a file name to the path of its first occurrence in
/// catalog order. It is patched on insert and removal and rebuilt after
/// re-keying.
#[derive(Debug, Default)]
pub(crate) struct CatalogIndex {
    records: IndexMap<String, TrackRecord>,
    by_name: HashMap<String, String>,
}

impl CatalogIndex {
    /// Build from records in stored order. Later duplicates of a path are
    /// dropped and returned.
    pub fn from_records(records: Vec<TrackRecord>) -> (Self, Vec<TrackRecord>) {
        let mut index = CatalogIndex::default();
        let mut dropped = Vec::new();
        for record in records {
            if index.contains(&record.file_path) {
                dropped.push(record);
            } else {
                index.push(record);
            }
        }
        (index, dropped)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackRecord> {
        self.records.values()
    }

    pub fn get(&self, file_path: &str) -> Option<&TrackRecord> {
        self.records.get(file_path)
    }

    pub fn get_mut(&mut self, file_path: &str) -> Option<&mut TrackRecord> {
        self.records.get_mut(file_path)
    }

    pub fn get_by_file_name(&self, file_name: &str) -> Option<&TrackRecord> {
        self.by_name.get(file_name).and_then(|p| self.records.get(p))
    }

    pub fn contains(&self, file_path: &str) -> bool {
        self.records.contains_key(file_path)
    }

    pub fn contains_file_name(&self, file_name: &str) -> bool {
        self.by_name.contains_key(file_name)
    }

    /// Append a record. The caller has checked that the path is new.
    pub fn push(&mut self, record: TrackRecord) {
        self.by_name
            .entry(record.file_name.clone())
            .or_insert_with(|| record.file_path.clone());
        self.records.insert(record.file_path.clone(), record);
    }

    pub fn remove(&mut self, file_path: &str) -> Option<TrackRecord> {
        let removed = self.records.shift_remove(file_path)?;
        if self.by_name.get(&removed.file_name).map(String::as_str) == Some(file_path) {
            // Hand the name over to the next record carrying it, if any
            match self.records.values().find(|r| r.file_name == removed.file_name) {
                Some(next) => {
                    let next = next.file_path.clone();
                    self.by_name.insert(removed.file_name.clone(), next);
                }
                None => {
                    self.by_name.remove(&removed.file_name);
                }
            }
        }
        Some(removed)
    }

    /// Move records to new paths, keeping their catalog positions. `moves`
    /// maps current path to new path; the caller has checked that no
    /// target collides.
    pub fn rekey(&mut self, moves: &HashMap<String, String>) {
        let records = std::mem::take(&mut self.records);
        self.records = records
            .into_iter()
            .map(|(path, mut record)| match moves.get(&path) {
                Some(target) => {
                    record.set_file_path(target.clone());
                    (target.clone(), record)
                }
                None => (path, record),
            })
            .collect();

        self.by_name.clear();
        for record in self.records.values() {
            self.by_name
                .entry(record.file_name.clone())
                .or_insert_with(|| record.file_path.clone());
        }
    }
}
