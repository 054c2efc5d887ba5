//! Canonical record log with derived player and code indices.
//!
//! The record `Vec` is the only source of truth. `by_player` and `by_code`
//! hold positions into it and are touched only by the mutating methods of
//! [`IndexedLog`], so they cannot drift from the log.

use std::collections::HashMap;

use promo_types::{code_key, ActivationRecord, PlayerId, TemporaryGrantRecord};

/// A record that can be indexed by player and code.
pub trait LedgerRecord {
    fn player_id(&self) -> PlayerId;
    fn code_name(&self) -> &str;
}

impl LedgerRecord for ActivationRecord {
    fn player_id(&self) -> PlayerId {
        self.player_id
    }

    fn code_name(&self) -> &str {
        &self.code_name
    }
}

impl LedgerRecord for TemporaryGrantRecord {
    fn player_id(&self) -> PlayerId {
        self.player_id
    }

    fn code_name(&self) -> &str {
        &self.code_name
    }
}

/// Record log plus secondary indices.
#[derive(Debug, Clone)]
pub struct IndexedLog<T> {
    records: Vec<T>,
    by_player: HashMap<PlayerId, Vec<usize>>,
    by_code: HashMap<String, Vec<usize>>,
}

impl<T: LedgerRecord> Default for IndexedLog<T> {
    fn default() -> Self {
        Self::from_records(Vec::new())
    }
}

impl<T: LedgerRecord> IndexedLog<T> {
    /// Build a log and its indices from scratch.
    pub fn from_records(records: Vec<T>) -> Self {
        let mut log = Self {
            records,
            by_player: HashMap::new(),
            by_code: HashMap::new(),
        };
        log.rebuild();
        log
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Records belonging to `player`.
    pub fn for_player(&self, player: PlayerId) -> impl Iterator<Item = &T> + '_ {
        self.resolve(self.by_player.get(&player))
    }

    /// Records for `code` (case-insensitive).
    pub fn for_code(&self, code: &str) -> impl Iterator<Item = &T> + '_ {
        self.resolve(self.by_code.get(&code_key(code)))
    }

    pub fn count_for_code(&self, code: &str) -> usize {
        self.by_code.get(&code_key(code)).map_or(0, Vec::len)
    }

    /// Distinct players with at least one record.
    pub fn player_count(&self) -> usize {
        self.by_player.len()
    }

    pub fn position(&self, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        self.records.iter().position(predicate)
    }

    /// Append a record and index it.
    pub fn insert(&mut self, record: T) -> usize {
        let pos = self.records.len();
        self.records.push(record);
        self.index(pos);
        pos
    }

    /// Mutate the record at `pos`. Returns `false` if there is none.
    ///
    /// Indices are rebuilt if the closure changes an indexed key.
    pub fn update(&mut self, pos: usize, f: impl FnOnce(&mut T)) -> bool {
        let Some(record) = self.records.get_mut(pos) else {
            return false;
        };
        let before = (record.player_id(), code_key(record.code_name()));
        f(record);
        if before != (record.player_id(), code_key(record.code_name())) {
            self.rebuild();
        }
        true
    }

    /// Keep only records matching `keep`. Returns how many were removed.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(keep);
        let removed = before - self.records.len();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    /// Replace the whole log (used on reload).
    pub fn replace_all(&mut self, records: Vec<T>) {
        self.records = records;
        self.rebuild();
    }

    /// Whether both indices describe exactly the current log.
    pub fn is_consistent(&self) -> bool {
        let (by_player, by_code) = Self::reindexed(&self.records);
        by_player == self.by_player && by_code == self.by_code
    }

    fn resolve<'a>(&'a self, positions: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a T> + 'a {
        positions
            .into_iter()
            .flatten()
            .filter_map(|&pos| self.records.get(pos))
    }

    fn index(&mut self, pos: usize) {
        let Some(record) = self.records.get(pos) else {
            return;
        };
        self.by_player
            .entry(record.player_id())
            .or_default()
            .push(pos);
        self.by_code
            .entry(code_key(record.code_name()))
            .or_default()
            .push(pos);
    }

    fn rebuild(&mut self) {
        let (by_player, by_code) = Self::reindexed(&self.records);
        self.by_player = by_player;
        self.by_code = by_code;
    }

    #[allow(clippy::type_complexity)]
    fn reindexed(records: &[T]) -> (HashMap<PlayerId, Vec<usize>>, HashMap<String, Vec<usize>>) {
        let mut by_player: HashMap<PlayerId, Vec<usize>> = HashMap::new();
        let mut by_code: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, record) in records.iter().enumerate() {
            by_player.entry(record.player_id()).or_default().push(pos);
            by_code
                .entry(code_key(record.code_name()))
                .or_default()
                .push(pos);
        }
        (by_player, by_code)
    }
}
