//! 値の変化の追跡（モニター／トラッカー）
//!
//! 監視エントリはアドレスの文字列そのものをキーにします。数値として同じアドレスでも
//! 表記が異なれば別のエントリです。

use crate::format::highlight;
use crate::reader::ServiceReader;
use tansaku_service::parse::parse_address;
use tracing::warn;

/// 監視セットの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// コマンドを実行するたびに暗黙にポーリングされる
    Monitor,
    /// 明示的に要求されたときだけポーリングされる
    Tracker,
}

/// 監視エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub key: String,
    pub size: usize,
    /// 最後に読み取った値（まだ読み取っていなければ空）
    pub last_value: String,
    /// 前回のポーリングで値が変わり、まだ描画で消費されていない
    pub changed: bool,
}

impl WatchEntry {
    pub fn new(key: impl Into<String>, size: usize) -> Self {
        Self {
            key: key.into(),
            size,
            last_value: String::new(),
            changed: false,
        }
    }

    /// 初回の値を設定する
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.last_value = value.into();
        self
    }

    /// 新しく読み取った値を記録し、変化したかどうかを返す
    ///
    /// 初回の読み取り（`last_value` が空）は変化として扱いません。
    pub fn observe(&mut self, value: String) -> bool {
        let changed = !self.last_value.is_empty() && self.last_value != value;
        if changed {
            self.changed = true;
        }
        self.last_value = value;
        changed
    }

    /// 表示行を作る（変化フラグはそのまま）
    pub fn line(&self) -> String {
        let line = format!("{}  {}", self.key, self.last_value);
        if self.changed {
            highlight(&line)
        } else {
            line
        }
    }

    /// 表示行を作り、変化フラグを消費する
    pub fn take_line(&mut self) -> String {
        let line = self.line();
        self.changed = false;
        line
    }
}

/// 監視セット
#[derive(Debug, Clone)]
pub struct WatchSet {
    kind: WatchKind,
    entries: Vec<WatchEntry>,
}

impl WatchSet {
    pub fn new(kind: WatchKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    /// エントリを追加する
    ///
    /// モニターは同じキーのエントリを置き換えます（値は読み直し）。
    /// トラッカーは既存のエントリがあれば何もしません。追加した場合は true。
    pub fn add(&mut self, entry: WatchEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => match self.kind {
                WatchKind::Monitor => {
                    *existing = entry;
                    true
                }
                WatchKind::Tracker => false,
            },
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    /// エントリを削除する。存在しなければ false
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.entries.len() != before
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全エントリの値を読み直し、いずれかが変化したら true を返す
    ///
    /// 読み取りに失敗したエントリは前回の値のまま残します。
    pub fn poll(&mut self, reader: &ServiceReader) -> bool {
        let mut changed_any = false;
        for entry in &mut self.entries {
            let value = parse_address(&entry.key)
                .map_err(|e| e.to_string())
                .and_then(|addr| reader.read_value(addr, entry.size).map_err(|e| e.to_string()));
            match value {
                Ok(value) => changed_any |= entry.observe(value),
                Err(e) => warn!("{:?} poll skipped '{}': {}", self.kind, entry.key, e),
            }
        }
        changed_any
    }

    /// 表示行を作る。変化フラグは消費しない
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(WatchEntry::line).collect()
    }

    /// 変化フラグを全て消費する
    pub fn consume_changes(&mut self) {
        for entry in &mut self.entries {
            entry.changed = false;
        }
    }

    /// 表示行を作る。変化フラグはここで消費される
    pub fn take_lines(&mut self) -> Vec<String> {
        self.entries.iter_mut().map(WatchEntry::take_line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tansaku_service::MockService;

    fn reader_with(service: &Arc<MockService>) -> ServiceReader {
        ServiceReader::new(service.clone())
    }

    #[test]
    fn test_change_is_flagged_once_and_consumed() {
        let service = Arc::new(MockService::new());
        service.write_memory(0x1000, &[1, 0, 0, 0]);
        let reader = reader_with(&service);

        let mut monitors = WatchSet::new(WatchKind::Monitor);
        monitors.add(WatchEntry::new("0x1000", 4));

        // 初回の読み取りは変化扱いしない
        assert!(!monitors.poll(&reader));
        assert!(!monitors.poll(&reader));
        assert!(!monitors.get("0x1000").unwrap().changed);

        service.write_memory(0x1000, &[2, 0, 0, 0]);
        assert!(monitors.poll(&reader));
        assert!(monitors.get("0x1000").unwrap().changed);

        // 覗くだけではフラグは残る
        assert_eq!(monitors.lines(), vec!["[red]0x1000  0x00000002[white]"]);
        assert!(monitors.get("0x1000").unwrap().changed);

        let lines = monitors.take_lines();
        assert_eq!(lines, vec!["[red]0x1000  0x00000002[white]"]);
        assert!(!monitors.get("0x1000").unwrap().changed);
        assert_eq!(monitors.take_lines(), vec!["0x1000  0x00000002"]);
    }

    #[test]
    fn test_textually_different_keys_are_separate() {
        let service = Arc::new(MockService::new());
        let reader = reader_with(&service);
        let mut trackers = WatchSet::new(WatchKind::Tracker);
        assert!(trackers.add(WatchEntry::new("0x10", 4)));
        assert!(trackers.add(WatchEntry::new("0x0010", 4)));
        assert!(!trackers.add(WatchEntry::new("0x10", 8)));
        assert_eq!(trackers.len(), 2);
        assert_eq!(trackers.get("0x10").unwrap().size, 4);

        trackers.poll(&reader);
        assert_eq!(service.call_count("read_memory"), 2);
    }

    #[test]
    fn test_monitor_add_replaces_entry() {
        let mut monitors = WatchSet::new(WatchKind::Monitor);
        monitors.add(WatchEntry::new("0x10", 4).with_value("0x1"));
        monitors.add(WatchEntry::new("0x10", 8));
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors.get("0x10").unwrap().size, 8);
        assert!(monitors.get("0x10").unwrap().last_value.is_empty());
        assert!(monitors.remove("0x10"));
        assert!(!monitors.remove("0x10"));
    }

    #[test]
    fn test_failed_read_keeps_previous_value() {
        let service = Arc::new(MockService::new());
        service.write_memory(0x20, &[7]);
        let reader = reader_with(&service);
        let mut monitors = WatchSet::new(WatchKind::Monitor);
        monitors.add(WatchEntry::new("0x20", 1));
        monitors.poll(&reader);

        service.fail_on("read_memory");
        service.write_memory(0x20, &[8]);
        assert!(!monitors.poll(&reader));
        assert_eq!(monitors.get("0x20").unwrap().last_value, "0x07");
    }
}
