//! Executive system log
//!
//! A byte-bounded log of short text messages, kept apart from the `log`
//! facade so it can be read back through the executive API. Every message
//! is also echoed to `log` under the `fsx::syslog` target.
//!
//! When a message does not fit, the mode decides:
//! - `Overwrite` drops the oldest messages until it does
//! - `Discard` keeps what is already logged, storing a truncated fragment
//!   if there is still room for a useful one

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Smallest fragment worth keeping in discard mode
pub const SYSLOG_MIN_FRAGMENT: usize = 24;

/// Behavior when the log is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SysLogMode {
    #[default]
    Overwrite,
    Discard,
}

/// One logged message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysLogEntry {
    /// Sequence number (monotonic, survives overwrite)
    pub seq: u64,
    pub message: String,
}

/// Result of a successful append
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SysLogWrite {
    Written,
    /// Stored, but shortened to fit
    Truncated,
}

/// Bounded system log
pub struct SysLog {
    entries: VecDeque<SysLogEntry>,
    /// Bytes used, counting one terminator per message
    used: usize,
    capacity: usize,
    mode: SysLogMode,
    next_seq: u64,
}

impl SysLog {
    pub fn new(capacity: usize, mode: SysLogMode) -> Self {
        Self {
            entries: VecDeque::new(),
            used: 0,
            capacity,
            mode,
            next_seq: 0,
        }
    }

    /// Append a message.
    ///
    /// Trailing newlines are stripped. A message longer than half the log
    /// is truncated. Empty messages are accepted and not stored.
    ///
    /// # Returns
    /// * `Some(Written)` / `Some(Truncated)` - Message stored
    /// * `None` - Discard mode and no room left
    pub fn append(&mut self, message: &str) -> Option<SysLogWrite> {
        let message = message.trim_end_matches('\n');
        let mut status = SysLogWrite::Written;

        let mut len = message.len();
        if len > self.capacity / 2 {
            len = self.capacity / 2;
            status = SysLogWrite::Truncated;
        }
        if len == 0 {
            return Some(status);
        }

        if self.used + len + 1 > self.capacity {
            match self.mode {
                SysLogMode::Overwrite => {
                    while self.used + len + 1 > self.capacity {
                        match self.entries.pop_front() {
                            Some(old) => self.used -= old.message.len() + 1,
                            None => break,
                        }
                    }
                }
                SysLogMode::Discard => {
                    let room = self.capacity.saturating_sub(self.used + 1);
                    if room < SYSLOG_MIN_FRAGMENT {
                        return None;
                    }
                    len = room;
                    status = SysLogWrite::Truncated;
                }
            }
        }

        let text = truncate_at_char(message, len);
        self.used += text.len() + 1;
        self.entries.push_back(SysLogEntry {
            seq: self.next_seq,
            message: text.to_owned(),
        });
        self.next_seq += 1;
        Some(status)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SysLogEntry> {
        self.entries.iter()
    }

    /// The most recent `count` entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<&SysLogEntry> {
        self.entries.iter().rev().take(count).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    pub fn mode(&self) -> SysLogMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SysLogMode) {
        self.mode = mode;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes in use
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages written since boot, including overwritten ones
    pub fn total_written(&self) -> u64 {
        self.next_seq
    }
}

fn truncate_at_char(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syslog_creation() {
        let log = SysLog::new(128, SysLogMode::Overwrite);
        assert!(log.is_empty());
        assert_eq!(log.used(), 0);
        assert_eq!(log.total_written(), 0);
    }

    #[test]
    fn test_append_counts_terminator() {
        let mut log = SysLog::new(128, SysLogMode::Discard);
        assert_eq!(log.append("hello\n"), Some(SysLogWrite::Written));
        assert_eq!(log.used(), 6);
        assert_eq!(log.entries().next().map(|e| e.message.as_str()), Some("hello"));
    }

    #[test]
    fn test_long_message_truncated_to_half() {
        let mut log = SysLog::new(40, SysLogMode::Overwrite);
        let long = "x".repeat(30);
        assert_eq!(log.append(&long), Some(SysLogWrite::Truncated));
        assert_eq!(log.entries().next().unwrap().message.len(), 20);
    }

    #[test]
    fn test_overwrite_drops_oldest() {
        let mut log = SysLog::new(64, SysLogMode::Overwrite);
        for i in 0..10 {
            log.append(&format!("message {i:02}")).unwrap();
        }
        assert!(log.used() <= 64);
        let recent = log.recent(2);
        assert_eq!(recent[0].message, "message 09");
        assert_eq!(recent[1].message, "message 08");
        assert_eq!(log.entries().next().unwrap().seq, 10 - log.len() as u64);
        assert_eq!(log.total_written(), 10);
    }

    #[test]
    fn test_discard_keeps_old_messages() {
        let mut log = SysLog::new(64, SysLogMode::Discard);
        log.append(&"a".repeat(31)).unwrap();
        // 32 used, 31 bytes of room for text
        assert_eq!(log.append(&"b".repeat(32)), Some(SysLogWrite::Truncated));
        assert_eq!(log.used(), 64);
        assert_eq!(log.append("more"), None);
        assert_eq!(log.len(), 2);
        assert!(log.entries().next().unwrap().message.starts_with('a'));
    }

    #[test]
    fn test_discard_skips_tiny_fragments() {
        let mut log = SysLog::new(64, SysLogMode::Discard);
        log.append(&"a".repeat(30)).unwrap();
        log.append(&"b".repeat(20)).unwrap();
        // 52 used, only 11 bytes of room
        assert_eq!(log.append(&"c".repeat(20)), None);
    }

    #[test]
    fn test_clear_and_mode() {
        let mut log = SysLog::new(64, SysLogMode::Discard);
        log.append("one").unwrap();
        log.set_mode(SysLogMode::Overwrite);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.used(), 0);
        assert_eq!(log.mode(), SysLogMode::Overwrite);
        log.append("two").unwrap();
        assert_eq!(log.entries().next().unwrap().seq, 1);
    }
}
