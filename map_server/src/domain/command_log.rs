// Per-room sequenced command log.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry<T> {
    pub seq: u64,
    pub command_id: String,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New command, assigned the next sequence number.
    Appended(u64),
    /// Command id already sequenced; carries its original sequence number.
    Duplicate(u64),
}

/// Entries after a client's last applied sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay<T> {
    pub entries: Vec<LogEntry<T>>,
    /// Some entries the client is missing were already evicted.
    pub truncated: bool,
}

/// Bounded log of sequenced commands.
///
/// Sequence numbers start at 1 and grow by one per appended command. Once the log
/// holds `capacity` entries the oldest is evicted, and its id leaves the dedup index.
#[derive(Debug)]
pub struct CommandLog<T> {
    capacity: usize,
    entries: VecDeque<LogEntry<T>>,
    index: HashMap<String, u64>,
    head_seq: u64,
}

impl<T: Clone> CommandLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            index: HashMap::new(),
            head_seq: 0,
        }
    }

    /// Highest sequence number handed out so far (0 when empty).
    pub fn head_seq(&self) -> u64 {
        self.head_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }

    pub fn lookup(&self, command_id: &str) -> Option<u64> {
        self.index.get(command_id).copied()
    }

    pub fn append(&mut self, command_id: &str, payload: T) -> AppendOutcome {
        if let Some(seq) = self.lookup(command_id) {
            return AppendOutcome::Duplicate(seq);
        }

        if self.entries.len() == self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.index.remove(&evicted.command_id);
            }
        }

        self.head_seq += 1;
        let seq = self.head_seq;
        self.index.insert(command_id.to_string(), seq);
        self.entries.push_back(LogEntry {
            seq,
            command_id: command_id.to_string(),
            payload,
        });
        AppendOutcome::Appended(seq)
    }

    /// Sequence number a client reporting `last_seq` resumes after.
    ///
    /// A `last_seq` ahead of the head was issued by an earlier history of this room,
    /// so that client starts over from the beginning.
    pub fn resume_point(&self, last_seq: Option<u64>) -> u64 {
        match last_seq {
            Some(seq) if seq <= self.head_seq => seq,
            _ => 0,
        }
    }

    /// Everything after `last_seq`; `None` means the client has nothing yet.
    pub fn since(&self, last_seq: Option<u64>) -> Replay<T> {
        let after = self.resume_point(last_seq);
        let truncated = match self.first_seq() {
            Some(first) => first > after + 1,
            // Everything was evicted, or nothing was ever logged.
            None => after < self.head_seq,
        };
        let entries = self
            .entries
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect();
        Replay { entries, truncated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(ids: &[&str], capacity: usize) -> CommandLog<String> {
        let mut log = CommandLog::new(capacity);
        for id in ids {
            log.append(id, format!("payload-{id}"));
        }
        log
    }

    #[test]
    fn when_appending_then_sequence_numbers_increase_by_one() {
        let mut log = CommandLog::new(8);

        assert_eq!(log.append("a", ()), AppendOutcome::Appended(1));
        assert_eq!(log.append("b", ()), AppendOutcome::Appended(2));
        assert_eq!(log.head_seq(), 2);
    }

    #[test]
    fn when_command_id_repeats_then_original_seq_is_returned() {
        let mut log = log_with(&["a", "b"], 8);

        assert_eq!(log.append("a", "again".to_string()), AppendOutcome::Duplicate(1));
        assert_eq!(log.head_seq(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn when_client_reports_last_seq_then_only_newer_entries_replay() {
        let log = log_with(&["a", "b", "c"], 8);

        let replay = log.since(Some(1));

        let seqs: Vec<u64> = replay.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert!(!replay.truncated);
    }

    #[test]
    fn when_log_evicted_missing_entries_then_replay_is_truncated() {
        let log = log_with(&["a", "b", "c", "d"], 2);

        let replay = log.since(Some(1));

        let seqs: Vec<u64> = replay.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert!(replay.truncated);
        // Evicted ids leave the dedup index.
        assert_eq!(log.lookup("a"), None);
    }

    #[test]
    fn when_client_is_up_to_date_then_replay_is_empty() {
        let log = log_with(&["a", "b"], 2);

        let replay = log.since(Some(2));

        assert!(replay.entries.is_empty());
        assert!(!replay.truncated);
    }

    #[test]
    fn when_new_client_joins_fresh_room_then_nothing_is_truncated() {
        let log: CommandLog<String> = CommandLog::new(4);

        let replay = log.since(None);

        assert!(replay.entries.is_empty());
        assert!(!replay.truncated);
    }

    #[test]
    fn when_client_is_ahead_of_the_head_then_it_resumes_from_the_start() {
        let log = log_with(&["a", "b"], 8);

        let replay = log.since(Some(7));

        assert_eq!(log.resume_point(Some(7)), 0);
        let seqs: Vec<u64> = replay.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(!replay.truncated);
    }
}
