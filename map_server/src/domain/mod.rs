// Domain layer: the authority's sequenced command log.

pub mod command_log;

pub use command_log::{AppendOutcome, CommandLog, LogEntry, Replay};
