use std::collections::VecDeque;
use time::macros::format_description;
use time::OffsetDateTime;

/// Most recent status lines kept; older ones are evicted first.
pub const STATUS_LOG_CAPACITY: usize = 100;
pub const START_LABEL: &str = "Start Cycles";
pub const RUNNING_LABEL: &str = "Running...";
pub const CONNECTED_LINE: &str = "Connected to cycle runner server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

/// Last progress reported by the server. Values are shown as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleProgress {
    pub current: i64,
    pub total: i64,
}

impl CycleProgress {
    /// Fraction for a gauge, clamped to `0.0..=1.0`. `None` until a positive
    /// total is known.
    pub fn ratio(&self) -> Option<f64> {
        if self.total <= 0 {
            return None;
        }
        Some((self.current as f64 / self.total as f64).clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub at: OffsetDateTime,
    pub level: LogLevel,
    pub text: String,
}

impl StatusEntry {
    pub fn timestamp(&self) -> String {
        self.at
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default()
    }
}

/// Bounded FIFO of status lines.
#[derive(Debug, Clone)]
pub struct StatusLog {
    entries: VecDeque<StatusEntry>,
    capacity: usize,
    appended: u64,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(STATUS_LOG_CAPACITY)
    }
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    pub fn push(&mut self, text: impl Into<String>, level: LogLevel) {
        self.entries.push_back(StatusEntry {
            at: now(),
            level,
            text: text.into(),
        });
        self.appended += 1;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &StatusEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of lines ever appended, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.appended
    }

    /// Entries appended after the log had seen `seen` lines in total. Lines
    /// already evicted are skipped.
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &StatusEntry> {
        let fresh = self.appended.saturating_sub(seen).min(self.entries.len() as u64) as usize;
        self.entries.iter().skip(self.entries.len() - fresh)
    }

    pub fn to_plain_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.timestamp(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn now() -> OffsetDateTime {
    // Local offset lookup fails in multi-threaded processes on some platforms.
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Enablement and labels of the two buttons, derived from [`RunState`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonStates {
    pub start_enabled: bool,
    pub start_label: &'static str,
    pub stop_enabled: bool,
}

impl ButtonStates {
    pub fn for_state(state: RunState) -> Self {
        match state {
            RunState::Running => Self {
                start_enabled: false,
                start_label: RUNNING_LABEL,
                stop_enabled: true,
            },
            RunState::Idle => Self {
                start_enabled: true,
                start_label: START_LABEL,
                stop_enabled: false,
            },
        }
    }
}

impl Default for ButtonStates {
    fn default() -> Self {
        Self::for_state(RunState::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected(String),
}

/// A blocking notification. The user has to dismiss it before doing anything
/// else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}
