use std::collections::VecDeque;
use std::time::Duration;

/// Display time for transient statuses raised by most controllers.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3);

/// Display time for download errors (longer for visibility).
pub const DOWNLOAD_ERROR_TTL: Duration = Duration::from_secs(8);

/// How urgent a status message is. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A transient message for the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u64,
    pub severity: Severity,
    pub text: String,
    pub ttl: Duration,
}

/// Three FIFO queues, one per [`Severity`], with monotonic ID assignment.
///
/// [`next`](Self::next) drains errors before warnings before infos.
/// Expiring a displayed status after its TTL is a presentation concern.
#[derive(Debug, Clone, Default)]
pub struct StatusQueue {
    info: VecDeque<Status>,
    warning: VecDeque<Status>,
    error: VecDeque<Status>,
    next_id: u64,
}

impl StatusQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a status. Returns the assigned ID.
    pub fn push(&mut self, severity: Severity, text: impl Into<String>, ttl: Duration) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let status = Status {
            id,
            severity,
            text: text.into(),
            ttl,
        };
        self.queue_mut(severity).push_back(status);
        id
    }

    pub fn info(&mut self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Info, text, ttl)
    }

    pub fn warning(&mut self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Warning, text, ttl)
    }

    pub fn error(&mut self, text: impl Into<String>, ttl: Duration) -> u64 {
        self.push(Severity::Error, text, ttl)
    }

    /// Dequeue the most urgent status, oldest first within a severity.
    pub fn next(&mut self) -> Option<Status> {
        self.error
            .pop_front()
            .or_else(|| self.warning.pop_front())
            .or_else(|| self.info.pop_front())
    }

    /// Look at what [`next`](Self::next) would return.
    pub fn peek(&self) -> Option<&Status> {
        self.error
            .front()
            .or_else(|| self.warning.front())
            .or_else(|| self.info.front())
    }

    /// Number of pending statuses of one severity.
    pub fn pending(&self, severity: Severity) -> usize {
        match severity {
            Severity::Info => self.info.len(),
            Severity::Warning => self.warning.len(),
            Severity::Error => self.error.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.info.len() + self.warning.len() + self.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.info.clear();
        self.warning.clear();
        self.error.clear();
    }

    fn queue_mut(&mut self, severity: Severity) -> &mut VecDeque<Status> {
        match severity {
            Severity::Info => &mut self.info,
            Severity::Warning => &mut self.warning,
            Severity::Error => &mut self.error,
        }
    }
}
