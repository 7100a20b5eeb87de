//! Task units - one (document, module) pair scheduled in a run

/// Lifecycle status of a task unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// Scheduled, not yet started
    Pending,

    /// Request in flight
    Running,

    /// Output persisted
    Succeeded,

    /// Retries exhausted or fatal error
    Failed,

    /// Current output already persisted, nothing to do
    Skipped,
}

impl UnitStatus {
    /// Whether the unit has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Succeeded | UnitStatus::Failed | UnitStatus::Skipped
        )
    }
}

/// A (document, module) pair
///
/// `doc_index` refers to the run's resolved document list. Units for the same
/// document execute in template order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUnit {
    /// Index into the run's document list
    pub doc_index: usize,

    /// Content hash of the document
    pub source_hash: String,

    /// Module name
    pub module: String,

    /// Bypasses the skip check (force-stage or retry selection)
    pub forced: bool,

    /// Current status
    pub status: UnitStatus,
}

impl TaskUnit {
    /// Create a pending unit
    pub fn new(doc_index: usize, source_hash: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            doc_index,
            source_hash: source_hash.into(),
            module: module.into(),
            forced: false,
            status: UnitStatus::Pending,
        }
    }

    /// Mark as forced: run even when a current output exists
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Move to a new status
    ///
    /// Terminal states are sticky; transitions out of them are ignored.
    pub fn transition(&mut self, status: UnitStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }
}
