//! Status returned by scheduler nodes.

/// The result of evaluating a node's `start` or `update`.
///
/// # Classification
///
/// - [`Status::Completed`] and [`Status::Failed`] are terminal: the node
///   finished, successfully or not, and its parent is notified.
/// - [`Status::Running`] means "call `update` again next step".
/// - [`Status::Suspended`] parks the node off the step queue until something
///   resumes or ends it externally.
/// - [`Status::Aborted`] is terminal and assigned only by the executor while
///   unwinding cancelled subtrees; ordinary node logic never returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    /// The node finished successfully.
    Completed,

    /// The node finished with a logical failure.
    ///
    /// Failure is an expected, recoverable outcome (e.g. a condition that
    /// did not hold); combinators decide whether it propagates.
    Failed,

    /// The node wants another `update` on the next step.
    Running,

    /// The node is parked until it is resumed structurally or force-ended.
    Suspended,

    /// The node was cancelled by the executor.
    Aborted,
}

impl Status {
    /// Returns `true` while the node still has work to do.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, Status::Running | Status::Suspended)
    }

    /// Returns `true` for `Completed`, `Failed` and `Aborted`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Returns `true` if this status is `Completed`.
    #[inline]
    pub fn is_completed(self) -> bool {
        matches!(self, Status::Completed)
    }

    /// Returns `true` if this status is `Failed`.
    #[inline]
    pub fn is_failed(self) -> bool {
        matches!(self, Status::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active_partition_the_statuses() {
        for status in [
            Status::Completed,
            Status::Failed,
            Status::Running,
            Status::Suspended,
            Status::Aborted,
        ] {
            assert_ne!(status.is_active(), status.is_terminal());
        }
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Aborted.is_terminal());
        assert!(Status::Running.is_active());
        assert!(Status::Suspended.is_active());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(Status::Completed.to_string(), "completed");
        assert_eq!(Status::Aborted.to_string(), "aborted");
    }
}
