//! Compensating actions recorded by a workflow and unwound on failure.
//!
//! Each workflow owns its own [`RollbackStack`]. Compensations are plain
//! values so the stack can be inspected in tests; a [`Compensator`] gives
//! them meaning.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::ProvisionError;

/// A single compensating action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Compensation {
    /// Delete every access point of the filesystem, then the filesystem.
    DeleteFileSystem {
        /// Filesystem to remove.
        file_system_id: String,
    },
    /// Delete the listed mount endpoints and wait until the filesystem
    /// reports none.
    DeleteMountEndpoints {
        /// Owning filesystem.
        file_system_id: String,
        /// Endpoints created by the workflow.
        endpoint_ids: Vec<String>,
    },
    /// Delete a single access point.
    DeleteAccessPoint {
        /// Access point to remove.
        access_point_id: String,
    },
}

impl fmt::Display for Compensation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteFileSystem { file_system_id } => {
                write!(formatter, "delete filesystem {file_system_id}")
            }
            Self::DeleteMountEndpoints {
                file_system_id,
                endpoint_ids,
            } => write!(
                formatter,
                "delete mount endpoints [{}] of {file_system_id}",
                endpoint_ids.join(", ")
            ),
            Self::DeleteAccessPoint { access_point_id } => {
                write!(formatter, "delete access point {access_point_id}")
            }
        }
    }
}

/// Future returned by [`Compensator::compensate`].
pub type CompensationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>>;

/// Executes compensating actions.
pub trait Compensator: Send + Sync {
    /// Performs one compensation.
    fn compensate<'a>(&'a self, action: &'a Compensation) -> CompensationFuture<'a>;
}

/// Outcome of unwinding a stack.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollbackReport {
    /// Compensations started before the deadline.
    pub attempted: usize,
    /// Descriptions of compensations that failed.
    pub failures: Vec<String>,
    /// Whether the deadline expired before the stack was exhausted.
    pub timed_out: bool,
}

impl RollbackReport {
    /// One-line description suitable for a task log.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.timed_out {
            return format!(
                "timeout waiting for successful rollback after {} compensation(s)",
                self.attempted
            );
        }
        if self.failures.is_empty() {
            return format!("successfully rolled back {} compensation(s)", self.attempted);
        }
        format!(
            "rolled back {} compensation(s) with failures: {}",
            self.attempted,
            self.failures.join("; ")
        )
    }
}

/// Ordered list of compensations, unwound last-in first-out.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollbackStack {
    actions: Vec<Compensation>,
}

impl RollbackStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Records a compensation.
    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    /// Recorded compensations in registration order.
    #[must_use]
    pub fn actions(&self) -> &[Compensation] {
        &self.actions
    }

    /// Number of recorded compensations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every compensation in reverse registration order within
    /// `deadline`. Failures are recorded and do not stop the remaining
    /// compensations.
    pub async fn unwind(self, compensator: &dyn Compensator, deadline: Duration) -> RollbackReport {
        let mut report = RollbackReport::default();
        let steps = async {
            for action in self.actions.iter().rev() {
                report.attempted += 1;
                info!(%action, "running compensation");
                if let Err(err) = compensator.compensate(action).await {
                    warn!(%action, error = %err, "compensation failed");
                    report.failures.push(format!("{action}: {err}"));
                }
            }
        };

        if timeout(deadline, steps).await.is_err() {
            report.timed_out = true;
            error!(attempted = report.attempted, "timeout waiting for successful rollback");
        } else if report.failures.is_empty() {
            info!(attempted = report.attempted, "successfully rolled back");
        } else {
            warn!(failures = report.failures.len(), "rollback finished with failures");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingCompensator {
        seen: Arc<Mutex<Vec<Compensation>>>,
        failing: Option<String>,
        delay: Duration,
    }

    impl RecordingCompensator {
        fn seen(&self) -> Vec<Compensation> {
            self.seen
                .lock()
                .unwrap_or_else(|err| panic!("lock poisoned: seen: {err}"))
                .clone()
        }
    }

    impl Compensator for RecordingCompensator {
        fn compensate<'a>(&'a self, action: &'a Compensation) -> CompensationFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.seen
                    .lock()
                    .unwrap_or_else(|err| panic!("lock poisoned: compensate: {err}"))
                    .push(action.clone());
                match (&self.failing, action) {
                    (Some(id), Compensation::DeleteAccessPoint { access_point_id })
                        if id == access_point_id =>
                    {
                        Err(ProvisionError::conflict("still in use"))
                    }
                    _ => Ok(()),
                }
            })
        }
    }

    fn access_point(id: &str) -> Compensation {
        Compensation::DeleteAccessPoint {
            access_point_id: id.to_owned(),
        }
    }

    fn stack_of(count: usize) -> RollbackStack {
        let mut stack = RollbackStack::new();
        for index in 0..count {
            stack.push(access_point(&format!("ap-{index}")));
        }
        stack
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    #[tokio::test]
    async fn runs_exactly_k_compensations_in_reverse(#[case] count: usize) {
        let compensator = RecordingCompensator::default();
        let stack = stack_of(count);
        let mut expected = stack.actions().to_vec();
        expected.reverse();

        let report = stack.unwind(&compensator, Duration::from_secs(5)).await;

        assert_eq!(compensator.seen(), expected);
        assert_eq!(report.attempted, count);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn failures_do_not_stop_remaining_compensations() {
        let compensator = RecordingCompensator {
            failing: Some(String::from("ap-1")),
            ..RecordingCompensator::default()
        };

        let report = stack_of(3).unwind(&compensator, Duration::from_secs(5)).await;

        assert_eq!(compensator.seen().len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert!(report.summary().contains("delete access point ap-1"));
    }

    #[tokio::test]
    async fn deadline_bounds_the_whole_stack() {
        let compensator = RecordingCompensator {
            delay: Duration::from_secs(5),
            ..RecordingCompensator::default()
        };

        let report = stack_of(2).unwind(&compensator, Duration::from_millis(20)).await;

        assert!(report.timed_out);
        assert!(compensator.seen().is_empty());
        assert!(report.summary().starts_with("timeout waiting for successful rollback"));
    }

    #[rstest]
    fn describes_mount_endpoint_compensation() {
        let action = Compensation::DeleteMountEndpoints {
            file_system_id: String::from("fs-1"),
            endpoint_ids: vec![String::from("fsmt-1"), String::from("fsmt-2")],
        };
        assert_eq!(
            action.to_string(),
            "delete mount endpoints [fsmt-1, fsmt-2] of fs-1"
        );
    }
}
