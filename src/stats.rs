use human_duration::human_duration;
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use std::process::ExitStatus;
use std::time::Duration;

/// How a single executor finished.
#[derive(Debug)]
pub enum ExecutorExit {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
}

#[derive(Debug)]
pub struct ExecutorOutcome {
    pub executor_id: usize,
    pub exit: ExecutorExit,
    pub elapsed: Duration,
}

impl ExecutorOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.exit, ExecutorExit::Exited(status) if status.success())
    }
}

impl Display for ExecutorOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "executor {} ", self.executor_id)?;
        match &self.exit {
            ExecutorExit::Exited(status) => write!(f, "{status}")?,
            ExecutorExit::WaitFailed(e) => write!(f, "could not be waited on: {e}")?,
        }
        write!(f, " after {}", human_duration(&self.elapsed))
    }
}

#[derive(Default, Debug)]
pub struct LaunchStats {
    pub succeeded: usize,
    pub failed: Vec<usize>,
    pub slowest: Duration,
    pub total: Duration,
}

impl LaunchStats {
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

impl AddAssign<&ExecutorOutcome> for LaunchStats {
    fn add_assign(&mut self, outcome: &ExecutorOutcome) {
        if outcome.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed.push(outcome.executor_id);
        }
        self.slowest = self.slowest.max(outcome.elapsed);
        self.total += outcome.elapsed;
    }
}

impl Display for LaunchStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "succeeded: {}", self.succeeded)?;
        write!(f, " / failed: {}", self.failed.len())?;
        write!(f, " / slowest: {}", human_duration(&self.slowest))?;
        write!(f, " / executor time: {}", human_duration(&self.total))?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    fn outcome(executor_id: usize, code: i32, secs: u64) -> ExecutorOutcome {
        ExecutorOutcome {
            executor_id,
            exit: ExecutorExit::Exited(ExitStatus::from_raw(code << 8)),
            elapsed: Duration::from_secs(secs),
        }
    }

    #[test]
    fn accumulates_outcomes() {
        let mut stats = LaunchStats::default();
        stats += &outcome(0, 0, 3);
        stats += &outcome(1, 2, 7);
        stats += &outcome(2, 0, 1);

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, vec![1]);
        assert_eq!(stats.finished(), 3);
        assert_eq!(stats.slowest, Duration::from_secs(7));
        assert_eq!(stats.total, Duration::from_secs(11));
    }

    #[test]
    fn wait_errors_count_as_failures() {
        let mut stats = LaunchStats::default();
        stats += &ExecutorOutcome {
            executor_id: 4,
            exit: ExecutorExit::WaitFailed(std::io::Error::other("gone")),
            elapsed: Duration::ZERO,
        };
        assert_eq!(stats.failed, vec![4]);
    }
}
