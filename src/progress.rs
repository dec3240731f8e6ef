// 📣 Progress Channel - best-effort phase notifications
// Coarse-grained updates for an observing UI; delivery failures are logged
// and otherwise ignored, never affecting the pipeline outcome

use crate::payload::Phase;
use anyhow::Result;

/// One coarse-grained progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub step: usize,
    pub total_steps: usize,
}

/// Observer seam for the orchestrator. Implementations may fail freely;
/// the orchestrator swallows errors after logging them.
pub trait ProgressListener {
    fn notify(&mut self, update: &ProgressUpdate) -> Result<()>;
}

/// Console listener in the CLI's reporting style
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl ProgressListener for ConsoleProgress {
    fn notify(&mut self, update: &ProgressUpdate) -> Result<()> {
        println!(
            "  ▸ phase {}/{} [{}] step {}/{}",
            update.phase.number(),
            Phase::ALL.len(),
            update.phase.name(),
            update.step,
            update.total_steps
        );
        Ok(())
    }
}

/// Listener that drops every update (tests, headless runs)
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressListener for NullProgress {
    fn notify(&mut self, _update: &ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

/// Fire-and-forget dispatch: a failing listener never fails the run
pub fn dispatch(listener: &mut dyn ProgressListener, update: ProgressUpdate) {
    if let Err(err) = listener.notify(&update) {
        eprintln!("progress notification dropped: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingListener {
        calls: usize,
    }

    impl ProgressListener for FailingListener {
        fn notify(&mut self, _update: &ProgressUpdate) -> Result<()> {
            self.calls += 1;
            Err(anyhow!("listener is down"))
        }
    }

    #[test]
    fn test_failing_listener_is_non_fatal() {
        let mut listener = FailingListener { calls: 0 };
        dispatch(
            &mut listener,
            ProgressUpdate { phase: Phase::Teams, step: 1, total_steps: 5 },
        );
        assert_eq!(listener.calls, 1);
    }
}
