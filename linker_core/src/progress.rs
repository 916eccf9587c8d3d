//! Progress notifications and cooperative cancellation for long runs.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives advisory progress from linkers and filters.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, message: &str);
    /// Percent complete, 0..=100.
    fn progress(&self, percent: u8);
}

/// Observer that forwards to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn notify(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn progress(&self, percent: u8) {
        tracing::debug!(percent, "progress");
    }
}

/// Optional observer plus optional cancel flag, carried by each run.
#[derive(Clone, Default)]
pub struct RunControl {
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Raise `flag` from another thread to stop the run between frames.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn notify(&self, message: &str) {
        if let Some(obs) = &self.observer {
            obs.notify(message);
        }
    }

    /// Report `done` of `total` steps.
    pub(crate) fn step(&self, done: usize, total: usize) {
        if let Some(obs) = &self.observer {
            let percent = if total == 0 { 100 } else { (100 * done / total).min(100) };
            obs.progress(percent as u8);
        }
    }

    pub(crate) fn check_cancelled(&self, frame: u64) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled(frame)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("observer", &self.observer.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every callback, shared with other modules' tests.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub messages: Mutex<Vec<String>>,
        pub percents: Mutex<Vec<u8>>,
    }

    impl ProgressObserver for Recorder {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
        fn progress(&self, percent: u8) {
            self.percents.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn step_reports_percent() {
        let rec = Arc::new(Recorder::default());
        let ctl = RunControl::new().with_observer(rec.clone());
        ctl.step(0, 4);
        ctl.step(2, 4);
        ctl.step(4, 4);
        ctl.step(0, 0);
        assert_eq!(*rec.percents.lock().unwrap(), vec![0, 50, 100, 100]);
    }

    #[test]
    fn cancel_flag_stops() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctl = RunControl::new().with_cancel_flag(flag.clone());
        assert!(ctl.check_cancelled(0).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(ctl.check_cancelled(3), Err(Error::Cancelled(3))));
    }
}
