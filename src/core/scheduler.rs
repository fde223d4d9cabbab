use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A slot holding at most one delayed task. Scheduling again cancels the
/// previous task if its delay has not elapsed yet. Once the delay elapses the
/// work runs as its own task and is no longer cancellable through the slot.
#[derive(Default)]
pub struct DelayedTask {
    handle: Option<JoinHandle<()>>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(work);
        }));
    }

    /// Returns true if a not-yet-started task was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
