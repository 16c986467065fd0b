//! Cooperative shutdown for the sweep loop.
//!
//! The signal is a channel that never carries a message: triggering drops the
//! sender, which disconnects every [`Shutdown`] receiver at once and for good.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Create a linked trigger and listener.
pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (ShutdownHandle { _tx: tx }, Shutdown { rx })
}

/// Requests shutdown when triggered or dropped.
#[derive(Debug)]
pub struct ShutdownHandle {
    _tx: Sender<()>,
}

impl ShutdownHandle {
    pub fn trigger(self) {
        drop(self);
    }
}

/// Observes a [`ShutdownHandle`].
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: Receiver<()>,
}

impl Shutdown {
    /// Sleep for up to `timeout`. Returns `true` as soon as shutdown is
    /// requested, `false` if the full timeout elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        matches!(
            self.rx.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_times_out_while_armed() {
        let (_handle, shutdown) = channel();
        assert!(!shutdown.is_requested());
        assert!(!shutdown.wait(Duration::from_millis(20)));
    }

    #[test]
    fn trigger_wakes_every_listener() {
        let (handle, shutdown) = channel();
        let other = shutdown.clone();
        let waiter = std::thread::spawn(move || {
            let start = Instant::now();
            let woke = other.wait(Duration::from_secs(30));
            (woke, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        handle.trigger();

        let (woke, elapsed) = waiter.join().unwrap();
        assert!(woke);
        assert!(elapsed < Duration::from_secs(30));
        assert!(shutdown.is_requested());
        assert!(shutdown.wait(Duration::from_secs(30)));
    }
}
