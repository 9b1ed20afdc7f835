//! Preemption timer.
//!
//! [`Watchdog::arm`] starts a thread that raises a shared interrupt flag once
//! the deadline passes. The interpreter polls that flag between statements,
//! loop iterations and bulk row operations. Dropping the guard disarms the
//! timer and joins its thread, so no timer outlives the execution on any exit
//! path (completion, fault, panic or timeout).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// RAII guard for one armed preemption timer.
#[derive(Debug)]
pub struct Watchdog {
    interrupt: Arc<AtomicBool>,
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a timer that sets `interrupt` after `timeout`.
    pub fn arm(timeout: Duration, interrupt: Arc<AtomicBool>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<()>();
        let flag = Arc::clone(&interrupt);
        let handle = thread::Builder::new()
            .name("nlytics-watchdog".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                    flag.store(true, Ordering::SeqCst);
                }
            })?;
        Ok(Self {
            interrupt,
            disarm: Some(tx),
            handle: Some(handle),
        })
    }

    /// Whether the deadline passed before the guard was dropped.
    pub fn fired(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Closing the channel wakes the timer thread early.
        drop(self.disarm.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("watchdog thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_fires_after_deadline() {
        let flag = Arc::new(AtomicBool::new(false));
        let dog = Watchdog::arm(Duration::from_millis(20), Arc::clone(&flag)).unwrap();
        thread::sleep(Duration::from_millis(120));
        assert!(dog.fired());
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_disarms_promptly() {
        let flag = Arc::new(AtomicBool::new(false));
        let started = Instant::now();
        let dog = Watchdog::arm(Duration::from_secs(30), Arc::clone(&flag)).unwrap();
        drop(dog);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
