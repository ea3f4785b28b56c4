//! Time-bounded capture of a stream to durable storage
//!
//! A `Recorder` is reusable: each `start` opens one session that appends
//! every delivered value to a buffer, then persists the buffer when the
//! recording window elapses (or the source bus terminates early). The
//! buffer is appended only by the session's own subscription callback and
//! read only by its completion handler.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::error::NeuroError;
use crate::stream_bus::{StreamBus, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RecorderInner {
    active: AtomicBool,
    completed: Notify,
}

/// Reusable time-bounded subscriber; at most one active session at a time.
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

impl Clone for Recorder {
    fn clone(&self) -> Self {
        Recorder {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Recorder {
            inner: Arc::new(RecorderInner {
                active: AtomicBool::new(false),
                completed: Notify::new(),
            }),
        }
    }

    /// Begin capturing `bus` into `path` for `duration`. If a session is
    /// already active this is a warning and a no-op; the first session's
    /// path and buffer are untouched.
    ///
    /// Must be called from within a tokio runtime (the deadline runs as a
    /// spawned task).
    pub fn start<T>(&self, bus: &StreamBus<T>, duration: Duration, path: impl AsRef<Path>)
    where
        T: Clone + Serialize + Send + Sync + 'static,
    {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            warn!("recording already in progress, request ignored");
            return;
        }

        let path = path.as_ref().to_path_buf();
        let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
        let subscription: Arc<Mutex<Option<Subscription<T>>>> = Arc::new(Mutex::new(None));
        let finished = Arc::new(AtomicBool::new(false));

        // Session teardown runs exactly once, whichever of the deadline or
        // a bus terminal event fires first.
        let finish: Arc<dyn Fn() + Send + Sync> = {
            let inner = Arc::clone(&self.inner);
            let buffer = Arc::clone(&buffer);
            let subscription = Arc::clone(&subscription);
            let finished = Arc::clone(&finished);
            Arc::new(move || {
                if finished.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Some(active) = lock(&subscription).take() {
                    active.dispose();
                }
                let captured = std::mem::take(&mut *lock(&buffer));
                persist(&path, &captured);
                inner.active.store(false, Ordering::SeqCst);
                inner.completed.notify_waiters();
            })
        };

        let registered = bus.subscribe_with(
            {
                let buffer = Arc::clone(&buffer);
                move |value: &T| lock(&buffer).push(value.clone())
            },
            Some(Box::new({
                let finish = Arc::clone(&finish);
                move |bus_error: &NeuroError| {
                    warn!(error = %bus_error, "recording source failed, persisting early");
                    finish();
                }
            })),
            Some(Box::new({
                let finish = Arc::clone(&finish);
                move || finish()
            })),
        );
        *lock(&subscription) = Some(registered);

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            finish();
        });
    }

    /// Wait until the current session (if any) has persisted and cleared.
    /// Returns immediately when no session was ever started.
    pub async fn await_completion(&self) {
        loop {
            let notified = self.inner.completed.notified();
            if !self.inner.active.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

/// Sequential numeric-array persistence: the captured values, in delivery
/// order, as one JSON document. I/O failure completes the session anyway.
fn persist<T: Serialize>(path: &PathBuf, values: &[T]) {
    match serde_json::to_vec(values) {
        Ok(encoded) => match std::fs::write(path, encoded) {
            Ok(()) => {
                info!(path = %path.display(), captured = values.len(), "recording complete")
            }
            Err(io_error) => {
                error!(path = %path.display(), error = %io_error, "failed to write recording")
            }
        },
        Err(encode_error) => {
            error!(error = %encode_error, "failed to encode recording")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("neuro_recorder_{}_{}.json", name, std::process::id()))
    }

    fn read_back(path: &PathBuf) -> Vec<i32> {
        let raw = std::fs::read(path).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_records_only_within_window() {
        let bus = StreamBus::new();
        let recorder = Recorder::new();
        let path = temp_path("window");

        recorder.start(&bus, Duration::from_millis(150), &path);
        bus.publish(1);
        bus.publish(2);
        tokio::time::sleep(Duration::from_millis(300)).await;
        bus.publish(3);

        recorder.await_completion().await;
        assert!(!recorder.is_active());
        assert_eq!(read_back(&path), vec![1, 2]);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_second_start_is_noop_while_active() {
        let bus = StreamBus::new();
        let recorder = Recorder::new();
        let first = temp_path("first");
        let second = temp_path("second");

        recorder.start(&bus, Duration::from_millis(150), &first);
        bus.publish(10);
        recorder.start(&bus, Duration::from_millis(150), &second);
        bus.publish(20);

        recorder.await_completion().await;
        assert_eq!(read_back(&first), vec![10, 20]);
        assert!(!second.exists());
        std::fs::remove_file(&first).ok();
    }

    #[tokio::test]
    async fn test_await_without_session_returns_immediately() {
        let recorder = Recorder::new();
        tokio::time::timeout(Duration::from_secs(1), recorder.await_completion())
            .await
            .expect("await_completion must not block without a session");
    }

    #[tokio::test]
    async fn test_source_dispose_persists_early() {
        let bus = StreamBus::new();
        let recorder = Recorder::new();
        let path = temp_path("early");

        recorder.start(&bus, Duration::from_secs(30), &path);
        bus.publish(7);
        bus.dispose();

        tokio::time::timeout(Duration::from_secs(1), recorder.await_completion())
            .await
            .expect("disposing the source must complete the session");
        assert_eq!(read_back(&path), vec![7]);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_recorder_is_reusable_across_sessions() {
        let bus = StreamBus::new();
        let recorder = Recorder::new();
        let path = temp_path("reuse");

        recorder.start(&bus, Duration::from_millis(100), &path);
        bus.publish(1);
        recorder.await_completion().await;

        recorder.start(&bus, Duration::from_millis(100), &path);
        bus.publish(2);
        bus.publish(3);
        recorder.await_completion().await;

        assert_eq!(read_back(&path), vec![2, 3]);
        std::fs::remove_file(&path).ok();
    }
}
