/// Service lifecycle plumbing
///
/// Components that own threads or subscriptions implement `Lifecycle`:
/// `start` brings the component up, `stop` winds it down and returns within
/// a bounded time even when a worker is stuck. `join_timeout` is the shared
/// bounded join used by everything that owns a thread.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub trait Lifecycle {
    fn start(&self);
    fn stop(&self);
}

/// Join a worker thread, giving up after `timeout`
///
/// Returns true if the thread finished and was joined; a worker panic is
/// logged and still counts as joined. On timeout the handle is dropped and
/// the thread left detached.
pub fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    if handle.join().is_err() {
        tracing::error!("worker thread panicked before join");
    }
    true
}
