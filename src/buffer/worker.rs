use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use super::Shared;

/// Why a worker woke up.
#[derive(Default)]
pub(crate) struct WorkerSignal {
    pub(crate) stop: bool,
    pub(crate) flush_requested: bool,
}

pub(crate) fn spawn_flush(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lucent-flush".into())
        .spawn(move || flush_loop(&shared))
}

pub(crate) fn spawn_reopen(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lucent-reopen".into())
        .spawn(move || reopen_loop(&shared))
}

/// Flushes when the size threshold signals or the interval elapses.
fn flush_loop(shared: &Shared) {
    let interval = shared.opts.flush_interval;
    loop {
        {
            let mut signal = shared.signal.lock();
            if !signal.stop && !signal.flush_requested {
                shared.flush_wakeup.wait_for(&mut signal, interval);
            }
            if signal.stop {
                debug!("buffer.flush_worker_exit");
                break;
            }
            signal.flush_requested = false;
        }
        if let Err(err) = shared.flush() {
            if err.is_fatal() {
                error!(error = %err, "buffer.flush_worker_failed");
                break;
            }
            error!(error = %err, "buffer.flush_retry");
        }
    }
}

/// Reloads the reader on a fixed cadence and evicts stale snapshots.
fn reopen_loop(shared: &Shared) {
    let interval = shared.opts.reopen_interval;
    loop {
        {
            let mut signal = shared.signal.lock();
            if !signal.stop {
                shared.reopen_wakeup.wait_for(&mut signal, interval);
            }
            if signal.stop {
                debug!("buffer.reopen_worker_exit");
                break;
            }
        }
        if let Err(err) = shared.reopen() {
            error!(error = %err, "buffer.reopen_failed");
        }
    }
}
