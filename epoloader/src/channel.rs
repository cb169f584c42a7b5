//! Command channel: sentence writer plus background acknowledgment reader.
//!
//! The serial link is split single-writer/single-reader for the life of a
//! session: the orchestrator thread writes commands and frames, one
//! background thread reads receiver chatter. The only shared state is the
//! acknowledgment record, guarded by a mutex and condition variable.
//!
//! The reader never aborts on I/O errors: read timeouts are the normal
//! idle case and anything else is logged at trace level and retried. It
//! terminates only when the stop flag is set, and [`CommandChannel`] joins
//! it before the transport may be closed.

use {
    crate::{
        error::{Error, Result},
        protocol::nmea::{self, ACK_TAG, AckStatus},
    },
    log::{debug, trace, warn},
    std::{
        io::{Read, Write},
        sync::{
            Arc, Condvar, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    },
};

/// Cap on buffered response text while waiting for a complete sentence.
const PENDING_TEXT_LIMIT: usize = 512;

/// Pause after a non-timeout read error before retrying.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Shared acknowledgment record, written only by the background reader.
#[derive(Debug, Default)]
pub struct AckState {
    /// Raw text of the most recent receiver response chunk.
    pub last_response: String,
    /// Classified status of the acknowledgment that completed the wait.
    pub status: Option<AckStatus>,
    completed: bool,
}

struct Shared {
    state: Mutex<AckState>,
    cond: Condvar,
}

/// ASCII command sender with a background acknowledgment reader.
pub struct CommandChannel<W: Write> {
    writer: W,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl<W: Write> CommandChannel<W> {
    /// Start the channel: spawns the background reader on `reader`.
    ///
    /// `writer` and `reader` are typically two handles to the same serial
    /// port; any `Write`/`Read` pair works, which is how the tests drive
    /// the channel without hardware.
    pub fn start<R>(writer: W, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(AckState::default()),
            cond: Condvar::new(),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let thread_shared = Arc::clone(&shared);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || read_loop(reader, &thread_shared, &thread_stop));

        Self {
            writer,
            shared,
            stop,
            reader: Some(handle),
        }
    }

    /// Send a command payload and wait for its acknowledgment.
    ///
    /// On timeout the command is re-sent up to `retries` additional times.
    /// Returns the classified acknowledgment status — including failure
    /// statuses, which still complete the wait; only exhausting every
    /// attempt without any acknowledgment is an error.
    pub fn send_and_wait(
        &mut self,
        payload: &str,
        timeout: Duration,
        retries: u32,
    ) -> Result<AckStatus> {
        let wire = nmea::sentence(payload);
        let attempts = retries + 1;

        for attempt in 1..=attempts {
            {
                let mut state = lock_state(&self.shared);
                state.completed = false;
                state.status = None;
            }

            trace!("-> {}", wire.trim_end());
            self.writer.write_all(wire.as_bytes())?;
            self.writer.flush()?;

            let guard = lock_state(&self.shared);
            let (guard, wait) = self
                .shared
                .cond
                .wait_timeout_while(guard, timeout, |s| !s.completed)
                .unwrap_or_else(PoisonError::into_inner);

            if !wait.timed_out() {
                let status = guard.status.unwrap_or(AckStatus::Success);
                debug!("{payload} acknowledged: {status:?}");
                return Ok(status);
            }

            if attempt < attempts {
                warn!("No acknowledgment for {payload} (attempt {attempt}/{attempts}), resending");
            }
        }

        Err(Error::AckTimeout {
            command: payload.to_string(),
            attempts,
        })
    }

    /// Most recent raw response text seen by the reader.
    pub fn last_response(&self) -> String {
        lock_state(&self.shared).last_response.clone()
    }

    /// Stop the background reader and join it. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("Acknowledgment reader panicked");
            }
        }
    }
}

impl<W: Write> Drop for CommandChannel<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_state(shared: &Shared) -> MutexGuard<'_, AckState> {
    shared
        .state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Background read loop: polls the stop flag once per read, scans the
/// accumulated text for acknowledgments, and wakes the waiter on a match.
fn read_loop<R: Read>(mut reader: R, shared: &Shared, stop: &AtomicBool) {
    let mut buf = [0u8; 1024];
    let mut pending = String::new();

    while !stop.load(Ordering::Relaxed) {
        match reader.read(&mut buf) {
            Ok(0) => thread::sleep(READ_ERROR_BACKOFF),
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                trace!("<- {}", chunk.trim_end());

                // Accumulate across chunk boundaries so a sentence split
                // over two reads is still recognized.
                pending.push_str(&chunk);
                let status = nmea::scan_ack(&pending);

                let mut state = lock_state(shared);
                state.last_response = chunk.into_owned();
                if let Some(status) = status {
                    state.status = Some(status);
                    state.completed = true;
                    pending.clear();
                    shared.cond.notify_one();
                } else if !pending.contains(ACK_TAG) && pending.len() > PENDING_TEXT_LIMIT {
                    let cut = pending.len() - ACK_TAG.len();
                    let cut = pending
                        .char_indices()
                        .map(|(i, _)| i)
                        .rfind(|&i| i <= cut)
                        .unwrap_or(0);
                    pending.drain(..cut);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
            Err(e) => {
                trace!("Read error (ignoring): {e}");
                thread::sleep(READ_ERROR_BACKOFF);
            },
        }
    }
}
