//! The curl transfer behind one fetch attempt.

use std::cell::{Cell, RefCell};
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use curl::easy::{Easy, WriteError};
use tokio::sync::mpsc::UnboundedSender;

use super::{FetchEvent, FetchJob, FetchOutcome};
use crate::probe::{apply_headers, parse_headers, ResponseHeaders};
use crate::retry::TransferError;
use crate::storage::StorageWriter;
use crate::throttle::ThrottleGate;

/// Why the write callback stopped the transfer.
enum Stop {
    Canceled,
    Failed(TransferError),
}

impl From<curl::Error> for Stop {
    fn from(e: curl::Error) -> Self {
        Stop::Failed(TransferError::Curl(e))
    }
}

/// Fetches `job`'s span into `storage`, one throttled chunk at a time.
///
/// The cancel flag is checked before every chunk and while the connection
/// is idle, so a pause never waits longer than one chunk.
pub fn fetch_segment(
    job: &FetchJob,
    storage: &StorageWriter,
    gate: &ThrottleGate,
    cancel: &AtomicBool,
    events: &UnboundedSender<FetchEvent>,
) -> FetchOutcome {
    match run(job, storage, gate, cancel, events) {
        Ok(()) => FetchOutcome::Completed,
        Err(Stop::Canceled) => FetchOutcome::Canceled,
        Err(Stop::Failed(e)) => FetchOutcome::Errored(e),
    }
}

fn configure(easy: &mut Easy, job: &FetchJob, low_speed_abort: bool) -> Result<(), curl::Error> {
    easy.url(&job.url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(job.timeouts.connect_secs))?;
    // A throttled fetch is slow on purpose.
    if low_speed_abort {
        easy.low_speed_limit(job.timeouts.low_speed_bytes)?;
        easy.low_speed_time(Duration::from_secs(job.timeouts.low_speed_secs))?;
    }
    easy.buffer_size(job.chunk_size)?;
    easy.progress(true)?;
    if job.ranged {
        easy.range(&job.range_spec())?;
    }
    apply_headers(easy, &job.headers, &[])
}

/// Checks the response before any body byte is written.
fn check_response(job: &FetchJob, h: &ResponseHeaders) -> Result<(), TransferError> {
    let status = h.status.unwrap_or(0);
    if !(200..300).contains(&status) {
        return Err(TransferError::Http(status));
    }
    if !job.ranged {
        return Ok(());
    }
    if status != 206 {
        return Err(TransferError::RangeMismatch(format!(
            "asked for bytes {}, got status {}",
            job.range_spec(),
            status
        )));
    }
    match h.content_range {
        Some(cr) if cr.start == job.offset && job.end.map_or(true, |e| cr.end == e) => {}
        Some(cr) => {
            return Err(TransferError::RangeMismatch(format!(
                "asked for bytes {}, got {}-{}",
                job.range_spec(),
                cr.start,
                cr.end
            )))
        }
        None => {
            return Err(TransferError::RangeMismatch(
                "206 response without Content-Range".into(),
            ))
        }
    }
    if let (Some(len), Some(expected)) = (h.content_length, job.expected_len()) {
        if len != expected {
            return Err(TransferError::RangeMismatch(format!(
                "Content-Length {} for a {}-byte range",
                len, expected
            )));
        }
    }
    Ok(())
}

fn run(
    job: &FetchJob,
    storage: &StorageWriter,
    gate: &ThrottleGate,
    cancel: &AtomicBool,
    events: &UnboundedSender<FetchEvent>,
) -> Result<(), Stop> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Stop::Canceled);
    }

    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let checked = Cell::new(false);
    let received = Cell::new(0u64);
    let stopped: RefCell<Option<Stop>> = RefCell::new(None);
    let expected = job.expected_len();

    let mut easy = Easy::new();
    configure(&mut easy, job, gate.limit().is_none())?;
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                let mut lines = lines.borrow_mut();
                if line.starts_with("HTTP/") {
                    lines.clear();
                }
                lines.push(line.to_string());
            }
            true
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.load(Ordering::Relaxed))?;
        transfer.write_function(|data| {
            let stop = |s: Stop| -> Result<usize, WriteError> {
                *stopped.borrow_mut() = Some(s);
                Ok(0)
            };
            if !checked.replace(true) {
                if let Err(e) = check_response(job, &parse_headers(lines.borrow().as_slice())) {
                    return stop(Stop::Failed(e));
                }
            }
            for piece in data.chunks(job.chunk_size) {
                let n = piece.len() as u64;
                if cancel.load(Ordering::Relaxed) || !gate.acquire(n, cancel) {
                    return stop(Stop::Canceled);
                }
                let done = received.get();
                if expected.map_or(false, |exp| done + n > exp) {
                    return stop(Stop::Failed(TransferError::RangeMismatch(
                        "server sent more bytes than requested".into(),
                    )));
                }
                if let Err(e) = storage.write_at(job.offset + done, piece) {
                    return stop(Stop::Failed(TransferError::Storage(e)));
                }
                received.set(done + n);
                let _ = events.send(FetchEvent::Progress {
                    index: job.index,
                    bytes: n,
                });
            }
            Ok(data.len())
        })?;

        if let Err(e) = transfer.perform() {
            // A stop after the last byte still leaves a complete span.
            if checked.get() && stopped.borrow().is_none() && expected == Some(received.get()) {
                return Ok(());
            }
            if cancel.load(Ordering::Relaxed) {
                return Err(Stop::Canceled);
            }
            return Err(stopped.borrow_mut().take().unwrap_or_else(|| Stop::from(e)));
        }
    }

    if !checked.get() {
        check_response(job, &parse_headers(lines.borrow().as_slice())).map_err(Stop::Failed)?;
    }
    let received = received.get();
    if let Some(expected) = expected {
        if received != expected {
            return Err(Stop::Failed(TransferError::PartialTransfer { expected, received }));
        }
    }
    Ok(())
}
