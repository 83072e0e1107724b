use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
};

use record_formats::{FormatError, FormatSource, Record};
use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::BoundedChannel;
use crate::defaults::PARSE_THREAD_NAME;

/// Terminal failure of a parse worker, surfaced to the consumer through the channel.
///
/// Cloneable so the channel can hand the same error out on every call after the
/// queue drained.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("failed to parse `{path}`: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: Arc<FormatError>,
    },
    #[error("parser for `{path}` panicked: {message}")]
    Panicked { path: PathBuf, message: String },
}

/// How [`RecordStream::close`] found the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The worker had already finished on its own.
    Finished,
    /// The worker was still running and had to be joined. Recoverable, but it means
    /// the stream was closed before it was drained.
    JoinedRunning,
    /// `close` was called before.
    AlreadyClosed,
}

type RecordChannel = BoundedChannel<Record, ParseError>;

/// Consumer side of a file being parsed on its own thread.
///
/// [`RecordStream::open`] returns as soon as the worker thread is started; records
/// are pulled with [`RecordStream::next_record`] in the order the adapter produced
/// them. Dropping the stream closes it.
#[derive(Debug)]
pub struct RecordStream {
    path: PathBuf,
    channel: Arc<RecordChannel>,
    schema: Arc<OnceLock<Vec<String>>>,
    worker: Option<JoinHandle<()>>,
    delivered: usize,
}

impl RecordStream {
    /// Starts parsing `path` with `source` on a dedicated thread.
    pub fn open(
        path: impl Into<PathBuf>,
        source: FormatSource,
        capacity: usize,
    ) -> io::Result<Self> {
        let path = path.into();
        let channel = Arc::new(RecordChannel::new(capacity));
        let schema = Arc::new(OnceLock::new());

        let worker = {
            let path = path.clone();
            let channel = Arc::clone(&channel);
            let schema = Arc::clone(&schema);
            thread::Builder::new()
                .name(PARSE_THREAD_NAME.to_string())
                .spawn(move || produce(path, source, channel, schema))?
        };
        debug!(path = ?path, capacity, "parse worker started");

        Ok(Self {
            path,
            channel,
            schema,
            worker: Some(worker),
            delivered: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next record in production order; `Ok(None)` at a clean end of input. After a
    /// parse failure every call returns the same error.
    pub fn next_record(&mut self) -> Result<Option<Record>, ParseError> {
        let next = self.channel.get()?;
        if next.is_some() {
            self.delivered += 1;
        }
        Ok(next)
    }

    /// Records handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Field names reported by the adapter once it opened the file.
    pub fn actual_schema(&self) -> Option<&[String]> {
        self.schema.get().map(Vec::as_slice)
    }

    /// Releases the worker. Blocks until the worker thread has exited; a worker that
    /// is still producing is told to stop first so the join cannot deadlock.
    pub fn close(&mut self) -> CloseOutcome {
        let Some(worker) = self.worker.take() else {
            return CloseOutcome::AlreadyClosed;
        };

        let outcome = if worker.is_finished() {
            CloseOutcome::Finished
        } else {
            warn!(
                path = ?self.path,
                delivered = self.delivered,
                "closing record stream while parse worker is still running; joining"
            );
            self.channel.cancel();
            CloseOutcome::JoinedRunning
        };

        if worker.join().is_err() {
            warn!(path = ?self.path, "parse worker terminated abnormally");
        }
        outcome
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn produce(
    path: PathBuf,
    source: FormatSource,
    channel: Arc<RecordChannel>,
    schema: Arc<OnceLock<Vec<String>>>,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        source.drive(
            &path,
            &mut |names| {
                let _ = schema.set(names);
            },
            &mut |record| channel.put(record),
        )
    }));

    match result {
        Ok(Ok(())) => {
            debug!(path = ?path, "parse worker reached end of input");
            channel.signal_done();
        }
        Ok(Err(source)) => {
            debug!(path = ?path, error = %source, "parse worker failed");
            channel.signal_error(ParseError::Format {
                path,
                source: Arc::new(source),
            });
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(path = ?path, %message, "parser panicked");
            channel.signal_error(ParseError::Panicked { path, message });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
