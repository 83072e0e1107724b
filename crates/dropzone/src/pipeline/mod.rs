mod builder;

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use record_formats::{FormatSource, Record};
use serde::Serialize;
use tokio::{task, time};
use tracing::{debug, info, warn};

pub use builder::PipelineBuilder;

use crate::claim::{claim, list_candidates, ClaimOrder, FileCandidate, NamePattern};
use crate::claimed::ClaimedFile;
use crate::dispose::{Disposition, DispositionOutcome};
use crate::sweeper::{RetentionPolicy, RetentionSweeper, SweeperHandle};
use crate::worker::{CloseOutcome, RecordStream};
use crate::{ConsumerError, PipelineError};

/// Creates the adapter for one claimed file.
pub type FormatFactory = Arc<dyn Fn() -> FormatSource + Send + Sync>;

/// Downstream side of the pipeline; receives records one at a time, in file order.
pub trait RecordConsumer {
    /// Returning an error abandons the rest of the file and leaves it in place.
    fn consume(&mut self, path: &Path, record: Record) -> Result<(), ConsumerError>;

    /// Called once per claimed file after it was disposed of or abandoned.
    fn finish_file(&mut self, _report: &FileReport) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Completed,
    /// Parsing or consuming stopped early; the file stays where it is.
    Failed { reason: String },
}

/// Outcome of processing one claimed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub records: usize,
    pub state: FileState,
    /// `None` for failed files and when disposing of a completed file went wrong.
    pub disposition: Option<DispositionOutcome>,
}

impl FileReport {
    pub fn is_completed(&self) -> bool {
        self.state == FileState::Completed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files: usize,
    pub completed: usize,
    pub failed: usize,
    pub records: usize,
}

impl RunSummary {
    fn record(&mut self, report: &FileReport) {
        self.files += 1;
        self.records += report.records;
        if report.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Claims files from a watched directory one at a time and streams their records to a
/// [`RecordConsumer`].
///
/// Draining happens on the calling runtime worker via `block_in_place`, so the
/// async entry points require tokio's multi-thread runtime.
pub struct Pipeline {
    directory: PathBuf,
    pattern: NamePattern,
    order: ClaimOrder,
    format: FormatFactory,
    capacity: usize,
    poll_interval: Duration,
    disposition: Disposition,
    retention: Option<(PathBuf, RetentionPolicy)>,
    claimed: ClaimedFile,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("directory", &self.directory)
            .field("pattern", &self.pattern.as_str())
            .field("order", &self.order)
            .field("capacity", &self.capacity)
            .field("poll_interval", &self.poll_interval)
            .field("disposition", &self.disposition)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder(directory: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder::new(directory)
    }

    /// Absolute path of the watched directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn claimed(&self) -> &ClaimedFile {
        &self.claimed
    }

    /// Eligible files in the order they would be claimed; `None` if the directory
    /// could not be listed.
    pub fn scan(&self) -> Option<Vec<FileCandidate>> {
        let mut candidates = list_candidates(&self.directory, &self.pattern)?;
        candidates.sort_by(|a, b| self.order.compare(a, b));
        Some(candidates)
    }

    pub fn claim_next(&self) -> Option<FileCandidate> {
        self.claim_excluding(&LeftInPlace::default())
    }

    fn claim_excluding(&self, left: &LeftInPlace) -> Option<FileCandidate> {
        let candidates: Vec<FileCandidate> = list_candidates(&self.directory, &self.pattern)?
            .into_iter()
            .filter(|candidate| !left.skips(candidate))
            .collect();
        claim(candidates, |a, b| self.order.compare(a, b))
    }

    /// Streams every record of `path` into `consumer`, then disposes of the file if
    /// all records were delivered.
    pub async fn process_file<C>(
        &self,
        path: PathBuf,
        consumer: &mut C,
    ) -> Result<FileReport, PipelineError>
    where
        C: RecordConsumer + ?Sized,
    {
        self.claimed.set(&path);
        let report = self.process_claimed(path, consumer).await;
        self.claimed.clear();

        let report = report?;
        consumer.finish_file(&report);
        Ok(report)
    }

    async fn process_claimed<C>(
        &self,
        path: PathBuf,
        consumer: &mut C,
    ) -> Result<FileReport, PipelineError>
    where
        C: RecordConsumer + ?Sized,
    {
        debug!(path = ?path, "claimed file");
        let mut stream =
            RecordStream::open(&path, (self.format)(), self.capacity).map_err(|source| {
                PipelineError::SpawnWorker {
                    path: path.clone(),
                    source,
                }
            })?;

        let state = task::block_in_place(|| {
            let state = drain_stream(&mut stream, consumer);
            if stream.close() == CloseOutcome::JoinedRunning {
                debug!(path = ?path, "parse worker stopped before end of input");
            }
            state
        });
        let records = stream.delivered();
        if let Some(schema) = stream.actual_schema() {
            debug!(path = ?path, ?schema, "file schema");
        }
        drop(stream);

        let disposition = match &state {
            FileState::Completed => match self.disposition.dispose(&path).await {
                Ok(outcome) => Some(outcome),
                Err(error) => {
                    warn!(?error, path = ?path, "failed to dispose of consumed file");
                    None
                }
            },
            FileState::Failed { reason } => {
                warn!(
                    path = ?path,
                    records,
                    %reason,
                    "file processing failed; leaving file in place"
                );
                None
            }
        };

        let completed = state == FileState::Completed;
        info!(path = ?path, records, completed, "file processed");
        Ok(FileReport {
            path,
            records,
            state,
            disposition,
        })
    }

    /// Claims and processes one file. `Ok(None)` when nothing is eligible.
    pub async fn process_next<C>(
        &self,
        consumer: &mut C,
    ) -> Result<Option<FileReport>, PipelineError>
    where
        C: RecordConsumer + ?Sized,
    {
        match self.claim_next() {
            Some(candidate) => self
                .process_file(candidate.into_path(), consumer)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Processes eligible files until none is left. Each file is attempted at most
    /// once per call, so files left in place cannot be picked up again here.
    pub async fn drain_available<C>(&self, consumer: &mut C) -> Result<RunSummary, PipelineError>
    where
        C: RecordConsumer + ?Sized,
    {
        let mut summary = RunSummary::default();
        let mut left = LeftInPlace::default();
        self.drain_with(consumer, &mut left, &mut summary).await?;
        Ok(summary)
    }

    async fn drain_with<C>(
        &self,
        consumer: &mut C,
        left: &mut LeftInPlace,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError>
    where
        C: RecordConsumer + ?Sized,
    {
        while let Some(candidate) = self.claim_excluding(left) {
            let modified = candidate.modified();
            let report = self.process_file(candidate.into_path(), consumer).await?;
            summary.record(&report);
            if report.path.exists() {
                left.remember(report.path.clone(), modified);
            }
        }
        Ok(())
    }

    /// Polls the directory until `shutdown` resolves, with the retention sweeper
    /// running alongside. A file that stays in the directory after processing is only
    /// claimed again once its modification time changes.
    pub async fn run<C, S>(
        &self,
        consumer: &mut C,
        shutdown: S,
    ) -> Result<RunSummary, PipelineError>
    where
        C: RecordConsumer + ?Sized,
        S: Future<Output = ()>,
    {
        let sweeper = self.start_sweeper();
        tokio::pin!(shutdown);

        let mut summary = RunSummary::default();
        let mut left = LeftInPlace::default();
        let result = loop {
            if let Err(error) = self.drain_with(consumer, &mut left, &mut summary).await {
                break Err(error);
            }
            left.forget_missing();

            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = time::sleep(self.poll_interval) => {}
            }
        };

        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
        info!(
            files = summary.files,
            completed = summary.completed,
            failed = summary.failed,
            records = summary.records,
            "pipeline stopped"
        );
        result.map(|()| summary)
    }

    /// A sweeper bound to this pipeline's claimed file, if retention is configured.
    pub fn sweeper(&self) -> Option<RetentionSweeper> {
        self.retention.as_ref().map(|(directory, policy)| {
            RetentionSweeper::new(directory.clone(), *policy, self.claimed.clone())
        })
    }

    pub fn start_sweeper(&self) -> Option<SweeperHandle> {
        self.sweeper()?.start()
    }
}

fn drain_stream<C>(stream: &mut RecordStream, consumer: &mut C) -> FileState
where
    C: RecordConsumer + ?Sized,
{
    loop {
        let record = match stream.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => return FileState::Completed,
            Err(error) => {
                return FileState::Failed {
                    reason: error.to_string(),
                }
            }
        };
        if let Err(error) = consumer.consume(stream.path(), record) {
            return FileState::Failed {
                reason: format!("consumer rejected record: {error}"),
            };
        }
    }
}

/// Files processed earlier that are still in the directory, with the modification
/// time they had when claimed.
#[derive(Debug, Default)]
struct LeftInPlace {
    files: HashMap<PathBuf, Option<SystemTime>>,
}

impl LeftInPlace {
    fn remember(&mut self, path: PathBuf, modified: Option<SystemTime>) {
        self.files.insert(path, modified);
    }

    fn skips(&self, candidate: &FileCandidate) -> bool {
        match self.files.get(candidate.path()) {
            Some(modified) => *modified == candidate.modified(),
            None => false,
        }
    }

    fn forget_missing(&mut self) {
        self.files.retain(|path, _| path.exists());
    }
}
