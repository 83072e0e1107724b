#![forbid(unsafe_code)]
//! Watched-directory ingestion.
//!
//! A [`Pipeline`] claims files from a directory that other processes may still be
//! writing to, streams each file's records to a [`RecordConsumer`] through a
//! bounded channel fed by a dedicated parse thread, and then disposes of the file:
//! archive, delete, leave it, or hand it to an external [`PostProcessor`].
//!
//! - Claiming relies on OS advisory locks only: a file is eligible while no other
//!   handle holds a conflicting lock on it ([`list_candidates`], [`claim`]).
//! - A [`RetentionSweeper`] removes aged-out directories alongside the pipeline and
//!   never touches the file currently being processed ([`ClaimedFile`]).
//! - The post-processor answers prompts (for example `login:`) found in the
//!   command's output by writing configured secrets to its stdin, and waits a
//!   bounded time for it to exit.
//!
//! The async entry points need tokio's multi-thread runtime.

mod channel;
mod claim;
mod claimed;
mod config;
mod defaults;
mod dispose;
mod error;
mod lock;
mod pipeline;
mod postprocess;
mod sweeper;
mod worker;

pub use channel::BoundedChannel;
pub use claim::{
    claim, list_candidates, prepare_directory, CandidateMetadata, ClaimOrder, FileCandidate,
    NamePattern, SortKey, SortOrder,
};
pub use claimed::ClaimedFile;
pub use config::{
    ConnectionConfig, DispositionConfig, DispositionMode, DropzoneConfig, FormatConfig,
    FormatKind, PatternKind, PostProcessConfig, RetentionConfig, SourceConfig,
};
pub use defaults::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_WAIT, DEFAULT_PATTERN,
    DEFAULT_POLL_INTERVAL,
};
pub use dispose::{Disposition, DispositionOutcome};
pub use error::{
    ClaimError, ConfigError, ConsumerError, DisposeError, PipelineError, PostProcessError,
};
pub use lock::{probe_lock, LockProbe};
pub use pipeline::{
    FileReport, FileState, FormatFactory, Pipeline, PipelineBuilder, RecordConsumer, RunSummary,
};
pub use postprocess::{
    Credentials, PostProcessOutcome, PostProcessor, PostProcessorBuilder, SecretFn, Trigger,
    TriggerScanner, TriggerTable, CONNECT_PASSWORD, CONNECT_URL, CONNECT_USER, FILE_NAME,
    FILE_PATH, PARENT_PATH,
};
pub use sweeper::{RetentionPolicy, RetentionSweeper, SweepReport, SweeperHandle};
pub use worker::{CloseOutcome, ParseError, RecordStream};
