use std::{path::PathBuf, sync::Arc, time::Duration};

use record_formats::{FormatSource, LineEventParser};

use super::{FormatFactory, Pipeline};
use crate::claim::{prepare_directory, ClaimOrder, NamePattern};
use crate::claimed::ClaimedFile;
use crate::defaults::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PATTERN, DEFAULT_POLL_INTERVAL};
use crate::dispose::Disposition;
use crate::sweeper::RetentionPolicy;
use crate::PipelineError;

#[derive(Clone)]
pub struct PipelineBuilder {
    pub(crate) directory: PathBuf,
    pub(crate) pattern: Option<NamePattern>,
    pub(crate) order: ClaimOrder,
    pub(crate) format: Option<FormatFactory>,
    pub(crate) capacity: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) disposition: Disposition,
    pub(crate) retention: Option<(PathBuf, RetentionPolicy)>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("directory", &self.directory)
            .field("pattern", &self.pattern)
            .field("order", &self.order)
            .field("capacity", &self.capacity)
            .field("poll_interval", &self.poll_interval)
            .field("disposition", &self.disposition)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    pub(crate) fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            pattern: None,
            order: ClaimOrder::default(),
            format: None,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            disposition: Disposition::default(),
            retention: None,
        }
    }

    /// Defaults to every file (`*`).
    pub fn pattern(mut self, pattern: NamePattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn order(mut self, order: ClaimOrder) -> Self {
        self.order = order;
        self
    }

    /// Builds a fresh adapter for every claimed file. Defaults to one record per line.
    pub fn format<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> FormatSource + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(factory));
        self
    }

    /// Records buffered between the parse worker and the consumer; 0 is treated as 1.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Sweeps aged-out directories under `directory` while [`Pipeline::run`] is active.
    pub fn retention(mut self, directory: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        self.retention = Some((directory.into(), policy));
        self
    }

    /// Creates the watched directory if it is missing.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let directory = prepare_directory(&self.directory)?;
        let pattern = match self.pattern {
            Some(pattern) => pattern,
            None => NamePattern::glob(DEFAULT_PATTERN)?,
        };
        let format = self
            .format
            .unwrap_or_else(|| Arc::new(|| FormatSource::push(LineEventParser::new())));

        Ok(Pipeline {
            directory,
            pattern,
            order: self.order,
            format,
            capacity: self.capacity.max(1),
            poll_interval: self.poll_interval,
            disposition: self.disposition,
            retention: self.retention,
            claimed: ClaimedFile::new(),
        })
    }
}
