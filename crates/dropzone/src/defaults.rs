use std::time::Duration;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_PATTERN: &str = "*";
pub(crate) const PARSE_THREAD_NAME: &str = "dropzone-parse";
pub(crate) const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);
