//! TOML configuration for a pipeline.
//!
//! ```toml
//! channel_capacity = 20
//!
//! [source]
//! directory = "/var/spool/in"
//! pattern = "*.csv"
//!
//! [format]
//! kind = "delimited"
//!
//! [disposition]
//! mode = "archive"
//! archive_directory = "/var/spool/archive"
//!
//! [retention]
//! max_age_secs = 604800
//! ```

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use record_formats::{
    DelimitedOptions, DelimitedTextReader, FormatSource, LineEventParser, RawBytesReader,
};
use serde::Deserialize;

use crate::claim::{ClaimOrder, NamePattern, SortKey, SortOrder};
use crate::defaults::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_WAIT, DEFAULT_PATTERN,
    DEFAULT_POLL_INTERVAL,
};
use crate::dispose::Disposition;
use crate::pipeline::Pipeline;
use crate::postprocess::{Credentials, PostProcessor};
use crate::sweeper::RetentionPolicy;
use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropzoneConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    pub source: SourceConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub disposition: DispositionConfig,
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub post_process: Option<PostProcessConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Glob,
    Regex,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub directory: PathBuf,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub pattern_kind: PatternKind,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Delimited,
    Lines,
    Raw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub kind: FormatKind,
    pub delimiter: String,
    /// Empty disables quoting.
    pub quote: String,
    pub header: bool,
    pub schema: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            kind: FormatKind::Delimited,
            delimiter: ",".to_string(),
            quote: "\"".to_string(),
            header: true,
            schema: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionMode {
    #[default]
    Leave,
    Delete,
    Archive,
    Command,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispositionConfig {
    pub mode: DispositionMode,
    pub archive_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    /// Defaults to the archive directory.
    pub directory: Option<PathBuf>,
    pub max_age_secs: i64,
    pub check_interval_secs: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_age_secs: 0,
            check_interval_secs: DEFAULT_CHECK_INTERVAL.as_secs() as i64,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostProcessConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub password_prompt: Option<String>,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_wait_secs() -> u64 {
    DEFAULT_MAX_WAIT.as_secs()
}

impl DropzoneConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("source.directory must not be empty".into()));
        }
        if self.source.pattern.is_empty() {
            return Err(ConfigError::Invalid("source.pattern must not be empty".into()));
        }
        self.name_pattern()?;

        if self.format.kind == FormatKind::Delimited {
            single_char("format.delimiter", &self.format.delimiter)?;
            if !self.format.quote.is_empty() {
                single_char("format.quote", &self.format.quote)?;
            }
            if self.format.delimiter == self.format.quote {
                return Err(ConfigError::Invalid(
                    "format.delimiter and format.quote must differ".into(),
                ));
            }
            if !self.format.header && self.format.schema.is_empty() {
                return Err(ConfigError::Invalid(
                    "format.schema is required when format.header = false".into(),
                ));
            }
        }

        match self.disposition.mode {
            DispositionMode::Archive if self.disposition.archive_directory.is_none() => {
                return Err(ConfigError::Invalid(
                    "disposition.mode = \"archive\" requires disposition.archive_directory".into(),
                ));
            }
            DispositionMode::Command => {
                let has_command = self
                    .post_process
                    .as_ref()
                    .and_then(|post| post.command.first())
                    .is_some_and(|program| !program.trim().is_empty());
                if !has_command {
                    return Err(ConfigError::Invalid(
                        "disposition.mode = \"command\" requires post_process.command".into(),
                    ));
                }
            }
            _ => {}
        }

        if let Some(retention) = &self.retention {
            if retention.max_age_secs > 0 && self.retention_directory().is_none() {
                return Err(ConfigError::Invalid(
                    "retention needs retention.directory or disposition.archive_directory".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn name_pattern(&self) -> Result<NamePattern, ConfigError> {
        let pattern = match self.source.pattern_kind {
            PatternKind::Glob => NamePattern::glob(&self.source.pattern)?,
            PatternKind::Regex => NamePattern::regex(&self.source.pattern)?,
        };
        Ok(pattern)
    }

    pub fn retention_directory(&self) -> Option<&Path> {
        self.retention
            .as_ref()
            .and_then(|retention| retention.directory.as_deref())
            .or(self.disposition.archive_directory.as_deref())
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention
            .as_ref()
            .map(|retention| {
                RetentionPolicy::from_secs(retention.max_age_secs, retention.check_interval_secs)
            })
            .unwrap_or_default()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.connection.user.clone(),
            password: self.connection.password.clone(),
            url: self.connection.url.clone(),
        }
    }

    pub fn delimited_options(&self) -> DelimitedOptions {
        let defaults = DelimitedOptions::default();
        DelimitedOptions {
            delimiter: self.format.delimiter.chars().next().unwrap_or(defaults.delimiter),
            quote: self.format.quote.chars().next(),
            header: self.format.header,
            schema: self.format.schema.clone(),
            ..defaults
        }
    }

    pub fn disposition(&self) -> Result<Disposition, ConfigError> {
        let disposition = match self.disposition.mode {
            DispositionMode::Leave => Disposition::Leave,
            DispositionMode::Delete => Disposition::Delete,
            DispositionMode::Archive => match &self.disposition.archive_directory {
                Some(directory) => Disposition::Archive {
                    directory: directory.clone(),
                },
                None => {
                    return Err(ConfigError::Invalid(
                        "archive disposition without archive_directory".into(),
                    ))
                }
            },
            DispositionMode::Command => Disposition::Command(self.post_processor()?),
        };
        Ok(disposition)
    }

    pub fn post_processor(&self) -> Result<PostProcessor, ConfigError> {
        let Some(post) = &self.post_process else {
            return Err(ConfigError::Invalid("missing [post_process] section".into()));
        };

        let mut builder = PostProcessor::builder()
            .command(post.command.iter().cloned())
            .max_wait(Duration::from_secs(post.max_wait_secs))
            .credentials(self.credentials());
        if let Some(dir) = &post.working_directory {
            builder = builder.working_dir(dir);
        }
        if let Some(prompt) = &post.user_prompt {
            builder = builder.user_prompt(prompt);
        }
        if let Some(prompt) = &post.password_prompt {
            builder = builder.password_prompt(prompt);
        }
        for (key, value) in &post.env {
            builder = builder.env(key, value);
        }
        Ok(builder.build()?)
    }

    /// Builds the pipeline, creating the source directory if needed.
    pub fn into_pipeline(&self) -> Result<Pipeline, ConfigError> {
        let mut builder = Pipeline::builder(&self.source.directory)
            .pattern(self.name_pattern()?)
            .order(ClaimOrder::new(self.source.sort_by, self.source.sort_order))
            .channel_capacity(self.channel_capacity)
            .poll_interval(Duration::from_secs(self.source.poll_interval_secs.max(1)))
            .disposition(self.disposition()?);

        builder = match self.format.kind {
            FormatKind::Delimited => {
                let options = self.delimited_options();
                builder.format(move || {
                    FormatSource::pull(DelimitedTextReader::new(options.clone()))
                })
            }
            FormatKind::Lines => builder.format(|| FormatSource::push(LineEventParser::new())),
            FormatKind::Raw => builder.format(|| FormatSource::pull(RawBytesReader::default())),
        };

        let policy = self.retention_policy();
        if policy.is_enabled() {
            if let Some(directory) = self.retention_directory() {
                builder = builder.retention(directory, policy);
            }
        }

        Ok(builder.build()?)
    }
}

fn single_char(field: &str, value: &str) -> Result<char, ConfigError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be exactly one character, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
channel_capacity = 5

[source]
directory = "/var/spool/in"
pattern = "*.csv"
sort_by = "size"
sort_order = "descending"

[format]
kind = "delimited"
delimiter = ";"
header = false
schema = ["id", "name"]

[disposition]
mode = "command"
archive_directory = "/var/spool/archive"

[retention]
max_age_secs = 604800
check_interval_secs = 0

[connection]
user = "svc"
password = "secret"
url = "ldap://example"

[post_process]
command = ["/usr/local/bin/import", "$FILEPATH$"]
user_prompt = "login:"
password_prompt = "Password:"
max_wait_secs = 30
env = { LANG = "C" }
"#;

    #[test]
    fn parses_full_config() {
        let config = DropzoneConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.channel_capacity, 5);
        assert_eq!(config.source.sort_by, SortKey::Size);
        assert_eq!(config.source.sort_order, SortOrder::Descending);
        assert_eq!(config.source.poll_interval_secs, DEFAULT_POLL_INTERVAL.as_secs());
        assert_eq!(
            config.retention_directory(),
            Some(Path::new("/var/spool/archive"))
        );

        let policy = config.retention_policy();
        assert_eq!(policy.max_age(), Some(Duration::from_secs(604_800)));
        assert_eq!(policy.check_interval(), DEFAULT_CHECK_INTERVAL);

        let options = config.delimited_options();
        assert_eq!(options.delimiter, ';');
        assert_eq!(options.quote, Some('"'));
        assert!(!options.header);

        let processor = config.post_processor().unwrap();
        assert_eq!(processor.max_wait(), Duration::from_secs(30));
        assert_eq!(processor.triggers().len(), 2);
        assert!(!format!("{:?}", config.connection).contains("secret"));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = DropzoneConfig::from_toml_str(
            r#"
[source]
directory = "/in"
"#,
        )
        .unwrap();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.source.pattern, "*");
        assert_eq!(config.format.kind, FormatKind::Delimited);
        assert_eq!(config.disposition.mode, DispositionMode::Leave);
        assert!(!config.retention_policy().is_enabled());
    }

    #[test]
    fn rejects_invalid_settings() {
        let cases = [
            (
                "[source]\ndirectory = \"/in\"\n[format]\ndelimiter = \"::\"\n",
                "format.delimiter",
            ),
            (
                "[source]\ndirectory = \"/in\"\n[disposition]\nmode = \"archive\"\n",
                "archive_directory",
            ),
            (
                "[source]\ndirectory = \"/in\"\n[disposition]\nmode = \"command\"\n",
                "post_process.command",
            ),
            (
                "[source]\ndirectory = \"/in\"\n[format]\nheader = false\n",
                "format.schema",
            ),
            (
                "[source]\ndirectory = \"/in\"\n[retention]\nmax_age_secs = 10\n",
                "retention.directory",
            ),
        ];
        for (raw, needle) in cases {
            match DropzoneConfig::from_toml_str(raw) {
                Err(ConfigError::Invalid(message)) => {
                    assert!(message.contains(needle), "{message} should mention {needle}")
                }
                other => panic!("expected invalid config for {needle}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_regex_and_unknown_keys() {
        let bad_regex = DropzoneConfig::from_toml_str(
            "[source]\ndirectory = \"/in\"\npattern = \"(\"\npattern_kind = \"regex\"\n",
        );
        assert!(matches!(bad_regex, Err(ConfigError::Claim(_))));

        let unknown = DropzoneConfig::from_toml_str("[source]\ndirectory = \"/in\"\nbogus = 1\n");
        assert!(matches!(unknown, Err(ConfigError::Parse(_))));
    }
}
