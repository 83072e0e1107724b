//! External command run once per consumed file.
//!
//! The child's stdout and stderr are merged into one character stream that is
//! scanned for trigger substrings; when one completes, the matching secret is
//! written to the child's stdin. Waiting for exit is bounded, and a child that
//! outlives the bound is left running.

mod args;
mod builder;
mod trigger;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{debug, trace, warn};

pub use args::{CONNECT_PASSWORD, CONNECT_URL, CONNECT_USER, FILE_NAME, FILE_PATH, PARENT_PATH};
pub use builder::PostProcessorBuilder;
pub use trigger::{SecretFn, Trigger, TriggerScanner, TriggerTable};

use crate::defaults::OUTPUT_DRAIN_GRACE;
use crate::PostProcessError;
use args::Placeholders;

const READ_CHUNK: usize = 1024;
const MAX_LOGGED_LINE: usize = 512;

/// Connection settings available to placeholders and prompt answers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("url", &self.url)
            .finish()
    }
}

/// How a post-processing invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessOutcome {
    Exited(ExitStatus),
    /// The wait bound elapsed; the process was left running.
    TimedOut,
    /// The process could not be started or waited on. Already logged.
    Failed,
}

impl PostProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }
}

#[derive(Debug, Clone)]
pub struct PostProcessor {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    max_wait: Duration,
    credentials: Credentials,
    triggers: Vec<Trigger>,
}

impl PostProcessor {
    pub fn builder() -> PostProcessorBuilder {
        PostProcessorBuilder::default()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Runs the command for `file`. Failures are logged here and never returned.
    pub async fn run(&self, file: &Path) -> PostProcessOutcome {
        match self.try_run(file).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(?error, path = ?file, program = %self.program, "post-process command failed");
                PostProcessOutcome::Failed
            }
        }
    }

    async fn try_run(&self, file: &Path) -> Result<PostProcessOutcome, PostProcessError> {
        let placeholders = Placeholders::for_file(file, &self.credentials);
        let program = PathBuf::from(placeholders.substitute(&self.program));
        let args: Vec<String> = self
            .args
            .iter()
            .map(|token| placeholders.substitute(token))
            .collect();

        let mut command = Command::new(&program);
        command.args(&args);
        command.envs(&self.env);
        match self.working_dir.as_deref().or_else(|| file.parent()) {
            Some(dir) if !dir.as_os_str().is_empty() => {
                command.current_dir(dir);
            }
            _ => {}
        }
        command.stdin(if self.triggers.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = spawn_with_retry(&mut command, &program).await?;
        debug!(path = ?file, program = ?program, pid = ?child.id(), "post-process command started");

        let stdout = child
            .stdout
            .take()
            .ok_or(PostProcessError::StdoutUnavailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(PostProcessError::StderrUnavailable)?;
        let stdin = child.stdin.take();

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        tokio::spawn(forward_output(stdout, chunk_tx.clone()));
        tokio::spawn(forward_output(stderr, chunk_tx));
        let scanner = tokio::spawn(scan_output(
            chunk_rx,
            TriggerTable::new(&self.triggers),
            stdin,
        ));

        let status = match wait_bounded(&mut child, self.max_wait).await? {
            Some(status) => status,
            None => {
                warn!(
                    path = ?file,
                    program = ?program,
                    max_wait = ?self.max_wait,
                    "post-process command still running after max wait; not waiting further"
                );
                return Ok(PostProcessOutcome::TimedOut);
            }
        };

        drain_scanner(scanner).await;
        if status.success() {
            debug!(path = ?file, %status, "post-process command finished");
        } else {
            warn!(
                path = ?file,
                program = ?program,
                %status,
                "post-process command exited unsuccessfully"
            );
        }
        Ok(PostProcessOutcome::Exited(status))
    }
}

async fn wait_bounded(
    child: &mut Child,
    max_wait: Duration,
) -> Result<Option<ExitStatus>, PostProcessError> {
    match time::timeout(max_wait, child.wait()).await {
        Ok(status) => status
            .map(Some)
            .map_err(|source| PostProcessError::Wait { source }),
        Err(_) => Ok(None),
    }
}

/// Output can lag the exit status, and a grandchild may hold the pipes open, so the
/// scanner only gets a short grace period after exit.
async fn drain_scanner(scanner: JoinHandle<()>) {
    match time::timeout(OUTPUT_DRAIN_GRACE, scanner).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(?error, "post-process output scanner failed"),
        Err(_) => debug!("post-process output still open after exit; detaching scanner"),
    }
}

/// Retries a spawn that races a just-written executable (`ETXTBSY`).
async fn spawn_with_retry(
    command: &mut Command,
    program: &Path,
) -> Result<Child, PostProcessError> {
    const ETXTBSY: i32 = 26;
    const ATTEMPTS: u32 = 5;

    let mut backoff = Duration::from_millis(2);
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) if source.raw_os_error() == Some(ETXTBSY) && attempt < ATTEMPTS => {
                debug!(program = ?program, attempt, "executable busy; retrying spawn");
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(50));
                attempt += 1;
            }
            Err(source) => {
                return Err(PostProcessError::Spawn {
                    program: program.to_path_buf(),
                    source,
                })
            }
        }
    }
}

async fn forward_output<R>(mut reader: R, chunks: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Decoder::default();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && chunks.send(text).await.is_err() {
                    return;
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                debug!(?error, "post-process output read failed");
                break;
            }
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = chunks.send(rest).await;
    }
}

async fn scan_output(
    mut chunks: mpsc::Receiver<String>,
    mut table: TriggerTable,
    mut stdin: Option<ChildStdin>,
) {
    let mut line = String::new();
    while let Some(chunk) = chunks.recv().await {
        for ch in chunk.chars() {
            if ch == '\n' {
                log_line(&line);
                line.clear();
            } else if line.len() < MAX_LOGGED_LINE {
                line.push(ch);
            }

            for secret in table.feed(ch) {
                answer_prompt(&mut stdin, secret).await;
            }
        }
    }
    if !line.is_empty() {
        log_line(&line);
    }
}

async fn answer_prompt(stdin: &mut Option<ChildStdin>, mut secret: String) {
    let Some(writer) = stdin.as_mut() else {
        return;
    };
    secret.push('\n');
    let written = match writer.write_all(secret.as_bytes()).await {
        Ok(()) => writer.flush().await,
        Err(error) => Err(error),
    };
    match written {
        Ok(()) => debug!("answered post-process prompt"),
        Err(error) => {
            warn!(?error, "failed to answer post-process prompt; closing stdin");
            *stdin = None;
        }
    }
}

fn log_line(line: &str) {
    trace!(line = %line.trim_end_matches('\r'), "post-process output");
}

/// Turns a byte stream into text, keeping a split multi-byte sequence for the next
/// chunk. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match error.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_joins_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "né:".as_bytes();
        assert_eq!(decoder.push(&bytes[..2]), "n");
        assert_eq!(decoder.push(&bytes[2..]), "é:");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.push(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials {
            user: Some("svc".to_string()),
            password: Some("hunter2".to_string()),
            url: Some("ldap://dir".to_string()),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_of_missing_program_is_not_retried() {
        let program = Path::new("/definitely/not/here/import");
        let mut command = Command::new(program);
        let started = std::time::Instant::now();
        let err = spawn_with_retry(&mut command, program).await.unwrap_err();
        assert!(matches!(err, PostProcessError::Spawn { .. }));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_program_is_failed_not_error() {
        let processor = PostProcessor::builder()
            .command(["/definitely/not/here/import"])
            .build()
            .unwrap();
        let outcome = processor.run(Path::new("/tmp/x.csv")).await;
        assert_eq!(outcome, PostProcessOutcome::Failed);
    }
}
