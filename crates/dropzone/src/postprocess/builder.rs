use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use super::{Credentials, PostProcessor, SecretFn, Trigger};
use crate::defaults::DEFAULT_MAX_WAIT;
use crate::PostProcessError;

#[derive(Debug, Clone)]
pub struct PostProcessorBuilder {
    pub(crate) command: Vec<String>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) max_wait: Duration,
    pub(crate) credentials: Credentials,
    pub(crate) user_prompt: Option<String>,
    pub(crate) password_prompt: Option<String>,
    pub(crate) triggers: Vec<Trigger>,
}

impl Default for PostProcessorBuilder {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            max_wait: DEFAULT_MAX_WAIT,
            credentials: Credentials::default(),
            user_prompt: None,
            password_prompt: None,
            triggers: Vec::new(),
        }
    }
}

impl PostProcessorBuilder {
    /// Program followed by its argument tokens; tokens may contain placeholders.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, token: impl Into<String>) -> Self {
        self.command.push(token.into());
        self
    }

    /// Defaults to the processed file's parent directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Answers `trigger` with the connection user.
    pub fn user_prompt(mut self, trigger: impl Into<String>) -> Self {
        self.user_prompt = Some(trigger.into());
        self
    }

    /// Answers `trigger` with the connection password.
    pub fn password_prompt(mut self, trigger: impl Into<String>) -> Self {
        self.password_prompt = Some(trigger.into());
        self
    }

    pub fn trigger(mut self, text: impl Into<String>, secret: SecretFn) -> Self {
        self.triggers.push(Trigger::new(text, secret));
        self
    }

    pub fn build(self) -> Result<PostProcessor, PostProcessError> {
        let mut tokens = self.command.into_iter();
        let program = match tokens.next() {
            Some(program) if !program.trim().is_empty() => program,
            _ => return Err(PostProcessError::EmptyCommand),
        };

        let mut triggers = Vec::with_capacity(self.triggers.len() + 2);
        if let Some(text) = self.user_prompt.filter(|text| !text.is_empty()) {
            let user = self.credentials.user.clone().unwrap_or_default();
            triggers.push(Trigger::new(text, Arc::new(move || user.clone())));
        }
        if let Some(text) = self.password_prompt.filter(|text| !text.is_empty()) {
            let password = self.credentials.password.clone().unwrap_or_default();
            triggers.push(Trigger::new(text, Arc::new(move || password.clone())));
        }
        triggers.extend(self.triggers);

        Ok(PostProcessor {
            program,
            args: tokens.collect(),
            working_dir: self.working_dir,
            env: self.env,
            max_wait: self.max_wait,
            credentials: self.credentials,
            triggers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        let err = PostProcessorBuilder::default().build().unwrap_err();
        assert!(matches!(err, PostProcessError::EmptyCommand));

        let blank = PostProcessorBuilder::default().command(["  "]).build();
        assert!(matches!(blank, Err(PostProcessError::EmptyCommand)));
    }

    #[test]
    fn prompts_become_triggers_in_order() {
        let processor = PostProcessorBuilder::default()
            .command(["/bin/import", "$FILEPATH$"])
            .credentials(Credentials {
                user: Some("svc".to_string()),
                password: Some("hunter2".to_string()),
                url: None,
            })
            .password_prompt("Password:")
            .user_prompt("login:")
            .build()
            .unwrap();

        let texts: Vec<&str> = processor.triggers().iter().map(Trigger::text).collect();
        assert_eq!(texts, vec!["login:", "Password:"]);
        assert_eq!(processor.program(), "/bin/import");
        assert_eq!(processor.args(), ["$FILEPATH$".to_string()]);
        assert_eq!(processor.max_wait(), DEFAULT_MAX_WAIT);
    }

    #[test]
    fn debug_output_hides_password() {
        let builder = PostProcessorBuilder::default().credentials(Credentials {
            user: Some("svc".to_string()),
            password: Some("hunter2".to_string()),
            url: None,
        });
        let rendered = format!("{builder:?}");
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }
}
