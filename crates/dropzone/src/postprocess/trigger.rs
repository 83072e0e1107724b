use std::{fmt, sync::Arc};

/// Produces the text written to the subprocess when a trigger fires.
pub type SecretFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Tracks how much of one trigger string the output has matched contiguously.
///
/// Deliberately naive: a mismatching character resets the cursor to zero and is not
/// re-tested against the start of the trigger. With trigger `"aa"` the input `"aaa"`
/// fires once, after the second character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerScanner {
    pattern: Vec<char>,
    cursor: usize,
}

impl TriggerScanner {
    pub fn new(trigger: &str) -> Self {
        Self {
            pattern: trigger.chars().collect(),
            cursor: 0,
        }
    }

    /// Feeds one character; returns `true` exactly when the trigger completes.
    pub fn feed(&mut self, ch: char) -> bool {
        let Some(expected) = self.pattern.get(self.cursor) else {
            return false;
        };
        if ch != *expected {
            self.cursor = 0;
            return false;
        }
        self.cursor += 1;
        if self.cursor == self.pattern.len() {
            self.cursor = 0;
            return true;
        }
        false
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// A trigger substring paired with the secret it releases.
#[derive(Clone)]
pub struct Trigger {
    text: String,
    secret: SecretFn,
}

impl Trigger {
    pub fn new(text: impl Into<String>, secret: SecretFn) -> Self {
        Self {
            text: text.into(),
            secret,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

/// Per-invocation scanner state for an ordered set of triggers.
pub struct TriggerTable {
    entries: Vec<(TriggerScanner, SecretFn)>,
}

impl TriggerTable {
    pub fn new(triggers: &[Trigger]) -> Self {
        Self {
            entries: triggers
                .iter()
                .map(|trigger| (TriggerScanner::new(&trigger.text), Arc::clone(&trigger.secret)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feeds `ch` to every scanner in order and returns the secrets of those that
    /// fired.
    pub fn feed(&mut self, ch: char) -> Vec<String> {
        let mut fired = Vec::new();
        for (scanner, secret) in &mut self.entries {
            if scanner.feed(ch) {
                fired.push(secret());
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_positions(trigger: &str, input: &str) -> Vec<usize> {
        let mut scanner = TriggerScanner::new(trigger);
        input
            .chars()
            .enumerate()
            .filter_map(|(idx, ch)| scanner.feed(ch).then_some(idx))
            .collect()
    }

    #[test]
    fn fires_once_right_after_the_colon() {
        let mut scanner = TriggerScanner::new("login:");
        let fired: Vec<usize> = "abclogin:xyz"
            .chars()
            .enumerate()
            .filter_map(|(idx, ch)| scanner.feed(ch).then_some(idx))
            .collect();

        assert_eq!(fired, vec![8]);
        assert_eq!(scanner.cursor(), 0);
    }

    #[test]
    fn repeated_trigger_fires_each_time() {
        assert_eq!(fire_positions("login:", "login:login:"), vec![5, 11]);
    }

    #[test]
    fn repeated_prefix_has_no_fallback() {
        let mut scanner = TriggerScanner::new("aa");
        let fired: Vec<bool> = "aaa".chars().map(|ch| scanner.feed(ch)).collect();
        assert_eq!(fired, vec![false, true, false]);
        assert_eq!(scanner.cursor(), 1);
    }

    #[test]
    fn mismatch_is_not_retested_against_start() {
        // "llogin:" resets on the second 'l' and never recovers.
        assert!(fire_positions("login:", "llogin:").is_empty());
    }

    #[test]
    fn empty_trigger_never_fires() {
        assert!(fire_positions("", "anything").is_empty());
    }

    #[test]
    fn table_reports_secrets_in_trigger_order() {
        let triggers = vec![
            Trigger::new(":", Arc::new(|| "colon".to_string())),
            Trigger::new("d:", Arc::new(|| "password".to_string())),
        ];
        let mut table = TriggerTable::new(&triggers);

        let mut fired = Vec::new();
        for ch in "Password:".chars() {
            fired.extend(table.feed(ch));
        }
        assert_eq!(fired, vec!["colon".to_string(), "password".to_string()]);
    }
}
