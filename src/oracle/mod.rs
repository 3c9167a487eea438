//! Naming oracles for merged concepts and relations.
//!
//! The oracle is a text-generation backend wrapped in two questions:
//! "what single phrase summarizes these labels?" and "what is the relation
//! between these two labels?". Answers are expected between a pair of curly
//! braces; anything else is an [`Error::EmptyOrMalformedResponse`].
//!
//! The actual backend (an HTTP LLM client, a scripted stub) is supplied by
//! the caller via [`Completion`] or a direct [`ConceptOracle`] impl, keeping
//! this crate free of network code.
//!
//! Callers should go through [`resolve_concept`] and [`resolve_relation`],
//! which extract the braced answer and retry the whole call exactly once.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Number of oracle invocations before a resolution gives up.
pub const MAX_ATTEMPTS: usize = 2;

/// Answers the two naming questions with raw response text.
pub trait ConceptOracle: Send + Sync {
    /// Summarize a group of labels into one phrase.
    fn summarize(&self, labels: &[&str]) -> Result<String>;

    /// Describe the relation between two labels.
    fn relate(&self, a: &str, b: &str) -> Result<String>;
}

impl<O: ConceptOracle + ?Sized> ConceptOracle for Arc<O> {
    fn summarize(&self, labels: &[&str]) -> Result<String> {
        (**self).summarize(labels)
    }

    fn relate(&self, a: &str, b: &str) -> Result<String> {
        (**self).relate(a, b)
    }
}

/// A raw prompt → response text backend.
pub trait Completion: Send + Sync {
    /// Complete a prompt.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// A function-based completion backend.
#[derive(Clone)]
pub struct FnCompletion<F> {
    f: F,
}

impl<F> FnCompletion<F> {
    /// Create a backend from a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Completion for FnCompletion<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn complete(&self, prompt: &str) -> Result<String> {
        (self.f)(prompt)
    }
}

/// Create a completion backend from a closure.
pub fn from_fn<F>(f: F) -> FnCompletion<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    FnCompletion::new(f)
}

/// Prompt for summarizing `labels`.
pub fn summarize_prompt(labels: &[&str]) -> String {
    let mut joined = String::new();
    for label in labels {
        joined.push_str(label);
        joined.push(';');
    }
    format!(
        "You are a master of summarization. I will give you several phrases separated by ';'. \
         Summarize them into a single short phrase. Return only the summary, wrapped in curly braces.\n\
         The phrases are: {joined}"
    )
}

/// Prompt for relating `a` and `b`.
pub fn relate_prompt(a: &str, b: &str) -> String {
    format!(
        "You are a master of concepts. Give a concrete, concise relation between \"{a}\" and \"{b}\", \
         ideally no more than ten words, wrapped in curly braces, for example \"{{contains}}\"."
    )
}

/// Oracle that phrases both questions as prompts for a [`Completion`]
/// backend.
#[derive(Clone)]
pub struct PromptOracle<C> {
    backend: C,
}

impl<C: Completion> PromptOracle<C> {
    /// Wrap a backend.
    pub fn new(backend: C) -> Self {
        Self { backend }
    }
}

impl<C: Completion> ConceptOracle for PromptOracle<C> {
    fn summarize(&self, labels: &[&str]) -> Result<String> {
        self.backend.complete(&summarize_prompt(labels))
    }

    fn relate(&self, a: &str, b: &str) -> Result<String> {
        self.backend.complete(&relate_prompt(a, b))
    }
}

/// An offline oracle that joins labels (for testing and demos).
#[derive(Debug, Clone)]
pub struct ConcatOracle {
    /// Separator between labels.
    pub separator: String,
    /// Maximum length (truncate if exceeded).
    pub max_len: Option<usize>,
    /// Phrase returned for every relation.
    pub relation: String,
}

impl Default for ConcatOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcatOracle {
    /// Create a concatenation oracle.
    pub fn new() -> Self {
        Self {
            separator: " & ".to_string(),
            max_len: None,
            relation: "related to".to_string(),
        }
    }

    /// Set separator.
    pub fn with_separator(mut self, sep: impl Into<String>) -> Self {
        self.separator = sep.into();
        self
    }

    /// Set maximum length.
    pub fn with_max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Set the relation phrase.
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }
}

impl ConceptOracle for ConcatOracle {
    fn summarize(&self, labels: &[&str]) -> Result<String> {
        let joined = labels.join(&self.separator);
        let summary = match self.max_len {
            Some(max) if joined.chars().count() > max => {
                let mut truncated: String = joined.chars().take(max.saturating_sub(3)).collect();
                truncated.push_str("...");
                truncated
            }
            _ => joined,
        };
        Ok(format!("{{{summary}}}"))
    }

    fn relate(&self, _a: &str, _b: &str) -> Result<String> {
        Ok(format!("{{{}}}", self.relation))
    }
}

/// Extract the answer between the first `{` and the last `}`, with double
/// quotes removed. Missing, misordered or empty braces are malformed.
pub fn extract_braced(response: &str) -> Result<String> {
    let malformed = || Error::EmptyOrMalformedResponse {
        response: response.to_string(),
    };
    let start = response.find('{').ok_or_else(malformed)?;
    let end = response.rfind('}').ok_or_else(malformed)?;
    if start >= end {
        return Err(malformed());
    }
    let answer: String = response[start + 1..end]
        .chars()
        .filter(|&c| c != '"')
        .collect();
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(malformed());
    }
    Ok(answer.to_string())
}

/// Name a group of labels. The name never contains `.`, which separates id
/// segments; any dot in the answer is replaced with `_`.
pub fn resolve_concept(oracle: &dyn ConceptOracle, labels: &[&str]) -> Result<String> {
    let subject = format!("concept for [{}]", labels.join("; "));
    let name = with_retry(&subject, || {
        oracle.summarize(labels).and_then(|r| extract_braced(&r))
    })?;
    Ok(name.replace('.', "_"))
}

/// Name the relation between two labels.
pub fn resolve_relation(oracle: &dyn ConceptOracle, a: &str, b: &str) -> Result<String> {
    let subject = format!("relation between {a:?} and {b:?}");
    with_retry(&subject, || oracle.relate(a, b).and_then(|r| extract_braced(&r)))
}

fn with_retry<F>(subject: &str, mut call: F) -> Result<String>
where
    F: FnMut() -> Result<String>,
{
    let mut last = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match call() {
            Ok(answer) => {
                debug!(subject, attempt, answer = %answer, "oracle resolved");
                return Ok(answer);
            }
            Err(e) => {
                warn!(subject, attempt, error = %e, "oracle attempt failed");
                last = Some(e);
            }
        }
    }
    Err(Error::ConceptResolution {
        subject: subject.to_string(),
        attempts: MAX_ATTEMPTS,
        reason: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned responses in order, then repeats the last one.
    struct Scripted {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut r = self.responses.lock().unwrap();
            if r.len() > 1 {
                Ok(r.pop().unwrap())
            } else {
                Ok(r.last().cloned().unwrap_or_default())
            }
        }
    }

    impl ConceptOracle for Scripted {
        fn summarize(&self, _labels: &[&str]) -> Result<String> {
            self.next()
        }
        fn relate(&self, _a: &str, _b: &str) -> Result<String> {
            self.next()
        }
    }

    #[test]
    fn test_extract_braced() {
        assert_eq!(extract_braced("Sure! {Ocean Data}").unwrap(), "Ocean Data");
        assert_eq!(extract_braced("{\"contains\"}").unwrap(), "contains");
        assert_eq!(extract_braced("{a {b} c}").unwrap(), "a {b} c");
        assert!(extract_braced("no braces").is_err());
        assert!(extract_braced("} backwards {").is_err());
        assert!(extract_braced("{}").is_err());
        assert!(extract_braced("{  }").is_err());
    }

    #[test]
    fn test_retry_once_then_succeed() {
        let oracle = Scripted::new(&["garbage", "{Sea State}"]);
        let name = resolve_concept(&oracle, &["wave", "tide"]).unwrap();
        assert_eq!(name, "Sea State");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_persistent_failure_surfaces() {
        let oracle = Scripted::new(&["garbage"]);
        let err = resolve_relation(&oracle, "a", "b").unwrap_err();
        assert!(matches!(err, Error::ConceptResolution { attempts: 2, .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transport_error_is_retried() {
        let calls = AtomicUsize::new(0);
        let oracle = PromptOracle::new(from_fn(|_prompt: &str| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Oracle("timeout".into()))
            } else {
                Ok("{linked}".to_string())
            }
        }));
        assert_eq!(resolve_relation(&oracle, "a", "b").unwrap(), "linked");
    }

    #[test]
    fn test_concept_names_lose_dots() {
        let oracle = ConcatOracle::new().with_separator(".");
        assert_eq!(resolve_concept(&oracle, &["a", "b"]).unwrap(), "a_b");
    }

    #[test]
    fn test_prompts_carry_labels() {
        let p = summarize_prompt(&["wave", "tide"]);
        assert!(p.ends_with("wave;tide;"));
        let r = relate_prompt("x", "y");
        assert!(r.contains("\"x\"") && r.contains("{contains}"));
    }

    #[test]
    fn test_concat_oracle_truncates() {
        let oracle = ConcatOracle::new().with_separator(", ").with_max_len(8);
        assert_eq!(oracle.summarize(&["alpha", "beta"]).unwrap(), "{alpha...}");
    }
}
