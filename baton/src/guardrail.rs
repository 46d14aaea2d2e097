//! Guardrails: content gates checked before every turn.
//!
//! A guardrail is a pure validator over the text of the latest message in
//! the history. The runner checks an agent's guardrails in declaration order
//! at the start of each turn and aborts the run on the first rejection,
//! before the completion provider is called.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use baton::prelude::*;
//!
//! let agent = Agent::builder("support")
//!     .guardrail(KeywordGuardrail::new("privacy", ["ssn", "password"]))
//!     .guardrail(MaxLengthGuardrail::new(4_000))
//!     .build()?;
//! ```
//!
//! Guardrails are synchronous and must not block on I/O. Implementations
//! that need remote checks own their timeouts.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// A guardrail's reason for rejecting content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejection {
    /// Human-readable reason.
    pub reason: String,
}

impl Rejection {
    /// Create a rejection with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a guardrail check.
pub type GuardrailResult = Result<(), Rejection>;

/// A shared dynamic guardrail.
pub type BoxedGuardrail = Arc<dyn Guardrail>;

/// A named content validator.
pub trait Guardrail: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// What the guardrail checks.
    fn description(&self) -> String {
        String::new()
    }

    /// Validate message content.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the content must not proceed.
    fn validate(&self, content: &str) -> GuardrailResult;
}

/// Rejects content containing any of a set of keywords, ignoring case.
#[derive(Debug, Clone)]
pub struct KeywordGuardrail {
    name: String,
    keywords: Vec<String>,
}

impl KeywordGuardrail {
    /// Create a keyword blocklist.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// The normalized keywords.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Guardrail for KeywordGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("blocks content containing: {}", self.keywords.join(", "))
    }

    fn validate(&self, content: &str) -> GuardrailResult {
        let lowered = content.to_lowercase();
        match self.keywords.iter().find(|k| lowered.contains(k.as_str())) {
            Some(keyword) => Err(Rejection::new(format!(
                "content contains blocked keyword: {keyword}"
            ))),
            None => Ok(()),
        }
    }
}

/// Rejects content matching a regular expression.
#[derive(Debug, Clone)]
pub struct PatternGuardrail {
    name: String,
    pattern: Regex,
    reason: String,
}

impl PatternGuardrail {
    /// Compile `pattern` into a guardrail.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(pattern)?;
        Ok(Self {
            name: name.into(),
            reason: format!("content matches forbidden pattern '{pattern}'"),
            pattern,
        })
    }

    /// Override the rejection reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

impl Guardrail for PatternGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("blocks content matching /{}/", self.pattern)
    }

    fn validate(&self, content: &str) -> GuardrailResult {
        if self.pattern.is_match(content) {
            Err(Rejection::new(self.reason.clone()))
        } else {
            Ok(())
        }
    }
}

/// Rejects content longer than a character limit.
#[derive(Debug, Clone, Copy)]
pub struct MaxLengthGuardrail {
    max_chars: usize,
}

impl MaxLengthGuardrail {
    /// Create a length limit in characters.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Guardrail for MaxLengthGuardrail {
    fn name(&self) -> &str {
        "max_length"
    }

    fn description(&self) -> String {
        format!("limits content to {} characters", self.max_chars)
    }

    fn validate(&self, content: &str) -> GuardrailResult {
        let len = content.chars().count();
        if len > self.max_chars {
            Err(Rejection::new(format!(
                "content length {len} exceeds limit {}",
                self.max_chars
            )))
        } else {
            Ok(())
        }
    }
}

/// A guardrail backed by a closure.
pub struct FnGuardrail<F> {
    name: String,
    check: F,
}

impl<F> FnGuardrail<F>
where
    F: Fn(&str) -> GuardrailResult + Send + Sync,
{
    /// Wrap `check` as a guardrail named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for FnGuardrail<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGuardrail")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Guardrail for FnGuardrail<F>
where
    F: Fn(&str) -> GuardrailResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, content: &str) -> GuardrailResult {
        (self.check)(content)
    }
}

/// Check `content` against `guardrails` in order, stopping at the first rejection.
///
/// Returns the failing guardrail's name with its rejection.
pub(crate) fn check_all<'a>(
    guardrails: &'a [BoxedGuardrail],
    content: &str,
) -> Result<(), (&'a str, Rejection)> {
    for guardrail in guardrails {
        guardrail
            .validate(content)
            .map_err(|rejection| (guardrail.name(), rejection))?;
    }
    Ok(())
}
