//! Address validation and matching predicates
//!
//! OSC addresses are slash separated paths:
//! ```text
//! /oscillator/4/frequency
//! /live/Note1
//! ```
//!
//! Routes registered with an [`AddressMatcher`] accept every address the
//! predicate accepts. Matchers can be built from:
//! - a plain prefix (`/live/Note` accepts `/live/Note1`, `/live/Note12`)
//! - an OSC address pattern (`*`, `?`, `[a-z]`, `{foo,bar}`)
//! - a regular expression
//! - any closure

use crate::{Error, Result};
use regex_lite::Regex;
use std::fmt;
use std::sync::Arc;

/// Check that `address` can be used as a message address
pub fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }
    if !address.starts_with('/') {
        return Err(Error::InvalidAddress(format!(
            "address must start with '/': {}",
            address
        )));
    }
    if address.as_bytes().contains(&0) {
        return Err(Error::InvalidAddress(format!(
            "address contains a null byte: {:?}",
            address
        )));
    }
    Ok(())
}

/// True if `address` contains OSC pattern characters
pub fn is_pattern(address: &str) -> bool {
    address
        .chars()
        .any(|c| matches!(c, '*' | '?' | '[' | ']' | '{' | '}'))
}

type Predicate = dyn Fn(&str) -> bool + Send + Sync;

/// Shareable address predicate
#[derive(Clone)]
pub struct AddressMatcher {
    description: String,
    predicate: Arc<Predicate>,
}

impl AddressMatcher {
    /// Wrap an arbitrary predicate
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Accept every address starting with `prefix`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(format!("prefix {}", prefix), move |address| {
            address.starts_with(prefix.as_str())
        })
    }

    /// Accept addresses matching an OSC address pattern
    pub fn pattern(pattern: &str) -> Result<Self> {
        validate_address(pattern).map_err(|_| {
            Error::InvalidPattern(format!("pattern must start with '/': {}", pattern))
        })?;
        check_brackets(pattern)?;

        // OSC spells negated character classes as [!..]
        let glob = pattern.replace("[!", "[^");
        Ok(Self::new(format!("pattern {}", pattern), move |address| {
            glob_match::glob_match(&glob, address)
        }))
    }

    /// Accept addresses matching a regular expression
    pub fn regex(expr: &str) -> Result<Self> {
        let regex = Regex::new(expr).map_err(|e| Error::InvalidPattern(e.to_string()))?;
        Ok(Self::new(format!("regex {}", expr), move |address| {
            regex.is_match(address)
        }))
    }

    pub fn matches(&self, address: &str) -> bool {
        (self.predicate)(address)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for AddressMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AddressMatcher")
            .field(&self.description)
            .finish()
    }
}

fn check_brackets(pattern: &str) -> Result<()> {
    let mut square = false;
    let mut curly = false;
    for c in pattern.chars() {
        match c {
            '[' if square || curly => {}
            '[' => square = true,
            ']' if square => square = false,
            '{' if square => {}
            '{' if curly => {
                return Err(Error::InvalidPattern(format!("nested braces: {}", pattern)))
            }
            '{' => curly = true,
            '}' if curly => curly = false,
            ']' | '}' => {
                return Err(Error::InvalidPattern(format!("unbalanced {:?}: {}", c, pattern)))
            }
            _ => {}
        }
    }
    if square || curly {
        return Err(Error::InvalidPattern(format!("unclosed group: {}", pattern)));
    }
    Ok(())
}
