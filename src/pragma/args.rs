//! Directive argument splitting.
//!
//! Directive arguments arrive as one raw string, e.g.
//! `"bin/app.wasm" in "INSTALLFOLDER" dependencySet "tools"`: an optional
//! leading quoted primary value followed by alternating bare names and quoted
//! values. A string without any quotes is all primary.

use std::collections::HashMap;

use anyhow::{Context, Result};

#[derive(Debug, Default)]
pub struct PragmaArgs {
    primary: Option<String>,
    named: HashMap<String, String>,
}

impl PragmaArgs {
    pub fn parse(raw: &str) -> Self {
        let clean = raw.trim();
        let mut named = HashMap::new();

        if !clean.contains('"') {
            return Self {
                primary: (!clean.is_empty()).then(|| clean.to_string()),
                named,
            };
        }

        let bits: Vec<&str> = clean.split('"').filter(|bit| !bit.is_empty()).collect();
        if bits.is_empty() {
            return Self {
                primary: None,
                named,
            };
        }

        let start = usize::from(clean.starts_with('"'));
        let primary = (start == 1).then(|| bits[0].to_string());

        let mut index = start;
        // names and values come in pairs; an unpaired trailing name is dropped
        while index + 1 < bits.len() {
            named.insert(bits[index].trim().to_string(), bits[index + 1].to_string());
            index += 2;
        }

        Self { primary, named }
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// The primary value; missing or blank is a hard error.
    pub fn primary_required(&self) -> Result<&str> {
        self.primary
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .context("expected primary argument, but it was missing")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    pub fn with_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// A named value; missing is a hard error.
    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .with_context(|| format!("expected argument named \"{key}\", but it was missing"))
    }
}
