//! Channel naming.
//!
//! Three-segment names derived from a prefix:
//! - control: `{prefix}/tx`, `{prefix}/rx`
//! - data:    `{prefix}/{namespace}/tx`, `{prefix}/{namespace}/rx`
//!
//! Derivation is pure. The inverse only accepts the exact
//! `{prefix}/{namespace}/tx` shape, so a namespace can never smuggle a
//! separator into another tenant's channel.

use crate::error::{HeraldError, Result};

/// Segment separator inside channel names.
pub const SEPARATOR: char = '/';

pub fn control_tx(prefix: &str) -> String {
    format!("{prefix}/tx")
}

pub fn control_rx(prefix: &str) -> String {
    format!("{prefix}/rx")
}

pub fn data_tx(prefix: &str, namespace: &str) -> String {
    format!("{prefix}/{namespace}/tx")
}

pub fn data_rx(prefix: &str, namespace: &str) -> String {
    format!("{prefix}/{namespace}/rx")
}

/// Recover the namespace from a `{prefix}/{namespace}/tx` channel.
///
/// Returns `None` for control channels, `rx` channels, other prefixes, empty
/// namespaces, and namespaces containing the separator.
pub fn parse_data_channel<'a>(prefix: &str, channel: &'a str) -> Option<&'a str> {
    let ns = channel
        .strip_prefix(prefix)?
        .strip_prefix(SEPARATOR)?
        .strip_suffix("/tx")?;
    if ns.is_empty() || ns.contains(SEPARATOR) {
        return None;
    }
    Some(ns)
}

/// Check that a namespace can be embedded in a channel name.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(HeraldError::InvalidNamespace("namespace must not be empty".into()));
    }
    if namespace.contains(SEPARATOR) {
        return Err(HeraldError::InvalidNamespace(format!(
            "namespace must not contain '{SEPARATOR}': {namespace}"
        )));
    }
    if namespace.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(HeraldError::InvalidNamespace(format!(
            "namespace must not contain whitespace: {namespace:?}"
        )));
    }
    Ok(())
}

/// Check a channel prefix.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(HeraldError::Config("prefix must not be empty".into()));
    }
    if prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(HeraldError::Config(format!(
            "prefix must not contain whitespace: {prefix:?}"
        )));
    }
    Ok(())
}

/// Channel namer bound to one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    prefix: String,
}

impl Channels {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn control_tx(&self) -> String {
        control_tx(&self.prefix)
    }

    pub fn control_rx(&self) -> String {
        control_rx(&self.prefix)
    }

    pub fn data_tx(&self, namespace: &str) -> String {
        data_tx(&self.prefix, namespace)
    }

    pub fn data_rx(&self, namespace: &str) -> String {
        data_rx(&self.prefix, namespace)
    }

    pub fn is_control_tx(&self, channel: &str) -> bool {
        channel
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest == "/tx")
    }

    pub fn parse_data_channel<'a>(&self, channel: &'a str) -> Option<&'a str> {
        parse_data_channel(&self.prefix, channel)
    }
}
