//! Namespace allowlist compilation and matching.
//!
//! Entries are exact names (`chat`) or prefixes with a trailing wildcard
//! (`game-*`). An empty list admits every namespace.

use herald_core::error::{HeraldError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Exact(String),
    Prefix(String),
}

/// Compiled handshake allowlist.
#[derive(Debug, Clone, Default)]
pub struct NamespaceAllowlist {
    rules: Vec<Rule>,
}

impl NamespaceAllowlist {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(raw.len());
        for s in raw {
            if s.is_empty() {
                return Err(HeraldError::Config("empty handshake_allowlist entry".into()));
            }
            let rule = match s.strip_suffix('*') {
                Some(head) if !head.contains('*') => Rule::Prefix(head.to_string()),
                None if !s.contains('*') => Rule::Exact(s.clone()),
                _ => {
                    return Err(HeraldError::Config(format!(
                        "invalid handshake_allowlist entry: {s} (wildcard only allowed at the end)"
                    )))
                }
            };
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn is_allowed(&self, namespace: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        self.rules.iter().any(|r| match r {
            Rule::Exact(n) => n == namespace,
            Rule::Prefix(p) => namespace.starts_with(p.as_str()),
        })
    }
}
