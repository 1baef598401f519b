//! Device identities: the closed set of robots the dashboard knows about.
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Short token naming one robot, e.g. `R2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Ordered, duplicate-free set of identities fixed at startup.
///
/// Order matters: broadcasts go out in this order and free-text attribution
/// checks prefixes in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSet {
    ids: Vec<DeviceId>,
}

impl DeviceSet {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<DeviceId> = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() || ids.iter().any(|id| id.as_str() == token) {
                continue;
            }
            ids.push(DeviceId::new(token));
        }
        Self { ids }
    }

    /// Exact lookup of a token.
    pub fn get(&self, token: &str) -> Option<&DeviceId> {
        self.ids.iter().find(|id| id.as_str() == token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// First identity (in set order) that `line` starts with.
    pub fn prefix_of(&self, line: &str) -> Option<&DeviceId> {
        self.ids.iter().find(|id| line.starts_with(id.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
