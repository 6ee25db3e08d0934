use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Timestamps every node carries regardless of kind, in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommonAttrs {
    pub ctime: u64,
    pub mtime: u64,
}

impl CommonAttrs {
    pub fn new(now_ms: u64) -> Self {
        Self {
            ctime: now_ms,
            mtime: now_ms,
        }
    }

    pub fn touched(&self, now_ms: u64) -> Self {
        Self {
            ctime: self.ctime,
            mtime: now_ms,
        }
    }
}

/// Free-form name-to-value extended attributes attached to a node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct XAttrs(BTreeMap<String, Vec<u8>>);

impl XAttrs {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0.get(name).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies a batch of changes atomically: every removal first, then every set, so a
    /// `(remove "x", set "x")` pair in the same change always leaves "x" set.
    pub fn apply(&mut self, change: XAttrsChange) {
        for name in change.remove {
            self.0.remove(&name);
        }
        for (name, value) in change.set {
            self.0.insert(name, value);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct XAttrsChange {
    pub remove: Vec<String>,
    pub set: Vec<(String, Vec<u8>)>,
}

impl XAttrsChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn removing(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    pub fn setting(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_then_set_same_key_leaves_it_set() {
        let mut attrs = XAttrs::default();
        attrs.apply(XAttrsChange::new().setting("a", b"1".to_vec()));

        let change = XAttrsChange::new().removing("a").setting("a", b"2".to_vec());
        attrs.apply(change);

        assert_eq!(attrs.get("a"), Some(b"2".as_slice()));
    }

    #[test]
    fn remove_without_prior_set_is_a_noop() {
        let mut attrs = XAttrs::default();
        attrs.apply(XAttrsChange::new().removing("missing"));
        assert!(attrs.is_empty());
    }
}
