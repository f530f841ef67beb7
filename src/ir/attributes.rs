//! Out-of-band annotations attached to nodes by rewrite passes.

use std::fmt;

use rustc_hash::FxHashMap;

use super::node::KindTag;

/// Typed key of a synthetic attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    /// Node was produced from untrusted input. Never survives a clone.
    Tainted,
    /// Node was introduced by a rewrite rather than parsed.
    Synthetic,
    /// A pass has already handled this node.
    Processed,
    /// Static type a pass inferred for an expression.
    ResolvedType,
    /// Name of the rule that produced the node.
    RewrittenBy,
    /// Pass-specific key.
    Custom(&'static str),
}

impl AttributeKey {
    /// Whether the attribute is copied onto clones.
    pub fn is_transferable(self) -> bool {
        !matches!(self, AttributeKey::Tainted)
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKey::Custom(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Flag(bool),
    Int(i64),
    Text(String),
    Kind(KindTag),
}

impl AttributeValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Per-node attribute bag, allocated on the first write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticAttributes {
    entries: FxHashMap<AttributeKey, AttributeValue>,
}

impl SyntheticAttributes {
    pub fn with(key: AttributeKey, value: AttributeValue) -> Self {
        let mut attrs = SyntheticAttributes::default();
        attrs.insert(key, value);
        attrs
    }

    pub fn get(&self, key: AttributeKey) -> Option<&AttributeValue> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: AttributeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn insert(&mut self, key: AttributeKey, value: AttributeValue) -> Option<AttributeValue> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: AttributeKey) -> Option<AttributeValue> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeKey, &AttributeValue)> {
        self.entries.iter()
    }

    /// Copy holding only transferable entries, or `None` if nothing remains.
    pub fn transferable_copy(&self) -> Option<SyntheticAttributes> {
        let entries: FxHashMap<_, _> = self
            .entries
            .iter()
            .filter(|(key, _)| key.is_transferable())
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        if entries.is_empty() { None } else { Some(SyntheticAttributes { entries }) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transferable_copy_drops_taint() {
        let mut attrs = SyntheticAttributes::with(AttributeKey::Tainted, AttributeValue::Flag(true));
        assert!(attrs.transferable_copy().is_none());

        attrs.insert(AttributeKey::Custom("origin"), AttributeValue::Text("inline".into()));
        let copy = attrs.transferable_copy().unwrap();
        assert_eq!(copy.len(), 1);
        assert!(!copy.contains(AttributeKey::Tainted));
        assert_eq!(copy.get(AttributeKey::Custom("origin")).and_then(|v| v.as_text()), Some("inline"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut attrs = SyntheticAttributes::default();
        assert!(attrs.is_empty());
        assert_eq!(attrs.insert(AttributeKey::Processed, AttributeValue::Flag(false)), None);
        assert_eq!(
            attrs.insert(AttributeKey::Processed, AttributeValue::Flag(true)),
            Some(AttributeValue::Flag(false))
        );
        assert_eq!(attrs.get(AttributeKey::Processed).and_then(|v| v.as_flag()), Some(true));
        assert_eq!(AttributeKey::Custom("x").to_string(), "x");
        assert_eq!(AttributeKey::Tainted.to_string(), "Tainted");
    }
}
