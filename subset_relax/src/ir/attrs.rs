//! Key/value attribute payloads carried by call nodes.

use super::types::DataType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Declared element type of an allocation.
pub const ATTR_DTYPE: &str = "dtype";
/// Byte alignment of a storage allocation.
pub const ATTR_ALIGNMENT: &str = "alignment";
/// Device placement of a storage allocation.
pub const ATTR_DEVICE_TYPE: &str = "device_type";
/// Byte offset of a tensor view into its storage.
pub const ATTR_OFFSET: &str = "offset";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    DType(DataType),
}

/// Attribute map. Insertion order is kept for serialization; equality and
/// hashing look only at the key/value pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attrs(IndexMap<String, AttrValue>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: AttrValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn insert(&mut self, key: &str, value: AttrValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn get_dtype(&self, key: &str) -> Option<DataType> {
        match self.0.get(key)? {
            AttrValue::DType(dt) => Some(*dt),
            AttrValue::Str(s) => s.parse().ok(),
            AttrValue::Int(_) => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }
}

impl PartialEq for Attrs {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }
}

impl Eq for Attrs {}

impl Hash for Attrs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut pairs: Vec<_> = self.0.iter().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs.len().hash(state);
        for (k, v) in pairs {
            k.hash(state);
            v.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHasher;

    fn hash_of(attrs: &Attrs) -> u64 {
        let mut state = FxHasher::default();
        attrs.hash(&mut state);
        state.finish()
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = Attrs::new()
            .with(ATTR_DTYPE, AttrValue::DType(DataType::float(32)))
            .with(ATTR_ALIGNMENT, AttrValue::Int(64));
        let b = Attrs::new()
            .with(ATTR_ALIGNMENT, AttrValue::Int(64))
            .with(ATTR_DTYPE, AttrValue::DType(DataType::float(32)));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        // Serialization keeps the order the keys were added in.
        let keys: Vec<_> = b.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![ATTR_ALIGNMENT, ATTR_DTYPE]);
    }

    #[test]
    fn test_different_values_or_keys_differ() {
        let a = Attrs::new().with(ATTR_ALIGNMENT, AttrValue::Int(64));
        let b = Attrs::new().with(ATTR_ALIGNMENT, AttrValue::Int(128));
        let c = a.clone().with(ATTR_OFFSET, AttrValue::Int(0));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(c, a);
    }

    #[test]
    fn test_typed_getters() {
        let attrs = Attrs::new()
            .with(ATTR_DTYPE, AttrValue::Str("int8".to_string()))
            .with(ATTR_DEVICE_TYPE, AttrValue::Int(2));
        assert_eq!(attrs.get_dtype(ATTR_DTYPE), Some(DataType::int(8)));
        assert_eq!(attrs.get_int(ATTR_DEVICE_TYPE), Some(2));
        assert_eq!(attrs.get_int(ATTR_DTYPE), None);
    }
}
