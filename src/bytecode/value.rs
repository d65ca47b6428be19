//! Runtime values for the Tamarin VM.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

/// A runtime value.
///
/// Aggregates are shared by reference and never mutated after
/// construction, so cloning a value is cheap.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(Rc<String>),
    /// Null value
    Null,
    /// Array value
    Array(Rc<Vec<Value>>),
    /// Hash value, keyed by the `HashKey` of each entry's key
    Hash(Rc<IndexMap<HashKey, HashPair>>),
}

/// Type tag for a hash key. Keeps keys of distinct runtime types from
/// colliding even when their 64-bit payloads match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTag {
    Integer,
    Boolean,
    String,
}

/// Derived key for hash entries: a type tag plus a 64-bit payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: KeyTag,
    pub value: u64,
}

/// A hash entry: the original key value alongside the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
        }
    }

    /// Booleans are their own truth value and null is falsy; everything
    /// else (including 0, "" and empty aggregates) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    /// Derive the hash key for this value, or `None` when the type
    /// cannot key a hash.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(value) => Some(HashKey {
                tag: KeyTag::Integer,
                value: *value as u64,
            }),
            Value::Boolean(value) => Some(HashKey {
                tag: KeyTag::Boolean,
                value: *value as u64,
            }),
            Value::String(value) => {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                Some(HashKey {
                    tag: KeyTag::String,
                    value: hasher.finish(),
                })
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Integers, booleans and strings compare by payload; arrays and
    /// hashes by reference identity; null equals null. Values of
    /// different types are unequal, never an error.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
