use derive_more::{Display, From};
use internment::Intern;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub use event::Event;
pub use payload::{EventPayload, SystemProperties};

pub mod event;
pub mod payload;

pub type SessionId = String;

/// Value of an event attribute. Numbers are sent as JSON numbers, everything
/// else as JSON strings.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    #[display("{_0}")]
    Number(OrderedFloat<f64>),
    #[display("{_0}")]
    String(String),
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_owned())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Number(OrderedFloat(v))
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        AttributeValue::Number(OrderedFloat(v.into()))
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Number(OrderedFloat(v.into()))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Number(OrderedFloat(v.into()))
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Number(OrderedFloat(v as f64))
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Number(OrderedFloat(v as f64))
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// A named event attribute.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Attribute {
    pub key: Intern<String>,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new<K: AsRef<str>, V: Into<AttributeValue>>(key: K, value: V) -> Self {
        Self {
            key: Intern::new(key.as_ref().to_owned()),
            value: value.into(),
        }
    }
}

impl<K: AsRef<str>, V: Into<AttributeValue>> From<(K, V)> for Attribute {
    fn from((k, v): (K, V)) -> Self {
        Attribute::new(k, v)
    }
}

/// Merges attribute layers in order.
///
/// A key seen in a later layer replaces the earlier value but keeps the
/// position where the key first appeared.
pub fn merge_attributes<'a, I>(layers: I) -> Vec<(Intern<String>, AttributeValue)>
where
    I: IntoIterator<Item = &'a [Attribute]>,
{
    let mut merged: Vec<(Intern<String>, AttributeValue)> = Vec::new();
    for attr in layers.into_iter().flatten() {
        match merged.iter_mut().find(|(k, _)| *k == attr.key) {
            Some((_, v)) => *v = attr.value.clone(),
            None => merged.push((attr.key, attr.value.clone())),
        }
    }
    merged
}
