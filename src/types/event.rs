use crate::types::{merge_attributes, Attribute, AttributeValue};
use chrono::{DateTime, Utc};
use internment::Intern;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Event {
    pub name: Intern<String>,
    pub attributes: Vec<(Intern<String>, AttributeValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current UTC time.
    pub fn new<S: AsRef<str>>(name: S, attributes: &[Attribute]) -> Self {
        Self::with_layers(name, [attributes])
    }

    /// Creates an event whose attributes are the merge of `layers`, see
    /// [`merge_attributes`].
    pub fn with_layers<'a, S, I>(name: S, layers: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = &'a [Attribute]>,
    {
        Self {
            name: Intern::new(name.as_ref().to_owned()),
            attributes: merge_attributes(layers),
            timestamp: Utc::now(),
        }
    }
}
