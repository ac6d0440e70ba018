use std::fmt;

use common::types::is_system_property;
use common::types::USER_PROPERTY_PREFIX;
use serde::Deserialize;
use serde::Serialize;

use crate::encoding::encode_value;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    User,
    Event,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::User => write!(f, "user"),
            PropertyType::Event => write!(f, "event"),
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum PropertyRef {
    User(String),
    Event(String),
}

impl PropertyRef {
    pub fn user(name: impl Into<String>) -> Self {
        PropertyRef::User(name.into())
    }

    pub fn event(name: impl Into<String>) -> Self {
        PropertyRef::Event(name.into())
    }

    pub fn typ(&self) -> PropertyType {
        match self {
            PropertyRef::User(_) => PropertyType::User,
            PropertyRef::Event(_) => PropertyType::Event,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PropertyRef::User(name) => name,
            PropertyRef::Event(name) => name,
        }
    }

    /// Key as the API expects it: system properties are lower-cased,
    /// custom user properties get the `gp:` prefix. The result is ready to be
    /// placed into a request parameter.
    pub fn key(&self) -> String {
        let name = self.name();
        if is_system_property(name) {
            return name.to_lowercase();
        }

        let name = encode_value(name);
        match self {
            PropertyRef::User(_) => format!("{USER_PROPERTY_PREFIX}{name}"),
            PropertyRef::Event(_) => name,
        }
    }
}
