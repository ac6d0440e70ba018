use common::types::MAX_DIMENSIONS;
use indexmap::IndexSet;
use serde::Serialize;

use crate::error::QueryError;
use crate::error::Result;
use crate::filter::values_to_strings;
use crate::filter::PropValueOperation;
use crate::property::PropertyRef;

#[derive(Serialize, Clone, Debug, Hash, Eq, PartialEq)]
pub struct SegmentCondition {
    #[serde(rename = "prop")]
    pub key: String,
    #[serde(rename = "op")]
    pub operation: PropValueOperation,
    pub values: Vec<String>,
}

macro_rules! condition_operations {
    ($($fn_name:ident => $op:ident),+) => {
        $(
            pub fn $fn_name<I, V>(self, property_name: &str, values: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: ToString,
            {
                self.and(property_name, PropValueOperation::$op, values)
            }
        )+
    };
}

/// Top-level audience filter. Conditions are always user properties.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Segment {
    conditions: IndexSet<SegmentCondition>,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &SegmentCondition> {
        self.conditions.iter()
    }

    pub fn and<I, V>(
        mut self,
        property_name: &str,
        operation: PropValueOperation,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.conditions.insert(SegmentCondition {
            key: PropertyRef::user(property_name).key(),
            operation,
            values: values_to_strings(values),
        });
        self
    }

    condition_operations!(
        and_is => Is,
        and_is_not => IsNot,
        and_contains => Contains,
        and_doesnt_contain => DoesNotContain,
        and_less => Less,
        and_less_or_equal => LessOrEqual,
        and_greater => Greater,
        and_greater_or_equal => GreaterOrEqual,
        and_set_is => SetIs,
        and_set_is_not => SetIsNot
    );

    /// `&s=[...]` with each distinct condition once.
    pub fn conditions_url(&self) -> Result<String> {
        let conditions = self
            .conditions
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(format!("&s=[{}]", conditions.join(",")))
    }
}

/// Segment-level (user property) grouping, at most two distinct dimensions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PropertyGroupBy {
    properties: IndexSet<String>,
}

impl PropertyGroupBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_new<I, S>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        properties
            .into_iter()
            .try_fold(Self::new(), |group_by, name| group_by.group_by(name.as_ref()))
    }

    pub fn properties(&self) -> impl Iterator<Item = &String> {
        self.properties.iter()
    }

    pub fn group_by(mut self, property_name: &str) -> Result<Self> {
        let key = PropertyRef::user(property_name).key();
        if self.properties.contains(&key) {
            return Ok(self);
        }
        if self.properties.len() >= MAX_DIMENSIONS {
            return Err(QueryError::TooManyDimensions(MAX_DIMENSIONS));
        }
        self.properties.insert(key);

        Ok(self)
    }

    /// `&g=<a>&g=<b>`, empty when there is nothing to group by.
    pub fn conditions_url(&self) -> String {
        self.properties
            .iter()
            .map(|key| format!("&g={key}"))
            .collect()
    }
}
