use common::types::MAX_DIMENSIONS;
use serde::Serialize;

use crate::encoding::encode_value;
use crate::error::QueryError;
use crate::error::Result;
use crate::filter::Filter;
use crate::filter::PropValueOperation;
use crate::property::PropertyRef;
use crate::property::PropertyType;

#[derive(Serialize, Clone, Debug, Hash, Eq, PartialEq)]
pub struct GroupByDimension {
    #[serde(rename = "type")]
    pub typ: PropertyType,
    #[serde(rename = "value")]
    pub key: String,
}

impl From<&PropertyRef> for GroupByDimension {
    fn from(property: &PropertyRef) -> Self {
        GroupByDimension {
            typ: property.typ(),
            key: property.key(),
        }
    }
}

macro_rules! filter_operations {
    ($($fn_name:ident => $op:ident),+) => {
        $(
            pub fn $fn_name<I, V>(self, property: PropertyRef, values: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: ToString,
            {
                self.and(property, PropValueOperation::$op, values)
            }
        )+
    };
}

/// A single named event with its filters and event-level group-by.
///
/// Builder methods consume the query and return the extended copy, so a query
/// shared between several API calls is never changed behind the caller's back.
#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
pub struct EventQuery {
    event_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    filters: Vec<Filter>,
    #[serde(rename = "group_by", skip_serializing_if = "Vec::is_empty")]
    group_by: Vec<GroupByDimension>,
}

impl EventQuery {
    pub fn new(event_type: impl AsRef<str>) -> Self {
        EventQuery {
            event_type: encode_value(event_type.as_ref()),
            filters: vec![],
            group_by: vec![],
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn dimensions(&self) -> &[GroupByDimension] {
        &self.group_by
    }

    pub fn and<I, V>(
        mut self,
        property: PropertyRef,
        operation: PropValueOperation,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.filters.push(Filter::new(&property, operation, values));
        self
    }

    filter_operations!(
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

    pub fn group_by(mut self, property: PropertyRef) -> Result<Self> {
        if self.group_by.len() >= MAX_DIMENSIONS {
            return Err(QueryError::TooManyDimensions(MAX_DIMENSIONS));
        }
        self.group_by.push(GroupByDimension::from(&property));

        Ok(self)
    }

    pub fn reset_group_by(mut self) -> Self {
        self.group_by.clear();
        self
    }

    /// Renders `{"event_type":..,"filters":[..],"group_by":[..]}`, omitting
    /// empty lists.
    pub fn event_url(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
