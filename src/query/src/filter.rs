use serde::Serialize;

use crate::encoding::encode_value;
use crate::property::PropertyRef;
use crate::property::PropertyType;

/// Condition operators. Tokens are sent already percent-encoded.
#[derive(Serialize, Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum PropValueOperation {
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is%20not")]
    IsNot,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "does%20not%20contain")]
    DoesNotContain,
    #[serde(rename = "less")]
    Less,
    #[serde(rename = "less%20or%20equal")]
    LessOrEqual,
    #[serde(rename = "greater")]
    Greater,
    #[serde(rename = "greater%20or%20equal")]
    GreaterOrEqual,
    #[serde(rename = "set%20is")]
    SetIs,
    #[serde(rename = "set%20is%20not")]
    SetIsNot,
}

impl PropValueOperation {
    pub fn token(&self) -> &'static str {
        match self {
            PropValueOperation::Is => "is",
            PropValueOperation::IsNot => "is%20not",
            PropValueOperation::Contains => "contains",
            PropValueOperation::DoesNotContain => "does%20not%20contain",
            PropValueOperation::Less => "less",
            PropValueOperation::LessOrEqual => "less%20or%20equal",
            PropValueOperation::Greater => "greater",
            PropValueOperation::GreaterOrEqual => "greater%20or%20equal",
            PropValueOperation::SetIs => "set%20is",
            PropValueOperation::SetIsNot => "set%20is%20not",
        }
    }
}

pub(crate) fn values_to_strings<I, V>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = V>,
    V: ToString,
{
    values
        .into_iter()
        .map(|v| encode_value(&v.to_string()))
        .collect()
}

/// Event-level property filter.
#[derive(Serialize, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Filter {
    #[serde(rename = "subprop_type")]
    pub typ: PropertyType,
    #[serde(rename = "subprop_key")]
    pub key: String,
    #[serde(rename = "subprop_op")]
    pub operation: PropValueOperation,
    #[serde(rename = "subprop_value")]
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<I, V>(property: &PropertyRef, operation: PropValueOperation, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Filter {
            typ: property.typ(),
            key: property.key(),
            operation,
            values: values_to_strings(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::Filter;
    use crate::filter::PropValueOperation;
    use crate::property::PropertyRef;

    #[test]
    fn test_serialize() {
        let f = Filter::new(&PropertyRef::user("Plan"), PropValueOperation::IsNot, [
            "free", "trial",
        ]);
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"subprop_type":"user","subprop_key":"gp:Plan","subprop_op":"is%20not","subprop_value":["free","trial"]}"#
        );

        let f = Filter::new(&PropertyRef::event("Price"), PropValueOperation::Greater, [
            10, 20,
        ]);
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"subprop_type":"event","subprop_key":"Price","subprop_op":"greater","subprop_value":["10","20"]}"#
        );
    }

    #[test]
    fn test_escaping() {
        let f = Filter::new(&PropertyRef::event("title"), PropValueOperation::Is, [
            r#"say "hi""#,
        ]);
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"subprop_type":"event","subprop_key":"title","subprop_op":"is","subprop_value":["say%20%22hi%22"]}"#
        );
    }

    #[test]
    fn test_tokens_match_serde() {
        for op in [
            PropValueOperation::Is,
            PropValueOperation::IsNot,
            PropValueOperation::Contains,
            PropValueOperation::DoesNotContain,
            PropValueOperation::Less,
            PropValueOperation::LessOrEqual,
            PropValueOperation::Greater,
            PropValueOperation::GreaterOrEqual,
            PropValueOperation::SetIs,
            PropValueOperation::SetIsNot,
        ] {
            assert_eq!(
                serde_json::to_string(&op).unwrap(),
                format!("\"{}\"", op.token())
            );
        }
    }
}
