//! SSM string parameters, published for lookup by other stacks.

use infrakit_core::error::missing_fields;
use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::info;

use crate::non_blank;

pub const SSM_PARAMETER_TYPE: &str = "AWS::SSM::Parameter";

static PARAMETER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/?[A-Za-z0-9_.\-]+(/[A-Za-z0-9_.\-]+)*$").expect("valid regex"));

/// Type of an SSM parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterType {
    #[default]
    String,
    StringList,
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::String => write!(f, "String"),
            ParameterType::StringList => write!(f, "StringList"),
        }
    }
}

impl std::str::FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(ParameterType::String),
            "stringlist" | "string_list" | "string-list" => Ok(ParameterType::StringList),
            _ => Err(format!("Unknown parameter type: {}", s)),
        }
    }
}

/// Key, value and type in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterProps {
    pub key: String,
    pub value: Expr,
    /// `String` when unset.
    pub parameter_type: Option<ParameterType>,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterBuilder {
    key: Option<String>,
    value: Option<Expr>,
    parameter_type: ParameterType,
}

impl ParameterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parameter_props(self, props: ParameterProps) -> Self {
        self.set_key(props.key)
            .set_value(props.value)
            .set_type(props.parameter_type.unwrap_or_default())
    }

    /// Parameter name, e.g. `/data/app-bucket`.
    pub fn set_key(mut self, key: impl Into<String>) -> Self {
        self.key = non_blank(key);
        self
    }

    pub fn set_value(mut self, value: impl Into<Expr>) -> Self {
        let value = value.into();
        self.value = (!value.is_blank()).then_some(value);
        self
    }

    pub fn set_type(mut self, parameter_type: ParameterType) -> Self {
        self.parameter_type = parameter_type;
        self
    }

    /// Build with the type forced to `String`.
    pub fn build_string_parameter(self, stack: &mut Stack, id: &str) -> Result<StringParameter> {
        self.set_type(ParameterType::String).build(stack, id)
    }

    pub fn build(self, stack: &mut Stack, id: &str) -> Result<StringParameter> {
        let construct_id = format!("{id}-Parameter");
        let (key, value) = match (self.key, self.value) {
            (Some(key), Some(value)) => (key, value),
            (key, value) => {
                return Err(Error::missing(
                    format!("SSM parameter '{construct_id}'"),
                    missing_fields(&[("key", key.is_some()), ("value", value.is_some())]),
                ));
            }
        };
        if !PARAMETER_NAME_RE.is_match(&key) {
            return Err(Error::invalid(
                format!("SSM parameter '{construct_id}' key"),
                format!("'{key}' is not a valid parameter name"),
            ));
        }

        let properties = ParameterProperties {
            name: &key,
            parameter_type: self.parameter_type.to_string(),
            value: &value,
            description: format!("{id}-{}", key.replacen('/', "", 1)),
        };
        let logical_id =
            stack.add_resource(&construct_id, Resource::new(SSM_PARAMETER_TYPE, properties)?)?;

        info!(parameter = %key, parameter_type = %self.parameter_type, logical_id = %logical_id, "built parameter");

        Ok(StringParameter {
            logical_id,
            name: key,
            parameter_type: self.parameter_type,
            value,
        })
    }
}

/// A parameter created in this stack.
#[derive(Debug, Clone)]
pub struct StringParameter {
    pub logical_id: LogicalId,
    pub name: String,
    pub parameter_type: ParameterType,
    pub value: Expr,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterProperties<'a> {
    name: &'a str,
    #[serde(rename = "Type")]
    parameter_type: String,
    value: &'a Expr,
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_core::Environment;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("Test", Environment::agnostic())
    }

    #[test]
    fn test_parameter_type_from_str() {
        assert_eq!("String".parse::<ParameterType>(), Ok(ParameterType::String));
        assert_eq!(
            "string-list".parse::<ParameterType>(),
            Ok(ParameterType::StringList)
        );
        assert!("secure".parse::<ParameterType>().is_err());
    }

    #[test]
    fn test_missing_key_and_value() {
        let mut stack = stack();
        let err = ParameterBuilder::new()
            .set_key("")
            .build(&mut stack, "AppBucket")
            .unwrap_err();

        match err {
            Error::MissingConfiguration { fields, resource } => {
                assert_eq!(fields, vec!["key", "value"]);
                assert!(resource.contains("AppBucket-Parameter"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_description_drops_first_slash() {
        let mut stack = stack();
        let parameter = ParameterBuilder::new()
            .set_parameter_props(ParameterProps {
                key: "/data/app-bucket".to_string(),
                value: Expr::literal("app-bucket-123"),
                parameter_type: Some(ParameterType::StringList),
            })
            .build_string_parameter(&mut stack, "AppBucket")
            .unwrap();

        assert_eq!(parameter.parameter_type, ParameterType::String);
        let resource = stack.resource(&parameter.logical_id).unwrap();
        assert_eq!(
            resource.properties,
            json!({
                "Name": "/data/app-bucket",
                "Type": "String",
                "Value": "app-bucket-123",
                "Description": "AppBucket-data/app-bucket"
            })
        );
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut stack = stack();
        let err = ParameterBuilder::new()
            .set_key("has spaces")
            .set_value("x")
            .build(&mut stack, "Bad")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }
}
