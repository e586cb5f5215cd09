//! Template expressions: literals and CloudFormation intrinsic functions.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::LogicalId;

/// CloudFormation pseudo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    StackName,
    UrlSuffix,
}

impl Pseudo {
    pub fn name(self) -> &'static str {
        match self {
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Region => "AWS::Region",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::StackName => "AWS::StackName",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

/// A value in a template that is either known now or resolved at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    /// `{"Ref": name}` of a resource, parameter or pseudo parameter.
    Ref(String),
    GetAtt {
        resource: String,
        attribute: String,
    },
    ImportValue(Box<Expr>),
    Join {
        delimiter: String,
        parts: Vec<Expr>,
    },
}

impl Expr {
    pub fn literal(value: impl Into<String>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn reference(id: &LogicalId) -> Self {
        Expr::Ref(id.as_str().to_string())
    }

    pub fn pseudo(param: Pseudo) -> Self {
        Expr::Ref(param.name().to_string())
    }

    pub fn get_att(id: &LogicalId, attribute: impl Into<String>) -> Self {
        Expr::GetAtt {
            resource: id.as_str().to_string(),
            attribute: attribute.into(),
        }
    }

    pub fn import_value(export_name: impl Into<Expr>) -> Self {
        Expr::ImportValue(Box::new(export_name.into()))
    }

    /// Join `parts` with `delimiter`.
    ///
    /// Adjacent literals are folded, so a join made only of literals collapses
    /// into a single literal.
    pub fn join(delimiter: impl Into<String>, parts: Vec<Expr>) -> Self {
        let delimiter = delimiter.into();
        let mut folded: Vec<Expr> = Vec::with_capacity(parts.len());

        for part in parts {
            if let (Some(Expr::Literal(prev)), Expr::Literal(next)) = (folded.last_mut(), &part) {
                prev.push_str(&delimiter);
                prev.push_str(next);
                continue;
            }
            folded.push(part);
        }

        match folded.len() {
            0 => Expr::Literal(String::new()),
            1 => folded.remove(0),
            _ => Expr::Join {
                delimiter,
                parts: folded,
            },
        }
    }

    /// The value if it is known at synthesis time.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// True for an empty literal, which builders treat as "not set".
    pub fn is_blank(&self) -> bool {
        matches!(self, Expr::Literal(value) if value.trim().is_empty())
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(value)
    }
}

impl From<&String> for Expr {
    fn from(value: &String) -> Self {
        Expr::Literal(value.clone())
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expr::Literal(value) => serializer.serialize_str(value),
            Expr::Ref(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", name)?;
                map.end()
            }
            Expr::GetAtt {
                resource,
                attribute,
            } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[resource, attribute])?;
                map.end()
            }
            Expr::ImportValue(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::ImportValue", name)?;
                map.end()
            }
            Expr::Join { delimiter, parts } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &(delimiter, parts))?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_of_literals_collapses() {
        let expr = Expr::join("", vec!["arn:aws:s3:::".into(), "site".into(), "/*".into()]);
        assert_eq!(expr, Expr::literal("arn:aws:s3:::site/*"));
    }

    #[test]
    fn test_join_keeps_tokens() {
        let id = LogicalId::new("Bucket").unwrap();
        let expr = Expr::join(
            "",
            vec!["arn:".into(), "aws".into(), ":s3:::".into(), Expr::reference(&id)],
        );
        assert_eq!(
            serde_json::to_value(&expr).unwrap(),
            json!({"Fn::Join": ["", ["arn:aws:s3:::", {"Ref": "Bucket"}]]})
        );
    }

    #[test]
    fn test_single_token_join_unwraps() {
        let id = LogicalId::new("Oai").unwrap();
        let expr = Expr::join("", vec![Expr::reference(&id)]);
        assert_eq!(expr, Expr::reference(&id));
    }

    #[test]
    fn test_intrinsics_serialize() {
        let id = LogicalId::new("Dist").unwrap();
        assert_eq!(
            serde_json::to_value(Expr::get_att(&id, "DomainName")).unwrap(),
            json!({"Fn::GetAtt": ["Dist", "DomainName"]})
        );
        assert_eq!(
            serde_json::to_value(Expr::import_value("data-bucket")).unwrap(),
            json!({"Fn::ImportValue": "data-bucket"})
        );
        assert_eq!(
            serde_json::to_value(Expr::pseudo(Pseudo::AccountId)).unwrap(),
            json!({"Ref": "AWS::AccountId"})
        );
    }
}
