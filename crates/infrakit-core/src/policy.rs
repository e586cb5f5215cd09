//! IAM policy documents.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::BTreeMap;

use crate::{Environment, Expr};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// An S3 canonical user, e.g. a CloudFront origin access identity.
    CanonicalUser(Expr),
    /// An AWS account or IAM entity ARN.
    Aws(Expr),
    /// An AWS service such as `codebuild.amazonaws.com`.
    Service(String),
}

impl Principal {
    pub fn account_root(env: &Environment) -> Self {
        Principal::Aws(env.account_root_arn())
    }

    fn kind(&self) -> &'static str {
        match self {
            Principal::CanonicalUser(_) => "CanonicalUser",
            Principal::Aws(_) => "AWS",
            Principal::Service(_) => "Service",
        }
    }

    fn value(&self) -> Expr {
        match self {
            Principal::CanonicalUser(expr) | Principal::Aws(expr) => expr.clone(),
            Principal::Service(service) => Expr::literal(service),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    pub principals: Vec<Principal>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
            principals: Vec::new(),
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<Expr>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }
}

impl Serialize for PolicyStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Effect", &self.effect)?;
        map.serialize_entry("Action", &OneOrMany(&self.actions))?;
        if !self.resources.is_empty() {
            map.serialize_entry("Resource", &OneOrMany(&self.resources))?;
        }
        if !self.principals.is_empty() {
            let mut grouped: BTreeMap<&str, Vec<Expr>> = BTreeMap::new();
            for principal in &self.principals {
                grouped
                    .entry(principal.kind())
                    .or_default()
                    .push(principal.value());
            }
            let grouped: BTreeMap<&str, OneOrMany<'_, Expr>> = grouped
                .iter()
                .map(|(kind, values)| (*kind, OneOrMany(values)))
                .collect();
            map.serialize_entry("Principal", &grouped)?;
        }
        map.end()
    }
}

/// Serializes a single element bare and anything else as a list, the way IAM
/// documents are usually written.
struct OneOrMany<'a, T>(&'a [T]);

impl<T: Serialize> Serialize for OneOrMany<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement,
        }
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
