//! IAM roles, referenced by ARN or issued through a [`RoleIssuer`].

use infrakit_core::policy::{PolicyDocument, PolicyStatement, Principal};
use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use serde::Serialize;
use tracing::{debug, info};

pub const ALKS_ROLE_TYPE: &str = "Custom::ALKSRole";
pub const IAM_ROLE_TYPE: &str = "AWS::IAM::Role";

/// Export holding the ARN of the ALKS role-issuing function.
pub const ALKS_SERVICE_TOKEN_EXPORT: &str = "ALKSify-lambda";

/// A named inline policy attached to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePolicy {
    pub name: String,
    pub document: PolicyDocument,
}

/// What a role should look like, independent of who issues it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleProps {
    pub role_name: Option<String>,
    /// Services allowed to assume the role, e.g. `codebuild.amazonaws.com`.
    pub trusted_services: Vec<String>,
    pub managed_policy_arns: Vec<String>,
    pub policies: Vec<InlinePolicy>,
}

impl RoleProps {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            trusted_services: vec![service.into()],
            ..Self::default()
        }
    }

    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    pub fn with_policy(mut self, name: impl Into<String>, statements: Vec<PolicyStatement>) -> Self {
        self.policies.push(InlinePolicy {
            name: name.into(),
            document: PolicyDocument::new(statements),
        });
        self
    }

    fn assume_role_policy(&self) -> PolicyDocument {
        let statement = self.trusted_services.iter().fold(
            PolicyStatement::allow().with_actions(["sts:AssumeRole"]),
            |statement, service| statement.with_principal(Principal::Service(service.clone())),
        );
        PolicyDocument::new(vec![statement])
    }

    fn properties(&self) -> RoleProperties<'_> {
        RoleProperties {
            service_token: None,
            role_name: self.role_name.as_deref(),
            assume_role_policy_document: self.assume_role_policy(),
            managed_policy_arns: &self.managed_policy_arns,
            policies: self
                .policies
                .iter()
                .map(|p| PolicyProperty {
                    policy_name: &p.name,
                    policy_document: &p.document,
                })
                .collect(),
        }
    }
}

/// A role usable by other resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    /// Set when the role resource lives in the current stack.
    pub logical_id: Option<LogicalId>,
    pub arn: Expr,
}

impl RoleHandle {
    /// Reference an existing role by ARN.
    pub fn from_arn(arn: impl Into<Expr>) -> Self {
        Self {
            logical_id: None,
            arn: arn.into(),
        }
    }
}

/// Creates roles on behalf of a stack.
///
/// Failures are returned as-is to the caller; nothing is retried.
pub trait RoleIssuer {
    fn issue(&self, stack: &mut Stack, id: &str, props: &RoleProps) -> Result<RoleHandle>;
}

/// Issues roles through the ALKS custom resource, whose provider function
/// is imported from another stack.
#[derive(Debug, Clone)]
pub struct AlksRoleIssuer {
    service_token_export: String,
}

impl AlksRoleIssuer {
    pub fn new() -> Self {
        Self {
            service_token_export: ALKS_SERVICE_TOKEN_EXPORT.to_string(),
        }
    }

    pub fn with_service_token_export(mut self, export_name: impl Into<String>) -> Self {
        self.service_token_export = export_name.into();
        self
    }
}

impl Default for AlksRoleIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleIssuer for AlksRoleIssuer {
    fn issue(&self, stack: &mut Stack, id: &str, props: &RoleProps) -> Result<RoleHandle> {
        let mut properties = props.properties();
        properties.service_token = Some(Expr::import_value(self.service_token_export.as_str()));

        let logical_id = stack.add_resource(
            &format!("{id}-CustomResource"),
            Resource::new(ALKS_ROLE_TYPE, properties)?,
        )?;
        debug!(logical_id = %logical_id, export = %self.service_token_export, "issued ALKS role");

        Ok(RoleHandle {
            arn: Expr::get_att(&logical_id, "Arn"),
            logical_id: Some(logical_id),
        })
    }
}

/// Issues plain `AWS::IAM::Role` resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct IamRoleIssuer;

impl RoleIssuer for IamRoleIssuer {
    fn issue(&self, stack: &mut Stack, id: &str, props: &RoleProps) -> Result<RoleHandle> {
        let logical_id = stack.add_resource(
            &format!("{id}-Role"),
            Resource::new(IAM_ROLE_TYPE, props.properties())?,
        )?;
        debug!(logical_id = %logical_id, "issued IAM role");

        Ok(RoleHandle {
            arn: Expr::get_att(&logical_id, "Arn"),
            logical_id: Some(logical_id),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleBuilder {
    props: Option<RoleProps>,
}

impl RoleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role_props(mut self, props: RoleProps) -> Self {
        self.props = Some(props);
        self
    }

    pub fn build(self, stack: &mut Stack, id: &str, issuer: &dyn RoleIssuer) -> Result<RoleHandle> {
        let resource = format!("role '{id}'");
        let props = match self.props {
            Some(props) if props.trusted_services.iter().any(|s| !s.trim().is_empty()) => props,
            Some(_) => return Err(Error::missing(resource, vec!["role_props.trusted_services"])),
            None => return Err(Error::missing(resource, vec!["role_props"])),
        };

        let handle = issuer.issue(stack, id, &props)?;
        info!(role = id, arn_known = handle.arn.as_literal().is_some(), "built role");
        Ok(handle)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RoleProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_token: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_name: Option<&'a str>,
    assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    managed_policy_arns: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<PolicyProperty<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyProperty<'a> {
    policy_name: &'a str,
    policy_document: &'a PolicyDocument,
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_core::Environment;
    use serde_json::json;

    struct FailingIssuer;

    impl RoleIssuer for FailingIssuer {
        fn issue(&self, _stack: &mut Stack, id: &str, _props: &RoleProps) -> Result<RoleHandle> {
            Err(Error::lookup("role issuer", id, "function not found"))
        }
    }

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1"))
    }

    #[test]
    fn test_alks_role_uses_imported_service_token() {
        let mut stack = stack();
        let props = RoleProps::for_service("codebuild.amazonaws.com").with_role_name("build-role");

        let role = RoleBuilder::new()
            .set_role_props(props)
            .build(&mut stack, "Build", &AlksRoleIssuer::new())
            .unwrap();

        let id = role.logical_id.clone().unwrap();
        assert_eq!(role.arn, Expr::get_att(&id, "Arn"));

        let resource = stack.resource(&id).unwrap();
        assert_eq!(resource.resource_type, ALKS_ROLE_TYPE);
        assert_eq!(
            resource.properties,
            json!({
                "ServiceToken": {"Fn::ImportValue": "ALKSify-lambda"},
                "RoleName": "build-role",
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": "sts:AssumeRole",
                        "Principal": {"Service": "codebuild.amazonaws.com"}
                    }]
                }
            })
        );
    }

    #[test]
    fn test_iam_role_with_inline_policy() {
        let mut stack = stack();
        let props = RoleProps::for_service("codepipeline.amazonaws.com")
            .with_managed_policy("arn:aws:iam::aws:policy/AWSCodePipelineFullAccess")
            .with_policy(
                "artifacts",
                vec![
                    PolicyStatement::allow()
                        .with_actions(["s3:GetObject"])
                        .with_resource("arn:aws:s3:::artifacts/*"),
                ],
            );

        let role = RoleBuilder::new()
            .set_role_props(props)
            .build(&mut stack, "Pipeline", &IamRoleIssuer)
            .unwrap();

        let resource = stack.resource(role.logical_id.as_ref().unwrap()).unwrap();
        assert_eq!(resource.resource_type, IAM_ROLE_TYPE);
        assert!(resource.properties.get("ServiceToken").is_none());
        assert_eq!(
            resource.properties["Policies"][0]["PolicyName"],
            "artifacts"
        );
        assert_eq!(
            resource.properties["ManagedPolicyArns"],
            json!(["arn:aws:iam::aws:policy/AWSCodePipelineFullAccess"])
        );
    }

    #[test]
    fn test_issuer_failure_propagates_unchanged() {
        let mut stack = stack();
        let err = RoleBuilder::new()
            .set_role_props(RoleProps::for_service("codebuild.amazonaws.com"))
            .build(&mut stack, "Build", &FailingIssuer)
            .unwrap_err();

        match err {
            Error::ExternalLookup { kind, name, .. } => {
                assert_eq!(kind, "role issuer");
                assert_eq!(name, "Build");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(stack.template().resources.is_empty());
    }

    #[test]
    fn test_missing_props() {
        let mut stack = stack();
        let err = RoleBuilder::new()
            .build(&mut stack, "Build", &IamRoleIssuer)
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfiguration { .. }));

        let err = RoleBuilder::new()
            .set_role_props(RoleProps::default())
            .build(&mut stack, "Build", &IamRoleIssuer)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing configuration for role 'Build': role_props.trusted_services"
        );
    }

    #[test]
    fn test_role_from_arn() {
        let role = RoleHandle::from_arn("arn:aws:iam::123456789012:role/codebuild-role");
        assert!(role.logical_id.is_none());
        assert_eq!(
            role.arn.as_literal(),
            Some("arn:aws:iam::123456789012:role/codebuild-role")
        );
    }
}
