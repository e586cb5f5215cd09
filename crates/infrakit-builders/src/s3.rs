//! S3 buckets and their resource policies.

use infrakit_core::policy::{PolicyDocument, PolicyStatement, Principal};
use infrakit_core::template::Resource;
use infrakit_core::{Environment, Error, Expr, LogicalId, Result, Stack};
use serde::Serialize;
use tracing::info;

use crate::cloudfront::AccessIdentity;
use crate::non_blank;

pub const BUCKET_TYPE: &str = "AWS::S3::Bucket";
pub const BUCKET_POLICY_TYPE: &str = "AWS::S3::BucketPolicy";

/// Server-side encryption of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketEncryption {
    /// Keys managed by S3 (SSE-S3, `AES256`).
    #[default]
    S3Managed,
}

impl BucketEncryption {
    fn sse_algorithm(self) -> &'static str {
        match self {
            BucketEncryption::S3Managed => "AES256",
        }
    }
}

/// The frozen configuration of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub encryption: BucketEncryption,
    pub versioned: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BucketProperties<'a> {
    bucket_name: &'a str,
    bucket_encryption: EncryptionProperty,
    #[serde(skip_serializing_if = "Option::is_none")]
    versioning_configuration: Option<VersioningConfiguration>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptionProperty {
    server_side_encryption_configuration: Vec<EncryptionRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptionRule {
    server_side_encryption_by_default: EncryptionByDefault,
}

#[derive(Serialize)]
struct EncryptionByDefault {
    #[serde(rename = "SSEAlgorithm")]
    sse_algorithm: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VersioningConfiguration {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BucketPolicyProperties<'a> {
    bucket: Expr,
    policy_document: &'a PolicyDocument,
}

/// A reference to a bucket, owned by this stack or imported by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub name: Expr,
    pub arn: Expr,
    /// `<bucket>.s3.amazonaws.com`, used by CloudFront access logging.
    pub domain_name: Expr,
    /// `<bucket>.s3.<region>.amazonaws.com`, used by S3 origins.
    pub regional_domain_name: Expr,
}

impl BucketRef {
    /// Reference an existing bucket by name.
    pub fn from_name(env: &Environment, name: impl Into<Expr>) -> Self {
        let name = name.into();
        let regional_domain_name = Expr::join(
            "",
            vec![
                name.clone(),
                Expr::literal(".s3."),
                env.region_expr(),
                Expr::literal(".amazonaws.com"),
            ],
        );
        Self {
            arn: Expr::join(
                "",
                vec![
                    Expr::literal(format!("arn:{}:s3:::", env.partition)),
                    name.clone(),
                ],
            ),
            domain_name: Expr::join("", vec![name.clone(), Expr::literal(".s3.amazonaws.com")]),
            regional_domain_name,
            name,
        }
    }

    /// The ARN matching every object in the bucket.
    pub fn objects_arn(&self) -> Expr {
        Expr::join("", vec![self.arn.clone(), Expr::literal("/*")])
    }
}

/// Builds an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct S3BucketBuilder {
    bucket_name: Option<String>,
    versioned: bool,
}

impl S3BucketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the globally unique bucket name.
    pub fn set_bucket_name(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = non_blank(bucket_name);
        self
    }

    pub fn set_versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn build(self, stack: &mut Stack, id: &str) -> Result<Bucket> {
        let construct_id = format!("{id}-Bucket");
        let Some(bucket_name) = self.bucket_name else {
            return Err(Error::missing(
                format!("S3 bucket '{construct_id}'"),
                vec!["bucket_name"],
            ));
        };

        let spec = BucketSpec {
            name: bucket_name,
            encryption: BucketEncryption::S3Managed,
            versioned: self.versioned,
        };

        let properties = BucketProperties {
            bucket_name: &spec.name,
            bucket_encryption: EncryptionProperty {
                server_side_encryption_configuration: vec![EncryptionRule {
                    server_side_encryption_by_default: EncryptionByDefault {
                        sse_algorithm: spec.encryption.sse_algorithm(),
                    },
                }],
            },
            versioning_configuration: spec
                .versioned
                .then_some(VersioningConfiguration { status: "Enabled" }),
        };
        let logical_id =
            stack.add_resource(&construct_id, Resource::new(BUCKET_TYPE, properties)?.retained())?;

        info!(bucket = %spec.name, logical_id = %logical_id, versioned = spec.versioned, "built bucket");

        let reference = BucketRef {
            name: Expr::reference(&logical_id),
            arn: BucketRef::from_name(stack.env(), spec.name.as_str()).arn,
            domain_name: Expr::get_att(&logical_id, "DomainName"),
            regional_domain_name: Expr::get_att(&logical_id, "RegionalDomainName"),
        };

        Ok(Bucket {
            construct_id,
            logical_id,
            spec,
            reference,
            policy: None,
            statements: Vec::new(),
        })
    }
}

/// A bucket created in this stack.
#[derive(Debug, Clone)]
pub struct Bucket {
    construct_id: String,
    logical_id: LogicalId,
    spec: BucketSpec,
    reference: BucketRef,
    policy: Option<LogicalId>,
    statements: Vec<PolicyStatement>,
}

impl Bucket {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn spec(&self) -> &BucketSpec {
        &self.spec
    }

    pub fn reference(&self) -> &BucketRef {
        &self.reference
    }

    /// Logical id of the bucket policy, once a statement has been added.
    pub fn policy_id(&self) -> Option<&LogicalId> {
        self.policy.as_ref()
    }

    pub fn policy_statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Append a statement to the bucket policy, creating the policy on first use.
    pub fn add_to_resource_policy(
        &mut self,
        stack: &mut Stack,
        statement: PolicyStatement,
    ) -> Result<()> {
        let mut statements = self.statements.clone();
        statements.push(statement);
        let document = PolicyDocument::new(statements.clone());
        let properties = BucketPolicyProperties {
            bucket: Expr::reference(&self.logical_id),
            policy_document: &document,
        };

        match &self.policy {
            Some(policy_id) => {
                let resource = stack.resource_mut(policy_id).ok_or_else(|| {
                    Error::invalid("bucket policy", format!("{policy_id} is not in the stack"))
                })?;
                resource.properties = serde_json::to_value(properties)?;
            }
            None => {
                let policy_id = stack.add_resource(
                    &format!("{}-Policy", self.construct_id),
                    Resource::new(BUCKET_POLICY_TYPE, properties)?,
                )?;
                self.policy = Some(policy_id);
            }
        }
        self.statements = statements;
        Ok(())
    }

    /// Let a CloudFront origin access identity read objects while the account
    /// root keeps write access.
    ///
    /// Adds exactly two statements: `s3:GetObject` for the identity's canonical
    /// user on `<bucket>/*`, and `s3:PutObject` + `s3:PutObjectAcl` for the
    /// account root on the bucket and its objects.
    pub fn add_cloudfront_origin_access_identity(
        &mut self,
        stack: &mut Stack,
        identity: &AccessIdentity,
    ) -> Result<&mut Self> {
        let arn = self.reference.arn.clone();
        let objects = self.reference.objects_arn();

        let read = PolicyStatement::allow()
            .with_actions(["s3:GetObject"])
            .with_resource(objects.clone())
            .with_principal(Principal::CanonicalUser(identity.canonical_user_id.clone()));

        let write = PolicyStatement::allow()
            .with_actions(["s3:PutObject", "s3:PutObjectAcl"])
            .with_resource(arn)
            .with_resource(objects)
            .with_principal(Principal::account_root(stack.env()));

        self.add_to_resource_policy(stack, read)?;
        self.add_to_resource_policy(stack, write)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CloudFrontBuilder;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1"))
    }

    #[test]
    fn test_build_requires_bucket_name() {
        let mut stack = stack();
        let err = S3BucketBuilder::new().build(&mut stack, "Site").unwrap_err();

        match err {
            Error::MissingConfiguration { fields, resource } => {
                assert_eq!(fields, vec!["bucket_name"]);
                assert!(resource.contains("Site-Bucket"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_bucket_name_is_missing() {
        let mut stack = stack();
        let result = S3BucketBuilder::new()
            .set_bucket_name("  ")
            .build(&mut stack, "Site");
        assert!(matches!(result, Err(Error::MissingConfiguration { .. })));
    }

    #[test]
    fn test_bucket_properties() {
        let mut stack = stack();
        let bucket = S3BucketBuilder::new()
            .set_bucket_name("test-bucket")
            .set_versioned(true)
            .build(&mut stack, "Site")
            .unwrap();

        assert_eq!(bucket.spec().encryption, BucketEncryption::S3Managed);
        let resource = stack.resource(bucket.logical_id()).unwrap();
        assert_eq!(resource.resource_type, BUCKET_TYPE);
        assert_eq!(
            resource.properties,
            json!({
                "BucketName": "test-bucket",
                "BucketEncryption": {
                    "ServerSideEncryptionConfiguration": [
                        {"ServerSideEncryptionByDefault": {"SSEAlgorithm": "AES256"}}
                    ]
                },
                "VersioningConfiguration": {"Status": "Enabled"}
            })
        );
    }

    #[test]
    fn test_origin_access_identity_policy_has_two_statements() {
        let mut stack = stack();
        let oai = CloudFrontBuilder::build_origin_access_identity(&mut stack, "Site", None)
            .unwrap();
        let mut bucket = S3BucketBuilder::new()
            .set_bucket_name("test-bucket")
            .build(&mut stack, "Site")
            .unwrap();

        bucket
            .add_cloudfront_origin_access_identity(&mut stack, &oai)
            .unwrap();

        let statements = bucket.policy_statements();
        assert_eq!(statements.len(), 2);

        assert_eq!(statements[0].actions, vec!["s3:GetObject"]);
        assert_eq!(
            statements[0].resources,
            vec![Expr::literal("arn:aws:s3:::test-bucket/*")]
        );
        assert_eq!(
            statements[0].principals,
            vec![Principal::CanonicalUser(oai.canonical_user_id.clone())]
        );

        assert_eq!(statements[1].actions, vec!["s3:PutObject", "s3:PutObjectAcl"]);
        assert_eq!(
            statements[1].resources,
            vec![
                Expr::literal("arn:aws:s3:::test-bucket"),
                Expr::literal("arn:aws:s3:::test-bucket/*"),
            ]
        );
        assert_eq!(
            statements[1].principals,
            vec![Principal::Aws(Expr::literal("arn:aws:iam::123456789012:root"))]
        );
    }

    #[test]
    fn test_policy_resource_tracks_statements() {
        let mut stack = stack();
        let oai = CloudFrontBuilder::build_origin_access_identity(&mut stack, "Site", None)
            .unwrap();
        let mut bucket = S3BucketBuilder::new()
            .set_bucket_name("test-bucket")
            .build(&mut stack, "Site")
            .unwrap();
        bucket
            .add_cloudfront_origin_access_identity(&mut stack, &oai)
            .unwrap();

        let policy = stack.resource(bucket.policy_id().unwrap()).unwrap();
        assert_eq!(policy.resource_type, BUCKET_POLICY_TYPE);
        let statements = policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0]["Principal"]["CanonicalUser"],
            json!({"Fn::GetAtt": [oai.logical_id.as_ref().unwrap().as_str(), "S3CanonicalUserId"]})
        );
        assert_eq!(
            policy.properties["Bucket"],
            json!({"Ref": bucket.logical_id().as_str()})
        );
    }

    #[test]
    fn test_failed_policy_update_leaves_statements_untouched() {
        let mut stack = stack();
        let mut bucket = S3BucketBuilder::new()
            .set_bucket_name("test-bucket")
            .build(&mut stack, "Site")
            .unwrap();
        stack
            .add_resource("Site-Policy", Resource::new(BUCKET_POLICY_TYPE, json!({})).unwrap())
            .unwrap();

        let statement = PolicyStatement::allow()
            .with_actions(["s3:GetObject"])
            .with_resource(bucket.reference().objects_arn());
        let err = bucket.add_to_resource_policy(&mut stack, statement).unwrap_err();

        assert!(matches!(err, Error::DuplicateConstruct { .. }));
        assert!(bucket.policy_statements().is_empty());
        assert!(bucket.policy_id().is_none());
    }

    #[test]
    fn test_agnostic_bucket_reference_uses_region_pseudo_parameter() {
        let bucket = BucketRef::from_name(&Environment::agnostic(), "logs");

        assert_eq!(
            serde_json::to_value(&bucket.regional_domain_name).unwrap(),
            json!({"Fn::Join": ["", ["logs.s3.", {"Ref": "AWS::Region"}, ".amazonaws.com"]]})
        );
    }

    #[test]
    fn test_imported_bucket_reference() {
        let env = Environment::new("123456789012", "us-east-1");
        let bucket = BucketRef::from_name(&env, "artifacts-123456789012");

        assert_eq!(bucket.arn, Expr::literal("arn:aws:s3:::artifacts-123456789012"));
        assert_eq!(
            bucket.domain_name,
            Expr::literal("artifacts-123456789012.s3.amazonaws.com")
        );
        assert_eq!(
            bucket.regional_domain_name,
            Expr::literal("artifacts-123456789012.s3.us-east-1.amazonaws.com")
        );
    }
}
