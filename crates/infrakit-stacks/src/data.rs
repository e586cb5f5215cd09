//! The data stack: the app bucket and the identity CloudFront reads it with.

use infrakit_builders::{CloudFrontBuilder, ParameterBuilder, S3BucketBuilder};
use infrakit_config::DataStackConfig;
use infrakit_core::{Environment, Expr, Result, Stack};
use tracing::info;

/// Names under which a data stack exports its bucket and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataExports {
    pub bucket_name: String,
    pub access_identity_id: String,
    pub canonical_user_id: String,
}

impl DataExports {
    pub fn new(prefix: &str) -> Self {
        Self {
            bucket_name: format!("{prefix}-AppBucketName"),
            access_identity_id: format!("{prefix}-OriginAccessIdentityId"),
            canonical_user_id: format!("{prefix}-OriginAccessIdentityCanonicalUserId"),
        }
    }

    pub fn import_bucket_name(&self) -> Expr {
        Expr::import_value(self.bucket_name.as_str())
    }

    pub fn import_access_identity_id(&self) -> Expr {
        Expr::import_value(self.access_identity_id.as_str())
    }

    pub fn import_canonical_user_id(&self) -> Expr {
        Expr::import_value(self.canonical_user_id.as_str())
    }
}

pub fn data_stack(name: &str, env: Environment, config: &DataStackConfig) -> Result<Stack> {
    let mut stack = Stack::new(name, env).with_description("App bucket and CloudFront access");

    let identity = CloudFrontBuilder::build_origin_access_identity(
        &mut stack,
        "AppBucket",
        Some("Access S3 bucket content only through CloudFront"),
    )?;
    let mut bucket = S3BucketBuilder::new()
        .set_bucket_name(&config.bucket_name)
        .set_versioned(config.versioned)
        .build(&mut stack, "AppBucket")?;
    bucket.add_cloudfront_origin_access_identity(&mut stack, &identity)?;

    let exports = DataExports::new(&config.export_prefix);
    stack.export_value(&exports.bucket_name, bucket.reference().name.clone())?;
    stack.export_value(&exports.access_identity_id, identity.id.clone())?;
    stack.export_value(&exports.canonical_user_id, identity.canonical_user_id.clone())?;

    if let Some(key) = &config.parameter_key {
        ParameterBuilder::new()
            .set_key(key)
            .set_value(bucket.reference().name.clone())
            .build_string_parameter(&mut stack, "AppBucketName")?;
    }

    info!(stack = name, bucket = %config.bucket_name, "assembled data stack");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_builders::cloudfront::ORIGIN_ACCESS_IDENTITY_TYPE;
    use infrakit_builders::parameter::SSM_PARAMETER_TYPE;
    use infrakit_builders::s3::{BUCKET_POLICY_TYPE, BUCKET_TYPE};
    use serde_json::json;

    fn config() -> DataStackConfig {
        DataStackConfig {
            bucket_name: "site-data-123456789012".to_string(),
            versioned: true,
            export_prefix: "Data".to_string(),
            parameter_key: None,
        }
    }

    fn env() -> Environment {
        Environment::new("123456789012", "us-east-1")
    }

    #[test]
    fn test_data_stack_resources() {
        let stack = data_stack("Data", env(), &config()).unwrap();
        let template = stack.synth();

        assert_eq!(template.resources_of_type(BUCKET_TYPE).count(), 1);
        assert_eq!(template.resources_of_type(ORIGIN_ACCESS_IDENTITY_TYPE).count(), 1);
        assert_eq!(template.resources_of_type(SSM_PARAMETER_TYPE).count(), 0);

        let (_, bucket) = template.resources_of_type(BUCKET_TYPE).next().unwrap();
        assert_eq!(bucket.properties["BucketName"], "site-data-123456789012");
        assert_eq!(
            bucket.properties["VersioningConfiguration"],
            json!({"Status": "Enabled"})
        );

        let (_, policy) = template.resources_of_type(BUCKET_POLICY_TYPE).next().unwrap();
        let statements = policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_data_stack_exports() {
        let stack = data_stack("Data", env(), &config()).unwrap();
        let exports: Vec<&str> = stack
            .template()
            .outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.as_str()))
            .collect();

        assert_eq!(exports.len(), 3);
        assert!(exports.contains(&"Data-AppBucketName"));
        assert!(exports.contains(&"Data-OriginAccessIdentityId"));
        assert!(exports.contains(&"Data-OriginAccessIdentityCanonicalUserId"));
    }

    #[test]
    fn test_data_stack_publishes_bucket_parameter() {
        let config = DataStackConfig {
            parameter_key: Some("/site/bucket".to_string()),
            ..config()
        };
        let stack = data_stack("Data", env(), &config).unwrap();
        let template = stack.synth();

        let (_, parameter) = template.resources_of_type(SSM_PARAMETER_TYPE).next().unwrap();
        assert_eq!(parameter.properties["Name"], "/site/bucket");
        assert_eq!(parameter.properties["Type"], "String");
    }

    #[test]
    fn test_imports_match_exports() {
        let exports = DataExports::new("Data");
        assert_eq!(
            exports.import_bucket_name(),
            Expr::import_value("Data-AppBucketName")
        );
    }
}
