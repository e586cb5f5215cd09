//! Fluent builders that turn configuration into template resources.
//!
//! Every builder follows the same contract: setters take and return the
//! builder by value, and `build(stack, id)` validates the accumulated fields,
//! adds the resources to the stack and returns a handle for downstream
//! builders. A `build` with unset required fields reports all of them in one
//! [`infrakit_core::Error::MissingConfiguration`].

pub mod cloudfront;
pub mod codebuild;
pub mod parameter;
pub mod pipeline;
pub mod role;
pub mod route53;
pub mod s3;

pub use cloudfront::{
    AccessIdentity, CloudFrontBuilder, CustomOriginSource, Distribution, S3OriginSource,
    SecurityPolicy,
};
pub use codebuild::{CodeBuildBuilder, Project};
pub use parameter::{ParameterBuilder, ParameterProps, ParameterType, StringParameter};
pub use pipeline::{
    CodeBuildActionProps, CodePipelineBuilder, CodePipelineStageBuilder, GitHubSourceProps,
    Pipeline, PipelineProjectProps, S3SourceProps, Stage,
};
pub use role::{AlksRoleIssuer, IamRoleIssuer, RoleBuilder, RoleHandle, RoleIssuer, RoleProps};
pub use route53::{RecordSet, Route53Builder};
pub use s3::{Bucket, BucketRef, S3BucketBuilder};

/// Treat blank strings as unset.
pub(crate) fn non_blank(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
