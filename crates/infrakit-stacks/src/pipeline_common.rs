//! Roles, build environments and the build/test stages shared by the
//! pipeline stacks.

use infrakit_builders::codebuild::{ComputeType, ProjectEnvironment};
use infrakit_builders::{
    AlksRoleIssuer, BucketRef, CodeBuildActionProps, CodePipelineBuilder,
    CodePipelineStageBuilder, IamRoleIssuer, PipelineProjectProps, RoleBuilder, RoleHandle,
    RoleProps, Stage,
};
use infrakit_config::{BuildConfig, RoleConfig, RoleIssuerKind};
use infrakit_core::policy::PolicyStatement;
use infrakit_core::{Error, Result, Stack};

/// Artifact produced by the build stage and consumed by the test stage.
pub const BUILD_OUTPUT: &str = "codeBuildOutput";

/// Reference the configured role or issue a new one with `props`.
pub(crate) fn resolve_role(
    stack: &mut Stack,
    id: &str,
    role: &RoleConfig,
    props: RoleProps,
) -> Result<RoleHandle> {
    let builder = RoleBuilder::new().set_role_props(props);
    match role {
        RoleConfig::Arn(arn) => Ok(RoleHandle::from_arn(arn)),
        RoleConfig::Issue(RoleIssuerKind::Alks) => {
            builder.build(stack, id, &AlksRoleIssuer::new())
        }
        RoleConfig::Issue(RoleIssuerKind::Iam) => builder.build(stack, id, &IamRoleIssuer),
    }
}

pub(crate) fn pipeline_role_props(artifact_bucket: &BucketRef) -> RoleProps {
    RoleProps::for_service("codepipeline.amazonaws.com").with_policy(
        "PipelineAccess",
        vec![
            bucket_access(artifact_bucket),
            PolicyStatement::allow()
                .with_actions(["codebuild:StartBuild", "codebuild:BatchGetBuilds"])
                .with_resource("*"),
        ],
    )
}

pub(crate) fn build_role_props(buckets: &[&BucketRef]) -> RoleProps {
    let logs = PolicyStatement::allow()
        .with_actions([
            "logs:CreateLogGroup",
            "logs:CreateLogStream",
            "logs:PutLogEvents",
        ])
        .with_resource("*");
    let statements = std::iter::once(logs)
        .chain(buckets.iter().map(|bucket| bucket_access(bucket)))
        .collect();
    RoleProps::for_service("codebuild.amazonaws.com").with_policy("BuildAccess", statements)
}

fn bucket_access(bucket: &BucketRef) -> PolicyStatement {
    PolicyStatement::allow()
        .with_actions([
            "s3:GetObject",
            "s3:GetObjectVersion",
            "s3:GetBucketVersioning",
            "s3:PutObject",
        ])
        .with_resource(bucket.arn.clone())
        .with_resource(bucket.objects_arn())
}

/// The configured image and compute type, Amazon Linux 2 by default.
pub(crate) fn build_environment(build: &BuildConfig) -> Result<ProjectEnvironment> {
    let environment = match &build.image {
        Some(image) => ProjectEnvironment::new(image),
        None => ProjectEnvironment::amazon_linux(),
    };
    match &build.compute_type {
        Some(compute_type) => {
            let compute_type = compute_type
                .parse::<ComputeType>()
                .map_err(|message| Error::invalid("compute_type", message))?;
            Ok(environment.with_compute_type(compute_type))
        }
        None => Ok(environment),
    }
}

/// Append `source`, then a build stage on `source_artifact` and a test stage
/// on the build output.
pub(crate) fn add_build_and_test_stages(
    pipeline: CodePipelineBuilder,
    stack: &mut Stack,
    source: Stage,
    source_artifact: &str,
    build: &BuildConfig,
    build_role: RoleHandle,
) -> Result<CodePipelineBuilder> {
    let environment = build_environment(build)?;

    let build_project = CodePipelineBuilder::build_pipeline_project(
        stack,
        "PipelineBuildProject",
        PipelineProjectProps {
            build_spec: build.build_spec.clone(),
            environment: environment.clone(),
            service_role: build_role.clone(),
        },
    )?;
    let build_stage = CodePipelineStageBuilder::new()
        .set_stage_name("BuildStage")
        .add_codebuild_action(
            CodeBuildActionProps::new(
                "CodeBuildBuildAction",
                source.output(source_artifact)?,
                &build_project,
            )
            .with_output(BUILD_OUTPUT)
            .with_variables_namespace("CodeBuildVariables"),
        )?
        .build()?;

    let test_project = CodePipelineBuilder::build_pipeline_project(
        stack,
        "PipelineTestProject",
        PipelineProjectProps {
            build_spec: build.test_spec.clone(),
            environment,
            service_role: build_role,
        },
    )?;
    let test_stage = CodePipelineStageBuilder::new()
        .set_stage_name("TestStage")
        .add_codebuild_action(CodeBuildActionProps::new(
            "CodeBuildTestAction",
            build_stage.output(BUILD_OUTPUT)?,
            &test_project,
        ))?
        .build()?;

    Ok(pipeline
        .add_stage(source)
        .add_stage(build_stage)
        .add_stage(test_stage))
}
