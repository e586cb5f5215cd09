//! Pipeline for a GitHub Enterprise repository.
//!
//! CodePipeline cannot pull from GitHub Enterprise directly, so a watcher
//! project triggered by the repository webhook zips the checkout into a
//! bucket, and the pipeline sources from that object.

use infrakit_builders::codebuild::{ProjectTriggers, WebhookFilter};
use infrakit_builders::{
    BucketRef, CodeBuildBuilder, CodePipelineBuilder, CodePipelineStageBuilder, S3SourceProps,
};
use infrakit_config::GitHubEnterprisePipelineConfig;
use infrakit_core::{Environment, Result, Stack};
use tracing::info;

use crate::pipeline_common::{
    add_build_and_test_stages, build_environment, build_role_props, pipeline_role_props,
    resolve_role,
};

/// Artifact holding the zipped checkout.
pub const SOURCE_OUTPUT: &str = "s3SourceOutput";

pub fn github_enterprise_pipeline_stack(
    name: &str,
    env: Environment,
    config: &GitHubEnterprisePipelineConfig,
) -> Result<Stack> {
    let mut stack = Stack::new(name, env).with_description("GitHub Enterprise build pipeline");

    let source_bucket = BucketRef::from_name(stack.env(), &config.source_bucket);
    let artifact_bucket = BucketRef::from_name(stack.env(), &config.artifact_bucket);
    let build_role = resolve_role(
        &mut stack,
        "CodeBuildService",
        &config.build_role,
        build_role_props(&[&source_bucket, &artifact_bucket]),
    )?;

    let mut push = vec![WebhookFilter::event(["PUSH"])];
    if let Some(branch) = &config.branch {
        push.push(WebhookFilter::head_ref(format!("^refs/heads/{branch}$")));
    }
    let watcher = CodeBuildBuilder::new()
        .set_project_name(&config.watcher_project_name)
        .set_source_github_enterprise(&config.clone_url)
        .set_s3_artifacts(&source_bucket, &config.source_key, true)
        .set_service_role(build_role.clone())
        .set_environment(build_environment(&config.build)?)
        .set_triggers(ProjectTriggers::webhook().with_filter_group(push))
        .build(&mut stack, "CodeBuildWatcher")?;

    let pipeline_role = resolve_role(
        &mut stack,
        "Pipeline",
        &config.role,
        pipeline_role_props(&artifact_bucket),
    )?;

    let source = CodePipelineStageBuilder::new()
        .set_stage_name("SourceStage")
        .add_artifact(SOURCE_OUTPUT)?
        .add_s3_source_action(S3SourceProps {
            action_name: "S3SourceAction".to_string(),
            bucket: source_bucket,
            bucket_key: config.source_key.clone(),
            output_artifact_name: SOURCE_OUTPUT.to_string(),
        })?
        .build()?;

    let pipeline = CodePipelineBuilder::new()
        .set_artifact_bucket(artifact_bucket)
        .set_role(pipeline_role);
    let pipeline = add_build_and_test_stages(
        pipeline,
        &mut stack,
        source,
        SOURCE_OUTPUT,
        &config.build,
        build_role,
    )?
    .build(&mut stack, name)?;

    info!(
        stack = name,
        pipeline = %pipeline.name,
        watcher = %watcher.logical_id,
        "assembled GitHub Enterprise pipeline stack"
    );
    Ok(stack)
}
