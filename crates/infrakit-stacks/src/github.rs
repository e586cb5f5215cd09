//! Pipeline building and testing a GitHub repository.

use infrakit_builders::{BucketRef, CodePipelineBuilder, CodePipelineStageBuilder, GitHubSourceProps};
use infrakit_config::GitHubPipelineConfig;
use infrakit_core::lookup::SsmParameterReference;
use infrakit_core::{Environment, Result, Stack};
use tracing::info;

use crate::pipeline_common::{
    add_build_and_test_stages, build_role_props, pipeline_role_props, resolve_role,
};

/// Artifact holding the checked out repository.
pub const SOURCE_OUTPUT: &str = "githubSourceOutput";

pub fn github_pipeline_stack(
    name: &str,
    env: Environment,
    config: &GitHubPipelineConfig,
) -> Result<Stack> {
    let mut stack = Stack::new(name, env).with_description("GitHub build pipeline");
    let oauth_token = SsmParameterReference::secret_parameter(&mut stack, &config.token_parameter)?;

    let artifact_bucket = BucketRef::from_name(stack.env(), &config.artifact_bucket);
    let pipeline_role = resolve_role(
        &mut stack,
        "Pipeline",
        &config.role,
        pipeline_role_props(&artifact_bucket),
    )?;
    let build_role = resolve_role(
        &mut stack,
        "PipelineBuild",
        &config.build_role,
        build_role_props(&[&artifact_bucket]),
    )?;

    let source = CodePipelineStageBuilder::new()
        .set_stage_name("SourceStage")
        .add_artifact(SOURCE_OUTPUT)?
        .add_github_source_action(GitHubSourceProps {
            action_name: "GitHubSourceAction".to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            oauth_token,
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
        repo = %format!("{}/{}", config.owner, config.repo),
        "assembled GitHub pipeline stack"
    );
    Ok(stack)
}
