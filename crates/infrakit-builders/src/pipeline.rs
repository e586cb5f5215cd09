//! CodePipeline pipelines assembled from stages of artifact-threaded actions.
//!
//! Stages run in the order they are added. Each action names the artifacts
//! it consumes and produces; building the pipeline checks that every input is
//! produced exactly once, by a stage that runs strictly earlier.

use infrakit_core::error::missing_fields;
use infrakit_core::graph::topological_order;
use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::codebuild::{
    CodeBuildBuilder, Project, ProjectArtifacts, ProjectEnvironment, ProjectSource,
};
use crate::non_blank;
use crate::role::RoleHandle;
use crate::s3::BucketRef;

pub const PIPELINE_TYPE: &str = "AWS::CodePipeline::Pipeline";

static ARTIFACT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]{1,100}$").expect("valid regex"));

/// Source action pulling a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSourceProps {
    pub action_name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub oauth_token: Expr,
    pub output_artifact_name: String,
}

/// Source action triggered by an object landing in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3SourceProps {
    pub action_name: String,
    pub bucket: BucketRef,
    pub bucket_key: String,
    pub output_artifact_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBuildActionProps {
    pub action_name: String,
    pub input: String,
    /// Project name, usually [`Project::name`].
    pub project: Expr,
    pub outputs: Vec<String>,
    pub variables_namespace: Option<String>,
}

impl CodeBuildActionProps {
    pub fn new(action_name: impl Into<String>, input: impl Into<String>, project: &Project) -> Self {
        Self {
            action_name: action_name.into(),
            input: input.into(),
            project: project.name.clone(),
            outputs: Vec::new(),
            variables_namespace: None,
        }
    }

    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    pub fn with_variables_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.variables_namespace = Some(namespace.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GitHubSource(GitHubSourceProps),
    S3Source(S3SourceProps),
    CodeBuild(CodeBuildActionProps),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::GitHubSource(props) => &props.action_name,
            Action::S3Source(props) => &props.action_name,
            Action::CodeBuild(props) => &props.action_name,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Action::GitHubSource(_) | Action::S3Source(_))
    }

    pub fn inputs(&self) -> &[String] {
        match self {
            Action::CodeBuild(props) => std::slice::from_ref(&props.input),
            _ => &[],
        }
    }

    pub fn outputs(&self) -> &[String] {
        match self {
            Action::GitHubSource(props) => std::slice::from_ref(&props.output_artifact_name),
            Action::S3Source(props) => std::slice::from_ref(&props.output_artifact_name),
            Action::CodeBuild(props) => &props.outputs,
        }
    }
}

/// A frozen stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
    actions: Vec<Action>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Name of an artifact this stage produces, for wiring into later stages.
    pub fn output(&self, artifact: &str) -> Result<String> {
        if self.outputs.iter().any(|o| o == artifact) {
            Ok(artifact.to_string())
        } else {
            Err(Error::UndeclaredArtifact {
                artifact: artifact.to_string(),
                referenced_by: format!("stage '{}' outputs", self.name),
            })
        }
    }
}

/// Builds one stage.
///
/// Source actions may only write artifacts registered with
/// [`add_artifact`](Self::add_artifact); CodeBuild outputs register
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct CodePipelineStageBuilder {
    stage_name: Option<String>,
    actions: Vec<Action>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// Registered outputs not yet claimed by an action.
    unclaimed: HashSet<String>,
}

impl CodePipelineStageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stage_name(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = non_blank(stage_name);
        self
    }

    fn stage_label(&self) -> String {
        self.stage_name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    fn register(&mut self, artifact: &str) -> Result<()> {
        if !ARTIFACT_NAME_RE.is_match(artifact) {
            return Err(Error::invalid(
                format!("artifact name in stage '{}'", self.stage_label()),
                format!("'{artifact}' must be 1-100 letters, digits, '-' or '_'"),
            ));
        }
        if self.outputs.iter().any(|o| o == artifact) {
            return Err(Error::DuplicateArtifact {
                artifact: artifact.to_string(),
                stage: self.stage_label(),
            });
        }
        self.outputs.push(artifact.to_string());
        Ok(())
    }

    /// Register an output artifact for a source action to write.
    pub fn add_artifact(mut self, artifact_name: &str) -> Result<Self> {
        self.register(artifact_name)?;
        self.unclaimed.insert(artifact_name.to_string());
        Ok(self)
    }

    fn claim(&mut self, artifact: &str, action_name: &str) -> Result<()> {
        if self.unclaimed.remove(artifact) {
            return Ok(());
        }
        if self.outputs.iter().any(|o| o == artifact) {
            Err(Error::DuplicateArtifact {
                artifact: artifact.to_string(),
                stage: self.stage_label(),
            })
        } else {
            Err(Error::UndeclaredArtifact {
                artifact: artifact.to_string(),
                referenced_by: format!("action '{action_name}'"),
            })
        }
    }

    pub fn add_github_source_action(mut self, props: GitHubSourceProps) -> Result<Self> {
        self.claim(&props.output_artifact_name, &props.action_name)?;
        self.actions.push(Action::GitHubSource(props));
        Ok(self)
    }

    pub fn add_s3_source_action(mut self, props: S3SourceProps) -> Result<Self> {
        self.claim(&props.output_artifact_name, &props.action_name)?;
        self.actions.push(Action::S3Source(props));
        Ok(self)
    }

    /// Attach a build action consuming `props.input`.
    ///
    /// The input is checked against earlier stages when the pipeline is
    /// built; outputs are registered in this stage immediately.
    pub fn add_codebuild_action(mut self, props: CodeBuildActionProps) -> Result<Self> {
        if props.input.trim().is_empty() {
            return Err(Error::UndeclaredArtifact {
                artifact: props.input,
                referenced_by: format!("action '{}'", props.action_name),
            });
        }
        for output in &props.outputs {
            self.register(output)?;
        }
        if !self.inputs.contains(&props.input) {
            self.inputs.push(props.input.clone());
        }
        self.actions.push(Action::CodeBuild(props));
        Ok(self)
    }

    pub fn build(self) -> Result<Stage> {
        let (Some(name), false) = (self.stage_name.clone(), self.actions.is_empty()) else {
            return Err(Error::missing(
                format!("pipeline stage '{}'", self.stage_label()),
                missing_fields(&[
                    ("stage_name", self.stage_name.is_some()),
                    ("actions", !self.actions.is_empty()),
                ]),
            ));
        };

        if !self.unclaimed.is_empty() {
            let mut unclaimed: Vec<&String> = self.unclaimed.iter().collect();
            unclaimed.sort();
            warn!(stage = %name, artifacts = ?unclaimed, "registered artifacts are never produced");
        }

        debug!(stage = %name, actions = self.actions.len(), "built stage");
        Ok(Stage {
            name,
            actions: self.actions,
            inputs: self.inputs,
            outputs: self.outputs,
        })
    }
}

/// Check the artifact graph between stages.
fn validate_stage_graph(stages: &[Stage]) -> Result<()> {
    let mut seen_stages = HashSet::new();
    for stage in stages {
        if !seen_stages.insert(stage.name()) {
            return Err(Error::DuplicateStage(stage.name.clone()));
        }
    }

    let mut producers: HashMap<&str, usize> = HashMap::new();
    for (index, stage) in stages.iter().enumerate() {
        for artifact in &stage.outputs {
            if producers.insert(artifact, index).is_some() {
                return Err(Error::DuplicateArtifact {
                    artifact: artifact.clone(),
                    stage: stage.name.clone(),
                });
            }
        }
    }

    let mut needs: HashMap<&str, Vec<&str>> = HashMap::new();
    for stage in stages {
        for input in &stage.inputs {
            let Some(&producer) = producers.get(input.as_str()) else {
                return Err(Error::UndeclaredArtifact {
                    artifact: input.clone(),
                    referenced_by: format!("stage '{}'", stage.name),
                });
            };
            let producer = stages[producer].name();
            if producer != stage.name() {
                needs.entry(stage.name()).or_default().push(producer);
            }
        }
    }

    let names: Vec<&str> = stages.iter().map(Stage::name).collect();
    topological_order(&names, &needs).map_err(Error::CycleDetected)?;

    for (index, stage) in stages.iter().enumerate() {
        for input in &stage.inputs {
            let producer = producers[input.as_str()];
            if producer >= index {
                return Err(Error::ForwardArtifactReference {
                    stage: stage.name.clone(),
                    artifact: input.clone(),
                    producer: stages[producer].name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Build spec and runtime of a project run from a pipeline action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineProjectProps {
    pub build_spec: String,
    pub environment: ProjectEnvironment,
    pub service_role: RoleHandle,
}

/// Builds a pipeline from frozen stages.
#[derive(Debug, Clone, Default)]
pub struct CodePipelineBuilder {
    pipeline_name: Option<String>,
    stages: Vec<Stage>,
    artifact_bucket: Option<BucketRef>,
    role: Option<RoleHandle>,
}

impl CodePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults to `<id>-Pipeline`.
    pub fn set_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = non_blank(name);
        self
    }

    pub fn add_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn set_artifact_bucket(mut self, bucket: BucketRef) -> Self {
        self.artifact_bucket = (!bucket.name.is_blank()).then_some(bucket);
        self
    }

    pub fn set_role(mut self, role: RoleHandle) -> Self {
        self.role = (!role.arn.is_blank()).then_some(role);
        self
    }

    /// A CodeBuild project fed by pipeline artifacts and running the given
    /// build spec file from the source.
    pub fn build_pipeline_project(
        stack: &mut Stack,
        id: &str,
        props: PipelineProjectProps,
    ) -> Result<Project> {
        CodeBuildBuilder::new()
            .set_service_role(props.service_role)
            .set_source(ProjectSource::codepipeline(props.build_spec))
            .set_environment(props.environment)
            .set_artifacts(ProjectArtifacts::codepipeline())
            .build(stack, &format!("{id}-Pipeline"))
    }

    pub fn build(self, stack: &mut Stack, id: &str) -> Result<Pipeline> {
        let construct_id = format!("{id}-Pipeline");
        let resource = format!("pipeline '{construct_id}'");

        let (bucket, role) = match (self.artifact_bucket, self.role) {
            (Some(bucket), Some(role)) if !self.stages.is_empty() => (bucket, role),
            (bucket, role) => {
                return Err(Error::missing(
                    resource,
                    missing_fields(&[
                        ("artifact_bucket", bucket.is_some()),
                        ("role", role.is_some()),
                        ("stages", !self.stages.is_empty()),
                    ]),
                ));
            }
        };

        if self.stages.len() < 2 {
            return Err(Error::invalid(
                format!("{resource} stages"),
                "a pipeline needs at least two stages",
            ));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            let first = index == 0;
            if let Some(action) = stage.actions.iter().find(|a| a.is_source() != first) {
                let message = if first {
                    format!("first stage may only hold source actions, found '{}'", action.name())
                } else {
                    format!("source action '{}' outside the first stage", action.name())
                };
                return Err(Error::invalid(format!("stage '{}'", stage.name), message));
            }
        }
        validate_stage_graph(&self.stages)?;

        let name = self.pipeline_name.unwrap_or_else(|| construct_id.clone());
        let properties = PipelineProperties {
            name: &name,
            role_arn: &role.arn,
            artifact_store: ArtifactStore {
                store_type: "S3",
                location: &bucket.name,
            },
            stages: self.stages.iter().map(stage_property).collect(),
        };

        let mut pipeline_resource = Resource::new(PIPELINE_TYPE, properties)?;
        if let Some(role_id) = role.logical_id {
            pipeline_resource = pipeline_resource.depends_on(role_id);
        }
        let logical_id = stack.add_resource(&construct_id, pipeline_resource)?;

        info!(
            pipeline = %name,
            logical_id = %logical_id,
            stages = self.stages.len(),
            "built pipeline"
        );

        Ok(Pipeline {
            logical_id,
            name,
            stages: self.stages,
        })
    }
}

/// A pipeline created in this stack.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub logical_id: LogicalId,
    pub name: String,
    pub stages: Vec<Stage>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PipelineProperties<'a> {
    name: &'a str,
    role_arn: &'a Expr,
    artifact_store: ArtifactStore<'a>,
    stages: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ArtifactStore<'a> {
    #[serde(rename = "Type")]
    store_type: &'static str,
    location: &'a Expr,
}

fn artifact_list(names: &[String]) -> Value {
    Value::Array(names.iter().map(|n| json!({ "Name": n })).collect())
}

fn stage_property(stage: &Stage) -> Value {
    let actions: Vec<Value> = stage.actions.iter().map(action_property).collect();
    json!({ "Name": stage.name, "Actions": actions })
}

fn action_property(action: &Action) -> Value {
    let (category, owner, provider, configuration) = match action {
        Action::GitHubSource(props) => (
            "Source",
            "ThirdParty",
            "GitHub",
            json!({
                "Owner": props.owner,
                "Repo": props.repo,
                "Branch": props.branch,
                "OAuthToken": props.oauth_token,
                "PollForSourceChanges": false
            }),
        ),
        Action::S3Source(props) => (
            "Source",
            "AWS",
            "S3",
            json!({
                "S3Bucket": props.bucket.name,
                "S3ObjectKey": props.bucket_key,
                "PollForSourceChanges": false
            }),
        ),
        Action::CodeBuild(props) => (
            "Build",
            "AWS",
            "CodeBuild",
            json!({ "ProjectName": props.project }),
        ),
    };

    let mut property = Map::new();
    property.insert("Name".into(), json!(action.name()));
    property.insert(
        "ActionTypeId".into(),
        json!({
            "Category": category,
            "Owner": owner,
            "Provider": provider,
            "Version": "1"
        }),
    );
    property.insert("Configuration".into(), configuration);
    if !action.inputs().is_empty() {
        property.insert("InputArtifacts".into(), artifact_list(action.inputs()));
    }
    if !action.outputs().is_empty() {
        property.insert("OutputArtifacts".into(), artifact_list(action.outputs()));
    }
    if let Action::CodeBuild(CodeBuildActionProps {
        variables_namespace: Some(namespace),
        ..
    }) = action
    {
        property.insert("Namespace".into(), json!(namespace));
    }
    property.insert("RunOrder".into(), json!(1));
    Value::Object(property)
}
