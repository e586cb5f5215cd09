//! CodeBuild projects.

use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use serde::Serialize;
use tracing::info;

use crate::non_blank;
use crate::role::RoleHandle;
use crate::s3::BucketRef;

pub const PROJECT_TYPE: &str = "AWS::CodeBuild::Project";

pub const AMAZON_LINUX_2_2_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:2.0";

/// Where a project reads its source from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Bitbucket,
    CodeCommit,
    CodePipeline,
    GitHubEnterprise,
    GitHub,
    NoSource,
    S3,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Bitbucket => "BITBUCKET",
            SourceType::CodeCommit => "CODECOMMIT",
            SourceType::CodePipeline => "CODEPIPELINE",
            SourceType::GitHubEnterprise => "GITHUB_ENTERPRISE",
            SourceType::GitHub => "GITHUB",
            SourceType::NoSource => "NO_SOURCE",
            SourceType::S3 => "S3",
        }
    }

    /// Sources fed by a pipeline, or by nothing, have no location.
    fn needs_location(self) -> bool {
        !matches!(self, SourceType::CodePipeline | SourceType::NoSource)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentType {
    ArmContainer,
    #[default]
    LinuxContainer,
    LinuxGpuContainer,
    WindowsContainer,
}

impl EnvironmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentType::ArmContainer => "ARM_CONTAINER",
            EnvironmentType::LinuxContainer => "LINUX_CONTAINER",
            EnvironmentType::LinuxGpuContainer => "LINUX_GPU_CONTAINER",
            EnvironmentType::WindowsContainer => "WINDOWS_CONTAINER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeType {
    #[default]
    Small,
    Medium,
    Large,
}

impl ComputeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeType::Small => "BUILD_GENERAL1_SMALL",
            ComputeType::Medium => "BUILD_GENERAL1_MEDIUM",
            ComputeType::Large => "BUILD_GENERAL1_LARGE",
        }
    }
}

impl std::str::FromStr for ComputeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" | "build_general1_small" => Ok(ComputeType::Small),
            "medium" | "build_general1_medium" => Ok(ComputeType::Medium),
            "large" | "build_general1_large" => Ok(ComputeType::Large),
            _ => Err(format!("Unknown compute type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactsType {
    CodePipeline,
    NoArtifacts,
    S3,
}

impl ArtifactsType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactsType::CodePipeline => "CODEPIPELINE",
            ArtifactsType::NoArtifacts => "NO_ARTIFACTS",
            ArtifactsType::S3 => "S3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSource {
    pub source_type: SourceType,
    pub location: Option<String>,
    /// Build spec path inside the source, `buildspec.yml` when unset.
    pub build_spec: Option<String>,
    pub git_clone_depth: Option<u32>,
}

impl ProjectSource {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            location: None,
            build_spec: None,
            git_clone_depth: None,
        }
    }

    pub fn github_enterprise(clone_url: impl Into<String>) -> Self {
        Self {
            location: non_blank(clone_url),
            git_clone_depth: Some(1),
            ..Self::new(SourceType::GitHubEnterprise)
        }
    }

    /// Source handed over by a pipeline action.
    pub fn codepipeline(build_spec: impl Into<String>) -> Self {
        Self {
            build_spec: non_blank(build_spec),
            ..Self::new(SourceType::CodePipeline)
        }
    }

    pub fn with_build_spec(mut self, build_spec: impl Into<String>) -> Self {
        self.build_spec = non_blank(build_spec);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEnvironment {
    pub environment_type: EnvironmentType,
    pub compute_type: ComputeType,
    pub image: String,
    pub privileged_mode: bool,
}

impl ProjectEnvironment {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            environment_type: EnvironmentType::LinuxContainer,
            compute_type: ComputeType::Small,
            image: image.into(),
            privileged_mode: false,
        }
    }

    /// Small Amazon Linux 2 container.
    pub fn amazon_linux() -> Self {
        Self::new(AMAZON_LINUX_2_2_IMAGE)
    }

    pub fn with_compute_type(mut self, compute_type: ComputeType) -> Self {
        self.compute_type = compute_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectArtifacts {
    pub artifacts_type: ArtifactsType,
    pub location: Option<Expr>,
    pub name: Option<String>,
    pub package_zip: bool,
}

impl ProjectArtifacts {
    pub fn codepipeline() -> Self {
        Self {
            artifacts_type: ArtifactsType::CodePipeline,
            location: None,
            name: None,
            package_zip: false,
        }
    }

    pub fn none() -> Self {
        Self {
            artifacts_type: ArtifactsType::NoArtifacts,
            ..Self::codepipeline()
        }
    }

    /// Upload build output into `bucket` under `name`.
    pub fn s3(bucket: &BucketRef, name: impl Into<String>, package_zip: bool) -> Self {
        Self {
            artifacts_type: ArtifactsType::S3,
            location: (!bucket.name.is_blank()).then(|| bucket.name.clone()),
            name: non_blank(name),
            package_zip,
        }
    }
}

/// A webhook filter such as `EVENT=PUSH` or `HEAD_REF=^refs/heads/main$`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookFilter {
    #[serde(rename = "Type")]
    pub filter_type: String,
    pub pattern: String,
}

impl WebhookFilter {
    pub fn event<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            filter_type: "EVENT".to_string(),
            pattern: events
                .into_iter()
                .map(|e| e.as_ref().to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn head_ref(pattern: impl Into<String>) -> Self {
        Self {
            filter_type: "HEAD_REF".to_string(),
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectTriggers {
    pub webhook: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter_groups: Vec<Vec<WebhookFilter>>,
}

impl ProjectTriggers {
    pub fn webhook() -> Self {
        Self {
            webhook: true,
            filter_groups: Vec::new(),
        }
    }

    pub fn with_filter_group(mut self, group: Vec<WebhookFilter>) -> Self {
        self.filter_groups.push(group);
        self
    }
}

/// The frozen configuration of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    pub name: Option<String>,
    pub service_role: Expr,
    pub source: ProjectSource,
    pub environment: ProjectEnvironment,
    pub artifacts: ProjectArtifacts,
    pub triggers: Option<ProjectTriggers>,
}

/// Builds a CodeBuild project.
///
/// Service role, source, environment and artifacts are required.
#[derive(Debug, Clone, Default)]
pub struct CodeBuildBuilder {
    project_name: Option<String>,
    service_role: Option<RoleHandle>,
    source: Option<ProjectSource>,
    environment: Option<ProjectEnvironment>,
    artifacts: Option<ProjectArtifacts>,
    triggers: Option<ProjectTriggers>,
}

impl CodeBuildBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = non_blank(name);
        self
    }

    pub fn set_service_role(mut self, role: RoleHandle) -> Self {
        self.service_role = (!role.arn.is_blank()).then_some(role);
        self
    }

    pub fn set_source(mut self, source: ProjectSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Clone from a GitHub Enterprise repository over HTTPS.
    pub fn set_source_github_enterprise(self, clone_url: impl Into<String>) -> Self {
        self.set_source(ProjectSource::github_enterprise(clone_url))
    }

    pub fn set_environment(mut self, environment: ProjectEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn set_amazon_linux_environment(self) -> Self {
        self.set_environment(ProjectEnvironment::amazon_linux())
    }

    pub fn set_artifacts(mut self, artifacts: ProjectArtifacts) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn set_s3_artifacts(
        self,
        bucket: &BucketRef,
        name: impl Into<String>,
        package_zip: bool,
    ) -> Self {
        self.set_artifacts(ProjectArtifacts::s3(bucket, name, package_zip))
    }

    pub fn set_triggers(mut self, triggers: ProjectTriggers) -> Self {
        self.triggers = Some(triggers);
        self
    }

    fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.service_role.is_none() {
            missing.push("service_role".to_string());
        }
        match &self.source {
            None => missing.push("source".to_string()),
            Some(source) if source.source_type.needs_location() && source.location.is_none() => {
                missing.push("source.location".to_string())
            }
            Some(_) => {}
        }
        match &self.environment {
            None => missing.push("environment".to_string()),
            Some(env) if env.image.trim().is_empty() => {
                missing.push("environment.image".to_string())
            }
            Some(_) => {}
        }
        match &self.artifacts {
            None => missing.push("artifacts".to_string()),
            Some(artifacts) if artifacts.artifacts_type == ArtifactsType::S3 => {
                if artifacts.location.is_none() {
                    missing.push("artifacts.location".to_string());
                }
            }
            Some(_) => {}
        }
        missing
    }

    pub fn build(self, stack: &mut Stack, id: &str) -> Result<Project> {
        let construct_id = format!("{id}-CodeBuildProject");
        let missing = self.missing();
        let (Some(role), Some(source), Some(environment), Some(artifacts), true) = (
            self.service_role,
            self.source,
            self.environment,
            self.artifacts,
            missing.is_empty(),
        ) else {
            return Err(Error::MissingConfiguration {
                resource: format!("CodeBuild project '{construct_id}'"),
                fields: missing,
            });
        };

        let spec = ProjectSpec {
            name: self.project_name,
            service_role: role.arn,
            source,
            environment,
            artifacts,
            triggers: self.triggers,
        };

        let mut resource = Resource::new(PROJECT_TYPE, ProjectProperties::from(&spec))?;
        if let Some(role_id) = role.logical_id {
            resource = resource.depends_on(role_id);
        }
        let logical_id = stack.add_resource(&construct_id, resource)?;

        info!(
            logical_id = %logical_id,
            source = %spec.source.source_type,
            image = %spec.environment.image,
            "built CodeBuild project"
        );

        Ok(Project {
            name: Expr::reference(&logical_id),
            arn: Expr::get_att(&logical_id, "Arn"),
            logical_id,
            spec,
        })
    }
}

/// A project created in this stack.
#[derive(Debug, Clone)]
pub struct Project {
    pub logical_id: LogicalId,
    /// Project name (`Ref` of the project), as pipeline actions expect it.
    pub name: Expr,
    pub arn: Expr,
    pub spec: ProjectSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProjectProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    service_role: &'a Expr,
    source: SourceProperty<'a>,
    environment: EnvironmentProperty<'a>,
    artifacts: ArtifactsProperty<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    triggers: Option<&'a ProjectTriggers>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SourceProperty<'a> {
    #[serde(rename = "Type")]
    source_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_spec: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_clone_depth: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentProperty<'a> {
    #[serde(rename = "Type")]
    environment_type: &'static str,
    compute_type: &'static str,
    image: &'a str,
    privileged_mode: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ArtifactsProperty<'a> {
    #[serde(rename = "Type")]
    artifacts_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packaging: Option<&'static str>,
}

impl<'a> From<&'a ProjectSpec> for ProjectProperties<'a> {
    fn from(spec: &'a ProjectSpec) -> Self {
        Self {
            name: spec.name.as_deref(),
            service_role: &spec.service_role,
            source: SourceProperty {
                source_type: spec.source.source_type.as_str(),
                location: spec.source.location.as_deref(),
                build_spec: spec.source.build_spec.as_deref(),
                git_clone_depth: spec.source.git_clone_depth,
            },
            environment: EnvironmentProperty {
                environment_type: spec.environment.environment_type.as_str(),
                compute_type: spec.environment.compute_type.as_str(),
                image: &spec.environment.image,
                privileged_mode: spec.environment.privileged_mode,
            },
            artifacts: ArtifactsProperty {
                artifacts_type: spec.artifacts.artifacts_type.as_str(),
                location: spec.artifacts.location.as_ref(),
                name: spec.artifacts.name.as_deref(),
                packaging: (spec.artifacts.artifacts_type == ArtifactsType::S3).then_some(
                    if spec.artifacts.package_zip {
                        "ZIP"
                    } else {
                        "NONE"
                    },
                ),
            },
            triggers: spec.triggers.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_core::Environment;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1"))
    }

    fn role() -> RoleHandle {
        RoleHandle::from_arn("arn:aws:iam::123456789012:role/codebuild-role")
    }

    #[test]
    fn test_build_reports_all_missing_fields() {
        let mut stack = stack();
        let err = CodeBuildBuilder::new()
            .set_project_name("Watcher")
            .build(&mut stack, "Watcher")
            .unwrap_err();

        match err {
            Error::MissingConfiguration { resource, fields } => {
                assert_eq!(
                    fields,
                    vec!["service_role", "source", "environment", "artifacts"]
                );
                assert!(resource.contains("Watcher-CodeBuildProject"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_each_required_field_is_named() {
        let required = ["service_role", "source", "environment", "artifacts"];
        for skipped in required {
            let mut builder = CodeBuildBuilder::new();
            if skipped != "service_role" {
                builder = builder.set_service_role(role());
            }
            if skipped != "source" {
                builder = builder.set_source(ProjectSource::codepipeline("buildspec.yml"));
            }
            if skipped != "environment" {
                builder = builder.set_amazon_linux_environment();
            }
            if skipped != "artifacts" {
                builder = builder.set_artifacts(ProjectArtifacts::codepipeline());
            }

            let err = builder.build(&mut stack(), "Build").unwrap_err();
            match err {
                Error::MissingConfiguration { fields, .. } => assert_eq!(fields, vec![skipped]),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_github_enterprise_source_needs_clone_url() {
        let bucket = BucketRef::from_name(&Environment::agnostic(), "source-bucket");
        let err = CodeBuildBuilder::new()
            .set_service_role(role())
            .set_source_github_enterprise("")
            .set_amazon_linux_environment()
            .set_s3_artifacts(&bucket, "CodeBuildSource", true)
            .build(&mut stack(), "Watcher")
            .unwrap_err();

        match err {
            Error::MissingConfiguration { fields, .. } => {
                assert_eq!(fields, vec!["source.location"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_watcher_project_properties() {
        let mut stack = stack();
        let bucket = BucketRef::from_name(stack.env(), "codepipeline-source-123456789012");
        let project = CodeBuildBuilder::new()
            .set_project_name("CodeBuildWatcher")
            .set_service_role(role())
            .set_source_github_enterprise("https://ghe.example.com/org/modules")
            .set_amazon_linux_environment()
            .set_s3_artifacts(&bucket, "CodeBuildSource", true)
            .set_triggers(ProjectTriggers::webhook().with_filter_group(vec![
                WebhookFilter::event(["PUSH"]),
                WebhookFilter::head_ref("^refs/heads/master$"),
            ]))
            .build(&mut stack, "CodeBuildWatcher")
            .unwrap();

        let resource = stack.resource(&project.logical_id).unwrap();
        assert_eq!(resource.resource_type, PROJECT_TYPE);
        assert_eq!(
            resource.properties,
            json!({
                "Name": "CodeBuildWatcher",
                "ServiceRole": "arn:aws:iam::123456789012:role/codebuild-role",
                "Source": {
                    "Type": "GITHUB_ENTERPRISE",
                    "Location": "https://ghe.example.com/org/modules",
                    "GitCloneDepth": 1
                },
                "Environment": {
                    "Type": "LINUX_CONTAINER",
                    "ComputeType": "BUILD_GENERAL1_SMALL",
                    "Image": AMAZON_LINUX_2_2_IMAGE,
                    "PrivilegedMode": false
                },
                "Artifacts": {
                    "Type": "S3",
                    "Location": "codepipeline-source-123456789012",
                    "Name": "CodeBuildSource",
                    "Packaging": "ZIP"
                },
                "Triggers": {
                    "Webhook": true,
                    "FilterGroups": [[
                        {"Type": "EVENT", "Pattern": "PUSH"},
                        {"Type": "HEAD_REF", "Pattern": "^refs/heads/master$"}
                    ]]
                }
            })
        );
        assert_eq!(project.name, Expr::reference(&project.logical_id));
    }

    #[test]
    fn test_compute_type_from_str() {
        assert_eq!("medium".parse::<ComputeType>(), Ok(ComputeType::Medium));
        assert_eq!(
            "BUILD_GENERAL1_LARGE".parse::<ComputeType>(),
            Ok(ComputeType::Large)
        );
        assert!("huge".parse::<ComputeType>().is_err());
    }
}
