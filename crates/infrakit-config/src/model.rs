//! Typed configuration of an app and its stacks.

use serde::Serialize;
use std::collections::BTreeMap;

/// Top-level configuration parsed from `infrakit.kdl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub name: String,
    pub env: EnvConfig,
    pub lookups: LookupConfig,
    /// Stacks in declaration order.
    pub stacks: Vec<StackConfig>,
}

impl AppConfig {
    pub fn stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.name == name)
    }
}

/// Where stacks deploy unless a stack overrides it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvConfig {
    pub account: Option<String>,
    pub region: Option<String>,
    pub partition: Option<String>,
}

/// Values resolved at synthesis time instead of querying AWS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupConfig {
    /// SSM parameter name to value.
    pub parameters: BTreeMap<String, String>,
    /// Domain name to hosted zone id.
    pub hosted_zones: BTreeMap<String, String>,
    /// Reference parameters missing from `parameters` at deploy time.
    pub ssm_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackConfig {
    pub name: String,
    pub description: Option<String>,
    /// Stacks that must deploy first.
    pub needs: Vec<String>,
    pub account: Option<String>,
    pub region: Option<String>,
    pub kind: StackKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StackKind {
    Data(DataStackConfig),
    Global(GlobalStackConfig),
    #[serde(rename = "frontend")]
    FrontEnd(FrontEndStackConfig),
    #[serde(rename = "github-pipeline")]
    GitHubPipeline(GitHubPipelineConfig),
    #[serde(rename = "github-enterprise-pipeline")]
    GitHubEnterprisePipeline(GitHubEnterprisePipelineConfig),
}

impl StackKind {
    pub fn name(&self) -> &'static str {
        match self {
            StackKind::Data(_) => "data",
            StackKind::Global(_) => "global",
            StackKind::FrontEnd(_) => "frontend",
            StackKind::GitHubPipeline(_) => "github-pipeline",
            StackKind::GitHubEnterprisePipeline(_) => "github-enterprise-pipeline",
        }
    }
}

impl std::fmt::Display for StackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stack obtains an IAM role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleConfig {
    /// An existing role.
    Arn(String),
    /// A role issued by the named issuer.
    Issue(RoleIssuerKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleIssuerKind {
    Alks,
    Iam,
}

impl std::fmt::Display for RoleIssuerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleIssuerKind::Alks => write!(f, "alks"),
            RoleIssuerKind::Iam => write!(f, "iam"),
        }
    }
}

impl std::str::FromStr for RoleIssuerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alks" => Ok(RoleIssuerKind::Alks),
            "iam" => Ok(RoleIssuerKind::Iam),
            _ => Err(format!("Unknown role issuer: {}", s)),
        }
    }
}

/// App bucket and access identity shared with a global stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataStackConfig {
    pub bucket_name: String,
    pub versioned: bool,
    /// Prefix of the export names other stacks import.
    pub export_prefix: String,
    /// Publish the bucket name under this SSM parameter.
    pub parameter_key: Option<String>,
}

/// Distribution over a data stack's bucket plus an API origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalStackConfig {
    pub data_stack: String,
    /// Export prefix of `data_stack`, filled in from its definition.
    pub data_export_prefix: String,
    pub domain_name: String,
    pub zone_name: Option<String>,
    pub certificate_parameter: String,
    pub origin_path: String,
    pub api_domain: Option<String>,
    pub api_path_pattern: String,
    pub log_bucket: Option<String>,
    pub tls_policy: String,
}

/// Static site: bucket, distribution and DNS record in one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontEndStackConfig {
    pub record_name: String,
    pub zone_name: String,
    pub bucket_name: String,
    pub origin_path: String,
    pub certificate_parameter: String,
}

/// GitHub source, build and test stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHubPipelineConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token_parameter: String,
    pub artifact_bucket: String,
    pub role: RoleConfig,
    pub build_role: RoleConfig,
    pub build: BuildConfig,
}

/// GitHub Enterprise repository mirrored into a bucket by a watcher
/// project, then built and tested by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHubEnterprisePipelineConfig {
    pub clone_url: String,
    pub branch: Option<String>,
    pub watcher_project_name: String,
    pub source_bucket: String,
    pub source_key: String,
    pub artifact_bucket: String,
    pub role: RoleConfig,
    pub build_role: RoleConfig,
    pub build: BuildConfig,
}

/// Build spec files and runtime shared by the build and test projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
    pub build_spec: String,
    pub test_spec: String,
    pub image: Option<String>,
    pub compute_type: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_spec: "buildspec.yml".to_string(),
            test_spec: "buildspec-test.yml".to_string(),
            image: None,
            compute_type: None,
        }
    }
}
