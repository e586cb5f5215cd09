//! App configuration parsing.

use crate::model::{
    AppConfig, BuildConfig, DataStackConfig, EnvConfig, FrontEndStackConfig,
    GitHubEnterprisePipelineConfig, GitHubPipelineConfig, GlobalStackConfig, LookupConfig,
    RoleConfig, RoleIssuerKind, StackConfig, StackKind,
};
use crate::{ConfigError, ConfigResult, VariableContext};
use infrakit_core::graph::topological_order;
use kdl::{KdlDocument, KdlNode};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

const STACK_KEYS: &[&str] = &["description", "needs", "account", "region"];
const DATA_KEYS: &[&str] = &["bucket-name", "versioned", "export-prefix", "parameter-key"];
const GLOBAL_KEYS: &[&str] = &[
    "data-stack",
    "domain-name",
    "zone-name",
    "certificate-parameter",
    "origin-path",
    "api-domain",
    "api-path-pattern",
    "log-bucket",
    "tls-policy",
];
const FRONTEND_KEYS: &[&str] = &[
    "record-name",
    "zone-name",
    "bucket-name",
    "origin-path",
    "certificate-parameter",
];
const BUILD_KEYS: &[&str] = &[
    "artifact-bucket",
    "role",
    "build-role",
    "build-spec",
    "test-spec",
    "image",
    "compute-type",
];
const GITHUB_KEYS: &[&str] = &["owner", "repo", "branch", "token-parameter"];
const GITHUB_ENTERPRISE_KEYS: &[&str] = &[
    "clone-url",
    "branch",
    "watcher-project-name",
    "source-bucket",
    "source-key",
];

/// Read and parse an app configuration file.
pub fn load_app_config(path: &Path, ctx: &VariableContext) -> ConfigResult<AppConfig> {
    let kdl = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "loaded app configuration");
    parse_app_config(&kdl, ctx)
}

/// Parse an app configuration from KDL text.
///
/// `ctx` supplies the environment variables visible to `${env.*}`; the app
/// name and environment are filled in from the document itself.
pub fn parse_app_config(kdl: &str, ctx: &VariableContext) -> ConfigResult<AppConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut ctx = ctx.clone();

    let mut name = String::new();
    let mut env = EnvConfig::default();
    let mut lookups = LookupConfig::default();
    let mut stack_nodes = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "app" => {
                name = get_first_string_arg(node)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingField("app name".to_string()))?;
            }
            "env" => env = parse_env(node, &ctx)?,
            "lookups" => lookups = parse_lookups(node, &ctx)?,
            // Stack values may refer to the app name and environment, which
            // can appear anywhere in the document.
            "stack" => stack_nodes.push(node),
            other => warn!(node = other, "ignoring unknown configuration node"),
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("app name".to_string()));
    }

    ctx.app_name = name.clone();
    ctx.account = env.account.clone();
    ctx.region = env.region.clone();
    ctx.partition = env.partition.clone();

    let mut stacks: Vec<StackConfig> = Vec::new();
    for node in stack_nodes {
        let stack = parse_stack(node, &ctx)?;
        if stacks.iter().any(|s| s.name == stack.name) {
            return Err(ConfigError::Duplicate(format!("stack '{}'", stack.name)));
        }
        stacks.push(stack);
    }

    link_data_stacks(&mut stacks)?;

    // Validate DAG - check for missing dependencies
    let stack_names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
    for stack in &stacks {
        for dep in &stack.needs {
            if !stack_names.contains(&dep.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "stack '{}' depends on unknown stack '{}'",
                    stack.name, dep
                )));
            }
        }
    }

    check_acyclic(&stacks)?;

    debug!(app = %name, stacks = stacks.len(), "parsed app configuration");
    Ok(AppConfig {
        name,
        env,
        lookups,
        stacks,
    })
}

fn parse_env(node: &KdlNode, ctx: &VariableContext) -> ConfigResult<EnvConfig> {
    let field = |key: &str| -> ConfigResult<Option<String>> {
        get_string_prop(node, key)
            .filter(|v| !v.trim().is_empty())
            .map(|v| interpolate(ctx, &format!("env {key}"), &v))
            .transpose()
    };

    Ok(EnvConfig {
        account: field("account")?,
        region: field("region")?,
        partition: field("partition")?,
    })
}

fn parse_lookups(node: &KdlNode, ctx: &VariableContext) -> ConfigResult<LookupConfig> {
    let mut lookups = LookupConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "parameter" => {
                    let (key, value) = key_value_args(child, "parameter")?;
                    let value = interpolate(ctx, &format!("parameter '{key}'"), &value)?;
                    if lookups.parameters.insert(key.clone(), value).is_some() {
                        return Err(ConfigError::Duplicate(format!("parameter '{key}'")));
                    }
                }
                "hosted-zone" => {
                    let (domain, zone_id) = key_value_args(child, "hosted-zone")?;
                    if lookups.hosted_zones.insert(domain.clone(), zone_id).is_some() {
                        return Err(ConfigError::Duplicate(format!("hosted zone '{domain}'")));
                    }
                }
                "ssm-fallback" => {
                    lookups.ssm_fallback = get_first_bool_arg(child).unwrap_or(true);
                }
                other => warn!(node = other, "ignoring unknown lookup"),
            }
        }
    }

    Ok(lookups)
}

fn key_value_args(node: &KdlNode, what: &str) -> ConfigResult<(String, String)> {
    match get_all_string_args(node).as_slice() {
        [key, value] if !key.trim().is_empty() => Ok((key.clone(), value.clone())),
        _ => Err(ConfigError::invalid(
            what,
            "expected a name and a value, e.g. `parameter \"/name\" \"value\"`",
        )),
    }
}

fn parse_stack(node: &KdlNode, ctx: &VariableContext) -> ConfigResult<StackConfig> {
    let name = get_first_string_arg(node)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("stack name".to_string()))?;
    let kind = get_string_prop(node, "kind")
        .ok_or_else(|| ConfigError::missing("kind", &format!("stack '{name}'")))?;

    let block = StackBlock::new(node, &name, ctx)?;

    let kind = match kind.as_str() {
        "data" => {
            block.check_keys(&[DATA_KEYS]);
            StackKind::Data(parse_data(&block)?)
        }
        "global" => {
            block.check_keys(&[GLOBAL_KEYS]);
            StackKind::Global(parse_global(&block)?)
        }
        "frontend" => {
            block.check_keys(&[FRONTEND_KEYS]);
            StackKind::FrontEnd(parse_frontend(&block)?)
        }
        "github-pipeline" => {
            block.check_keys(&[GITHUB_KEYS, BUILD_KEYS]);
            StackKind::GitHubPipeline(parse_github_pipeline(&block)?)
        }
        "github-enterprise-pipeline" => {
            block.check_keys(&[GITHUB_ENTERPRISE_KEYS, BUILD_KEYS]);
            StackKind::GitHubEnterprisePipeline(parse_github_enterprise_pipeline(&block)?)
        }
        other => {
            return Err(ConfigError::invalid(
                format!("kind of stack '{name}'"),
                format!("unknown stack kind: {other}"),
            ));
        }
    };

    let description = block.optional("description")?;
    let (account, region) = (block.account.clone(), block.region.clone());
    let mut needs = get_string_list_prop(node, "needs");
    needs.dedup();

    Ok(StackConfig {
        name,
        description,
        needs,
        account,
        region,
        kind,
    })
}

fn parse_data(block: &StackBlock<'_>) -> ConfigResult<DataStackConfig> {
    Ok(DataStackConfig {
        bucket_name: block.required("bucket-name")?,
        versioned: block.flag("versioned")?.unwrap_or(true),
        export_prefix: block
            .optional("export-prefix")?
            .unwrap_or_else(|| block.name.to_string()),
        parameter_key: block.optional("parameter-key")?,
    })
}

fn parse_global(block: &StackBlock<'_>) -> ConfigResult<GlobalStackConfig> {
    let data_stack = get_string_prop(block.node, "data-stack")
        .or(block.optional("data-stack")?)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| block.missing("data-stack"))?;

    Ok(GlobalStackConfig {
        data_stack,
        // Filled in once every stack has been parsed.
        data_export_prefix: String::new(),
        domain_name: block.required("domain-name")?,
        zone_name: block.optional("zone-name")?,
        certificate_parameter: block.required("certificate-parameter")?,
        origin_path: block
            .optional("origin-path")?
            .unwrap_or_else(|| "/public".to_string()),
        api_domain: block.optional("api-domain")?,
        api_path_pattern: block
            .optional("api-path-pattern")?
            .unwrap_or_else(|| "api/*".to_string()),
        log_bucket: block.optional("log-bucket")?,
        tls_policy: block
            .optional("tls-policy")?
            .unwrap_or_else(|| "TLSv1.2_2018".to_string()),
    })
}

fn parse_frontend(block: &StackBlock<'_>) -> ConfigResult<FrontEndStackConfig> {
    let record_name = block.required("record-name")?;
    let bucket_name = match block.optional("bucket-name")? {
        Some(bucket_name) => bucket_name,
        None => block.interpolate(
            "bucket-name",
            &format!("${{region}}-{record_name}-${{account}}"),
        )?,
    };

    Ok(FrontEndStackConfig {
        record_name,
        zone_name: block.required("zone-name")?,
        bucket_name,
        origin_path: block.optional("origin-path")?.unwrap_or_default(),
        certificate_parameter: block.required("certificate-parameter")?,
    })
}

fn parse_github_pipeline(block: &StackBlock<'_>) -> ConfigResult<GitHubPipelineConfig> {
    Ok(GitHubPipelineConfig {
        owner: block.required("owner")?,
        repo: block.required("repo")?,
        branch: block
            .optional("branch")?
            .unwrap_or_else(|| "master".to_string()),
        token_parameter: block.required("token-parameter")?,
        artifact_bucket: block.required("artifact-bucket")?,
        role: block.role("role")?,
        build_role: block.role("build-role")?,
        build: parse_build(block)?,
    })
}

fn parse_github_enterprise_pipeline(
    block: &StackBlock<'_>,
) -> ConfigResult<GitHubEnterprisePipelineConfig> {
    Ok(GitHubEnterprisePipelineConfig {
        clone_url: block.required("clone-url")?,
        branch: block.optional("branch")?,
        watcher_project_name: block
            .optional("watcher-project-name")?
            .unwrap_or_else(|| "CodeBuildWatcher".to_string()),
        source_bucket: block.required("source-bucket")?,
        source_key: block
            .optional("source-key")?
            .unwrap_or_else(|| "codepipelineSourceAction.zip".to_string()),
        artifact_bucket: block.required("artifact-bucket")?,
        role: block.role("role")?,
        build_role: block.role("build-role")?,
        build: parse_build(block)?,
    })
}

fn parse_build(block: &StackBlock<'_>) -> ConfigResult<BuildConfig> {
    let defaults = BuildConfig::default();
    Ok(BuildConfig {
        build_spec: block
            .optional("build-spec")?
            .unwrap_or(defaults.build_spec),
        test_spec: block.optional("test-spec")?.unwrap_or(defaults.test_spec),
        image: block.optional("image")?,
        compute_type: block.optional("compute-type")?,
    })
}

/// Point each global stack at its data stack and make it deploy after it.
fn link_data_stacks(stacks: &mut [StackConfig]) -> ConfigResult<()> {
    let export_prefixes: HashMap<String, String> = stacks
        .iter()
        .filter_map(|s| match &s.kind {
            StackKind::Data(data) => Some((s.name.clone(), data.export_prefix.clone())),
            _ => None,
        })
        .collect();

    for stack in stacks.iter_mut() {
        let StackKind::Global(global) = &mut stack.kind else {
            continue;
        };
        let prefix = export_prefixes.get(&global.data_stack).ok_or_else(|| {
            ConfigError::InvalidReference(format!(
                "stack '{}' uses '{}' as its data stack, which is not a data stack",
                stack.name, global.data_stack
            ))
        })?;
        global.data_export_prefix = prefix.clone();
        if !stack.needs.contains(&global.data_stack) {
            stack.needs.push(global.data_stack.clone());
        }
    }
    Ok(())
}

/// The child nodes of one `stack` block, interpolated in that stack's scope.
struct StackBlock<'a> {
    name: &'a str,
    node: &'a KdlNode,
    ctx: VariableContext,
    account: Option<String>,
    region: Option<String>,
}

impl<'a> StackBlock<'a> {
    fn new(node: &'a KdlNode, name: &'a str, app_ctx: &VariableContext) -> ConfigResult<Self> {
        let mut block = Self {
            name,
            node,
            ctx: app_ctx.for_stack(name),
            account: None,
            region: None,
        };
        block.account = block.optional("account")?;
        block.region = block.optional("region")?;
        if let Some(account) = &block.account {
            block.ctx.account = Some(account.clone());
        }
        if let Some(region) = &block.region {
            block.ctx.region = Some(region.clone());
        }
        Ok(block)
    }

    fn owner(&self) -> String {
        format!("stack '{}'", self.name)
    }

    fn missing(&self, key: &str) -> ConfigError {
        ConfigError::missing(key, &self.owner())
    }

    fn child(&self, key: &str) -> Option<&'a KdlNode> {
        self.node
            .children()
            .and_then(|children| children.nodes().iter().find(|c| c.name().value() == key))
    }

    fn interpolate(&self, key: &str, value: &str) -> ConfigResult<String> {
        interpolate(&self.ctx, &format!("{} of {}", key, self.owner()), value)
    }

    fn optional(&self, key: &str) -> ConfigResult<Option<String>> {
        self.child(key)
            .and_then(get_first_string_arg)
            .filter(|v| !v.trim().is_empty())
            .map(|v| self.interpolate(key, &v))
            .transpose()
    }

    fn required(&self, key: &str) -> ConfigResult<String> {
        self.optional(key)?.ok_or_else(|| self.missing(key))
    }

    fn flag(&self, key: &str) -> ConfigResult<Option<bool>> {
        match self.child(key) {
            None => Ok(None),
            Some(child) => get_first_bool_arg(child).map(Some).ok_or_else(|| {
                ConfigError::invalid(
                    format!("{} of {}", key, self.owner()),
                    "expected #true or #false",
                )
            }),
        }
    }

    /// `role arn="..."`, `role "arn:..."` or `role issuer="alks"`.
    fn role(&self, key: &str) -> ConfigResult<RoleConfig> {
        let child = self.child(key).ok_or_else(|| self.missing(key))?;
        let field = format!("{} of {}", key, self.owner());

        if let Some(arn) = get_string_prop(child, "arn")
            .or_else(|| get_first_string_arg(child))
            .filter(|a| !a.trim().is_empty())
        {
            return Ok(RoleConfig::Arn(interpolate(&self.ctx, &field, &arn)?));
        }

        match get_string_prop(child, "issuer") {
            Some(issuer) => issuer
                .parse::<RoleIssuerKind>()
                .map(RoleConfig::Issue)
                .map_err(|message| ConfigError::invalid(field, message)),
            None => Err(ConfigError::missing(
                format!("{key} arn or issuer"),
                &self.owner(),
            )),
        }
    }

    fn check_keys(&self, kind_keys: &[&[&str]]) {
        let Some(children) = self.node.children() else {
            return;
        };
        for child in children.nodes() {
            let key = child.name().value();
            let known = STACK_KEYS.contains(&key) || kind_keys.iter().any(|keys| keys.contains(&key));
            if !known {
                warn!(stack = self.name, key, "ignoring unknown stack setting");
            }
        }
    }
}

fn interpolate(ctx: &VariableContext, field: &str, value: &str) -> ConfigResult<String> {
    ctx.interpolate_strict(value)
        .map_err(|variable| ConfigError::UnresolvedVariable {
            field: field.to_string(),
            variable,
        })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    // Repeated properties: needs="a" needs="b"
    let result: Vec<String> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_some_and(|n| n.value() == name))
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect();
    if !result.is_empty() {
        return result;
    }

    // Block syntax: needs "a" "b"
    node.children()
        .and_then(|children| children.nodes().iter().find(|c| c.name().value() == name))
        .map(get_all_string_args)
        .unwrap_or_default()
}

/// Reject `needs` chains that loop back on themselves.
fn check_acyclic(stacks: &[StackConfig]) -> ConfigResult<()> {
    let names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
    let needs: HashMap<&str, Vec<&str>> = stacks
        .iter()
        .map(|s| (s.name.as_str(), s.needs.iter().map(String::as_str).collect()))
        .collect();
    topological_order(&names, &needs)
        .map(|_| ())
        .map_err(ConfigError::CycleDetected)
}
