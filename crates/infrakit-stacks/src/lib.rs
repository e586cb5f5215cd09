//! Stack assemblies for infrakit apps.
//!
//! Each stack kind is a function taking one configuration struct and the
//! lookups it needs, and returning a synthesizable [`Stack`]. [`build_app`]
//! assembles every stack of an [`AppConfig`] in declaration order.

pub mod data;
pub mod frontend;
pub mod github;
pub mod github_enterprise;
pub mod global;
mod pipeline_common;

pub use data::{DataExports, data_stack};
pub use frontend::frontend_stack;
pub use github::github_pipeline_stack;
pub use github_enterprise::github_enterprise_pipeline_stack;
pub use global::global_stack;

use infrakit_config::{AppConfig, LookupConfig, StackConfig, StackKind};
use infrakit_core::lookup::{ContextHostedZones, StaticParameters};
use infrakit_core::{App, Environment, Result, Stack};
use tracing::{debug, info};

/// Parameter and hosted zone lookups resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub parameters: StaticParameters,
    pub hosted_zones: ContextHostedZones,
}

impl Lookups {
    pub fn from_config(config: &LookupConfig) -> Self {
        let mut parameters = StaticParameters::new().with_ssm_fallback(config.ssm_fallback);
        for (name, value) in &config.parameters {
            parameters.insert(name, value);
        }
        let mut hosted_zones = ContextHostedZones::new();
        for (domain_name, zone_id) in &config.hosted_zones {
            hosted_zones.insert(domain_name, zone_id);
        }
        Self {
            parameters,
            hosted_zones,
        }
    }
}

/// The environment of `stack`, falling back to the app environment.
pub fn stack_environment(app: &AppConfig, stack: &StackConfig) -> Environment {
    Environment {
        account: stack.account.clone().or_else(|| app.env.account.clone()),
        region: stack.region.clone().or_else(|| app.env.region.clone()),
        partition: app
            .env
            .partition
            .clone()
            .unwrap_or_else(|| "aws".to_string()),
    }
}

/// Assemble one configured stack.
pub fn build_stack(app: &AppConfig, config: &StackConfig, lookups: &Lookups) -> Result<Stack> {
    let name = config.name.as_str();
    let env = stack_environment(app, config);
    debug!(stack = name, kind = %config.kind, "assembling stack");

    let mut stack = match &config.kind {
        StackKind::Data(data) => data_stack(name, env, data)?,
        StackKind::Global(global) => global_stack(
            name,
            env,
            global,
            &lookups.parameters,
            &lookups.hosted_zones,
        )?,
        StackKind::FrontEnd(frontend) => frontend_stack(
            name,
            env,
            frontend,
            &lookups.parameters,
            &lookups.hosted_zones,
        )?,
        StackKind::GitHubPipeline(github) => github_pipeline_stack(name, env, github)?,
        StackKind::GitHubEnterprisePipeline(enterprise) => {
            github_enterprise_pipeline_stack(name, env, enterprise)?
        }
    };

    if let Some(description) = &config.description {
        stack = stack.with_description(description);
    }
    for dependency in &config.needs {
        stack.add_dependency(dependency);
    }
    Ok(stack)
}

/// Assemble every stack of `config` into an app ready to synthesize.
pub fn build_app(config: &AppConfig) -> Result<App> {
    let lookups = Lookups::from_config(&config.lookups);
    let mut app = App::new();
    for stack_config in &config.stacks {
        app.add_stack(build_stack(config, stack_config, &lookups)?)?;
    }
    info!(app = %config.name, stacks = app.stacks().len(), "assembled app");
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_config::{VariableContext, parse_app_config};
    use infrakit_core::Error;

    const SITE: &str = r#"
        app "site"
        env account="123456789012" region="us-east-1"

        lookups {
            parameter "/acm/site" "arn:aws:acm:us-east-1:123456789012:certificate/abc"
            hosted-zone "example.com" "Z0123456789"
        }

        stack "Global" kind="global" data-stack="Data" {
            description "Site distribution"
            domain-name "www.example.com"
            certificate-parameter "/acm/site"
            api-domain "api.example.com"
        }

        stack "Data" kind="data" {
            region "us-west-2"
            bucket-name "${app.name}-data-${account}"
        }
    "#;

    fn app_config(kdl: &str) -> AppConfig {
        parse_app_config(kdl, &VariableContext::new()).unwrap()
    }

    #[test]
    fn test_build_app_orders_data_before_global() {
        let config = app_config(SITE);
        let app = build_app(&config).unwrap();
        let assembly = app.synth().unwrap();

        let order: Vec<&str> = assembly
            .artifacts
            .iter()
            .map(|a| a.stack_name.as_str())
            .collect();
        assert_eq!(order, vec!["Data", "Global"]);
        assert_eq!(
            assembly.artifact("Global").unwrap().dependencies,
            vec!["Data".to_string()]
        );
    }

    #[test]
    fn test_stack_environment_overrides() {
        let config = app_config(SITE);
        let app = build_app(&config).unwrap();

        assert_eq!(app.stack("Data").unwrap().env().region.as_deref(), Some("us-west-2"));
        assert_eq!(app.stack("Global").unwrap().env().region.as_deref(), Some("us-east-1"));
        assert_eq!(
            app.stack("Global").unwrap().template().description.as_deref(),
            Some("Site distribution")
        );
    }

    #[test]
    fn test_unknown_parameter_without_fallback() {
        let kdl = r#"
            app "site"
            env account="123456789012" region="us-east-1"
            stack "FrontEnd" kind="frontend" {
                record-name "www"
                zone-name "example.com"
                certificate-parameter "/acm/missing"
            }
        "#;
        let err = build_app(&app_config(kdl)).unwrap_err();
        assert!(matches!(err, Error::ExternalLookup { .. }));
    }

    #[test]
    fn test_github_token_in_lookups_stays_out_of_template() {
        let kdl = r#"
            app "site"
            env account="123456789012" region="us-east-1"
            lookups {
                parameter "/github/token" "ghp_secret_value"
            }
            stack "Pipeline" kind="github-pipeline" {
                owner "acme"
                repo "site"
                token-parameter "/github/token"
                artifact-bucket "artifacts-${account}"
                role issuer="iam"
                build-role issuer="iam"
            }
        "#;
        let assembly = build_app(&app_config(kdl)).unwrap().synth().unwrap();
        let json = assembly
            .artifact("Pipeline")
            .unwrap()
            .template
            .to_json_pretty()
            .unwrap();

        assert!(!json.contains("ghp_secret_value"));
        assert!(json.contains("\"NoEcho\": true"));
    }

    #[test]
    fn test_ssm_fallback_references_parameter() {
        let kdl = r#"
            app "site"
            env account="123456789012" region="us-east-1"
            lookups {
                hosted-zone "example.com" "Z0123456789"
                ssm-fallback #true
            }
            stack "FrontEnd" kind="frontend" {
                record-name "www"
                zone-name "example.com"
                certificate-parameter "/acm/site"
            }
        "#;
        let app = build_app(&app_config(kdl)).unwrap();
        let template = app.stack("FrontEnd").unwrap().synth();
        assert_eq!(template.parameters.len(), 1);
    }
}
