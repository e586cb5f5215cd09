//! CLI command implementations.

use anyhow::{Context, Result};
use infrakit_config::{AppConfig, VariableContext, load_app_config};
use infrakit_core::CloudAssembly;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

fn load(config: &Path) -> Result<AppConfig> {
    let ctx = VariableContext::from_process_env();
    load_app_config(config, &ctx)
        .with_context(|| format!("failed to load configuration from {}", config.display()))
}

fn assemble(config: &AppConfig) -> Result<CloudAssembly> {
    let app = infrakit_stacks::build_app(config)
        .with_context(|| format!("failed to assemble app '{}'", config.name))?;
    app.synth()
        .with_context(|| format!("failed to synthesize app '{}'", config.name))
}

/// Write the selected stacks (all when `stacks` is empty) and the manifest
/// into `out`, returning the written paths.
pub fn synth(config: &Path, out: &Path, stacks: &[String]) -> Result<Vec<PathBuf>> {
    let app_config = load(config)?;
    let assembly = assemble(&app_config)?
        .select(stacks)
        .context("invalid --stack selection")?;

    let written = assembly
        .write_to(out)
        .with_context(|| format!("failed to write cloud assembly to {}", out.display()))?;
    info!(
        app = %app_config.name,
        stacks = assembly.artifacts.len(),
        out = %out.display(),
        "synthesized"
    );
    Ok(written)
}

/// Parse the configuration and assemble every stack; returns the stack count.
pub fn validate(config: &Path) -> Result<usize> {
    let app_config = load(config)?;
    let assembly = assemble(&app_config)?;
    Ok(assembly.artifacts.len())
}

/// One line of `infrakit list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackListing {
    pub name: String,
    pub kind: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub dependencies: Vec<String>,
}

impl fmt::Display for StackListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\taws://{}/{}",
            self.name,
            self.kind,
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region"),
        )?;
        if !self.dependencies.is_empty() {
            write!(f, "\tneeds {}", self.dependencies.join(","))?;
        }
        Ok(())
    }
}

/// Stacks in deployment order.
pub fn list(config: &Path) -> Result<Vec<StackListing>> {
    let app_config = load(config)?;
    let assembly = assemble(&app_config)?;

    Ok(assembly
        .artifacts
        .iter()
        .map(|artifact| StackListing {
            name: artifact.stack_name.clone(),
            kind: app_config
                .stack(&artifact.stack_name)
                .map(|s| s.kind.to_string())
                .unwrap_or_default(),
            account: artifact.environment.account.clone(),
            region: artifact.environment.region.clone(),
            dependencies: artifact.dependencies.clone(),
        })
        .collect())
}
