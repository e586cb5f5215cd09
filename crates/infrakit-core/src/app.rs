//! The app: a set of stacks synthesized together into a cloud assembly.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use crate::graph::topological_order;
use crate::template::Template;
use crate::{Environment, Error, Result, Stack};

/// Manifest schema version written to `manifest.json`.
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        if self.stacks.iter().any(|s| s.name() == stack.name()) {
            return Err(Error::DuplicateConstruct {
                stack: "app".to_string(),
                path: stack.name().to_string(),
            });
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    /// Synthesize every stack, dependencies first.
    pub fn synth(&self) -> Result<CloudAssembly> {
        let names: Vec<&str> = self.stacks.iter().map(Stack::name).collect();
        let mut needs: HashMap<&str, Vec<&str>> = HashMap::new();

        for stack in &self.stacks {
            for dep in stack.dependencies() {
                if !names.contains(&dep) {
                    return Err(Error::invalid(
                        format!("stack '{}' dependency", stack.name()),
                        format!("unknown stack '{dep}'"),
                    ));
                }
                needs.entry(stack.name()).or_default().push(dep);
            }
        }

        let order = topological_order(&names, &needs).map_err(Error::CycleDetected)?;

        let mut artifacts = Vec::with_capacity(order.len());
        for name in order {
            let Some(stack) = self.stack(name) else {
                continue;
            };
            artifacts.push(StackArtifact {
                stack_name: name.to_string(),
                environment: stack.env().clone(),
                dependencies: stack.dependencies().map(String::from).collect(),
                template: stack.synth(),
            });
        }

        info!(stacks = artifacts.len(), "synthesized app");
        Ok(CloudAssembly { artifacts })
    }
}

/// One synthesized stack.
#[derive(Debug, Clone)]
pub struct StackArtifact {
    pub stack_name: String,
    pub environment: Environment,
    pub dependencies: Vec<String>,
    pub template: Template,
}

impl StackArtifact {
    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.stack_name)
    }
}

/// All synthesized stacks, in deployment order.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub artifacts: Vec<StackArtifact>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: &'static str,
    artifacts: BTreeMap<&'a str, ManifestArtifact<'a>>,
}

#[derive(Serialize)]
struct ManifestArtifact<'a> {
    #[serde(rename = "type")]
    artifact_type: &'static str,
    environment: String,
    properties: ManifestProperties,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    dependencies: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestProperties {
    template_file: String,
}

impl CloudAssembly {
    pub fn artifact(&self, stack_name: &str) -> Option<&StackArtifact> {
        self.artifacts.iter().find(|a| a.stack_name == stack_name)
    }

    /// Keep only the named stacks.
    pub fn select(mut self, stack_names: &[String]) -> Result<Self> {
        for name in stack_names {
            if self.artifact(name).is_none() {
                return Err(Error::invalid("stack", format!("unknown stack '{name}'")));
            }
        }
        if !stack_names.is_empty() {
            self.artifacts.retain(|a| stack_names.contains(&a.stack_name));
        }
        Ok(self)
    }

    /// The `manifest.json` document describing the assembly.
    pub fn manifest_json(&self) -> Result<String> {
        let artifacts = self
            .artifacts
            .iter()
            .map(|a| {
                (
                    a.stack_name.as_str(),
                    ManifestArtifact {
                        artifact_type: "aws:cloudformation:stack",
                        environment: format!(
                            "aws://{}/{}",
                            a.environment.account.as_deref().unwrap_or("unknown-account"),
                            a.environment.region.as_deref().unwrap_or("unknown-region"),
                        ),
                        properties: ManifestProperties {
                            template_file: a.template_file(),
                        },
                        dependencies: &a.dependencies,
                    },
                )
            })
            .collect();

        Ok(serde_json::to_string_pretty(&Manifest {
            version: MANIFEST_VERSION,
            artifacts,
        })?)
    }

    /// Write every template plus `manifest.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.artifacts.len() + 1);
        for artifact in &self.artifacts {
            let path = dir.join(artifact.template_file());
            std::fs::write(&path, artifact.template.to_json_pretty()?)?;
            info!(stack = %artifact.stack_name, path = %path.display(), "wrote template");
            written.push(path);
        }

        let manifest = dir.join("manifest.json");
        std::fs::write(&manifest, self.manifest_json()?)?;
        written.push(manifest);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_orders_dependencies_first() {
        let mut app = App::new();
        let mut global = Stack::new("Global", Environment::agnostic());
        global.add_dependency("Data");
        app.add_stack(global).unwrap();
        app.add_stack(Stack::new("Data", Environment::agnostic()))
            .unwrap();

        let assembly = app.synth().unwrap();
        let order: Vec<&str> = assembly
            .artifacts
            .iter()
            .map(|a| a.stack_name.as_str())
            .collect();
        assert_eq!(order, vec!["Data", "Global"]);
    }

    #[test]
    fn test_synth_rejects_unknown_dependency() {
        let mut app = App::new();
        let mut global = Stack::new("Global", Environment::agnostic());
        global.add_dependency("Missing");
        app.add_stack(global).unwrap();

        assert!(matches!(
            app.synth().unwrap_err(),
            Error::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_synth_rejects_cycles() {
        let mut app = App::new();
        let mut a = Stack::new("A", Environment::agnostic());
        a.add_dependency("B");
        let mut b = Stack::new("B", Environment::agnostic());
        b.add_dependency("A");
        app.add_stack(a).unwrap();
        app.add_stack(b).unwrap();

        assert!(matches!(app.synth().unwrap_err(), Error::CycleDetected(_)));
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let mut app = App::new();
        app.add_stack(Stack::new("A", Environment::agnostic()))
            .unwrap();
        assert!(
            app.add_stack(Stack::new("A", Environment::agnostic()))
                .is_err()
        );
    }

    #[test]
    fn test_manifest_lists_templates() {
        let mut app = App::new();
        app.add_stack(Stack::new(
            "FrontEnd",
            Environment::new("123456789012", "us-east-1"),
        ))
        .unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&app.synth().unwrap().manifest_json().unwrap()).unwrap();
        let artifact = &manifest["artifacts"]["FrontEnd"];
        assert_eq!(artifact["type"], "aws:cloudformation:stack");
        assert_eq!(artifact["environment"], "aws://123456789012/us-east-1");
        assert_eq!(
            artifact["properties"]["templateFile"],
            "FrontEnd.template.json"
        );
    }
}
