//! Stacks: named, synthesizable units of infrastructure.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::template::{Export, Output, Parameter, Resource, Template};
use crate::{Environment, Error, Expr, LogicalId, Result};

/// A stack under construction.
///
/// Builders add resources through [`Stack::add_resource`]; each construct id
/// may be used once per stack.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    template: Template,
    constructs: BTreeSet<String>,
    dependencies: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            env,
            template: Template::new(None),
            constructs: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.template.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Register `resource` under `construct_id` and return its logical id.
    pub fn add_resource(&mut self, construct_id: &str, resource: Resource) -> Result<LogicalId> {
        if construct_id.trim().is_empty() {
            return Err(Error::invalid("construct id", "must not be empty"));
        }
        if !self.constructs.insert(construct_id.to_string()) {
            return Err(Error::DuplicateConstruct {
                stack: self.name.clone(),
                path: construct_id.to_string(),
            });
        }

        let id = LogicalId::from_path(&[construct_id]);
        debug!(
            stack = %self.name,
            construct = construct_id,
            logical_id = %id,
            resource_type = %resource.resource_type,
            "adding resource"
        );
        self.template.resources.insert(id.clone(), resource);
        Ok(id)
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.template.resources.get(id)
    }

    pub fn resource_mut(&mut self, id: &LogicalId) -> Option<&mut Resource> {
        self.template.resources.get_mut(id)
    }

    /// Declare a template parameter and return a `Ref` to it.
    ///
    /// Declaring the same name twice returns the existing parameter.
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Expr> {
        let id = LogicalId::new(name)?;
        self.template
            .parameters
            .entry(id.as_str().to_string())
            .or_insert(parameter);
        Ok(Expr::reference(&id))
    }

    pub fn add_output(
        &mut self,
        name: &str,
        value: Expr,
        export_name: Option<String>,
    ) -> Result<()> {
        let id = LogicalId::new(name)?;
        if self.template.outputs.contains_key(id.as_str()) {
            return Err(Error::DuplicateConstruct {
                stack: self.name.clone(),
                path: format!("output {name}"),
            });
        }
        self.template.outputs.insert(
            id.as_str().to_string(),
            Output {
                value,
                description: None,
                export: export_name.map(|name| Export { name }),
            },
        );
        Ok(())
    }

    /// Export `value` under `export_name` and return the expression another
    /// stack uses to import it.
    pub fn export_value(&mut self, export_name: &str, value: Expr) -> Result<Expr> {
        let output_id = LogicalId::from_path(&["Export", export_name]);
        self.add_output(output_id.as_str(), value, Some(export_name.to_string()))?;
        Ok(Expr::import_value(export_name))
    }

    /// Record that this stack must deploy after `stack_name`.
    pub fn add_dependency(&mut self, stack_name: impl Into<String>) {
        self.dependencies.insert(stack_name.into());
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Freeze the stack into its template.
    pub fn synth(&self) -> Template {
        info!(
            stack = %self.name,
            resources = self.template.resources.len(),
            parameters = self.template.parameters.len(),
            outputs = self.template.outputs.len(),
            "synthesized stack"
        );
        self.template.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic() -> Resource {
        Resource::new("AWS::SNS::Topic", json!({})).unwrap()
    }

    #[test]
    fn test_duplicate_construct_rejected() {
        let mut stack = Stack::new("Demo", Environment::agnostic());
        stack.add_resource("Topic", topic()).unwrap();

        let err = stack.add_resource("Topic", topic()).unwrap_err();
        assert!(matches!(err, Error::DuplicateConstruct { .. }));
    }

    #[test]
    fn test_export_value_returns_import() {
        let mut stack = Stack::new("Data", Environment::agnostic());
        let id = stack.add_resource("Bucket", topic()).unwrap();

        let imported = stack
            .export_value("data-bucket-name", Expr::reference(&id))
            .unwrap();

        assert_eq!(imported, Expr::import_value("data-bucket-name"));
        let template = stack.synth();
        let output = template.outputs.values().next().unwrap();
        assert_eq!(output.export.as_ref().unwrap().name, "data-bucket-name");
        assert_eq!(output.value, Expr::reference(&id));
    }

    #[test]
    fn test_parameter_declared_once() {
        let mut stack = Stack::new("Demo", Environment::agnostic());
        let param = Parameter {
            parameter_type: "String".to_string(),
            default: None,
            description: None,
            no_echo: false,
        };
        let a = stack.add_parameter("Token", param.clone()).unwrap();
        let b = stack.add_parameter("Token", param).unwrap();

        assert_eq!(a, b);
        assert_eq!(stack.template().parameters.len(), 1);
    }
}
