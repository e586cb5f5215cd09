//! Variable interpolation for configuration values.
//!
//! Supports variables like:
//! - `${account}` - Account id of the app environment
//! - `${region}` - Region of the app environment
//! - `${partition}` - ARN partition (`aws` by default)
//! - `${app.name}` - App name
//! - `${stack.name}` - Name of the stack being parsed
//! - `${env.VAR_NAME}` - Environment variable

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub app_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub partition: Option<String>,
    /// Set while a stack block is being parsed.
    pub stack_name: Option<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("valid regex")
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context holding the current process environment.
    pub fn from_process_env() -> Self {
        let mut ctx = Self::new();
        ctx.populate_env();
        ctx
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// A copy of this context scoped to one stack.
    pub fn for_stack(&self, stack_name: &str) -> Self {
        Self {
            stack_name: Some(stack_name.to_string()),
            ..self.clone()
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["account"] => self.account.clone(),
            ["region"] => self.region.clone(),
            ["partition"] => Some(
                self.partition
                    .clone()
                    .unwrap_or_else(|| "aws".to_string()),
            ),
            ["app", "name"] if !self.app_name.is_empty() => Some(self.app_name.clone()),
            ["stack", "name"] => self.stack_name.clone(),
            ["env", name] => self.env.get(*name).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left as written.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate, failing on the first variable that cannot be resolved.
    pub fn interpolate_strict(&self, input: &str) -> Result<String, String> {
        if let Some(unresolved) = VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .find(|name| self.resolve(name).is_none())
        {
            return Err(format!("${{{}}}", unresolved));
        }
        Ok(self.interpolate(input))
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.ctx.app_name = name.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.ctx.account = Some(account.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.ctx.region = Some(region.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
