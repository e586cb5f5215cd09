//! Lookups against services outside the template.
//!
//! Stacks never talk to AWS directly: named parameters and hosted zones are
//! resolved through these traits, so synthesis stays deterministic and
//! testable. A failed lookup is an [`Error::ExternalLookup`] and is never
//! retried.

use std::collections::HashMap;
use tracing::debug;

use crate::template::Parameter;
use crate::{Error, Expr, LogicalId, Result, Stack};

/// Template parameter type that makes CloudFormation read an SSM parameter.
pub const SSM_STRING_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<String>";

/// Resolves named string parameters (e.g. `/cert/example-com`).
pub trait ParameterStore {
    /// Return an expression holding the value of `name` inside `stack`.
    fn string_parameter(&self, stack: &mut Stack, name: &str) -> Result<Expr>;
}

/// Parameters supplied up front, usually from the config file.
///
/// Names that are not present either fail the lookup or, with
/// [`StaticParameters::with_ssm_fallback`], become deploy-time SSM references.
#[derive(Debug, Clone, Default)]
pub struct StaticParameters {
    values: HashMap<String, String>,
    ssm_fallback: bool,
}

impl StaticParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_ssm_fallback(mut self, enabled: bool) -> Self {
        self.ssm_fallback = enabled;
        self
    }
}

impl ParameterStore for StaticParameters {
    fn string_parameter(&self, stack: &mut Stack, name: &str) -> Result<Expr> {
        match self.values.get(name) {
            Some(value) => {
                debug!(parameter = name, "resolved parameter from context");
                Ok(Expr::literal(value))
            }
            None if self.ssm_fallback => SsmParameterReference.string_parameter(stack, name),
            None => Err(Error::lookup(
                "parameter",
                name,
                "not present in lookup context",
            )),
        }
    }
}

/// Resolves parameters at deploy time through an SSM-typed template parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsmParameterReference;

impl SsmParameterReference {
    /// Reference a secret such as an OAuth token.
    ///
    /// Secrets are always read at deploy time, whatever the lookup context
    /// holds, and the template parameter is `NoEcho`.
    pub fn secret_parameter(stack: &mut Stack, name: &str) -> Result<Expr> {
        declare_ssm_parameter(stack, name, true)
    }
}

impl ParameterStore for SsmParameterReference {
    fn string_parameter(&self, stack: &mut Stack, name: &str) -> Result<Expr> {
        declare_ssm_parameter(stack, name, false)
    }
}

fn declare_ssm_parameter(stack: &mut Stack, name: &str, no_echo: bool) -> Result<Expr> {
    if name.trim().is_empty() || (name.contains('/') && !name.starts_with('/')) {
        return Err(Error::lookup(
            "parameter",
            name,
            "SSM parameter names must be non-empty and fully qualified",
        ));
    }
    let id = LogicalId::from_path(&["SsmParameterValue", name]);
    debug!(parameter = name, template_parameter = %id, no_echo, "referencing SSM parameter");
    stack.add_parameter(
        id.as_str(),
        Parameter {
            parameter_type: SSM_STRING_PARAMETER_TYPE.to_string(),
            default: Some(name.to_string()),
            description: None,
            no_echo,
        },
    )
}

/// A Route53 hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    /// Zone apex without the trailing dot.
    pub name: String,
}

/// Finds the hosted zone for a domain.
pub trait HostedZoneLookup {
    fn find_zone(&self, domain_name: &str) -> Result<HostedZone>;
}

/// Hosted zones known from context, keyed by domain name.
#[derive(Debug, Clone, Default)]
pub struct ContextHostedZones {
    zones: HashMap<String, String>,
}

impl ContextHostedZones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain_name: &str, zone_id: impl Into<String>) {
        self.zones
            .insert(normalize_domain(domain_name), zone_id.into());
    }

    pub fn with_zone(mut self, domain_name: &str, zone_id: impl Into<String>) -> Self {
        self.insert(domain_name, zone_id);
        self
    }
}

impl HostedZoneLookup for ContextHostedZones {
    fn find_zone(&self, domain_name: &str) -> Result<HostedZone> {
        let name = normalize_domain(domain_name);
        self.zones
            .get(&name)
            .map(|id| HostedZone {
                id: id.clone(),
                name: name.clone(),
            })
            .ok_or_else(|| Error::lookup("hosted zone", domain_name, "no zone in lookup context"))
    }
}

fn normalize_domain(domain_name: &str) -> String {
    domain_name.trim().trim_end_matches('.').to_lowercase()
}
