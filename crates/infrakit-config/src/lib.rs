//! KDL configuration parsing for infrakit.
//!
//! This crate handles parsing of:
//! - App definitions (infrakit.kdl)
//! - Variable interpolation

pub mod app;
pub mod error;
pub mod model;
pub mod variables;

pub use app::{load_app_config, parse_app_config};
pub use error::{ConfigError, ConfigResult};
pub use model::{
    AppConfig, BuildConfig, DataStackConfig, EnvConfig, FrontEndStackConfig,
    GitHubEnterprisePipelineConfig, GitHubPipelineConfig, GlobalStackConfig, LookupConfig,
    RoleConfig, RoleIssuerKind, StackConfig, StackKind,
};
pub use variables::{VariableContext, VariableContextBuilder};
