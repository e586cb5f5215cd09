//! Core types for infrakit.
//!
//! This crate contains:
//! - Logical identifiers and the expression model (Ref, GetAtt, Join, ...)
//! - IAM policy documents
//! - Stacks, templates and the app that synthesizes them
//! - Collaborator traits for external lookups (parameters, hosted zones)

pub mod app;
pub mod env;
pub mod error;
pub mod expr;
pub mod graph;
pub mod id;
pub mod lookup;
pub mod policy;
pub mod stack;
pub mod template;

pub use app::{App, CloudAssembly};
pub use env::Environment;
pub use error::{Error, Result};
pub use expr::Expr;
pub use id::LogicalId;
pub use stack::Stack;
