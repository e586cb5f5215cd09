//! Deployment environment of a stack.

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Pseudo};

/// Account and region a stack deploys into.
///
/// Either may be left unset, in which case templates fall back to the
/// `AWS::AccountId` / `AWS::Region` pseudo parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
    /// ARN partition, `aws` unless deploying to China or GovCloud.
    pub partition: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
            partition: "aws".to_string(),
        }
    }

    /// An environment resolved only at deploy time.
    pub fn agnostic() -> Self {
        Self {
            account: None,
            region: None,
            partition: "aws".to_string(),
        }
    }

    pub fn account_expr(&self) -> Expr {
        match &self.account {
            Some(account) => Expr::literal(account),
            None => Expr::pseudo(Pseudo::AccountId),
        }
    }

    pub fn region_expr(&self) -> Expr {
        match &self.region {
            Some(region) => Expr::literal(region),
            None => Expr::pseudo(Pseudo::Region),
        }
    }

    /// The `arn:<partition>:iam::<account>:root` principal ARN.
    pub fn account_root_arn(&self) -> Expr {
        Expr::join(
            "",
            vec![
                Expr::literal(format!("arn:{}:iam::", self.partition)),
                self.account_expr(),
                Expr::literal(":root"),
            ],
        )
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::agnostic()
    }
}
