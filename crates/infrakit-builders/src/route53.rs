//! DNS alias records in front of CloudFront distributions.

use infrakit_core::error::missing_fields;
use infrakit_core::lookup::{HostedZone, HostedZoneLookup};
use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::info;

use crate::cloudfront::Distribution;
use crate::non_blank;

pub const RECORD_SET_TYPE: &str = "AWS::Route53::RecordSet";

/// Hosted zone that owns every `*.cloudfront.net` alias target.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

static RECORD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+").expect("valid regex"));

/// Builds an `A` alias record.
#[derive(Debug, Clone, Default)]
pub struct Route53Builder {
    record_name: Option<String>,
    zone_name: Option<String>,
    target: Option<Expr>,
}

impl Route53Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a fully qualified name into record and zone.
    ///
    /// The record is the leading word and the zone whatever follows its dot:
    /// `www.example.com` gives `www` in `example.com`. Names whose leading
    /// word is not followed by a dot (`frontend-template.example.com`) only
    /// set the record; the zone must then be set explicitly.
    pub fn set_domain_name(mut self, domain_name: &str) -> Self {
        let domain_name = domain_name.trim().trim_end_matches('.');
        match RECORD_NAME_RE.find(domain_name) {
            Some(word) => {
                self.record_name = non_blank(word.as_str());
                self.zone_name = domain_name[word.end()..]
                    .strip_prefix('.')
                    .and_then(non_blank);
            }
            None => {
                self.record_name = None;
                self.zone_name = None;
            }
        }
        self
    }

    pub fn set_zone_name(mut self, zone_name: impl Into<String>) -> Self {
        self.zone_name = non_blank(zone_name.into().trim_end_matches('.'));
        self
    }

    pub fn set_record_name(mut self, record_name: impl Into<String>) -> Self {
        self.record_name = non_blank(record_name);
        self
    }

    pub fn add_cloudfront_target(mut self, distribution: &Distribution) -> Self {
        self.target = Some(distribution.domain_name.clone());
        self
    }

    /// Create the record, resolving the zone id through `zones`.
    pub fn build_a_record(
        self,
        stack: &mut Stack,
        id: &str,
        zones: &dyn HostedZoneLookup,
    ) -> Result<RecordSet> {
        let construct_id = format!("{id}-ARecord");
        let (Some(record_name), Some(zone_name), Some(target)) =
            (self.record_name.as_ref(), self.zone_name.as_ref(), self.target.as_ref())
        else {
            return Err(Error::missing(
                format!("Route53 record '{construct_id}'"),
                missing_fields(&[
                    ("record_name", self.record_name.is_some()),
                    ("zone_name", self.zone_name.is_some()),
                    ("cloudfront_target", self.target.is_some()),
                ]),
            ));
        };

        let zone = zones.find_zone(zone_name)?;
        let fqdn = format!("{record_name}.{}", zone.name);

        let properties = RecordSetProperties {
            hosted_zone_id: &zone.id,
            name: format!("{fqdn}."),
            record_type: "A",
            alias_target: AliasTarget {
                dns_name: target.clone(),
                hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID,
            },
        };
        let logical_id =
            stack.add_resource(&construct_id, Resource::new(RECORD_SET_TYPE, properties)?)?;

        info!(record = %fqdn, zone_id = %zone.id, logical_id = %logical_id, "built alias record");

        Ok(RecordSet {
            logical_id,
            name: fqdn,
            zone,
        })
    }
}

/// An alias record created in this stack.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub logical_id: LogicalId,
    /// Fully qualified name without the trailing dot.
    pub name: String,
    pub zone: HostedZone,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RecordSetProperties<'a> {
    hosted_zone_id: &'a str,
    name: String,
    #[serde(rename = "Type")]
    record_type: &'static str,
    alias_target: AliasTarget,
}

#[derive(Serialize)]
struct AliasTarget {
    #[serde(rename = "DNSName")]
    dns_name: Expr,
    #[serde(rename = "HostedZoneId")]
    hosted_zone_id: &'static str,
}
