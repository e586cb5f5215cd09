//! CloudFront distributions and origin access identities.

use infrakit_core::template::Resource;
use infrakit_core::{Error, Expr, LogicalId, Result, Stack};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::s3::BucketRef;
use crate::non_blank;

pub const DISTRIBUTION_TYPE: &str = "AWS::CloudFront::Distribution";
pub const ORIGIN_ACCESS_IDENTITY_TYPE: &str = "AWS::CloudFront::CloudFrontOriginAccessIdentity";

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);
const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// An origin access identity, scoping bucket reads to CloudFront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessIdentity {
    /// Set when the identity was created in the current stack.
    pub logical_id: Option<LogicalId>,
    /// The identity id (`Ref` of the identity resource).
    pub id: Expr,
    pub canonical_user_id: Expr,
}

impl AccessIdentity {
    /// Reference an identity created elsewhere, e.g. imported from another stack.
    pub fn imported(id: impl Into<Expr>, canonical_user_id: impl Into<Expr>) -> Self {
        Self {
            logical_id: None,
            id: id.into(),
            canonical_user_id: canonical_user_id.into(),
        }
    }

    /// The `origin-access-identity/cloudfront/<id>` path S3 origins expect.
    pub fn origin_path(&self) -> Expr {
        Expr::join(
            "",
            vec![
                Expr::literal("origin-access-identity/cloudfront/"),
                self.id.clone(),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowedMethods {
    #[default]
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
            AllowedMethods::All => &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachedMethods {
    #[default]
    GetHead,
    GetHeadOptions,
}

impl CachedMethods {
    pub fn methods(self) -> &'static [&'static str] {
        match self {
            CachedMethods::GetHead => &["GET", "HEAD"],
            CachedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

/// Minimum TLS protocol for viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityPolicy {
    TlsV1_2016,
    #[default]
    TlsV1_1_2016,
    TlsV1_2_2018,
    TlsV1_2_2019,
    TlsV1_2_2021,
}

impl SecurityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityPolicy::TlsV1_2016 => "TLSv1_2016",
            SecurityPolicy::TlsV1_1_2016 => "TLSv1.1_2016",
            SecurityPolicy::TlsV1_2_2018 => "TLSv1.2_2018",
            SecurityPolicy::TlsV1_2_2019 => "TLSv1.2_2019",
            SecurityPolicy::TlsV1_2_2021 => "TLSv1.2_2021",
        }
    }
}

impl std::str::FromStr for SecurityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            SecurityPolicy::TlsV1_2016,
            SecurityPolicy::TlsV1_1_2016,
            SecurityPolicy::TlsV1_2_2018,
            SecurityPolicy::TlsV1_2_2019,
            SecurityPolicy::TlsV1_2_2021,
        ]
        .into_iter()
        .find(|policy| policy.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("Unknown security policy: {}", s))
    }
}

/// A bucket-backed origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3OriginSource {
    pub bucket: BucketRef,
    pub access_identity: AccessIdentity,
    /// Root path inside the bucket, e.g. `/` or `/public`.
    pub origin_path: String,
    pub disable_cache: bool,
    /// Required for every bucket origin except the first, which serves `*`.
    pub path_pattern: Option<String>,
}

impl S3OriginSource {
    pub fn new(bucket: BucketRef, access_identity: AccessIdentity, origin_path: &str) -> Self {
        Self {
            bucket,
            access_identity,
            origin_path: origin_path.to_string(),
            disable_cache: false,
            path_pattern: None,
        }
    }

    pub fn with_cache_disabled(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    pub fn with_path_pattern(mut self, path_pattern: impl Into<String>) -> Self {
        self.path_pattern = Some(path_pattern.into());
        self
    }
}

/// A reverse-proxy origin on an external HTTPS domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomOriginSource {
    pub domain_name: Expr,
    /// Requests matching this pattern (e.g. `api/*`) go to the origin.
    pub path_pattern: String,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
}

impl CustomOriginSource {
    pub fn new(domain_name: impl Into<Expr>, path_pattern: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            path_pattern: path_pattern.into(),
            allowed_methods: AllowedMethods::All,
            cached_methods: CachedMethods::GetHead,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginSource {
    S3(S3OriginSource),
    Custom(CustomOriginSource),
}

/// How CloudFront serves requests routed to an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    pub is_default: bool,
    pub path_pattern: Option<String>,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    pub compress: bool,
    pub forward_query_string: bool,
    pub min_ttl: Duration,
    pub default_ttl: Option<Duration>,
    pub max_ttl: Option<Duration>,
}

/// An origin together with its behavior, as frozen by `build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfiguration {
    pub origin_id: String,
    pub origin: OriginSource,
    pub behavior: Behavior,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasConfig {
    pub acm_cert_ref: Expr,
    pub names: Vec<String>,
    pub security_policy: SecurityPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub bucket: BucketRef,
    pub prefix: String,
}

/// The frozen configuration of a distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSpec {
    pub default_root_object: String,
    pub sources: Vec<SourceConfiguration>,
    pub alias: Option<AliasConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Builds a CloudFront web distribution.
///
/// The first bucket origin added becomes the default behavior; later bucket
/// origins and all custom origins are matched by path pattern in the order
/// they were added. Overlapping patterns are not detected: CloudFront uses
/// the first match.
#[derive(Debug, Clone, Default)]
pub struct CloudFrontBuilder {
    origins: Vec<OriginSource>,
    alias: Option<(Expr, Vec<String>)>,
    security_policy: SecurityPolicy,
    logging: Option<LoggingConfig>,
}

impl CloudFrontBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the distribution under `names` with the given ACM certificate.
    pub fn set_alias_configuration(
        mut self,
        acm_cert_ref: impl Into<Expr>,
        names: Vec<String>,
    ) -> Self {
        self.alias = Some((acm_cert_ref.into(), names));
        self
    }

    /// Override the viewer TLS policy of the alias (`TLSv1.1_2016` by default).
    pub fn set_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = policy;
        self
    }

    pub fn set_logging_configuration(mut self, bucket: BucketRef, prefix: impl Into<String>) -> Self {
        self.logging = Some(LoggingConfig {
            bucket,
            prefix: prefix.into(),
        });
        self
    }

    pub fn add_s3_origin_source(mut self, source: S3OriginSource) -> Self {
        self.origins.push(OriginSource::S3(source));
        self
    }

    pub fn add_custom_origin_source(mut self, source: CustomOriginSource) -> Self {
        self.origins.push(OriginSource::Custom(source));
        self
    }

    /// Create an origin access identity in `stack`.
    pub fn build_origin_access_identity(
        stack: &mut Stack,
        id: &str,
        comment: Option<&str>,
    ) -> Result<AccessIdentity> {
        let properties = OriginAccessIdentityProperties {
            cloud_front_origin_access_identity_config: OriginAccessIdentityConfig {
                comment: comment
                    .and_then(non_blank)
                    .unwrap_or_else(|| format!("Identity for {id}")),
            },
        };
        let logical_id = stack.add_resource(
            &format!("{id}-OriginAccessIdentity"),
            Resource::new(ORIGIN_ACCESS_IDENTITY_TYPE, properties)?,
        )?;

        Ok(AccessIdentity {
            id: Expr::reference(&logical_id),
            canonical_user_id: Expr::get_att(&logical_id, "S3CanonicalUserId"),
            logical_id: Some(logical_id),
        })
    }

    fn validate(&self, resource: &str) -> Result<()> {
        let mut missing: Vec<String> = Vec::new();
        let mut seen_default = false;

        for (index, origin) in self.origins.iter().enumerate() {
            match origin {
                OriginSource::S3(s3) => {
                    if s3.bucket.name.is_blank() {
                        missing.push(format!("origins[{index}].bucket"));
                    }
                    if s3.access_identity.id.is_blank() {
                        missing.push(format!("origins[{index}].access_identity"));
                    }
                    if seen_default
                        && s3.path_pattern.as_deref().and_then(non_blank).is_none()
                    {
                        missing.push(format!("origins[{index}].path_pattern"));
                    }
                    seen_default = true;
                }
                OriginSource::Custom(custom) => {
                    if custom.domain_name.is_blank() {
                        missing.push(format!("origins[{index}].domain_name"));
                    }
                    if custom.path_pattern.trim().is_empty() {
                        missing.push(format!("origins[{index}].path_pattern"));
                    }
                }
            }
        }

        if !seen_default {
            missing.push("s3_origin_source".to_string());
        }

        if let Some((cert, names)) = &self.alias {
            if cert.is_blank() {
                missing.push("alias.acm_cert_ref".to_string());
            }
            if names.iter().all(|n| n.trim().is_empty()) {
                missing.push("alias.names".to_string());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingConfiguration {
                resource: resource.to_string(),
                fields: missing,
            })
        }
    }

    pub fn build(self, stack: &mut Stack, id: &str) -> Result<Distribution> {
        let construct_id = format!("{id}-Distribution");
        self.validate(&format!("CloudFront distribution '{construct_id}'"))?;

        let mut default_assigned = false;
        let sources: Vec<SourceConfiguration> = self
            .origins
            .into_iter()
            .enumerate()
            .map(|(index, origin)| {
                let behavior = match &origin {
                    OriginSource::S3(s3) => {
                        let is_default = !default_assigned;
                        default_assigned = true;
                        s3_behavior(s3, is_default)
                    }
                    OriginSource::Custom(custom) => custom_behavior(custom),
                };
                SourceConfiguration {
                    origin_id: format!("origin{}", index + 1),
                    origin,
                    behavior,
                }
            })
            .collect();

        let spec = DistributionSpec {
            default_root_object: "index.html".to_string(),
            sources,
            alias: self.alias.map(|(acm_cert_ref, names)| AliasConfig {
                acm_cert_ref,
                names: names.into_iter().filter_map(non_blank).collect(),
                security_policy: self.security_policy,
            }),
            logging: self.logging,
        };

        let properties = DistributionProperties {
            distribution_config: distribution_config(&spec),
        };
        let logical_id =
            stack.add_resource(&construct_id, Resource::new(DISTRIBUTION_TYPE, properties)?)?;

        info!(
            logical_id = %logical_id,
            origins = spec.sources.len(),
            aliased = spec.alias.is_some(),
            logging = spec.logging.is_some(),
            "built distribution"
        );

        Ok(Distribution {
            domain_name: Expr::get_att(&logical_id, "DomainName"),
            distribution_id: Expr::reference(&logical_id),
            logical_id,
            spec,
        })
    }
}

fn s3_behavior(source: &S3OriginSource, is_default: bool) -> Behavior {
    let (default_ttl, max_ttl) = if source.disable_cache {
        (Duration::ZERO, Duration::ZERO)
    } else {
        (ONE_DAY, ONE_YEAR)
    };
    Behavior {
        is_default,
        path_pattern: if is_default {
            None
        } else {
            source.path_pattern.clone()
        },
        allowed_methods: AllowedMethods::GetHead,
        cached_methods: CachedMethods::GetHead,
        compress: true,
        forward_query_string: true,
        min_ttl: Duration::ZERO,
        default_ttl: Some(default_ttl),
        max_ttl: Some(max_ttl),
    }
}

fn custom_behavior(source: &CustomOriginSource) -> Behavior {
    Behavior {
        is_default: false,
        path_pattern: Some(source.path_pattern.clone()),
        allowed_methods: source.allowed_methods,
        cached_methods: source.cached_methods,
        compress: true,
        forward_query_string: true,
        min_ttl: Duration::ZERO,
        default_ttl: None,
        max_ttl: None,
    }
}

/// A distribution created in this stack.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub logical_id: LogicalId,
    pub distribution_id: Expr,
    /// The `*.cloudfront.net` domain, target of DNS aliases.
    pub domain_name: Expr,
    pub spec: DistributionSpec,
}

impl Distribution {
    pub fn behaviors(&self) -> impl Iterator<Item = &Behavior> {
        self.spec.sources.iter().map(|s| &s.behavior)
    }

    pub fn default_behavior(&self) -> Option<&Behavior> {
        self.behaviors().find(|b| b.is_default)
    }
}

// CloudFormation property shapes.

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OriginAccessIdentityProperties {
    cloud_front_origin_access_identity_config: OriginAccessIdentityConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OriginAccessIdentityConfig {
    comment: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionProperties {
    distribution_config: DistributionConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionConfig {
    enabled: bool,
    default_root_object: String,
    http_version: &'static str,
    price_class: &'static str,
    #[serde(rename = "IPV6Enabled")]
    ipv6_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewer_certificate: Option<ViewerCertificate>,
    origins: Vec<OriginProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_cache_behavior: Option<CacheBehaviorProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cache_behaviors: Vec<CacheBehaviorProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<LoggingProperty>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ViewerCertificate {
    acm_certificate_arn: Expr,
    ssl_support_method: &'static str,
    minimum_protocol_version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OriginProperty {
    id: String,
    domain_name: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin_path: Option<String>,
    #[serde(rename = "S3OriginConfig", skip_serializing_if = "Option::is_none")]
    s3_origin_config: Option<S3OriginConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_origin_config: Option<CustomOriginConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3OriginConfig {
    origin_access_identity: Expr,
}

#[derive(Serialize)]
struct CustomOriginConfig {
    #[serde(rename = "OriginProtocolPolicy")]
    origin_protocol_policy: &'static str,
    #[serde(rename = "HTTPPort")]
    http_port: u16,
    #[serde(rename = "HTTPSPort")]
    https_port: u16,
    #[serde(rename = "OriginSSLProtocols")]
    origin_ssl_protocols: Vec<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CacheBehaviorProperty {
    #[serde(skip_serializing_if = "Option::is_none")]
    path_pattern: Option<String>,
    target_origin_id: String,
    viewer_protocol_policy: &'static str,
    allowed_methods: &'static [&'static str],
    cached_methods: &'static [&'static str],
    compress: bool,
    forwarded_values: ForwardedValues,
    #[serde(rename = "MinTTL")]
    min_ttl: u64,
    #[serde(rename = "DefaultTTL", skip_serializing_if = "Option::is_none")]
    default_ttl: Option<u64>,
    #[serde(rename = "MaxTTL", skip_serializing_if = "Option::is_none")]
    max_ttl: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ForwardedValues {
    query_string: bool,
    cookies: Cookies,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Cookies {
    forward: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoggingProperty {
    bucket: Expr,
    prefix: String,
    include_cookies: bool,
}

fn distribution_config(spec: &DistributionSpec) -> DistributionConfig {
    let mut origins = Vec::with_capacity(spec.sources.len());
    let mut default_cache_behavior = None;
    let mut cache_behaviors = Vec::new();

    for source in &spec.sources {
        origins.push(origin_property(source));
        let behavior = cache_behavior_property(source);
        if source.behavior.is_default {
            default_cache_behavior = Some(behavior);
        } else {
            cache_behaviors.push(behavior);
        }
    }

    DistributionConfig {
        enabled: true,
        default_root_object: spec.default_root_object.clone(),
        http_version: "http2",
        price_class: "PriceClass_100",
        ipv6_enabled: true,
        aliases: spec
            .alias
            .as_ref()
            .map(|a| a.names.clone())
            .unwrap_or_default(),
        viewer_certificate: spec.alias.as_ref().map(|a| ViewerCertificate {
            acm_certificate_arn: a.acm_cert_ref.clone(),
            ssl_support_method: "sni-only",
            minimum_protocol_version: a.security_policy.as_str(),
        }),
        origins,
        default_cache_behavior,
        cache_behaviors,
        logging: spec.logging.as_ref().map(|l| LoggingProperty {
            bucket: l.bucket.domain_name.clone(),
            prefix: l.prefix.clone(),
            include_cookies: false,
        }),
    }
}

fn origin_property(source: &SourceConfiguration) -> OriginProperty {
    match &source.origin {
        OriginSource::S3(s3) => {
            let path = s3.origin_path.trim_end_matches('/');
            OriginProperty {
                id: source.origin_id.clone(),
                domain_name: s3.bucket.regional_domain_name.clone(),
                origin_path: non_blank(path),
                s3_origin_config: Some(S3OriginConfig {
                    origin_access_identity: s3.access_identity.origin_path(),
                }),
                custom_origin_config: None,
            }
        }
        OriginSource::Custom(custom) => OriginProperty {
            id: source.origin_id.clone(),
            domain_name: custom.domain_name.clone(),
            origin_path: None,
            s3_origin_config: None,
            custom_origin_config: Some(CustomOriginConfig {
                origin_protocol_policy: "https-only",
                http_port: 80,
                https_port: 443,
                origin_ssl_protocols: vec!["TLSv1.2"],
            }),
        },
    }
}

fn cache_behavior_property(source: &SourceConfiguration) -> CacheBehaviorProperty {
    let behavior = &source.behavior;
    CacheBehaviorProperty {
        path_pattern: behavior.path_pattern.clone(),
        target_origin_id: source.origin_id.clone(),
        viewer_protocol_policy: "redirect-to-https",
        allowed_methods: behavior.allowed_methods.methods(),
        cached_methods: behavior.cached_methods.methods(),
        compress: behavior.compress,
        forwarded_values: ForwardedValues {
            query_string: behavior.forward_query_string,
            cookies: Cookies { forward: "none" },
        },
        min_ttl: behavior.min_ttl.as_secs(),
        default_ttl: behavior.default_ttl.map(|d| d.as_secs()),
        max_ttl: behavior.max_ttl.map(|d| d.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_core::Environment;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1"))
    }

    fn s3_source(stack: &mut Stack, name: &str) -> S3OriginSource {
        let oai = CloudFrontBuilder::build_origin_access_identity(stack, name, None).unwrap();
        let bucket = BucketRef::from_name(stack.env(), name);
        S3OriginSource::new(bucket, oai, "/")
    }

    #[test]
    fn test_cache_enabled_ttls() {
        let mut stack = stack();
        let source = s3_source(&mut stack, "site");
        let dist = CloudFrontBuilder::new()
            .add_s3_origin_source(source)
            .build(&mut stack, "Site")
            .unwrap();

        let behavior = dist.default_behavior().unwrap();
        assert_eq!(behavior.min_ttl, Duration::ZERO);
        assert_eq!(behavior.default_ttl, Some(Duration::from_secs(86_400)));
        assert_eq!(behavior.max_ttl, Some(Duration::from_secs(365 * 86_400)));
    }

    #[test]
    fn test_cache_disabled_ttls_are_zero() {
        let mut stack = stack();
        let source = s3_source(&mut stack, "site").with_cache_disabled(true);
        let dist = CloudFrontBuilder::new()
            .add_s3_origin_source(source)
            .build(&mut stack, "Site")
            .unwrap();

        let behavior = dist.default_behavior().unwrap();
        assert_eq!(behavior.min_ttl, Duration::ZERO);
        assert_eq!(behavior.default_ttl, Some(Duration::ZERO));
        assert_eq!(behavior.max_ttl, Some(Duration::ZERO));

        let resource = stack.resource(&dist.logical_id).unwrap();
        let default = &resource.properties["DistributionConfig"]["DefaultCacheBehavior"];
        assert_eq!(default["MinTTL"], 0);
        assert_eq!(default["DefaultTTL"], 0);
        assert_eq!(default["MaxTTL"], 0);
    }

    #[test]
    fn test_first_bucket_origin_is_default_regardless_of_interleaving() {
        let mut stack = stack();
        let first = s3_source(&mut stack, "first");
        let second = s3_source(&mut stack, "second").with_path_pattern("assets/*");
        let third = s3_source(&mut stack, "third").with_path_pattern("media/*");

        let dist = CloudFrontBuilder::new()
            .add_custom_origin_source(CustomOriginSource::new("api.example.com", "api/*"))
            .add_s3_origin_source(first)
            .add_custom_origin_source(CustomOriginSource::new("auth.example.com", "auth/*"))
            .add_s3_origin_source(second)
            .add_s3_origin_source(third)
            .build(&mut stack, "Site")
            .unwrap();

        let defaults: Vec<bool> = dist.behaviors().map(|b| b.is_default).collect();
        assert_eq!(defaults, vec![false, true, false, false, false]);

        let config = &stack.resource(&dist.logical_id).unwrap().properties["DistributionConfig"];
        assert_eq!(config["DefaultCacheBehavior"]["TargetOriginId"], "origin2");
        let patterns: Vec<&str> = config["CacheBehaviors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["PathPattern"].as_str().unwrap())
            .collect();
        assert_eq!(patterns, vec!["api/*", "auth/*", "assets/*", "media/*"]);
    }

    #[test]
    fn test_second_bucket_origin_needs_path_pattern() {
        let mut stack = stack();
        let first = s3_source(&mut stack, "first");
        let second = s3_source(&mut stack, "second");

        let err = CloudFrontBuilder::new()
            .add_s3_origin_source(first)
            .add_s3_origin_source(second)
            .build(&mut stack, "Site")
            .unwrap_err();

        match err {
            Error::MissingConfiguration { fields, .. } => {
                assert_eq!(fields, vec!["origins[1].path_pattern"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_without_origins_lists_all_missing_fields() {
        let mut stack = stack();
        let err = CloudFrontBuilder::new()
            .set_alias_configuration("", vec![])
            .build(&mut stack, "Site")
            .unwrap_err();

        match err {
            Error::MissingConfiguration { fields, .. } => assert_eq!(
                fields,
                vec!["s3_origin_source", "alias.acm_cert_ref", "alias.names"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_origin_is_https_only() {
        let mut stack = stack();
        let source = s3_source(&mut stack, "site");
        let dist = CloudFrontBuilder::new()
            .add_s3_origin_source(source)
            .add_custom_origin_source(CustomOriginSource::new("api.example.com", "api/*"))
            .build(&mut stack, "Site")
            .unwrap();

        let config = &stack.resource(&dist.logical_id).unwrap().properties["DistributionConfig"];
        let custom = &config["Origins"][1];
        assert_eq!(custom["DomainName"], "api.example.com");
        assert_eq!(
            custom["CustomOriginConfig"]["OriginProtocolPolicy"],
            "https-only"
        );
        let behavior = &config["CacheBehaviors"][0];
        assert_eq!(behavior["AllowedMethods"].as_array().unwrap().len(), 7);
        assert_eq!(behavior["CachedMethods"], json!(["GET", "HEAD"]));
        assert!(behavior.get("DefaultTTL").is_none());
    }

    #[test]
    fn test_alias_and_logging() {
        let mut stack = stack();
        let source = s3_source(&mut stack, "site");
        let logs = BucketRef::from_name(stack.env(), "log-bucket");
        let dist = CloudFrontBuilder::new()
            .add_s3_origin_source(source)
            .set_alias_configuration(
                "arn:aws:acm:us-east-1:123456789012:certificate/abc",
                vec!["www.example.com".to_string()],
            )
            .set_logging_configuration(logs, "cflogs/123456789012")
            .build(&mut stack, "Site")
            .unwrap();

        let config = &stack.resource(&dist.logical_id).unwrap().properties["DistributionConfig"];
        assert_eq!(config["Aliases"], json!(["www.example.com"]));
        assert_eq!(
            config["ViewerCertificate"],
            json!({
                "AcmCertificateArn": "arn:aws:acm:us-east-1:123456789012:certificate/abc",
                "SslSupportMethod": "sni-only",
                "MinimumProtocolVersion": "TLSv1.1_2016"
            })
        );
        assert_eq!(
            config["Logging"],
            json!({
                "Bucket": "log-bucket.s3.amazonaws.com",
                "Prefix": "cflogs/123456789012",
                "IncludeCookies": false
            })
        );
        assert_eq!(config["DefaultRootObject"], "index.html");
    }

    #[test]
    fn test_security_policy_from_str() {
        assert_eq!(
            "TLSv1.2_2018".parse::<SecurityPolicy>(),
            Ok(SecurityPolicy::TlsV1_2_2018)
        );
        assert_eq!("tlsv1_2016".parse::<SecurityPolicy>(), Ok(SecurityPolicy::TlsV1_2016));
        assert!("SSLv3".parse::<SecurityPolicy>().is_err());
    }

    #[test]
    fn test_s3_origin_references_identity() {
        let mut stack = stack();
        let source = s3_source(&mut stack, "site");
        let oai_id = source.access_identity.logical_id.clone().unwrap();
        let dist = CloudFrontBuilder::new()
            .add_s3_origin_source(S3OriginSource {
                origin_path: "/public".to_string(),
                ..source
            })
            .build(&mut stack, "Site")
            .unwrap();

        let origin = &stack.resource(&dist.logical_id).unwrap().properties["DistributionConfig"]
            ["Origins"][0];
        assert_eq!(origin["OriginPath"], "/public");
        assert_eq!(
            origin["S3OriginConfig"]["OriginAccessIdentity"],
            json!({"Fn::Join": ["", ["origin-access-identity/cloudfront/", {"Ref": oai_id.as_str()}]]})
        );
    }
}
