//! The global stack: a CloudFront distribution in front of a data stack's
//! bucket and an API domain, with access logs and a DNS alias.

use infrakit_builders::{
    AccessIdentity, BucketRef, CloudFrontBuilder, CustomOriginSource, Route53Builder,
    S3OriginSource, SecurityPolicy,
};
use infrakit_config::GlobalStackConfig;
use infrakit_core::lookup::{HostedZoneLookup, ParameterStore};
use infrakit_core::{Environment, Error, Result, Stack};
use tracing::info;

use crate::data::DataExports;

pub fn global_stack(
    name: &str,
    env: Environment,
    config: &GlobalStackConfig,
    parameters: &dyn ParameterStore,
    zones: &dyn HostedZoneLookup,
) -> Result<Stack> {
    let security_policy: SecurityPolicy = config
        .tls_policy
        .parse()
        .map_err(|message| Error::invalid("tls_policy", message))?;

    let mut stack = Stack::new(name, env).with_description("Global CloudFront distribution");
    let certificate = parameters.string_parameter(&mut stack, &config.certificate_parameter)?;

    let exports = DataExports::new(&config.data_export_prefix);
    let app_bucket = BucketRef::from_name(stack.env(), exports.import_bucket_name());
    let identity = AccessIdentity::imported(
        exports.import_access_identity_id(),
        exports.import_canonical_user_id(),
    );

    let mut distribution = CloudFrontBuilder::new()
        .add_s3_origin_source(S3OriginSource::new(app_bucket, identity, &config.origin_path))
        .set_alias_configuration(certificate, vec![config.domain_name.clone()])
        .set_security_policy(security_policy);

    if let Some(api_domain) = &config.api_domain {
        distribution = distribution
            .add_custom_origin_source(CustomOriginSource::new(api_domain, &config.api_path_pattern));
    }
    if let Some(log_bucket) = &config.log_bucket {
        let prefix = format!("cflogs/{}", stack.env().account.as_deref().unwrap_or_default());
        distribution = distribution
            .set_logging_configuration(BucketRef::from_name(stack.env(), log_bucket), prefix);
    }
    let distribution = distribution.build(&mut stack, name)?;

    let mut record = Route53Builder::new().set_domain_name(&config.domain_name);
    if let Some(zone_name) = &config.zone_name {
        record = record.set_zone_name(zone_name);
    }
    let record = record
        .add_cloudfront_target(&distribution)
        .build_a_record(&mut stack, "CloudFrontAlias", zones)?;

    info!(stack = name, domain = %record.name, "assembled global stack");
    Ok(stack)
}
