//! The frontend stack: a private bucket served through an aliased
//! distribution.

use infrakit_builders::{CloudFrontBuilder, Route53Builder, S3BucketBuilder, S3OriginSource};
use infrakit_config::FrontEndStackConfig;
use infrakit_core::lookup::{HostedZoneLookup, ParameterStore};
use infrakit_core::{Environment, Result, Stack};
use tracing::info;

const CONSTRUCT_ID: &str = "Frontend";

pub fn frontend_stack(
    name: &str,
    env: Environment,
    config: &FrontEndStackConfig,
    parameters: &dyn ParameterStore,
    zones: &dyn HostedZoneLookup,
) -> Result<Stack> {
    let mut stack = Stack::new(name, env).with_description("Static frontend site");
    let certificate = parameters.string_parameter(&mut stack, &config.certificate_parameter)?;

    let identity = CloudFrontBuilder::build_origin_access_identity(&mut stack, CONSTRUCT_ID, None)?;
    let mut bucket = S3BucketBuilder::new()
        .set_bucket_name(&config.bucket_name)
        .build(&mut stack, CONSTRUCT_ID)?;
    bucket.add_cloudfront_origin_access_identity(&mut stack, &identity)?;

    let domain_name = format!("{}.{}", config.record_name, config.zone_name);
    let distribution = CloudFrontBuilder::new()
        .add_s3_origin_source(S3OriginSource::new(
            bucket.reference().clone(),
            identity,
            &config.origin_path,
        ))
        .set_alias_configuration(certificate, vec![domain_name.clone()])
        .build(&mut stack, CONSTRUCT_ID)?;

    Route53Builder::new()
        .set_record_name(&config.record_name)
        .set_zone_name(&config.zone_name)
        .add_cloudfront_target(&distribution)
        .build_a_record(&mut stack, CONSTRUCT_ID, zones)?;

    info!(stack = name, domain = %domain_name, bucket = %config.bucket_name, "assembled frontend stack");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrakit_builders::cloudfront::DISTRIBUTION_TYPE;
    use infrakit_builders::route53::RECORD_SET_TYPE;
    use infrakit_builders::s3::{BUCKET_POLICY_TYPE, BUCKET_TYPE};
    use infrakit_core::Error;
    use infrakit_core::lookup::{ContextHostedZones, SsmParameterReference, StaticParameters};

    fn config() -> FrontEndStackConfig {
        FrontEndStackConfig {
            record_name: "frontend-template".to_string(),
            zone_name: "labtest44.com".to_string(),
            bucket_name: "us-east-1-frontend-template-123456789012".to_string(),
            origin_path: "/green".to_string(),
            certificate_parameter: "/cert/com-labtest44".to_string(),
        }
    }

    fn env() -> Environment {
        Environment::new("123456789012", "us-east-1")
    }

    fn zones() -> ContextHostedZones {
        ContextHostedZones::new().with_zone("labtest44.com", "Z0123456789")
    }

    #[test]
    fn test_frontend_stack_resources() {
        let parameters = StaticParameters::new()
            .with_value("/cert/com-labtest44", "arn:aws:acm:us-east-1:123456789012:certificate/abc");
        let stack = frontend_stack("FrontEnd", env(), &config(), &parameters, &zones()).unwrap();
        let template = stack.synth();

        let (_, bucket) = template.resources_of_type(BUCKET_TYPE).next().unwrap();
        assert_eq!(
            bucket.properties["BucketName"],
            "us-east-1-frontend-template-123456789012"
        );
        assert_eq!(template.resources_of_type(BUCKET_POLICY_TYPE).count(), 1);

        let (_, distribution) = template.resources_of_type(DISTRIBUTION_TYPE).next().unwrap();
        let dist = &distribution.properties["DistributionConfig"];
        assert_eq!(dist["Aliases"][0], "frontend-template.labtest44.com");
        assert_eq!(dist["Origins"][0]["OriginPath"], "/green");
        assert_eq!(
            dist["ViewerCertificate"]["MinimumProtocolVersion"],
            "TLSv1.1_2016"
        );

        let (_, record) = template.resources_of_type(RECORD_SET_TYPE).next().unwrap();
        assert_eq!(record.properties["Name"], "frontend-template.labtest44.com.");
    }

    #[test]
    fn test_frontend_certificate_from_ssm() {
        let stack =
            frontend_stack("FrontEnd", env(), &config(), &SsmParameterReference, &zones()).unwrap();
        let template = stack.synth();

        assert_eq!(template.parameters.len(), 1);
        let parameter = template.parameters.values().next().unwrap();
        assert_eq!(parameter.default.as_deref(), Some("/cert/com-labtest44"));
    }

    #[test]
    fn test_frontend_unknown_zone() {
        let parameters = StaticParameters::new().with_value("/cert/com-labtest44", "arn");
        let result = frontend_stack(
            "FrontEnd",
            env(),
            &config(),
            &parameters,
            &ContextHostedZones::new(),
        );
        assert!(matches!(result, Err(Error::ExternalLookup { .. })));
    }
}
