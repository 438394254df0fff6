use std::time::Duration;

use super::*;

/// managed "CachingOptimized" policy.
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
pub const MINIMUM_PROTOCOL_VERSION: &str = "TLSv1.2_2021";
pub const ERROR_PAGE_TTL: Duration = Duration::from_secs(30 * 60);
pub const ERROR_PAGE_CODES: [u16; 2] = [403, 404];
const READ_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

#[derive(Debug, Clone)]
pub struct OriginAccessIdentity {
    pub comment: String,
}

impl CfnResource for OriginAccessIdentity {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        Ok(json!({
            "CloudFrontOriginAccessIdentityConfig": { "Comment": self.comment },
        }))
    }
}

/// viewers always end up on https. There is no allow-all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ViewerProtocolPolicy {
    #[default]
    #[serde(rename = "redirect-to-https")]
    RedirectToHttps,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewerCertificate {
    pub acm_certificate_arn: Value,
    pub minimum_protocol_version: String,
    pub ssl_support_method: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3OriginConfig {
    pub origin_access_identity: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub id: String,
    pub domain_name: Value,
    pub s3_origin_config: S3OriginConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultCacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    pub compress: bool,
    pub cache_policy_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
    #[serde(rename = "ErrorCachingMinTTL")]
    pub error_caching_min_ttl: u64,
}

impl CustomErrorResponse {
    /// serves /<code>.html for the given status, keeping the status as is.
    pub fn page(code: u16, ttl: Duration) -> Self {
        Self {
            error_code: code,
            response_code: code,
            response_page_path: format!("/{code}.html"),
            error_caching_min_ttl: ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    pub enabled: bool,
    pub comment: String,
    pub aliases: Vec<String>,
    pub default_root_object: String,
    pub http_version: String,
    pub viewer_certificate: ViewerCertificate,
    pub origins: Vec<Origin>,
    pub default_cache_behavior: DefaultCacheBehavior,
    pub custom_error_responses: Vec<CustomErrorResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distribution {
    pub distribution_config: DistributionConfig,
}

/// what a distribution in front of a private bucket needs to know.
#[derive(Debug, Clone)]
pub struct S3SiteDistribution<'a> {
    pub domain_name: &'a str,
    pub certificate: &'a LogicalId,
    pub bucket: &'a LogicalId,
    pub origin_access_identity: &'a LogicalId,
    pub default_root_object: &'a str,
}

impl Distribution {
    pub fn s3_site(site: S3SiteDistribution<'_>) -> Self {
        let origin_id = "origin0".to_string();
        let origin = Origin {
            id: origin_id.clone(),
            domain_name: get_att(site.bucket, "RegionalDomainName"),
            s3_origin_config: S3OriginConfig {
                origin_access_identity: sub(format!(
                    "origin-access-identity/cloudfront/${{{}}}",
                    site.origin_access_identity
                )),
            },
        };
        let methods: Vec<String> = READ_METHODS.iter().map(|m| m.to_string()).collect();
        Self {
            distribution_config: DistributionConfig {
                enabled: true,
                comment: format!("static site for {}", site.domain_name),
                aliases: vec![site.domain_name.to_string()],
                default_root_object: site.default_root_object.to_string(),
                http_version: "http2".to_string(),
                viewer_certificate: ViewerCertificate {
                    acm_certificate_arn: get_ref(site.certificate),
                    minimum_protocol_version: MINIMUM_PROTOCOL_VERSION.to_string(),
                    ssl_support_method: "sni-only".to_string(),
                },
                origins: vec![origin],
                default_cache_behavior: DefaultCacheBehavior {
                    target_origin_id: origin_id,
                    viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
                    allowed_methods: methods.clone(),
                    cached_methods: methods,
                    compress: true,
                    cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.to_string(),
                },
                custom_error_responses: ERROR_PAGE_CODES
                    .iter()
                    .map(|code| CustomErrorResponse::page(*code, ERROR_PAGE_TTL))
                    .collect(),
            },
        }
    }
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
