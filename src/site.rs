//! The site distribution declaration.
//!
//! Turns a domain and a subdomain into the full resource graph for a
//! static site: a DNS validated certificate, a private bucket that only
//! the distribution's origin access identity can read, the distribution
//! itself, an alias record pointing at it, and the content deployment.
//! Nothing here talks to the network or the filesystem.

use std::path::PathBuf;

use crate::error::{Result, SiteError};
use crate::graph::{Node, ResourceGraph};
use crate::resources::*;
use crate::stack::{derive_stack_name, validate_stack_name, NamedOutput, StackLayout, StackSet};
use crate::variables;

pub const DEFAULT_ASSET_DIR: &str = "./html";
pub const DEFAULT_ROOT_OBJECT: &str = "index.html";
pub const DEFAULT_DEPLOY_REGION: &str = "us-east-1";

pub const ZONE_ID: &str = "HostedZoneId";
pub const CERTIFICATE_ID: &str = "CdnSiteCertificate";
pub const OAI_ID: &str = "CdnCloudfrontOAI";
pub const BUCKET_ID: &str = "CdnBucket";
pub const BUCKET_POLICY_ID: &str = "CdnBucketPolicy";
pub const CLEANUP_ROLE_ID: &str = "CdnBucketCleanupRole";
pub const CLEANUP_FUNCTION_ID: &str = "CdnBucketCleanupFunction";
pub const CLEANUP_RESOURCE_ID: &str = "CdnBucketCleanup";
pub const DISTRIBUTION_ID: &str = "CdnDistribution";
pub const ALIAS_RECORD_ID: &str = "CdnAliasRecord";
pub const DEPLOYMENT_ID: &str = "CdnDeployWithInvalidation";

pub const OUTPUT_CERTIFICATE: &str = "CdnCertificate";
pub const OUTPUT_SITE: &str = "CdnSite";
pub const OUTPUT_BUCKET: &str = "CdnBucketOutput";
pub const OUTPUT_DISTRIBUTION_ID: &str = "CdnDistributionId";

#[derive(Debug, Clone, PartialEq)]
pub struct SiteInput {
    /// the root domain. A hosted zone with this name must exist in the account.
    pub domain: String,
    /// a single label, eg: "cdn" for cdn.example.com
    pub subdomain: String,
    pub asset_dir: PathBuf,
    /// if left empty (default), it is derived from the site domain.
    pub stack_name: Option<String>,
    /// where everything except the certificate is deployed.
    pub deploy_region: String,
    pub removal_policy: RemovalPolicy,
    /// empties the bucket before the stack deletes it. Only allowed
    /// together with RemovalPolicy::Destroy.
    pub auto_delete_objects: bool,
    pub default_root_object: String,
}

impl SiteInput {
    pub fn new<S: Into<String>, S1: Into<String>>(domain: S, subdomain: S1) -> Self {
        Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            stack_name: None,
            deploy_region: DEFAULT_DEPLOY_REGION.to_string(),
            removal_policy: RemovalPolicy::Retain,
            auto_delete_objects: false,
            default_root_object: DEFAULT_ROOT_OBJECT.to_string(),
        }
    }
}

/// the values a declaration exposes. Some are only known once the
/// stack exists, those are template expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOutputs {
    pub certificate_arn: Value,
    pub site_url: String,
    pub bucket_name: String,
    pub distribution_id: Value,
}

impl SiteOutputs {
    pub fn named(&self) -> Vec<NamedOutput> {
        vec![
            NamedOutput {
                key: OUTPUT_CERTIFICATE.to_string(),
                description: "ARN of the site certificate".to_string(),
                value: self.certificate_arn.clone(),
            },
            NamedOutput {
                key: OUTPUT_SITE.to_string(),
                description: "public url of the site".to_string(),
                value: Value::String(self.site_url.clone()),
            },
            NamedOutput {
                key: OUTPUT_BUCKET.to_string(),
                description: "name of the content bucket".to_string(),
                value: get_ref(BUCKET_ID),
            },
            NamedOutput {
                key: OUTPUT_DISTRIBUTION_ID.to_string(),
                description: "id of the cloudfront distribution".to_string(),
                value: self.distribution_id.clone(),
            },
        ]
    }
}

#[derive(Debug)]
pub struct SiteDeclaration {
    pub site_domain: String,
    pub graph: ResourceGraph,
    pub outputs: SiteOutputs,
    pub layout: StackLayout,
}

impl SiteDeclaration {
    pub fn stacks(&self) -> Result<StackSet> {
        StackSet::build(&self.graph, &self.layout, &self.outputs.named())
    }
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn normalize_subdomain(raw: &str) -> Result<String> {
    let subdomain = raw.trim().to_ascii_lowercase();
    if subdomain.is_empty() {
        return Err(SiteError::missing(variables::SUBDOMAIN));
    }
    if !is_dns_label(&subdomain) {
        return Err(SiteError::invalid(
            variables::SUBDOMAIN,
            format!("'{subdomain}' must be a single DNS label of letters, digits and hyphens"),
        ));
    }
    Ok(subdomain)
}

fn normalize_domain(raw: &str) -> Result<String> {
    let domain = raw.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Err(SiteError::missing(variables::HOSTED_ZONE_NAME));
    }
    if domain.ends_with('.') {
        return Err(SiteError::invalid(
            variables::HOSTED_ZONE_NAME,
            format!("'{domain}' must not end with a dot"),
        ));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(SiteError::invalid(
            variables::HOSTED_ZONE_NAME,
            format!("'{domain}' is not a domain, eg: example.com"),
        ));
    }
    if let Some(bad) = labels.iter().find(|l| !is_dns_label(l)) {
        return Err(SiteError::invalid(
            variables::HOSTED_ZONE_NAME,
            format!("'{domain}' has an invalid label '{bad}'"),
        ));
    }
    Ok(domain)
}

/// bucket names are global, and have a few more rules than domains do.
/// https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
fn check_bucket_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(SiteError::invalid(
            "bucket name",
            format!("'{name}' must be between 3 and 63 characters"),
        ));
    }
    if name.contains("..") {
        return Err(SiteError::invalid(
            "bucket name",
            format!("'{name}' may not contain two consecutive dots"),
        ));
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() == 4 && labels.iter().all(|l| l.parse::<u8>().is_ok()) {
        return Err(SiteError::invalid(
            "bucket name",
            format!("'{name}' must not be formatted as an IP address"),
        ));
    }
    Ok(())
}

fn check_region(region: &str) -> Result<()> {
    let valid = !region.is_empty()
        && region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && region.contains('-');
    if !valid {
        return Err(SiteError::invalid(
            "region",
            format!("'{region}' is not an AWS region, eg: us-east-1"),
        ));
    }
    Ok(())
}

fn id(s: &str) -> Result<LogicalId> {
    LogicalId::new(s).map_err(SiteError::Config)
}

/// builds the resource graph for the site. Fails before declaring
/// anything if the input is missing or invalid.
pub fn declare(input: &SiteInput) -> Result<SiteDeclaration> {
    let domain = normalize_domain(&input.domain)?;
    let subdomain = normalize_subdomain(&input.subdomain)?;
    let site_domain = format!("{subdomain}.{domain}");
    check_bucket_name(&site_domain)?;
    check_region(&input.deploy_region)?;
    let stack_name = match input.stack_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => validate_stack_name(name),
        None => validate_stack_name(&derive_stack_name(&site_domain)),
    }
    .map_err(|e| SiteError::invalid(variables::STACK_NAME, e))?;
    if input.auto_delete_objects && input.removal_policy != RemovalPolicy::Destroy {
        return Err(SiteError::invalid(
            "auto_delete_objects",
            "emptying the bucket on delete requires removal_policy = destroy",
        ));
    }
    if input.default_root_object.trim().is_empty() {
        return Err(SiteError::invalid("default_root_object", "must not be empty"));
    }

    tracing::info!(
        site = %site_domain,
        stack = %stack_name,
        region = %input.deploy_region,
        "declaring site"
    );
    let region = input.deploy_region.as_str();
    let mut graph = ResourceGraph::new();

    let zone = graph.add(Node::zone_lookup(&id(ZONE_ID)?, HostedZoneLookup::new(&domain)))?;

    // cloudfront's certificate must be in us-east-1, regardless of where the rest lives
    let certificate = Certificate::dns_validated(&site_domain, &zone)
        .map_err(|e| SiteError::invalid("certificate domain", e))?;
    let certificate = graph.add(
        Node::resource(&id(CERTIFICATE_ID)?, CLOUDFRONT_CERTIFICATE_REGION, certificate)
            .with_dependencies(&[&zone])
            .with_removal_policy(input.removal_policy),
    )?;

    let oai = graph.add(Node::resource(&id(OAI_ID)?, region, OriginAccessIdentity {
        comment: format!("OAI for {stack_name}"),
    }))?;

    let bucket = graph.add(
        Node::resource(&id(BUCKET_ID)?, region, Bucket::private(&site_domain))
            .with_removal_policy(input.removal_policy),
    )?;
    let policy = BucketPolicy::origin_access_read(&bucket, &oai);
    let bucket_policy = graph.add(
        Node::resource(&id(BUCKET_POLICY_ID)?, region, policy).with_dependencies(&[&bucket, &oai]),
    )?;

    let mut content_deps = vec![bucket.clone()];
    if input.auto_delete_objects {
        let role = graph.add(
            Node::resource(&id(CLEANUP_ROLE_ID)?, region, CleanupRole { bucket: bucket.clone() })
                .with_dependencies(&[&bucket]),
        )?;
        let function = CleanupFunction { role: role.clone() };
        let function = graph.add(
            Node::resource(&id(CLEANUP_FUNCTION_ID)?, region, function).with_dependencies(&[&role]),
        )?;
        let cleanup = graph.add(
            Node::resource(&id(CLEANUP_RESOURCE_ID)?, region, CleanupCustomResource {
                function: function.clone(),
                bucket: bucket.clone(),
            })
            .with_dependencies(&[&function, &bucket]),
        )?;
        // objects uploaded before the cleanup exists would survive a delete
        content_deps.push(cleanup);
    }

    let distribution = Distribution::s3_site(S3SiteDistribution {
        domain_name: &site_domain,
        certificate: &certificate,
        bucket: &bucket,
        origin_access_identity: &oai,
        default_root_object: input.default_root_object.trim(),
    });
    let distribution = graph.add(
        Node::resource(&id(DISTRIBUTION_ID)?, region, distribution)
            .with_dependencies(&[&certificate, &bucket, &oai, &bucket_policy]),
    )?;

    let record = AliasRecord::cloudfront(&site_domain, &zone, &distribution);
    graph.add(
        Node::resource(&id(ALIAS_RECORD_ID)?, region, record)
            .with_dependencies(&[&zone, &distribution]),
    )?;

    let deployment = BucketDeployment::new(input.asset_dir.clone(), &bucket, &distribution);
    let mut deps: Vec<&LogicalId> = content_deps.iter().collect();
    deps.push(&distribution);
    graph.add(Node::deployment(&id(DEPLOYMENT_ID)?, deployment).with_dependencies(&deps))?;

    let outputs = SiteOutputs {
        certificate_arn: get_ref(&certificate),
        site_url: format!("https://{site_domain}"),
        bucket_name: site_domain.clone(),
        distribution_id: get_ref(&distribution),
    };
    let layout = StackLayout {
        base_name: stack_name,
        primary_region: input.deploy_region.clone(),
        description: format!("Static site {site_domain} served from S3 through CloudFront"),
    };
    tracing::debug!(nodes = graph.len(), "declared site graph");
    Ok(SiteDeclaration { site_domain, graph, outputs, layout })
}
