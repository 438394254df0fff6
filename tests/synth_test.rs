use anyhow::Result;
use cdn_site::config::{resolve, FileConfig, Overrides};
use cdn_site::resources::RemovalPolicy;
use cdn_site::template::{SavedResource, SavedTemplate};
use cdn_site::variables::Variables;
use cdn_site::{synth, SiteError, SiteInput};
use serde_json::Value;
use tempfile::TempDir;

fn site_input(asset_dir: &std::path::Path) -> SiteInput {
    let mut input = SiteInput::new("example.com", "cdn");
    input.asset_dir = asset_dir.to_path_buf();
    input
}

fn read_template(path: &std::path::Path) -> Result<SavedTemplate> {
    Ok(SavedTemplate::from_json(&std::fs::read_to_string(path)?)?)
}

fn resources_of_type<'a>(template: &'a SavedTemplate, ty: &str) -> Vec<&'a SavedResource> {
    template.resources.values().filter(|r| r.ty == ty).collect()
}

/// the default layout: everything in us-east-1, a single stack.
#[test]
fn test_synth_writes_a_single_stack_and_script() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let html = temp_dir.path().join("html");
    std::fs::create_dir_all(&html)?;
    std::fs::write(html.join("index.html"), "<h1>hello</h1>")?;
    std::fs::write(html.join("404.html"), "not found")?;
    let out_dir = temp_dir.path().join("cdk.out");

    let out = synth(&site_input(&html), &out_dir)?;
    assert_eq!(out.templates, vec![out_dir.join("cdn-example-com.template.json")]);
    assert_eq!(out.manifest.as_ref().map(|m| m.files), Some(2));

    let template = read_template(&out.templates[0])?;
    assert_eq!(template.outputs["CdnSite"].value, "https://cdn.example.com");
    assert_eq!(
        template.outputs["CdnCertificate"].value,
        serde_json::json!({ "Ref": "CdnSiteCertificate" })
    );
    assert_eq!(template.parameters["HostedZoneId"].ty, "AWS::Route53::HostedZone::Id");

    let cert = &template.resources["CdnSiteCertificate"];
    assert_eq!(cert.properties["DomainName"], "cdn.example.com");
    assert_eq!(cert.properties["ValidationMethod"], "DNS");

    let script = std::fs::read_to_string(&out.script)?;
    assert!(script.contains("# assets: 2 files"));
    let sync = script.find("aws s3 sync").expect("sync step");
    let invalidate = script.find("create-invalidation").expect("invalidation step");
    assert!(sync < invalidate);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&out.script)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
    Ok(())
}

#[test]
fn test_bucket_is_only_readable_through_the_distribution() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = synth(&site_input(&temp_dir.path().join("html")), temp_dir.path())?;
    assert!(out.manifest.is_none());
    let template = read_template(&out.templates[0])?;

    let bucket = &template.resources["CdnBucket"];
    assert_eq!(bucket.properties["BucketName"], "cdn.example.com");
    assert_eq!(bucket.properties["PublicAccessBlockConfiguration"]["RestrictPublicBuckets"], true);
    assert!(bucket.properties.get("WebsiteConfiguration").is_none());

    let policies = resources_of_type(&template, "AWS::S3::BucketPolicy");
    assert_eq!(policies.len(), 1);
    let statements = policies[0].properties["PolicyDocument"]["Statement"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0]["Action"], serde_json::json!(["s3:GetObject"]));
    assert_eq!(
        statements[0]["Principal"]["CanonicalUser"],
        serde_json::json!({ "Fn::GetAtt": ["CdnCloudfrontOAI", "S3CanonicalUserId"] })
    );
    let text = std::fs::read_to_string(&out.templates[0])?;
    assert!(!text.contains("\"Principal\": \"*\""));
    Ok(())
}

#[test]
fn test_distribution_serves_https_with_error_pages() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = synth(&site_input(temp_dir.path()), temp_dir.path().join("out"))?;
    let template = read_template(&out.templates[0])?;
    let config = &template.resources["CdnDistribution"].properties["DistributionConfig"];

    assert_eq!(config["Aliases"], serde_json::json!(["cdn.example.com"]));
    assert_eq!(config["DefaultRootObject"], "index.html");
    assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
    assert_eq!(config["ViewerCertificate"]["SslSupportMethod"], "sni-only");
    let errors: Vec<(u64, String, u64)> = config["CustomErrorResponses"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|e| {
            (
                e["ErrorCode"].as_u64().unwrap_or_default(),
                e["ResponsePagePath"].as_str().unwrap_or_default().to_string(),
                e["ErrorCachingMinTTL"].as_u64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        errors,
        vec![(403, "/403.html".to_string(), 1800), (404, "/404.html".to_string(), 1800)]
    );

    let record = &template.resources["CdnAliasRecord"];
    assert_eq!(record.properties["Name"], "cdn.example.com.");
    assert_eq!(record.depends_on, vec!["CdnDistribution".to_string()]);
    Ok(())
}

#[test]
fn test_stateful_resources_are_retained_by_default() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = synth(&site_input(temp_dir.path()), temp_dir.path().join("out"))?;
    let template = read_template(&out.templates[0])?;
    for id in ["CdnBucket", "CdnSiteCertificate"] {
        assert_eq!(template.resources[id].deletion_policy.as_deref(), Some("Retain"), "{id}");
        let resource = &template.resources[id];
        assert_eq!(resource.update_replace_policy.as_deref(), Some("Retain"), "{id}");
    }
    assert!(resources_of_type(&template, "Custom::CleanupBucket").is_empty());
    Ok(())
}

#[test]
fn test_destroy_with_auto_delete_adds_cleanup() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut input = site_input(temp_dir.path());
    input.removal_policy = RemovalPolicy::Destroy;
    input.auto_delete_objects = true;
    let out = synth(&input, temp_dir.path().join("out"))?;
    let template = read_template(&out.templates[0])?;
    assert_eq!(template.resources["CdnBucket"].deletion_policy.as_deref(), Some("Delete"));
    let cleanup = &template.resources["CdnBucketCleanup"];
    assert_eq!(cleanup.ty, "Custom::CleanupBucket");
    assert_eq!(
        cleanup.depends_on,
        vec!["CdnBucketCleanupFunction".to_string(), "CdnBucket".to_string()]
    );
    let function = &template.resources["CdnBucketCleanupFunction"];
    assert_eq!(function.properties["Runtime"], "python3.12");
    Ok(())
}

/// deploying outside us-east-1 still puts the certificate in us-east-1,
/// in its own stack, and hands its arn over as a parameter.
#[test]
fn test_other_regions_split_the_certificate_out() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut input = site_input(temp_dir.path());
    input.deploy_region = "eu-west-1".to_string();
    let out_dir = temp_dir.path().join("out");
    let out = synth(&input, &out_dir)?;
    assert_eq!(
        out.templates,
        vec![
            out_dir.join("cdn-example-com-us-east-1.template.json"),
            out_dir.join("cdn-example-com.template.json"),
        ]
    );

    let cert_stack = read_template(&out.templates[0])?;
    assert_eq!(cert_stack.resources.keys().collect::<Vec<_>>(), vec!["CdnSiteCertificate"]);
    assert_eq!(
        cert_stack.outputs["CdnSiteCertificateRef"].value,
        serde_json::json!({ "Ref": "CdnSiteCertificate" })
    );

    let site_stack = read_template(&out.templates[1])?;
    assert!(!site_stack.resources.contains_key("CdnSiteCertificate"));
    assert_eq!(site_stack.parameters["CdnSiteCertificate"].ty, "String");
    let distribution = &site_stack.resources["CdnDistribution"];
    let viewer = &distribution.properties["DistributionConfig"]["ViewerCertificate"];
    assert_eq!(viewer["AcmCertificateArn"], serde_json::json!({ "Ref": "CdnSiteCertificate" }));
    assert!(!distribution.depends_on.contains(&"CdnSiteCertificate".to_string()));
    Ok(())
}

#[test]
fn test_missing_inputs_fail_before_writing_anything() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out_dir = temp_dir.path().join("out");
    let vars = Variables::from_pairs([("SUBDOMAIN", "cdn")]);

    let first = resolve(&Overrides::default(), &vars, &FileConfig::default()).unwrap_err();
    let second = resolve(&Overrides::default(), &vars, &FileConfig::default()).unwrap_err();
    assert_eq!(first.to_string(), second.to_string());
    assert!(matches!(first, SiteError::MissingInput { .. }));

    let err = synth(&SiteInput::new("example.com", ""), &out_dir).unwrap_err();
    assert!(err.to_string().contains("SUBDOMAIN"));
    assert!(!out_dir.exists());
    Ok(())
}

#[test]
fn test_synth_is_deterministic() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = site_input(temp_dir.path());
    let a = synth(&input, temp_dir.path().join("a"))?;
    let b = synth(&input, temp_dir.path().join("b"))?;
    let first: Value = serde_json::from_str(&std::fs::read_to_string(&a.templates[0])?)?;
    let second: Value = serde_json::from_str(&std::fs::read_to_string(&b.templates[0])?)?;
    assert_eq!(first, second);
    assert_eq!(
        std::fs::read_to_string(&a.templates[0])?,
        std::fs::read_to_string(&b.templates[0])?
    );
    Ok(())
}

#[test]
fn test_dot_env_feeds_the_declaration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let env_file = temp_dir.path().join(".env");
    std::fs::write(&env_file, "HOSTED_ZONE_NAME=example.org\nSUBDOMAIN=static\n")?;
    let mut vars = Variables::from_pairs(Vec::<(String, String)>::new());
    assert!(vars.load_dot_env(&env_file)?);
    let input = resolve(&Overrides::default(), &vars, &FileConfig::default())?;
    let declaration = cdn_site::declare(&input)?;
    assert_eq!(declaration.site_domain, "static.example.org");
    assert_eq!(declaration.outputs.site_url, "https://static.example.org");
    Ok(())
}
