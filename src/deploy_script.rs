//! Renders the `deploy.sh` that applies the synthesized stacks with the aws cli.
//!
//! The script runs in three sections:
//! - lookup: resolves hosted zone ids by name
//! - deploy: deploys every stack in order, reading the outputs a stack needs
//!   from the stacks deployed before it
//! - content: syncs the asset directory into the bucket, then invalidates
//!   the distribution

use std::collections::BTreeSet;

use crate::assets::AssetManifest;
use crate::error::{Result, SiteError};
use crate::graph::NodeKind;
use crate::resources::{BucketDeployment, HostedZoneLookup, LogicalId};
use crate::site::SiteDeclaration;
use crate::stack::{Export, InputSource, Stack, StackSet};

pub const SCRIPT_NAME: &str = "deploy.sh";

/// wraps a value in single quotes so the shell takes it literally.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn stack_output(var: &str, stack: &Stack, output_key: &str) -> String {
    format!(
        "{var}=$(aws --region {} cloudformation describe-stacks --stack-name {} --query \"Stacks[0].Outputs[?OutputKey=='{output_key}'].OutputValue\" --output text)",
        stack.region, stack.name
    )
}

fn zone_lookup(var: &str, lookup: &HostedZoneLookup) -> Vec<String> {
    let zone = lookup.zone_name();
    vec![
        format!(
            "{var}=$(aws route53 list-hosted-zones-by-name --dns-name {zone} --query \"HostedZones[?Name=='{zone}'].Id | [0]\" --output text)"
        ),
        format!(
            "if [ -z \"${var}\" ] || [ \"${var}\" = \"None\" ]; then echo \"hosted zone {} not found\" >&2; exit 1; fi",
            lookup.domain_name
        ),
        format!("{var}=${{{var}#/hostedzone/}}"),
    ]
}

fn deploy_command(stack: &Stack) -> String {
    let region = &stack.region;
    // an unchanged stack must not stop a rerun before the content section
    let mut cmd = format!(
        "AWS_REGION={region} aws --region {region} cloudformation deploy --stack-name {} \
         --template-file \"$SCRIPT_DIR/{}\" --capabilities CAPABILITY_NAMED_IAM --no-fail-on-empty-changeset",
        stack.name,
        stack.file_name()
    );
    if !stack.inputs.is_empty() {
        cmd.push_str(" --parameter-overrides");
        for input in &stack.inputs {
            let var = match &input.source {
                InputSource::ZoneLookup(_) => input.parameter.clone(),
                InputSource::StackOutput { output_key, .. } => output_key.clone(),
            };
            cmd.push_str(&format!(" \"{}=${var}\"", input.parameter));
        }
    }
    cmd
}

fn find_stack<'a>(stacks: &'a StackSet, name: &str) -> Result<&'a Stack> {
    stacks
        .get(name)
        .ok_or_else(|| SiteError::Config(format!("deploy script refers to unknown stack {name}")))
}

fn export_of<'a>(stacks: &'a StackSet, id: &LogicalId) -> Result<&'a Export> {
    stacks
        .exports
        .get(id)
        .ok_or_else(|| SiteError::Config(format!("{id} is not exported by any stack")))
}

fn content_section(stacks: &StackSet, deployment: &BucketDeployment) -> Result<Vec<String>> {
    let mut lines = vec![];
    let bucket = export_of(stacks, &deployment.bucket)?;
    let distribution = export_of(stacks, &deployment.distribution)?;
    for export in [bucket, distribution] {
        let stack = find_stack(stacks, &export.stack)?;
        lines.push(stack_output(&export.output_key, stack, &export.output_key));
    }
    let source = deployment.source.to_string_lossy();
    let mut sync = format!("aws s3 sync {} \"s3://${}\"", quote(&source), bucket.output_key);
    if deployment.prune {
        sync.push_str(" --delete");
    }
    lines.push(sync);
    let paths: Vec<String> = deployment.distribution_paths.iter().map(|p| quote(p)).collect();
    lines.push(format!(
        "aws cloudfront create-invalidation --distribution-id \"${}\" --paths {}",
        distribution.output_key,
        paths.join(" ")
    ));
    Ok(lines)
}

pub fn render(
    declaration: &SiteDeclaration,
    stacks: &StackSet,
    manifest: Option<&AssetManifest>,
) -> Result<String> {
    let mut lines: Vec<String> = vec![
        "#!/usr/bin/env bash".to_string(),
        "set -euo pipefail".to_string(),
        "# templates are next to this script, content paths are relative to where it runs"
            .to_string(),
        "SCRIPT_DIR=\"$(cd \"$(dirname \"${BASH_SOURCE[0]}\")\" && pwd)\"".to_string(),
        format!("# site: https://{}", declaration.site_domain),
    ];
    if let Some(manifest) = manifest {
        lines.push(format!(
            "# assets: {} files, {} bytes, adler32 {}",
            manifest.files,
            manifest.bytes,
            manifest.fingerprint_hex()
        ));
    }

    lines.push(String::new());
    lines.push("# lookup:".to_string());
    let mut looked_up = BTreeSet::new();
    for stack in &stacks.stacks {
        for input in &stack.inputs {
            if let InputSource::ZoneLookup(lookup) = &input.source {
                if looked_up.insert(input.parameter.clone()) {
                    lines.extend(zone_lookup(&input.parameter, lookup));
                }
            }
        }
    }

    lines.push(String::new());
    lines.push("# deploy:".to_string());
    for stack in &stacks.stacks {
        for input in &stack.inputs {
            if let InputSource::StackOutput { stack: producer, output_key } = &input.source {
                lines.push(stack_output(output_key, find_stack(stacks, producer)?, output_key));
            }
        }
        lines.push(deploy_command(stack));
    }

    let deployments = declaration.graph.nodes().filter_map(|n| match &n.kind {
        NodeKind::Deployment(d) => Some(d),
        _ => None,
    });
    lines.push(String::new());
    lines.push("# content:".to_string());
    for deployment in deployments {
        lines.extend(content_section(stacks, deployment)?);
    }
    lines.push(String::new());
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{declare, SiteInput};

    fn script(region: &str) -> String {
        let mut input = SiteInput::new("example.com", "cdn");
        input.deploy_region = region.to_string();
        let decl = declare(&input).unwrap();
        let stacks = decl.stacks().unwrap();
        render(&decl, &stacks, None).unwrap()
    }

    fn position(script: &str, needle: &str) -> usize {
        script.find(needle).unwrap_or_else(|| panic!("missing {needle} in\n{script}"))
    }

    #[test]
    fn looks_up_the_zone_before_deploying() {
        let s = script("us-east-1");
        assert!(s.starts_with("#!/usr/bin/env bash\nset -euo pipefail\n"));
        assert!(s.contains("--dns-name example.com."));
        assert!(s.contains("hosted zone example.com not found"));
        assert!(position(&s, "# lookup:") < position(&s, "cloudformation deploy"));
        assert!(s.contains("\"HostedZoneId=$HostedZoneId\""));
        assert_eq!(s.matches("cloudformation deploy").count(), 1);
    }

    #[test]
    fn syncs_before_invalidating() {
        let s = script("us-east-1");
        let deploy = position(&s, "cloudformation deploy");
        let sync = position(&s, "aws s3 sync './html' \"s3://$CdnBucketRef\" --delete");
        let invalidate = position(
            &s,
            "create-invalidation --distribution-id \"$CdnDistributionRef\" --paths '/*'",
        );
        assert!(deploy < sync);
        assert!(sync < invalidate);
    }

    #[test]
    fn certificate_stack_goes_first_in_other_regions() {
        let s = script("eu-west-1");
        let cert = position(&s, "--stack-name cdn-example-com-us-east-1 --template-file");
        let read = position(
            &s,
            "CdnSiteCertificateRef=$(aws --region us-east-1 cloudformation describe-stacks",
        );
        let site = position(&s, "--stack-name cdn-example-com --template-file");
        assert!(cert < read);
        assert!(read < site);
        assert!(s.contains("\"CdnSiteCertificate=$CdnSiteCertificateRef\""));
    }

    #[test]
    fn reruns_do_not_fail_on_unchanged_stacks() {
        for region in ["us-east-1", "eu-west-1"] {
            let s = script(region);
            let deploys: Vec<&str> = s
                .lines()
                .filter(|l| l.contains("cloudformation deploy"))
                .collect();
            assert!(!deploys.is_empty());
            for line in deploys {
                assert!(line.contains("--no-fail-on-empty-changeset"), "{line}");
            }
        }
    }

    #[test]
    fn records_the_asset_fingerprint() {
        let decl = declare(&SiteInput::new("example.com", "cdn")).unwrap();
        let stacks = decl.stacks().unwrap();
        let manifest = AssetManifest {
            root: "./html".into(),
            files: 3,
            bytes: 120,
            checksum: 0xabc,
        };
        let s = render(&decl, &stacks, Some(&manifest)).unwrap();
        assert!(s.contains("# assets: 3 files, 120 bytes, adler32 00000abc"));
    }

    #[test]
    fn quotes_paths() {
        assert_eq!(quote("./my site"), "'./my site'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
