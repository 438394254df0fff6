//! Where a site's settings come from.
//!
//! Every setting is resolved in the same order: command line flag, then the
//! process environment, then the `.env` file, then the optional TOML file,
//! then the built in default.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::error::{Result, SiteError};
use crate::resources::RemovalPolicy;
use crate::site::SiteInput;
use crate::variables::{self, Variables};

#[derive(Debug, Clone, Parser)]
#[command(name = "cdn_site")]
#[command(
    about = "Synthesizes the CloudFormation stacks and deploy script for a static site behind CloudFront"
)]
pub struct Cli {
    /// dotenv file to read variables from. A missing file is not an error.
    #[arg(long, default_value = ".env", global = true)]
    pub env_file: PathBuf,

    /// optional TOML file with site settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// write the templates and deploy.sh
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out_dir: PathBuf,
    },
    /// print the resources in deployment order without writing anything
    Plan,
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// root domain of an existing hosted zone, eg: example.com
    #[arg(long, global = true)]
    pub domain: Option<String>,

    #[arg(long, global = true)]
    pub subdomain: Option<String>,

    #[arg(long, global = true)]
    pub asset_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub stack_name: Option<String>,

    #[arg(long, global = true)]
    pub region: Option<String>,

    /// retain or destroy
    #[arg(long, global = true)]
    pub removal_policy: Option<RemovalPolicy>,

    /// `--auto-delete-objects` alone means true, `=false` turns it off
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub auto_delete_objects: Option<bool>,
}

/// the `[site]` table of the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub asset_dir: Option<PathBuf>,
    pub stack_name: Option<String>,
    pub region: Option<String>,
    pub removal_policy: Option<RemovalPolicy>,
    pub auto_delete_objects: Option<bool>,
    pub default_root_object: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub site: SiteConfig,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SiteError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// combines flags, variables and the config file into a site input.
/// Missing domain or subdomain fail here, before anything is declared.
pub fn resolve(overrides: &Overrides, vars: &Variables, file: &FileConfig) -> Result<SiteInput> {
    let site = &file.site;
    let pick = |flag: &Option<String>, var: &str, from_file: &Option<String>| {
        non_empty(flag.clone())
            .or_else(|| vars.get(var))
            .or_else(|| non_empty(from_file.clone()))
    };

    let domain = pick(&overrides.domain, variables::HOSTED_ZONE_NAME, &site.domain)
        .ok_or_else(|| SiteError::missing(variables::HOSTED_ZONE_NAME))?;
    let subdomain = pick(&overrides.subdomain, variables::SUBDOMAIN, &site.subdomain)
        .ok_or_else(|| SiteError::missing(variables::SUBDOMAIN))?;

    let mut input = SiteInput::new(domain, subdomain);
    input.stack_name = pick(&overrides.stack_name, variables::STACK_NAME, &site.stack_name);

    if let Some(dir) = overrides
        .asset_dir
        .clone()
        .or_else(|| vars.get(variables::ASSET_DIR).map(PathBuf::from))
        .or_else(|| site.asset_dir.clone())
    {
        input.asset_dir = dir;
    }

    if let Some(region) = non_empty(overrides.region.clone())
        .or_else(|| vars.first_of(variables::DEPLOY_REGION_VARS))
        .or_else(|| non_empty(site.region.clone()))
    {
        input.deploy_region = region;
    }

    input.removal_policy = match overrides.removal_policy {
        Some(policy) => policy,
        None => match vars.get(variables::REMOVAL_POLICY) {
            Some(raw) => raw
                .parse::<RemovalPolicy>()
                .map_err(|e: String| SiteError::invalid(variables::REMOVAL_POLICY, e))?,
            None => site.removal_policy.unwrap_or_default(),
        },
    };
    input.auto_delete_objects = match overrides.auto_delete_objects {
        Some(flag) => flag,
        None => match vars.get(variables::AUTO_DELETE_OBJECTS) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                SiteError::invalid(
                    variables::AUTO_DELETE_OBJECTS,
                    format!("'{raw}' is not true or false"),
                )
            })?,
            None => site.auto_delete_objects.unwrap_or(false),
        },
    };
    if let Some(root) = non_empty(site.default_root_object.clone()) {
        input.default_root_object = root;
    }
    tracing::debug!(?input, "resolved site input");
    Ok(input)
}
