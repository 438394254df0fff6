//! Declares a static website served from a private S3 bucket through
//! CloudFront, on a subdomain of an existing Route53 hosted zone, and
//! renders it as CloudFormation templates plus a `deploy.sh` that applies
//! them and uploads the site content.

use std::io::Write;
use std::path::{Path, PathBuf};

pub mod assets;
pub mod config;
pub mod deploy_script;
pub mod error;
pub mod graph;
pub mod logger;
pub mod resources;
pub mod site;
pub mod stack;
pub mod template;
pub mod variables;

pub use error::{Result, SiteError};
pub use site::{declare, SiteDeclaration, SiteInput, SiteOutputs};

use assets::AssetManifest;

/// what `synth` wrote.
#[derive(Debug)]
pub struct SynthOutput {
    pub templates: Vec<PathBuf>,
    pub script: PathBuf,
    pub manifest: Option<AssetManifest>,
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(|e| SiteError::io(path, e))?;
    file.write_all(contents.as_bytes()).map_err(|e| SiteError::io(path, e))?;
    file.flush().map_err(|e| SiteError::io(path, e))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).map_err(|e| SiteError::io(path, e))?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|e| SiteError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// declares the site and writes one template per stack and the deploy
/// script into `out_dir`. The asset directory does not have to exist yet,
/// it is only needed when deploy.sh runs.
pub fn synth<P: AsRef<Path>>(input: &SiteInput, out_dir: P) -> Result<SynthOutput> {
    let out_dir = out_dir.as_ref();
    let declaration = declare(input)?;
    let stacks = declaration.stacks()?;
    std::fs::create_dir_all(out_dir).map_err(|e| SiteError::io(out_dir, e))?;

    let mut templates = vec![];
    for stack in &stacks.stacks {
        let path = out_dir.join(stack.file_name());
        write_file(&path, &stack.template.to_json_pretty()?)?;
        tracing::info!(
            stack = %stack.name,
            region = %stack.region,
            resources = stack.template.resources.len(),
            "wrote {:?}",
            path
        );
        templates.push(path);
    }

    let manifest = match assets::fingerprint(&input.asset_dir) {
        Ok(manifest) => Some(manifest),
        Err(SiteError::Assets(msg)) => {
            tracing::warn!("{msg}. deploy.sh will fail to upload content until it exists");
            None
        }
        Err(e) => return Err(e),
    };

    let script = out_dir.join(deploy_script::SCRIPT_NAME);
    write_file(&script, &deploy_script::render(&declaration, &stacks, manifest.as_ref())?)?;
    make_executable(&script)?;
    tracing::info!("wrote {:?}", script);
    Ok(SynthOutput { templates, script, manifest })
}
