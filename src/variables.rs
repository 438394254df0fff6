use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;

use crate::error::{Result, SiteError};

pub const HOSTED_ZONE_NAME: &str = "HOSTED_ZONE_NAME";
pub const SUBDOMAIN: &str = "SUBDOMAIN";
pub const STACK_NAME: &str = "STACK_NAME";
pub const ASSET_DIR: &str = "ASSET_DIR";
pub const REMOVAL_POLICY: &str = "REMOVAL_POLICY";
pub const AUTO_DELETE_OBJECTS: &str = "AUTO_DELETE_OBJECTS";
/// checked in order, the first one that is set wins.
pub const DEPLOY_REGION_VARS: &[&str] = &["AWS_REGION", "CDK_DEFAULT_REGION"];

/// Values that the declaration reads from its environment.
/// The process environment always takes precedence over values loaded
/// from a .env file. Empty values are treated as unset.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    process: HashMap<String, String>,
    dot_env: HashMap<String, String>,
}

impl Variables {
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    /// variables that are not valid unicode can't be any of ours, so they are skipped.
    fn from_os_pairs<I: IntoIterator<Item = (OsString, OsString)>>(pairs: I) -> Self {
        let mut process = HashMap::new();
        for (key, value) in pairs {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => {
                    process.insert(key, value);
                }
                (key, _) => {
                    tracing::debug!(key = ?key, "skipping non unicode environment variable")
                }
            }
        }
        Self { process, dot_env: HashMap::new() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            process: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            dot_env: HashMap::new(),
        }
    }

    /// loads a .env file. A missing file is not an error, the return
    /// value tells whether anything was loaded.
    pub fn load_dot_env<P: AsRef<Path>>(&mut self, path: P) -> Result<bool> {
        let path = path.as_ref();
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Ok(false),
            Err(e) => {
                return Err(SiteError::Config(format!(
                    "Failed to load .env file {:?}: {}",
                    path, e
                )))
            }
        };
        for item in iter {
            let (key, val) = item.map_err(|e| {
                SiteError::Config(format!("Failed to parse .env file {:?}: {}", path, e))
            })?;
            self.dot_env.insert(key, val);
        }
        tracing::debug!(path = ?path, count = self.dot_env.len(), "loaded .env file");
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let lookup = |map: &HashMap<String, String>| {
            map.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        lookup(&self.process).or_else(|| lookup(&self.dot_env))
    }

    pub fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| SiteError::missing(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn process_env_wins_over_dot_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "HOSTED_ZONE_NAME=fromfile.com").unwrap();
        writeln!(file, "SUBDOMAIN=docs").unwrap();
        drop(file);

        let mut vars = Variables::from_pairs([("HOSTED_ZONE_NAME", "fromprocess.com")]);
        assert!(vars.load_dot_env(&path).unwrap());
        assert_eq!(vars.get(HOSTED_ZONE_NAME).as_deref(), Some("fromprocess.com"));
        assert_eq!(vars.get(SUBDOMAIN).as_deref(), Some("docs"));
    }

    #[test]
    fn missing_dot_env_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = Variables::default();
        assert!(!vars.load_dot_env(dir.path().join("nope.env")).unwrap());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let vars = Variables::from_pairs([("SUBDOMAIN", "   ")]);
        let err = vars.require(SUBDOMAIN).unwrap_err();
        assert!(matches!(err, SiteError::MissingInput { ref name } if name == "SUBDOMAIN"));
        assert!(err.to_string().contains("SUBDOMAIN"));
    }

    #[test]
    fn first_of_respects_order() {
        let vars = Variables::from_pairs([
            ("CDK_DEFAULT_REGION", "eu-west-1"),
            ("AWS_REGION", "us-west-2"),
        ]);
        assert_eq!(vars.first_of(DEPLOY_REGION_VARS).as_deref(), Some("us-west-2"));
        let vars = Variables::from_pairs([("CDK_DEFAULT_REGION", "eu-west-1")]);
        assert_eq!(vars.first_of(DEPLOY_REGION_VARS).as_deref(), Some("eu-west-1"));
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;
        let vars = Variables::from_os_pairs([
            (OsString::from("SUBDOMAIN"), OsString::from("cdn")),
            (OsString::from("GARBLED"), OsString::from_vec(b"f\xffo".to_vec())),
            (OsString::from_vec(b"K\xff".to_vec()), OsString::from("v")),
        ]);
        assert_eq!(vars.get(SUBDOMAIN).as_deref(), Some("cdn"));
        assert_eq!(vars.get("GARBLED"), None);

        std::env::set_var("CDN_SITE_TEST_GARBLED", OsString::from_vec(b"f\xffo".to_vec()));
        let vars = Variables::from_process();
        std::env::remove_var("CDN_SITE_TEST_GARBLED");
        assert_eq!(vars.get("CDN_SITE_TEST_GARBLED"), None);
    }
}
