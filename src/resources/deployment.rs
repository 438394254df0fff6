use std::path::PathBuf;

use super::*;

/// invalidates everything the distribution has cached.
pub const INVALIDATE_ALL: &str = "/*";

/// Pushes a local directory into a bucket, then invalidates the
/// distribution in front of it. This is not a template resource, it runs
/// after the stacks it depends on are deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDeployment {
    pub source: PathBuf,
    pub bucket: LogicalId,
    pub distribution: LogicalId,
    pub distribution_paths: Vec<String>,
    /// remove objects from the bucket that no longer exist in the source.
    pub prune: bool,
}

impl BucketDeployment {
    pub fn new<P: Into<PathBuf>>(source: P, bucket: &LogicalId, distribution: &LogicalId) -> Self {
        Self {
            source: source.into(),
            bucket: bucket.clone(),
            distribution: distribution.clone(),
            distribution_paths: vec![INVALIDATE_ALL.to_string()],
            prune: true,
        }
    }
}
