//! Semantic version bumps across package manifests.

use std::path::{Path, PathBuf};

use semver::Version;

use crate::error::{Error, Result};

/// Reads and rewrites the version of a package manifest in place.
///
/// Adapters only touch the version value; the rest of the file keeps its
/// formatting.
pub trait ManifestAdapter: Send + Sync {
    fn detect(&self, path: &Path) -> bool;
    fn read_version(&self, path: &Path) -> Result<Option<String>>;
    fn write_version(&self, path: &Path, new_version: &str) -> Result<()>;
}

/// Type of semantic version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpType {
    /// Major version bump (1.0.0 -> 2.0.0).
    Major,
    /// Minor version bump (1.0.0 -> 1.1.0).
    Minor,
    /// Patch version bump (1.0.0 -> 1.0.1).
    #[default]
    Patch,
}

impl BumpType {
    pub fn apply(self, version: &Version) -> Version {
        match self {
            BumpType::Major => Version::new(version.major + 1, 0, 0),
            BumpType::Minor => Version::new(version.major, version.minor + 1, 0),
            BumpType::Patch => Version::new(version.major, version.minor, version.patch + 1),
        }
    }
}

/// What the bump task was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Set this exact version everywhere.
    Exact(Version),
    /// Increment the current version.
    Bump(BumpType),
}

impl VersionRequest {
    /// Builds a request from CLI input. An explicit version wins over `bump`.
    pub fn from_args(bump: Option<BumpType>, versions: Option<&str>) -> Result<Self> {
        match versions {
            Some(v) => Version::parse(v)
                .map(VersionRequest::Exact)
                .map_err(|e| Error::Release(format!("Invalid version {}: {}", v, e))),
            None => Ok(VersionRequest::Bump(bump.unwrap_or_default())),
        }
    }

    pub fn resolve(&self, current: Option<&str>) -> Result<Version> {
        match self {
            VersionRequest::Exact(v) => Ok(v.clone()),
            VersionRequest::Bump(bump) => {
                let current = match current {
                    Some(v) => Version::parse(v)
                        .map_err(|e| Error::Release(format!("Invalid version {}: {}", v, e)))?,
                    None => Version::new(0, 1, 0),
                };
                Ok(bump.apply(&current))
            }
        }
    }
}

/// A manifest whose version was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpedManifest {
    pub path: PathBuf,
    pub old_version: Option<String>,
    pub new_version: String,
}

/// Engine for rewriting manifest versions.
pub struct ReleaseEngine {
    adapters: Vec<Box<dyn ManifestAdapter>>,
    dry_run: bool,
}

impl ReleaseEngine {
    pub fn new(adapters: Vec<Box<dyn ManifestAdapter>>) -> Self {
        Self {
            adapters,
            dry_run: false,
        }
    }

    /// If set, versions are computed and reported but files are left alone.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bumps every manifest that exists and has a matching adapter.
    ///
    /// Missing manifests are skipped with a warning.
    pub fn bump(&self, manifests: &[PathBuf], request: &VersionRequest) -> Result<Vec<BumpedManifest>> {
        let mut bumped = Vec::new();

        for path in manifests {
            if !path.exists() {
                tracing::warn!("manifest {} not found, skipping", path.display());
                continue;
            }
            let adapter = self
                .adapters
                .iter()
                .find(|a| a.detect(path))
                .ok_or_else(|| Error::Manifest {
                    path: path.clone(),
                    message: "no adapter understands this manifest".to_string(),
                })?;

            let old_version = adapter.read_version(path)?;
            let new_version = request.resolve(old_version.as_deref())?.to_string();

            if !self.dry_run {
                adapter.write_version(path, &new_version)?;
            }

            tracing::info!(
                "Bumped {} from {} to {}{}",
                path.display(),
                old_version.as_deref().unwrap_or("(none)"),
                new_version,
                if self.dry_run { " (dry run)" } else { "" }
            );

            bumped.push(BumpedManifest {
                path: path.clone(),
                old_version,
                new_version,
            });
        }

        Ok(bumped)
    }
}
