//! Content-hash revisioning of built assets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipewright_core::error::{Error, Result};
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;

pub const MANIFEST_FILE: &str = "rev-manifest.json";

const HASH_LEN: usize = 10;

/// Original to revisioned path mapping, filled by [`Rev`].
#[derive(Debug, Clone, Default)]
pub struct RevManifest {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl RevManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn insert(&self, original: String, revved: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(original, revved);
        }
    }

    /// Writes `rev-manifest.json` into `dir`.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.entries())?;
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, json).await?;
        tracing::info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// `app.js` with contents hashing to `0a1b2c...` becomes `app-0a1b2c3d4e.js`.
pub fn revisioned_name(path: &Path, contents: &[u8]) -> PathBuf {
    let hash = blake3::hash(contents).to_hex();
    let hash = &hash.as_str()[..HASH_LEN];
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, hash, ext.to_string_lossy()),
        None => format!("{}-{}", stem, hash),
    };
    path.with_file_name(name)
}

/// Renames every non-HTML file by content hash.
pub struct Rev {
    manifest: RevManifest,
}

impl Rev {
    pub fn new(manifest: RevManifest) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl Stage for Rev {
    fn name(&self) -> &str {
        "rev"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        Ok(files
            .into_iter()
            .map(|mut file| {
                if file.extension() == Some("html") {
                    return file;
                }
                let original = file.relative_url();
                file.path = revisioned_name(&file.path, &file.contents);
                self.manifest.insert(original, file.relative_url());
                file
            })
            .collect())
    }
}

/// Rewrites references to revisioned files inside HTML, JS and CSS.
pub struct RevReplace {
    manifest: RevManifest,
}

impl RevReplace {
    pub fn new(manifest: RevManifest) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl Stage for RevReplace {
    fn name(&self) -> &str {
        "rev-replace"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let mut entries: Vec<(String, String)> = self.manifest.entries().into_iter().collect();
        // Longest first so `js/app.js` wins over `app.js`.
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        files
            .into_iter()
            .map(|mut file| {
                if !matches!(file.extension(), Some("html" | "js" | "css")) {
                    return Ok(file);
                }
                let Ok(text) = std::str::from_utf8(&file.contents) else {
                    return Err(Error::stage(
                        "rev-replace",
                        format!("{} is not valid UTF-8", file.full_path().display()),
                    ));
                };
                let mut text = text.to_string();
                for (original, revved) in &entries {
                    if text.contains(original.as_str()) {
                        text = text.replace(original.as_str(), revved);
                    }
                }
                file.contents = text.into_bytes();
                Ok(file)
            })
            .collect()
    }
}
