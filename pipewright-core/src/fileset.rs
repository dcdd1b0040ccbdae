//! Glob expansion into ordered file collections.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A file flowing through a pipeline.
///
/// `path` is relative to `base`, the non-glob prefix of the pattern that
/// matched it, so writing to a destination keeps the directory structure
/// below that prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub base: PathBuf,
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl SourceFile {
    pub fn new(base: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            contents,
        }
    }

    /// Location on disk the file was read from.
    pub fn full_path(&self) -> PathBuf {
        self.base.join(&self.path)
    }

    #[inline]
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }

    /// Relative path with forward slashes, as used in URLs and manifests.
    pub fn relative_url(&self) -> String {
        self.path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Contents as UTF-8, failing with a stage error tagged `stage`.
    pub fn text(&self, stage: &str) -> Result<&str> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            Error::stage(
                stage,
                format!("{} is not valid UTF-8: {}", self.full_path().display(), e),
            )
        })
    }
}

/// A path matched by a glob set, before its contents are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPath {
    pub base: PathBuf,
    pub path: PathBuf,
}

impl MatchedPath {
    pub fn full_path(&self) -> PathBuf {
        self.base.join(&self.path)
    }
}

/// Glob set with gulp-style semantics: positive patterns add matches in
/// declaration order, `!`-prefixed patterns remove them.
#[derive(Debug, Clone)]
pub struct FileSet {
    includes: Vec<(String, Pattern)>,
    excludes: Vec<Pattern>,
}

impl FileSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();

        for raw in patterns {
            let raw = raw.as_ref();
            match raw.strip_prefix('!') {
                Some(negated) => excludes.push(compile(negated)?),
                None => includes.push((normalize(raw).to_string(), compile(raw)?)),
            }
        }

        Ok(Self { includes, excludes })
    }

    /// Returns true when `path` is selected by this set.
    pub fn matches(&self, path: &Path) -> bool {
        let candidate = normalize_path(path);
        self.includes
            .iter()
            .any(|(_, p)| p.matches_with(&candidate, MATCH_OPTIONS))
            && !self.is_excluded(&candidate)
    }

    /// Expands the set against the filesystem without reading contents.
    pub fn expand(&self) -> Result<Vec<MatchedPath>> {
        let mut seen = HashSet::new();
        let mut matched = Vec::new();

        for (raw, pattern) in &self.includes {
            let base = glob_base(raw);
            let mut found = Vec::new();

            if !has_magic(raw) {
                let path = PathBuf::from(raw);
                if path.is_file() {
                    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    let name = path.file_name().map(PathBuf::from).unwrap_or_default();
                    found.push(MatchedPath { base: parent, path: name });
                }
            } else if base.is_dir() {
                let mut walker = WalkDir::new(&base).follow_links(true).sort_by_file_name();
                if !raw.contains("**") {
                    let depth = Path::new(raw).components().count()
                        - base.components().count().min(Path::new(raw).components().count());
                    walker = walker.max_depth(depth.max(1));
                }
                for entry in walker.into_iter().filter_map(|e| e.ok()) {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let candidate = normalize_path(entry.path());
                    if !pattern.matches_with(&candidate, MATCH_OPTIONS) {
                        continue;
                    }
                    let Ok(relative) = entry.path().strip_prefix(&base) else {
                        continue;
                    };
                    found.push(MatchedPath {
                        base: base.clone(),
                        path: relative.to_path_buf(),
                    });
                }
            }

            for m in found {
                let candidate = normalize_path(&m.full_path());
                if self.is_excluded(&candidate) {
                    continue;
                }
                if seen.insert(candidate) {
                    matched.push(m);
                }
            }
        }

        Ok(matched)
    }

    /// Expands the set and reads every matched file.
    pub async fn read(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for m in self.expand()? {
            let contents = tokio::fs::read(m.full_path()).await?;
            files.push(SourceFile::new(m.base, m.path, contents));
        }
        Ok(files)
    }

    fn is_excluded(&self, candidate: &str) -> bool {
        self.excludes
            .iter()
            .any(|p| p.matches_with(candidate, MATCH_OPTIONS))
    }
}

fn compile(raw: &str) -> Result<Pattern> {
    Pattern::new(normalize(raw)).map_err(|e| Error::Glob {
        pattern: raw.to_string(),
        message: e.to_string(),
    })
}

fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Longest leading run of path components free of glob syntax.
pub fn glob_base(pattern: &str) -> PathBuf {
    let pattern = normalize(pattern);
    let mut base = PathBuf::new();
    let components: Vec<&str> = pattern.split('/').collect();

    for (idx, part) in components.iter().enumerate() {
        if has_magic(part) || idx == components.len() - 1 {
            break;
        }
        if part.is_empty() && idx == 0 {
            base.push("/");
            continue;
        }
        base.push(part);
    }

    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

fn normalize(raw: &str) -> &str {
    raw.strip_prefix("./").unwrap_or(raw)
}

fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    normalize(&s).to_string()
}
