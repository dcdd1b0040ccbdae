//! Ordered file-stream transforms ending in a destination write.
//!
//! A pipeline is a fold over its stages: each stage receives the whole
//! collection produced by the previous one. The first stage error aborts the
//! run, so later stages and the destination write never execute.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::fileset::{FileSet, SourceFile};

/// A single transform over a file collection.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>>;
}

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Number of files that reached the end of the stage chain.
    pub files: usize,
    /// Paths written by the destination stage, if any.
    pub written: Vec<PathBuf>,
}

/// A pipeline under construction, reading from a glob set.
pub struct Pipeline {
    sources: Vec<String>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn src<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            sources: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            stages: Vec::new(),
        }
    }

    pub fn pipe(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends a stage only when `condition` holds.
    pub fn pipe_if(self, condition: bool, stage: impl Stage + 'static) -> Self {
        if condition {
            self.pipe(stage)
        } else {
            self
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Terminates the pipeline with a write into `dir`.
    pub fn dest(self, dir: impl Into<PathBuf>) -> DestPipeline {
        DestPipeline {
            pipeline: self,
            dest: dir.into(),
        }
    }

    /// Runs every stage without writing anything, as check-only tasks do.
    pub async fn run_without_dest(self) -> Result<PipelineReport> {
        let files = self.run_stages().await?;
        Ok(PipelineReport {
            files: files.len(),
            written: Vec::new(),
        })
    }

    async fn run_stages(self) -> Result<Vec<SourceFile>> {
        let files = FileSet::new(&self.sources)?.read().await?;
        tracing::debug!("{} file(s) matched {:?}", files.len(), self.sources);
        apply_stages(&self.stages, files).await
    }
}

/// A pipeline whose last step writes every file below a directory.
pub struct DestPipeline {
    pipeline: Pipeline,
    dest: PathBuf,
}

impl DestPipeline {
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Runs all stages, then writes. Returns after every file is flushed.
    pub async fn run(self) -> Result<PipelineReport> {
        let files = self.pipeline.run_stages().await?;
        let written = write_all(&self.dest, &files).await?;
        Ok(PipelineReport {
            files: files.len(),
            written,
        })
    }
}

/// Applies `stages` in order, stopping at the first failure.
pub async fn apply_stages(
    stages: &[Box<dyn Stage>],
    mut files: Vec<SourceFile>,
) -> Result<Vec<SourceFile>> {
    for stage in stages {
        tracing::trace!("stage {} <- {} file(s)", stage.name(), files.len());
        files = stage.apply(files).await.map_err(|e| match e {
            Error::Stage { .. } => e,
            other => Error::stage(stage.name(), other),
        })?;
    }
    Ok(files)
}

/// Writes files below `dest`, keeping their base-relative layout.
pub async fn write_all(dest: &Path, files: &[SourceFile]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = dest.join(&file.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.contents).await?;
        written.push(target);
    }
    Ok(written)
}

/// Runs inner stages on the files matching a pattern set, then restores the
/// untouched files around them.
///
/// When the inner stages keep the number of files, each output takes the
/// position of the input it came from. Otherwise all outputs are placed where
/// the first matched file was.
pub struct Filter {
    name: String,
    patterns: FileSet,
    stages: Vec<Box<dyn Stage>>,
}

impl Filter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let name = format!(
            "filter({})",
            patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            name,
            patterns: FileSet::new(patterns)?,
            stages: Vec::new(),
        })
    }

    pub fn pipe(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

#[async_trait]
impl Stage for Filter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let mut slots: Vec<Option<SourceFile>> = Vec::with_capacity(files.len());
        let mut positions = Vec::new();
        let mut matched = Vec::new();

        for file in files {
            if self.patterns.matches(&file.path) {
                positions.push(slots.len());
                slots.push(None);
                matched.push(file);
            } else {
                slots.push(Some(file));
            }
        }

        if matched.is_empty() {
            return Ok(slots.into_iter().flatten().collect());
        }

        let processed = apply_stages(&self.stages, matched).await?;

        if processed.len() == positions.len() {
            for (pos, file) in positions.into_iter().zip(processed) {
                slots[pos] = Some(file);
            }
            return Ok(slots.into_iter().flatten().collect());
        }

        let first = positions[0];
        let mut restored = Vec::with_capacity(slots.len() + processed.len());
        let mut processed = Some(processed);
        for (idx, slot) in slots.into_iter().enumerate() {
            if idx == first {
                restored.extend(processed.take().unwrap_or_default());
            }
            restored.extend(slot);
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Upper;

    #[async_trait]
    impl Stage for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
            Ok(files
                .into_iter()
                .map(|mut f| {
                    f.contents = f.contents.to_ascii_uppercase();
                    f
                })
                .collect())
        }
    }

    struct Fails;

    #[async_trait]
    impl Stage for Fails {
        fn name(&self) -> &str {
            "lint"
        }

        async fn apply(&self, _files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
            Err(Error::stage("lint", "2 violations"))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(files)
        }
    }

    struct Concat;

    #[async_trait]
    impl Stage for Concat {
        fn name(&self) -> &str {
            "concat"
        }

        async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
            let contents = files.iter().flat_map(|f| f.contents.clone()).collect();
            Ok(vec![SourceFile::new(".", "all.js", contents)])
        }
    }

    fn file(path: &str, contents: &str) -> SourceFile {
        SourceFile::new(".", path, contents.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn stages_apply_in_declaration_order() {
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(Upper), Box::new(Concat)];
        let out = apply_stages(&stages, vec![file("a.js", "a"), file("b.js", "b")])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].contents, b"AB");
    }

    #[tokio::test]
    async fn failing_stage_short_circuits() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Box<dyn Stage>> =
            vec![Box::new(Fails), Box::new(Counting(counter.clone()))];
        let err = apply_stages(&stages, vec![file("a.js", "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stage { ref stage, .. } if stage == "lint"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_stage_never_writes_destination() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.js"), "var a;").unwrap();
        let out = dir.path().join("out");

        let result = Pipeline::src(&[format!("{}/*.js", src.display())])
            .pipe(Fails)
            .dest(&out)
            .run()
            .await;

        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn dest_keeps_relative_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/a.js"), "a").unwrap();
        let out = dir.path().join("out");

        let report = Pipeline::src(&[format!("{}/**/*.js", src.display())])
            .pipe(Upper)
            .dest(&out)
            .run()
            .await
            .unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(std::fs::read_to_string(out.join("nested/a.js")).unwrap(), "A");
    }

    #[tokio::test]
    async fn filter_restores_unmatched_positions() {
        let filter = Filter::new(&["**/*.js"]).unwrap().pipe(Upper);
        let out = filter
            .apply(vec![
                file("index.html", "html"),
                file("app.js", "js"),
                file("app.css", "css"),
                file("vendor.js", "vendor"),
            ])
            .await
            .unwrap();

        let paths: Vec<String> = out.iter().map(|f| f.relative_url()).collect();
        assert_eq!(paths, vec!["index.html", "app.js", "app.css", "vendor.js"]);
        assert_eq!(out[1].contents, b"JS");
        assert_eq!(out[2].contents, b"css");
    }

    #[tokio::test]
    async fn filter_places_merged_output_at_first_match() {
        let filter = Filter::new(&["*.js"]).unwrap().pipe(Concat);
        let out = filter
            .apply(vec![
                file("index.html", "html"),
                file("a.js", "a"),
                file("b.css", "b"),
                file("c.js", "c"),
            ])
            .await
            .unwrap();

        let paths: Vec<String> = out.iter().map(|f| f.relative_url()).collect();
        assert_eq!(paths, vec!["index.html", "all.js", "b.css"]);
    }
}
