//! Build-block bundling.
//!
//! ```html
//! <!-- build:js js/app.js -->
//! <script src="/src/client/app/app.module.js"></script>
//! <script src="/tmp/template.js"></script>
//! <!-- endbuild -->
//! ```
//!
//! becomes a single `<script src="js/app.js"></script>` and a new `js/app.js`
//! file in the stream holding both sources concatenated.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pipewright_core::error::{Error, Result};
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;
use regex::Regex;

use crate::inject::reference_tag;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--\s*build:(?P<kind>js|css)\s+(?P<target>\S+)\s*-->(?P<body>.*?)<!--\s*endbuild\s*-->")
        .expect("build block pattern is valid")
});

static REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:src|href)\s*=\s*["'](?P<url>[^"']+)["']"#).expect("reference pattern is valid")
});

struct Block {
    start: usize,
    end: usize,
    kind: String,
    target: String,
    body: String,
}

/// Concatenates the assets referenced inside each build block.
///
/// References are looked up under each search directory in turn; a
/// reference found nowhere fails the stage.
pub struct Useref {
    search_paths: Vec<PathBuf>,
}

impl Useref {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    fn locate(&self, html_dir: &Path, url: &str) -> Option<PathBuf> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let trimmed = url.trim_start_matches('/');
        let mut candidates: Vec<PathBuf> = self.search_paths.iter().map(|d| d.join(trimmed)).collect();
        if !url.starts_with('/') {
            candidates.insert(0, html_dir.join(url));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    async fn bundle(&self, html_dir: &Path, body: &str, kind: &str) -> Result<Vec<u8>> {
        let separator: &[u8] = if kind == "js" { b";\n" } else { b"\n" };
        let urls: Vec<String> = REF_RE
            .captures_iter(body)
            .map(|caps| caps["url"].to_string())
            .collect();

        let mut bundle = Vec::new();
        for url in &urls {
            let path = self.locate(html_dir, url).ok_or_else(|| {
                Error::stage("useref", format!("cannot find {} in {:?}", url, self.search_paths))
            })?;
            let contents = tokio::fs::read(&path).await?;
            if !bundle.is_empty() {
                bundle.extend_from_slice(separator);
            }
            bundle.extend_from_slice(&contents);
        }
        Ok(bundle)
    }
}

#[async_trait]
impl Stage for Useref {
    fn name(&self) -> &str {
        "useref"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let mut out = Vec::new();
        for mut file in files {
            if file.extension() != Some("html") {
                out.push(file);
                continue;
            }

            let full = file.full_path();
            let html_dir = full.parent().unwrap_or(Path::new("")).to_path_buf();
            let html = file.text(self.name())?.to_string();

            let blocks: Vec<Block> = BLOCK_RE
                .captures_iter(&html)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    Some(Block {
                        start: whole.start(),
                        end: whole.end(),
                        kind: caps["kind"].to_string(),
                        target: caps["target"].to_string(),
                        body: caps["body"].to_string(),
                    })
                })
                .collect();

            let mut rewritten = String::with_capacity(html.len());
            let mut assets = Vec::new();
            let mut last = 0;
            for block in blocks {
                let bundle = self.bundle(&html_dir, &block.body, &block.kind).await?;
                tracing::debug!("useref: {} <- {} byte(s)", block.target, bundle.len());

                rewritten.push_str(&html[last..block.start]);
                rewritten.push_str(&reference_tag(&block.target).unwrap_or_default());
                last = block.end;
                assets.push(SourceFile::new(file.base.clone(), block.target, bundle));
            }
            rewritten.push_str(&html[last..]);

            file.contents = rewritten.into_bytes();
            out.push(file);
            out.extend(assets);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn bundles_blocks_and_rewrites_html() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/client/app")).unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
        fs::write(root.join("src/client/app/app.module.js"), "angular.module('app', [])").unwrap();
        fs::write(root.join("tmp/template.js"), "templates()").unwrap();
        fs::write(root.join("tmp/styles.css"), "body{}").unwrap();

        let index = "<head>\n<!-- build:css styles/app.css -->\n<link rel=\"stylesheet\" href=\"/tmp/styles.css\">\n<!-- endbuild -->\n</head>\n<!-- build:js js/app.js -->\n<script src=\"/src/client/app/app.module.js\"></script>\n<script src=\"/tmp/template.js\"></script>\n<!-- endbuild -->\n";
        let file = SourceFile::new(root.join("src/client"), "index.html", index.as_bytes().to_vec());

        let out = Useref::new(vec![root.to_path_buf()]).apply(vec![file]).await.unwrap();

        assert_eq!(out.len(), 3);
        let html = String::from_utf8(out[0].contents.clone()).unwrap();
        assert_eq!(
            html,
            "<head>\n<link rel=\"stylesheet\" href=\"styles/app.css\">\n</head>\n<script src=\"js/app.js\"></script>\n"
        );
        assert_eq!(out[1].path, PathBuf::from("styles/app.css"));
        assert_eq!(out[2].path, PathBuf::from("js/app.js"));
        assert_eq!(out[2].contents, b"angular.module('app', []);\ntemplates()");
    }

    #[tokio::test]
    async fn missing_reference_fails() {
        let dir = TempDir::new().unwrap();
        let index = "<!-- build:js js/app.js --><script src=\"/nope.js\"></script><!-- endbuild -->";
        let file = SourceFile::new(dir.path(), "index.html", index.as_bytes().to_vec());

        let err = Useref::new(vec![dir.path().to_path_buf()]).apply(vec![file]).await.unwrap_err();
        assert!(matches!(err, Error::Stage { ref stage, .. } if stage == "useref"));
    }
}
