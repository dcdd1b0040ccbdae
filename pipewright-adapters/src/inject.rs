//! Reference injection between HTML comment markers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipewright_core::error::{Error, Result};
use pipewright_core::fileset::{FileSet, SourceFile};
use pipewright_core::pipeline::Stage;
use regex::Regex;

/// Script or stylesheet tag for `url`, chosen by extension.
pub fn reference_tag(url: &str) -> Option<String> {
    match Path::new(url).extension().and_then(|e| e.to_str()) {
        Some("js") => Some(format!(r#"<script src="{}"></script>"#, url)),
        Some("css") => Some(format!(r#"<link rel="stylesheet" href="{}">"#, url)),
        _ => None,
    }
}

/// Replaces whatever sits between `<!-- start -->` and `<!-- end -->` with
/// `lines`, each on its own line at the start marker's indentation.
///
/// Returns `None` when the markers are absent.
pub fn replace_block(html: &str, start: &str, end: &str, lines: &[String]) -> Result<Option<String>> {
    let pattern = format!(
        r"(?s)(?P<indent>[ \t]*)(?P<start><!--\s*{}\s*-->)(?P<body>.*?)(?P<end><!--\s*{}\s*-->)",
        regex::escape(start),
        regex::escape(end)
    );
    let re = Regex::new(&pattern).map_err(|e| Error::stage("inject", e))?;
    if !re.is_match(html) {
        return Ok(None);
    }

    let replaced = re.replace_all(html, |caps: &regex::Captures| {
        let indent = &caps["indent"];
        let mut block = format!("{}{}\n", indent, &caps["start"]);
        for line in lines {
            block.push_str(indent);
            block.push_str(line);
            block.push('\n');
        }
        block.push_str(indent);
        block.push_str(&caps["end"]);
        block
    });
    Ok(Some(replaced.into_owned()))
}

/// Injects references to the files matched by `refs` into every HTML file,
/// between `<!-- {tag}:js -->`/`<!-- {tag}:css -->` and `<!-- endinject -->`.
///
/// URLs are root-relative (`/src/client/app/app.module.js`).
pub struct Inject {
    name: String,
    refs: Vec<String>,
    tag: String,
    root: PathBuf,
}

impl Inject {
    pub fn new<S: AsRef<str>>(refs: &[S], root: impl Into<PathBuf>) -> Self {
        Self {
            name: "inject".to_string(),
            refs: refs.iter().map(|r| r.as_ref().to_string()).collect(),
            tag: "inject".to_string(),
            root: root.into(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self.name = format!("inject({})", self.tag);
        self
    }

    fn urls(&self) -> Result<Vec<String>> {
        Ok(FileSet::new(&self.refs)?
            .expand()?
            .into_iter()
            .map(|m| root_relative_url(&self.root, &m.full_path()))
            .collect())
    }
}

pub(crate) fn root_relative_url(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

#[async_trait]
impl Stage for Inject {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let urls = self.urls()?;
        tracing::debug!("{}: {} reference(s)", self.name, urls.len());

        let mut out = Vec::with_capacity(files.len());
        for mut file in files {
            if file.extension() != Some("html") {
                out.push(file);
                continue;
            }
            let mut html = file.text(&self.name)?.to_string();
            for ext in ["js", "css"] {
                let tags: Vec<String> = urls
                    .iter()
                    .filter(|u| u.ends_with(&format!(".{}", ext)))
                    .filter_map(|u| reference_tag(u))
                    .collect();
                let start = format!("{}:{}", self.tag, ext);
                if let Some(updated) = replace_block(&html, &start, "endinject", &tags)? {
                    html = updated;
                }
            }
            file.contents = html.into_bytes();
            out.push(file);
        }
        Ok(out)
    }
}
