//! Angular `$templateCache` generation.

use async_trait::async_trait;
use pipewright_core::config::TemplateCacheConfig;
use pipewright_core::error::Result;
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;

/// Folds every HTML template into one script that registers them with the
/// module's `$templateCache` under `root + relative path`.
pub struct TemplateCache {
    config: TemplateCacheConfig,
}

impl TemplateCache {
    pub fn new(config: TemplateCacheConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, files: &[SourceFile]) -> Result<String> {
        let mut puts = String::new();
        for file in files {
            let url = format!("{}{}", self.config.root, file.relative_url());
            puts.push_str(&format!(
                "$templateCache.put(\"{}\",\"{}\");\n",
                escape(&url),
                escape(file.text(self.name())?)
            ));
        }

        let module = if self.config.standalone {
            format!("angular.module(\"{}\", [])", self.config.module)
        } else {
            format!("angular.module(\"{}\")", self.config.module)
        };

        Ok(format!(
            "{}.run([\"$templateCache\", function($templateCache) {{\n{}}}]);\n",
            module, puts
        ))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Stage for TemplateCache {
    fn name(&self) -> &str {
        "templatecache"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let script = self.render(&files)?;
        tracing::debug!("cached {} template(s) on {}", files.len(), self.config.module);
        Ok(vec![SourceFile::new(
            "",
            &self.config.file,
            script.into_bytes(),
        )])
    }
}
