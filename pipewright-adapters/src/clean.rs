use std::path::{Path, PathBuf};

use pipewright_core::error::Result;
use pipewright_core::fileset::FileSet;

/// Deletes every file matched by `patterns`. Returns the removed paths.
pub async fn clean_files<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let matched = FileSet::new(patterns)?.expand()?;
    let mut removed = Vec::with_capacity(matched.len());

    for m in matched {
        let path = m.full_path();
        tracing::info!("Cleaning: {}", path.display());
        tokio::fs::remove_file(&path).await?;
        removed.push(path);
    }
    Ok(removed)
}

/// Removes whole directories; absent ones are skipped.
pub async fn clean_dirs(dirs: &[&Path]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        tracing::info!("Cleaning: {}", dir.display());
        tokio::fs::remove_dir_all(dir).await?;
        removed.push(dir.to_path_buf());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn removes_only_matches() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("tmp");
        fs::create_dir_all(tmp.join("nested")).unwrap();
        fs::write(tmp.join("styles.css"), "").unwrap();
        fs::write(tmp.join("nested/extra.css"), "").unwrap();
        fs::write(tmp.join("template.js"), "").unwrap();

        let removed = clean_files(&[format!("{}/**/*.css", tmp.display())]).await.unwrap();

        assert_eq!(removed.len(), 2);
        assert!(tmp.join("template.js").exists());
        assert!(!tmp.join("styles.css").exists());
    }

    #[tokio::test]
    async fn missing_dirs_are_fine() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("build");
        fs::create_dir_all(build.join("js")).unwrap();

        let removed = clean_dirs(&[build.as_path(), dir.path().join("tmp").as_path()]).await.unwrap();
        assert_eq!(removed, vec![build.clone()]);
        assert!(!build.exists());
    }
}
