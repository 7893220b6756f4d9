use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Writes the files produced by the image export and page rendering use cases.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_image(&self, file_name: &str, body: &[u8]) -> anyhow::Result<PathBuf>;
    async fn put_page(&self, file_name: &str, html: &str) -> anyhow::Result<PathBuf>;

    /// Path of an image file as seen from a page in the pages directory.
    fn image_href(&self, file_name: &str) -> String;
}

#[derive(Clone, Debug)]
pub struct LocalArtifacts {
    images_dir: PathBuf,
    pages_dir: PathBuf,
}

impl LocalArtifacts {
    pub fn new(images_dir: impl Into<PathBuf>, pages_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            pages_dir: pages_dir.into(),
        }
    }

    async fn write(dir: &Path, file_name: &str, body: &[u8]) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create dir {}", dir.display()))?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifacts {
    async fn put_image(&self, file_name: &str, body: &[u8]) -> anyhow::Result<PathBuf> {
        Self::write(&self.images_dir, file_name, body).await
    }

    async fn put_page(&self, file_name: &str, html: &str) -> anyhow::Result<PathBuf> {
        Self::write(&self.pages_dir, file_name, html.as_bytes()).await
    }

    fn image_href(&self, file_name: &str) -> String {
        let dir = self
            .images_dir
            .file_name()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|| "images".into());
        format!("../{}/{}", dir, file_name)
    }
}

/// File-system safe stem for an email. `@` and anything outside
/// `[A-Za-z0-9._-]` become `_`, leading dots are stripped.
pub fn file_stem_for(email: &str) -> String {
    let stem: String = email
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "_".into()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_replaces_at_and_separators() {
        assert_eq!(file_stem_for("a@x.com"), "a_x.com");
        assert_eq!(file_stem_for("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(file_stem_for("..."), "_");
    }

    #[tokio::test]
    async fn local_artifacts_write_into_their_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifacts::new(tmp.path().join("images"), tmp.path().join("html_pages"));

        let img = store.put_image("a_x.com.png", &[1, 2, 3]).await.unwrap();
        assert_eq!(tokio::fs::read(&img).await.unwrap(), vec![1, 2, 3]);
        assert!(img.starts_with(tmp.path().join("images")));

        let page = store.put_page("a_x.com.html", "<html></html>").await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&page).await.unwrap(),
            "<html></html>"
        );
    }

    #[test]
    fn image_href_is_relative_to_pages_dir() {
        let store = LocalArtifacts::new("/srv/data/images", "/srv/data/html_pages");
        assert_eq!(store.image_href("a.png"), "../images/a.png");
    }
}
