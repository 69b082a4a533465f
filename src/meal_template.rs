use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PortalError, Result};
use crate::submission::MealType;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Blank meal-plan templates. A template missing from the templates
/// directory is downloaded once from its URL and cached there.
pub struct TemplateFetcher {
    dir: PathBuf,
    url_a: String,
    url_b: String,
    client: Client,
}

impl TemplateFetcher {
    pub fn new(dir: impl Into<PathBuf>, url_a: &str, url_b: &str) -> Result<Self> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        Ok(TemplateFetcher {
            dir: dir.into(),
            url_a: url_a.to_string(),
            url_b: url_b.to_string(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        TemplateFetcher::new(&config.template_dir, &config.template_a_url, &config.template_b_url)
    }

    pub fn local_path(&self, meal_type: MealType) -> PathBuf {
        self.dir.join(meal_type.template_file_name())
    }

    fn url(&self, meal_type: MealType) -> &str {
        match meal_type {
            MealType::A => &self.url_a,
            MealType::B => &self.url_b,
        }
    }

    /// Template bytes, downloading and caching on first use. One attempt,
    /// no retry.
    pub async fn fetch(&self, meal_type: MealType) -> Result<Vec<u8>> {
        let path = self.local_path(meal_type);
        match tokio::fs::read(&path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let url = self.url(meal_type);
        if url.is_empty() {
            return Err(PortalError::Template(format!(
                "'{}' 파일을 {} 폴더에 넣어주세요.",
                meal_type.template_file_name(),
                self.dir.display()
            )));
        }

        info!("Downloading {meal_type} template from {url}");
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.download_failed(meal_type, &e))?
            .bytes()
            .await
            .map_err(|e| self.download_failed(meal_type, &e))?;

        if let Err(e) = self.cache(&path, &bytes).await {
            warn!("Could not cache template at {}: {e}", path.display());
        }
        Ok(bytes.to_vec())
    }

    async fn cache(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, bytes).await
    }

    fn download_failed(&self, meal_type: MealType, error: &reqwest::Error) -> PortalError {
        warn!("Template download failed: {error}");
        PortalError::Template(format!(
            "템플릿 다운로드 실패: {error}. '{}' 파일을 {} 폴더에 직접 넣어주세요.",
            meal_type.template_file_name(),
            self.dir.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_template_is_served() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("식단표 B.xlsx"), b"template-b").unwrap();
        let fetcher = TemplateFetcher::new(dir.path(), "", "").unwrap();
        assert_eq!(fetcher.fetch(MealType::B).await.unwrap(), b"template-b");
    }

    #[tokio::test]
    async fn missing_template_without_url_asks_for_manual_placement() {
        let dir = tempdir().unwrap();
        let fetcher = TemplateFetcher::new(dir.path(), "", "").unwrap();
        let err = fetcher.fetch(MealType::A).await.unwrap_err();
        assert!(matches!(err, PortalError::Template(ref m) if m.contains("식단표 A.xlsx")));
    }

    #[tokio::test]
    async fn failed_download_is_a_template_error() {
        let dir = tempdir().unwrap();
        let fetcher =
            TemplateFetcher::new(dir.path(), "http://127.0.0.1:1/a.xlsx", "").unwrap();
        assert!(matches!(
            fetcher.fetch(MealType::A).await,
            Err(PortalError::Template(_))
        ));
        assert!(!fetcher.local_path(MealType::A).exists());
    }
}
