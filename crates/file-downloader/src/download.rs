use anyhow::bail;
use reqwest;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::info;

pub struct FileDownloadConfig {
    /// Hugging Face compatible endpoint, e.g. `https://huggingface.co`.
    pub endpoint: String,
    pub revision: String,
    pub models_dir: PathBuf,
}

pub struct FileDownload {
    endpoint: String,
    revision: String,
    models_dir: PathBuf,
}

impl Default for FileDownloadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            models_dir: PathBuf::from("models"),
        }
    }
}

impl FileDownload {
    pub fn new(config: FileDownloadConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            revision: config.revision,
            models_dir: config.models_dir,
        }
    }

    /// Local directory for a repository: the last segment of its id under
    /// `models_dir`.
    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        let name = repo_id.rsplit('/').next().unwrap_or(repo_id);
        self.models_dir.join(name)
    }

    pub fn file_url(&self, repo_id: &str, file_name: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint, repo_id, self.revision, file_name
        )
    }

    pub async fn download_to_path_if_not_exists(
        &self,
        url: &str,
        file_path: impl AsRef<Path>,
    ) -> anyhow::Result<PathBuf> {
        let file_path = file_path.as_ref().to_path_buf();
        info!("check file path: {:?}", file_path);
        if file_path.exists() {
            return Ok(file_path);
        }

        let temp_download_path = file_path.with_extension("temp");

        info!("downloading {}", url);
        let mut response = reqwest::get(url).await?;
        if !response.status().is_success() {
            bail!("failed to download {}: {}", url, response.status());
        }

        // create parent folder
        if let Some(parent_dir) = file_path.parent() {
            fs::create_dir_all(parent_dir).await?;
        }

        let mut file = File::create(&temp_download_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        fs::rename(&temp_download_path, &file_path).await?;

        info!("file {:?} downloaded", file_path);

        Ok(file_path)
    }

    /// Makes sure `file_name` of `repo_id` is present locally and returns its
    /// path. Files already on disk are never fetched again.
    pub async fn download_if_not_exists(
        &self,
        repo_id: &str,
        file_name: &str,
    ) -> anyhow::Result<PathBuf> {
        let file_path = self.repo_dir(repo_id).join(file_name);
        let url = self.file_url(repo_id, file_name);
        self.download_to_path_if_not_exists(&url, file_path).await
    }
}
