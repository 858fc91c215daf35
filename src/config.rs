//! Configuration types for API access and download operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interchangeable domains serving the same MovieBox API.
pub const MIRROR_HOSTS: [&str; 6] = [
    "moviebox.ng",
    "h5.aoneroom.com",
    "movieboxapp.in",
    "moviebox.pk",
    "moviebox.ph",
    "moviebox.id",
];

/// Environment variable overriding the selected host.
pub const HOST_ENV_VAR: &str = "MOVIEBOX_API_HOST";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:137.0) Gecko/20100101 Firefox/137.0";

/// Settings for talking to the MovieBox API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name, without protocol.
    pub host: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Timezone reported in the `X-Client-Info` header.
    pub timezone: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: MIRROR_HOSTS[0].to_string(),
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timezone: "Africa/Nairobi".to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host name.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the request timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Replaces the host with `MOVIEBOX_API_HOST` when that is set.
    #[must_use]
    pub fn with_env_override(self) -> Self {
        match std::env::var(HOST_ENV_VAR) {
            Ok(host) if !host.trim().is_empty() => self.with_host(host.trim()),
            _ => self,
        }
    }

    /// Host URL with protocol and trailing slash.
    #[must_use]
    pub fn host_url(&self) -> String {
        format!("https://{}/", self.host)
    }

    /// Makes an absolute URL out of a path relative to the host.
    /// Absolute URLs are returned unchanged.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("https://{}/{}", self.host, path.trim_start_matches('/'))
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for download operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Bytes written per chunk for media files.
    pub media_chunk_size: usize,
    /// Bytes written per chunk for caption files.
    pub caption_chunk_size: usize,
    /// Whether to resume partially downloaded files.
    pub resume: bool,
    /// Whether to report progress while downloading.
    pub show_progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            media_chunk_size: 512_000,
            caption_chunk_size: 16_000,
            resume: false,
            show_progress: true,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the media chunk size in bytes.
    #[must_use]
    pub const fn with_media_chunk_size(mut self, bytes: usize) -> Self {
        self.media_chunk_size = bytes;
        self
    }

    /// Sets the caption chunk size in bytes.
    #[must_use]
    pub const fn with_caption_chunk_size(mut self, bytes: usize) -> Self {
        self.caption_chunk_size = bytes;
        self
    }

    /// Sets whether to resume partial downloads.
    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Sets whether to report progress.
    #[must_use]
    pub const fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// Path configuration for downloads and the config file.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Directory where downloaded files are saved.
    pub download_dir: PathBuf,
    /// Directory where the configuration file is read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            download_dir: PathBuf::from("."),
            config_dir: config_dir.join("moviebox-dl"),
        }
    }
}

impl PathConfig {
    /// Location of `config.toml`.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// The on-disk layout of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    client: ClientConfig,
    download: DownloadConfig,
    download_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// API client configuration.
    pub client: ClientConfig,
    /// Download configuration.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `config.toml` from the default config directory when present,
    /// then applies the `MOVIEBOX_API_HOST` override.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        let paths = PathConfig::default();
        Self::load_from(&paths.config_file(), paths)
    }

    /// Same as [`load`](Self::load) with an explicit file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(file: &Path, mut paths: PathConfig) -> crate::Result<Self> {
        let parsed = if file.is_file() {
            log::debug!("Reading configuration from {}", file.display());
            toml::from_str::<ConfigFile>(&std::fs::read_to_string(file)?)?
        } else {
            ConfigFile::default()
        };

        if let Some(dir) = parsed.download_dir {
            paths.download_dir = dir;
        }

        Ok(Self {
            client: parsed.client.with_env_override(),
            download: parsed.download,
            paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "moviebox.ng");
        assert_eq!(config.host_url(), "https://moviebox.ng/");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn absolute_url_joins_paths() {
        let config = ClientConfig::new().with_host("moviebox.pk");
        assert_eq!(
            config.absolute_url("/wefeed-h5-bff/web/home"),
            "https://moviebox.pk/wefeed-h5-bff/web/home"
        );
        assert_eq!(config.absolute_url("detail/x"), "https://moviebox.pk/detail/x");
        assert_eq!(
            config.absolute_url("https://other.host/a"),
            "https://other.host/a"
        );
    }

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.media_chunk_size, 512_000);
        assert_eq!(config.caption_chunk_size, 16_000);
        assert!(!config.resume);
        assert!(config.show_progress);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_media_chunk_size(1024)
            .with_caption_chunk_size(64)
            .with_resume(true)
            .with_show_progress(false);

        assert_eq!(config.media_chunk_size, 1024);
        assert_eq!(config.caption_chunk_size, 64);
        assert!(config.resume);
        assert!(!config.show_progress);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = PathConfig {
            download_dir: PathBuf::from("."),
            config_dir: dir.path().to_path_buf(),
        };
        let config = AppConfig::load_from(&paths.config_file(), paths).unwrap();
        assert_eq!(config.download, DownloadConfig::default());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "download_dir = \"/tmp/movies\"\n\n[download]\nmedia_chunk_size = 1000\nresume = true\n\n[client]\ntimeout_secs = 5\n",
        )
        .unwrap();
        let paths = PathConfig {
            download_dir: PathBuf::from("."),
            config_dir: dir.path().to_path_buf(),
        };
        let config = AppConfig::load_from(&file, paths).unwrap();
        assert_eq!(config.download.media_chunk_size, 1000);
        assert_eq!(config.download.caption_chunk_size, 16_000);
        assert!(config.download.resume);
        assert_eq!(config.client.timeout_secs, 5);
        assert_eq!(config.paths.download_dir, PathBuf::from("/tmp/movies"));
    }

    #[test]
    fn load_from_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[download\nresume = ").unwrap();
        let result = AppConfig::load_from(&file, PathConfig::default());
        assert!(matches!(result, Err(crate::Error::Toml(_))));
    }
}
