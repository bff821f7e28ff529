use anyhow::{bail, Context, Result};
use common::Quality;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use stream_core::{BroadcastSettings, ViewerSettings, DEFAULT_TOPIC};
use tracing::info;

/// 节点配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub media: MediaConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 节点发现用的网络标识
    pub discovery_key: String,
    /// 推流主题
    pub topic: String,
    pub max_peers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_key: "meshlink-church".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            max_peers: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate_kbps: u32,
    /// 形如 "1280x720"
    pub resolution: String,
    pub frame_rate: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            bitrate_kbps: 2000,
            resolution: "1280x720".to_string(),
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// relay 队列容量
    pub relay_capacity: usize,
    /// 每个浏览器连接的缓冲
    pub consumer_buffer: usize,
    /// 每隔多少个发布帧推送一次给浏览器
    pub frame_stride: u64,
    /// 是否生成 SVG 预览
    pub preview: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            relay_capacity: 64,
            consumer_buffer: 16,
            frame_stride: 6,
            preview: true,
        }
    }
}

impl Config {
    /// 加载配置：文件（可选）→ 环境变量覆盖 → 校验
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path).await?,
            Some(path) => {
                info!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        EnvConfigOverride::apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.topic.trim().is_empty() {
            bail!("Network topic cannot be empty");
        }
        if self.media.frame_rate == 0 {
            bail!("Frame rate must be greater than 0");
        }
        if self.media.bitrate_kbps == 0 {
            bail!("Bitrate must be greater than 0");
        }
        if self.web.port == 0 {
            bail!("Web port must be greater than 0");
        }
        if self.web.relay_capacity == 0 {
            bail!("Relay capacity must be greater than 0");
        }
        if self.web.consumer_buffer == 0 {
            bail!("Consumer buffer must be greater than 0");
        }
        if self.web.frame_stride == 0 {
            bail!("Frame stride must be greater than 0");
        }
        Ok(())
    }

    /// 由分辨率推导画质档位
    pub fn quality(&self) -> Quality {
        Quality::from_resolution(&self.media.resolution)
    }

    pub fn broadcast_settings(&self, quality: Quality) -> BroadcastSettings {
        BroadcastSettings::new(self.network.topic.clone())
            .with_quality(quality)
            .with_frame_rate(self.media.frame_rate)
    }

    pub fn viewer_settings(&self) -> ViewerSettings {
        ViewerSettings::new(self.network.topic.clone())
    }

    pub fn web_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.web.host, self.web.port)
            .parse()
            .with_context(|| format!("Invalid web address {}:{}", self.web.host, self.web.port))
    }
}

/// 环境变量覆盖
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut Config) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// 从任意键值来源应用覆盖，无法解析的值被忽略
    pub fn apply_from<F>(config: &mut Config, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("MESHLINK_WEB_PORT").and_then(|v| v.parse::<u16>().ok()) {
            config.web.port = port;
        }
        if let Some(topic) = lookup("MESHLINK_TOPIC") {
            config.network.topic = topic;
        }
        if let Some(resolution) = lookup("MESHLINK_RESOLUTION") {
            config.media.resolution = resolution;
        }
        if let Some(fps) = lookup("MESHLINK_FRAME_RATE").and_then(|v| v.parse::<u32>().ok()) {
            config.media.frame_rate = fps;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.discovery_key, "meshlink-church");
        assert_eq!(config.network.topic, "meshlink/church/stream");
        assert_eq!(config.network.max_peers, 50);
        assert_eq!(config.media.bitrate_kbps, 2000);
        assert_eq!(config.media.frame_rate, 30);
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.quality(), Quality::Hd720);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[network]
topic = "meshlink/chapel/stream"

[media]
resolution = "1920x1080"
frame_rate = 25

[web]
port = 9090
preview = false
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).await.unwrap();
        assert_eq!(config.network.topic, "meshlink/chapel/stream");
        assert_eq!(config.network.discovery_key, "meshlink-church");
        assert_eq!(config.media.frame_rate, 25);
        assert_eq!(config.media.video_codec, "h264");
        assert_eq!(config.web.port, 9090);
        assert!(!config.web.preview);
        assert_eq!(config.web.relay_capacity, 64);
        assert_eq!(config.quality(), Quality::FullHd1080);

        let settings = config.broadcast_settings(config.quality());
        assert_eq!(settings.topic, "meshlink/chapel/stream");
        assert_eq!(settings.frame_rate, 25);
        assert_eq!(settings.quality, Quality::FullHd1080);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = Config::load(Some(path.as_path())).await.unwrap();
        assert_eq!(config.web.relay_capacity, 64);
    }

    #[tokio::test]
    async fn test_invalid_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[web]\nport = \"not a number\"").unwrap();

        assert!(Config::from_file(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[media]\nframe_rate = 0").unwrap();
        let config = Config::from_file(file.path()).await.unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.web.frame_stride = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.topic = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.web.consumer_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MESHLINK_WEB_PORT", "9000"),
            ("MESHLINK_TOPIC", "meshlink/hall/stream"),
            ("MESHLINK_RESOLUTION", "854x480"),
            ("MESHLINK_FRAME_RATE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        EnvConfigOverride::apply_from(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.network.topic, "meshlink/hall/stream");
        assert_eq!(config.quality(), Quality::Sd480);
        assert_eq!(config.media.frame_rate, 30);
    }

    #[test]
    fn test_web_addr() {
        let config = Config::default();
        assert_eq!(config.web_addr().unwrap().port(), 8080);

        let mut config = Config::default();
        config.web.host = "not an ip".to_string();
        assert!(config.web_addr().is_err());
    }
}
