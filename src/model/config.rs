use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsBackend {
    #[default]
    Rustls,
    NativeTls,
}

/// smith-tap 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 上游聊天后端地址（转发服务器的目标）
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Trace 收集端地址
    #[serde(default = "default_collector_url")]
    pub collector_url: String,

    /// 需要追踪的路由片段，目标 URL 包含该片段即视为 chat-completion 调用
    #[serde(default = "default_route_fragment")]
    pub route_fragment: String,

    /// 消息内容截断长度（字符数）
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// 静态凭据（可选）。配置后优先于凭据存储文件
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// 凭据存储文件路径
    #[serde(default = "default_credential_store_path")]
    pub credential_store_path: String,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    #[serde(default)]
    pub tls_backend: TlsBackend,

    /// 上游调用超时（秒）
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// 收集端请求超时（秒）
    #[serde(default = "default_collector_timeout_secs")]
    pub collector_timeout_secs: u64,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_upstream_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_collector_url() -> String {
    "https://api.smith.langchain.com/runs".to_string()
}

fn default_route_fragment() -> String {
    "/chat/completions".to_string()
}

fn default_max_content_length() -> usize {
    crate::trace::MAX_CONTENT_LENGTH
}

fn default_credential_store_path() -> String {
    "credentials.json".to_string()
}

fn default_call_timeout_secs() -> u64 {
    300
}

fn default_collector_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_base_url: default_upstream_base_url(),
            collector_url: default_collector_url(),
            route_fragment: default_route_fragment(),
            max_content_length: default_max_content_length(),
            api_key: None,
            credential_store_path: default_credential_store_path(),
            proxy_url: None,
            tls_backend: TlsBackend::default(),
            call_timeout_secs: default_call_timeout_secs(),
            collector_timeout_secs: default_collector_timeout_secs(),
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 凭据存储文件路径，相对路径以配置文件所在目录为基准
    pub fn resolved_credential_store_path(&self) -> PathBuf {
        let path = Path::new(&self.credential_store_path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// 将当前配置写回原始配置文件
    pub fn save(&self) -> anyhow::Result<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("配置文件路径未知，无法保存配置"))?;

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}
