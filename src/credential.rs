//! 凭据提供者
//!
//! 每次拦截调用时读取凭据；未配置或存储损坏时返回空凭据（静默降级）。
//! 写入仅接受 `lsv2_` 前缀的非空值，被拒绝的候选值不会覆盖已有凭据。

use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::common::mask_secret;

/// 凭据必须以此前缀开头
pub const CREDENTIAL_PREFIX: &str = "lsv2_";

/// API 凭据
///
/// `Debug` 只输出脱敏形式，避免完整密钥进入日志
#[derive(Clone, Default)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 候选值是否满足格式要求
    pub fn is_valid_format(candidate: &str) -> bool {
        !candidate.is_empty() && candidate.starts_with(CREDENTIAL_PREFIX)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// 脱敏显示，例如 `lsv2_****abcd`
    pub fn masked(&self) -> String {
        mask_secret(&self.0, CREDENTIAL_PREFIX)
    }

    /// SHA-256 指纹前 8 字节，用于日志关联
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// 凭据来源
pub trait CredentialProvider: Send + Sync {
    /// 当前凭据；未配置或读取失败时返回空凭据，从不报错
    fn get(&self) -> Credential;

    /// 校验并持久化候选凭据，成功返回 true；失败时保持原状态
    fn set(&self, candidate: &str) -> bool;

    /// 凭据是否固定、不接受 `set`
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 保存候选凭据，失败时给出可展示给用户的原因
pub fn store_credential(provider: &dyn CredentialProvider, candidate: &str) -> anyhow::Result<()> {
    if provider.is_read_only() {
        anyhow::bail!("凭据为只读：config.json 中的 apiKey 已固定凭据，请修改配置文件");
    }
    if !Credential::is_valid_format(candidate) {
        anyhow::bail!("凭据格式无效（需要 {} 前缀）", CREDENTIAL_PREFIX);
    }
    if !provider.set(candidate) {
        anyhow::bail!("凭据保存失败，详见日志");
    }
    Ok(())
}

/// 静态凭据（来自配置文件），不可修改
pub struct StaticCredential {
    credential: Credential,
}

impl StaticCredential {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() && !Credential::is_valid_format(&value) {
            tracing::warn!("静态凭据格式无效（需要 {} 前缀），追踪已禁用", CREDENTIAL_PREFIX);
            return Self {
                credential: Credential::empty(),
            };
        }
        Self {
            credential: Credential::new(value),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn get(&self) -> Credential {
        self.credential.clone()
    }

    fn set(&self, _candidate: &str) -> bool {
        tracing::warn!("静态凭据不支持运行时修改");
        false
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

/// 进程内凭据存储
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialProvider for MemoryCredentialStore {
    fn get(&self) -> Credential {
        self.credential.read().clone()
    }

    fn set(&self, candidate: &str) -> bool {
        if !Credential::is_valid_format(candidate) {
            return false;
        }
        *self.credential.write() = Credential::new(candidate);
        true
    }
}

/// 凭据文件中的 JSON 结构
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    #[serde(default)]
    api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

/// 基于 JSON 文件的凭据存储
///
/// 每次 `get` 都从磁盘读取，外部修改文件后立即生效
pub struct FileCredentialStore {
    path: PathBuf,
    /// 串行化本进程内的写入
    write_lock: parking_lot::Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: parking_lot::Mutex::new(()),
        }
    }

    fn read(&self) -> anyhow::Result<Option<StoredCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let stored: StoredCredential = serde_json::from_str(&content)?;
        Ok(Some(stored))
    }

    /// 先写临时文件再 rename，避免写入中断留下半截文件
    fn write(&self, value: &str) -> anyhow::Result<()> {
        let stored = StoredCredential {
            api_key: value.to_string(),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialProvider for FileCredentialStore {
    fn get(&self) -> Credential {
        match self.read() {
            Ok(Some(stored)) => Credential::new(stored.api_key),
            Ok(None) => Credential::empty(),
            Err(e) => {
                tracing::warn!("读取凭据文件失败，按未配置处理: {} ({})", e, self.path.display());
                Credential::empty()
            }
        }
    }

    fn set(&self, candidate: &str) -> bool {
        if !Credential::is_valid_format(candidate) {
            return false;
        }
        let _guard = self.write_lock.lock();
        match self.write(candidate) {
            Ok(()) => {
                tracing::info!("凭据已保存: {}", Credential::new(candidate).masked());
                true
            }
            Err(e) => {
                tracing::warn!("保存凭据失败: {} ({})", e, self.path.display());
                false
            }
        }
    }
}
