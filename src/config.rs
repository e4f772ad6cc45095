//! 应用配置模块
//!
//! 每个监视目录下有一个 `config.yaml`（接口地址和凭证），
//! 可执行文件旁边可选放置 `central_config.yaml`（目录列表和日志设置）。

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// 目录配置文件名
pub const DIRECTORY_CONFIG_FILE: &str = "config.yaml";
/// 中央配置文件名
pub const CENTRAL_CONFIG_FILE: &str = "central_config.yaml";

/// 上传目录环境变量前缀（DIR_1, DIR_2, ...）
pub const UPLOAD_DIR_ENV_PREFIX: &str = "DIR_";
/// 付款指令目录环境变量前缀（PAYMENT_ORDER_DIR_1, ...）
pub const PAYMENT_ORDER_DIR_ENV_PREFIX: &str = "PAYMENT_ORDER_DIR_";

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|source| SyncError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| SyncError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// 目录配置：远程接口地址和 Basic 认证凭证
#[derive(Clone, Deserialize)]
pub struct DirectoryConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl DirectoryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_yaml(path)
    }

    /// 读取目录自带的 config.yaml
    pub fn load_for_dir(dir: &Path) -> Result<Self> {
        Self::load(&dir.join(DIRECTORY_CONFIG_FILE))
    }
}

/// 中央配置
#[derive(Debug, Clone, Deserialize)]
pub struct CentralConfig {
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub payment_order_directories: Vec<PathBuf>,
    #[serde(default)]
    pub log_to_file: bool,
    /// 日志文件路径（相对路径以工作目录为准）
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志文件轮转阈值（MB），0 表示只追加不轮转
    #[serde(default)]
    pub log_max_size_mb: u32,
    /// HTTP 请求超时（秒），不设置则不限时
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("app.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            payment_order_directories: Vec::new(),
            log_to_file: false,
            log_file: default_log_file(),
            log_level: default_log_level(),
            log_max_size_mb: 0,
            request_timeout_secs: None,
        }
    }
}

impl CentralConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_yaml(path)
    }
}

/// 中央配置文件路径：与可执行文件同目录
pub fn central_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CENTRAL_CONFIG_FILE)))
        .unwrap_or_else(|| PathBuf::from(CENTRAL_CONFIG_FILE))
}

/// 目录列表来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    Central,
    Environment,
}

/// 启动时解析出的目录列表，进程生命周期内不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySet {
    pub upload: Vec<PathBuf>,
    pub payment_orders: Vec<PathBuf>,
    pub source: DirectorySource,
}

/// 解析目录列表：中央配置可用时以其为准（即使列表为空），否则读取环境变量
pub fn resolve_directories<F>(central: Option<&CentralConfig>, lookup: F) -> DirectorySet
where
    F: Fn(&str) -> Option<String>,
{
    match central {
        Some(config) => DirectorySet {
            upload: config.directories.clone(),
            payment_orders: config.payment_order_directories.clone(),
            source: DirectorySource::Central,
        },
        None => DirectorySet {
            upload: env_directories(UPLOAD_DIR_ENV_PREFIX, &lookup),
            payment_orders: env_directories(PAYMENT_ORDER_DIR_ENV_PREFIX, &lookup),
            source: DirectorySource::Environment,
        },
    }
}

/// 按 PREFIX1, PREFIX2, ... 顺序读取，遇到第一个未设置或为空的序号即停止
pub fn env_directories<F>(prefix: &str, lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    (1..)
        .map(|i| lookup(&format!("{}{}", prefix, i)))
        .take_while(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
        .flatten()
        .map(PathBuf::from)
        .collect()
}
