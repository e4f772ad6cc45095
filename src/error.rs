//! 错误类型
//!
//! 配置错误只影响单个目录；网络、协议和本地文件错误会中止当前目录的处理。
//! 业务失败（非 200 状态、success=false）不是错误，由各组件记录日志后跳过。

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// 配置文件不存在或无法读取
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 配置文件格式错误
    #[error("无法解析配置文件 {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// 网络请求失败（连接、超时、读取响应体）
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 服务端返回 200 但响应体无法解析
    #[error("响应解析失败: {0}")]
    Protocol(String),

    /// 本地文件读写或重命名失败
    #[error("文件操作失败 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 目录遍历失败
    #[error("目录遍历失败: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
