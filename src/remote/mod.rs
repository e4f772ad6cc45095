pub mod flexi;

use crate::config::DirectoryConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Deserializer};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub use flexi::FlexiClient;

/// 下载响应体
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// 上传统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadStats {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// 上传响应（XML），根元素名不限
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadResult {
    pub success: bool,
    pub stats: UploadStats,
}

/// 单个文件的上传结果
#[derive(Debug)]
pub enum UploadOutcome {
    /// HTTP 200，响应体已解析
    Completed(UploadResult),
    /// 非 200 状态，响应体未读取
    Status(u16),
}

/// 待处理付款指令
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentOrder {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "lastUpdate", default)]
    pub last_update: Option<String>,
    /// 到期日
    #[serde(rename = "datSplat", default)]
    pub due_date: Option<String>,
    #[serde(rename = "mena", default)]
    pub currency: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// 查询待处理付款指令的结果
#[derive(Debug)]
pub enum OrderQuery {
    Orders(Vec<PaymentOrder>),
    Status(u16),
}

/// 下载单个付款指令的结果
pub enum Download {
    Body(ByteStream),
    Status(u16),
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Download::Body(_) => write!(f, "Body(..)"),
            Download::Status(code) => write!(f, "Status({})", code),
        }
    }
}

/// HTTP 客户端选项
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// 请求超时，None 表示不限时
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn with_timeout_secs(secs: Option<u64>) -> Self {
        Self {
            timeout: secs.map(Duration::from_secs),
        }
    }
}

/// 会计系统接口
#[async_trait]
pub trait AccountingApi: Send + Sync {
    /// 上传文件原始内容
    async fn upload_file(&self, data: Vec<u8>) -> Result<UploadOutcome>;

    /// 查询状态为"已创建"的付款指令
    async fn query_pending_orders(&self) -> Result<OrderQuery>;

    /// 下载单个付款指令文件
    async fn download_order(&self, id: &str) -> Result<Download>;

    /// 接口名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据目录配置创建客户端
pub fn create_client(
    config: &DirectoryConfig,
    options: &ClientOptions,
) -> Result<Arc<dyn AccountingApi>> {
    tracing::debug!("创建接口客户端: {}", config.url);
    Ok(Arc::new(FlexiClient::new(config, options)?) as Arc<dyn AccountingApi>)
}
