use super::{
    AccountingApi, ClientOptions, Download, OrderQuery, PaymentOrder, UploadOutcome, UploadResult,
};
use crate::config::DirectoryConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// 待处理付款指令查询路径（状态：已创建）
pub const PENDING_ORDERS_PATH: &str =
    "prikaz-k-uhrade/(stavPrikazK='elPrikazStav.vytvoren').json";
/// 付款指令资源路径
pub const ORDER_PATH: &str = "prikaz-k-uhrade";
/// 付款指令下载路径及参数
pub const ORDER_DOWNLOAD_PATH: &str = "stazeni?dat-splat-z-hlavicky=true";

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    winstrom: OrderList,
}

#[derive(Debug, Deserialize)]
struct OrderList {
    #[serde(rename = "prikaz-k-uhrade", default)]
    orders: Vec<PaymentOrder>,
}

/// AbraFlexi REST 客户端
pub struct FlexiClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl FlexiClient {
    pub fn new(config: &DirectoryConfig, options: &ClientOptions) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    fn pending_orders_url(&self) -> String {
        format!("{}/{}", self.base_url, PENDING_ORDERS_PATH)
    }

    fn download_url(&self, id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            ORDER_PATH,
            urlencoding::encode(id),
            ORDER_DOWNLOAD_PATH
        )
    }
}

#[async_trait]
impl AccountingApi for FlexiClient {
    async fn upload_file(&self, data: Vec<u8>) -> Result<UploadOutcome> {
        debug!("POST {} ({} 字节)", self.base_url, data.len());

        let response = self
            .authorized(self.client.post(&self.base_url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(UploadOutcome::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let result: UploadResult = quick_xml::de::from_str(&body)
            .map_err(|e| SyncError::Protocol(format!("上传响应不是有效的 XML: {}", e)))?;

        Ok(UploadOutcome::Completed(result))
    }

    async fn query_pending_orders(&self) -> Result<OrderQuery> {
        let url = self.pending_orders_url();
        debug!("GET {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(OrderQuery::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let envelope: OrderEnvelope = serde_json::from_slice(&body)
            .map_err(|e| SyncError::Protocol(format!("付款指令列表不是有效的 JSON: {}", e)))?;

        Ok(OrderQuery::Orders(envelope.winstrom.orders))
    }

    async fn download_order(&self, id: &str) -> Result<Download> {
        let url = self.download_url(id);
        debug!("GET {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(Download::Status(status.as_u16()));
        }

        let stream = response.bytes_stream().map_err(SyncError::from);
        Ok(Download::Body(Box::pin(stream)))
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
