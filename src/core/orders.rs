//! 付款指令同步 - 查询待处理的付款指令并逐个下载

use crate::error::{Result, SyncError};
use crate::remote::{AccountingApi, ByteStream, Download, OrderQuery};
use chrono::{DateTime, Local};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// 下载文件存放的子目录
pub const ORDER_SUBDIR: &str = "kpc";
/// 下载文件扩展名
pub const ORDER_EXTENSION: &str = "kpc";
/// 文件名时间戳格式（精确到秒）
pub const ORDER_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// 单个目录的下载结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderReport {
    pub orders_found: u32,
    pub downloaded: u32,
    /// 下载返回非 200 的指令
    pub skipped: u32,
    /// 查询本身返回了非 200
    pub query_status: Option<u16>,
}

/// 下载文件名：时间戳-指令ID.kpc
pub fn order_file_name(timestamp: &DateTime<Local>, id: &str) -> String {
    let id = id.replace(['/', '\\'], "_");
    format!(
        "{}-{}.{}",
        timestamp.format(ORDER_TIMESTAMP_FORMAT),
        id,
        ORDER_EXTENSION
    )
}

/// 付款指令同步器
#[derive(Debug, Default)]
pub struct PaymentOrderSync;

impl PaymentOrderSync {
    pub fn new() -> Self {
        Self
    }

    /// 付款指令输出目录
    pub fn output_dir(directory: &Path) -> PathBuf {
        directory.join(ORDER_SUBDIR)
    }

    /// 查询并下载所有待处理付款指令
    ///
    /// 网络错误中止整个调用；单个指令返回非 200 时跳过该指令。
    pub async fn sync(&self, directory: &Path, api: &dyn AccountingApi) -> Result<OrderReport> {
        let mut report = OrderReport::default();

        let orders = match api.query_pending_orders().await? {
            OrderQuery::Orders(orders) => orders,
            OrderQuery::Status(status) => {
                warn!(
                    status,
                    "查询付款指令失败: {}, 状态码: {}",
                    api.name(),
                    status
                );
                report.query_status = Some(status);
                return Ok(report);
            }
        };

        if orders.is_empty() {
            info!("目录 {} 没有需要下载的付款指令", directory.display());
            return Ok(report);
        }

        report.orders_found = orders.len() as u32;
        let output_dir = Self::output_dir(directory);

        for order in orders {
            let stream = match api.download_order(&order.id).await? {
                Download::Body(stream) => stream,
                Download::Status(status) => {
                    warn!(
                        order_id = %order.id,
                        status,
                        "下载付款指令失败: {}, 状态码: {}",
                        order.id,
                        status
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            fs::create_dir_all(&output_dir)
                .await
                .map_err(|e| SyncError::io(&output_dir, e))?;

            let target = output_dir.join(order_file_name(&Local::now(), &order.id));
            let bytes = save_stream(&target, stream).await?;

            info!(
                order_id = %order.id,
                "已下载付款指令 {} 到 {} ({} 字节)",
                order.id,
                target.display(),
                bytes
            );
            report.downloaded += 1;
        }

        Ok(report)
    }
}

/// 把响应体写入临时文件，完成后重命名为目标文件
async fn save_stream(target: &Path, stream: ByteStream) -> Result<u64> {
    let temp_path = target.with_extension("tmp");

    match write_stream(&temp_path, stream).await {
        Ok(bytes) => {
            fs::rename(&temp_path, target)
                .await
                .map_err(|e| SyncError::io(target, e))?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

async fn write_stream(path: &Path, mut stream: ByteStream) -> Result<u64> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;

    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| SyncError::io(path, e))?;
    Ok(written)
}
