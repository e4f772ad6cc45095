use crate::error::{Result, SyncError};
use crate::remote::{AccountingApi, UploadOutcome};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 待上传文件扩展名（不区分大小写）
pub const UPLOAD_EXTENSION: &str = "gpc";
/// 上传成功后替换的扩展名
pub const PROCESSED_EXTENSION: &str = "nahrano";

/// 文件扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub upload_extension: String,
    pub processed_extension: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            upload_extension: UPLOAD_EXTENSION.to_string(),
            processed_extension: PROCESSED_EXTENSION.to_string(),
        }
    }
}

impl ScanConfig {
    /// 由文件名后缀推断文件状态，待上传后缀不区分大小写
    pub fn marker(&self, path: &Path) -> FileMarker {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return FileMarker::Other,
        };

        if has_suffix(name, &self.upload_extension, true) {
            FileMarker::Pending
        } else if has_suffix(name, &self.processed_extension, false) {
            FileMarker::Processed
        } else {
            FileMarker::Other
        }
    }
}

/// 文件名是否以 `.<ext>` 结尾
fn has_suffix(name: &str, ext: &str, ignore_case: bool) -> bool {
    let name = name.as_bytes();
    let suffix_len = ext.len() + 1;
    if name.len() < suffix_len {
        return false;
    }

    let (dot, tail) = name[name.len() - suffix_len..].split_at(1);
    if dot != b"." {
        return false;
    }
    if ignore_case {
        tail.eq_ignore_ascii_case(ext.as_bytes())
    } else {
        tail == ext.as_bytes()
    }
}

/// 文件在磁盘上的状态，由扩展名推断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMarker {
    Pending,
    Processed,
    Other,
}

/// 单个目录的扫描结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// 找到的待上传文件
    pub files_found: u32,
    /// 上传成功并已重命名
    pub uploaded: u32,
    /// 服务端返回 success=false
    pub rejected: u32,
    /// 服务端返回非 200 状态
    pub failed: u32,
}

impl ScanReport {
    /// 记录了警告的文件数
    pub fn warnings(&self) -> u32 {
        self.rejected + self.failed
    }
}

/// 文件扫描器
pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn marker(&self, path: &Path) -> FileMarker {
        self.config.marker(path)
    }

    /// 上传成功后的文件路径：去掉原扩展名，换成处理标记
    pub fn processed_path(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|name| has_suffix(name, &self.config.upload_extension, true))
            .map(|name| &name[..name.len() - self.config.upload_extension.len() - 1]);

        match stem {
            Some(stem) => path.with_file_name(format!("{}.{}", stem, self.config.processed_extension)),
            None => path.with_extension(&self.config.processed_extension),
        }
    }

    /// 递归收集待上传文件，遍历出错时整个目录放弃
    async fn collect_pending(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let root = directory.to_path_buf();
        let config = self.config.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries = tokio::task::spawn_blocking(move || {
            let mut pending = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if config.marker(entry.path()) == FileMarker::Pending {
                    pending.push(entry.into_path());
                }
            }
            Ok::<_, walkdir::Error>(pending)
        })
        .await
        .map_err(|e| SyncError::io(directory, std::io::Error::other(e)))??;

        Ok(entries)
    }

    /// 扫描目录并上传所有待处理文件
    ///
    /// 网络错误、响应解析错误和本地文件错误会中止整个目录；
    /// 非 200 状态和 success=false 只记录警告，文件保持原样。
    pub async fn scan(&self, directory: &Path, api: &dyn AccountingApi) -> Result<ScanReport> {
        let pending = self.collect_pending(directory).await?;
        debug!("目录 {} 中找到 {} 个待上传文件", directory.display(), pending.len());

        let mut report = ScanReport::default();

        for path in pending {
            report.files_found += 1;

            let data = fs::read(&path)
                .await
                .map_err(|e| SyncError::io(&path, e))?;

            match api.upload_file(data).await? {
                UploadOutcome::Status(status) => {
                    warn!(
                        path = %path.display(),
                        status,
                        "文件处理失败: {}, 状态码: {}",
                        path.display(),
                        status
                    );
                    report.failed += 1;
                }
                UploadOutcome::Completed(result) if !result.success => {
                    warn!(
                        path = %path.display(),
                        "文件处理失败: {}, success: false",
                        path.display()
                    );
                    report.rejected += 1;
                }
                UploadOutcome::Completed(result) => {
                    let target = self.processed_path(&path);
                    fs::rename(&path, &target)
                        .await
                        .map_err(|e| SyncError::io(&path, e))?;

                    let stats = &result.stats;
                    info!(path = %path.display(), "已上传到 {} 并重命名: {}", api.name(), path.display());
                    info!(
                        "统计 - 新建: {}, 更新: {}, 删除: {}, 跳过: {}, 失败: {}",
                        stats.created, stats.updated, stats.deleted, stats.skipped, stats.failed
                    );
                    report.uploaded += 1;
                }
            }
        }

        Ok(report)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
