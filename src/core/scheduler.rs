use crate::config::{DirectoryConfig, DirectorySet};
use crate::core::orders::PaymentOrderSync;
use crate::core::scanner::FileScanner;
use crate::remote::{create_client, ClientOptions};
use std::path::Path;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};

/// 定时处理间隔
pub const PASS_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// 一轮处理的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 处理完成的目录
    pub directories_processed: u32,
    /// 因配置加载失败被跳过的目录
    pub directories_skipped: u32,
    /// 处理过程中出错的目录
    pub directories_failed: u32,
    pub files_uploaded: u32,
    pub orders_downloaded: u32,
}

/// 调度器：启动后立即处理一轮，之后按固定间隔重复
pub struct Scheduler {
    directories: DirectorySet,
    options: ClientOptions,
    interval: Duration,
    scanner: FileScanner,
    orders: PaymentOrderSync,
}

impl Scheduler {
    pub fn new(directories: DirectorySet, options: ClientOptions) -> Self {
        Self {
            directories,
            options,
            interval: PASS_INTERVAL,
            scanner: FileScanner::new(),
            orders: PaymentOrderSync::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn load_config(dir: &Path, kind: &str, report: &mut PassReport) -> Option<DirectoryConfig> {
        match DirectoryConfig::load_for_dir(dir) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("跳过{} {}: {}", kind, dir.display(), e);
                report.directories_skipped += 1;
                None
            }
        }
    }

    /// 依次处理所有上传目录和付款指令目录，单个目录失败不影响其他目录
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();

        for dir in &self.directories.upload {
            let Some(config) = Self::load_config(dir, "目录", &mut report) else {
                continue;
            };

            let span = info_span!("upload", dir = %dir.display());
            async {
                info!("开始处理目录 {}", dir.display());
                let result = match create_client(&config, &self.options) {
                    Ok(client) => self.scanner.scan(dir, client.as_ref()).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(scan) => {
                        info!(
                            "目录 {} 处理完成: 上传 {}, 被拒绝 {}, 失败 {}",
                            dir.display(),
                            scan.uploaded,
                            scan.rejected,
                            scan.failed
                        );
                        report.directories_processed += 1;
                        report.files_uploaded += scan.uploaded;
                    }
                    Err(e) => {
                        error!("处理目录 {} 出错: {}", dir.display(), e);
                        report.directories_failed += 1;
                    }
                }
            }
            .instrument(span)
            .await;
        }

        for dir in &self.directories.payment_orders {
            let Some(config) = Self::load_config(dir, "付款指令目录", &mut report) else {
                continue;
            };

            let span = info_span!("payment_orders", dir = %dir.display());
            async {
                info!("开始处理目录 {} 的付款指令", dir.display());
                let result = match create_client(&config, &self.options) {
                    Ok(client) => self.orders.sync(dir, client.as_ref()).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(orders) => {
                        info!(
                            "目录 {} 的付款指令处理完成: 下载 {}, 跳过 {}",
                            dir.display(),
                            orders.downloaded,
                            orders.skipped
                        );
                        report.directories_processed += 1;
                        report.orders_downloaded += orders.downloaded;
                    }
                    Err(e) => {
                        error!("处理付款指令目录 {} 出错: {}", dir.display(), e);
                        report.directories_failed += 1;
                    }
                }
            }
            .instrument(span)
            .await;
        }

        report
    }

    /// 永久运行：首轮立即执行，之后每个间隔执行一轮
    pub async fn run(&self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // 第一次 tick 立即返回
        ticker.tick().await;
        info!("开始首次处理目录");
        let report = self.run_pass().await;
        info!("首次处理完成: {:?}", report);

        info!("启动定时处理，间隔 {} 秒", self.interval.as_secs());
        loop {
            ticker.tick().await;
            info!("开始定时处理目录");
            let report = self.run_pass().await;
            info!("定时处理完成: {:?}", report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectorySource, DIRECTORY_CONFIG_FILE};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCEPTED: &str = "<winstrom><success>true</success><stats><created>1</created></stats></winstrom>";

    fn write_config(dir: &Path, url: &str) {
        std::fs::write(
            dir.join(DIRECTORY_CONFIG_FILE),
            format!("url: {}\nusername: user\npassword: pass\n", url),
        )
        .unwrap();
    }

    fn directory_set(upload: Vec<PathBuf>, payment_orders: Vec<PathBuf>) -> DirectorySet {
        DirectorySet {
            upload,
            payment_orders,
            source: DirectorySource::Central,
        }
    }

    async fn mount_service(server: &MockServer, upload_expect: u64) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ACCEPTED))
            .expect(upload_expect)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"\.json$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "winstrom": {"prikaz-k-uhrade": []}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/stazeni$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_directory_without_config_is_skipped() {
        let server = MockServer::start().await;
        mount_service(&server, 1).await;

        let missing = TempDir::new().unwrap();
        std::fs::write(missing.path().join("vypis.gpc"), "data").unwrap();

        let good = TempDir::new().unwrap();
        write_config(good.path(), &server.uri());
        std::fs::write(good.path().join("vypis.gpc"), "data").unwrap();

        let scheduler = Scheduler::new(
            directory_set(
                vec![missing.path().to_path_buf(), good.path().to_path_buf()],
                vec![missing.path().to_path_buf()],
            ),
            ClientOptions::default(),
        );
        let report = scheduler.run_pass().await;

        assert_eq!(report.directories_skipped, 2);
        assert_eq!(report.directories_processed, 1);
        assert_eq!(report.files_uploaded, 1);
        assert!(missing.path().join("vypis.gpc").exists());
        assert!(good.path().join("vypis.nahrano").exists());
    }

    #[tokio::test]
    async fn test_failing_directory_does_not_stop_pass() {
        let server = MockServer::start().await;
        mount_service(&server, 1).await;

        let unreachable = TempDir::new().unwrap();
        write_config(unreachable.path(), "http://127.0.0.1:1");
        std::fs::write(unreachable.path().join("vypis.gpc"), "data").unwrap();

        let good = TempDir::new().unwrap();
        write_config(good.path(), &server.uri());
        std::fs::write(good.path().join("vypis.gpc"), "data").unwrap();

        let scheduler = Scheduler::new(
            directory_set(
                vec![unreachable.path().to_path_buf(), good.path().to_path_buf()],
                vec![unreachable.path().to_path_buf(), good.path().to_path_buf()],
            ),
            ClientOptions::with_timeout_secs(Some(5)),
        );
        let report = scheduler.run_pass().await;

        assert_eq!(report.directories_failed, 2);
        assert_eq!(report.directories_processed, 2);
        assert!(unreachable.path().join("vypis.gpc").exists());
        assert!(good.path().join("vypis.nahrano").exists());
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let server = MockServer::start().await;
        mount_service(&server, 2).await;

        let uploads = TempDir::new().unwrap();
        write_config(uploads.path(), &server.uri());
        std::fs::write(uploads.path().join("a.gpc"), "a").unwrap();
        std::fs::write(uploads.path().join("b.GPC"), "b").unwrap();

        let orders = TempDir::new().unwrap();
        write_config(orders.path(), &server.uri());

        let scheduler = Scheduler::new(
            directory_set(
                vec![uploads.path().to_path_buf()],
                vec![orders.path().to_path_buf()],
            ),
            ClientOptions::default(),
        );

        let first = scheduler.run_pass().await;
        let second = scheduler.run_pass().await;

        assert_eq!(first.files_uploaded, 2);
        assert_eq!(second.files_uploaded, 0);
        assert_eq!(first.orders_downloaded + second.orders_downloaded, 0);
        assert_eq!(second.directories_processed, 2);
        assert!(uploads.path().join("a.nahrano").exists());
        assert!(uploads.path().join("b.nahrano").exists());
    }

    #[tokio::test]
    async fn test_run_repeats_passes() {
        let server = MockServer::start().await;
        mount_service(&server, 0).await;

        let orders = TempDir::new().unwrap();
        write_config(orders.path(), &server.uri());

        let scheduler = Scheduler::new(
            directory_set(vec![], vec![orders.path().to_path_buf()]),
            ClientOptions::default(),
        )
        .with_interval(Duration::from_millis(50));

        let _ = tokio::time::timeout(Duration::from_millis(400), scheduler.run()).await;

        let queries = server.received_requests().await.unwrap().len();
        assert!(queries >= 2, "expected repeated passes, got {}", queries);
    }
}
