use anyhow::Context;
use flexisync_lib::config::{
    central_config_path, resolve_directories, CentralConfig, DirectorySource,
};
use flexisync_lib::logging::{self, LogConfig};
use flexisync_lib::remote::ClientOptions;
use flexisync_lib::Scheduler;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let central_path = central_config_path();
    let central = CentralConfig::load(&central_path);

    // 初始化日志系统，句柄在进程结束前一直持有
    let log_config = central
        .as_ref()
        .map(LogConfig::from_central)
        .unwrap_or_default();
    let _log_guard = logging::init(&log_config).context("初始化日志失败")?;

    let central = match central {
        Ok(config) => Some(config),
        Err(e) => {
            error!("加载中央配置失败: {}", e);
            None
        }
    };

    let directories = resolve_directories(central.as_ref(), |key| std::env::var(key).ok());
    match directories.source {
        DirectorySource::Central => {
            info!("使用中央配置 {} 中的目录列表", central_path.display())
        }
        DirectorySource::Environment => info!("使用环境变量中的目录列表"),
    }
    info!(
        "上传目录 {} 个, 付款指令目录 {} 个",
        directories.upload.len(),
        directories.payment_orders.len()
    );

    let options = ClientOptions::with_timeout_secs(
        central.as_ref().and_then(|c| c.request_timeout_secs),
    );
    let scheduler = Scheduler::new(directories, options);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("收到退出信号，停止处理");
        }
    }

    Ok(())
}
