//! 日志模块 - 控制台日志，以及可选的追加写入文件日志

use crate::config::CentralConfig;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 是否同时写入日志文件
    pub to_file: bool,
    pub file: PathBuf,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// 轮转阈值（MB），0 表示不轮转
    pub max_size_mb: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_central(&CentralConfig::default())
    }
}

impl LogConfig {
    pub fn from_central(config: &CentralConfig) -> Self {
        Self {
            to_file: config.log_to_file,
            file: config.log_file.clone(),
            level: config.log_level.clone(),
            max_size_mb: config.log_max_size_mb,
        }
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 追加写入的日志文件，超过大小限制时轮转为 `<文件名>.old`
pub struct LogFileWriter {
    file_path: PathBuf,
    max_size: u64,
    written: u64,
    writer: BufWriter<File>,
}

impl LogFileWriter {
    pub fn new(file_path: &Path, max_size_mb: u32) -> io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = Self::open_file(file_path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file_path: file_path.to_path_buf(),
            max_size: (max_size_mb as u64) * 1024 * 1024,
            written,
            writer: BufWriter::new(file),
        })
    }

    fn open_file(file_path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(file_path)
    }

    /// 备份文件路径：app.log -> app.log.old
    pub fn backup_path(file_path: &Path) -> PathBuf {
        let mut name = OsString::from(file_path.as_os_str());
        name.push(".old");
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        let backup_path = Self::backup_path(&self.file_path);
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(&self.file_path, &backup_path)?;

        self.writer = BufWriter::new(Self::open_file(&self.file_path)?);
        self.written = 0;
        Ok(())
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_size > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let n = self.writer.write(buf)?;
        self.writer.flush()?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 日志生命周期句柄，由 main 持有；drop 时把剩余日志写入文件
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 日志过滤器：设置了 RUST_LOG 时以其为准，否则使用配置的级别
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    let filter = match rust_log.filter(|v| !v.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_new(config.tracing_level().to_string())?,
    };

    Ok(filter
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?))
}

/// 初始化日志系统
pub fn init(config: &LogConfig) -> anyhow::Result<LogGuard> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(config, rust_log.as_deref())?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339());

    let (file_layer, file_guard) = if config.to_file {
        let writer = LogFileWriter::new(&config.file, config.max_size_mb)
            .map_err(|e| anyhow::anyhow!("无法打开日志文件 {}: {}", config.file.display(), e))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false)
            .with_timer(ChronoLocal::rfc_3339());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_config_from_central() {
        let central = CentralConfig {
            log_to_file: true,
            log_level: "DEBUG".to_string(),
            log_max_size_mb: 5,
            ..CentralConfig::default()
        };
        let config = LogConfig::from_central(&central);
        assert!(config.to_file);
        assert_eq!(config.file, PathBuf::from("app.log"));
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);

        let config = LogConfig::default();
        assert!(!config.to_file);
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_rust_log_overrides_configured_level() {
        let config = LogConfig::default();

        let filter = build_filter(&config, Some("debug")).unwrap().to_string().to_lowercase();
        assert!(filter.contains("debug"), "filter: {}", filter);
        assert!(!filter.contains("info"), "filter: {}", filter);

        let filter = build_filter(&config, None).unwrap().to_string().to_lowercase();
        assert!(filter.contains("info"), "filter: {}", filter);
        assert!(!filter.contains("debug"), "filter: {}", filter);

        let filter = build_filter(&config, Some("  ")).unwrap().to_string().to_lowercase();
        assert!(filter.contains("info"), "filter: {}", filter);
    }

    #[test]
    fn test_writer_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("app.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "first\n").unwrap();

        let mut writer = LogFileWriter::new(&path, 0).unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert!(!LogFileWriter::backup_path(&path).exists());
    }

    #[test]
    fn test_writer_rotates_when_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");

        let mut writer = LogFileWriter::new(&path, 1).unwrap();
        let line = vec![b'x'; 700 * 1024];
        writer.write_all(&line).unwrap();
        writer.write_all(&line).unwrap();
        writer.flush().unwrap();

        let backup = LogFileWriter::backup_path(&path);
        assert_eq!(backup, dir.path().join("app.log.old"));
        assert_eq!(std::fs::metadata(&backup).unwrap().len(), 700 * 1024);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 700 * 1024);
    }
}
