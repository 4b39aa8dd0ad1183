use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// 日志文件路径的环境变量;相对路径以可执行文件所在目录为基准解析。
pub const LOG_PATH_ENV: &str = "DEVTOOLS_LOG_PATH";
pub const DEFAULT_LOG_PATH: &str = "../logs/devtools.log";

/// 日志收集服务的固定健康检查地址,仅由 health_check 访问。
pub const COLLECTOR_HEALTH_URL: &str = "http://127.0.0.1:3001/health";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_file_path: PathBuf,
    pub collector_health_url: String,
    pub probe_timeout: Duration,
}

impl Config {
    /// 仅从环境变量读取配置,没有配置文件。
    pub fn from_env() -> Self {
        let raw = env::var(LOG_PATH_ENV).unwrap_or_else(|_| DEFAULT_LOG_PATH.to_string());
        Self::with_log_path(PathBuf::from(raw))
    }

    pub fn with_log_path(path: PathBuf) -> Self {
        Self {
            log_file_path: resolve_log_path(path),
            collector_health_url: COLLECTOR_HEALTH_URL.to_string(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

fn resolve_log_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    let anchor = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .or_else(|| env::current_dir().ok());
    match anchor {
        Some(base) => base.join(path),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_is_kept_as_is() {
        let cfg = Config::with_log_path(PathBuf::from("/var/log/devtools.log"));
        assert_eq!(cfg.log_file_path, PathBuf::from("/var/log/devtools.log"));
    }

    #[test]
    fn relative_path_is_anchored() {
        let cfg = Config::with_log_path(PathBuf::from("logs/app.log"));
        assert!(cfg.log_file_path.is_absolute());
        assert!(cfg.log_file_path.ends_with("logs/app.log"));
    }
}
