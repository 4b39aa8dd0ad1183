use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::Config;

/// 对伴生日志收集服务的探测结果。
#[derive(Debug, Clone)]
pub enum ProbeStatus {
    Healthy { details: Option<Value> },
    Unhealthy(u16),
    ConnectionRefused,
    Failed(String),
}

/// 健康探测能力。运行期可能不存在,缺失时健康检查退化为 not_checked,
/// 而不是在编译期写死分支。
pub trait HealthProbe: Send + Sync {
    fn check(&self, url: &str) -> BoxFuture<'static, ProbeStatus>;
}

/// 基于 reqwest 的探测实现。超时逐请求设置,固定为几秒,
/// 单次健康检查不会无限期阻塞整个服务。
pub struct HttpHealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }
}

impl HealthProbe for HttpHealthProbe {
    fn check(&self, url: &str) -> BoxFuture<'static, ProbeStatus> {
        let client = self.client.clone();
        let timeout = self.timeout;
        let url = url.to_string();
        Box::pin(async move {
            match client.get(&url).timeout(timeout).send().await {
                Ok(resp) => {
                    let code = resp.status().as_u16();
                    if code == 200 {
                        ProbeStatus::Healthy {
                            details: resp.json().await.ok(),
                        }
                    } else {
                        ProbeStatus::Unhealthy(code)
                    }
                }
                Err(e) if e.is_connect() => ProbeStatus::ConnectionRefused,
                Err(e) => ProbeStatus::Failed(e.to_string()),
            }
        })
    }
}

/// 日志文件可达性。任何 stat 失败都折叠为状态,不向外抛错。
#[derive(Debug)]
pub enum LogFileStatus {
    Readable { size_bytes: u64, lines: usize },
    NotFound,
    PermissionDenied,
    Failed(String),
}

impl LogFileStatus {
    pub fn label(&self) -> String {
        match self {
            LogFileStatus::Readable { .. } => "readable".to_string(),
            LogFileStatus::NotFound => "not_found".to_string(),
            LogFileStatus::PermissionDenied => "permission_denied".to_string(),
            LogFileStatus::Failed(msg) => format!("error: {msg}"),
        }
    }
}

pub fn inspect_log_file(path: &Path) -> LogFileStatus {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return LogFileStatus::NotFound,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return LogFileStatus::PermissionDenied
        }
        Err(e) => return LogFileStatus::Failed(e.to_string()),
    };
    match fs::read_to_string(path) {
        Ok(content) => LogFileStatus::Readable {
            size_bytes: meta.len(),
            lines: content.lines().count(),
        },
        Err(e) if e.kind() == ErrorKind::PermissionDenied => LogFileStatus::PermissionDenied,
        Err(e) => LogFileStatus::Failed(e.to_string()),
    }
}

/// 生成报告所需的服务器状态快照。
pub struct HealthSnapshot<'a> {
    pub uptime: Duration,
    pub request_count: u64,
    pub error_count: u64,
    pub last_error: Option<&'a str>,
}

/// 汇总文件状态、计数器与伴生服务探测结果为一份文本报告。
pub async fn health_report(
    config: &Config,
    snapshot: HealthSnapshot<'_>,
    probe: Option<&dyn HealthProbe>,
) -> String {
    let file_status = inspect_log_file(&config.log_file_path);
    let collector = match probe {
        Some(p) => Some(p.check(&config.collector_health_url).await),
        None => None,
    };

    let collector_label = match &collector {
        None => "not_checked (http client unavailable)".to_string(),
        Some(ProbeStatus::Healthy { .. }) => "healthy".to_string(),
        Some(ProbeStatus::Unhealthy(code)) => format!("unhealthy (HTTP {code})"),
        Some(ProbeStatus::ConnectionRefused) => "connection_refused".to_string(),
        Some(ProbeStatus::Failed(msg)) => format!("error: {msg}"),
    };

    let mut overall = "healthy";
    if !matches!(file_status, LogFileStatus::Readable { .. }) {
        overall = "degraded";
    }
    if collector.is_some() && !matches!(collector, Some(ProbeStatus::Healthy { .. })) {
        overall = "degraded";
    }
    if snapshot.error_count > 0 {
        overall = "degraded";
    }

    let mut out = String::from("**System Health Check**\n\n");
    out.push_str(&format!(
        "Checked at: {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!(
        "**Overall Status**: {}\n\n",
        overall.to_uppercase()
    ));

    out.push_str("**MCP Server**\n");
    out.push_str("- Status: healthy\n");
    out.push_str(&format!("- Uptime: {:.2}s\n", snapshot.uptime.as_secs_f64()));
    out.push_str(&format!(
        "- Requests: {} total, {} errors\n\n",
        snapshot.request_count, snapshot.error_count
    ));

    out.push_str("**Log File**\n");
    out.push_str(&format!("- Path: {}\n", config.log_file_path.display()));
    out.push_str(&format!("- Status: {}\n", file_status.label()));
    if let LogFileStatus::Readable { size_bytes, lines } = &file_status {
        out.push_str(&format!("- Size: {size_bytes} bytes\n"));
        out.push_str(&format!("- Lines: {lines}\n"));
    }

    out.push_str("\n**Log Collection Server**\n");
    out.push_str(&format!("- URL: {}\n", config.collector_health_url));
    out.push_str(&format!("- Status: {collector_label}\n"));
    if let Some(ProbeStatus::Healthy {
        details: Some(details),
    }) = &collector
    {
        let uptime_ms = details.get("uptime").and_then(Value::as_f64).unwrap_or(0.0);
        out.push_str(&format!("- Uptime: {:.2}s\n", uptime_ms / 1000.0));
        out.push_str(&format!(
            "- Requests: {}, Errors: {}\n",
            details.get("requestCount").and_then(Value::as_u64).unwrap_or(0),
            details.get("errorCount").and_then(Value::as_u64).unwrap_or(0)
        ));
    }

    if let Some(last_error) = snapshot.last_error {
        out.push_str(&format!("\n**Last Error**: {last_error}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct StubProbe(ProbeStatus);

    impl HealthProbe for StubProbe {
        fn check(&self, _url: &str) -> BoxFuture<'static, ProbeStatus> {
            let status = self.0.clone();
            Box::pin(async move { status })
        }
    }

    fn snapshot() -> HealthSnapshot<'static> {
        HealthSnapshot {
            uptime: Duration::from_secs(3),
            request_count: 7,
            error_count: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn probe_is_bounded_by_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // 接受连接但永不应答,请求只能靠超时结束。
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let probe = HttpHealthProbe::new(Duration::from_millis(200));
        let status = probe.check(&format!("http://{addr}/health")).await;
        assert!(matches!(status, ProbeStatus::Failed(_)));
        server.abort();
    }

    #[test]
    fn missing_file_is_not_found() {
        let status = inspect_log_file(Path::new("/definitely/absent/devtools.log"));
        assert_eq!(status.label(), "not_found");
    }

    #[test]
    fn readable_file_reports_size_and_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a\nb\nc\n").unwrap();
        match inspect_log_file(&path) {
            LogFileStatus::Readable { size_bytes, lines } => {
                assert_eq!(size_bytes, 6);
                assert_eq!(lines, 3);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_degrades_on_missing_file_without_probe() {
        let config = Config::with_log_path(PathBuf::from("/definitely/absent/devtools.log"));
        let report = health_report(&config, snapshot(), None).await;

        assert!(report.contains("**Overall Status**: DEGRADED"));
        assert!(report.contains("- Status: not_found"));
        assert!(report.contains("not_checked"));
    }

    #[tokio::test]
    async fn report_is_healthy_with_readable_file_and_healthy_collector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "{}\n").unwrap();

        let config = Config::with_log_path(path);
        let probe = StubProbe(ProbeStatus::Healthy {
            details: Some(json!({"uptime": 1500.0, "requestCount": 4, "errorCount": 0})),
        });
        let report = health_report(&config, snapshot(), Some(&probe)).await;

        assert!(report.contains("**Overall Status**: HEALTHY"));
        assert!(report.contains("- Status: readable"));
        assert!(report.contains("- Uptime: 1.50s"));
        assert!(report.contains("- Requests: 4, Errors: 0"));
    }

    #[tokio::test]
    async fn report_degrades_on_unhealthy_collector_and_error_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "{}\n").unwrap();
        let config = Config::with_log_path(path);

        let probe = StubProbe(ProbeStatus::Unhealthy(503));
        let report = health_report(&config, snapshot(), Some(&probe)).await;
        assert!(report.contains("unhealthy (HTTP 503)"));
        assert!(report.contains("DEGRADED"));

        let probe = StubProbe(ProbeStatus::Healthy { details: None });
        let with_errors = HealthSnapshot {
            error_count: 2,
            last_error: Some("boom"),
            ..snapshot()
        };
        let report = health_report(&config, with_errors, Some(&probe)).await;
        assert!(report.contains("DEGRADED"));
        assert!(report.contains("**Last Error**: boom"));
    }
}
