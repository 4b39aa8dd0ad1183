use serde::Deserialize;
use serde_json::Value;

/// 日志条目。字段集合松散:message 缺失时退回 arguments 拼接,
/// 两者都缺失时退回整条 JSON 的字符串化。
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    /// 展示与子串匹配共用的文本。
    pub message: String,
}

impl LogEntry {
    /// 单行解析。不是 JSON 对象的行返回 None,由调用方静默跳过。
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let obj = value.as_object()?;

        let timestamp = obj.get("timestamp").map(stringify);
        let level = obj
            .get("level")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = if let Some(m) = obj.get("message") {
            stringify(m)
        } else if let Some(args) = obj.get("arguments").and_then(Value::as_array) {
            args.iter().map(stringify).collect::<Vec<_>>().join(" ")
        } else {
            value.to_string()
        };

        Some(Self {
            timestamp,
            level,
            message,
        })
    }

    pub fn rank(&self) -> u8 {
        self.level.as_deref().map(level_rank).unwrap_or(2)
    }

    pub fn display_level(&self) -> String {
        self.level
            .as_deref()
            .unwrap_or("INFO")
            .to_ascii_uppercase()
    }

    pub fn display_timestamp<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.timestamp.as_deref().unwrap_or(fallback)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 严重度等级表。未识别的级别按 INFO(2) 处理。
pub fn level_rank(level: &str) -> u8 {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => 1,
        "INFO" => 2,
        "WARN" => 3,
        "ERROR" => 4,
        _ => 2,
    }
}

/// 过滤阈值。"ALL" 关闭过滤;未识别的过滤级别退回 `unknown_default`,
/// recent_logs 与 search_logs 的默认值不同。
pub fn level_threshold(filter: &str, unknown_default: u8) -> u8 {
    let upper = filter.to_ascii_uppercase();
    if upper == "ALL" {
        return 0;
    }
    match upper.as_str() {
        "DEBUG" => 1,
        "INFO" => 2,
        "WARN" => 3,
        "ERROR" => 4,
        _ => unknown_default,
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentLogsParams {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_level_info")]
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchLogsParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_level_all")]
    pub level: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct ErrorSummaryParams {
    #[serde(default = "default_hours")]
    pub hours: f64,
}

fn default_count() -> usize {
    10
}

fn default_level_info() -> String {
    "INFO".to_string()
}

fn default_level_all() -> String {
    "ALL".to_string()
}

fn default_limit() -> usize {
    50
}

fn default_hours() -> f64 {
    24.0
}
