use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::Result;
use crate::model::{level_threshold, LogEntry};

/// 日志查询引擎:对单个行分隔 JSON 日志文件的纯查询。
/// 无缓存,每次调用都重新读取整个文件;文件假定较小并由外部轮转。
pub struct QueryEngine {
    log_path: PathBuf,
}

impl QueryEngine {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// 倒序扫描取最近 `count` 条满足级别阈值的条目,按时间顺序渲染。
    pub fn recent_logs(&self, count: usize, level_filter: &str) -> String {
        match self.recent_logs_inner(count, level_filter) {
            Ok(text) => text,
            Err(e) => {
                warn!("error reading logs: {e}");
                format!("Error reading logs: {e}")
            }
        }
    }

    fn recent_logs_inner(&self, count: usize, level_filter: &str) -> Result<String> {
        let filter = level_filter.to_ascii_uppercase();
        if !self.log_path.exists() {
            return Ok(format!(
                "Log file not found. Make sure:\n\
                 1. The log collection server is running\n\
                 2. The application is sending logs\n\
                 3. Check path: {}",
                self.log_path.display()
            ));
        }

        let min_level = level_threshold(&filter, 2);
        let content = fs::read_to_string(&self.log_path)?;

        let mut picked: Vec<LogEntry> = Vec::new();
        for line in content.lines().rev() {
            if picked.len() >= count {
                break;
            }
            let Some(entry) = LogEntry::parse(line) else {
                continue;
            };
            if entry.rank() >= min_level {
                picked.push(entry);
            }
        }

        if picked.is_empty() {
            return Ok(format!(
                "No logs found matching level {filter} or higher.\n\n\
                 Try:\n\
                 - Lower the log level filter\n\
                 - Check if logs are being written\n\
                 - Verify the collector is receiving entries"
            ));
        }

        // 采集时是倒序,这里再反转回时间顺序。
        let formatted: Vec<String> = picked
            .iter()
            .rev()
            .map(|entry| {
                format!(
                    "[{}] {}: {}",
                    entry.display_timestamp("Unknown time"),
                    entry.display_level(),
                    entry.message
                )
            })
            .collect();

        Ok(format!(
            "Found {} recent logs:\n\n{}",
            formatted.len(),
            formatted.join("\n")
        ))
    }

    /// 正序子串搜索,行号为文件原始顺序的 1 基行号(畸形行也占号)。
    /// 空查询匹配所有通过级别过滤的可解析行。
    pub fn search_logs(&self, query: &str, level_filter: &str, limit: usize) -> String {
        match self.search_logs_inner(query, level_filter, limit) {
            Ok(text) => text,
            Err(e) => {
                warn!("error searching logs: {e}");
                format!("Error searching logs: {e}")
            }
        }
    }

    fn search_logs_inner(&self, query: &str, level_filter: &str, limit: usize) -> Result<String> {
        if !self.log_path.exists() {
            return Ok(
                "Log file not found. Make sure the log collection server is running.".to_string(),
            );
        }

        let min_level = level_threshold(level_filter, 0);
        let needle = query.to_lowercase();
        let content = fs::read_to_string(&self.log_path)?;

        let mut matches: Vec<String> = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if matches.len() >= limit {
                break;
            }
            let Some(entry) = LogEntry::parse(line) else {
                continue;
            };
            if entry.rank() < min_level {
                continue;
            }
            if !entry.message.to_lowercase().contains(&needle) {
                continue;
            }
            matches.push(format!(
                "Line {} [{}] {}: {}",
                idx + 1,
                entry.display_timestamp("Unknown"),
                entry.display_level(),
                entry.message
            ));
        }

        if matches.is_empty() {
            return Ok(format!(
                "No logs found matching '{query}'\n\n\
                 Try:\n\
                 - Different search terms\n\
                 - Broader log level filter\n\
                 - Check if logs contain the text you're looking for"
            ));
        }

        Ok(format!(
            "Found {} matching logs:\n\n{}",
            matches.len(),
            matches.join("\n")
        ))
    }

    /// 全文件扫描,统计级别恰为 ERROR / WARN 的条目并展示各自最后 10 条。
    /// `hours` 只回显在标题里,不做实际时间过滤;时间戳从不按时间值解析。
    pub fn error_summary(&self, hours: f64) -> String {
        match self.error_summary_inner(hours) {
            Ok(text) => text,
            Err(e) => {
                warn!("error generating summary: {e}");
                format!("Error generating summary: {e}")
            }
        }
    }

    fn error_summary_inner(&self, hours: f64) -> Result<String> {
        if !self.log_path.exists() {
            return Ok("Log file not found.".to_string());
        }

        let content = fs::read_to_string(&self.log_path)?;

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        for line in content.lines() {
            let Some(entry) = LogEntry::parse(line) else {
                continue;
            };
            match entry.display_level().as_str() {
                "ERROR" => errors.push(entry.message),
                "WARN" => warnings.push(entry.message),
                _ => {}
            }
        }

        let mut summary = format!("Error Summary (last {hours} hours):\n\n");

        summary.push_str(&format!("**{} Errors found:**\n", errors.len()));
        if errors.is_empty() {
            summary.push_str("  (No errors)\n");
        } else {
            let start = errors.len().saturating_sub(10);
            for (i, message) in errors[start..].iter().enumerate() {
                summary.push_str(&format!("{}. {}\n", i + 1, message));
            }
        }

        summary.push_str(&format!("\n**{} Warnings found:**\n", warnings.len()));
        if warnings.is_empty() {
            summary.push_str("  (No warnings)\n");
        } else {
            let start = warnings.len().saturating_sub(10);
            for (i, message) in warnings[start..].iter().enumerate() {
                summary.push_str(&format!("{}. {}\n", i + 1, message));
            }
        }

        if errors.is_empty() && warnings.is_empty() {
            summary.push_str("\nNo errors or warnings found. The application is running smoothly.");
        }

        Ok(summary)
    }
}
