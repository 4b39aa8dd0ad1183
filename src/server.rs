use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::QueryEngine;
use crate::error::{LogQueryError, Result};
use crate::health::{health_report, HealthProbe, HealthSnapshot};
use crate::model::{ErrorSummaryParams, RecentLogsParams, SearchLogsParams};

pub const SERVER_NAME: &str = "devtools-log-mcp";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// 进程级状态。所有变更都走单一的顺序处理路径,不需要锁。
#[derive(Debug)]
pub struct ServerState {
    pub name: &'static str,
    pub version: &'static str,
    /// 第一次 initialize 时才记录,而不是进程启动时。
    pub start_time: Option<Instant>,
    pub request_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
            start_time: None,
            request_count: 0,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// 请求分发器:按方法名路由到查询引擎或能力发现响应。
pub struct McpServer {
    config: Config,
    engine: QueryEngine,
    probe: Option<Arc<dyn HealthProbe>>,
    state: ServerState,
}

impl McpServer {
    pub fn new(config: Config, probe: Option<Arc<dyn HealthProbe>>) -> Self {
        let engine = QueryEngine::new(config.log_file_path.clone());
        Self {
            config,
            engine,
            probe,
            state: ServerState::new(),
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// 分发一个已解码的请求。NotFound 映射 -32601;其余错误映射 -32603
    /// 并更新错误计数与 last_error,绝不向传输层抛出。
    pub async fn dispatch(&mut self, method: &str, params: Value) -> Result<Value> {
        self.state.request_count += 1;
        debug!(method, "dispatching request");

        let result = match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => Ok(tools_schema()),
            "tools/call" => self.handle_tools_call(params).await,
            "prompts/list" => Ok(prompts_schema()),
            "prompts/get" => self.handle_prompts_get(params),
            other => Err(LogQueryError::NotFound(format!(
                "Method not found: {other}"
            ))),
        };

        if let Err(e) = &result {
            if !matches!(e, LogQueryError::NotFound(_)) {
                self.state.error_count += 1;
                self.state.last_error = Some(e.to_string());
                error!("request handling failed: {e}");
            }
        }
        result
    }

    fn handle_initialize(&mut self) -> Result<Value> {
        if self.state.start_time.is_none() {
            self.state.start_time = Some(Instant::now());
        }
        info!(
            "initializing MCP server: {} v{}",
            self.state.name, self.state.version
        );
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": self.state.name,
                "version": self.state.version
            }
        }))
    }

    async fn handle_tools_call(&mut self, params: Value) -> Result<Value> {
        let call: ToolCallParams = parse_params(params)?;
        debug!(tool = %call.name, "tool call");

        let text = match call.name.as_str() {
            "get_recent_logs" => {
                let p: RecentLogsParams = parse_params(call.arguments)?;
                self.engine.recent_logs(p.count, &p.level)
            }
            "search_logs" => {
                let p: SearchLogsParams = parse_params(call.arguments)?;
                self.engine.search_logs(&p.query, &p.level, p.limit)
            }
            "get_error_summary" => {
                let p: ErrorSummaryParams = parse_params(call.arguments)?;
                self.engine.error_summary(p.hours)
            }
            "health_check" => {
                let snapshot = HealthSnapshot {
                    uptime: self.state.uptime(),
                    request_count: self.state.request_count,
                    error_count: self.state.error_count,
                    last_error: self.state.last_error.as_deref(),
                };
                health_report(&self.config, snapshot, self.probe.as_deref()).await
            }
            other => {
                return Err(LogQueryError::NotFound(format!("Unknown tool: {other}")));
            }
        };

        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }

    /// 提示词不是静态文本:先调用查询引擎,再拼进固定模板。
    fn handle_prompts_get(&mut self, params: Value) -> Result<Value> {
        let p: PromptGetParams = parse_params(params)?;

        let text = match p.name.as_str() {
            "analyze_logs" => {
                let recent = self.engine.recent_logs(20, "WARN");
                format!(
                    "Please analyze these recent application logs for potential issues:\n\n\
                     {recent}\n\n\
                     Look for:\n\
                     1. Error patterns or frequent issues\n\
                     2. Performance problems\n\
                     3. API call failures\n\
                     4. UI/UX related warnings\n\
                     5. Suggest debugging steps"
                )
            }
            "debug_session" => {
                let summary = self.engine.error_summary(2.0);
                format!(
                    "Let's start a debugging session. Here's what I found in the last 2 hours:\n\n\
                     {summary}\n\n\
                     Please help me:\n\
                     1. Prioritize which issues to tackle first\n\
                     2. Suggest potential root causes\n\
                     3. Recommend debugging approaches"
                )
            }
            other => {
                return Err(LogQueryError::NotFound(format!("Unknown prompt: {other}")));
            }
        };

        Ok(json!({
            "description": format!("Generated prompt for {}", p.name),
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct PromptGetParams {
    name: String,
}

/// 缺失的参数对象视为空对象,让 serde 默认值生效。
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| LogQueryError::InvalidRequest(format!("invalid params: {e}")))
}

fn tools_schema() -> Value {
    json!({
        "tools": [
            {
                "name": "get_recent_logs",
                "description": "Get recent application logs with optional filtering by log level",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "count": {
                            "type": "number",
                            "description": "Number of recent logs to retrieve",
                            "default": 10
                        },
                        "level": {
                            "type": "string",
                            "enum": ["DEBUG", "INFO", "WARN", "ERROR", "ALL"],
                            "description": "Minimum log level to include",
                            "default": "INFO"
                        }
                    }
                }
            },
            {
                "name": "health_check",
                "description": "Check the health status of the MCP server and log system components",
                "inputSchema": {
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }
            },
            {
                "name": "search_logs",
                "description": "Search logs for specific text patterns",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Text to search for in log messages"
                        },
                        "level": {
                            "type": "string",
                            "enum": ["DEBUG", "INFO", "WARN", "ERROR", "ALL"],
                            "description": "Log level filter",
                            "default": "ALL"
                        },
                        "limit": {
                            "type": "number",
                            "description": "Maximum number of results",
                            "default": 50
                        }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": "get_error_summary",
                "description": "Get a summary of recent errors and warnings",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "hours": {
                            "type": "number",
                            "description": "Number of hours to look back",
                            "default": 24
                        }
                    }
                }
            }
        ]
    })
}

fn prompts_schema() -> Value {
    json!({
        "prompts": [
            {
                "name": "analyze_logs",
                "description": "Analyze application logs for issues and patterns"
            },
            {
                "name": "debug_session",
                "description": "Start a debugging session with recent error logs"
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn server_for(path: &Path) -> McpServer {
        McpServer::new(Config::with_log_path(path.to_path_buf()), None)
    }

    fn tool_text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn initialize_records_start_time_and_reports_identity() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("app.log"));
        assert!(server.state().start_time.is_none());

        let result = server.dispatch("initialize", Value::Null).await.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(server.state().start_time.is_some());
        assert_eq!(server.state().request_count, 1);
    }

    #[tokio::test]
    async fn unknown_method_maps_to_not_found_without_error_count() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("app.log"));

        let err = server.dispatch("frobnicate", Value::Null).await.unwrap_err();
        assert!(matches!(err, LogQueryError::NotFound(_)));
        assert!(err.to_string().contains("frobnicate"));
        assert_eq!(server.state().error_count, 0);
        assert_eq!(server.state().request_count, 1);
    }

    #[tokio::test]
    async fn unknown_tool_and_prompt_map_to_not_found() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("app.log"));

        let err = server
            .dispatch("tools/call", json!({"name": "no_such_tool"}))
            .await
            .unwrap_err();
        assert!(matches!(err, LogQueryError::NotFound(_)));

        let err = server
            .dispatch("prompts/get", json!({"name": "no_such_prompt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, LogQueryError::NotFound(_)));
        assert_eq!(server.state().error_count, 0);
    }

    #[tokio::test]
    async fn malformed_arguments_increment_error_counter_once() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("app.log"));

        let params = json!({"name": "get_recent_logs", "arguments": {"count": "ten"}});
        let err = server.dispatch("tools/call", params).await.unwrap_err();
        assert!(!matches!(err, LogQueryError::NotFound(_)));
        assert_eq!(server.state().error_count, 1);
        assert!(server.state().last_error.is_some());
    }

    #[tokio::test]
    async fn tools_list_exposes_four_tools() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("app.log"));

        let result = server.dispatch("tools/list", Value::Null).await.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"get_recent_logs"));
        assert!(names.contains(&"search_logs"));
        assert!(names.contains(&"get_error_summary"));
        assert!(names.contains(&"health_check"));
    }

    #[tokio::test]
    async fn tools_call_applies_engine_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "{\"level\":\"info\",\"message\":\"hello\"}\n").unwrap();
        let mut server = server_for(&path);

        // 完全缺失 arguments 也应落到默认值,而不是报错。
        let result = server
            .dispatch("tools/call", json!({"name": "get_recent_logs"}))
            .await
            .unwrap();
        assert!(tool_text(&result).contains("hello"));

        let result = server
            .dispatch("tools/call", json!({"name": "search_logs", "arguments": {}}))
            .await
            .unwrap();
        assert!(tool_text(&result).contains("Found 1 matching logs"));
    }

    #[tokio::test]
    async fn health_check_reports_degraded_for_missing_file() {
        let dir = tempdir().unwrap();
        let mut server = server_for(&dir.path().join("absent.log"));

        let result = server
            .dispatch("tools/call", json!({"name": "health_check"}))
            .await
            .unwrap();
        let text = tool_text(&result);
        assert!(text.contains("not_found"));
        assert!(text.contains("DEGRADED"));
        assert!(text.contains("not_checked"));
    }

    #[tokio::test]
    async fn prompts_splice_live_engine_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(
            &path,
            "{\"level\":\"warn\",\"message\":\"disk almost full\"}\n",
        )
        .unwrap();
        let mut server = server_for(&path);

        let result = server
            .dispatch("prompts/get", json!({"name": "analyze_logs"}))
            .await
            .unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.starts_with("Please analyze"));
        assert!(text.contains("disk almost full"));
        assert_eq!(result["messages"][0]["role"], "user");

        let result = server
            .dispatch("prompts/get", json!({"name": "debug_session"}))
            .await
            .unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("Error Summary (last 2 hours):"));
        assert!(text.contains("**1 Warnings found:**"));
    }

    #[tokio::test]
    async fn uptime_is_zero_before_handshake() {
        let state = ServerState::new();
        assert_eq!(state.uptime(), Duration::ZERO);
    }
}
