use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::error::{LogQueryError, Result};
use crate::server::McpServer;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// 每个请求恰好产生一个响应值。分发器的错误在这里折叠为
/// 结构化错误对象,不会穿透到传输层。
pub async fn process_request(server: &mut McpServer, req: RpcRequest) -> RpcResponse {
    let RpcRequest { id, method, params } = req;
    match server.dispatch(&method, params).await {
        Ok(result) => RpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        },
        Err(LogQueryError::NotFound(message)) => rpc_error(id, -32601, message),
        Err(e) => rpc_error(id, -32603, format!("Internal error: {e}")),
    }
}

/// stdio 服务循环:严格顺序处理,一个请求完全应答后才读下一行。
/// 空白行与非 JSON 行跳过,EOF 干净退出。
pub async fn run_stdio(mut server: McpServer) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!("skipping invalid input line: {e}");
                continue;
            }
        };
        // 无 id 的通知不需要应答。
        if req.method.starts_with("notifications/") && req.id.is_null() {
            continue;
        }

        let resp = process_request(&mut server, req).await;
        write_response(&mut stdout, resp).await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

async fn write_response(stdout: &mut tokio::io::Stdout, resp: RpcResponse) -> Result<()> {
    let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

fn rpc_error(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}
