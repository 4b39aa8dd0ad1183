//! 日志查询 MCP 服务核心库
//! 通过 stdio JSON-RPC 暴露日志检索、搜索、错误汇总与健康检查工具。

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod mcp;
pub mod model;
pub mod server;
