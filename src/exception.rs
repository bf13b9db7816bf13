// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖协议解析错误、静态资源读取错误、Tunnel 指令错误以及配置错误。
//! - **语义映射**：每个变体都对应一个 HTTP 状态码（见 [`Exception::status_code`]），
//!   上层模块据此生成最终响应。
//! - **作用域**：所有异常都只影响当前请求，不会导致进程退出。

use std::fmt;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了服务器无法识别的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求行或请求头格式错误。
    MalformedRequest(String),
    /// 请求体超过 `max_body_size`。
    PayloadTooLarge,
    /// 路径包含 `..` 等越权片段。
    Forbidden,
    /// 没有任何处理器认领该请求。
    NotFound,
    /// ResourceStore 无法给出编译后的资源内容。
    StoreReadFailure(String),
    /// Tunnel 请求缺少 type/name，或请求体不是合法的 Tunnel 指令。
    MalformedTunnelRequest(String),
    /// ResourceStore 展开 instance 失败。
    ExpansionFailure(String),
    /// 请求体声明为 JSON 但无法解析。
    MalformedBody(String),
    /// 配置文件缺失或字段不合法。
    InvalidConfig(String),
}

use Exception::*;

impl Exception {
    /// 异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | UnSupportedRequestMethod | UnsupportedHttpVersion => 400,
            MalformedRequest(_) | MalformedBody(_) => 400,
            PayloadTooLarge => 413,
            Forbidden => 403,
            NotFound => 404,
            StoreReadFailure(_) | MalformedTunnelRequest(_) | ExpansionFailure(_) => 500,
            InvalidConfig(_) => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest(m) => write!(f, "Malformed request: {}", m),
            PayloadTooLarge => write!(f, "Request body too large (413)"),
            Forbidden => write!(f, "Forbidden (403)"),
            NotFound => write!(f, "Not found (404)"),
            StoreReadFailure(m) => write!(f, "Failed to read compiled resource: {}", m),
            MalformedTunnelRequest(m) => write!(f, "Malformed tunnel command: {}", m),
            ExpansionFailure(m) => write!(f, "Failed to expand instance: {}", m),
            MalformedBody(m) => write!(f, "Malformed request body: {}", m),
            InvalidConfig(m) => write!(f, "Invalid configuration: {}", m),
        }
    }
}

impl std::error::Error for Exception {}
