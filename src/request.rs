// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体，
//! 同时承载请求在处理管线中积累的状态：
//! 1. 请求行（Request-Line）的解析（方法、路径、版本）。
//! 2. 全部请求头（名称统一转为小写）。
//! 3. 按 `Content-Length` 截取的请求体。
//! 4. 路由参数、请求上下文、Cookie、解析后的请求体。
//! 5. Tunnel RPC 改写后交给下游调度器的指令。

use std::collections::HashMap;

use bytes::Bytes;
use log::error;
use serde_json::{Map, Value};

use crate::{exception::Exception, param::*, tunnel::RewrittenInstruction};

/// 表示一个 HTTP 请求及其在处理管线中的状态。
#[derive(Debug, Clone)]
pub struct Request {
    /// 连接序号，用于在多线程环境下追踪日志
    id: u128,
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 原始请求目标（包含查询字符串）
    url: String,
    /// 去掉查询字符串后的路径
    path: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 请求头，名称均为小写
    headers: HashMap<String, String>,
    /// 请求体原始字节
    body: Bytes,
    /// 路由模式中 `:name` 段匹配到的值
    params: HashMap<String, String>,
    /// 请求上下文，初始值来自查询字符串
    context: Map<String, Value>,
    cookies: HashMap<String, String>,
    /// BodyParser 插件解析出的请求体
    parsed_body: Option<Value>,
    /// Tunnel RPC 改写后的内部指令
    command: Option<RewrittenInstruction>,
}

impl Request {
    /// 直接构造请求，主要供测试与内部转发使用。
    pub fn new(method: HttpRequestMethod, url: &str, id: u128) -> Self {
        let (path, query) = split_url(url);
        Self {
            id,
            method,
            url: url.to_string(),
            path,
            version: HttpVersion::V1_1,
            headers: HashMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            context: context_from_query(query),
            cookies: HashMap::new(),
            parsed_body: None,
            command: None,
        }
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位头部结束标记 `\r\n\r\n`，头部必须是合法的 UTF-8。
    /// 2. 解析请求行：提取方法、路径和协议版本。
    /// 3. 逐行解析请求头，名称转为小写。
    /// 4. 头部之后的字节按 `Content-Length` 截取为请求体。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据，可以只包含头部。
    /// * `id` - 全局请求 ID。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head_bytes, rest) = match find_head_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };

        let head = match std::str::from_utf8(head_bytes) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest(format!(
                "bad request line: {}",
                request_line
            )));
        }

        let method = match HttpRequestMethod::parse(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = parts[parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中出现空格虽然不规范，但通过 join 尝试恢复
        let url = parts[1..parts.len() - 1].join(" ");

        let mut request = Self::new(method, &url, id);
        request.version = version;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    request
                        .headers
                        .insert(name.trim().to_lowercase(), value.trim().to_string());
                }
                None => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest(format!("bad header: {}", line)));
                }
            }
        }

        let body_len = request.content_length().unwrap_or(0).min(rest.len());
        request.body = Bytes::copy_from_slice(&rest[..body_len]);
        Ok(request)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// 返回头部结束标记 `\r\n\r\n` 的起始下标
pub fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn split_url(url: &str) -> (String, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query)),
        None => (url.to_string(), None),
    }
}

fn context_from_query(query: Option<&str>) -> Map<String, Value> {
    let mut context = Map::new();
    if let Some(q) = query {
        for (key, value) in url::form_urlencoded::parse(q.as_bytes()) {
            context.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    context
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 原始请求目标（含查询参数）
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 不含查询参数的路径
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 按名称（大小写不敏感）获取请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 是否携带 Tunnel 标记头
    pub fn is_tunnel(&self) -> bool {
        self.header(TUNNEL_HEADER) == Some(TUNNEL_MARKER)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    pub fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.context
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }

    pub fn set_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body.as_ref()
    }

    pub fn set_parsed_body(&mut self, body: Value) {
        self.parsed_body = Some(body);
    }

    /// 下游调度器读取 Tunnel 改写后的指令
    pub fn command(&self) -> Option<&RewrittenInstruction> {
        self.command.as_ref()
    }

    pub fn set_command(&mut self, command: RewrittenInstruction) {
        self.command = Some(command);
    }
}
