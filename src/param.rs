// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了服务器遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 静态资源使用的 MIME 类型映射表与字符集推断。
//! - HTTP 方法、版本的强类型枚举。
//! - Tunnel 通道使用的标记头与代理组件名。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "tunnelweb";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 客户端 store 发起 Tunnel 调用时携带的标记头（小写，解析请求时头名已统一小写）
pub const TUNNEL_HEADER: &str = "x-mojito-header";

/// 标记头的取值
pub const TUNNEL_MARKER: &str = "tunnel";

/// RPC 改写后统一转交的代理组件
pub const TUNNEL_PROXY_BASE: &str = "tunnelProxy";

/// spec/type 查询与错误响应使用的 Content-Type
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=\"utf-8\"";

/// 未设置 tunnel_prefix 时的默认值
pub const DEFAULT_TUNNEL_PREFIX: &str = "/tunnel";

/// 未设置 static_handling.prefix 时的默认值
pub const DEFAULT_STATIC_PREFIX: &str = "/static";

lazy_static! {
    /// 服务器会写出的状态码及其原因短语（RFC 9110）
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = [
        (200, "OK"),
        (204, "No Content"),
        (304, "Not Modified"),
        (400, "Bad Request"),
        (403, "Forbidden"),
        (404, "Not Found"),
        (405, "Method Not Allowed"),
        (413, "Content Too Large"),
        (431, "Request Header Fields Too Large"),
        (500, "Internal Server Error"),
        (501, "Not Implemented"),
        (503, "Service Unavailable"),
        (505, "HTTP Version Not Supported"),
    ]
    .into_iter()
    .collect();

    /// 文件后缀名到 MIME 类型的映射，只收录前端资源常见的类型
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = [
        // 文本与脚本
        ("css", "text/css"),
        ("csv", "text/csv"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("js", "text/javascript"),
        ("mjs", "text/javascript"),
        ("txt", "text/plain"),
        ("xml", "text/xml"),
        ("json", "application/json"),
        ("map", "application/json"),
        ("webmanifest", "application/manifest+json"),
        ("wasm", "application/wasm"),
        // 图片
        ("gif", "image/gif"),
        ("ico", "image/x-icon"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("svg", "image/svg+xml"),
        ("webp", "image/webp"),
        ("avif", "image/avif"),
        // 字体
        ("eot", "application/vnd.ms-fontobject"),
        ("otf", "font/otf"),
        ("ttf", "font/ttf"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        // 音视频
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("pdf", "application/pdf"),
    ]
    .into_iter()
    .collect();
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本（部分命令行工具仍会发送）
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
///
/// 静态资源只处理 `GET`/`HEAD`，Tunnel RPC 只接受 `POST`，
/// 其余方法同样需要被解析出来，以便交给后续处理器放行。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 查询服务器支持的选项
    Options,
    /// 提交数据或执行操作
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpRequestMethod {
    /// 从请求行中的方法名解析，大小写不敏感
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            "POST" => Some(HttpRequestMethod::Post),
            "PUT" => Some(HttpRequestMethod::Put),
            "DELETE" => Some(HttpRequestMethod::Delete),
            "PATCH" => Some(HttpRequestMethod::Patch),
            _ => None,
        }
    }
}

/// 根据 MIME 类型推断默认字符集，只有 `text/*` 需要声明
pub fn charset_for(mime: &str) -> Option<&'static str> {
    if mime.starts_with("text/") {
        Some("UTF-8")
    } else {
        None
    }
}

/// 根据文件后缀查找 MIME 类型，未知后缀返回兜底类型
pub fn mime_for(extension: &str) -> &'static str {
    match MIME_TYPES.get(extension.to_lowercase().as_str()) {
        Some(v) => *v,
        None => "application/octet-stream",
    }
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_case_insensitive() {
        assert_eq!(HttpRequestMethod::parse("get"), Some(HttpRequestMethod::Get));
        assert_eq!(HttpRequestMethod::parse("Post"), Some(HttpRequestMethod::Post));
        assert_eq!(HttpRequestMethod::parse("DELETE"), Some(HttpRequestMethod::Delete));
        assert_eq!(HttpRequestMethod::parse("BREW"), None);
    }

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_for("css"), "text/css");
        assert_eq!(mime_for("JSON"), "application/json");
        assert_eq!(mime_for("unknown-ext"), "application/octet-stream");
    }

    #[test]
    fn test_charset_only_for_text() {
        assert_eq!(charset_for("text/css"), Some("UTF-8"));
        assert_eq!(charset_for("image/png"), None);
        assert_eq!(charset_for("application/json"), None);
    }
}
