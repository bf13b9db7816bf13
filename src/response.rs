use crate::{
    param::*,
    util::HtmlBuilder,
    validator::http_date,
};

use bytes::Bytes;
use chrono::prelude::*;
use log::error;
use serde::Serialize;
use serde_json::json;

/// 一个完整的 HTTP 响应。
///
/// 头部按写入顺序保存，序列化时追加 `Date`、`Server` 与 `Connection`。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    date: DateTime<Utc>,
    server_name: String,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            content: None,
        }
    }

    /// 以给定状态码与头部构造响应
    pub fn with_headers(code: u16, headers: Vec<(String, String)>) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response.headers = headers;
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn set_content(&mut self, content: Option<Bytes>) -> &mut Self {
        self.content = content;
        self
    }

    /// 403：路径越权，纯文本正文 `Forbidden`
    pub fn forbidden() -> Self {
        let body = "Forbidden";
        let mut response = Self::with_headers(
            403,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), body.len().to_string()),
            ],
        );
        response.content = Some(Bytes::from_static(body.as_bytes()));
        response
    }

    /// 304：去掉所有以 `Content` 开头的头部，不带正文
    pub fn not_modified(headers: &[(String, String)]) -> Self {
        let kept = headers
            .iter()
            .filter(|(name, _)| !name.starts_with("Content"))
            .cloned()
            .collect();
        Self::with_headers(304, kept)
    }

    /// 以 4 空格缩进的 JSON 写出数据
    pub fn send_data<T: Serialize + ?Sized>(data: &T, code: u16) -> Self {
        let body = match to_pretty_json(data) {
            Ok(b) => b,
            Err(e) => {
                error!("无法序列化JSON响应: {}", e);
                return Self::send_error(&format!("Cannot serialize response: {}", e), 500);
            }
        };
        let mut response = Self::with_headers(
            code,
            vec![("content-type".to_string(), JSON_CONTENT_TYPE.to_string())],
        );
        response.content = Some(Bytes::from(body));
        response
    }

    /// JSON 错误响应 `{"error": msg}`
    pub fn send_error(msg: &str, code: u16) -> Self {
        Self::send_data(&json!({ "error": msg }), code)
    }

    /// 兜底的 HTML 状态页
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let content = HtmlBuilder::from_status_code(code, note).build();
        let bytes = Bytes::from(content);
        let mut response = Self::with_headers(
            code,
            vec![
                ("Content-Type".to_string(), "text/html; charset=UTF-8".to_string()),
                ("Content-Length".to_string(), bytes.len().to_string()),
            ],
        );
        response.content = Some(bytes);
        response
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "HTTP/{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        if self.header("Date").is_none() {
            header.push_str(&format!("Date: {}{}", http_date(&self.date), CRLF));
        }
        header.push_str(&format!("Server: {}{}", self.server_name, CRLF));
        header.push_str(&format!("Connection: close{}", CRLF));
        header.push_str(CRLF);
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => &c[..],
                None => &[][..],
            },
        ]
        .concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 大小写不敏感地查找头部
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// 正文按 UTF-8 解析为 JSON，测试与调试使用
    pub fn json(&self) -> Option<serde_json::Value> {
        self.content
            .as_ref()
            .and_then(|c| serde_json::from_slice(c).ok())
    }
}

fn to_pretty_json<T: Serialize + ?Sized>(data: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut ser)?;
    Ok(buf)
}
