//! # 条件请求校验
//!
//! 实现 HTTP 条件 GET 的新鲜度判定：`If-None-Match` 与 `ETag` 比较优先，
//! 其次比较 `If-Modified-Since` 与 `Last-Modified`。
//! 另外提供 ETag 的生成与 HTTP 日期的格式化/解析。

use std::time::SystemTime;

use chrono::prelude::*;

use crate::request::Request;

/// `Tue, 14 Nov 2023 22:13:20 GMT`
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
/// `Tuesday, 14-Nov-23 22:13:20 GMT`
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
/// `Tue Nov 14 22:13:20 2023`
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// 判断资源相对于客户端缓存是否已修改。
///
/// 返回 `false` 表示可以回复 304。无法解析的 `If-Modified-Since` 视为不存在。
pub fn is_modified(request: &Request, headers: &[(String, String)]) -> bool {
    let etag = find_header(headers, "ETag");
    if let (Some(none_match), Some(etag)) = (request.header("if-none-match"), etag) {
        if none_match == etag {
            return false;
        }
    }

    let last_modified = find_header(headers, "Last-Modified");
    if let (Some(since), Some(last_modified)) = (request.header("if-modified-since"), last_modified)
    {
        if let Some(since) = parse_http_date(since) {
            match parse_http_date(last_modified) {
                Some(last) if last <= since => return false,
                _ => {}
            }
        }
    }

    true
}

/// ETag 形如 `<长度>-<mtime 毫秒>`，只依赖正文长度与源文件修改时间。
///
/// 使用正文长度而不是文件大小，因为正文可能是编译后的内容。
pub fn etag(body_len: usize, mtime: SystemTime) -> String {
    format!("{}-{}", body_len, DateTime::<Utc>::from(mtime).timestamp_millis())
}

pub fn http_date(date: &DateTime<Utc>) -> String {
    date.format(IMF_FIXDATE).to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    for format in [IMF_FIXDATE, RFC850_DATE, ASCTIME_DATE] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
