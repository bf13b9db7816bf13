use lazy_static::lazy_static;
use regex::Regex;

use crate::param::STATUS_CODES;

lazy_static! {
    static ref RX_MULTI_SLASH: Regex = Regex::new(r"/+").unwrap();
}

/// 合并路径中连续的 `/`
pub fn collapse_slashes(path: &str) -> String {
    RX_MULTI_SLASH.replace_all(path, "/").into_owned()
}

/// 规范化路由前缀：补齐开头的 `/`，合并连续的 `/`，去掉末尾的 `/`。
///
/// `""` 与 `"/"` 规范化后都是空串，表示禁用对应路由。
pub fn normalize_prefix(prefix: &str) -> String {
    let mut normalized = collapse_slashes(&format!("/{}", prefix));
    if normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// 去掉文件名最后一段扩展名：`widget.json` -> `widget`，`a.b.json` -> `a.b`。
///
/// 没有扩展名时返回空串，调用方据此判定名字缺失。
pub fn strip_extension(basename: &str) -> &str {
    match basename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => "",
    }
}

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}
