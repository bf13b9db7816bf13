//! 路由插件：在分发前预处理请求（解析请求体、解析 Cookie）。

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{exception::Exception, request::Request};

pub trait RouteAddon: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, request: &mut Request) -> Result<(), Exception>;
}

/// 按插件名构造，名称已在配置校验时检查过
pub fn from_name(name: &str) -> Option<Box<dyn RouteAddon>> {
    match name {
        "body" => Some(Box::new(BodyParser)),
        "cookie" => Some(Box::new(CookieParser)),
        _ => None,
    }
}

/// 解析 JSON 与表单请求体
pub struct BodyParser;

impl RouteAddon for BodyParser {
    fn name(&self) -> &'static str {
        "body"
    }

    fn prepare(&self, request: &mut Request) -> Result<(), Exception> {
        if request.body().is_empty() {
            return Ok(());
        }
        let mime = request
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_lowercase())
            .unwrap_or_default();

        let parsed = match mime.as_str() {
            "application/json" => serde_json::from_slice::<Value>(request.body())
                .map_err(|e| Exception::MalformedBody(e.to_string()))?,
            "application/x-www-form-urlencoded" => {
                let mut form = Map::new();
                for (key, value) in url::form_urlencoded::parse(request.body()) {
                    form.insert(key.into_owned(), Value::String(value.into_owned()));
                }
                Value::Object(form)
            }
            _ => return Ok(()),
        };
        request.set_parsed_body(parsed);
        Ok(())
    }
}

/// 把 `Cookie` 头解析为键值表
pub struct CookieParser;

impl RouteAddon for CookieParser {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn prepare(&self, request: &mut Request) -> Result<(), Exception> {
        let cookies: HashMap<String, String> = match request.header("cookie") {
            Some(raw) => raw
                .split(';')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
            None => return Ok(()),
        };
        request.set_cookies(cookies);
        Ok(())
    }
}
