//! # 路由
//!
//! 路由由一组按注册顺序执行的阶段组成：
//! - `route(pattern, handler)` 注册带路径模式的阶段，模式中的 `:name` 匹配一个路径段；
//! - `use_handler(handler)` 注册不带模式的阶段（中间件）。
//!
//! 每个阶段返回 [`Flow`]：`Respond` 与 `Fail` 终止分发，`Next` 交给下一个阶段。
//! 第一个阶段之前，已挂载的 [`RouteAddon`] 依次预处理请求。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::{
    addons::RouteAddon, exception::Exception, request::Request, response::Response,
};

/// 处理器的结果
#[derive(Debug)]
pub enum Flow {
    /// 已在此处处理，写回该响应
    Respond(Response),
    /// 放行，交给下一个阶段
    Next,
    /// 带错误放行，分发终止
    Fail(Exception),
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &mut Request) -> Flow;
}

/// 编译后的路径模式
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Result<Self, Exception> {
        let mut expr = String::from("^");
        let mut names = Vec::new();
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            expr.push('/');
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    expr.push_str("([^/]+)");
                    names.push(name.to_string());
                }
                _ => expr.push_str(&regex::escape(segment)),
            }
        }
        expr.push_str("/?$");
        let regex = Regex::new(&expr)
            .map_err(|e| Exception::InvalidConfig(format!("bad route {}: {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    /// 匹配成功时返回命名段解码后的值，解码结果不是合法 UTF-8 时视为不匹配
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::new();
        for (i, name) in self.names.iter().enumerate() {
            if let Some(m) = captures.get(i + 1) {
                let value = percent_decode_str(m.as_str()).decode_utf8().ok()?;
                params.insert(name.clone(), value.into_owned());
            }
        }
        Some(params)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

struct Stage {
    pattern: Option<RoutePattern>,
    handler: Arc<dyn Handler>,
}

pub struct Router {
    addons: Vec<Box<dyn RouteAddon>>,
    stages: Vec<Stage>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            addons: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn route(&mut self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), Exception> {
        let pattern = RoutePattern::new(pattern)?;
        debug!("注册路由: {}", pattern.source());
        self.stages.push(Stage {
            pattern: Some(pattern),
            handler,
        });
        Ok(())
    }

    pub fn use_handler(&mut self, handler: Arc<dyn Handler>) {
        self.stages.push(Stage {
            pattern: None,
            handler,
        });
    }

    pub fn attach(&mut self, addon: Box<dyn RouteAddon>) {
        debug!("挂载路由插件: {}", addon.name());
        self.addons.push(addon);
    }

    /// 已注册的路由模式，按注册顺序
    pub fn patterns(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(|s| s.pattern.as_ref().map(|p| p.source()))
            .collect()
    }

    pub async fn dispatch(&self, request: &mut Request) -> Flow {
        for addon in &self.addons {
            if let Err(e) = addon.prepare(request) {
                warn!("[ID{}]路由插件{}处理失败: {}", request.id(), addon.name(), e);
                return Flow::Fail(e);
            }
        }

        for stage in &self.stages {
            if let Some(pattern) = &stage.pattern {
                match pattern.matches(request.path()) {
                    Some(params) => request.set_params(params),
                    None => continue,
                }
            }
            match stage.handler.handle(request).await {
                Flow::Next => continue,
                other => return other,
            }
        }
        Flow::Next
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
