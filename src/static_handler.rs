//! # 静态资源处理器
//!
//! 只回答 ResourceStore 索引中已知路径的 `GET`/`HEAD` 请求：
//! 1. 其他方法直接放行；
//! 2. 含 `..` 的路径返回 403；
//! 3. 索引中不存在的路径放行；
//! 4. 启用缓存且命中时直接使用缓存记录，否则向 store 读取编译后的内容并构建响应头；
//! 5. 未启用 `force_update` 时做条件请求校验，可能返回 304。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::prelude::*;
use log::{debug, warn};

use crate::{
    cache::{CacheRecord, CacheTable},
    config::StaticHandling,
    param::{charset_for, mime_for, HttpRequestMethod},
    request::Request,
    response::Response,
    router::{Flow, Handler},
    store::{CompiledResource, ResourceDescriptor, ResourceStore},
    util::collapse_slashes,
    validator::{etag, http_date, is_modified},
};

const LOG_TARGET: &str = "StaticHandler";

pub struct StaticAssetHandler {
    store: Arc<dyn ResourceStore>,
    cache: Arc<CacheTable>,
    options: StaticHandling,
    /// 构造时从 store 取得的已知资源索引
    urls: HashMap<String, ResourceDescriptor>,
}

impl StaticAssetHandler {
    pub fn new(store: Arc<dyn ResourceStore>, cache: Arc<CacheTable>) -> Self {
        let options = store.static_app_config();
        let urls = store.all_resources();
        Self {
            store,
            cache,
            options,
            urls,
        }
    }

    pub fn cache(&self) -> &Arc<CacheTable> {
        &self.cache
    }

    /// 由编译结果构建响应头
    fn build_headers(&self, path: &str, compiled: &CompiledResource) -> Vec<(String, String)> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let mime = mime_for(extension);
        let content_type = match charset_for(mime) {
            Some(charset) => format!("{}; charset={}", mime, charset),
            None => mime.to_string(),
        };
        let last_modified = if self.options.force_update {
            Utc::now()
        } else {
            DateTime::<Utc>::from(compiled.stat.mtime)
        };
        vec![
            ("Content-Type".to_string(), content_type),
            ("Content-Length".to_string(), compiled.body.len().to_string()),
            ("Last-Modified".to_string(), http_date(&last_modified)),
            (
                "Cache-Control".to_string(),
                format!("public max-age={}", self.options.max_age_seconds()),
            ),
            (
                "ETag".to_string(),
                etag(compiled.body.len(), compiled.stat.mtime),
            ),
        ]
    }

    fn serve(&self, request: &Request, path: &str, hit: &CacheRecord) -> Response {
        if !self.options.force_update && !is_modified(request, &hit.headers) {
            debug!(target: LOG_TARGET, "[ID{}]{} was not modified", request.id(), path);
            return Response::not_modified(&hit.headers);
        }
        let mut response = Response::with_headers(200, hit.headers.clone());
        if request.method() != HttpRequestMethod::Head {
            response.set_content(Some(hit.body.clone()));
        }
        response
    }
}

#[async_trait]
impl Handler for StaticAssetHandler {
    async fn handle(&self, request: &mut Request) -> Flow {
        let method = request.method();
        if method != HttpRequestMethod::Get && method != HttpRequestMethod::Head {
            return Flow::Next;
        }

        let path = collapse_slashes(request.path());
        if path.contains("..") {
            return Flow::Respond(Response::forbidden());
        }

        debug!(target: LOG_TARGET, "[ID{}]serving static path: {}", request.id(), path);

        let resource = match self.urls.get(&path) {
            Some(r) => r,
            None => return Flow::Next,
        };

        if self.options.cache {
            if let Some(hit) = self.cache.get(&path) {
                debug!(target: LOG_TARGET, "[ID{}]{} was read from cache", request.id(), path);
                return Flow::Respond(self.serve(request, &path, &hit));
            }
        }

        let compiled = match self.store.resource_compiled(resource).await {
            Ok(c) => c,
            Err(e) => {
                warn!(target: LOG_TARGET, "[ID{}]err serving: {} ({})", request.id(), path, e);
                return Flow::Fail(e);
            }
        };

        let record = CacheRecord {
            headers: self.build_headers(&path, &compiled),
            body: compiled.body,
        };
        if self.options.cache {
            self.cache.insert(&path, record.clone());
        }

        debug!(target: LOG_TARGET, "[ID{}]{} was read from disk", request.id(), path);
        Flow::Respond(self.serve(request, &path, &record))
    }
}
