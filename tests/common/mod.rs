//! 集成测试共用的内存 ResourceStore

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};

use tunnelweb::{
    store::{AppConfig, CompiledResource, ResourceDescriptor, ResourceStat},
    CacheTable, Exception, InstanceRef, ResourceStore, Router, StaticAssetHandler,
    StaticHandling, TunnelBridge,
};

/// 一次 expand 调用：(运行时, instance, 上下文)
pub type ExpandCall = (Option<String>, InstanceRef, Map<String, Value>);

pub const MTIME_MILLIS: u64 = 1_700_000_000_000;

pub struct FakeStore {
    pub options: StaticHandling,
    pub tunnel_prefix: String,
    pub files: HashMap<String, Bytes>,
    pub fail_reads: bool,
    pub expanded: Result<Value, Exception>,
    pub reads: AtomicUsize,
    pub expand_calls: Mutex<Vec<ExpandCall>>,
}

impl FakeStore {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert("/static/app.css".to_string(), Bytes::from("1234567890"));
        files.insert("/static/app.js".to_string(), Bytes::from("console.log(1);"));
        Self {
            options: StaticHandling::default(),
            tunnel_prefix: "/tunnel".to_string(),
            files,
            fail_reads: false,
            expanded: Ok(json!({ "type": "widget", "config": { "limit": 3 } })),
            reads: AtomicUsize::new(0),
            expand_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn mtime() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(MTIME_MILLIS)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ExpandCall> {
        self.expand_calls.lock().unwrap().clone()
    }

    fn record(&self, env: Option<&str>, instance: &InstanceRef, context: &Map<String, Value>) {
        self.expand_calls.lock().unwrap().push((
            env.map(|e| e.to_string()),
            instance.clone(),
            context.clone(),
        ));
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    fn all_resources(&self) -> HashMap<String, ResourceDescriptor> {
        self.files
            .keys()
            .map(|url| {
                (
                    url.clone(),
                    ResourceDescriptor {
                        url: url.clone(),
                        source: PathBuf::from(url.trim_start_matches('/')),
                    },
                )
            })
            .collect()
    }

    async fn resource_compiled(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<CompiledResource, Exception> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(Exception::StoreReadFailure(resource.url.clone()));
        }
        let body = self.files[&resource.url].clone();
        Ok(CompiledResource {
            stat: ResourceStat {
                mtime: Self::mtime(),
                size: body.len() as u64,
            },
            body,
        })
    }

    fn static_app_config(&self) -> StaticHandling {
        self.options.clone()
    }

    fn app_config(&self, _context: &Map<String, Value>) -> AppConfig {
        AppConfig {
            tunnel_prefix: self.tunnel_prefix.clone(),
            static_handling: self.options.clone(),
        }
    }

    async fn expand_instance(
        &self,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception> {
        self.record(None, instance, context);
        self.expanded.clone()
    }

    async fn expand_instance_for_env(
        &self,
        env: &str,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception> {
        self.record(Some(env), instance, context);
        self.expanded.clone()
    }
}

/// 按服务器的默认顺序组装：Tunnel 路由 -> 静态资源
pub fn pipeline(store: Arc<FakeStore>) -> (Router, Arc<CacheTable>) {
    let cache = Arc::new(CacheTable::new());
    let mut router = Router::new();
    TunnelBridge::new(&mut router, store.clone()).unwrap();
    router.use_handler(Arc::new(StaticAssetHandler::new(store, Arc::clone(&cache))));
    (router, cache)
}
