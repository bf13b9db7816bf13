//! # ResourceStore
//!
//! 静态资源处理器与 Tunnel 通道都依赖的外部协作者：
//! - 把逻辑 URL 路径解析为编译后的资源内容与文件元数据；
//! - 把抽象的组件 instance 展开为面向某个运行时（client/server）的具体描述。
//!
//! 本模块定义该能力集的 trait，并提供基于文件系统的实现 [`FsResourceStore`]。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    config::{Config, StaticHandling},
    exception::Exception,
};

/// 资源索引中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    /// 逻辑 URL 路径，同时是 CacheTable 的键
    pub url: String,
    /// 源文件位置
    pub source: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceStat {
    pub mtime: SystemTime,
    pub size: u64,
}

/// 编译后的资源：正文与源文件元数据
#[derive(Debug, Clone)]
pub struct CompiledResource {
    pub body: Bytes,
    pub stat: ResourceStat,
}

/// 对组件的抽象引用：`{base: "type[:name]"}` 或 `{type: "type"}`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InstanceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InstanceRef {
    pub fn from_base(base: &str) -> Self {
        Self {
            base: Some(base.to_string()),
            ..Default::default()
        }
    }

    pub fn from_type(instance_type: &str) -> Self {
        Self {
            instance_type: Some(instance_type.to_string()),
            ..Default::default()
        }
    }
}

/// 与请求上下文相关的应用配置
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub tunnel_prefix: String,
    pub static_handling: StaticHandling,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// 已知资源索引：URL 路径 -> 资源
    fn all_resources(&self) -> HashMap<String, ResourceDescriptor>;

    async fn resource_compiled(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<CompiledResource, Exception>;

    fn static_app_config(&self) -> StaticHandling;

    fn app_config(&self, context: &Map<String, Value>) -> AppConfig;

    /// 按 `context.runtime` 展开 instance
    async fn expand_instance(
        &self,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception>;

    /// 面向指定运行时（`client`/`server`）展开 instance
    async fn expand_instance_for_env(
        &self,
        env: &str,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception>;
}

/// 基于文件系统的 ResourceStore。
///
/// - `www_root` 下的每个普通文件以 `<static prefix>/<相对路径>` 登记到索引；
/// - 组件定义位于 `<specs_root>/<type>/definition.json`，
///   具名配置位于 `<specs_root>/<type>/specs/<name>.json`。
pub struct FsResourceStore {
    config: Config,
    resources: HashMap<String, ResourceDescriptor>,
}

impl FsResourceStore {
    pub fn new(config: &Config) -> Self {
        let root = Path::new(config.www_root());
        let prefix = &config.static_handling().prefix;
        let mut resources = HashMap::new();
        if root.is_dir() {
            index_dir(root, root, prefix, &mut resources);
        } else {
            warn!("www_root {} 不是目录，静态资源索引为空", root.display());
        }
        debug!("静态资源索引完成，共{}项", resources.len());
        Self {
            config: config.clone(),
            resources,
        }
    }

    fn specs_root(&self) -> &Path {
        Path::new(self.config.specs_root())
    }
}

fn index_dir(
    root: &Path,
    dir: &Path,
    prefix: &str,
    out: &mut HashMap<String, ResourceDescriptor>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("无法读取目录{}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            index_dir(root, &path, prefix, out);
            continue;
        }
        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let url = format!("{}/{}", prefix, segments.join("/"));
        out.insert(
            url.clone(),
            ResourceDescriptor {
                url,
                source: path,
            },
        );
    }
}

/// 读取可选的 JSON 文件：不存在返回 `None`，内容非法返回错误
async fn read_json_optional(path: &Path) -> Result<Option<Value>, Exception> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Exception::ExpansionFailure(format!("invalid JSON in {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Exception::ExpansionFailure(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

/// 浅合并：`overlay` 中的字段覆盖 `target`
fn merge_object(target: &mut Map<String, Value>, overlay: Option<&Value>) {
    if let Some(Value::Object(o)) = overlay {
        for (k, v) in o {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl ResourceStore for FsResourceStore {
    fn all_resources(&self) -> HashMap<String, ResourceDescriptor> {
        self.resources.clone()
    }

    async fn resource_compiled(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<CompiledResource, Exception> {
        let metadata = tokio::fs::metadata(&resource.source).await.map_err(|e| {
            Exception::StoreReadFailure(format!("{}: {}", resource.source.display(), e))
        })?;
        let mtime = metadata.modified().map_err(|e| {
            Exception::StoreReadFailure(format!("{}: {}", resource.source.display(), e))
        })?;
        let body = tokio::fs::read(&resource.source).await.map_err(|e| {
            Exception::StoreReadFailure(format!("{}: {}", resource.source.display(), e))
        })?;
        Ok(CompiledResource {
            body: Bytes::from(body),
            stat: ResourceStat {
                mtime,
                size: metadata.len(),
            },
        })
    }

    fn static_app_config(&self) -> StaticHandling {
        self.config.static_handling().clone()
    }

    fn app_config(&self, _context: &Map<String, Value>) -> AppConfig {
        AppConfig {
            tunnel_prefix: self.config.tunnel_prefix().to_string(),
            static_handling: self.config.static_handling().clone(),
        }
    }

    async fn expand_instance(
        &self,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception> {
        let env = context
            .get("runtime")
            .and_then(|r| r.as_str())
            .unwrap_or("server")
            .to_string();
        self.expand_instance_for_env(&env, instance, context).await
    }

    async fn expand_instance_for_env(
        &self,
        env: &str,
        instance: &InstanceRef,
        context: &Map<String, Value>,
    ) -> Result<Value, Exception> {
        let (type_name, spec_name) = match (&instance.base, &instance.instance_type) {
            (Some(base), _) => match base.split_once(':') {
                Some((t, n)) => (t.to_string(), Some(n.to_string())),
                None => (base.clone(), Some("default".to_string())),
            },
            (None, Some(t)) => (t.clone(), None),
            (None, None) => {
                return Err(Exception::ExpansionFailure(
                    "instance has neither base nor type".to_string(),
                ))
            }
        };
        if !valid_name(&type_name) || !spec_name.as_deref().map_or(true, valid_name) {
            return Err(Exception::ExpansionFailure(format!(
                "invalid instance name: {:?}",
                instance
            )));
        }

        let type_dir = self.specs_root().join(&type_name);
        if !tokio::fs::metadata(&type_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(Exception::ExpansionFailure(format!(
                "unknown type: {}",
                type_name
            )));
        }

        let definition = read_json_optional(&type_dir.join("definition.json"))
            .await?
            .unwrap_or_else(|| json!({}));

        let spec = match &spec_name {
            Some(name) => {
                let path = type_dir.join("specs").join(format!("{}.json", name));
                match read_json_optional(&path).await? {
                    Some(v) => v,
                    None if name == "default" => json!({}),
                    None => {
                        return Err(Exception::ExpansionFailure(format!(
                            "no spec {}:{}",
                            type_name, name
                        )))
                    }
                }
            }
            None => json!({}),
        };

        let mut config = Map::new();
        merge_object(&mut config, definition.get("config"));
        merge_object(&mut config, spec.get("config"));
        merge_object(&mut config, instance.extra.get("config"));

        let mut expanded = Map::new();
        expanded.insert("type".to_string(), Value::String(type_name));
        if let Some(base) = &instance.base {
            expanded.insert("base".to_string(), Value::String(base.clone()));
        }
        if let Some(name) = spec_name {
            expanded.insert("name".to_string(), Value::String(name));
        }
        expanded.insert("env".to_string(), Value::String(env.to_string()));
        expanded.insert("config".to_string(), Value::Object(config));
        expanded.insert("definition".to_string(), definition);
        expanded.insert("context".to_string(), Value::Object(context.clone()));
        Ok(Value::Object(expanded))
    }
}
