//! # Tunnel 通道
//!
//! 客户端执行环境通过单个 HTTP 端点调用服务端的组件解析与 RPC 分发。
//! 客户端 store 发出的请求带有 `x-mojito-header: tunnel` 标记头，
//! 该标记告诉服务器不要按普通 URL 路由这个请求，而是交给这里处理。
//!
//! 注册三条路由：
//! - `<tunnel_prefix>`：RPC，把 Tunnel 指令改写为交给 `tunnelProxy` 的内部指令后放行；
//! - `<static_prefix>/:type/specs/:basename`：查询具名 spec；
//! - `<static_prefix>/:type/definition.json`：查询类型定义。
//!
//! 三个处理器共用同一个守卫：没有标记头（RPC 还要求 `POST`）时立即放行，不再执行后续逻辑。

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    exception::Exception,
    param::{HttpRequestMethod, TUNNEL_PROXY_BASE},
    request::Request,
    response::Response,
    router::{Flow, Handler, Router},
    store::{InstanceRef, ResourceStore},
    util::{normalize_prefix, strip_extension},
};

const LOG_TARGET: &str = "Tunnel";

/// 客户端经 RPC 路径发来的指令
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TunnelCommand {
    #[serde(default)]
    pub action: String,
    pub instance: InstanceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// instance 已被 store 展开的 Tunnel 指令
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProxyCommand {
    pub action: String,
    pub instance: Value,
    pub context: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProxyBody {
    #[serde(rename = "proxyCommand")]
    pub proxy_command: ProxyCommand,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstructionParams {
    pub body: ProxyBody,
}

/// 交给下游调度器的内部指令，目标组件固定为 `tunnelProxy`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RewrittenInstruction {
    pub action: String,
    pub instance: InstanceRef,
    pub params: InstructionParams,
    pub context: Map<String, Value>,
}

impl RewrittenInstruction {
    fn proxy(command: ProxyCommand) -> Self {
        Self {
            action: command.action.clone(),
            instance: InstanceRef::from_base(TUNNEL_PROXY_BASE),
            context: command.context.clone(),
            params: InstructionParams {
                body: ProxyBody {
                    proxy_command: command,
                },
            },
        }
    }

    pub fn proxy_command(&self) -> &ProxyCommand {
        &self.params.body.proxy_command
    }
}

fn not_found(request: &Request) -> Flow {
    Flow::Respond(Response::send_error(
        &format!("Not found: {}", request.url()),
        500,
    ))
}

fn error_opening(request: &Request, e: &Exception) -> Flow {
    warn!(target: LOG_TARGET, "[ID{}]Error opening: {} ({})", request.id(), request.url(), e);
    Flow::Respond(Response::send_error(
        &format!("Error opening: {}\n{}", request.url(), e),
        500,
    ))
}

/// 面向 client 运行时展开 instance 并以 JSON 返回
async fn expand_for_client(
    store: &dyn ResourceStore,
    request: &Request,
    instance: InstanceRef,
) -> Flow {
    match store
        .expand_instance_for_env("client", &instance, request.context())
        .await
    {
        Ok(data) => Flow::Respond(Response::send_data(&data, 200)),
        Err(e) => error_opening(request, &e),
    }
}

pub struct SpecHandler {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl Handler for SpecHandler {
    async fn handle(&self, request: &mut Request) -> Flow {
        if !request.is_tunnel() {
            return Flow::Next;
        }

        let instance_type = request.param("type").unwrap_or("");
        let name = strip_extension(request.param("basename").unwrap_or(""));
        if instance_type.is_empty() || name.is_empty() {
            return not_found(request);
        }

        let mut base = instance_type.to_string();
        if name != "default" {
            base.push(':');
            base.push_str(name);
        }
        debug!(target: LOG_TARGET, "[ID{}]spec lookup: {}", request.id(), base);
        expand_for_client(self.store.as_ref(), request, InstanceRef::from_base(&base)).await
    }
}

pub struct TypeHandler {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl Handler for TypeHandler {
    async fn handle(&self, request: &mut Request) -> Flow {
        if !request.is_tunnel() {
            return Flow::Next;
        }

        let instance_type = request.param("type").unwrap_or("");
        if instance_type.is_empty() {
            return not_found(request);
        }

        debug!(target: LOG_TARGET, "[ID{}]type lookup: {}", request.id(), instance_type);
        let instance = InstanceRef::from_type(instance_type);
        expand_for_client(self.store.as_ref(), request, instance).await
    }
}

pub struct RpcHandler {
    store: Arc<dyn ResourceStore>,
}

impl RpcHandler {
    /// 优先使用 BodyParser 的结果，没有挂载时直接解析原始请求体
    fn read_command(request: &Request) -> Result<TunnelCommand, Exception> {
        let body = match request.parsed_body() {
            Some(v) => v.clone(),
            None if request.body().is_empty() => {
                return Err(Exception::MalformedTunnelRequest("missing body".to_string()))
            }
            None => serde_json::from_slice(request.body())
                .map_err(|e| Exception::MalformedTunnelRequest(e.to_string()))?,
        };
        serde_json::from_value(body).map_err(|e| Exception::MalformedTunnelRequest(e.to_string()))
    }
}

#[async_trait]
impl Handler for RpcHandler {
    async fn handle(&self, request: &mut Request) -> Flow {
        if !request.is_tunnel() || request.method() != HttpRequestMethod::Post {
            return Flow::Next;
        }

        let command = match Self::read_command(request) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: LOG_TARGET, "[ID{}]{}", request.id(), e);
                return Flow::Respond(Response::send_error(&e.to_string(), 500));
            }
        };

        // 指令已进入服务端运行时，客户端上下文中的 runtime 必须改写
        let mut context = command.context.unwrap_or_default();
        context.insert("runtime".to_string(), Value::String("server".to_string()));

        let expanded = match self.store.expand_instance(&command.instance, &context).await {
            Ok(inst) => inst,
            Err(e) => return error_opening(request, &e),
        };

        debug!(
            target: LOG_TARGET,
            "[ID{}]tunnel rpc {} delegated to {}",
            request.id(),
            command.action,
            TUNNEL_PROXY_BASE
        );
        request.set_command(RewrittenInstruction::proxy(ProxyCommand {
            action: command.action,
            instance: expanded,
            context,
            extra: command.extra,
        }));
        Flow::Next
    }
}

/// 在路由上注册 Tunnel 处理器
pub struct TunnelBridge {
    tunnel_prefix: String,
    static_prefix: String,
}

impl TunnelBridge {
    pub fn new(router: &mut Router, store: Arc<dyn ResourceStore>) -> Result<Self, Exception> {
        let app_config = store.app_config(&Map::new());
        let tunnel_prefix = normalize_prefix(&app_config.tunnel_prefix);
        let static_prefix = normalize_prefix(&app_config.static_handling.prefix);

        if !tunnel_prefix.is_empty() {
            router.route(
                &tunnel_prefix,
                Arc::new(RpcHandler {
                    store: Arc::clone(&store),
                }),
            )?;
        }
        if !static_prefix.is_empty() {
            router.route(
                &format!("{}/:type/specs/:basename", static_prefix),
                Arc::new(SpecHandler {
                    store: Arc::clone(&store),
                }),
            )?;
            router.route(
                &format!("{}/:type/definition.json", static_prefix),
                Arc::new(TypeHandler { store }),
            )?;
        }

        Ok(Self {
            tunnel_prefix,
            static_prefix,
        })
    }

    pub fn tunnel_prefix(&self) -> &str {
        &self.tunnel_prefix
    }

    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }
}
