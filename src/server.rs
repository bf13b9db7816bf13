//! # 连接处理
//!
//! 从字节流读取一个完整请求，交给 [`Router`] 分发，再把 [`Flow`] 落成最终响应写回。
//! 与具体的 socket 类型无关，监听循环传入 `TcpStream`，测试可以传入内存管道。

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    addons,
    cache::CacheTable,
    config::Config,
    exception::Exception,
    request::{find_head_end, Request},
    response::Response,
    router::{Flow, Router},
    static_handler::StaticAssetHandler,
    store::ResourceStore,
    tunnel::TunnelBridge,
};

/// 请求头的最大长度
pub const MAX_HEAD_SIZE: usize = 65536;

/// 组装处理管线：插件 -> Tunnel 路由 -> 静态资源
pub fn build_router(
    config: &Config,
    store: Arc<dyn ResourceStore>,
    cache: Arc<CacheTable>,
) -> Result<Router, Exception> {
    let mut router = Router::new();
    for name in config.route_addons() {
        match addons::from_name(name) {
            Some(addon) => router.attach(addon),
            None => return Err(Exception::InvalidConfig(format!("unknown route addon: {}", name))),
        }
    }
    let bridge = TunnelBridge::new(&mut router, Arc::clone(&store))?;
    info!(
        "Tunnel路由已注册：tunnel_prefix='{}', static_prefix='{}'",
        bridge.tunnel_prefix(),
        bridge.static_prefix()
    );
    router.use_handler(Arc::new(StaticAssetHandler::new(store, cache)));
    Ok(router)
}

/// 读取完整请求：先读到头部结束，再按 `Content-Length` 读取请求体。
///
/// 连接在发送任何字节之前关闭时返回 `Ok(None)`。
pub async fn read_request<S>(
    stream: &mut S,
    id: u128,
    max_body_size: usize,
) -> Result<Option<Request>, Exception>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(end) = find_head_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(Exception::MalformedRequest("header too large".to_string()));
        }
        match stream.read(&mut chunk).await {
            Ok(0) if buffer.is_empty() => return Ok(None),
            Ok(0) => return Err(Exception::MalformedRequest("unexpected eof".to_string())),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return Ok(None);
            }
        }
    };

    let body_start = head_end + 4;
    let mut request = Request::try_from(&buffer[..body_start], id)?;
    let body_len = request.content_length().unwrap_or(0);
    if body_len > max_body_size {
        return Err(Exception::PayloadTooLarge);
    }
    while buffer.len() < body_start + body_len {
        match stream.read(&mut chunk).await {
            Ok(0) => {
                return Err(Exception::MalformedRequest(
                    "body shorter than Content-Length".to_string(),
                ))
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                error!("[ID{}]读取请求体时遇到错误: {}", id, e);
                return Ok(None);
            }
        }
    }
    request.set_body(Bytes::copy_from_slice(&buffer[body_start..body_start + body_len]));
    Ok(Some(request))
}

/// 把分发结果落成响应。
///
/// 所有阶段都放行时：带有改写后 Tunnel 指令的请求得到 501（没有调度器接手），其余为 404。
pub fn finish(flow: Flow, request: &Request) -> Response {
    match flow {
        Flow::Respond(response) => response,
        Flow::Fail(e) => {
            error!("[ID{}]处理请求时发生异常: {}", request.id(), e);
            Response::from_status_code(e.status_code(), None)
        }
        Flow::Next => match request.command() {
            Some(command) => {
                warn!(
                    "[ID{}]没有可用的调度器处理Tunnel指令{}",
                    request.id(),
                    command.action
                );
                Response::send_error(
                    &format!("No dispatcher for tunnel command {}", command.action),
                    501,
                )
            }
            None => {
                warn!("[ID{}]请求的路径：{} 不存在，返回404", request.id(), request.path());
                Response::from_status_code(404, None)
            }
        },
    }
}

pub async fn handle_connection<S>(stream: &mut S, id: u128, router: &Router, max_body_size: usize)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let start_time = Instant::now();

    let mut request = match read_request(stream, id, max_body_size).await {
        Ok(Some(r)) => r,
        Ok(None) => return,
        Err(e) => {
            warn!("[ID{}]无法读取HTTP请求: {}", id, e);
            let response = Response::from_status_code(e.status_code(), None);
            let _ = stream.write_all(&response.as_bytes()).await;
            let _ = stream.flush().await;
            return;
        }
    };
    debug!("[ID{}]成功解析HTTP请求", id);

    let flow = router.dispatch(&mut request).await;
    let response = finish(flow, &request);

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}",
        id,
        request.version(),
        request.url(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );

    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());
    let _ = stream.write_all(&response_bytes).await;
    let _ = stream.flush().await;
}
