// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 异步 Web 服务器
//!
//! 基于 Tokio 运行时的多线程服务器，处理管线为：
//! - 路由插件（请求体、Cookie 解析）
//! - Tunnel 通道（RPC 改写、spec/类型定义查询）
//! - 带条件 GET 与内存缓存的静态资源处理器
//!
//! 另有后台管理控制台（stop/status/help/clear 指令）。

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
    sync::Notify,
};

use tunnelweb::{
    server::{build_router, handle_connection},
    CacheTable, Config, Exception, FsResourceStore, ResourceStore,
};

fn main() {
    // 1. 初始化日志系统：优先读取 YAML 配置，失败时退回到只输出到控制台的配置
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        init_console_logger();
        warn!("无法载入config/log4rs.yaml（{}），日志仅输出到控制台", e);
    }

    // 2. 环境配置加载
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/development.toml".to_string());
    let config = match Config::from_toml(&config_path) {
        Ok(c) => {
            info!("配置文件{}已载入", config_path);
            c
        }
        Err(e) => {
            error!("无法从配置文件构建配置对象：{}，使用默认配置", e);
            Config::new()
        }
    };

    // 3. 按配置的工作线程数构建运行时
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        error!("服务器异常退出：{}", e);
        std::process::exit(1);
    }
}

fn init_console_logger() {
    let stdout = ConsoleAppender::builder().build();
    let built = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match built {
        Ok(c) => {
            if let Err(e) = log4rs::init_config(c) {
                eprintln!("无法初始化日志系统：{}", e);
            }
        }
        Err(e) => eprintln!("无法构建日志配置：{}", e),
    }
}

async fn serve(config: Config) -> Result<(), Exception> {
    info!("www root: {}, specs root: {}", config.www_root(), config.specs_root());

    // 共享资源：缓存表由静态处理器与管理控制台共同持有
    let cache = Arc::new(CacheTable::new());
    let store: Arc<dyn ResourceStore> = Arc::new(FsResourceStore::new(&config));
    let router = Arc::new(build_router(&config, store, Arc::clone(&cache))?);
    let max_body_size = config.max_body_size();

    let port: u16 = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = TcpListener::bind(socket).await.map_err(|e| {
        Exception::InvalidConfig(format!("无法绑定{}：{}", socket, e))
    })?;
    info!("服务端已在{}上监听", socket);

    let shutdown = Arc::new(Notify::new());
    let stopping = Arc::new(AtomicBool::new(false));
    let active_connection = Arc::new(AtomicU32::new(0));

    // 后台管理控制台，不阻塞监听循环
    tokio::spawn(admin_console(
        Arc::clone(&shutdown),
        Arc::clone(&stopping),
        Arc::clone(&active_connection),
        Arc::clone(&cache),
    ));

    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        debug!("[ID{}]新的连接：{}", id, addr);

        let router = Arc::clone(&router);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, &router, max_body_size).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
    Ok(())
}

async fn admin_console(
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    active_connection: Arc<AtomicU32>,
    cache: Arc<CacheTable>,
) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let mut words = input.split_whitespace();
        match (words.next(), words.next()) {
            (Some("stop"), _) => {
                stopping.store(true, Ordering::SeqCst);
                shutdown.notify_one();
                println!("停机指令已激活，服务器将停止接受新连接...");
                break;
            }
            (Some("help"), _) => {
                println!("== Tunnelweb Help ==");
                println!("stop         - 发出停机信号");
                println!("status       - 查看当前服务器运行状态");
                println!("clear [path] - 清空静态资源缓存，或只清除指定路径");
                println!("help         - 显示此帮助信息");
                println!("====================");
            }
            (Some("status"), _) => {
                println!("== Tunnelweb 状态 ==");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!("缓存条目数: {}", cache.len());
                println!("====================");
            }
            (Some("clear"), key) => {
                cache.clear(key);
                match key {
                    Some(k) => println!("已清除缓存：{}", k),
                    None => println!("已清空全部缓存"),
                }
            }
            (None, _) => {}
            (Some(cmd), _) => println!("无效的命令：{}", cmd),
        }
    }
}
