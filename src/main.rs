// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 带缓存的 HTTP/1.0 转发代理
//!
//! 该模块是代理的入口，负责：
//! - 解析命令行参数（监听端口为必填项）
//! - 初始化 log4rs 日志系统与 TOML 配置
//! - 按配置构建多线程 Tokio 运行时
//! - 主事件循环：每接受一个连接就派生一个独立的会话任务
//! - 后台管理控制台（CLI 指令交互）

use cacheproxy::{
    cache::{self, ResponseCache, SharedCache, TagMatch},
    config::Config,
    relay::{handle_connection, SessionOutcome},
    util::format_bytes,
};

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
    sync::Notify,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    process,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

const LOG_CONFIG: &str = "config/log4rs.yaml";

/// 带缓存的 HTTP/1.0 转发代理
#[derive(Parser, Debug)]
#[command(name = "cacheproxy", version, about)]
struct Args {
    /// 监听端口
    port: u16,

    /// 配置文件路径
    #[arg(short, long, default_value = "config/development.toml")]
    config: String,
}

/// # 程序入口点
fn main() {
    // 1. 参数不合法时 clap 会打印用法并以非零状态退出
    let args = Args::parse();

    // 2. 初始化日志系统
    init_logging();

    // 3. 载入配置
    let config = Config::from_toml(&args.config);
    info!("配置文件已载入");

    // 4. 按配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法构建运行时：{}", e);
            process::exit(1);
        }
    };

    runtime.block_on(serve(args.port, config));
    info!("服务端已停止");
}

/// 从 YAML 文件初始化 log4rs，文件不可用时退回控制台输出
fn init_logging() {
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
            )))
            .build();
        let fallback = log4rs::config::Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));
        if let Ok(fallback) = fallback {
            let _ = log4rs::init_config(fallback);
        }
        warn!("无法载入日志配置{}：{}，使用控制台输出", LOG_CONFIG, e);
    }
}

async fn serve(port: u16, config: Config) {
    // 网络层初始化
    let address = match config.local() {
        true => Ipv4Addr::LOCALHOST,
        false => Ipv4Addr::UNSPECIFIED,
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            process::exit(1);
        }
    };
    info!("代理在{}上监听Socket连接", socket);

    // 共享资源：整个进程只有一个缓存实例
    let tag_match = match config.exact_tag_match() {
        true => TagMatch::Exact,
        false => TagMatch::Prefix,
    };
    let cache = ResponseCache::with_limits(
        config.max_object_size(),
        config.max_cache_size(),
        tag_match,
    )
    .shared();
    let config = Arc::new(config);

    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));

    // 启动交互式管理控制台任务
    tokio::spawn(console(
        Arc::clone(&shutdown),
        Arc::clone(&active_connection),
        Arc::clone(&cache),
    ));

    let mut id: u128 = 0;

    // 主事件循环 (Accept Loop)
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接时遇到错误：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]新的连接：{}", id, addr);

        let active_connection = Arc::clone(&active_connection);
        let cache = Arc::clone(&cache);
        let config = Arc::clone(&config);

        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            let start_time = Instant::now();

            let result = handle_connection(stream, id, cache, config).await;
            report(id, result, start_time);

            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

/// 把会话结果写入日志
fn report(
    id: u128,
    result: Result<SessionOutcome, cacheproxy::Exception>,
    start_time: Instant,
) {
    let elapsed = start_time.elapsed().as_millis();
    match result {
        Ok(outcome) => {
            let status = match &outcome {
                SessionOutcome::CacheHit { .. } => "HIT",
                SessionOutcome::Relayed { cached: true, .. } => "MISS, cached",
                SessionOutcome::Relayed { cached: false, .. } => "MISS, not cached",
            };
            info!(
                "[ID{}] {}, {}, {}, {}ms",
                id,
                outcome.tag(),
                status,
                format_bytes(outcome.bytes()),
                elapsed
            );
        }
        Err(e) => {
            warn!("[ID{}]会话终止：{}，用时{}ms", id, e, elapsed);
        }
    }
}

async fn console(shutdown: Arc<Notify>, active_connection: Arc<AtomicU32>, cache: SharedCache) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                shutdown.notify_one();
                println!("停机指令已激活，代理将停止接受新连接...");
                break;
            }
            "help" => {
                println!("== Cacheproxy Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前代理运行状态");
                println!("help   - 显示此帮助信息");
                println!("=====================");
            }
            "status" => {
                let active_count = active_connection.load(Ordering::SeqCst);
                let (len, capacity, total, clock) = {
                    let cache = cache::lock(&cache);
                    (cache.len(), cache.capacity(), cache.total_bytes(), cache.clock())
                };
                println!("== Cacheproxy 状态 ===");
                println!("当前活跃连接数: {}", active_count);
                println!("缓存行: {}/{}", len, capacity);
                println!("缓存大小: {}", format_bytes(total));
                println!("逻辑时钟: {}", clock);
                println!("=====================");
            }
            "" => {}
            cmd => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
