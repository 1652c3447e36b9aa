// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 异步播客订阅服务器
//!
//! 该模块实现了基于 Tokio 运行时的单用途播客服务器。
//! 核心功能包括：
//! - 把 Mixcloud 用户的节目目录转换为 RSS 订阅源
//! - 带 TTL 的内存订阅源缓存
//! - 有界并发的后台媒体下载队列
//! - 从本地媒体目录提供文件（支持 Range 与条件 GET）
//! - 后台管理控制台（CLI 指令交互）

// --- 模块定义 ---
mod cache;      // 订阅源内存缓存
mod config;     // 配置解析与管理
mod exception;  // 自定义异常与错误处理
mod headers;    // HTTP 响应标头构建器
mod mixcloud;   // Mixcloud 页面抓取与解析
mod param;      // 全局常量与静态参数
mod podcast;    // RSS XML 序列化
mod queue;      // 后台下载队列
mod request;    // HTTP 请求报文解析器
mod response;   // 各类资源的响应器
mod server;     // 路由与连接处理
mod util;       // 通用工具函数

use config::Config;
use server::{handle_connection, Context};

use log::{debug, error, info};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{Arc, Mutex},
};

/// # 程序入口点
///
/// 初始化日志与配置，按配置构建运行时并启动主事件循环。
fn main() {
    // 1. 初始化日志系统：采用 log4rs 异步日志架构，通过外部 YAML 灵活配置级别与输出目的地
    log4rs::init_file("config/log4rs.yaml", Default::default()).unwrap();

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("媒体目录: {}", config.music_dir());

    // 3. 异步运行时定制：根据配置文件动态分配工作线程数
    let worker_threads = config.worker_threads();
    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(run(config));
}

/// 绑定端口、启动控制台任务并运行 Accept 循环。
async fn run(config: Config) {
    // 网络层初始化：
    // 支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let port: u16 = config.port();
    info!("服务端将在{}端口上监听Socket连接", port);
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}地址上监听Socket连接", address);
    let socket = SocketAddrV4::new(address, port);

    // 共享资源初始化：配置、订阅源缓存、下载队列
    let context = Context::new(config);

    // 绑定端口并启动监听器
    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            panic!("无法绑定端口：{}，错误：{}", port, e);
        }
    };
    info!("端口{}绑定完成", port);

    // 服务器状态与生命周期管理
    // shutdown_flag: 用于优雅停机 (Graceful Shutdown)
    // active_connection: 追踪当前并发连接数
    let shutdown_flag = Arc::new(Mutex::new(false));
    let active_connection = Arc::new(Mutex::new(0u32));

    // 启动交互式管理控制台任务
    // 该任务运行在后台，不阻塞监听循环，提供运维指令支持
    tokio::spawn({
        let shutdown_flag = Arc::clone(&shutdown_flag);
        let active_connection = Arc::clone(&active_connection);
        let queue = Arc::clone(&context.queue);
        async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin);
            let mut input = String::new();
            loop {
                input.clear();
                if let Ok(_) = reader.read_line(&mut input).await {
                    let cmd = input.trim();
                    match cmd {
                        "stop" => {
                            let mut flag = shutdown_flag.lock().unwrap();
                            *flag = true;
                            println!("停机指令已激活，服务器将在处理完下一个请求后关闭...");
                            break;
                        }
                        "help" => {
                            println!("== Podserver Help ==");
                            println!("stop   - 发出停机信号");
                            println!("status - 查看当前服务器运行状态");
                            println!("help   - 显示此帮助信息");
                            println!("====================");
                        }
                        "status" => {
                            let active_count = *active_connection.lock().unwrap();
                            println!("== Podserver 状态 ==");
                            println!("当前活跃连接数: {}", active_count);
                            println!("待下载任务数: {}", queue.queue_size());
                            println!("====================");
                        }
                        _ => {
                            println!("无效的命令：{}", cmd);
                        }
                    }
                } else {
                    break;
                }
            }
        }
    });

    let mut id: u128 = 0;

    // 主事件循环 (Accept Loop)
    // 持续接收新连接并将其分发至 Tokio 线程池进行异步处理
    loop {
        // 检查停机标志位
        if *shutdown_flag.lock().unwrap() {
            info!("主循环接收到停机指令，正在退出...");
            break;
        }

        // 等待新的 TCP 连接
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("接受连接失败：{}", e);
                continue;
            }
        };
        debug!("新的连接：{}", addr);

        // 为每个连接克隆资源句柄（Arc 引用计数增加）
        let active_connection_arc = Arc::clone(&active_connection);
        let context_clone = context.clone();

        debug!("[ID{}]TCP连接已建立", id);

        // 使用轻量级绿色线程处理具体请求，确保非阻塞 IO
        tokio::spawn(async move {
            {
                // 连接计数加 1
                let mut lock = active_connection_arc.lock().unwrap();
                *lock += 1;
            }

            // 核心业务处理
            handle_connection(stream, context_clone, id).await;

            {
                // 处理完成后连接计数减 1
                let mut lock = active_connection_arc.lock().unwrap();
                *lock -= 1;
            }
        });
        id += 1; // 增加请求唯一标识序列
    }
}
