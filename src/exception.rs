// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在请求处理生命周期中可能抛出的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了协议解析错误、路由与文件系统错误、上游抓取错误以及 I/O 错误。
//! - **语义映射**：每个变体都携带（或可推导出）对应的 HTTP 响应状态码，
//!   连接处理器据此决定日志级别（非 5xx 按 info 记录）和错误响应内容。
//! - **用户友好**：通过实现 `std::fmt::Display`，确保错误信息可以被安全地记录到日志
//!   或写入错误响应体。

use std::fmt;
use std::io;

/// 服务器处理请求过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug)]
pub enum Exception {
    /// 请求行格式非法（分段数不为 3）、请求为空或路径包含越权尝试。对应 `400 Bad Request`。
    BadRequest(String),
    /// 路径无法映射到一个订阅源标识，或请求越出了媒体目录。对应 `403 Forbidden`。
    Forbidden(String),
    /// 本地文件不存在，或上游站点没有所请求的订阅源。对应 `404 Not Found`。
    NotFound(String),
    /// 客户端使用了 GET/HEAD 以外的方法。对应 `405 Method Not Allowed`。
    MethodNotAllowed(String),
    /// 客户端使用了 HTTP/1.x 以外的协议版本。对应 `505 HTTP Version Not Supported`。
    VersionNotSupported(String),
    /// 服务器内部错误。对应 `500 Internal Server Error`。
    Internal(String),
    /// 套接字或文件 I/O 失败。对应 `500`，但对端主动断开会被连接处理器单独识别。
    Io(io::Error),
    /// 访问上游站点失败（抓取或下载）。对应 `500`。
    Upstream(reqwest::Error),
}

use Exception::*;

impl Exception {
    /// 异常对应的 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            BadRequest(_) => 400,
            Forbidden(_) => 403,
            NotFound(_) => 404,
            MethodNotAllowed(_) => 405,
            VersionNotSupported(_) => 505,
            Internal(_) => 500,
            Io(_) => 500,
            Upstream(_) => 500,
        }
    }

    /// 该异常是否意味着对端已主动断开连接（reset 或 broken pipe）。
    ///
    /// 已知播客客户端在流式播放时会在收到全部字节前挂断，
    /// 连接处理器需要把这种情况与真正的 I/O 故障区分开。
    pub fn is_connection_reset(&self) -> bool {
        match self {
            Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            NotFound(msg) => write!(f, "Not Found: {}", msg),
            MethodNotAllowed(method) => write!(f, "Method {} Not Allowed", method),
            VersionNotSupported(version) => {
                write!(f, "HTTP Version {} not supported", version)
            }
            Internal(msg) => write!(f, "Internal Server Error: {}", msg),
            Io(e) => write!(f, "I/O error: {}", e),
            Upstream(e) => write!(f, "Upstream error: {}", e),
        }
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e)
    }
}

impl From<reqwest::Error> for Exception {
    fn from(e: reqwest::Error) -> Self {
        Upstream(e)
    }
}
