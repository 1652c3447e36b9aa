// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `podserver` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 服务器用到的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 媒体文件相关的 MIME 类型映射表。
//! - 已知播客客户端的 User-Agent 特征串。
//! - 内置的 favicon 图标字节。

use lazy_static::lazy_static;
use std::collections::HashMap;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "podserver";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// Mixcloud 站点根地址，抓取器在其下拼接订阅源页面 URL
pub const MIXCLOUD_ROOT: &str = "https://www.mixcloud.com";

/// 已知播客客户端的 User-Agent 特征串（统一小写）。
///
/// 这些客户端在流式播放时会频繁发出 Range 请求并提前断开连接，
/// 连接处理器对它们的“中途挂断”按正常路径记录，而不按错误处理。
pub const KNOWN_PODCAST_AGENTS: [&str; 2] = ["itunes", "applecoremedia"];

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(206, "Partial Content");

        // 3xx: 重定向 (Redirection)
        map.insert(304, "Not Modified");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(413, "Content Too Large");
        map.insert(416, "Range Not Satisfiable");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型（Media Type）的映射表。
    ///
    /// 只保留了媒体目录中可能出现的类型，未知后缀一律按二进制流处理。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("aac", "audio/aac");
        map.insert("htm", "text/html;charset=utf-8");
        map.insert("html", "text/html;charset=utf-8");
        map.insert("ico", "image/x-icon");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("m4a", "audio/mp4");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("oga", "audio/ogg");
        map.insert("opus", "audio/opus");
        map.insert("png", "image/png");
        map.insert("txt", "text/plain");
        map.insert("wav", "audio/wav");
        map.insert("webm", "video/webm");
        map.insert("xml", "application/xml");
        // 兜底类型（通常用于无法识别后缀的二进制流）
        map.insert("_", "application/octet-stream");
        map
    };
}

/// 内置的 1x1 favicon 图标（标准 ICO 格式，32 位色深）。
///
/// 结构：ICONDIR(6) + ICONDIRENTRY(16) + BITMAPINFOHEADER(40) + XOR(4) + AND(4)。
pub const FAVICON_ICO: [u8; 70] = [
    // ICONDIR
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
    // ICONDIRENTRY: 1x1, 32bpp, 48 字节图像数据，偏移 22
    0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00,
    0x30, 0x00, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00,
    // BITMAPINFOHEADER：宽 1，高 2（含 AND 掩码）
    0x28, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // XOR：单个 BGRA 像素
    0xcc, 0x66, 0x00, 0xff,
    // AND 掩码（按 4 字节对齐）
    0x00, 0x00, 0x00, 0x00,
];

/// 根据文件后缀名查询 MIME 类型，未知后缀返回二进制流类型。
pub fn get_mime(extension: &str) -> &'static str {
    match MIME_TYPES.get(extension.to_lowercase().as_str()) {
        Some(v) => v,
        None => "application/octet-stream",
    }
}
