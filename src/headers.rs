// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应标头构建模块
//!
//! 该模块负责生成各类响应的状态行与标头：成功响应、304 Not Modified、
//! 部分内容（206）以及错误响应，并实现条件 GET（`If-Modified-Since`）的判定。
//!
//! 所有函数都遵守同一条顺序保证：标头（含结尾空行）在任何响应体字节之前
//! 一次性写出并落到套接字上。

use crate::exception::Exception;
use crate::param::{CRLF, SERVER_NAME, STATUS_CODES};
use crate::request::Request;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// 发送 200 成功响应的状态行与标头。
pub async fn send_success_headers<W: AsyncWrite + Unpin>(
    writer: &mut W,
    last_modified: DateTime<Utc>,
    content_type: &str,
    content_length: u64,
) -> Result<(), Exception> {
    let header = [
        "HTTP/1.1 200 OK",
        CRLF,
        "Connection: close",
        CRLF,
        &["Content-Length: ", &content_length.to_string()].concat(),
        CRLF,
        &["Content-Type: ", content_type].concat(),
        CRLF,
        &["Date: ", &format_http_date(Utc::now())].concat(),
        CRLF,
        &["Last-Modified: ", &format_http_date(last_modified)].concat(),
        CRLF,
        &["Server: ", SERVER_NAME].concat(),
        CRLF,
        CRLF,
    ]
    .concat();
    writer.write_all(header.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// 发送 206 部分内容响应的状态行与标头。
pub async fn send_partial_headers<W: AsyncWrite + Unpin>(
    writer: &mut W,
    last_modified: DateTime<Utc>,
    content_type: &str,
    start: u64,
    end: u64,
    total: u64,
) -> Result<(), Exception> {
    let header = [
        "HTTP/1.1 206 Partial Content",
        CRLF,
        "Accept-Ranges: bytes",
        CRLF,
        "Connection: close",
        CRLF,
        &["Content-Length: ", &(end - start + 1).to_string()].concat(),
        CRLF,
        &[
            "Content-Range: bytes ",
            &start.to_string(),
            "-",
            &end.to_string(),
            "/",
            &total.to_string(),
        ]
        .concat(),
        CRLF,
        &["Content-Type: ", content_type].concat(),
        CRLF,
        &["Date: ", &format_http_date(Utc::now())].concat(),
        CRLF,
        &["Last-Modified: ", &format_http_date(last_modified)].concat(),
        CRLF,
        &["Server: ", SERVER_NAME].concat(),
        CRLF,
        CRLF,
    ]
    .concat();
    writer.write_all(header.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// 若请求携带的 `If-Modified-Since` 足以判定资源未变化，则发送 304 响应并返回 `true`，
/// 调用方据此完全跳过响应体的生成；否则什么都不发送并返回 `false`。
///
/// 比较按整秒进行：资源的最后修改时间不晚于标头值即认为未修改；
/// 标头缺失、无法解析或早于资源时按正常路径响应。
pub async fn send_not_modified_headers_if_needed<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    last_modified: DateTime<Utc>,
    id: u128,
) -> Result<bool, Exception> {
    if !is_not_modified(request, last_modified) {
        return Ok(false);
    }

    debug!("[ID{}]条件GET命中，发送304响应", id);
    let header = [
        "HTTP/1.1 304 Not Modified",
        CRLF,
        "Connection: close",
        CRLF,
        &["Date: ", &format_http_date(Utc::now())].concat(),
        CRLF,
        &["Last-Modified: ", &format_http_date(last_modified)].concat(),
        CRLF,
        &["Server: ", SERVER_NAME].concat(),
        CRLF,
        CRLF,
    ]
    .concat();
    writer.write_all(header.as_bytes()).await?;
    writer.flush().await?;
    Ok(true)
}

/// 条件 GET 的纯判定逻辑：资源（按整秒截断）不晚于 `If-Modified-Since` 时为真。
pub fn is_not_modified(request: &Request, last_modified: DateTime<Utc>) -> bool {
    let header_value = match request.header("if-modified-since") {
        Some(v) => v,
        None => return false,
    };
    let since = match parse_http_date(header_value) {
        Some(t) => t,
        None => return false,
    };
    last_modified.timestamp() <= since.timestamp()
}

/// 发送错误响应：状态行加一段描述状态的纯文本响应体（HEAD 请求省略响应体）。
pub async fn send_error_headers_and_body<W: AsyncWrite + Unpin>(
    writer: &mut W,
    exception: &Exception,
    is_head: bool,
) -> Result<(), Exception> {
    let code = exception.status_code();
    let information: &str = STATUS_CODES.get(&code).copied().unwrap_or("Error");
    let body = format!("{} {}\r\n", code, information);

    let header = [
        &["HTTP/1.1 ", &code.to_string(), " ", information].concat(),
        CRLF,
        "Connection: close",
        CRLF,
        &["Content-Length: ", &body.len().to_string()].concat(),
        CRLF,
        "Content-Type: text/plain;charset=utf-8",
        CRLF,
        &["Date: ", &format_http_date(Utc::now())].concat(),
        CRLF,
        &["Server: ", SERVER_NAME].concat(),
        CRLF,
        CRLF,
    ]
    .concat();
    writer.write_all(header.as_bytes()).await?;
    if !is_head {
        writer.write_all(body.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// 发送 416 响应，额外带上 `Content-Range: bytes */总长` 标头。
pub async fn send_range_not_satisfiable<W: AsyncWrite + Unpin>(
    writer: &mut W,
    total: u64,
    is_head: bool,
) -> Result<(), Exception> {
    let body = "416 Range Not Satisfiable\r\n";
    let header = [
        "HTTP/1.1 416 Range Not Satisfiable",
        CRLF,
        "Connection: close",
        CRLF,
        &["Content-Length: ", &body.len().to_string()].concat(),
        CRLF,
        &["Content-Range: bytes */", &total.to_string()].concat(),
        CRLF,
        "Content-Type: text/plain;charset=utf-8",
        CRLF,
        &["Date: ", &format_http_date(Utc::now())].concat(),
        CRLF,
        &["Server: ", SERVER_NAME].concat(),
        CRLF,
        CRLF,
    ]
    .concat();
    writer.write_all(header.as_bytes()).await?;
    if !is_head {
        writer.write_all(body.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// 把时间格式化为 IMF-fixdate 形式，如 `Sun, 06 Nov 1994 08:49:37 GMT`。
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 按 HTTP 日期语法解析时间：优先 IMF-fixdate / RFC 2822，
/// 其次是过时的 RFC 850 与 asctime 形式。解析失败返回 `None`。
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(DateTime::from_naive_utc_and_offset(t, Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(DateTime::from_naive_utc_and_offset(t, Utc));
    }
    None
}
