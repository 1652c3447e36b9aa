// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块是服务器的核心组件之一，负责把 TCP 流中的原始字节
//! 解析为强类型的 `Request` 结构体。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本），要求恰好三段。
//! 2. HTTP 标头（Headers）的提取：名字大小写不敏感、同名后值覆盖前值、
//!    以空白开头的行视为上一个标头值的续行（直接拼接，不加分隔符）。
//! 3. 不含冒号的标头行被记录后丢弃，不视为致命错误。
//! 4. 范围请求（Range Requests）与已知播客客户端的识别。

use crate::exception::Exception;
use crate::param::KNOWN_PODCAST_AGENTS;
use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// 表示一个完整的 HTTP 请求元数据。
///
/// 该结构体不包含请求体（本服务器只处理 GET/HEAD），解析完成后不可变，
/// 主要用于路由分发与条件请求判断。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法（原始大小写保留，校验时按大写比较）
    method: String,
    /// 请求的原始目标（含查询字符串与片段）
    url: String,
    /// 用于路由决策的路径（查询字符串与片段已剥离）
    path: String,
    /// HTTP 协议版本标记（如 `HTTP/1.1`）
    version: String,
    /// 标头映射，键为统一小写后的标头名
    headers: HashMap<String, String>,
}

impl Request {
    /// 从已定位到请求起始处的缓冲读取器解析出一个 `Request`。
    ///
    /// # 逻辑步骤
    /// 1. 读取请求行：按空白切分后必须恰好为 3 段，否则判定为 400 级错误。
    /// 2. 逐行解析标头，遇到空行或流结束为止；
    ///    收到的每一行原始标头都会记录到 debug 日志，便于诊断。
    /// 3. 不含冒号的行收集起来，在解析结束后逐条记录 warning。
    ///
    /// # 参数
    /// * `reader` - 套接字读取端的缓冲读取器。
    /// * `id` - 全局连接 ID，用于在并发环境下追踪日志。
    pub async fn parse<R: AsyncBufRead + Unpin>(
        reader: &mut R,
        id: u128,
    ) -> Result<Self, Exception> {
        let mut request: Option<Request> = None;
        let mut last_header_name: Option<String> = None;

        let mut logged_headers = String::with_capacity(500);
        let mut unparsable_headers: Vec<String> = Vec::new();

        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    // 请求字节不是合法的 UTF-8
                    return Err(Exception::BadRequest("request is not valid UTF-8".into()));
                }
                Err(e) => return Err(Exception::Io(e)),
            }
            let trimmed_end = line.trim_end_matches(['\r', '\n']);
            if trimmed_end.is_empty() {
                break;
            }

            logged_headers.push_str(&format!("\n    -> {}", trimmed_end));

            match request {
                None => {
                    // 第一行：请求行
                    let parts: Vec<&str> = trimmed_end.split_whitespace().collect();
                    if parts.len() != 3 {
                        return Err(Exception::BadRequest(trimmed_end.to_string()));
                    }
                    request = Some(Request::from_request_line(parts[0], parts[1], parts[2]));
                }
                Some(ref mut req) => {
                    let first_char = trimmed_end.chars().next().unwrap_or(' ');
                    if last_header_name.is_some() && first_char.is_whitespace() {
                        // 续行：拼接到上一个标头值之后，不加分隔符
                        let name = last_header_name.as_ref().unwrap();
                        if let Some(value) = req.headers.get_mut(name) {
                            value.push_str(trimmed_end.trim());
                        }
                    } else {
                        // 标头行（Name:Value），冒号必须存在且不能是行首字符
                        match trimmed_end.find(':') {
                            Some(colon) if colon > 0 => {
                                let name = trimmed_end[..colon].trim().to_lowercase();
                                let value = trimmed_end[colon + 1..].trim().to_string();
                                req.headers.insert(name.clone(), value);
                                last_header_name = Some(name);
                            }
                            _ => {
                                unparsable_headers.push(trimmed_end.to_string());
                            }
                        }
                    }
                }
            }
        }

        debug!("[ID{}]收到HTTP请求标头{}", id, logged_headers);
        for header in &unparsable_headers {
            warn!("[ID{}]无法解析的HTTP请求标头：{}", id, header);
        }

        match request {
            Some(req) => Ok(req),
            None => Err(Exception::BadRequest("empty request".into())),
        }
    }

    /// 由请求行的三段构造实例，同时剥离路径中的查询字符串与片段。
    fn from_request_line(method: &str, url: &str, version: &str) -> Self {
        let path = match url.find(['?', '#']) {
            Some(pos) => &url[..pos],
            None => url,
        };
        Self {
            method: method.to_string(),
            url: url.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers: HashMap::new(),
        }
    }

    /// 按名字查询标头（大小写不敏感）。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    /// 请求是否为 HEAD 方法。
    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    /// 请求是否来自已知的播客客户端（iTunes / AppleCoreMedia 等）。
    pub fn is_from_podcast_client(&self) -> bool {
        match self.header("user-agent") {
            Some(agent) => {
                let agent = agent.to_lowercase();
                KNOWN_PODCAST_AGENTS.iter().any(|known| agent.contains(known))
            }
            None => false,
        }
    }

    /// 解析 Range 标头 (RFC 7233)，格式示例：`Range: bytes=0-1023`。
    ///
    /// 返回 `(起始字节, 结束字节)`，结束字节为 `None` 表示请求到文件末尾的所有数据。
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        let value = self.header("range")?;
        let bytes_part = value.trim().strip_prefix("bytes=")?;
        let parts: Vec<&str> = bytes_part.split('-').collect();
        if parts.len() != 2 {
            return None;
        }
        let start = parts[0].parse::<u64>().ok()?;
        let end = if parts[1].is_empty() {
            None
        } else {
            Some(parts[1].parse::<u64>().ok()?)
        };
        Some((start, end))
    }

    /// 取得 Host 标头的值，缺失时回退到 `localhost`。
    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取请求方法
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 获取原始请求目标（含查询参数）
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 获取路由用路径（查询参数已剥离）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取 HTTP 协议版本标记
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse_str(raw: &str) -> Result<Request, Exception> {
        let mut reader = BufReader::new(raw.as_bytes());
        Request::parse(&mut reader, 0).await
    }

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[tokio::test]
    async fn test_parse_get_request() {
        let raw = "GET /exampleshow/podcast.xml HTTP/1.1\r\nHost: localhost:25683\r\nUser-Agent: Test-Browser\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/exampleshow/podcast.xml");
        assert_eq!(request.version(), "HTTP/1.1");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert!(!request.is_head());
    }

    /// 验证 HEAD 请求的识别
    #[tokio::test]
    async fn test_parse_head_request() {
        let raw = "HEAD /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert!(request.is_head());
        assert_eq!(request.path(), "/index.html");
    }

    /// 请求行分段数不为 3 时必须返回 400 级错误
    #[tokio::test]
    async fn test_malformed_request_line() {
        for raw in [
            "GET /\r\n\r\n",
            "GET\r\n\r\n",
            "GET / HTTP/1.1 extra\r\n\r\n",
        ] {
            let result = parse_str(raw).await;
            match result {
                Err(Exception::BadRequest(_)) => {}
                other => panic!("Expected BadRequest, got {:?}", other),
            }
        }
    }

    /// 空请求（连接建立后立即关闭）返回 400 级错误
    #[tokio::test]
    async fn test_empty_request() {
        let result = parse_str("").await;
        match result {
            Err(Exception::BadRequest(_)) => {}
            other => panic!("Expected BadRequest, got {:?}", other),
        }
    }

    /// 验证 Header 字段名大小写不敏感，同名标头后值覆盖前值
    #[tokio::test]
    async fn test_case_insensitive_headers_last_wins() {
        let raw = "GET / HTTP/1.1\r\nX-Test: first\r\nx-test: second\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert_eq!(request.header("X-TEST"), Some("second"));
    }

    /// 以空白开头的行是续行，直接拼接到上一个标头值之后
    #[tokio::test]
    async fn test_header_continuation_line() {
        let raw = "GET / HTTP/1.1\r\nX-Long: part1\r\n part2\r\n\tpart3\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert_eq!(request.header("x-long"), Some("part1part2part3"));
    }

    /// 不含冒号的标头行被跳过，不致命
    #[tokio::test]
    async fn test_colonless_header_skipped() {
        let raw = "GET / HTTP/1.1\r\nthis line has no colon\r\nHost: localhost\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert_eq!(request.host(), "localhost");
        assert_eq!(request.header("this line has no colon"), None);
    }

    /// 确保查询字符串与片段从路由路径中剥离，但原始 URL 保留
    #[tokio::test]
    async fn test_path_query_stripped() {
        let raw = "GET /page?id=123&name=test HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let request = parse_str(raw).await.unwrap();

        assert_eq!(request.path(), "/page");
        assert_eq!(request.url(), "/page?id=123&name=test");

        let raw = "GET /page#frag HTTP/1.1\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert_eq!(request.path(), "/page");
    }

    /// 验证已知播客客户端的识别
    #[tokio::test]
    async fn test_podcast_client_detection() {
        let raw = "GET / HTTP/1.1\r\nUser-Agent: iTunes/12.0 (Macintosh)\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert!(request.is_from_podcast_client());

        let raw = "GET / HTTP/1.1\r\nUser-Agent: AppleCoreMedia/1.0\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert!(request.is_from_podcast_client());

        let raw = "GET / HTTP/1.1\r\nUser-Agent: Mozilla/5.0\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert!(!request.is_from_podcast_client());
    }

    /// 验证 Range 标头的解析
    #[tokio::test]
    async fn test_range_header() {
        let raw = "GET /a.m4a HTTP/1.1\r\nRange: bytes=0-1023\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert_eq!(request.range(), Some((0, Some(1023))));

        let raw = "GET /a.m4a HTTP/1.1\r\nRange: bytes=500-\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert_eq!(request.range(), Some((500, None)));

        let raw = "GET /a.m4a HTTP/1.1\r\nRange: bogus\r\n\r\n";
        let request = parse_str(raw).await.unwrap();
        assert_eq!(request.range(), None);
    }
}
