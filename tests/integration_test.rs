//! 进程内集成测试：在临时端口上运行真实的连接处理逻辑，
//! 用原始TCP客户端发送HTTP报文并校验响应。

use podserver::{handle_connection, Config, Context};

use std::{io::Write as _, net::SocketAddr, path::Path};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// 在回环地址的临时端口上启动服务端，返回其地址。
async fn start_server(music_dir: &Path) -> SocketAddr {
    let toml_path = music_dir.join("test.toml");
    let mut file = std::fs::File::create(&toml_path).unwrap();
    writeln!(file, "music_dir = {:?}", music_dir.to_str().unwrap()).unwrap();
    let config = Config::from_toml(toml_path.to_str().unwrap());
    let context = Context::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut id: u128 = 0;
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let context_clone = context.clone();
            tokio::spawn(async move {
                handle_connection(stream, context_clone, id).await;
            });
            id += 1;
        }
    });
    addr
}

/// 发送原始HTTP报文并读取整个响应（服务端响应后关闭连接）。
async fn send_raw(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).to_string()
}

fn status_code(response: &str) -> u16 {
    response
        .split_whitespace()
        .nth(1)
        .unwrap_or("0")
        .parse()
        .unwrap_or(0)
}

fn body_of(response: &str) -> &str {
    match response.find("\r\n\r\n") {
        Some(pos) => &response[pos + 4..],
        None => "",
    }
}

fn header_of<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}: ", name);
    response
        .split("\r\n")
        .find(|line| line.starts_with(&prefix))
        .map(|line| &line[prefix.len()..])
}

#[tokio::test]
async fn test_banner_page() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert_eq!(status_code(&response), 200);
    assert_eq!(
        header_of(&response, "Content-Type"),
        Some("text/html;charset=utf-8")
    );
    assert!(body_of(&response).contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn test_missing_file_is_404() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET /nothing.m4a HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 404);
    assert_eq!(body_of(&response), "404 Not Found\r\n");
}

#[tokio::test]
async fn test_post_is_405() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "POST / HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 405);
    assert_eq!(body_of(&response), "405 Method Not Allowed\r\n");
}

#[tokio::test]
async fn test_http2_is_505() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET / HTTP/2.0\r\n\r\n").await;
    assert_eq!(status_code(&response), 505);
}

#[tokio::test]
async fn test_malformed_request_line_is_400() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET /\r\n\r\n").await;
    assert_eq!(status_code(&response), 400);
}

/// HEAD：Content-Length 与 GET 一致，但不发送响应体
#[tokio::test]
async fn test_head_suppresses_body() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "HEAD / HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 200);
    let length: usize = header_of(&response, "Content-Length")
        .unwrap()
        .parse()
        .unwrap();
    assert!(length > 0);
    assert_eq!(body_of(&response), "");
}

#[tokio::test]
async fn test_folder_listing() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("exampleshow")).unwrap();
    std::fs::write(dir.path().join("exampleshow/first-episode.m4a"), b"audio").unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET /exampleshow/ HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 200);
    assert!(body_of(&response).contains("first-episode.m4a"));
}

#[tokio::test]
async fn test_file_serving() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("exampleshow")).unwrap();
    std::fs::write(dir.path().join("exampleshow/ep.m4a"), b"0123456789").unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET /exampleshow/ep.m4a HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 200);
    assert_eq!(header_of(&response, "Content-Type"), Some("audio/mp4"));
    assert_eq!(header_of(&response, "Content-Length"), Some("10"));
    assert_eq!(body_of(&response), "0123456789");
}

#[tokio::test]
async fn test_file_range() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("exampleshow")).unwrap();
    std::fs::write(dir.path().join("exampleshow/ep.m4a"), b"0123456789").unwrap();
    let addr = start_server(dir.path()).await;

    let raw = "GET /exampleshow/ep.m4a HTTP/1.1\r\nRange: bytes=3-6\r\n\r\n";
    let response = send_raw(addr, raw).await;
    assert_eq!(status_code(&response), 206);
    assert_eq!(header_of(&response, "Content-Range"), Some("bytes 3-6/10"));
    assert_eq!(body_of(&response), "3456");
}

#[tokio::test]
async fn test_file_range_unsatisfiable() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("exampleshow")).unwrap();
    std::fs::write(dir.path().join("exampleshow/ep.m4a"), b"0123456789").unwrap();
    let addr = start_server(dir.path()).await;

    let raw = "GET /exampleshow/ep.m4a HTTP/1.1\r\nRange: bytes=99-\r\n\r\n";
    let response = send_raw(addr, raw).await;
    assert_eq!(status_code(&response), 416);
    assert_eq!(header_of(&response, "Content-Range"), Some("bytes */10"));
}

/// If-Modified-Since 不早于文件修改时间 → 304，无响应体
#[tokio::test]
async fn test_file_conditional_get() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("exampleshow")).unwrap();
    std::fs::write(dir.path().join("exampleshow/ep.m4a"), b"0123456789").unwrap();
    let addr = start_server(dir.path()).await;

    let raw = "GET /exampleshow/ep.m4a HTTP/1.1\r\n\
               If-Modified-Since: Fri, 01 Jan 2100 00:00:00 GMT\r\n\r\n";
    let response = send_raw(addr, raw).await;
    assert_eq!(status_code(&response), 304);
    assert_eq!(body_of(&response), "");
}

/// 含 `..` 分段的路径被拒绝
#[tokio::test]
async fn test_traversal_is_403() {
    let dir = tempfile::TempDir::new().unwrap();
    let addr = start_server(dir.path()).await;

    let response = send_raw(addr, "GET /../etc/passwd HTTP/1.1\r\n\r\n").await;
    assert_eq!(status_code(&response), 403);
}
