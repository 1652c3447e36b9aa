// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{
    cache::FeedCache,
    config::Config,
    exception::Exception,
    headers, response,
    queue::DownloadQueue,
    request::Request,
};

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};

/// 请求路径的五种去向
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Banner,
    PodcastXml,
    FavIcon,
    Folder,
    File,
}

/// 按路径确定路由。匹配不区分大小写，优先级从上到下。
pub fn route(path: &str) -> Route {
    let lower = path.to_lowercase();
    if lower == "/" {
        Route::Banner
    } else if lower.ends_with("/podcast.xml") {
        Route::PodcastXml
    } else if lower.ends_with("/favicon.ico") {
        Route::FavIcon
    } else if lower.ends_with('/') {
        Route::Folder
    } else {
        Route::File
    }
}

/// 各连接共享的服务端状态
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub cache: Arc<Mutex<FeedCache>>,
    pub queue: Arc<DownloadQueue>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let cache = FeedCache::new(config.http_cache_time_seconds());
        let queue = DownloadQueue::new(
            config.download_threads(),
            config.download_oldest_first(),
        );
        Context {
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(cache)),
            queue: Arc::new(queue),
        }
    }
}

/// 处理单个TCP连接：解析请求、分发响应、按需发送错误、关闭连接。
///
/// 本函数不向调用方传播错误，所有故障在此消化并记录日志。
pub async fn handle_connection(stream: TcpStream, context: Context, id: u128) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    match Request::parse(&mut reader, id).await {
        Ok(request) => {
            debug!(
                "[ID{}]请求解析完成：{} {} {}",
                id,
                request.method(),
                request.url(),
                request.version()
            );
            if let Err(exception) = respond(&request, &mut write_half, &context, id).await {
                handle_fault(&exception, Some(&request), &mut write_half, id).await;
            }
        }
        Err(exception) => {
            handle_fault(&exception, None, &mut write_half, id).await;
        }
    }

    // 各资源独立清理，某一步失败不影响其余步骤
    if let Err(e) = write_half.shutdown().await {
        warn!("[ID{}]关闭连接写端失败：{}", id, e);
    }
    drop(reader);
    debug!("[ID{}]连接处理结束", id);
}

/// 校验请求并按路由分发到具体的响应函数。
pub async fn respond<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    context: &Context,
    id: u128,
) -> Result<(), Exception> {
    if !request.version().contains("HTTP/1.") {
        return Err(Exception::VersionNotSupported(request.version().to_string()));
    }

    let method = request.method();
    if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("HEAD") {
        return Err(Exception::MethodNotAllowed(method.to_string()));
    }

    if request.url().is_empty() {
        return Err(Exception::BadRequest("请求URL为空".to_string()));
    }

    // 这两个标头不影响响应内容，记录后忽略
    for name in ["expect", "if-range"] {
        if let Some(value) = request.header(name) {
            warn!("[ID{}]忽略不支持的请求标头 {}: {}", id, name, value);
        }
    }

    match route(request.path()) {
        Route::Banner => response::respond_banner(request, writer, id).await,
        Route::PodcastXml => {
            response::respond_podcast_xml(
                request,
                writer,
                &context.config,
                &context.cache,
                &context.queue,
                id,
            )
            .await
        }
        Route::FavIcon => response::respond_favicon(request, writer, id).await,
        Route::Folder => response::respond_folder(request, writer, &context.config, id).await,
        Route::File => response::respond_file(request, writer, &context.config, id).await,
    }
}

/// 统一的故障处理：分级记录日志，并尽力向客户端发送错误响应。
async fn handle_fault<W: AsyncWrite + Unpin>(
    exception: &Exception,
    request: Option<&Request>,
    writer: &mut W,
    id: u128,
) {
    let code = exception.status_code();
    let from_podcast_client = request.map_or(false, |r| r.is_from_podcast_client());

    if code < 500 {
        info!("[ID{}]以{}响应请求：{}", id, code, exception);
    } else if from_podcast_client && exception.is_connection_reset() {
        // iTunes等播客客户端在收到足够数据后会主动断开连接，不算故障，
        // 此时连接已不可写，也不再尝试发送错误响应
        info!("[ID{}]播客客户端提前断开连接：{}", id, exception);
        return;
    } else {
        error!("[ID{}]处理请求失败：{}", id, exception);
    }

    let is_head = request.map_or(false, |r| r.is_head());
    if let Err(e) = headers::send_error_headers_and_body(writer, exception, is_head).await {
        // 发送错误响应本身失败时不再上抛，只留下记录
        debug!("[ID{}]发送错误响应失败，忽略：{}", id, e);
    }
}
