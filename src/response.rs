use crate::{
    cache::FeedCache,
    config::Config,
    exception::Exception,
    headers,
    mixcloud,
    param::{get_mime, FAVICON_ICO},
    podcast,
    queue::{Download, DownloadQueue},
    request::Request,
    util::HtmlBuilder,
};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use std::{
    io::SeekFrom,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};

/// 流式发送文件时的分块大小
const CHUNK_SIZE: usize = 262144; // 256KB

lazy_static! {
    /// 进程启动时刻，作为内置资源（横幅、图标）的最后修改时间
    static ref SERVER_START: DateTime<Utc> = Utc::now();
}

/// 响应站点根路径：发送横幅页面。
pub async fn respond_banner<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    id: u128,
) -> Result<(), Exception> {
    debug!("[ID{}]发送横幅页面", id);
    if headers::send_not_modified_headers_if_needed(request, writer, *SERVER_START, id).await? {
        return Ok(());
    }

    let html = HtmlBuilder::banner().build();
    headers::send_success_headers(
        writer,
        *SERVER_START,
        "text/html;charset=utf-8",
        html.len() as u64,
    )
    .await?;
    if !request.is_head() {
        writer.write_all(html.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// 响应 favicon 请求：发送内置图标字节。
pub async fn respond_favicon<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    id: u128,
) -> Result<(), Exception> {
    debug!("[ID{}]发送favicon", id);
    if headers::send_not_modified_headers_if_needed(request, writer, *SERVER_START, id).await? {
        return Ok(());
    }

    headers::send_success_headers(
        writer,
        *SERVER_START,
        "image/x-icon",
        FAVICON_ICO.len() as u64,
    )
    .await?;
    if !request.is_head() {
        writer.write_all(&FAVICON_ICO).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// 响应 RSS XML 请求：从缓存或抓取取得订阅源，序列化为播客 XML 返回，
/// 并把缺失本地文件的曲目送入下载队列。
pub async fn respond_podcast_xml<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    config: &Config,
    cache: &Arc<Mutex<FeedCache>>,
    queue: &Arc<DownloadQueue>,
    id: u128,
) -> Result<(), Exception> {
    // 订阅源标识是路径的倒数第二段；解析不出来时用 403 与
    // “路径合法但上游不存在该订阅源”（404）区分开
    let feed_name = match second_to_last_component(request.path()) {
        Some(name) => name,
        None => {
            return Err(Exception::Forbidden(
                "无法从路径解析出订阅源标识".to_string(),
            ))
        }
    };

    info!("[ID{}]开始服务订阅源的RSS XML：{}", id, feed_name);

    // 先查缓存，未命中再抓取。查询-剔除在一次加锁内完成；
    // 抓取期间不持有锁，同一订阅源的并发首次请求可能各自触发一次抓取（接受的折衷）
    let cached = lock_cache(cache, id).find(&feed_name);
    let feed = match cached {
        Some(feed) => {
            info!("[ID{}]订阅源命中缓存：{}", id, feed_name);
            feed
        }
        None => {
            let feed = mixcloud::scrape(&feed_name).await?;
            lock_cache(cache, id).push(&feed_name, feed.clone());
            feed
        }
    };

    // 比较按整秒进行，截断抓取时刻的亚秒部分
    let scraped = DateTime::from_timestamp(feed.scraped.timestamp(), 0).unwrap_or(feed.scraped);
    if headers::send_not_modified_headers_if_needed(request, writer, scraped, id).await? {
        return Ok(());
    }

    let rss_xml = podcast::create_xml(&feed, request.host());

    // 把缺少本地文件的曲目送入下载队列（即发即忘）
    for track in &feed.tracks {
        let local_path = track.local_path(config.music_dir(), &feed.name);
        if !local_path.exists() {
            queue.enqueue(Download {
                url: track.music_url.clone(),
                local_path,
                feed_name: feed.name.clone(),
                title: track.title.clone(),
            });
        }
    }
    let download_count = queue.queue_size();
    if download_count == 0 {
        if feed.tracks.is_empty() {
            info!("[ID{}]没有可下载的曲目", id);
        } else {
            info!("[ID{}]所有曲目都已经下载完成", id);
        }
    } else {
        info!("[ID{}]开始下载{}条曲目", id, download_count);
        queue.process_queue();
    }

    headers::send_success_headers(writer, scraped, "application/xml", rss_xml.len() as u64)
        .await?;

    // 不期望此类请求携带 Range 标头，响应体总是整体发送
    if !request.is_head() {
        writer.write_all(rss_xml.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// 响应目录请求：列出媒体目录下对应子目录的内容。
pub async fn respond_folder<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    config: &Config,
    id: u128,
) -> Result<(), Exception> {
    let local_path = resolve_local_path(request.path(), config.music_dir())?;
    debug!("[ID{}]目录请求映射到本地路径：{}", id, local_path.display());

    let metadata = fs::metadata(&local_path)
        .await
        .map_err(|_| Exception::NotFound(format!("目录不存在：{}", request.path())))?;
    if !metadata.is_dir() {
        return Err(Exception::NotFound(format!(
            "路径不是目录：{}",
            request.path()
        )));
    }
    let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or(*SERVER_START);

    if headers::send_not_modified_headers_if_needed(request, writer, modified, id).await? {
        return Ok(());
    }

    let mut dir_vec = Vec::<PathBuf>::new();
    let mut entries = fs::read_dir(&local_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        dir_vec.push(entry.path());
    }

    let html = HtmlBuilder::from_dir(request.path(), &mut dir_vec).build();
    headers::send_success_headers(
        writer,
        modified,
        "text/html;charset=utf-8",
        html.len() as u64,
    )
    .await?;
    if !request.is_head() {
        writer.write_all(html.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// 响应文件请求：从媒体目录提供已下载的文件，支持条件 GET 与字节范围。
pub async fn respond_file<W: AsyncWrite + Unpin>(
    request: &Request,
    writer: &mut W,
    config: &Config,
    id: u128,
) -> Result<(), Exception> {
    let local_path = resolve_local_path(request.path(), config.music_dir())?;
    debug!("[ID{}]文件请求映射到本地路径：{}", id, local_path.display());

    let metadata = fs::metadata(&local_path)
        .await
        .map_err(|_| Exception::NotFound(format!("文件不存在：{}", request.path())))?;
    if metadata.is_dir() {
        return Err(Exception::Forbidden(format!(
            "路径是目录而不是文件：{}",
            request.path()
        )));
    }
    let file_size = metadata.len();
    let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or(*SERVER_START);

    let extension = local_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("_");
    let mime = get_mime(extension);

    if let Some((start, end)) = request.range() {
        // Range 请求：校验范围后发送 206 或 416
        let end = end.unwrap_or(file_size.saturating_sub(1));
        if file_size == 0 || start >= file_size || end >= file_size || start > end {
            warn!(
                "[ID{}]无效的Range请求: start={}, end={}, file_size={}",
                id, start, end, file_size
            );
            headers::send_range_not_satisfiable(writer, file_size, request.is_head()).await?;
            return Ok(());
        }

        debug!(
            "[ID{}]处理Range请求: bytes {}-{}/{}",
            id, start, end, file_size
        );
        headers::send_partial_headers(writer, modified, mime, start, end, file_size).await?;
        if !request.is_head() {
            stream_file(writer, &local_path, start, end - start + 1).await?;
        }
        return Ok(());
    }

    if headers::send_not_modified_headers_if_needed(request, writer, modified, id).await? {
        return Ok(());
    }

    headers::send_success_headers(writer, modified, mime, file_size).await?;
    if !request.is_head() {
        stream_file(writer, &local_path, 0, file_size).await?;
    }
    Ok(())
}

/// 从指定偏移起把 `length` 字节分块写入套接字。
async fn stream_file<W: AsyncWrite + Unpin>(
    writer: &mut W,
    path: &PathBuf,
    offset: u64,
    length: u64,
) -> Result<(), Exception> {
    let mut file = fs::File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }

    let mut remaining = length;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = CHUNK_SIZE.min(remaining as usize);
        let n = file.read(&mut buffer[..want]).await?;
        if n == 0 {
            break; // 文件读取完毕
        }
        writer.write_all(&buffer[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await?;
    Ok(())
}

/// 把请求路径映射到媒体目录下的本地路径。
///
/// 先做百分号解码，再拒绝任何含 `..` 分段的越权尝试。
fn resolve_local_path(url_path: &str, music_dir: &str) -> Result<PathBuf, Exception> {
    let decoded = urlencoding::decode(url_path)
        .map_err(|_| Exception::BadRequest("路径的百分号编码非法".to_string()))?;
    if decoded.split('/').any(|segment| segment == "..") {
        return Err(Exception::Forbidden(format!(
            "路径包含越权尝试：{}",
            url_path
        )));
    }
    let stripped = decoded.trim_start_matches('/');
    Ok(PathBuf::from(music_dir).join(stripped))
}

/// 取路径的倒数第二段。例如 `/foo/bar/podcast.xml` => `bar`。
///
/// 与上游行为一致：结尾的空段不计入（`/foo/bar/` 的倒数第二段是 `bar` 之前的 `foo`）。
fn second_to_last_component(path: &str) -> Option<String> {
    let components: Vec<&str> = if path.ends_with('/') {
        path[..path.len() - 1].split('/').collect()
    } else {
        path.split('/').collect()
    };
    if components.len() < 2 {
        return None;
    }
    let component = components[components.len() - 2];
    if component.is_empty() {
        None
    } else {
        Some(component.to_string())
    }
}

/// 加锁取得缓存句柄；锁被污染时恢复继续（缓存内容仍然一致）。
fn lock_cache<'a>(
    cache: &'a Arc<Mutex<FeedCache>>,
    id: u128,
) -> std::sync::MutexGuard<'a, FeedCache> {
    match cache.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("[ID{}]缓存锁被污染，恢复并继续", id);
            poisoned.into_inner()
        }
    }
}
