//! # Mixcloud 抓取模块
//!
//! 该模块把 Mixcloud 用户页面抓取为结构化的订阅源记录（`Feed`）。
//! 抓取结果一旦放入缓存即视为不可变；需要刷新时用新记录整体替换。
//!
//! 页面结构解析只依赖几条稳定的特征（og:title 元信息与曲目页链接），
//! 站点改版时只需要调整这里的正则。

use crate::exception::Exception;
use crate::param::MIXCLOUD_ROOT;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;

/// 音频流镜像的根地址，曲目的下载 URL 在其下拼接
const STREAM_ROOT: &str = "https://stream.mixcloud.com/c/m4a/64";

lazy_static! {
    /// 整个进程共享的 HTTP 客户端（抓取与下载复用同一个连接池）。
    pub static ref CLIENT: reqwest::Client = reqwest::Client::builder()
        .user_agent(concat!("podserver/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("无法构建HTTP客户端");
}

lazy_static! {
    static ref TITLE_RE: Regex =
        Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]*)""#).unwrap();
}

/// 订阅源中的一条曲目描述。
#[derive(Debug, Clone)]
pub struct Track {
    /// 曲目标题
    pub title: String,
    /// 曲目在 Mixcloud 上的页面地址
    pub web_url: String,
    /// 音频流的下载地址
    pub music_url: String,
    /// 本地文件名（含后缀）
    pub file_name: String,
    /// 音频字节数（页面未提供时为 0）
    pub length: u64,
}

impl Track {
    /// 曲目在媒体目录下的本地路径：`music_dir/<feed>/<file>`。
    pub fn local_path(&self, music_dir: &str, feed_name: &str) -> PathBuf {
        PathBuf::from(music_dir).join(feed_name).join(&self.file_name)
    }
}

/// 一次抓取得到的订阅源记录。
///
/// 插入缓存后不可变：刷新时构造新的 `Feed` 整体替换旧记录，绝不原地修改。
#[derive(Debug, Clone)]
pub struct Feed {
    /// 订阅源标识（请求路径中的倒数第二段）
    pub name: String,
    /// 订阅源标题（页面抓取失败时回退为标识）
    pub title: String,
    /// 订阅源在 Mixcloud 上的页面地址
    pub url: String,
    /// 抓取完成的时刻，缓存按它计算条目年龄
    pub scraped: DateTime<Utc>,
    /// 按页面出现顺序排列的曲目
    pub tracks: Vec<Track>,
}

/// 抓取一个订阅源页面并解析为 `Feed`。
///
/// 上游返回 404 时映射为本服务器的 404（请求的订阅源不存在）。
pub async fn scrape(feed_name: &str) -> Result<Feed, Exception> {
    let url = format!("{}/{}/", MIXCLOUD_ROOT, feed_name);
    info!("开始抓取订阅源页面：{}", url);

    let response = CLIENT.get(&url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(Exception::NotFound(format!(
            "Mixcloud上不存在订阅源：{}",
            feed_name
        )));
    }
    let response = response.error_for_status()?;
    let html = response.text().await?;

    let feed = parse_feed_page(feed_name, &url, &html, Utc::now());
    info!(
        "订阅源{}抓取完成，共{}条曲目",
        feed.name,
        feed.tracks.len()
    );
    Ok(feed)
}

/// 从页面 HTML 解析订阅源记录（纯函数，抓取时刻由调用方传入）。
pub fn parse_feed_page(
    feed_name: &str,
    url: &str,
    html: &str,
    scraped: DateTime<Utc>,
) -> Feed {
    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| feed_name.to_string());

    // 曲目页链接形如 href="/<feed>/<slug>/"，按出现顺序去重
    let track_re = Regex::new(&format!(
        r#"href="/{}/([A-Za-z0-9][A-Za-z0-9\-_%]*)/""#,
        regex::escape(feed_name)
    ))
    .unwrap();

    let mut seen = HashSet::new();
    let mut tracks = Vec::new();
    for capture in track_re.captures_iter(html) {
        let slug = capture.get(1).unwrap().as_str();
        if !seen.insert(slug.to_string()) {
            continue;
        }
        tracks.push(Track {
            title: slug.replace('-', " "),
            web_url: format!("{}/{}/{}/", MIXCLOUD_ROOT, feed_name, slug),
            music_url: format!("{}/{}/{}.m4a", STREAM_ROOT, feed_name, slug),
            file_name: format!("{}.m4a", slug),
            length: 0,
        });
    }
    debug!("从页面解析出{}条曲目", tracks.len());

    Feed {
        name: feed_name.to_string(),
        title,
        url: url.to_string(),
        scraped,
        tracks,
    }
}
