//! # 播客 XML 序列化模块
//!
//! 把一条订阅源记录序列化为 RSS 2.0（含 iTunes 命名空间）文档。
//! 曲目的 enclosure 地址指回本服务器，播客客户端由此下载媒体文件。

use crate::mixcloud::{Feed, Track};
use crate::param::CRLF;

/// 把订阅源渲染为完整的 RSS XML 文档。
///
/// `host` 取自请求的 Host 标头，enclosure 地址形如
/// `http://<host>/<feed>/<file>`。
pub fn create_xml(feed: &Feed, host: &str) -> String {
    let mut xml = String::with_capacity(1024 + feed.tracks.len() * 512);

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(CRLF);
    xml.push_str(r#"<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">"#);
    xml.push_str(CRLF);
    xml.push_str("<channel>");
    xml.push_str(CRLF);

    push_element(&mut xml, "title", &feed.title);
    push_element(&mut xml, "link", &feed.url);
    push_element(
        &mut xml,
        "description",
        &format!("{} (via podserver)", feed.title),
    );
    push_element(&mut xml, "itunes:author", &feed.name);
    push_element(
        &mut xml,
        "lastBuildDate",
        &feed.scraped.to_rfc2822(),
    );

    for track in &feed.tracks {
        xml.push_str("<item>");
        xml.push_str(CRLF);
        push_element(&mut xml, "title", &track.title);
        push_element(&mut xml, "link", &track.web_url);
        push_element(&mut xml, "guid", &track.web_url);
        xml.push_str(&format!(
            r#"<enclosure url="{}" length="{}" type="audio/mp4"/>"#,
            escape_xml(&enclosure_url(feed, track, host)),
            track.length
        ));
        xml.push_str(CRLF);
        xml.push_str("</item>");
        xml.push_str(CRLF);
    }

    xml.push_str("</channel>");
    xml.push_str(CRLF);
    xml.push_str("</rss>");
    xml.push_str(CRLF);
    xml
}

/// 曲目在本服务器上的下载地址。
fn enclosure_url(feed: &Feed, track: &Track, host: &str) -> String {
    format!("http://{}/{}/{}", host, feed.name, track.file_name)
}

fn push_element(xml: &mut String, name: &str, text: &str) {
    xml.push_str(&format!("<{}>{}</{}>", name, escape_xml(text), name));
    xml.push_str(CRLF);
}

/// XML 字符转义。
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
