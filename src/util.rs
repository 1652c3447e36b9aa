use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::param::SERVER_NAME;

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    /// 站点根路径的横幅页面：简单介绍服务器用法。
    pub fn banner() -> Self {
        let title = SERVER_NAME.to_string();
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let body = format!(
            r"
            <h1>{}</h1>
            <p>这是一个把Mixcloud订阅源转换为播客RSS的个人服务器。</p>
            <p>在播客客户端中订阅 <code>http://本机地址/用户名/podcast.xml</code> 即可。</p>
            ",
            SERVER_NAME
        );
        Self { title, css, body }
    }

    pub fn from_dir(path: &str, dir_vec: &mut Vec<PathBuf>) -> Self {
        let mut body = String::new();
        sort_dir_entries(dir_vec);

        let mut path_mut = path;
        if path_mut.ends_with('/') && path_mut.len() > 1 {
            let len = path_mut.len();
            path_mut = &path_mut[..(len - 1)];
        }
        body.push_str(&format!("<h1>{}的文件列表</h1><hr>", path_mut));
        body.push_str("<table>");
        body.push_str(
            r#"
            <tr>
                <td>文件名</td>
                <td>大小</td>
                <td>修改时间</td>
            </tr>
            <tr>
                <td><a href="../">..</a></td>
                <td></td>
                <td></td>
            </tr>
            "#,
        );
        for entry in dir_vec {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let formatted_time = match metadata.modified() {
                Ok(time) => {
                    let local_time: DateTime<Local> = time.into();
                    local_time.format("%Y-%m-%d %H:%M:%S %Z").to_string()
                }
                Err(_) => "".to_string(),
            };

            let filename = match entry.file_name() {
                Some(name) => name.to_string_lossy(),
                None => continue,
            };

            if entry.is_file() {
                let size = metadata.len();
                let formatted_size = format_file_size(size);
                body.push_str(&format!(
                    r#"
                    <tr>
                        <td><a href="{}">{}</a></td>
                        <td>{}</td>
                        <td>{}</td>
                    </tr>
                    "#,
                    &filename, &filename, &formatted_size, &formatted_time
                ));
            } else if entry.is_dir() {
                let filename = [&filename, "/"].concat();
                body.push_str(&format!(
                    r#"
                    <tr>
                    <td><a href="{}">{}</a></td>
                        <td>文件夹</td>
                        <td>{}</td>
                    </tr>
                    "#,
                    &filename, &filename, &formatted_time
                ));
            }
        }
        body.push_str("</table>");
        let title = format!("{}的文件列表", path);
        let css = r"
            table {
                border-collapse: collapse;
                width: 100%;
            }

            td {
                padding: 8px;
                white-space: pre-wrap; /* 保留换行符和空格 */
                border: none; /* 隐藏单元格边框 */
            }

            th {
                padding: 8px;
                border: none; /* 隐藏表头边框 */
            }"
        .to_string();
        HtmlBuilder { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <!-- 本文件由podserver自动生成 -->
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

fn sort_dir_entries(vec: &mut Vec<PathBuf>) {
    vec.sort_by(|a, b| {
        let a_is_dir = a.is_dir();
        let b_is_dir = b.is_dir();

        if a_is_dir && !b_is_dir {
            std::cmp::Ordering::Less
        } else if !a_is_dir && b_is_dir {
            std::cmp::Ordering::Greater
        } else {
            a.cmp(b)
        }
    });
}
