// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 下载队列模块
//!
//! 该模块实现了并发受限的下载工作池。队列里的条目以目标本地路径为唯一标识，
//! 同一标识在 {排队, 传输中} 两种状态下最多存在一个，重复入队是空操作。
//!
//! `process_queue` 负责把工作者数量补到配置的上限，已经饱和时什么也不做；
//! 每个工作者循环认领条目并执行传输，失败只记日志、不重试，也不影响
//! 其它工作者或其它条目。完成的标识直接从队列状态中消失：磁盘上的文件
//! 才是“已下载”的事实来源。

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::exception::Exception;
use crate::mixcloud::CLIENT;

/// 一条待下载的曲目。标识是目标本地路径。
#[derive(Debug, Clone)]
pub struct Download {
    /// 音频流的来源地址
    pub url: String,
    /// 下载目标路径（`music_dir/<feed>/<file>`），同时作为去重标识
    pub local_path: PathBuf,
    /// 所属订阅源标识，只用于日志
    pub feed_name: String,
    /// 曲目标题，只用于日志
    pub title: String,
}

/// 互斥保护下的队列内部状态。
struct QueueState {
    /// 排队中的条目，入队顺序保存
    pending: Vec<Download>,
    /// 传输中条目的标识集合
    active: HashSet<PathBuf>,
    /// 正在运行的工作者数量
    workers: usize,
}

/// 并发受限的下载队列。由服务器进程显式构造一个长寿命实例，
/// 用 `Arc` 传给每个连接处理器。
pub struct DownloadQueue {
    state: Mutex<QueueState>,
    download_threads: usize,
    oldest_first: bool,
}

impl DownloadQueue {
    /// 构造队列。`download_threads` 是工作者数量上限（配置层已钳制到 [1,50]），
    /// `oldest_first` 选择出队顺序（默认最新优先）。
    pub fn new(download_threads: usize, oldest_first: bool) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: Vec::new(),
                active: HashSet::new(),
                workers: 0,
            }),
            download_threads,
            oldest_first,
        }
    }

    /// 入队一条下载。按标识幂等：该标识已在排队或传输中时为空操作，返回 `false`。
    pub fn enqueue(&self, item: Download) -> bool {
        let mut state = self.lock_state();
        if state.active.contains(&item.local_path)
            || state.pending.iter().any(|d| d.local_path == item.local_path)
        {
            debug!("条目已在队列中，忽略重复入队：{}", item.local_path.display());
            return false;
        }
        state.pending.push(item);
        true
    }

    /// 排队中的条目数量（不含传输中的）。
    pub fn queue_size(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// 确保工作者正在消化队列：把工作者数量补齐到上限与待处理量的较小值。
    /// 已经饱和或队列为空时是空操作，绝不超出并发上限。
    pub fn process_queue(self: &Arc<Self>) {
        let to_spawn = {
            let mut state = self.lock_state();
            let capacity = self.download_threads.saturating_sub(state.workers);
            let to_spawn = capacity.min(state.pending.len());
            state.workers += to_spawn;
            to_spawn
        };

        for _ in 0..to_spawn {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.run_worker().await;
            });
        }
        if to_spawn > 0 {
            debug!("启动了{}个下载工作者", to_spawn);
        }
    }

    /// 工作者主循环：认领、传输、标记，直到队列排空。
    async fn run_worker(self: Arc<Self>) {
        loop {
            let item = match self.claim_or_exit() {
                Some(item) => item,
                None => break,
            };
            info!(
                "开始下载[{}]{} -> {}",
                item.feed_name,
                item.title,
                item.local_path.display()
            );
            match transfer(&item).await {
                Ok(bytes) => {
                    info!(
                        "下载完成：{}（{}字节）",
                        item.local_path.display(),
                        bytes
                    );
                }
                Err(e) => {
                    // 失败不自动重试；下次订阅源响应发现文件缺失时会重新入队
                    error!("下载失败：{}，错误：{}", item.local_path.display(), e);
                }
            }
            self.finish(&item);
        }
    }

    /// 按出队策略认领下一个条目，并把标识移入传输中集合；
    /// 队列已空时在同一次加锁内把本工作者计入退场并返回 `None`。
    ///
    /// 判空与退场必须是同一个临界区：入队方读取 `workers` 计算容量时，
    /// 看到空队列的工作者要么还会回来认领，要么已经不在计数里，
    /// 不存在“计入容量却即将退出”的中间状态。
    fn claim_or_exit(&self) -> Option<Download> {
        let mut state = self.lock_state();
        let item = if self.oldest_first {
            if state.pending.is_empty() {
                None
            } else {
                Some(state.pending.remove(0))
            }
        } else {
            state.pending.pop()
        };
        match item {
            Some(item) => {
                state.active.insert(item.local_path.clone());
                Some(item)
            }
            None => {
                state.workers -= 1;
                None
            }
        }
    }

    /// 传输结束（无论成败）后把标识移出传输中集合。
    fn finish(&self, item: &Download) {
        let mut state = self.lock_state();
        state.active.remove(&item.local_path);
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("下载队列锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    // 测试
    #[cfg(test)]
    pub fn workers(&self) -> usize {
        self.lock_state().workers
    }

    #[cfg(test)]
    pub fn active_len(&self) -> usize {
        self.lock_state().active.len()
    }
}

/// 把一条曲目下载到本地：先写 `.part` 临时文件，传输完成后改名到目标路径，
/// 避免半截文件被当成已下载。传输失败时删掉临时文件。返回写入的字节数。
async fn transfer(item: &Download) -> Result<u64, Exception> {
    let response = CLIENT.get(&item.url).send().await?.error_for_status()?;

    if let Some(parent) = item.local_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let part_path = part_path_for(&item.local_path);

    match write_part_file(response, &part_path).await {
        Ok(total) => {
            fs::rename(&part_path, &item.local_path).await?;
            Ok(total)
        }
        Err(e) => {
            let _ = fs::remove_file(&part_path).await;
            Err(e)
        }
    }
}

/// 把响应体流式写入临时文件。
async fn write_part_file(response: reqwest::Response, part_path: &Path) -> Result<u64, Exception> {
    let mut file = fs::File::create(part_path).await?;

    let mut total: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(total)
}

/// 目标路径对应的临时文件路径：在完整文件名之后追加 `.part`，
/// 保留原有后缀，同目录下不同后缀的同名曲目不会共用临时文件。
fn part_path_for(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}
