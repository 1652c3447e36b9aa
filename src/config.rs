use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use core::str;
use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

/// 服务器监听端口的默认值与合法区间
const DEFAULT_PORT: u16 = 25683;
const MIN_PORT: u16 = 1024;

/// 下载线程数的默认值与合法区间
const DEFAULT_DOWNLOAD_THREADS: usize = 3;
const MAX_DOWNLOAD_THREADS: usize = 50;

/// 订阅源缓存的默认保留秒数
const DEFAULT_CACHE_TIME_SECONDS: i64 = 3600;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_download_threads")]
    download_threads: usize,
    #[serde(default)]
    download_oldest_first: bool,
    #[serde(default = "default_cache_time_seconds")]
    http_cache_time_seconds: i64,
    #[serde(default = "default_music_dir")]
    music_dir: String,
    #[serde(default = "default_local")]
    local: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_download_threads() -> usize {
    DEFAULT_DOWNLOAD_THREADS
}

fn default_cache_time_seconds() -> i64 {
    DEFAULT_CACHE_TIME_SECONDS
}

fn default_music_dir() -> String {
    "music".to_string()
}

fn default_local() -> bool {
    true
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            worker_threads: 0,
            download_threads: DEFAULT_DOWNLOAD_THREADS,
            download_oldest_first: false,
            http_cache_time_seconds: DEFAULT_CACHE_TIME_SECONDS,
            music_dir: default_music_dir(),
            local: true,
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => panic!("no such file {} exception:{}", filename, e),
        };
        let mut str_val = String::new();
        match file.read_to_string(&mut str_val) {
            Ok(s) => s,
            Err(e) => panic!("Error Reading file: {}", e),
        };

        let raw_config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(_) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置");
                Config::new()
            }
        };
        Self::validate(raw_config)
    }

    /// 对反序列化结果做范围校验，非法值回退到默认值并记录警告。
    fn validate(mut raw_config: Config) -> Config {
        if raw_config.port < MIN_PORT {
            warn!(
                "port被设置为{}，不在[{}, 65535]区间内，改用默认端口{}。",
                raw_config.port, MIN_PORT, DEFAULT_PORT
            );
            raw_config.port = DEFAULT_PORT;
        }
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.download_threads == 0 {
            warn!("download_threads被设置为0，改用1。");
            raw_config.download_threads = 1;
        } else if raw_config.download_threads > MAX_DOWNLOAD_THREADS {
            warn!(
                "download_threads被设置为{}，超出上限，改用{}。",
                raw_config.download_threads, MAX_DOWNLOAD_THREADS
            );
            raw_config.download_threads = MAX_DOWNLOAD_THREADS;
        }
        if raw_config.http_cache_time_seconds < 0 {
            warn!(
                "http_cache_time_seconds被设置为负数{}，改用默认值{}。",
                raw_config.http_cache_time_seconds, DEFAULT_CACHE_TIME_SECONDS
            );
            raw_config.http_cache_time_seconds = DEFAULT_CACHE_TIME_SECONDS;
        }
        raw_config
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn download_threads(&self) -> usize {
        self.download_threads
    }

    pub fn download_oldest_first(&self) -> bool {
        self.download_oldest_first
    }

    pub fn http_cache_time_seconds(&self) -> i64 {
        self.http_cache_time_seconds
    }

    pub fn music_dir(&self) -> &str {
        &self.music_dir
    }

    pub fn local(&self) -> bool {
        self.local
    }

    #[cfg(test)]
    pub fn set_music_dir(&mut self, dir: &str) {
        self.music_dir = dir.to_string();
    }

    #[cfg(test)]
    pub fn set_download_threads(&mut self, n: usize) {
        self.download_threads = n;
    }

    #[cfg(test)]
    pub fn set_download_oldest_first(&mut self, oldest_first: bool) {
        self.download_oldest_first = oldest_first;
    }
}
