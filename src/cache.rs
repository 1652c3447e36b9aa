use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::mixcloud::Feed;

/// 订阅源缓存：订阅源标识到最近一次抓取结果的映射。
///
/// 条目年龄按记录自身的抓取时间戳计算（不另设插入时钟）；
/// 年龄达到 TTL 的条目在查询时被惰性剔除，没有后台清扫线程，
/// 也没有容量上限。整个结构由调用方包在 `Arc<Mutex<_>>` 中共享，
/// 查询-剔除序列在一次加锁内完成。
pub struct FeedCache {
    feeds: HashMap<String, Feed>,
    cache_time_seconds: i64,
}

impl FeedCache {
    // 根据 TTL 构造
    pub fn new(cache_time_seconds: i64) -> Self {
        Self {
            feeds: HashMap::new(),
            cache_time_seconds,
        }
    }

    // 放入（无条件覆盖旧记录）
    pub fn push(&mut self, feed_name: &str, feed: Feed) {
        self.feeds.insert(feed_name.to_string(), feed);
    }

    // 查询有效缓存；过期条目作为副作用被剔除
    pub fn find(&mut self, feed_name: &str) -> Option<Feed> {
        self.find_at(feed_name, Utc::now())
    }

    // 按指定时钟查询，供测试模拟时间流逝
    pub fn find_at(&mut self, feed_name: &str, now: DateTime<Utc>) -> Option<Feed> {
        match self.feeds.get(feed_name) {
            Some(feed) => {
                let age_seconds = (now - feed.scraped).num_seconds();
                if age_seconds < self.cache_time_seconds {
                    Some(feed.clone())
                } else {
                    // 把过期的订阅源逐出缓存
                    self.feeds.remove(feed_name);
                    None
                }
            }
            None => None,
        }
    }

    // 测试
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.feeds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn feed(name: &str, scraped: DateTime<Utc>) -> Feed {
        Feed {
            name: name.to_string(),
            title: name.to_string(),
            url: format!("https://www.mixcloud.com/{}/", name),
            scraped,
            tracks: vec![],
        }
    }

    #[test]
    fn test_cache_push_and_find() {
        let mut cache = FeedCache::new(3600);
        let now = Utc::now();

        cache.push("show1", feed("show1", now));
        assert_eq!(cache.len(), 1);

        let found = cache.find_at("show1", now);
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, "show1");
    }

    #[test]
    fn test_cache_expiry_evicts() {
        let mut cache = FeedCache::new(3600);
        let scraped = Utc::now();
        cache.push("show1", feed("show1", scraped));

        // TTL 整点：条目已到期，查询返回空并作为副作用剔除条目
        let later = scraped + Duration::seconds(3600);
        assert!(cache.find_at("show1", later).is_none());
        assert_eq!(cache.len(), 0);

        // 第二次查询同样为空（条目被剔除了，不只是被隐藏）
        assert!(cache.find_at("show1", later).is_none());
    }

    #[test]
    fn test_cache_not_yet_expired() {
        let mut cache = FeedCache::new(3600);
        let scraped = Utc::now();
        cache.push("show1", feed("show1", scraped));

        let almost = scraped + Duration::seconds(3599);
        assert!(cache.find_at("show1", almost).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_age_uses_record_timestamp() {
        let mut cache = FeedCache::new(3600);
        let now = Utc::now();

        // 记录自带的抓取时间早于插入时刻，年龄按记录时间算
        let old_scraped = now - Duration::seconds(4000);
        cache.push("show1", feed("show1", old_scraped));
        assert!(cache.find_at("show1", now).is_none());
    }

    #[test]
    fn test_cache_overwrite_replaces_record() {
        let mut cache = FeedCache::new(3600);
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(100);

        cache.push("show1", feed("show1", t1));
        cache.push("show1", feed("show1", t2));
        assert_eq!(cache.len(), 1);

        let found = cache.find_at("show1", t2).unwrap();
        assert_eq!(found.scraped, t2);
    }

    #[test]
    fn test_cache_zero_ttl_never_returns() {
        let mut cache = FeedCache::new(0);
        let now = Utc::now();
        cache.push("show1", feed("show1", now));
        assert!(cache.find_at("show1", now).is_none());
    }

    #[test]
    fn test_cache_not_found() {
        let mut cache = FeedCache::new(3600);
        assert!(cache.find("nonexistent").is_none());
    }
}
