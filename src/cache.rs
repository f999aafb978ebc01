use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use log::{debug, warn};

use crate::exception::Exception;
use crate::param::{CACHE_LINES, MAX_CACHE_SIZE, MAX_OBJECT_SIZE};

/// 所有会话共享的缓存句柄
pub type SharedCache = Arc<Mutex<ResponseCache>>;

/// 标签的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TagMatch {
    /// 只比较两个标签中较短者长度的前缀。一个标签是另一个的前缀时也算命中，
    /// 可能把不同的请求当作同一个
    #[default]
    Prefix,
    /// 要求标签完全相同
    Exact,
}

impl TagMatch {
    fn matches(&self, stored: &str, tag: &str) -> bool {
        match self {
            TagMatch::Prefix => {
                let len = stored.len().min(tag.len());
                stored.as_bytes()[..len] == tag.as_bytes()[..len]
            }
            TagMatch::Exact => stored == tag,
        }
    }
}

#[derive(Clone, Default)]
struct CacheLine {
    occupied: bool,
    tag: String,
    body: Bytes,
    recency: u64,
}

/// 命中时返回的快照。`body` 是引用计数的，之后缓存行被覆盖也不影响它。
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: Bytes,
    pub recency: u64,
}

impl CachedResponse {
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// 固定 10 行的响应缓存，按最近最少使用淘汰。
///
/// 调用者通过 `SharedCache` 的互斥锁获得独占访问，`lookup` 与 `insert` 各自在一次加锁内完成。
pub struct ResponseCache {
    lines: Vec<CacheLine>,
    clock: u64,
    max_object_size: usize,
    max_cache_size: usize,
    tag_match: TagMatch,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_limits(MAX_OBJECT_SIZE, MAX_CACHE_SIZE, TagMatch::Prefix)
    }

    pub fn with_limits(max_object_size: usize, max_cache_size: usize, tag_match: TagMatch) -> Self {
        Self {
            lines: vec![CacheLine::default(); CACHE_LINES],
            clock: 0,
            max_object_size,
            max_cache_size,
            tag_match,
        }
    }

    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // 查询，命中时刷新该行的时间戳
    pub fn lookup(&mut self, tag: &str) -> Option<CachedResponse> {
        let tag_match = self.tag_match;
        let index = self
            .lines
            .iter()
            .position(|line| line.occupied && tag_match.matches(&line.tag, tag))?;
        let recency = self.tick();
        let line = &mut self.lines[index];
        line.recency = recency;
        Some(CachedResponse {
            body: line.body.clone(),
            recency,
        })
    }

    // 放入：优先使用第一个空行，否则覆盖时间戳最小的行
    pub fn insert(&mut self, tag: &str, body: Bytes) -> Result<usize, Exception> {
        if !self.should_cache(body.len()) {
            return Err(Exception::ObjectTooLarge);
        }
        let index = match self.lines.iter().position(|line| !line.occupied) {
            Some(i) => i,
            None => self
                .lines
                .iter()
                .enumerate()
                .min_by_key(|(_, line)| line.recency)
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        let recency = self.tick();
        let line = &mut self.lines[index];
        if line.occupied {
            debug!("淘汰缓存行{}：{}", index, line.tag);
        }
        *line = CacheLine {
            occupied: true,
            tag: tag.to_string(),
            body,
            recency,
        };

        let total = self.total_bytes();
        if total > self.max_cache_size {
            warn!("缓存总大小{}超过了建议上限{}", total, self.max_cache_size);
        }
        Ok(index)
    }

    // 检查响应大小是否适合缓存
    pub fn should_cache(&self, size: usize) -> bool {
        size <= self.max_object_size
    }

    pub fn len(&self) -> usize {
        self.lines.iter().filter(|line| line.occupied).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lines.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.occupied)
            .map(|line| line.body.len())
            .sum()
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }
}

/// 获取缓存锁。锁被污染时恢复并继续使用。
pub fn lock(cache: &SharedCache) -> MutexGuard<'_, ResponseCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("缓存锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}
