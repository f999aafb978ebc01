//! 响应缓存的性质测试：容量、淘汰顺序、时间戳单调性、前缀匹配以及并发访问。

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use cacheproxy::cache::{self, ResponseCache, TagMatch};
use cacheproxy::param::{CACHE_LINES, MAX_CACHE_SIZE, MAX_OBJECT_SIZE};
use proptest::prelude::*;

fn tag(i: usize) -> String {
    format!("host{:03}80/ HTTP/1.0", i)
}

proptest! {
    #[test]
    fn capacity_never_exceeded(
        inserts in prop::collection::vec(
            (0usize..40, prop_oneof![0usize..256, MAX_OBJECT_SIZE - 8..=MAX_OBJECT_SIZE + 8]),
            0..60,
        )
    ) {
        let mut cache = ResponseCache::new();
        for (i, size) in inserts {
            let result = cache.insert(&tag(i), Bytes::from(vec![0u8; size]));
            prop_assert_eq!(result.is_ok(), size <= MAX_OBJECT_SIZE);
            prop_assert!(cache.len() <= CACHE_LINES);
        }
        prop_assert!(cache.total_bytes() <= CACHE_LINES * MAX_OBJECT_SIZE);
    }

    #[test]
    fn evicts_least_recently_used(touches in prop::collection::vec(0usize..CACHE_LINES, 0..30)) {
        let mut cache = ResponseCache::new();
        let mut recency = vec![0u64; CACHE_LINES];
        for i in 0..CACHE_LINES {
            cache.insert(&tag(i), Bytes::from(tag(i))).unwrap();
            recency[i] = cache.clock();
        }
        for i in touches {
            recency[i] = cache.lookup(&tag(i)).unwrap().recency;
        }

        let oldest = (0..CACHE_LINES).min_by_key(|&i| recency[i]).unwrap();
        cache.insert(&tag(100), Bytes::from_static(b"new")).unwrap();

        prop_assert_eq!(cache.len(), CACHE_LINES);
        for i in 0..CACHE_LINES {
            prop_assert_eq!(cache.lookup(&tag(i)).is_some(), i != oldest);
        }
    }

    #[test]
    fn recency_is_monotonic(ops in prop::collection::vec((any::<bool>(), 0usize..15), 1..80)) {
        let mut cache = ResponseCache::new();
        let mut last_clock = cache.clock();
        for (is_insert, i) in ops {
            if is_insert {
                cache.insert(&tag(i), Bytes::from(tag(i))).unwrap();
                prop_assert!(cache.clock() > last_clock);
            } else if let Some(found) = cache.lookup(&tag(i)) {
                prop_assert!(found.recency > last_clock);
                prop_assert_eq!(found.recency, cache.clock());
            } else {
                prop_assert_eq!(cache.clock(), last_clock);
            }
            last_clock = cache.clock();
        }
    }

    #[test]
    fn prefix_of_stored_tag_hits(stored in "[a-z0-9./]{1,40}", cut in 1usize..40) {
        let mut cache = ResponseCache::new();
        cache.insert(&stored, Bytes::from(stored.clone())).unwrap();

        let query = &stored[..cut.min(stored.len())];
        prop_assert_eq!(cache.lookup(query).unwrap().body, Bytes::from(stored.clone()));

        let longer = format!("{}/extra", stored);
        prop_assert!(cache.lookup(&longer).is_some());
    }

    #[test]
    fn exact_match_rejects_strict_prefix(stored in "[a-z0-9./]{2,40}", cut in 1usize..40) {
        let mut cache = ResponseCache::with_limits(MAX_OBJECT_SIZE, MAX_CACHE_SIZE, TagMatch::Exact);
        cache.insert(&stored, Bytes::from(stored.clone())).unwrap();

        let query = &stored[..cut.min(stored.len() - 1)];
        prop_assert!(cache.lookup(query).is_none());
        prop_assert!(cache.lookup(&stored).is_some());
    }
}

/// 多线程交替查询与写入时，读到的响应体总是完整的
#[test]
fn concurrent_access_never_tears() {
    let cache = ResponseCache::new().shared();
    let mut handles = Vec::new();

    for worker in 0..8usize {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for round in 0..500usize {
                let i = (worker * 7 + round) % 16;
                if round % 3 == 0 {
                    // 响应体由同一个字节重复而成，长度由标签决定
                    let body = Bytes::from(vec![i as u8; 64 + i * 100]);
                    cache::lock(&cache).insert(&tag(i), body).unwrap();
                } else {
                    let found = cache::lock(&cache).lookup(&tag(i));
                    if let Some(found) = found {
                        assert_eq!(found.size(), 64 + i * 100);
                        assert!(found.body.iter().all(|&b| b == i as u8));
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cache::lock(&cache).len() <= CACHE_LINES);
}
