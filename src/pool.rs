//! 解析器池
//!
//! 轮转的解析器多重集合，为每个端点维护超时计数。
//! 同一端点超时累计达到上限后永久拉黑，不再参与轮转。

use std::collections::{HashMap, HashSet, VecDeque};

/// 拉黑阈值，超时次数达到该值的解析器被永久移除
pub const MAX_RESOLVER_TIMEOUTS: u32 = 3;

/// 超时上报的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutVerdict {
    /// 解析器回到池中，附带新的超时计数
    Recycled(u32),
    /// 解析器被永久拉黑，附带最终超时计数
    Blacklisted(u32),
}

/// 解析器池
#[derive(Debug, Default)]
pub struct ResolverPool {
    // 空闲解析器，按最近归还时间轮转
    idle: VecDeque<String>,
    timeouts: HashMap<String, u32>,
    blacklisted: HashSet<String>,
}

impl ResolverPool {
    /// 从解析器地址列表构建池，保留重复项
    pub fn new(resolvers: Vec<String>) -> Self {
        ResolverPool {
            idle: resolvers.into(),
            timeouts: HashMap::new(),
            blacklisted: HashSet::new(),
        }
    }

    /// 取出一个解析器供本次查询使用，轮转顺序
    pub fn dequeue(&mut self) -> Option<String> {
        // 拉黑的同名副本可能还留在队列里，跳过
        while let Some(resolver) = self.idle.pop_front() {
            if !self.blacklisted.contains(&resolver) {
                return Some(resolver);
            }
        }
        None
    }

    /// 查询成功后归还解析器，计数不变
    pub fn recycle(&mut self, resolver: String) {
        if !self.blacklisted.contains(&resolver) {
            self.idle.push_back(resolver);
        }
    }

    /// 上报一次超时；计数达到上限则拉黑，否则归还
    pub fn report_timeout(&mut self, resolver: &str) -> TimeoutVerdict {
        let count = self.timeouts.entry(resolver.to_string()).or_insert(0);
        *count += 1;
        let count = *count;
        if count >= MAX_RESOLVER_TIMEOUTS {
            self.blacklisted.insert(resolver.to_string());
            TimeoutVerdict::Blacklisted(count)
        } else {
            self.idle.push_back(resolver.to_string());
            TimeoutVerdict::Recycled(count)
        }
    }

    /// 当前空闲可用的解析器数量
    pub fn remaining(&self) -> usize {
        self.idle
            .iter()
            .filter(|r| !self.blacklisted.contains(*r))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(resolvers: &[&str]) -> ResolverPool {
        ResolverPool::new(resolvers.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_round_robin() {
        let mut pool = pool(&["1.1.1.1", "8.8.8.8"]);
        let first = pool.dequeue().unwrap();
        assert_eq!(first, "1.1.1.1");
        pool.recycle(first);
        // 归还到队尾，下一次取到的是另一个
        assert_eq!(pool.dequeue().unwrap(), "8.8.8.8");
    }

    #[test]
    fn test_recycle_then_dequeue_round_trip() {
        let mut pool = pool(&["1.1.1.1"]);
        let resolver = pool.dequeue().unwrap();
        assert_eq!(pool.remaining(), 0);
        pool.recycle(resolver);
        assert_eq!(pool.remaining(), 1);
        assert!(pool.dequeue().is_some());
    }

    #[test]
    fn test_blacklist_after_three_timeouts() {
        let mut pool = pool(&["1.1.1.1"]);
        let resolver = pool.dequeue().unwrap();
        assert_eq!(pool.report_timeout(&resolver), TimeoutVerdict::Recycled(1));
        let resolver = pool.dequeue().unwrap();
        assert_eq!(pool.report_timeout(&resolver), TimeoutVerdict::Recycled(2));
        let resolver = pool.dequeue().unwrap();
        assert_eq!(
            pool.report_timeout(&resolver),
            TimeoutVerdict::Blacklisted(3)
        );
        // 拉黑后永远取不到
        assert_eq!(pool.dequeue(), None);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn test_blacklist_covers_duplicate_entries() {
        // 同一端点的两个副本，其中一个在池里时另一个被拉黑
        let mut pool = pool(&["1.1.1.1", "1.1.1.1"]);
        let resolver = pool.dequeue().unwrap();
        pool.report_timeout(&resolver);
        let resolver = pool.dequeue().unwrap();
        pool.report_timeout(&resolver);
        let resolver = pool.dequeue().unwrap();
        assert_eq!(
            pool.report_timeout(&resolver),
            TimeoutVerdict::Blacklisted(3)
        );
        assert_eq!(pool.dequeue(), None);
    }

    #[test]
    fn test_recycle_blacklisted_is_dropped() {
        let mut pool = pool(&["1.1.1.1", "8.8.8.8"]);
        for _ in 0..3 {
            pool.report_timeout("1.1.1.1");
        }
        pool.recycle("1.1.1.1".to_string());
        assert_eq!(pool.dequeue(), Some("8.8.8.8".to_string()));
        assert_eq!(pool.dequeue(), None);
    }
}
