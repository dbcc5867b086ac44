use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

use crate::buffer::EntryBuffer;

/// 回收上限：归还时容量超过该值的缓冲直接丢弃，不进入自由链表。
pub const RECYCLE_LIMIT: usize = 1024 * 1024;

/// `BufferPool` 以自由链表复用 [`EntryBuffer`]，减少每个请求的堆分配与扩容开销。
///
/// # 教案式说明
/// - **结构（How）**：`parking_lot::Mutex<Vec<Arc<EntryBuffer>>>` 作为自由链表，
///   `acquire` 弹出任意空闲缓冲，链表为空时现场分配；归还路径由 [`BufferLease`] 的
///   `Drop` 触发，调用方无需关心回收细节。
/// - **契约（What）**：
///   - `acquire` 从不失败，也不会等待其它请求归还；
///   - 同一缓冲在被归还之前不会再次借出；
///   - 归还时若容量超过 `recycle_limit`、仍有别名引用、或空闲数已达 `max_idle`，
///     缓冲被丢弃而非入池。
/// - **风险提示（Trade-offs）**：空闲缓冲之间无顺序保证；长期低负载下自由链表会保留峰值
///   并发数量的缓冲，可通过 [`BufferPool::shrink_to_fit`] 或 `max_idle` 收缩。
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_limits(RECYCLE_LIMIT, None)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("recycle_limit", &self.inner.recycle_limit)
            .field("max_idle", &self.inner.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BufferPool {
    /// 使用默认回收上限创建空池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定回收上限与空闲数量上限创建空池。
    pub fn with_limits(recycle_limit: usize, max_idle: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free_list: Mutex::new(Vec::new()),
                recycle_limit,
                max_idle,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 借出一个空缓冲。
    pub fn acquire(&self) -> BufferLease {
        let reused = self.inner.free_list.lock().pop();
        let buffer = match reused {
            Some(buffer) => {
                self.inner.metrics.reused.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                self.inner.metrics.allocated.fetch_add(1, Ordering::Relaxed);
                Arc::new(EntryBuffer::new())
            }
        };
        self.inner.metrics.active.fetch_add(1, Ordering::Relaxed);
        BufferLease {
            buffer: Some(buffer),
            pool: Arc::clone(&self.inner),
        }
    }

    /// 显式归还租约，等价于 `drop(lease)`。
    pub fn release(&self, lease: BufferLease) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &lease.pool),
            "租约必须归还到借出它的缓冲池"
        );
        drop(lease);
    }

    /// 清空自由链表，返回被释放的缓冲数量。
    pub fn shrink_to_fit(&self) -> usize {
        let mut list = self.inner.free_list.lock();
        let released = list.len();
        list.clear();
        list.shrink_to_fit();
        released
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        let metrics = &self.inner.metrics;
        PoolStats {
            idle: self.inner.free_list.lock().len(),
            active: metrics.active.load(Ordering::Relaxed),
            allocated: metrics.allocated.load(Ordering::Relaxed),
            reused: metrics.reused.load(Ordering::Relaxed),
            recycled: metrics.recycled.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
        }
    }

    /// 当前生效的回收上限。
    pub fn recycle_limit(&self) -> usize {
        self.inner.recycle_limit
    }
}

/// 缓冲池统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 自由链表中的空闲缓冲数。
    pub idle: usize,
    /// 尚未归还的租约数。
    pub active: usize,
    /// 累计新分配次数（自由链表未命中）。
    pub allocated: usize,
    /// 累计从自由链表复用的次数。
    pub reused: usize,
    /// 累计成功回到自由链表的次数。
    pub recycled: usize,
    /// 累计因超限、别名或空闲上限而丢弃的次数。
    pub discarded: usize,
}

/// `BufferLease` 表示一次缓冲借用，`Drop` 时自动归还到所属池。
///
/// # 契约（What）
/// - 通过 [`Deref`] 直接访问 [`EntryBuffer`]；
/// - [`BufferLease::share`] 返回可跨线程克隆的句柄，供请求上下文与辅助任务使用；
///   归还时若这些句柄仍然存活，缓冲会被丢弃，保证不会同时服务两个请求。
pub struct BufferLease {
    buffer: Option<Arc<EntryBuffer>>,
    pool: Arc<PoolInner>,
}

impl BufferLease {
    /// 获取共享句柄。
    pub fn share(&self) -> Arc<EntryBuffer> {
        Arc::clone(self.buffer_ref())
    }

    /// 判断两个租约是否指向同一缓冲实例。
    pub fn same_buffer(&self, other: &Arc<EntryBuffer>) -> bool {
        Arc::ptr_eq(self.buffer_ref(), other)
    }

    fn buffer_ref(&self) -> &Arc<EntryBuffer> {
        match &self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("BufferLease 仅在 Drop 中取出缓冲"),
        }
    }
}

impl Deref for BufferLease {
    type Target = EntryBuffer;

    fn deref(&self) -> &EntryBuffer {
        self.buffer_ref()
    }
}

impl fmt::Debug for BufferLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLease")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.reclaim(buffer);
        }
    }
}

struct PoolInner {
    free_list: Mutex<Vec<Arc<EntryBuffer>>>,
    recycle_limit: usize,
    max_idle: Option<usize>,
    metrics: PoolMetrics,
}

impl PoolInner {
    fn reclaim(&self, mut buffer: Arc<EntryBuffer>) {
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);

        // 仍有别名时不能重置：别处可能正在写入。
        if Arc::get_mut(&mut buffer).is_none() {
            tracing::debug!(
                target: "httprint::pool",
                strong = Arc::strong_count(&buffer),
                "entry buffer still shared at release, dropping it"
            );
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buffer.reset();
        let capacity = buffer.capacity();
        if capacity > self.recycle_limit {
            tracing::debug!(
                target: "httprint::pool",
                capacity,
                recycle_limit = self.recycle_limit,
                "entry buffer exceeds recycle limit, dropping it"
            );
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut list = self.free_list.lock();
        if self.max_idle.is_some_and(|max| list.len() >= max) {
            drop(list);
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        list.push(buffer);
        self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PoolMetrics {
    active: AtomicUsize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new();
        let first = pool.acquire();
        first.append("hello");
        let ptr = Arc::as_ptr(&first.share());
        pool.release(first);

        let second = pool.acquire();
        assert_eq!(Arc::as_ptr(&second.share()), ptr);
        assert!(second.is_empty(), "复用的缓冲必须已被清空");

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    fn oversized_buffer_is_not_pooled() {
        let pool = BufferPool::with_limits(64, None);
        {
            let lease = pool.acquire();
            lease.append(&"x".repeat(128));
        }
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);

        let fresh = pool.acquire();
        assert_eq!(pool.stats().allocated, 2);
        assert!(fresh.is_empty());
    }

    #[test]
    fn aliased_buffer_is_not_pooled() {
        let pool = BufferPool::new();
        let lease = pool.acquire();
        let leaked = lease.share();
        drop(lease);

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);

        let next = pool.acquire();
        assert!(!next.same_buffer(&leaked));
    }

    #[test]
    fn idle_list_respects_max_idle() {
        let pool = BufferPool::with_limits(RECYCLE_LIMIT, Some(1));
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn shrink_to_fit_empties_free_list() {
        let pool = BufferPool::new();
        drop(pool.acquire());
        drop(pool.acquire());
        assert_eq!(pool.stats().idle, 1);

        assert_eq!(pool.shrink_to_fit(), 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn active_leases_are_counted() {
        let pool = BufferPool::new();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.stats().active, 2);
        drop(a);
        assert_eq!(pool.stats().active, 1);
        drop(b);
        assert_eq!(pool.stats().active, 0);
    }
}
