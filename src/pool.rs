//! 对象池模块 - 有界空闲链表，消除热路径上的逐次堆分配
//!
//! 空闲链表为空时直接构造新实例（超出容量的实例不入池），
//! 因此 `acquire` 永不阻塞；归还时池已满则直接丢弃。

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;

/// 池运行统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// acquire 调用总数
    pub acquired: u64,
    /// 新构造的实例数（空闲链表未命中）
    pub created: u64,
    /// 从空闲链表复用的实例数
    pub recycled: u64,
    /// 归还时因池满被丢弃的实例数
    pub discarded: u64,
}

/// 有界对象池
pub struct Pool<T> {
    slots: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    acquired: AtomicU64,
    created: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

impl<T> Pool<T> {
    /// 创建容量为 `capacity` 的对象池，`factory` 负责构造新实例
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        assert!(capacity > 0, "对象池容量不能为 0");
        Self {
            slots: ArrayQueue::new(capacity),
            factory: Box::new(factory),
            acquired: AtomicU64::new(0),
            created: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// 预热：提前填充 n 个实例（不超过容量）
    pub fn warm(&self, n: usize) {
        for _ in 0..n {
            if self.slots.push((self.factory)()).is_err() {
                break;
            }
        }
    }

    /// 获取一个实例：优先复用，链表为空则新建，永不阻塞
    pub fn acquire(&self) -> T {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        match self.slots.pop() {
            Some(instance) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
                instance
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        }
    }

    /// 归还实例；池满时丢弃
    pub fn release(&self, instance: T) {
        if self.slots.push(instance).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 清空所有保留实例（关停时调用）
    pub fn clear(&self) {
        while self.slots.pop().is_some() {}
    }

    /// 当前空闲链表中保留的实例数
    pub fn retained(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
