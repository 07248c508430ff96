//! 摄入通道模块 - 有界多生产者单消费者队列，满时丢弃最旧
//!
//! 生产者永不阻塞：通道满时弹出最旧的未读事件为新事件腾位，
//! 被弹出的记录交还调用方回池。关停时通道可关闭写入端。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::event::LogEvent;

/// push 的结果
#[derive(Debug)]
pub enum Push {
    /// 已入队；`evicted` 为腾位时弹出的旧事件，需回池
    Stored { evicted: Vec<LogEvent> },
    /// 通道已关闭写入，事件原样退回
    Rejected(LogEvent),
}

/// 有界事件通道
pub struct EventChannel {
    tx: Sender<LogEvent>,
    rx: Receiver<LogEvent>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// 非阻塞入队，满时逐出最旧事件
    pub fn push(&self, event: LogEvent) -> Push {
        if self.closed.load(Ordering::Acquire) {
            return Push::Rejected(event);
        }

        let mut evicted = Vec::new();
        let mut pending = event;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Push::Stored { evicted },
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    // 腾位：弹出最旧的一条；并发竞争下可能连续多次
                    if let Ok(oldest) = self.rx.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted.push(oldest);
                    }
                }
                Err(TrySendError::Disconnected(back)) => {
                    return Push::Rejected(back);
                }
            }
        }
    }

    /// 非阻塞取出一条事件（仅调度器调用）
    pub fn try_pop(&self) -> Option<LogEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// 限时等待一条事件（flush 的等待阶段使用）
    pub fn pop_timeout(&self, timeout: Duration) -> Option<LogEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// 关闭写入端；已入队的事件仍可被取出
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 因溢出被丢弃的事件总数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_titled(title: &str) -> LogEvent {
        let mut event = LogEvent::new();
        event.title = title.to_string();
        event
    }

    fn push_ok(channel: &EventChannel, title: &str) -> Vec<LogEvent> {
        match channel.push(event_titled(title)) {
            Push::Stored { evicted } => evicted,
            Push::Rejected(_) => panic!("通道不应拒绝"),
        }
    }

    #[test]
    fn fifo_within_capacity() {
        let channel = EventChannel::new(4);
        for title in ["e1", "e2", "e3"] {
            assert!(push_ok(&channel, title).is_empty());
        }

        assert_eq!(channel.try_pop().unwrap().title, "e1");
        assert_eq!(channel.try_pop().unwrap().title, "e2");
        assert_eq!(channel.try_pop().unwrap().title, "e3");
        assert!(channel.try_pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest() {
        let channel = EventChannel::new(4);
        let mut evicted = Vec::new();
        for title in ["e1", "e2", "e3", "e4", "e5", "e6"] {
            evicted.extend(push_ok(&channel, title));
        }

        // 容量 4，入队 6 条：e1、e2 被逐出，保留最近 4 条且保序
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[0].title, "e1");
        assert_eq!(evicted[1].title, "e2");
        assert_eq!(channel.dropped(), 2);

        let remaining: Vec<String> =
            std::iter::from_fn(|| channel.try_pop()).map(|e| e.title).collect();
        assert_eq!(remaining, vec!["e3", "e4", "e5", "e6"]);
    }

    #[test]
    fn closed_channel_rejects_new_events() {
        let channel = EventChannel::new(2);
        push_ok(&channel, "e1");
        channel.close();

        match channel.push(event_titled("late")) {
            Push::Rejected(event) => assert_eq!(event.title, "late"),
            Push::Stored { .. } => panic!("关闭后不应接受写入"),
        }

        // 关闭后残留事件仍可排空
        assert_eq!(channel.try_pop().unwrap().title, "e1");
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let channel = EventChannel::new(2);
        assert!(channel.pop_timeout(Duration::from_millis(10)).is_none());
    }
}
