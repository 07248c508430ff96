//! 监视输出端 - 无界捕获队列，测试与诊断用
//!
//! 可配置模拟延迟，用于压测 sink 变慢时管道的行为。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::{Batch, LogEvent};
use crate::sink::Sink;

/// 捕获队列的读取句柄
#[derive(Clone)]
pub struct MonitorHandle {
    events: Arc<Mutex<VecDeque<LogEvent>>>,
    batches: Arc<Mutex<u64>>,
}

impl MonitorHandle {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// 已送达的批次数
    pub fn batches(&self) -> u64 {
        *self.batches.lock()
    }

    /// 拷贝当前全部事件
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// 取走当前全部事件
    pub fn take_all(&self) -> Vec<LogEvent> {
        self.events.lock().drain(..).collect()
    }
}

/// 监视输出端
pub struct MonitorSink {
    events: Arc<Mutex<VecDeque<LogEvent>>>,
    batches: Arc<Mutex<u64>>,
    delay: Option<Duration>,
}

impl MonitorSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            batches: Arc::new(Mutex::new(0)),
            delay: None,
        }
    }

    /// 每个批次处理前模拟的延迟
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            events: Arc::clone(&self.events),
            batches: Arc::clone(&self.batches),
        }
    }
}

impl Default for MonitorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MonitorSink {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn accept(&mut self, batch: &Batch) -> Result<(), String> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut events = self.events.lock();
        for event in &batch.events {
            events.push_back(event.clone());
        }
        *self.batches.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_events_in_order() {
        let mut sink = MonitorSink::new();
        let handle = sink.handle();

        let mut first = LogEvent::new();
        first.title = "一".to_string();
        let mut second = LogEvent::new();
        second.title = "二".to_string();

        sink.accept(&Batch::new("t", vec![first, second])).unwrap();

        let captured = handle.snapshot();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].title, "一");
        assert_eq!(captured[1].title, "二");
        assert_eq!(handle.batches(), 1);

        assert_eq!(handle.take_all().len(), 2);
        assert!(handle.is_empty());
    }
}
