//! 环形队列输出端 - 仅保留最近 N 条事件，旧事件静默逐出

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Batch, LogEvent};
use crate::sink::Sink;

/// 环形队列的读取句柄
#[derive(Clone)]
pub struct QueueHandle {
    events: Arc<Mutex<VecDeque<LogEvent>>>,
}

impl QueueHandle {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// 拷贝当前保留的事件，从旧到新
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

/// 环形队列输出端
pub struct QueueSink {
    capacity: usize,
    events: Arc<Mutex<VecDeque<LogEvent>>>,
}

impl QueueSink {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "环形队列容量不能为 0");
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle { events: Arc::clone(&self.events) }
    }
}

impl Sink for QueueSink {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn accept(&mut self, batch: &Batch) -> Result<(), String> {
        let mut events = self.events.lock();
        for event in &batch.events {
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
        Ok(())
    }
}
