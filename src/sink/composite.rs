//! 组合输出端 - 把一个批次扇出给多个子输出端
//!
//! 批次到达前调度器已完成 enrich 与传输编码，各子输出端共享
//! 同一份编码结果。单个子输出端失败只记录兜底日志，不影响其余。

use crate::event::Batch;
use crate::sink::Sink;

/// 组合输出端
pub struct CompositeSink {
    children: Vec<Box<dyn Sink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self { children: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        self.children.push(sink);
    }

    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.children.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Default for CompositeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for CompositeSink {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn start(&mut self) -> Result<(), String> {
        for child in &mut self.children {
            if let Err(e) = child.start() {
                eprintln!("[composite] 子输出端 {} 启动失败: {}", child.name(), e);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), String> {
        for child in &mut self.children {
            if let Err(e) = child.stop() {
                eprintln!("[composite] 子输出端 {} 停止失败: {}", child.name(), e);
            }
        }
        Ok(())
    }

    fn accept(&mut self, batch: &Batch) -> Result<(), String> {
        for child in &mut self.children {
            if let Err(e) = child.accept(batch) {
                eprintln!("[composite] 子输出端 {} 处理批次失败: {}", child.name(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogEvent;
    use crate::sink::MonitorSink;

    struct FailingSink;

    impl Sink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn accept(&mut self, _batch: &Batch) -> Result<(), String> {
            Err("总是失败".to_string())
        }
    }

    #[test]
    fn failing_child_does_not_block_others() {
        let monitor = MonitorSink::new();
        let handle = monitor.handle();

        let mut composite = CompositeSink::new()
            .with_sink(Box::new(FailingSink))
            .with_sink(Box::new(monitor));

        let mut event = LogEvent::new();
        event.title = "仍然送达".to_string();
        let batch = Batch::new("test", vec![event]);

        assert!(composite.accept(&batch).is_ok());
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.snapshot()[0].title, "仍然送达");
    }
}
