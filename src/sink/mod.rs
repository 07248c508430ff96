//! 输出端模块
//!
//! 管道内部保证同一工厂实例不会并发调用同一个 sink 的 `accept`；
//! 批次所有权始终在调度器手里，sink 不得在 `accept` 返回后保留引用。

use crate::event::{Batch, LogEvent};

/// 批次消费端
pub trait Sink: Send {
    /// 输出端名称，用于兜底日志标识
    fn name(&self) -> &'static str;

    /// 生命周期：启动
    fn start(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// 生命周期：停止，停止后不再收到批次
    fn stop(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// 消费一个批次；批次中的事件已经过 enrich 与传输编码
    fn accept(&mut self, batch: &Batch) -> Result<(), String>;
}

/// 单事件消费端 - 经 `BatchingSink` 适配成批次口径
pub trait EventSink: Send {
    fn name(&self) -> &'static str;

    fn emit(&mut self, event: &LogEvent) -> Result<(), String>;

    fn flush(&mut self) -> Result<(), String> {
        Ok(())
    }
}

pub mod console;
pub mod composite;
pub mod monitor;
pub mod queue;
pub mod batching;

pub use console::{ConsoleSink, ConsoleConfig};
pub use composite::CompositeSink;
pub use monitor::{MonitorSink, MonitorHandle};
pub use queue::{QueueSink, QueueHandle};
pub use batching::BatchingSink;
