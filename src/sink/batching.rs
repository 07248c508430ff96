//! 微批适配器 - 把单事件输出端接入批次口径
//!
//! 适配器持有自己的工作线程与命令通道：`accept` 仅把事件拷贝
//! 投递给工作线程，由工作线程按条数/时间间隔聚合后逐条转交
//! 内部的 `EventSink`，停止时先排空缓冲再退出。

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::event::{Batch, LogEvent};
use crate::sink::{EventSink, Sink};

/// 工作线程命令
enum Command {
    Emit(LogEvent),
    Shutdown,
}

/// 微批适配器
pub struct BatchingSink {
    name: &'static str,
    max_batch: usize,
    poll_interval: Duration,
    worker: Option<Worker>,
    /// start 前暂存内部输出端
    inner: Option<Box<dyn EventSink>>,
}

struct Worker {
    tx: Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl BatchingSink {
    pub fn new(inner: Box<dyn EventSink>, max_batch: usize, poll_interval_ms: u64) -> Self {
        assert!(max_batch > 0, "微批大小不能为 0");
        assert!(poll_interval_ms > 0, "轮询间隔不能为 0");
        Self {
            name: inner.name(),
            max_batch,
            poll_interval: Duration::from_millis(poll_interval_ms),
            worker: None,
            inner: Some(inner),
        }
    }

    fn worker_loop(
        mut sink: Box<dyn EventSink>,
        rx: Receiver<Command>,
        max_batch: usize,
        poll_interval: Duration,
    ) {
        let name = sink.name();
        let mut pending: Vec<LogEvent> = Vec::with_capacity(max_batch);
        let mut last_drain = Instant::now();

        loop {
            let command = match rx.recv_timeout(poll_interval) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
            };

            match command {
                Some(Command::Emit(event)) => {
                    pending.push(event);
                    if pending.len() >= max_batch || last_drain.elapsed() >= poll_interval {
                        Self::drain(&mut sink, &mut pending, name);
                        last_drain = Instant::now();
                    }
                }
                None => {
                    Self::drain(&mut sink, &mut pending, name);
                    if let Err(e) = sink.flush() {
                        eprintln!("[{}] 刷新失败: {}", name, e);
                    }
                    last_drain = Instant::now();
                }
                Some(Command::Shutdown) => {
                    // 退出前排空缓冲
                    Self::drain(&mut sink, &mut pending, name);
                    if let Err(e) = sink.flush() {
                        eprintln!("[{}] 停止时刷新失败: {}", name, e);
                    }
                    break;
                }
            }
        }
    }

    fn drain(sink: &mut Box<dyn EventSink>, pending: &mut Vec<LogEvent>, name: &'static str) {
        for event in pending.drain(..) {
            if let Err(e) = sink.emit(&event) {
                eprintln!("[{}] 处理事件失败: {}", name, e);
            }
        }
    }
}

impl Sink for BatchingSink {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self) -> Result<(), String> {
        if self.worker.is_some() {
            return Ok(());
        }
        let inner = self
            .inner
            .take()
            .ok_or_else(|| "微批适配器已消耗内部输出端".to_string())?;

        let (tx, rx) = unbounded();
        let max_batch = self.max_batch;
        let poll_interval = self.poll_interval;
        let thread = thread::spawn(move || {
            Self::worker_loop(inner, rx, max_batch, poll_interval);
        });

        self.worker = Some(Worker { tx, thread: Some(thread) });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), String> {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.tx.send(Command::Shutdown);
            if let Some(thread) = worker.thread.take() {
                thread.join().map_err(|_| "工作线程异常退出".to_string())?;
            }
        }
        Ok(())
    }

    fn accept(&mut self, batch: &Batch) -> Result<(), String> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| "微批适配器未启动".to_string())?;
        for event in &batch.events {
            worker
                .tx
                .send(Command::Emit(event.clone()))
                .map_err(|e| format!("投递事件失败: {}", e))?;
        }
        Ok(())
    }
}

impl Drop for BatchingSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
