//! 批次调度器 - 管道的唯一消费者线程
//!
//! 工作线程按定时间隔排空摄入通道，把事件聚成大小受限的批次
//! 交给输出端；大积压按批次大小分片流式派发，不会形成无界批次。
//! 每个派发过的事件无论输出端成败都会回池。显式刷新与关停通过
//! 控制命令通道送达，保证所有 sink 调用都发生在同一线程上。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::channel::EventChannel;
use crate::event::{Batch, LogEvent};
use crate::pool::Pool;
use crate::sink::Sink;

/// 控制命令
enum Control {
    /// 刷新：`wait` 为等待首条事件的时限，完成后回 ack
    Flush { wait: Duration, ack: Sender<()> },
    /// 停机：先做一次零等待刷新，再停止输出端
    Shutdown,
}

/// 调度参数
pub struct DispatchSettings {
    pub domain: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub sensitive_keys: Vec<String>,
}

/// 调度器句柄，工作线程随句柄销毁而退出
pub struct Dispatcher {
    control_tx: Sender<Control>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Dispatcher {
    /// 启动调度工作线程
    pub fn start(
        channel: Arc<EventChannel>,
        pool: Arc<Pool<LogEvent>>,
        sink: Box<dyn Sink>,
        settings: DispatchSettings,
    ) -> Self {
        let (control_tx, control_rx) = unbounded();
        let thread = thread::spawn(move || {
            Self::worker(sink, channel, pool, settings, control_rx);
        });
        Self { control_tx, thread: Some(thread) }
    }

    /// 显式刷新：等待调度线程完成一轮排空后返回
    ///
    /// `wait` 为通道为空时等待首条事件的时限，零等待的刷新在
    /// 空通道上立即完成。返回 false 表示调度线程未在限期内应答。
    pub fn flush(&self, wait: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self.control_tx.send(Control::Flush { wait, ack: ack_tx }).is_err() {
            return false;
        }
        ack_rx.recv_timeout(wait + Duration::from_secs(5)).is_ok()
    }

    /// 停机并等待工作线程退出
    pub fn shutdown(&mut self) {
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn worker(
        mut sink: Box<dyn Sink>,
        channel: Arc<EventChannel>,
        pool: Arc<Pool<LogEvent>>,
        settings: DispatchSettings,
        control_rx: Receiver<Control>,
    ) {
        if let Err(e) = sink.start() {
            eprintln!("[watch] 输出端 {} 启动失败: {}", sink.name(), e);
        }

        loop {
            crossbeam_channel::select! {
                recv(control_rx) -> command => match command {
                    Ok(Control::Flush { wait, ack }) => {
                        Self::flush_cycle(&mut sink, &channel, &pool, &settings, wait);
                        let _ = ack.send(());
                    }
                    Ok(Control::Shutdown) | Err(_) => {
                        // 退出前的最终零等待排空
                        Self::flush_cycle(&mut sink, &channel, &pool, &settings, Duration::ZERO);
                        if let Err(e) = sink.stop() {
                            eprintln!("[watch] 输出端 {} 停止失败: {}", sink.name(), e);
                        }
                        break;
                    }
                },
                default(settings.flush_interval) => {
                    Self::flush_cycle(&mut sink, &channel, &pool, &settings, Duration::ZERO);
                }
            }
        }
    }

    /// 一轮刷新：可选等待首条事件，然后非阻塞排空，按批次大小分片派发
    fn flush_cycle(
        sink: &mut Box<dyn Sink>,
        channel: &EventChannel,
        pool: &Pool<LogEvent>,
        settings: &DispatchSettings,
        wait: Duration,
    ) {
        let mut working: Vec<LogEvent> = Vec::with_capacity(settings.batch_size);

        if !wait.is_zero() {
            match channel.pop_timeout(wait) {
                Some(event) => working.push(event),
                // 限期内没有任何事件，本轮无事可做
                None => return,
            }
        }

        while let Some(event) = channel.try_pop() {
            working.push(event);
            if working.len() >= settings.batch_size {
                Self::dispatch(sink, pool, settings, std::mem::take(&mut working));
                working.reserve(settings.batch_size);
            }
        }

        if !working.is_empty() {
            Self::dispatch(sink, pool, settings, working);
        }
    }

    /// 派发一个批次：逐条文本化、编码，交给输出端后全部回池
    fn dispatch(
        sink: &mut Box<dyn Sink>,
        pool: &Pool<LogEvent>,
        settings: &DispatchSettings,
        mut events: Vec<LogEvent>,
    ) {
        for event in &mut events {
            event.enrich(&settings.sensitive_keys);
            event.transport_encode();
        }

        let batch = Batch::new(settings.domain.clone(), events);
        if let Err(e) = sink.accept(&batch) {
            eprintln!("[watch] 输出端 {} 处理批次失败: {}", sink.name(), e);
        }

        for event in batch.events {
            pool.release(event);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Push;
    use crate::config::Level;
    use crate::event::EventPayload;
    use crate::sink::{MonitorSink, Sink};

    fn settings(batch_size: usize) -> DispatchSettings {
        DispatchSettings {
            domain: "test".to_string(),
            batch_size,
            // 定时器拉长，测试只靠显式刷新驱动
            flush_interval: Duration::from_secs(60),
            sensitive_keys: Vec::new(),
        }
    }

    fn push_event(channel: &EventChannel, pool: &Pool<LogEvent>, title: &str) {
        let mut event = pool.acquire();
        event.reset();
        event.title = title.to_string();
        event.level = Level::Info;
        event.set_payload(EventPayload::text(format!("载荷-{}", title)));
        match channel.push(event) {
            Push::Stored { evicted } => {
                for old in evicted {
                    pool.release(old);
                }
            }
            Push::Rejected(event) => pool.release(event),
        }
    }

    #[test]
    fn flush_streams_in_batch_sized_chunks() {
        let channel = Arc::new(EventChannel::new(64));
        let pool: Arc<Pool<LogEvent>> = Arc::new(Pool::new(64, LogEvent::new));
        let monitor = MonitorSink::new();
        let handle = monitor.handle();

        let mut dispatcher =
            Dispatcher::start(Arc::clone(&channel), Arc::clone(&pool), Box::new(monitor), settings(4));

        for i in 0..10 {
            push_event(&channel, &pool, &format!("e{}", i));
        }
        assert!(dispatcher.flush(Duration::ZERO));

        // 10 条事件按批次大小 4 分成 3 个批次
        assert_eq!(handle.len(), 10);
        assert_eq!(handle.batches(), 3);

        // 事件经过文本化与传输编码后回池
        let captured = handle.snapshot();
        assert_eq!(captured[0].title, "e0");
        assert!(!captured[0].transport_encoding.is_empty());
        assert_eq!(captured[0].decoded_payload().unwrap(), "载荷-e0");

        dispatcher.shutdown();
        assert_eq!(pool.retained(), 10.min(pool.capacity()));
    }

    #[test]
    fn zero_wait_flush_on_empty_channel_returns_promptly() {
        let channel = Arc::new(EventChannel::new(8));
        let pool: Arc<Pool<LogEvent>> = Arc::new(Pool::new(8, LogEvent::new));
        let monitor = MonitorSink::new();
        let handle = monitor.handle();

        let dispatcher =
            Dispatcher::start(Arc::clone(&channel), Arc::clone(&pool), Box::new(monitor), settings(4));

        assert!(dispatcher.flush(Duration::ZERO));
        assert_eq!(handle.batches(), 0);
        assert!(handle.is_empty());
    }

    #[test]
    fn timed_wait_flush_times_out_cleanly() {
        let channel = Arc::new(EventChannel::new(8));
        let pool: Arc<Pool<LogEvent>> = Arc::new(Pool::new(8, LogEvent::new));
        let monitor = MonitorSink::new();
        let handle = monitor.handle();

        let dispatcher =
            Dispatcher::start(Arc::clone(&channel), Arc::clone(&pool), Box::new(monitor), settings(4));

        // 等待 20ms 内无事件到达，刷新干净返回
        assert!(dispatcher.flush(Duration::from_millis(20)));
        assert!(handle.is_empty());
    }

    #[test]
    fn failing_sink_does_not_stop_subsequent_cycles() {
        struct FlakySink {
            calls: u32,
            delivered: Arc<parking_lot::Mutex<u32>>,
        }

        impl Sink for FlakySink {
            fn name(&self) -> &'static str {
                "flaky"
            }

            fn accept(&mut self, batch: &Batch) -> Result<(), String> {
                self.calls += 1;
                if self.calls == 1 {
                    return Err("首个批次故意失败".to_string());
                }
                *self.delivered.lock() += batch.len() as u32;
                Ok(())
            }
        }

        let delivered = Arc::new(parking_lot::Mutex::new(0u32));
        let channel = Arc::new(EventChannel::new(8));
        let pool: Arc<Pool<LogEvent>> = Arc::new(Pool::new(8, LogEvent::new));
        let sink = FlakySink { calls: 0, delivered: Arc::clone(&delivered) };

        let dispatcher =
            Dispatcher::start(Arc::clone(&channel), Arc::clone(&pool), Box::new(sink), settings(4));

        push_event(&channel, &pool, "丢弃");
        assert!(dispatcher.flush(Duration::ZERO));

        push_event(&channel, &pool, "送达");
        assert!(dispatcher.flush(Duration::ZERO));

        assert_eq!(*delivered.lock(), 1);
    }

    #[test]
    fn shutdown_drains_remaining_events() {
        let channel = Arc::new(EventChannel::new(8));
        let pool: Arc<Pool<LogEvent>> = Arc::new(Pool::new(8, LogEvent::new));
        let monitor = MonitorSink::new();
        let handle = monitor.handle();

        let mut dispatcher =
            Dispatcher::start(Arc::clone(&channel), Arc::clone(&pool), Box::new(monitor), settings(4));

        push_event(&channel, &pool, "残留1");
        push_event(&channel, &pool, "残留2");
        channel.close();
        dispatcher.shutdown();

        let titles: Vec<String> = handle.take_all().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["残留1", "残留2"]);
    }
}
