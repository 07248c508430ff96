//! 工厂模块 - 管道生命周期与进程级定位器
//!
//! 工厂持有两个对象池、摄入通道、调度器与路由表刷新线程。
//! 进程级定位器是可热替换的指针：新工厂先启动再翻转指针，
//! 旧工厂在完成一次零等待刷新后才停止。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam_channel::Sender;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::channel::{EventChannel, Push};
use crate::config::{Level, WatchConfig};
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::event::LogEvent;
use crate::logger::{Logger, LoggerState};
use crate::pool::{Pool, PoolStats};
use crate::sink::{CompositeSink, ConsoleConfig, ConsoleSink, Sink};
use crate::switches::{Switch, SwitchSource, SwitchTable};

/// 生产者与日志句柄共享的管道核心
pub(crate) struct PipelineCore {
    pub config: WatchConfig,
    pub channel: Arc<EventChannel>,
    pub event_pool: Arc<Pool<LogEvent>>,
    pub logger_pool: Pool<LoggerState>,
}

impl PipelineCore {
    pub fn new(config: WatchConfig) -> Self {
        let channel = Arc::new(EventChannel::new(config.channel_capacity));
        let event_pool = Arc::new(Pool::new(config.event_pool_capacity, LogEvent::new));
        let logger_pool = Pool::new(config.logger_pool_capacity, LoggerState::new);
        Self { config, channel, event_pool, logger_pool }
    }

    /// 取一条已清零、已盖时间戳的事件记录
    pub fn acquire_log_event(&self) -> LogEvent {
        let mut event = self.event_pool.acquire();
        event.reset();
        event
    }

    /// 入队；被逐出或被拒绝的记录就地回池，生产者永不阻塞
    pub fn submit(&self, event: LogEvent) {
        match self.channel.push(event) {
            Push::Stored { evicted } => {
                for old in evicted {
                    self.event_pool.release(old);
                }
            }
            Push::Rejected(event) => self.event_pool.release(event),
        }
    }

    pub fn release_logger_state(&self, state: LoggerState) {
        self.logger_pool.release(state);
    }

    #[cfg(test)]
    pub fn channel_len(&self) -> usize {
        self.channel.len()
    }

    #[cfg(test)]
    pub fn take_for_test(&self) -> Option<LogEvent> {
        self.channel.try_pop()
    }
}

/// 路由表刷新线程
struct Refresher {
    stop_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Watch 管道工厂
pub struct WatchFactory {
    core: Arc<PipelineCore>,
    switches: Arc<SwitchTable>,
    dispatcher: Mutex<Option<Dispatcher>>,
    refresher: Mutex<Option<Refresher>>,
    pending_sink: Mutex<Option<Box<dyn Sink>>>,
    started: AtomicBool,
}

impl WatchFactory {
    fn new(config: WatchConfig, switches: SwitchTable, sink: Box<dyn Sink>) -> Self {
        let core = PipelineCore::new(config);
        core.event_pool.warm(core.config.event_pool_capacity);
        core.logger_pool.warm(core.config.logger_pool_capacity);

        Self {
            core: Arc::new(core),
            switches: Arc::new(switches),
            dispatcher: Mutex::new(None),
            refresher: Mutex::new(None),
            pending_sink: Mutex::new(Some(sink)),
            started: AtomicBool::new(false),
        }
    }

    /// 启动调度器与路由表刷新线程；重复调用是空操作
    pub fn start(&self) -> Result<(), String> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let sink = match self.pending_sink.lock().take() {
            Some(sink) => sink,
            None => {
                self.started.store(false, Ordering::Release);
                return Err("工厂已消耗输出端，不能重复启动".to_string());
            }
        };

        let settings = DispatchSettings {
            domain: self.core.config.domain.clone(),
            batch_size: self.core.config.batch_size,
            flush_interval: Duration::from_millis(self.core.config.flush_interval_ms),
            sensitive_keys: self.core.config.sensitive_keys.clone(),
        };
        let dispatcher = Dispatcher::start(
            Arc::clone(&self.core.channel),
            Arc::clone(&self.core.event_pool),
            sink,
            settings,
        );
        *self.dispatcher.lock() = Some(dispatcher);

        // 路由表刷新与事件刷新互相独立，刷新源变慢不会拖住日志投递
        if self.switches.has_source() {
            let switches = Arc::clone(&self.switches);
            let interval = Duration::from_millis(self.core.config.switch_refresh_interval_ms);
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            let thread = thread::spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if let Err(e) = switches.refresh() {
                                eprintln!("[watch] 刷新路由表失败: {}", e);
                            }
                        }
                        _ => break,
                    }
                }
            });
            *self.refresher.lock() = Some(Refresher { stop_tx, thread: Some(thread) });
        }

        Ok(())
    }

    /// 有序停机；每一步的失败都被吞掉，停机总能完成
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        // 1. 停定时器：刷新线程先退出
        if let Some(mut refresher) = self.refresher.lock().take() {
            let _ = refresher.stop_tx.send(());
            if let Some(thread) = refresher.thread.take() {
                let _ = thread.join();
            }
        }

        // 2. 关闭通道写入端
        self.core.channel.close();

        // 3. 最终零等待排空 + 4. 停调度器（输出端在工作线程内停止）
        if let Some(mut dispatcher) = self.dispatcher.lock().take() {
            if !dispatcher.flush(Duration::ZERO) {
                eprintln!("[watch] 停机排空未在限期内完成");
            }
            dispatcher.shutdown();
        }

        // 5. 清空两个对象池
        self.core.event_pool.clear();
        self.core.logger_pool.clear();
    }

    /// 按类别取句柄；Quiet 类别返回共享空操作句柄，不碰对象池
    pub fn get_logger(&self, category: &str) -> Logger {
        let switch = self.switches.lookup(category);
        if switch.level == Level::Quiet {
            return Logger::noop();
        }

        let mut state = self.core.logger_pool.acquire();
        state.clear();
        state.category.push_str(category);
        state.level = switch.level;
        state.color = switch.color;
        state.tag = switch.tag;
        state.tenant.push_str(&self.core.config.tenant);
        state.subject.push_str(&self.core.config.subject);
        Logger::configured(Arc::clone(&self.core), state)
    }

    /// 以类型名为类别取句柄
    pub fn get_logger_for<T: ?Sized>(&self) -> Logger {
        self.get_logger(std::any::type_name::<T>())
    }

    /// 取句柄并传播上游关联ID
    pub fn get_logger_correlated(&self, category: &str, correlation_id: &str) -> Logger {
        let mut logger = self.get_logger(category);
        logger.set_correlation_id(correlation_id);
        logger
    }

    /// 显式刷新缓冲的事件；返回 false 表示调度线程未在限期内应答
    pub fn flush(&self, wait: Duration) -> bool {
        match self.dispatcher.lock().as_ref() {
            Some(dispatcher) => dispatcher.flush(wait),
            None => true,
        }
    }

    /// 立即从来源刷新路由表
    pub fn update_switches(&self) -> Result<(), String> {
        self.switches.refresh()
    }

    /// 路由表查询（诊断用）
    pub fn lookup(&self, category: &str) -> Switch {
        self.switches.lookup(category)
    }

    pub fn event_pool_stats(&self) -> PoolStats {
        self.core.event_pool.stats()
    }

    pub fn logger_pool_stats(&self) -> PoolStats {
        self.core.logger_pool.stats()
    }

    /// 因通道溢出被丢弃的事件总数
    pub fn dropped_events(&self) -> u64 {
        self.core.channel.dropped()
    }
}

impl Drop for WatchFactory {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watch 管道构建器
pub struct WatchBuilder {
    config: WatchConfig,
    rules: Vec<Switch>,
    fallback: Switch,
    source: Option<Box<dyn SwitchSource>>,
    sinks: Vec<Box<dyn Sink>>,
}

impl WatchBuilder {
    pub fn new() -> Self {
        Self {
            config: WatchConfig::default(),
            rules: Vec::new(),
            fallback: Switch::new("*", Level::Info),
            source: None,
            sinks: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.config.domain = domain.into();
        self
    }

    /// 未命中任何规则时的默认级别
    pub fn with_default_level(mut self, level: Level) -> Self {
        self.fallback.level = level;
        self
    }

    pub fn with_switch(mut self, switch: Switch) -> Self {
        self.rules.push(switch);
        self
    }

    pub fn with_fallback(mut self, fallback: Switch) -> Self {
        self.fallback = fallback;
        self
    }

    /// 绑定路由规则来源，运行期按配置间隔刷新
    pub fn with_switch_source(mut self, source: Box<dyn SwitchSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn add_console(self) -> Self {
        self.add_console_with_config(ConsoleConfig::default())
    }

    pub fn add_console_with_config(mut self, config: ConsoleConfig) -> Self {
        self.sinks.push(Box::new(ConsoleSink::with_config(config)));
        self
    }

    pub fn add_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// 构建工厂（未启动）
    pub fn build(mut self) -> WatchFactory {
        if let Err(e) = self.config.validate() {
            panic!("WatchBuilder 配置验证失败: {}\n请检查您的配置并修复上述问题后再重试。", e);
        }
        if self.sinks.is_empty() {
            panic!("配置错误: 必须至少添加一个输出端（控制台、队列或自定义 sink）");
        }

        let sink: Box<dyn Sink> = if self.sinks.len() == 1 {
            self.sinks.pop().expect("已检查非空")
        } else {
            let mut composite = CompositeSink::new();
            for sink in self.sinks {
                composite.add_sink(sink);
            }
            Box::new(composite)
        };

        let mut switches = SwitchTable::new(self.rules, self.fallback);
        if let Some(source) = self.source {
            switches = switches.with_source(source);
        }

        WatchFactory::new(self.config, switches, sink)
    }

    /// 构建、启动并安装为进程级工厂
    pub fn init(self) -> Result<Arc<WatchFactory>, SetFactoryError> {
        let factory = self.build();
        if let Err(e) = factory.start() {
            eprintln!("[watch] 工厂启动失败: {}", e);
        }
        install_factory(factory)
    }
}

impl Default for WatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程级工厂指针
static FACTORY: Lazy<ArcSwapOption<WatchFactory>> = Lazy::new(|| ArcSwapOption::from(None));

/// 工厂安装错误
#[derive(Debug)]
pub struct SetFactoryError(());

impl std::fmt::Display for SetFactoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("进程级工厂已安装，热替换请使用 set_factory")
    }
}

impl std::error::Error for SetFactoryError {}

/// 安装进程级工厂；已有工厂时报错（热替换走 `set_factory`）
pub fn install_factory(factory: WatchFactory) -> Result<Arc<WatchFactory>, SetFactoryError> {
    let factory = Arc::new(factory);
    let mut installed = Ok(Arc::clone(&factory));
    FACTORY.rcu(|current| {
        if current.is_some() {
            installed = Err(SetFactoryError(()));
            current.clone()
        } else {
            installed = Ok(Arc::clone(&factory));
            Some(Arc::clone(&factory))
        }
    });
    installed
}

/// 热替换进程级工厂：新工厂先启动，指针翻转后旧工厂才排空停机
pub fn set_factory(factory: WatchFactory) -> Arc<WatchFactory> {
    if let Err(e) = factory.start() {
        eprintln!("[watch] 替换工厂启动失败: {}", e);
    }

    let factory = Arc::new(factory);
    let previous = FACTORY.swap(Some(Arc::clone(&factory)));
    if let Some(previous) = previous {
        // 指针翻转后仍可能有在途事件，先排空再停
        previous.flush(Duration::ZERO);
        previous.stop();
    }
    factory
}

/// 当前进程级工厂
pub fn current_factory() -> Option<Arc<WatchFactory>> {
    FACTORY.load_full()
}

/// 经进程级工厂取句柄；未安装工厂时返回空操作句柄
pub fn get_logger(category: &str) -> Logger {
    match FACTORY.load_full() {
        Some(factory) => factory.get_logger(category),
        None => Logger::noop(),
    }
}

/// 卸载并停止进程级工厂
pub fn shutdown() {
    if let Some(factory) = FACTORY.swap(None) {
        factory.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MonitorSink;

    #[test]
    fn quiet_category_skips_pool_entirely() {
        let monitor = MonitorSink::new();
        let factory = WatchBuilder::new()
            .with_switch(Switch::new("Silent.*", Level::Quiet))
            .add_sink(Box::new(monitor))
            .build();

        let before = factory.logger_pool_stats();
        let mut logger = factory.get_logger("Silent.Worker");
        logger.error("无输出");
        drop(logger);

        let after = factory.logger_pool_stats();
        assert_eq!(before.acquired, after.acquired);
        assert_eq!(factory.event_pool_stats().acquired, 0);
    }

    #[test]
    fn get_logger_configures_from_switch() {
        let factory = WatchBuilder::new()
            .with_switch(Switch::new("Svc.*", Level::Debug).with_color(35).with_tag("svc"))
            .add_sink(Box::new(MonitorSink::new()))
            .build();

        let logger = factory.get_logger("Svc.Worker");
        assert_eq!(logger.level(), Level::Debug);
        assert_eq!(logger.category(), "Svc.Worker");
        assert!(logger.is_debug_enabled());
        assert!(!logger.is_trace_enabled());
    }

    #[test]
    fn handles_are_recycled_through_the_pool() {
        let factory = WatchBuilder::new()
            .add_sink(Box::new(MonitorSink::new()))
            .build();

        drop(factory.get_logger("A"));
        drop(factory.get_logger("B"));

        let stats = factory.logger_pool_stats();
        assert_eq!(stats.acquired, 2);
        // 池已预热，句柄全部来自复用
        assert_eq!(stats.recycled, 2);
        assert_eq!(stats.created, 0);
    }

    #[test]
    #[should_panic]
    fn build_without_sink_panics() {
        let _ = WatchBuilder::new().build();
    }
}
