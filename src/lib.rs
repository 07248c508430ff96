//! WatchLog - 高性能进程内结构化事件管道
//!
//! 一个为调用方零阻塞设计的结构化日志库，生产端只做字段填充与
//! 入队，富化、编码与投递全部在独立调度线程完成。
//!
//! # 特性
//!
//! - **池化句柄**: 日志句柄与事件记录都走对象池，稳态近零分配
//! - **动态路由**: 按类别前缀匹配的级别开关表，可热刷新
//! - **有界通道**: 背压时丢最旧，生产者永不阻塞
//! - **批量调度**: 定时器驱动的批次装配与投递
//! - **可插拔输出端**: 控制台、队列、复合、监视与单事件适配器
//! - **紧凑编码**: 二进制 + lz4 线格式与 JSON 互换格式
//!
//! # 快速开始
//!
//! ```no_run
//! use watchlog::{WatchBuilder, Switch, Level};
//!
//! let factory = WatchBuilder::new()
//!     .with_domain("orders")
//!     .with_switch(Switch::new("Orders.*", Level::Debug))
//!     .add_console()
//!     .init()
//!     .expect("安装进程级工厂失败");
//!
//! let mut log = factory.get_logger("Orders.Worker");
//! log.info("订单服务已启动");
//! log.enter_method("Reserve");
//! log.debug("库存检查通过");
//! drop(log);
//!
//! watchlog::shutdown();
//! ```
//!
//! # 类别路由
//!
//! 规则按模式长度从长到短匹配，精确规则优先于前缀规则，
//! 全部未命中时使用兜底规则。解析到 `Quiet` 的类别得到
//! 共享空操作句柄，完全不触碰对象池。

pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod factory;
pub mod logger;
pub mod pool;
pub mod sink;
pub mod switches;

pub use config::{Level, PayloadKind, WatchConfig};
pub use event::{Batch, EventPayload, LogEvent};
pub use factory::{
    SetFactoryError, WatchBuilder, WatchFactory, current_factory, get_logger, install_factory,
    set_factory, shutdown,
};
pub use logger::Logger;
pub use pool::PoolStats;
pub use sink::{
    BatchingSink, CompositeSink, ConsoleConfig, ConsoleSink, EventSink, MonitorSink, QueueSink,
    Sink,
};
pub use switches::{FnSwitchSource, StaticSwitchSource, Switch, SwitchSource};

/// 创建管道构建器
pub fn builder() -> WatchBuilder {
    WatchBuilder::new()
}
