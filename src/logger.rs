//! 日志句柄模块 - 池化的类别门面
//!
//! 句柄在 `get_logger` 时按路由表配置，销毁时清空回池。
//! Quiet 类别返回共享的空操作句柄，完全不触碰对象池。
//! 作用域跟踪是单槽位而非栈：嵌套 enter 会覆盖之前的作用域名，
//! 正确性依赖调用方配对 enter/leave 或依赖 Drop 补发离开事件。

use std::sync::Arc;

use crate::config::Level;
use crate::event::{EventPayload, new_correlation_id};
use crate::factory::PipelineCore;

/// 句柄的池化状态
pub(crate) struct LoggerState {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub tag: String,
    pub correlation_id: String,
    pub level: Level,
    pub color: u8,
    pub scope: String,
}

impl LoggerState {
    pub fn new() -> Self {
        Self {
            category: String::new(),
            tenant: String::new(),
            subject: String::new(),
            tag: String::new(),
            correlation_id: String::new(),
            level: Level::Quiet,
            color: 0,
            scope: String::new(),
        }
    }

    pub fn clear(&mut self) {
        self.category.clear();
        self.tenant.clear();
        self.subject.clear();
        self.tag.clear();
        self.correlation_id.clear();
        self.level = Level::Quiet;
        self.color = 0;
        self.scope.clear();
    }
}

/// 日志句柄
///
/// 带载荷的发射建议先过 `is_*_enabled` 门控再构造载荷，
/// 被抑制的级别就完全不付出序列化成本。
pub struct Logger {
    core: Option<Arc<PipelineCore>>,
    state: Option<LoggerState>,
}

impl Logger {
    /// 共享空操作句柄（Quiet 类别），不占用对象池
    pub(crate) fn noop() -> Self {
        Self { core: None, state: None }
    }

    pub(crate) fn configured(core: Arc<PipelineCore>, state: LoggerState) -> Self {
        Self { core: Some(core), state: Some(state) }
    }

    /// 句柄解析到的开关级别；空操作句柄为 Quiet
    pub fn level(&self) -> Level {
        self.state.as_ref().map(|s| s.level).unwrap_or(Level::Quiet)
    }

    pub fn category(&self) -> &str {
        self.state.as_ref().map(|s| s.category.as_str()).unwrap_or("")
    }

    /// 关联ID；首次读取时惰性生成
    pub fn correlation_id(&mut self) -> &str {
        match self.state.as_mut() {
            Some(state) => {
                if state.correlation_id.is_empty() {
                    state.correlation_id = new_correlation_id();
                }
                &state.correlation_id
            }
            None => "",
        }
    }

    /// 传播上游的关联ID
    pub fn set_correlation_id<S: Into<String>>(&mut self, correlation_id: S) {
        if let Some(state) = self.state.as_mut() {
            state.correlation_id = correlation_id.into();
        }
    }

    pub fn set_tenant<S: Into<String>>(&mut self, tenant: S) {
        if let Some(state) = self.state.as_mut() {
            state.tenant = tenant.into();
        }
    }

    pub fn set_subject<S: Into<String>>(&mut self, subject: S) {
        if let Some(state) = self.state.as_mut() {
            state.subject = subject.into();
        }
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.state.as_ref().map(|s| s.level.allows(level)).unwrap_or(false)
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.is_enabled(Level::Trace)
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(Level::Debug)
    }

    pub fn is_info_enabled(&self) -> bool {
        self.is_enabled(Level::Info)
    }

    pub fn is_warn_enabled(&self) -> bool {
        self.is_enabled(Level::Warn)
    }

    pub fn is_error_enabled(&self) -> bool {
        self.is_enabled(Level::Error)
    }

    pub fn trace(&mut self, title: &str) {
        self.emit(Level::Trace, title, EventPayload::None, 0);
    }

    pub fn debug(&mut self, title: &str) {
        self.emit(Level::Debug, title, EventPayload::None, 0);
    }

    pub fn info(&mut self, title: &str) {
        self.emit(Level::Info, title, EventPayload::None, 0);
    }

    pub fn warn(&mut self, title: &str) {
        self.emit(Level::Warn, title, EventPayload::None, 0);
    }

    pub fn error(&mut self, title: &str) {
        self.emit(Level::Error, title, EventPayload::None, 0);
    }

    /// 带载荷的发射
    pub fn log(&mut self, level: Level, title: &str, payload: EventPayload) {
        self.emit(level, title, payload, 0);
    }

    /// 进入方法作用域：发射 nesting=+1 的 Debug 事件
    ///
    /// 作用域名由类别与方法名拼出；单槽位语义，嵌套调用覆盖前值。
    pub fn enter_method(&mut self, name: &str) {
        let scope = format!("{}.{}", self.category(), name);
        self.enter(scope);
    }

    /// 离开当前方法作用域：发射 nesting=-1 的 Debug 事件
    pub fn leave_method(&mut self) {
        self.leave();
    }

    /// 进入命名作用域
    pub fn enter_scope(&mut self, name: &str) {
        self.enter(name.to_string());
    }

    /// 离开当前命名作用域
    pub fn leave_scope(&mut self) {
        self.leave();
    }

    fn enter(&mut self, scope: String) {
        self.emit(Level::Debug, &scope, EventPayload::None, 1);
        if let Some(state) = self.state.as_mut() {
            state.scope = scope;
        }
    }

    fn leave(&mut self) {
        let scope = match self.state.as_mut() {
            Some(state) if !state.scope.is_empty() => std::mem::take(&mut state.scope),
            _ => return,
        };
        self.emit(Level::Debug, &scope, EventPayload::None, -1);
    }

    fn emit(&mut self, level: Level, title: &str, payload: EventPayload, nesting: i32) {
        let (core, state) = match (self.core.as_ref(), self.state.as_mut()) {
            (Some(core), Some(state)) => (core, state),
            _ => return,
        };
        if !state.level.allows(level) {
            return;
        }
        if state.correlation_id.is_empty() {
            state.correlation_id = new_correlation_id();
        }

        let mut event = core.acquire_log_event();
        event.category.push_str(&state.category);
        event.correlation_id.push_str(&state.correlation_id);
        event.title.push_str(title);
        event.tenant.push_str(&state.tenant);
        event.subject.push_str(&state.subject);
        event.tag.push_str(&state.tag);
        event.level = level;
        event.color = state.color;
        event.nesting = nesting;
        event.set_payload(payload);

        core.submit(event);
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // 只 enter 未 leave 的作用域在销毁时补发离开事件
        self.leave();

        if let (Some(core), Some(mut state)) = (self.core.take(), self.state.take()) {
            state.clear();
            core.release_logger_state(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use crate::event::PayloadSource;

    fn core() -> Arc<PipelineCore> {
        Arc::new(PipelineCore::new(WatchConfig {
            channel_capacity: 16,
            ..WatchConfig::default()
        }))
    }

    fn handle(core: &Arc<PipelineCore>, level: Level) -> Logger {
        let mut state = LoggerState::new();
        state.category = "Svc.Worker".to_string();
        state.level = level;
        Logger::configured(Arc::clone(core), state)
    }

    #[test]
    fn disabled_level_emits_nothing() {
        let core = core();
        let mut logger = handle(&core, Level::Info);

        assert!(!logger.is_debug_enabled());
        logger.debug("被抑制");
        logger.trace("也被抑制");
        assert!(core.channel_len() == 0);

        logger.info("通过");
        assert_eq!(core.channel_len(), 1);
    }

    #[test]
    fn noop_handle_touches_nothing() {
        let mut logger = Logger::noop();
        assert_eq!(logger.level(), Level::Quiet);
        assert!(!logger.is_error_enabled());
        logger.error("无处可去");
        assert_eq!(logger.correlation_id(), "");
    }

    #[test]
    fn correlation_id_is_lazy_and_stable() {
        let core = core();
        let mut logger = handle(&core, Level::Debug);

        let first = logger.correlation_id().to_string();
        assert_eq!(first.len(), 32);
        assert_eq!(logger.correlation_id(), first);

        logger.debug("事件");
        let event = core.take_for_test().unwrap();
        assert_eq!(event.correlation_id, first);
    }

    #[test]
    fn enter_then_drop_emits_balanced_pair() {
        let core = core();
        let mut logger = handle(&core, Level::Debug);
        logger.enter_method("DoWork");
        drop(logger);

        let enter = core.take_for_test().unwrap();
        let leave = core.take_for_test().unwrap();
        assert!(core.take_for_test().is_none());

        assert_eq!(enter.nesting, 1);
        assert_eq!(leave.nesting, -1);
        assert_eq!(enter.title, "Svc.Worker.DoWork");
        assert_eq!(leave.title, enter.title);
        assert_eq!(enter.correlation_id, leave.correlation_id);
        assert_eq!(enter.level, Level::Debug);
    }

    #[test]
    fn nested_enter_overwrites_single_slot() {
        let core = core();
        let mut logger = handle(&core, Level::Debug);
        logger.enter_scope("外层");
        logger.enter_scope("内层");
        logger.leave_scope();
        // 单槽位：第二次 leave 没有作用域可离开
        logger.leave_scope();

        let first = core.take_for_test().unwrap();
        let second = core.take_for_test().unwrap();
        let third = core.take_for_test().unwrap();
        assert!(core.take_for_test().is_none());

        assert_eq!((first.title.as_str(), first.nesting), ("外层", 1));
        assert_eq!((second.title.as_str(), second.nesting), ("内层", 1));
        assert_eq!((third.title.as_str(), third.nesting), ("内层", -1));
    }

    #[test]
    fn payload_travels_with_event() {
        let core = core();
        let mut logger = handle(&core, Level::Trace);
        logger.log(
            Level::Warn,
            "对象载荷",
            EventPayload::object(&serde_json::json!({"k": "v"})),
        );

        let event = core.take_for_test().unwrap();
        assert_eq!(event.level, Level::Warn);
        assert!(matches!(event.source, PayloadSource::Object(_)));
    }
}
