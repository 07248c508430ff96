//! 路由表模块 - 按类别解析日志开关
//!
//! 每个类别通过精确匹配、最长前缀匹配、默认规则三级解析到唯一的开关。
//! 规则集以快照形式发布，查询永远读取完整快照，刷新失败时保留旧表。

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Serialize, Deserialize};

use crate::config::Level;

/// 路由开关 - 一条类别到 {级别, 颜色, 标签} 的解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    /// 匹配模式：以 `*` 结尾为前缀规则，否则为精确规则
    pub pattern: String,
    pub level: Level,
    /// ANSI 颜色码，0 表示使用级别默认色
    pub color: u8,
    pub tag: String,
}

impl Switch {
    pub fn new<S: Into<String>>(pattern: S, level: Level) -> Self {
        Self {
            pattern: pattern.into(),
            level,
            color: 0,
            tag: String::new(),
        }
    }

    pub fn with_color(mut self, color: u8) -> Self {
        self.color = color;
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tag = tag.into();
        self
    }
}

/// 编译后的规则快照
struct SwitchSet {
    exact: HashMap<String, Switch>,
    /// 前缀规则，按前缀长度降序排列保证最长匹配优先
    prefixes: Vec<(String, Switch)>,
    fallback: Switch,
}

impl SwitchSet {
    fn compile(rules: &[Switch], fallback: Switch) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();

        for rule in rules {
            if let Some(stripped) = rule.pattern.strip_suffix('*') {
                prefixes.push((stripped.to_string(), rule.clone()));
            } else {
                exact.insert(rule.pattern.clone(), rule.clone());
            }
        }

        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self { exact, prefixes, fallback }
    }

    fn lookup(&self, category: &str) -> &Switch {
        if let Some(rule) = self.exact.get(category) {
            return rule;
        }
        for (prefix, rule) in &self.prefixes {
            if category.starts_with(prefix.as_str()) {
                return rule;
            }
        }
        &self.fallback
    }
}

/// 路由规则来源 - 供定时刷新拉取最新规则集
pub trait SwitchSource: Send + Sync {
    fn load(&self) -> Result<Vec<Switch>, String>;
}

/// 固定规则来源
pub struct StaticSwitchSource {
    rules: Vec<Switch>,
}

impl StaticSwitchSource {
    pub fn new(rules: Vec<Switch>) -> Self {
        Self { rules }
    }
}

impl SwitchSource for StaticSwitchSource {
    fn load(&self) -> Result<Vec<Switch>, String> {
        Ok(self.rules.clone())
    }
}

/// 闭包规则来源 - 用于接入配置轮询等外部来源
pub struct FnSwitchSource<F> {
    load_fn: F,
}

impl<F> FnSwitchSource<F>
where
    F: Fn() -> Result<Vec<Switch>, String> + Send + Sync,
{
    pub fn new(load_fn: F) -> Self {
        Self { load_fn }
    }
}

impl<F> SwitchSource for FnSwitchSource<F>
where
    F: Fn() -> Result<Vec<Switch>, String> + Send + Sync,
{
    fn load(&self) -> Result<Vec<Switch>, String> {
        (self.load_fn)()
    }
}

/// 路由表 - 查询无锁读取快照，刷新原子替换
pub struct SwitchTable {
    current: ArcSwap<SwitchSet>,
    fallback: Switch,
    source: Option<Box<dyn SwitchSource>>,
}

impl SwitchTable {
    /// 创建路由表，fallback 为未命中任何规则时的默认开关
    pub fn new(rules: Vec<Switch>, fallback: Switch) -> Self {
        let set = SwitchSet::compile(&rules, fallback.clone());
        Self {
            current: ArcSwap::from_pointee(set),
            fallback,
            source: None,
        }
    }

    /// 绑定规则来源，之后 `refresh` 会从该来源拉取
    pub fn with_source(mut self, source: Box<dyn SwitchSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 解析类别到开关，确定且全覆盖
    pub fn lookup(&self, category: &str) -> Switch {
        self.current.load().lookup(category).clone()
    }

    /// 原子安装新规则集
    pub fn install(&self, rules: Vec<Switch>) {
        let set = SwitchSet::compile(&rules, self.fallback.clone());
        self.current.store(Arc::new(set));
    }

    /// 从来源刷新规则集；失败时保留旧表（fail-open）
    pub fn refresh(&self) -> Result<(), String> {
        let source = match &self.source {
            Some(source) => source,
            None => return Ok(()),
        };

        let rules = source.load()?;
        self.install(rules);
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn table() -> SwitchTable {
        SwitchTable::new(
            vec![
                Switch::new("Svc.Worker", Level::Trace).with_tag("worker"),
                Switch::new("Svc.*", Level::Debug).with_tag("svc"),
                Switch::new("Svc.Quiet.*", Level::Quiet),
            ],
            Switch::new("*", Level::Info),
        )
    }

    #[test]
    fn exact_beats_prefix() {
        let table = table();
        let switch = table.lookup("Svc.Worker");
        assert_eq!(switch.level, Level::Trace);
        assert_eq!(switch.tag, "worker");
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table();
        assert_eq!(table.lookup("Svc.Quiet.Inner").level, Level::Quiet);
        assert_eq!(table.lookup("Svc.Other").level, Level::Debug);
    }

    #[test]
    fn fallback_is_total() {
        let table = table();
        assert_eq!(table.lookup("Elsewhere").level, Level::Info);
        assert_eq!(table.lookup("").level, Level::Info);
    }

    #[test]
    fn lookup_is_deterministic() {
        let table = table();
        let first = table.lookup("Svc.Alpha");
        for _ in 0..10 {
            assert_eq!(table.lookup("Svc.Alpha"), first);
        }
    }

    #[test]
    fn refresh_replaces_rules() {
        let table = table().with_source(Box::new(StaticSwitchSource::new(vec![
            Switch::new("Svc.*", Level::Error),
        ])));

        assert_eq!(table.lookup("Svc.Other").level, Level::Debug);
        table.refresh().unwrap();
        assert_eq!(table.lookup("Svc.Other").level, Level::Error);
    }

    #[test]
    fn refresh_failure_keeps_previous_table() {
        let fail = AtomicBool::new(true);
        let table = SwitchTable::new(
            vec![Switch::new("Svc.*", Level::Debug)],
            Switch::new("*", Level::Info),
        )
        .with_source(Box::new(FnSwitchSource::new(move || {
            if fail.load(Ordering::Relaxed) {
                Err("来源不可用".to_string())
            } else {
                Ok(vec![])
            }
        })));

        assert!(table.refresh().is_err());
        assert_eq!(table.lookup("Svc.Other").level, Level::Debug);
    }
}
