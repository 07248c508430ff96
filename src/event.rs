//! 事件记录模块 - 池化的可变日志记录与批次模型
//!
//! 记录在获取时整体清零并盖时间戳，富载荷（对象/错误链）以
//! 标签联合形式随记录入队，文本化（enrich）推迟到派发路径执行，
//! 生产者热路径上不做 JSON 渲染。

use serde_json::Value;

use crate::codec::base64;
use crate::config::PayloadKind;
use crate::config::Level;

/// 富载荷来源 - 每条事件最多携带其中一种
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadSource {
    None,
    /// 待 JSON 渲染的结构化对象
    Object(Value),
    /// 已展开的错误链（首项为最外层错误）与可选上下文
    Fault {
        chain: Vec<String>,
        context: Option<Value>,
    },
}

/// 生产者侧的载荷描述，由日志句柄转换成事件字段
#[derive(Debug, Clone)]
pub enum EventPayload {
    None,
    /// 预先渲染好的文本载荷
    Text { kind: PayloadKind, body: String },
    Object(Value),
    Fault {
        chain: Vec<String>,
        context: Option<Value>,
    },
}

impl EventPayload {
    pub fn none() -> Self {
        EventPayload::None
    }

    pub fn text<S: Into<String>>(body: S) -> Self {
        EventPayload::Text { kind: PayloadKind::Text, body: body.into() }
    }

    pub fn json_text<S: Into<String>>(body: S) -> Self {
        EventPayload::Text { kind: PayloadKind::Json, body: body.into() }
    }

    pub fn sql<S: Into<String>>(body: S) -> Self {
        EventPayload::Text { kind: PayloadKind::Sql, body: body.into() }
    }

    pub fn xml<S: Into<String>>(body: S) -> Self {
        EventPayload::Text { kind: PayloadKind::Xml, body: body.into() }
    }

    pub fn yaml<S: Into<String>>(body: S) -> Self {
        EventPayload::Text { kind: PayloadKind::Yaml, body: body.into() }
    }

    /// 结构化对象载荷，序列化失败时降级为错误文本
    pub fn object<T: serde::Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => EventPayload::Object(value),
            Err(e) => EventPayload::Text {
                kind: PayloadKind::Text,
                body: format!("<对象序列化失败: {}>", e),
            },
        }
    }

    /// 错误载荷：在生产者侧展开错误链，文本渲染留到 enrich
    pub fn fault(error: &(dyn std::error::Error + 'static)) -> Self {
        EventPayload::Fault { chain: error_chain(error), context: None }
    }

    /// 带上下文对象的错误载荷
    pub fn fault_with_context<T: serde::Serialize>(
        error: &(dyn std::error::Error + 'static),
        context: &T,
    ) -> Self {
        EventPayload::Fault {
            chain: error_chain(error),
            context: serde_json::to_value(context).ok(),
        }
    }
}

/// 展开错误链为逐层消息
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut current = error.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}

/// 生成关联ID（32位十六进制）
pub(crate) fn new_correlation_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// 池化事件记录
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub category: String,
    pub correlation_id: String,
    pub title: String,
    pub tenant: String,
    pub subject: String,
    pub tag: String,
    pub level: Level,
    /// ANSI 颜色码，0 表示级别默认色
    pub color: u8,
    /// 作用域标记：+1 进入，-1 离开，0 普通事件
    pub nesting: i32,
    /// 事件发生时间（Unix 微秒）
    pub occurred: i64,
    pub payload_kind: PayloadKind,
    /// 渲染后的文本载荷，由 enrich 填充
    pub payload: String,
    /// 载荷的 base64 传输编码，由 transport_encode 填充
    pub transport_encoding: String,
    /// 富载荷来源，不参与序列化
    pub(crate) source: PayloadSource,
}

impl LogEvent {
    /// 创建空记录（池工厂）
    pub fn new() -> Self {
        Self {
            category: String::new(),
            correlation_id: String::new(),
            title: String::new(),
            tenant: String::new(),
            subject: String::new(),
            tag: String::new(),
            level: Level::Trace,
            color: 0,
            nesting: 0,
            occurred: 0,
            payload_kind: PayloadKind::None,
            payload: String::new(),
            transport_encoding: String::new(),
            source: PayloadSource::None,
        }
    }

    /// 获取时调用：清空全部字段并盖当前时间戳
    pub fn reset(&mut self) {
        self.category.clear();
        self.correlation_id.clear();
        self.title.clear();
        self.tenant.clear();
        self.subject.clear();
        self.tag.clear();
        self.level = Level::Trace;
        self.color = 0;
        self.nesting = 0;
        self.occurred = chrono::Utc::now().timestamp_micros();
        self.payload_kind = PayloadKind::None;
        self.payload.clear();
        self.transport_encoding.clear();
        self.source = PayloadSource::None;
    }

    /// 写入载荷描述；富载荷延迟到 `enrich` 才文本化
    pub fn set_payload(&mut self, payload: EventPayload) {
        match payload {
            EventPayload::None => {}
            EventPayload::Text { kind, body } => {
                self.payload_kind = kind;
                self.payload = body;
            }
            EventPayload::Object(value) => {
                self.source = PayloadSource::Object(value);
            }
            EventPayload::Fault { chain, context } => {
                self.source = PayloadSource::Fault { chain, context };
            }
        }
    }

    /// 富载荷文本化，幂等：payload 已非空则不再处理
    ///
    /// 对象载荷先按 `sensitive_keys` 脱敏（敏感字段替换为布尔存在标记）
    /// 再渲染为 JSON；错误载荷渲染为可选上下文块加逐层错误链。
    pub fn enrich(&mut self, sensitive_keys: &[String]) {
        if !self.payload.is_empty() {
            self.source = PayloadSource::None;
            return;
        }

        match std::mem::replace(&mut self.source, PayloadSource::None) {
            PayloadSource::None => {}
            PayloadSource::Object(mut value) => {
                redact(&mut value, sensitive_keys);
                self.payload = value.to_string();
                self.payload_kind = PayloadKind::Json;
            }
            PayloadSource::Fault { chain, context } => {
                let mut block = String::new();
                if let Some(context) = context {
                    block.push_str(
                        &serde_json::to_string_pretty(&context)
                            .unwrap_or_else(|_| context.to_string()),
                    );
                    block.push('\n');
                }
                for (depth, message) in chain.iter().enumerate() {
                    if depth == 0 {
                        block.push_str("error: ");
                    } else {
                        block.push_str("\ncaused by: ");
                    }
                    block.push_str(message);
                }
                self.payload = block;
                self.payload_kind = PayloadKind::Text;
            }
        }
    }

    /// 填充传输编码（载荷的 base64），幂等
    pub fn transport_encode(&mut self) {
        if self.transport_encoding.is_empty() && !self.payload.is_empty() {
            self.transport_encoding = base64::encode(self.payload.as_bytes());
        }
    }

    /// 从传输编码还原载荷文本（反序列化侧使用）
    pub fn decoded_payload(&self) -> Result<String, String> {
        if self.transport_encoding.is_empty() {
            return Ok(String::new());
        }
        let bytes = base64::decode(self.transport_encoding.as_bytes())?;
        String::from_utf8(bytes).map_err(|e| format!("载荷不是合法 UTF-8: {}", e))
    }
}

impl Default for LogEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// 递归脱敏：命中敏感字段名的值替换为布尔存在标记
fn redact(value: &mut Value, sensitive_keys: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let lowered = key.to_lowercase();
                if sensitive_keys.iter().any(|k| k.eq_ignore_ascii_case(&lowered)) {
                    *entry = Value::Bool(!entry.is_null());
                } else {
                    redact(entry, sensitive_keys);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item, sensitive_keys);
            }
        }
        _ => {}
    }
}

/// 事件批次 - 调度器独占所有权，交给 sink 后逐条回池
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub uid: String,
    pub domain: String,
    pub events: Vec<LogEvent>,
}

impl Batch {
    pub fn new<S: Into<String>>(domain: S, events: Vec<LogEvent>) -> Self {
        Self {
            uid: format!("{:016x}", rand::random::<u64>()),
            domain: domain.into(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
