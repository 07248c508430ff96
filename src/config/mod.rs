//! 配置模块

use serde::{Serialize, Deserialize};

/// 日志级别 - 按严重程度排序，Quiet 永远抑制输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Quiet,
}

impl Level {
    /// 判断开关级别是否允许给定事件级别通过
    pub fn allows(&self, event_level: Level) -> bool {
        *self != Level::Quiet && *self <= event_level
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Level> {
        match value {
            0 => Some(Level::Trace),
            1 => Some(Level::Debug),
            2 => Some(Level::Info),
            3 => Some(Level::Warn),
            4 => Some(Level::Error),
            5 => Some(Level::Quiet),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Trace => write!(f, "TRACE"),
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
            Level::Quiet => write!(f, "QUIET"),
        }
    }
}

static LEVEL_VARIANTS: bincode::error::AllowedEnumVariants =
    bincode::error::AllowedEnumVariants::Range { min: 0, max: 5 };

impl bincode::Encode for Level {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.as_u8(), encoder)
    }
}

impl<Context> bincode::Decode<Context> for Level {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let raw: u8 = bincode::Decode::decode(decoder)?;
        Level::from_u8(raw).ok_or(bincode::error::DecodeError::UnexpectedVariant {
            type_name: "Level",
            allowed: &LEVEL_VARIANTS,
            found: raw as u32,
        })
    }
}

/// 载荷类型 - 标记事件文本载荷的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    None,
    Text,
    Json,
    Xml,
    Sql,
    Yaml,
}

impl PayloadKind {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<PayloadKind> {
        match value {
            0 => Some(PayloadKind::None),
            1 => Some(PayloadKind::Text),
            2 => Some(PayloadKind::Json),
            3 => Some(PayloadKind::Xml),
            4 => Some(PayloadKind::Sql),
            5 => Some(PayloadKind::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::None => write!(f, "none"),
            PayloadKind::Text => write!(f, "text"),
            PayloadKind::Json => write!(f, "json"),
            PayloadKind::Xml => write!(f, "xml"),
            PayloadKind::Sql => write!(f, "sql"),
            PayloadKind::Yaml => write!(f, "yaml"),
        }
    }
}

static PAYLOAD_KIND_VARIANTS: bincode::error::AllowedEnumVariants =
    bincode::error::AllowedEnumVariants::Range { min: 0, max: 5 };

impl bincode::Encode for PayloadKind {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.as_u8(), encoder)
    }
}

impl<Context> bincode::Decode<Context> for PayloadKind {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let raw: u8 = bincode::Decode::decode(decoder)?;
        PayloadKind::from_u8(raw).ok_or(bincode::error::DecodeError::UnexpectedVariant {
            type_name: "PayloadKind",
            allowed: &PAYLOAD_KIND_VARIANTS,
            found: raw as u32,
        })
    }
}

/// 管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// 批次归属域，写入每个批次头部
    pub domain: String,
    /// 默认租户，写入每条事件
    pub tenant: String,
    /// 默认主体（通常是主机名或进程名）
    pub subject: String,
    /// 摄入通道容量（事件条数），满时丢弃最旧
    pub channel_capacity: usize,
    /// 单个批次的最大事件条数
    pub batch_size: usize,
    /// 调度器定时刷新间隔（毫秒）
    pub flush_interval_ms: u64,
    /// 路由表刷新间隔（毫秒）
    pub switch_refresh_interval_ms: u64,
    /// 事件记录池保留容量
    pub event_pool_capacity: usize,
    /// 日志句柄池保留容量
    pub logger_pool_capacity: usize,
    /// 对象载荷中需要脱敏的字段名（不区分大小写）
    pub sensitive_keys: Vec<String>,
}

impl WatchConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("配置错误: 通道容量不能为 0".to_string());
        }
        if self.channel_capacity > 1024 * 1024 {
            return Err("配置错误: 通道容量过大 (最大 1M 条)".to_string());
        }

        if self.batch_size == 0 {
            return Err("配置错误: 批次大小不能为 0".to_string());
        }
        if self.batch_size > self.channel_capacity {
            return Err(format!(
                "配置错误: 批次大小 ({}) 不能超过通道容量 ({})",
                self.batch_size, self.channel_capacity
            ));
        }

        if self.flush_interval_ms == 0 {
            return Err("配置错误: 刷新间隔不能为 0".to_string());
        }
        if self.flush_interval_ms > 60000 {
            return Err("配置错误: 刷新间隔过长 (最大 60秒)".to_string());
        }

        if self.switch_refresh_interval_ms == 0 {
            return Err("配置错误: 路由表刷新间隔不能为 0".to_string());
        }

        if self.event_pool_capacity == 0 || self.logger_pool_capacity == 0 {
            return Err("配置错误: 对象池容量不能为 0".to_string());
        }

        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            domain: "watchlog".to_string(),
            tenant: String::new(),
            subject: String::new(),
            channel_capacity: 8192,
            batch_size: 256,
            flush_interval_ms: 100,
            switch_refresh_interval_ms: 5000,
            event_pool_capacity: 1024,
            logger_pool_capacity: 256,
            sensitive_keys: default_sensitive_keys(),
        }
    }
}

/// 默认脱敏字段集
pub fn default_sensitive_keys() -> Vec<String> {
    ["password", "passwd", "secret", "token", "auth_token", "authorization", "api_key"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_and_gate() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error < Level::Quiet);
        assert!(Level::Debug.allows(Level::Debug));
        assert!(Level::Debug.allows(Level::Error));
        assert!(!Level::Debug.allows(Level::Trace));
        assert!(!Level::Quiet.allows(Level::Error));
    }

    #[test]
    fn level_u8_round_trip() {
        for raw in 0u8..=5 {
            let level = Level::from_u8(raw).unwrap();
            assert_eq!(level.as_u8(), raw);
        }
        assert!(Level::from_u8(6).is_none());
    }

    #[test]
    fn config_validation() {
        assert!(WatchConfig::default().validate().is_ok());

        let mut config = WatchConfig::default();
        config.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = WatchConfig::default();
        config.batch_size = config.channel_capacity + 1;
        assert!(config.validate().is_err());

        let mut config = WatchConfig::default();
        config.flush_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
