//! 控制台输出端 - 按级别着色，按作用域嵌套缩进

use std::io::{self, BufWriter, Write};

use parking_lot::Mutex;

use crate::config::Level;
use crate::event::{Batch, LogEvent};
use crate::sink::Sink;

/// 控制台输出配置
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// 是否启用颜色输出
    pub enable_color: bool,
    /// 是否打印载荷块
    pub show_payload: bool,
    /// 时间戳格式
    pub timestamp_format: String,
}

impl ConsoleConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.timestamp_format.is_empty() {
            return Err("配置错误: 时间戳格式不能为空".to_string());
        }
        Ok(())
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enable_color: true,
            show_payload: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        }
    }
}

/// 控制台输出端
pub struct ConsoleSink {
    config: ConsoleConfig,
    stdout: Mutex<BufWriter<io::Stdout>>,
    /// 每个关联ID单独的缩进没有意义，维持单一深度计数
    depth: i32,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_config(ConsoleConfig::default())
    }

    pub fn with_config(config: ConsoleConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("ConsoleConfig 验证失败: {}\n请检查您的配置并修复上述问题后再重试。", e);
        }
        Self {
            config,
            stdout: Mutex::new(BufWriter::new(io::stdout())),
            depth: 0,
        }
    }

    fn level_color(level: Level) -> u8 {
        match level {
            Level::Trace => 90,
            Level::Debug => 36,
            Level::Info => 32,
            Level::Warn => 33,
            Level::Error => 31,
            Level::Quiet => 0,
        }
    }

    fn write_event(&mut self, buf: &mut dyn Write, event: &LogEvent) -> io::Result<()> {
        let timestamp = chrono::DateTime::from_timestamp_micros(event.occurred)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format(&self.config.timestamp_format)
                    .to_string()
            })
            .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());

        if event.nesting < 0 {
            self.depth = (self.depth + event.nesting).max(0);
        }
        let indent = "  ".repeat(self.depth.max(0) as usize);
        let marker = match event.nesting.signum() {
            1 => ">> ",
            -1 => "<< ",
            _ => "",
        };

        if self.config.enable_color {
            let color = if event.color != 0 {
                event.color
            } else {
                Self::level_color(event.level)
            };
            writeln!(
                buf,
                "{} \x1b[{}m[{}]\x1b[0m {} {}{}{}",
                timestamp, color, event.level, event.category, indent, marker, event.title
            )?;
        } else {
            writeln!(
                buf,
                "{} [{}] {} {}{}{}",
                timestamp, event.level, event.category, indent, marker, event.title
            )?;
        }

        if event.nesting > 0 {
            self.depth += event.nesting;
        }

        if self.config.show_payload && !event.payload.is_empty() {
            for line in event.payload.lines() {
                writeln!(buf, "{}    | {}", indent, line)?;
            }
        }

        Ok(())
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn accept(&mut self, batch: &Batch) -> Result<(), String> {
        let mut buf = Vec::with_capacity(batch.len() * 128);
        for event in &batch.events {
            self.write_event(&mut buf, event)
                .map_err(|e| format!("格式化失败: {}", e))?;
        }

        let mut stdout = self.stdout.lock();
        stdout
            .write_all(&buf)
            .map_err(|e| format!("写入终端失败: {}", e))?;
        stdout.flush().map_err(|e| format!("刷新终端失败: {}", e))?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), String> {
        self.stdout
            .lock()
            .flush()
            .map_err(|e| format!("停止时刷新终端失败: {}", e))
    }
}
