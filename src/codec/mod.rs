//! 编解码模块 - 批次的紧凑二进制格式与 JSON 互操作格式
//!
//! 线上格式只携带事件的原始字段集（载荷以传输编码形式传输，
//! 富载荷与未编码文本不进线）。二进制流整体套一层 lz4 帧压缩。

use std::io::{Read, Write};

use serde::{Serialize, Deserialize};

use crate::config::{Level, PayloadKind};
use crate::event::{Batch, LogEvent};

pub mod base64;

/// 线格式版本号，写在压缩流内部首字节
pub const WIRE_VERSION: u8 = 1;

impl bincode::Encode for LogEvent {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.category, encoder)?;
        bincode::Encode::encode(&self.correlation_id, encoder)?;
        bincode::Encode::encode(&self.title, encoder)?;
        bincode::Encode::encode(&self.tenant, encoder)?;
        bincode::Encode::encode(&self.subject, encoder)?;
        bincode::Encode::encode(&self.tag, encoder)?;
        bincode::Encode::encode(&self.level, encoder)?;
        bincode::Encode::encode(&self.color, encoder)?;
        bincode::Encode::encode(&self.nesting, encoder)?;
        bincode::Encode::encode(&self.occurred, encoder)?;
        bincode::Encode::encode(&self.payload_kind, encoder)?;
        bincode::Encode::encode(&self.transport_encoding, encoder)?;
        Ok(())
    }
}

impl<Context> bincode::Decode<Context> for LogEvent {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let mut event = LogEvent::new();
        event.category = bincode::Decode::decode(decoder)?;
        event.correlation_id = bincode::Decode::decode(decoder)?;
        event.title = bincode::Decode::decode(decoder)?;
        event.tenant = bincode::Decode::decode(decoder)?;
        event.subject = bincode::Decode::decode(decoder)?;
        event.tag = bincode::Decode::decode(decoder)?;
        event.level = bincode::Decode::decode(decoder)?;
        event.color = bincode::Decode::decode(decoder)?;
        event.nesting = bincode::Decode::decode(decoder)?;
        event.occurred = bincode::Decode::decode(decoder)?;
        event.payload_kind = bincode::Decode::decode(decoder)?;
        event.transport_encoding = bincode::Decode::decode(decoder)?;
        Ok(event)
    }
}

impl bincode::Encode for Batch {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&WIRE_VERSION, encoder)?;
        bincode::Encode::encode(&self.uid, encoder)?;
        bincode::Encode::encode(&self.domain, encoder)?;
        bincode::Encode::encode(&self.events, encoder)?;
        Ok(())
    }
}

impl<Context> bincode::Decode<Context> for Batch {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let version: u8 = bincode::Decode::decode(decoder)?;
        if version != WIRE_VERSION {
            return Err(bincode::error::DecodeError::Other("不支持的线格式版本"));
        }
        let uid: String = bincode::Decode::decode(decoder)?;
        let domain: String = bincode::Decode::decode(decoder)?;
        let events: Vec<LogEvent> = bincode::Decode::decode(decoder)?;
        Ok(Batch { uid, domain, events })
    }
}

/// 批次 -> lz4 压缩的二进制流
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, String> {
    let raw = bincode::encode_to_vec(batch, bincode::config::standard())
        .map_err(|e| format!("批次序列化失败: {}", e))?;

    let mut encoder = lz4::EncoderBuilder::new()
        .level(4)
        .build(Vec::new())
        .map_err(|e| format!("创建压缩器失败: {}", e))?;
    encoder
        .write_all(&raw)
        .map_err(|e| format!("压缩写入失败: {}", e))?;
    let (compressed, result) = encoder.finish();
    result.map_err(|e| format!("压缩收尾失败: {}", e))?;
    Ok(compressed)
}

/// lz4 压缩的二进制流 -> 批次
pub fn decode_batch(bytes: &[u8]) -> Result<Batch, String> {
    let mut decoder =
        lz4::Decoder::new(bytes).map_err(|e| format!("创建解压器失败: {}", e))?;
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| format!("解压失败: {}", e))?;

    let (batch, _) = bincode::decode_from_slice::<Batch, _>(&raw, bincode::config::standard())
        .map_err(|e| format!("批次反序列化失败: {}", e))?;
    Ok(batch)
}

/// JSON 互操作格式，与二进制格式携带同一原始字段集
#[derive(Serialize, Deserialize)]
struct JsonEvent {
    category: String,
    correlation_id: String,
    title: String,
    tenant: String,
    subject: String,
    tag: String,
    level: Level,
    color: u8,
    nesting: i32,
    occurred: i64,
    payload_kind: PayloadKind,
    transport_encoding: String,
}

#[derive(Serialize, Deserialize)]
struct JsonBatch {
    version: u8,
    uid: String,
    domain: String,
    events: Vec<JsonEvent>,
}

impl From<&LogEvent> for JsonEvent {
    fn from(event: &LogEvent) -> Self {
        JsonEvent {
            category: event.category.clone(),
            correlation_id: event.correlation_id.clone(),
            title: event.title.clone(),
            tenant: event.tenant.clone(),
            subject: event.subject.clone(),
            tag: event.tag.clone(),
            level: event.level,
            color: event.color,
            nesting: event.nesting,
            occurred: event.occurred,
            payload_kind: event.payload_kind,
            transport_encoding: event.transport_encoding.clone(),
        }
    }
}

impl From<JsonEvent> for LogEvent {
    fn from(wire: JsonEvent) -> Self {
        let mut event = LogEvent::new();
        event.category = wire.category;
        event.correlation_id = wire.correlation_id;
        event.title = wire.title;
        event.tenant = wire.tenant;
        event.subject = wire.subject;
        event.tag = wire.tag;
        event.level = wire.level;
        event.color = wire.color;
        event.nesting = wire.nesting;
        event.occurred = wire.occurred;
        event.payload_kind = wire.payload_kind;
        event.transport_encoding = wire.transport_encoding;
        event
    }
}

/// 批次 -> JSON 文档（调试与互操作）
pub fn batch_to_json(batch: &Batch) -> Result<String, String> {
    let wire = JsonBatch {
        version: WIRE_VERSION,
        uid: batch.uid.clone(),
        domain: batch.domain.clone(),
        events: batch.events.iter().map(JsonEvent::from).collect(),
    };
    serde_json::to_string(&wire).map_err(|e| format!("批次 JSON 序列化失败: {}", e))
}

/// JSON 文档 -> 批次
pub fn batch_from_json(text: &str) -> Result<Batch, String> {
    let wire: JsonBatch =
        serde_json::from_str(text).map_err(|e| format!("批次 JSON 解析失败: {}", e))?;
    if wire.version != WIRE_VERSION {
        return Err(format!("不支持的线格式版本 {}", wire.version));
    }
    Ok(Batch {
        uid: wire.uid,
        domain: wire.domain,
        events: wire.events.into_iter().map(LogEvent::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, PayloadSource};

    fn sample_batch() -> Batch {
        let mut events = Vec::new();
        for i in 0..5 {
            let mut event = LogEvent::new();
            event.reset();
            event.category = format!("Svc.Worker{}", i);
            event.correlation_id = format!("{:032x}", i);
            event.title = format!("事件 {}", i);
            event.tenant = "tenant-a".to_string();
            event.subject = "host-1".to_string();
            event.tag = "svc".to_string();
            event.level = Level::Info;
            event.color = 32;
            event.nesting = if i == 0 { 1 } else { 0 };
            event.set_payload(EventPayload::text(format!("payload-{}", i)));
            event.enrich(&[]);
            event.transport_encode();
            events.push(event);
        }
        Batch::new("codec-test", events)
    }

    fn assert_primitive_fields_equal(a: &Batch, b: &Batch) {
        assert_eq!(a.uid, b.uid);
        assert_eq!(a.domain, b.domain);
        assert_eq!(a.events.len(), b.events.len());
        for (x, y) in a.events.iter().zip(&b.events) {
            assert_eq!(x.category, y.category);
            assert_eq!(x.correlation_id, y.correlation_id);
            assert_eq!(x.title, y.title);
            assert_eq!(x.tenant, y.tenant);
            assert_eq!(x.subject, y.subject);
            assert_eq!(x.tag, y.tag);
            assert_eq!(x.level, y.level);
            assert_eq!(x.color, y.color);
            assert_eq!(x.nesting, y.nesting);
            assert_eq!(x.occurred, y.occurred);
            assert_eq!(x.payload_kind, y.payload_kind);
            assert_eq!(x.transport_encoding, y.transport_encoding);
        }
    }

    #[test]
    fn binary_round_trip() {
        let batch = sample_batch();
        let bytes = encode_batch(&batch).unwrap();
        let decoded = decode_batch(&bytes).unwrap();
        assert_primitive_fields_equal(&batch, &decoded);

        // 富载荷与未编码文本不进线
        for event in &decoded.events {
            assert_eq!(event.source, PayloadSource::None);
            assert!(event.payload.is_empty());
            assert!(!event.transport_encoding.is_empty());
        }
    }

    #[test]
    fn json_round_trip() {
        let batch = sample_batch();
        let text = batch_to_json(&batch).unwrap();
        let decoded = batch_from_json(&text).unwrap();
        assert_primitive_fields_equal(&batch, &decoded);
    }

    #[test]
    fn decoded_payload_recovers_text() {
        let batch = sample_batch();
        let decoded = decode_batch(&encode_batch(&batch).unwrap()).unwrap();
        assert_eq!(decoded.events[0].decoded_payload().unwrap(), "payload-0");
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(decode_batch(&[0x00, 0x01, 0x02]).is_err());
        assert!(batch_from_json("{不是 JSON").is_err());
    }
}
