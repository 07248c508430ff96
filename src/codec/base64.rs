//! base64 转码器 - RFC 4648，SSSE3 加速 + 标量回退
//!
//! 启动时探测一次 CPU 能力选定路径；SIMD 路径只处理整块，
//! 尾部与含填充的末组一律走标量，两条路径输出逐字节一致。

use once_cell::sync::Lazy;

const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const fn build_decode_table() -> [u8; 256] {
    let mut table = [0xFFu8; 256];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE_TABLE: [u8; 256] = build_decode_table();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Scalar,
    #[cfg(target_arch = "x86_64")]
    Ssse3,
}

static BACKEND: Lazy<Backend> = Lazy::new(|| {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("ssse3") {
            return Backend::Ssse3;
        }
    }
    Backend::Scalar
});

/// 当前生效的转码路径名（诊断用）
pub fn active_backend() -> &'static str {
    match *BACKEND {
        Backend::Scalar => "scalar",
        #[cfg(target_arch = "x86_64")]
        Backend::Ssse3 => "ssse3",
    }
}

/// 编码为带填充的 base64 文本
pub fn encode(input: &[u8]) -> String {
    let mut out = Vec::with_capacity(input.len().div_ceil(3) * 4);
    let mut consumed = 0;

    #[cfg(target_arch = "x86_64")]
    if *BACKEND == Backend::Ssse3 {
        consumed = unsafe { encode_ssse3(input, &mut out) };
    }

    encode_scalar(&input[consumed..], &mut out);
    String::from_utf8(out).expect("base64 输出必为 ASCII")
}

/// 解码带填充的 base64 文本
pub fn decode(input: &[u8]) -> Result<Vec<u8>, String> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if input.len() % 4 != 0 {
        return Err(format!("base64 长度 {} 不是 4 的倍数", input.len()));
    }

    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut consumed = 0;

    #[cfg(target_arch = "x86_64")]
    if *BACKEND == Backend::Ssse3 {
        consumed = unsafe { decode_ssse3(input, &mut out) };
    }

    decode_scalar(&input[consumed..], consumed, &mut out)?;
    Ok(out)
}

/// 标量编码路径，同时作为 SIMD 路径的差分基准
fn encode_scalar(input: &[u8], out: &mut Vec<u8>) {
    let mut chunks = input.chunks_exact(3);
    for chunk in &mut chunks {
        let n = (chunk[0] as u32) << 16 | (chunk[1] as u32) << 8 | chunk[2] as u32;
        out.push(ALPHABET[(n >> 18) as usize & 63]);
        out.push(ALPHABET[(n >> 12) as usize & 63]);
        out.push(ALPHABET[(n >> 6) as usize & 63]);
        out.push(ALPHABET[n as usize & 63]);
    }

    match chunks.remainder() {
        [] => {}
        [a] => {
            let n = (*a as u32) << 16;
            out.push(ALPHABET[(n >> 18) as usize & 63]);
            out.push(ALPHABET[(n >> 12) as usize & 63]);
            out.push(b'=');
            out.push(b'=');
        }
        [a, b] => {
            let n = (*a as u32) << 16 | (*b as u32) << 8;
            out.push(ALPHABET[(n >> 18) as usize & 63]);
            out.push(ALPHABET[(n >> 12) as usize & 63]);
            out.push(ALPHABET[(n >> 6) as usize & 63]);
            out.push(b'=');
        }
        _ => unreachable!(),
    }
}

/// 标量解码路径；`offset` 仅用于错误定位
fn decode_scalar(input: &[u8], offset: usize, out: &mut Vec<u8>) -> Result<(), String> {
    let quads = input.chunks_exact(4);
    debug_assert!(quads.remainder().is_empty());
    let total = input.len() / 4;

    for (qi, quad) in quads.enumerate() {
        let is_final = qi + 1 == total;
        let pad = if quad[3] == b'=' {
            if quad[2] == b'=' { 2 } else { 1 }
        } else {
            0
        };

        if pad > 0 && !is_final {
            return Err(format!("位置 {}: 填充符只能出现在末尾", offset + qi * 4));
        }

        let mut n = 0u32;
        for (ci, &c) in quad[..4 - pad].iter().enumerate() {
            let v = DECODE_TABLE[c as usize];
            if v == 0xFF {
                return Err(format!(
                    "位置 {}: 非法 base64 字符 0x{:02x}",
                    offset + qi * 4 + ci,
                    c
                ));
            }
            n = n << 6 | v as u32;
        }

        match pad {
            0 => {
                out.push((n >> 16) as u8);
                out.push((n >> 8) as u8);
                out.push(n as u8);
            }
            1 => {
                out.push((n >> 10) as u8);
                out.push((n >> 2) as u8);
            }
            2 => {
                out.push((n >> 4) as u8);
            }
            _ => unreachable!(),
        }
    }

    Ok(())
}

/// SSSE3 编码：每轮读 16 字节（消费 12）产出 16 个字符，返回已消费的输入字节数
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3")]
unsafe fn encode_ssse3(input: &[u8], out: &mut Vec<u8>) -> usize {
    use std::arch::x86_64::*;

    let shuf = _mm_setr_epi8(1, 0, 2, 1, 4, 3, 5, 4, 7, 6, 8, 7, 10, 9, 11, 10);
    // 6-bit 索引 -> ASCII 的偏移表（按 Mula 的 pshufb 方案）
    let shift_lut = _mm_setr_epi8(71, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -19, -16, 65, 0, 0);

    let mut i = 0usize;
    while i + 16 <= input.len() {
        let chunk = unsafe { _mm_loadu_si128(input.as_ptr().add(i) as *const __m128i) };
        let t = _mm_shuffle_epi8(chunk, shuf);

        let t0 = _mm_and_si128(t, _mm_set1_epi32(0x0fc0fc00u32 as i32));
        let t1 = _mm_mulhi_epu16(t0, _mm_set1_epi32(0x04000040));
        let t2 = _mm_and_si128(t, _mm_set1_epi32(0x003f03f0));
        let t3 = _mm_mullo_epi16(t2, _mm_set1_epi32(0x01000010));
        let indices = _mm_or_si128(t1, t3);

        let mut shift_idx = _mm_subs_epu8(indices, _mm_set1_epi8(51));
        let upper = _mm_cmpgt_epi8(_mm_set1_epi8(26), indices);
        shift_idx = _mm_or_si128(shift_idx, _mm_and_si128(upper, _mm_set1_epi8(13)));
        let ascii = _mm_add_epi8(indices, _mm_shuffle_epi8(shift_lut, shift_idx));

        let mut tmp = [0u8; 16];
        unsafe { _mm_storeu_si128(tmp.as_mut_ptr() as *mut __m128i, ascii) };
        out.extend_from_slice(&tmp);
        i += 12;
    }
    i
}

/// SSSE3 解码：每轮 16 字符 -> 12 字节，返回已消费的输入字节数
///
/// 末组（可能含填充）永远留给标量路径；遇到非法字符立即停下，
/// 由标量路径在准确位置报错。
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3")]
unsafe fn decode_ssse3(input: &[u8], out: &mut Vec<u8>) -> usize {
    use std::arch::x86_64::*;

    let lut_lo = _mm_setr_epi8(
        0x15, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x13, 0x1A, 0x1B, 0x1B, 0x1B,
        0x1A,
    );
    let lut_hi = _mm_setr_epi8(
        0x10, 0x10, 0x01, 0x02, 0x04, 0x08, 0x04, 0x08, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
        0x10,
    );
    let lut_roll = _mm_setr_epi8(0, 16, 19, 4, -65, -65, -71, -71, 0, 0, 0, 0, 0, 0, 0, 0);
    let mask_2f = _mm_set1_epi8(0x2f);
    let nibble_mask = _mm_set1_epi8(0x0f);
    let pack_bytes = _mm_setr_epi8(2, 1, 0, 6, 5, 4, 10, 9, 8, 14, 13, 12, -1, -1, -1, -1);

    // 末组留给标量处理填充
    let simd_end = input.len().saturating_sub(4);

    let mut i = 0usize;
    while i + 16 <= simd_end {
        let chunk = unsafe { _mm_loadu_si128(input.as_ptr().add(i) as *const __m128i) };

        let hi_nibbles = _mm_and_si128(_mm_srli_epi32::<4>(chunk), nibble_mask);
        let lo_nibbles = _mm_and_si128(chunk, nibble_mask);
        let lo = _mm_shuffle_epi8(lut_lo, lo_nibbles);
        let hi = _mm_shuffle_epi8(lut_hi, hi_nibbles);

        // 任一字节命中 lo & hi 即为非法字符
        let invalid = _mm_cmpgt_epi8(_mm_and_si128(lo, hi), _mm_setzero_si128());
        if _mm_movemask_epi8(invalid) != 0 {
            break;
        }

        let eq_2f = _mm_cmpeq_epi8(chunk, mask_2f);
        let roll = _mm_shuffle_epi8(lut_roll, _mm_add_epi8(eq_2f, hi_nibbles));
        let values = _mm_add_epi8(chunk, roll);

        let merge_ab_bc = _mm_maddubs_epi16(values, _mm_set1_epi32(0x01400140));
        let merged = _mm_madd_epi16(merge_ab_bc, _mm_set1_epi32(0x00011000));
        let packed = _mm_shuffle_epi8(merged, pack_bytes);

        let mut tmp = [0u8; 16];
        unsafe { _mm_storeu_si128(tmp.as_mut_ptr() as *mut __m128i, packed) };
        out.extend_from_slice(&tmp[..12]);
        i += 16;
    }
    i
}
