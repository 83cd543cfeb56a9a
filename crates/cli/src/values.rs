//! Packs CLI string arguments into the raw byte ABI `fusewasm::call_direct`
//! expects, and unpacks result bytes back into printable values
//! (`SPEC_FULL.md` §6). `fusewasm`'s call ABI is a flat byte buffer rather
//! than the teacher's typed `Val` enum, so parsing happens straight from
//! `&str` into each `ValType`'s little-endian encoding.

use anyhow::{bail, Context, Result};
use fusewasm::ValType;
use std::fmt;

/// Parses `args` against `params` and packs them into one buffer sized by
/// `FuncType::param_bytes()`.
pub fn encode_args(params: &[ValType], args: &[String]) -> Result<Vec<u8>> {
    if args.len() != params.len() {
        bail!("function expects {} argument(s), got {}", params.len(), args.len());
    }
    let mut buf = Vec::with_capacity(params.iter().map(|t| t.size()).sum());
    for (ty, arg) in params.iter().zip(args) {
        encode_one(*ty, arg, &mut buf).with_context(|| format!("invalid argument {arg:?} for type {ty:?}"))?;
    }
    Ok(buf)
}

fn encode_one(ty: ValType, arg: &str, buf: &mut Vec<u8>) -> Result<()> {
    match ty {
        ValType::I32 => {
            let v: i32 = parse_int(arg)?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ValType::I64 => {
            let v: i64 = parse_int(arg)?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ValType::F32 => {
            let v: f32 = arg.parse().context("not a valid f32")?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        ValType::F64 => {
            let v: f64 = arg.parse().context("not a valid f64")?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    Ok(())
}

/// Accepts plain decimal as well as `0x`-prefixed hex, matching the
/// teacher's CLI argument grammar.
fn parse_int<T>(arg: &str) -> Result<T>
where
    T: TryFromHex + std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("-0x")) {
        let negative = arg.starts_with('-');
        let parsed = T::from_hex_str(hex, negative)?;
        return Ok(parsed);
    }
    arg.parse::<T>().map_err(|e| anyhow::anyhow!("{e}"))
}

trait TryFromHex: Sized {
    fn from_hex_str(hex: &str, negative: bool) -> Result<Self>;
}

impl TryFromHex for i32 {
    fn from_hex_str(hex: &str, negative: bool) -> Result<Self> {
        let v = u32::from_str_radix(hex, 16).context("not a valid hex i32")? as i32;
        Ok(if negative { -v } else { v })
    }
}

impl TryFromHex for i64 {
    fn from_hex_str(hex: &str, negative: bool) -> Result<Self> {
        let v = u64::from_str_radix(hex, 16).context("not a valid hex i64")? as i64;
        Ok(if negative { -v } else { v })
    }
}

/// One decoded result value, ready for display.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Unpacks a result buffer back into one [`Value`] per entry in `results`.
pub fn decode_results(results: &[ValType], buf: &[u8]) -> Vec<Value> {
    let mut out = Vec::with_capacity(results.len());
    let mut offset = 0;
    for ty in results {
        let size = ty.size();
        let bytes = &buf[offset..offset + size];
        out.push(match ty {
            ValType::I32 => Value::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
            ValType::I64 => Value::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
            ValType::F32 => Value::F32(f32::from_le_bytes(bytes.try_into().unwrap())),
            ValType::F64 => Value::F64(f64::from_le_bytes(bytes.try_into().unwrap())),
        });
        offset += size;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_decimal_and_hex_integers() {
        let params = [ValType::I32, ValType::I64];
        let args = ["-7".to_string(), "0x2a".to_string()];
        let buf = encode_args(&params, &args).unwrap();
        assert_eq!(i32::from_le_bytes(buf[0..4].try_into().unwrap()), -7);
        assert_eq!(i64::from_le_bytes(buf[4..12].try_into().unwrap()), 0x2a);
    }

    #[test]
    fn rejects_wrong_argument_count() {
        let params = [ValType::I32];
        let err = encode_args(&params, &[]).unwrap_err();
        assert!(err.to_string().contains("expects 1 argument"));
    }

    #[test]
    fn round_trips_floats_through_decode_results() {
        let results = [ValType::F32, ValType::F64];
        let mut buf = Vec::new();
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        buf.extend_from_slice(&2.5f64.to_le_bytes());
        let values = decode_results(&results, &buf);
        assert_eq!(values[0].to_string(), "1.5");
        assert_eq!(values[1].to_string(), "2.5");
    }
}
