//! On-disk tensor formats shared by every backend.
//!
//! Binary layout (little-endian): `i64 ndim`, `i64 dims[ndim]`, `f32 data[numel]`.
//! Text layout: a `# shape d0 d1 ...` header followed by values separated by
//! whitespace or commas, one row of the last dimension per line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{NativeError, NativeResult};

const SHAPE_HEADER: &str = "# shape";

pub fn numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn check_len(shape: &[usize], data: &[f32]) -> NativeResult<()> {
    match numel(shape) {
        Some(n) if n == data.len() => Ok(()),
        Some(n) => Err(NativeError::shape(format!(
            "shape {:?} holds {} elements, got {}",
            shape,
            n,
            data.len()
        ))),
        None => Err(NativeError::shape(format!("shape {:?} overflows", shape))),
    }
}

pub fn write_binary(path: &Path, shape: &[usize], data: &[f32]) -> NativeResult<()> {
    check_len(shape, data)?;
    let mut bytes = Vec::with_capacity(8 * (shape.len() + 1) + 4 * data.len());
    bytes.extend_from_slice(&(shape.len() as i64).to_le_bytes());
    for &dim in shape {
        bytes.extend_from_slice(&(dim as i64).to_le_bytes());
    }
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    write_file(path, &bytes)
}

pub fn read_binary(path: &Path) -> NativeResult<(Vec<usize>, Vec<f32>)> {
    let bytes = fs::read(path).map_err(|e| NativeError::io(path, e))?;
    let mut cursor = 0usize;
    let mut next_i64 = |what: &str| -> NativeResult<i64> {
        let end = cursor + 8;
        let chunk = bytes
            .get(cursor..end)
            .ok_or_else(|| NativeError::io(path, format!("truncated while reading {}", what)))?;
        cursor = end;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        Ok(i64::from_le_bytes(raw))
    };
    let ndim = next_i64("ndim")?;
    if !(0..=64).contains(&ndim) {
        return Err(NativeError::io(path, format!("implausible ndim {}", ndim)));
    }
    let mut shape = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let dim = next_i64("dimension")?;
        let dim = usize::try_from(dim)
            .map_err(|_| NativeError::io(path, format!("negative dimension {}", dim)))?;
        shape.push(dim);
    }
    let expected = numel(&shape)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| NativeError::io(path, format!("shape {:?} overflows", shape)))?;
    let header = 8 * (shape.len() + 1);
    let payload = &bytes[header..];
    if payload.len() != expected {
        return Err(NativeError::io(
            path,
            format!(
                "expected {} data bytes for shape {:?}, found {}",
                expected,
                shape,
                payload.len()
            ),
        ));
    }
    let data = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((shape, data))
}

pub fn write_text(path: &Path, shape: &[usize], data: &[f32]) -> NativeResult<()> {
    check_len(shape, data)?;
    let mut out = String::from(SHAPE_HEADER);
    for dim in shape {
        out.push(' ');
        out.push_str(&dim.to_string());
    }
    out.push('\n');
    let row = shape.last().copied().filter(|&d| d > 0).unwrap_or(1);
    for chunk in data.chunks(row) {
        let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    write_file(path, out.as_bytes())
}

pub fn read_text(path: &Path) -> NativeResult<(Vec<usize>, Vec<f32>)> {
    let text = fs::read_to_string(path).map_err(|e| NativeError::io(path, e))?;
    let mut lines = text.lines();
    let header = lines
        .next()
        .and_then(|l| l.trim().strip_prefix(SHAPE_HEADER))
        .ok_or_else(|| NativeError::io(path, "missing '# shape' header"))?;
    let shape = header
        .split_whitespace()
        .map(|tok| {
            tok.parse::<usize>()
                .map_err(|_| NativeError::io(path, format!("bad dimension '{}'", tok)))
        })
        .collect::<NativeResult<Vec<_>>>()?;
    let mut data = Vec::new();
    for line in lines {
        for tok in line.split(|c: char| c == ',' || c.is_whitespace()) {
            if tok.is_empty() {
                continue;
            }
            let v = tok
                .parse::<f32>()
                .map_err(|_| NativeError::io(path, format!("bad value '{}'", tok)))?;
            data.push(v);
        }
    }
    check_len(&shape, &data)?;
    Ok((shape, data))
}

fn write_file(path: &Path, bytes: &[u8]) -> NativeResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| NativeError::io(path, e))?;
    file.write_all(bytes).map_err(|e| NativeError::io(path, e))?;
    file.sync_all().map_err(|e| NativeError::io(path, e))
}
