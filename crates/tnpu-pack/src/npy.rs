//! Minimal NumPy `.npy` reader and writer for little-endian `float32` arrays.
//!
//! Format reference: <https://numpy.org/devdocs/reference/generated/numpy.lib.format.html>

use tnpu_common::{FormatError, NpuError, Result, Tensor, checked_numel};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

fn npy_err(reason: impl Into<String>) -> NpuError {
    FormatError::Npy { reason: reason.into() }.into()
}

/// Decode a `.npy` buffer into a floating tensor of any rank.
///
/// Only `'<f4'` data in C order is accepted; header versions 1 through 3
/// are understood.
pub fn parse_npy(bytes: &[u8]) -> Result<Tensor> {
    if bytes.len() < 10 || &bytes[0..6] != NPY_MAGIC {
        return Err(npy_err("bad magic"));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(npy_err("truncated header length"));
            }
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        other => return Err(npy_err(format!("unsupported format version {other}"))),
    };

    let data_start = header_start + header_len;
    let header_bytes = bytes
        .get(header_start..data_start)
        .ok_or_else(|| npy_err(format!("header claims {header_len} bytes but file is shorter")))?;
    let header = std::str::from_utf8(header_bytes).map_err(|e| npy_err(format!("header is not utf8: {e}")))?;

    let descr = dict_value(header, "descr")?;
    if !matches!(descr.trim_matches(|c| c == '\'' || c == '"'), "<f4" | "float32") {
        return Err(npy_err(format!("unsupported dtype {descr} (only '<f4' is supported)")));
    }
    if dict_value(header, "fortran_order")?.trim() != "False" {
        return Err(npy_err("fortran_order arrays are not supported"));
    }
    let shape = parse_shape(header)?;

    let nbytes = checked_numel(&shape)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| npy_err(format!("shape {shape:?} is too large")))?;
    let raw = &bytes[data_start..];
    if raw.len() != nbytes {
        return Err(npy_err(format!("shape {shape:?} needs {nbytes} data bytes, found {}", raw.len())));
    }

    let data = raw.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
    Tensor::from_f32(shape, data)
}

/// Raw text following `'key':` in the header dict, up to the next top-level comma.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle_single = format!("'{key}':");
    let needle_double = format!("\"{key}\":");
    let (start, needle_len) = header
        .find(&needle_single)
        .map(|i| (i, needle_single.len()))
        .or_else(|| header.find(&needle_double).map(|i| (i, needle_double.len())))
        .ok_or_else(|| npy_err(format!("no '{key}' key in header")))?;

    let rest = header[start + needle_len..].trim_start();
    let end = match rest.starts_with('(') {
        true => rest.find(')').map(|i| i + 1),
        false => rest.find([',', '}']),
    };
    let end = end.ok_or_else(|| npy_err(format!("unterminated value for '{key}'")))?;
    Ok(&rest[..end])
}

fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let tuple = dict_value(header, "shape")?;
    let inner = tuple
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| npy_err(format!("shape is not a tuple: {tuple}")))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| npy_err(format!("bad shape dim `{s}`: {e}"))))
        .collect()
}

/// Encode a floating tensor as a version 1.0 `.npy` buffer.
pub fn encode_npy(tensor: &Tensor) -> Result<Vec<u8>> {
    let data = tensor.expect_f32("encode_npy", "tensor")?;
    let shape = match tensor.shape() {
        [d] => format!("({d},)"),
        dims => format!("({})", dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    };

    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape}, }}");
    // Pad so the data starts on a 64-byte boundary; the header ends with '\n'.
    let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| npy_err(format!("header of {} bytes does not fit a v1 file", header.len())))?;

    let mut out = Vec::with_capacity(10 + header.len() + data.len() * 4);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_npy(header: &str, payload: &[f32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for v in payload {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn parses_two_dimensional_array() {
        let bytes = raw_npy(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }\n",
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let t = parse_npy(&bytes).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn overflowing_shape_is_a_format_error() {
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387904, 4), }\n", &[]);
        let err = parse_npy(&bytes).unwrap_err();
        assert!(matches!(err, NpuError::Format(FormatError::Npy { .. })), "{err}");
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn parses_one_dimensional_tuple() {
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': False, 'shape': (3,), }\n", &[0.5, -0.5, 1.0]);
        assert_eq!(parse_npy(&bytes).unwrap().shape(), &[3]);
    }

    #[test]
    fn encode_then_parse_preserves_shape_and_alignment() {
        let t = Tensor::from_f32(vec![2, 2, 2], (0..8).map(|i| i as f32 * 0.25).collect()).unwrap();
        let bytes = encode_npy(&t).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(parse_npy(&bytes).unwrap(), t);
    }

    #[test]
    fn rejects_float64() {
        let bytes = raw_npy("{'descr': '<f8', 'fortran_order': False, 'shape': (1,), }\n", &[0.0, 0.0]);
        let err = parse_npy(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported dtype"), "{err}");
    }

    #[test]
    fn rejects_fortran_order() {
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': True, 'shape': (1,), }\n", &[0.0]);
        assert!(parse_npy(&bytes).is_err());
    }

    #[test]
    fn rejects_short_payload() {
        let bytes = raw_npy("{'descr': '<f4', 'fortran_order': False, 'shape': (4,), }\n", &[0.0, 1.0]);
        let err = parse_npy(&bytes).unwrap_err();
        assert!(matches!(err, NpuError::Format(FormatError::Npy { .. })));
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(parse_npy(b"NOTNUMPYATALL").is_err());
    }
}
