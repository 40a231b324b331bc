//! JSON manifest describing every tensor in a pack.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tnpu_common::{DType, FormatError, Result};

/// Identifier written into every manifest's `format` field.
pub const MANIFEST_FORMAT: &str = "tnpu-int8-weights";

/// Quantization conventions every packed tensor follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumptions {
    pub quantization: String,
    pub zero_point: i32,
    pub endianness: String,
}

impl Assumptions {
    /// Reject any convention the packer and the hardware do not implement.
    fn check(&self) -> Result<()> {
        let want = Self::default();
        let mismatch = |field, expected: &dyn ToString, found: &dyn ToString| FormatError::UnsupportedAssumption {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        };
        if self.quantization != want.quantization {
            return Err(mismatch("quantization", &want.quantization, &self.quantization).into());
        }
        if self.zero_point != want.zero_point {
            return Err(mismatch("zero_point", &want.zero_point, &self.zero_point).into());
        }
        if self.endianness != want.endianness {
            return Err(mismatch("endianness", &want.endianness, &self.endianness).into());
        }
        Ok(())
    }
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            quantization: "symmetric_per_tensor".to_string(),
            zero_point: 0,
            endianness: "little".to_string(),
        }
    }
}

/// Location and quantization metadata of one tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub shape: Vec<usize>,
    pub orig_dtype: DType,
    pub packed_dtype: DType,
    pub scale: f32,
    /// Byte offset relative to the start of the payload.
    pub offset: u64,
    pub nbytes: u64,
}

impl ManifestEntry {
    /// Number of elements implied by `shape`, or `None` on overflow.
    pub fn elements(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d as u64))
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.packed_dtype != DType::I8 {
            return Err(FormatError::UnsupportedDtype {
                name: name.to_string(),
                dtype: self.packed_dtype.to_string(),
            }
            .into());
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(FormatError::InvalidScale { name: name.to_string(), scale: self.scale as f64 }.into());
        }
        let elements = self.elements();
        if self.shape.iter().any(|&d| d == 0) || elements != Some(self.nbytes) {
            return Err(FormatError::ShapeLength {
                name: name.to_string(),
                shape: self.shape.clone(),
                elements: elements.unwrap_or(u64::MAX),
                nbytes: self.nbytes,
            }
            .into());
        }
        Ok(())
    }
}

/// Top-level manifest object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    #[serde(default)]
    pub assumptions: Assumptions,
    pub tensors: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            format: MANIFEST_FORMAT.to_string(),
            assumptions: Assumptions::default(),
            tensors: BTreeMap::new(),
        }
    }

    /// Sum of all entry sizes.
    pub fn payload_len(&self) -> u64 {
        self.tensors.values().map(|e| e.nbytes).sum()
    }

    /// Check the format tag, the quantization conventions, every entry, and
    /// that the entries tile `[0, payload_len)` exactly.
    ///
    /// Entries are ordered by offset before the partition check, so a writer
    /// is free to lay tensors out in any order as long as there are no gaps
    /// or overlaps.
    pub fn validate(&self, payload_len: u64) -> Result<()> {
        if self.format != MANIFEST_FORMAT {
            return Err(FormatError::ManifestFormat {
                expected: MANIFEST_FORMAT.to_string(),
                found: self.format.clone(),
            }
            .into());
        }
        self.assumptions.check()?;

        for (name, entry) in &self.tensors {
            entry.check(name)?;
        }

        let mut by_offset: Vec<(&String, &ManifestEntry)> = self.tensors.iter().collect();
        by_offset.sort_by_key(|(name, e)| (e.offset, *name));

        let mut cursor = 0u64;
        for (name, entry) in by_offset {
            if entry.offset > cursor {
                return Err(FormatError::OffsetGap {
                    name: name.clone(),
                    expected: cursor,
                    found: entry.offset,
                    gap: entry.offset - cursor,
                }
                .into());
            }
            if entry.offset < cursor {
                return Err(FormatError::OffsetOverlap {
                    name: name.clone(),
                    expected: cursor,
                    found: entry.offset,
                    overlap: cursor - entry.offset,
                }
                .into());
            }
            cursor = entry.offset.checked_add(entry.nbytes).ok_or(FormatError::FieldOverflow {
                field: "tensor end offset",
                value: entry.offset,
            })?;
        }

        if cursor != payload_len {
            return Err(FormatError::PayloadLength { manifest: cursor, payload: payload_len }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tnpu_common::NpuError;

    fn entry(shape: Vec<usize>, offset: u64) -> ManifestEntry {
        let nbytes = shape.iter().product::<usize>() as u64;
        ManifestEntry {
            shape,
            orig_dtype: DType::F32,
            packed_dtype: DType::I8,
            scale: 0.5,
            offset,
            nbytes,
        }
    }

    fn manifest(entries: Vec<(&str, ManifestEntry)>) -> Manifest {
        let mut m = Manifest::new();
        for (name, e) in entries {
            m.tensors.insert(name.to_string(), e);
        }
        m
    }

    fn format_err(err: NpuError) -> FormatError {
        match err {
            NpuError::Format(f) => f,
            other => panic!("expected format error, got {other}"),
        }
    }

    #[test]
    fn contiguous_entries_validate() {
        let m = manifest(vec![("a", entry(vec![2, 2], 0)), ("b", entry(vec![3], 4))]);
        m.validate(7).unwrap();
        assert_eq!(m.payload_len(), 7);
    }

    #[test]
    fn offsets_need_not_follow_name_order() {
        let m = manifest(vec![("a", entry(vec![3], 4)), ("b", entry(vec![4], 0))]);
        m.validate(7).unwrap();
    }

    #[test]
    fn gap_is_reported_with_size() {
        let m = manifest(vec![("a", entry(vec![4], 0)), ("b", entry(vec![2], 6))]);
        let err = format_err(m.validate(8).unwrap_err());
        assert_eq!(err, FormatError::OffsetGap { name: "b".into(), expected: 4, found: 6, gap: 2 });
    }

    #[test]
    fn overlap_is_distinct_from_gap() {
        let m = manifest(vec![("a", entry(vec![4], 0)), ("b", entry(vec![2], 3))]);
        let err = format_err(m.validate(5).unwrap_err());
        assert_eq!(err, FormatError::OffsetOverlap { name: "b".into(), expected: 4, found: 3, overlap: 1 });
    }

    #[test]
    fn first_entry_must_start_at_zero() {
        let m = manifest(vec![("a", entry(vec![4], 1))]);
        let err = format_err(m.validate(5).unwrap_err());
        assert!(matches!(err, FormatError::OffsetGap { gap: 1, .. }));
    }

    #[test]
    fn shape_must_match_nbytes() {
        let mut e = entry(vec![2, 3], 0);
        e.nbytes = 5;
        let err = format_err(manifest(vec![("w", e)]).validate(5).unwrap_err());
        assert!(matches!(err, FormatError::ShapeLength { elements: 6, nbytes: 5, .. }));
    }

    #[test]
    fn rejects_non_int8_payload() {
        let mut e = entry(vec![1], 0);
        e.packed_dtype = DType::F32;
        let err = format_err(manifest(vec![("w", e)]).validate(1).unwrap_err());
        assert!(matches!(err, FormatError::UnsupportedDtype { .. }));
    }

    #[test]
    fn rejects_non_positive_scale() {
        let mut e = entry(vec![1], 0);
        e.scale = 0.0;
        let err = format_err(manifest(vec![("w", e)]).validate(1).unwrap_err());
        assert!(matches!(err, FormatError::InvalidScale { .. }));
    }

    #[test]
    fn rejects_unknown_format_tag() {
        let mut m = manifest(vec![("w", entry(vec![1], 0))]);
        m.format = "tnpu-int4-weights".into();
        let err = format_err(m.validate(1).unwrap_err());
        assert_eq!(
            err,
            FormatError::ManifestFormat { expected: MANIFEST_FORMAT.into(), found: "tnpu-int4-weights".into() }
        );
    }

    #[test]
    fn rejects_conventions_the_hardware_does_not_use() {
        let mut asym = manifest(vec![("w", entry(vec![1], 0))]);
        asym.assumptions.quantization = "asymmetric_per_channel".into();
        let err = format_err(asym.validate(1).unwrap_err());
        assert!(matches!(err, FormatError::UnsupportedAssumption { field: "quantization", .. }));

        let mut offset = manifest(vec![("w", entry(vec![1], 0))]);
        offset.assumptions.zero_point = 3;
        let err = format_err(offset.validate(1).unwrap_err());
        assert_eq!(
            err,
            FormatError::UnsupportedAssumption { field: "zero_point", expected: "0".into(), found: "3".into() }
        );

        let mut big = manifest(vec![("w", entry(vec![1], 0))]);
        big.assumptions.endianness = "big".into();
        let err = format_err(big.validate(1).unwrap_err());
        assert!(matches!(err, FormatError::UnsupportedAssumption { field: "endianness", .. }));
    }

    #[test]
    fn missing_assumptions_block_takes_the_defaults() {
        let json = format!(r#"{{"format":"{MANIFEST_FORMAT}","tensors":{{}}}}"#);
        let m: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m.assumptions, Assumptions::default());
        m.validate(0).unwrap();
    }

    #[test]
    fn serializes_dtype_names() {
        let m = manifest(vec![("w", entry(vec![1], 0))]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["tensors"]["w"]["orig_dtype"], "float32");
        assert_eq!(json["tensors"]["w"]["packed_dtype"], "int8");
        assert_eq!(json["assumptions"]["zero_point"], 0);
        assert_eq!(json["format"], MANIFEST_FORMAT);
    }
}
