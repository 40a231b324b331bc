//! Binary weight pack format for quantized INT8 tensors.
//!
//! A pack is a single little-endian blob:
//!
//! | bytes            | field                                   |
//! |------------------|-----------------------------------------|
//! | `[0, 8)`         | magic `"TNPUWGT1"`                      |
//! | `[8, 12)`        | `u32` version (always 1)                |
//! | `[12, 16)`       | `u32` tensor count                      |
//! | `[16, 20)`       | `u32` manifest length in bytes          |
//! | `[20, 20 + len)` | UTF-8 JSON [`Manifest`]                 |
//! | remainder        | row-major INT8 payloads, no padding     |
//!
//! Readers validate the magic and version before looking at the manifest,
//! then check that the manifest entries partition the payload exactly.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use tnpu_common::Tensor;
//! use tnpu_pack::{pack, unpack};
//!
//! let mut tensors = BTreeMap::new();
//! tensors.insert("w".to_string(), Tensor::from_f32(vec![4, 4], vec![0.0; 16]).unwrap());
//! let blob = pack(&tensors).unwrap();
//! let weights = unpack(blob.as_bytes()).unwrap();
//! assert_eq!(weights.tensors["w"].scale(), 1.0);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use tnpu_common::{DType, FormatError, NpuError, Result, Tensor};
use tnpu_quantization::{QuantizedTensor, quantize};
use tracing::{debug, info};

pub mod manifest;
pub mod npy;
pub mod source;

pub use manifest::{Assumptions, Manifest, ManifestEntry};
pub use source::{NpyDirectorySource, TensorSource};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The eight-byte magic every pack starts with.
pub const PACK_MAGIC: [u8; 8] = *b"TNPUWGT1";
/// The only supported pack version.
pub const PACK_VERSION: u32 = 1;
/// Fixed header size preceding the manifest.
pub const HEADER_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    pub version: u32,
    pub tensor_count: u32,
    pub manifest_len: u32,
}

/// Returns `true` if `data` starts with the pack magic.
#[inline]
pub fn check_magic(data: &[u8]) -> bool {
    data.get(0..8) == Some(&PACK_MAGIC[..])
}

/// Parse and validate the fixed header: magic first, then version.
pub fn parse_header(data: &[u8]) -> Result<PackHeader> {
    if data.len() < HEADER_LEN {
        return Err(FormatError::Truncated { what: "header", needed: HEADER_LEN, found: data.len() }
            .into());
    }
    if !check_magic(data) {
        return Err(FormatError::BadMagic {
            expected: String::from_utf8_lossy(&PACK_MAGIC).into_owned(),
            found: String::from_utf8_lossy(&data[0..8]).into_owned(),
        }
        .into());
    }

    let version = read_u32(data, 8);
    if version != PACK_VERSION {
        return Err(FormatError::UnsupportedVersion { expected: PACK_VERSION, found: version }.into());
    }

    Ok(PackHeader { version, tensor_count: read_u32(data, 12), manifest_len: read_u32(data, 16) })
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn to_u32(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| FormatError::FieldOverflow { field, value: value as u64 }.into())
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// A serialized pack plus the manifest it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBlob {
    manifest: Manifest,
    bytes: Vec<u8>,
}

impl PackedBlob {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length of the concatenated tensor payload.
    pub fn payload_len(&self) -> usize {
        self.manifest.payload_len() as usize
    }
}

/// Quantize and pack floating tensors.
///
/// Tensors are visited in name order; each gets its own symmetric scale and
/// its bytes are appended to one contiguous payload.
pub fn pack(tensors: &BTreeMap<String, Tensor>) -> Result<PackedBlob> {
    let mut manifest = Manifest::new();
    let mut payload = Vec::new();

    for (name, tensor) in tensors {
        let quantized = quantize(tensor, None)?;
        let offset = payload.len() as u64;
        let bytes = quantized.values().to_i8_bytes().ok_or_else(|| {
            NpuError::invalid_arg("pack", format!("tensor `{name}` did not quantize to int8"))
        })?;
        payload.extend_from_slice(&bytes);

        debug!(tensor = %name, shape = ?tensor.shape(), scale = quantized.scale(), offset, "packed tensor");
        let entry = ManifestEntry {
            shape: tensor.shape().to_vec(),
            orig_dtype: tensor.dtype(),
            packed_dtype: DType::I8,
            scale: quantized.scale(),
            offset,
            nbytes: bytes.len() as u64,
        };
        manifest.tensors.insert(name.clone(), entry);
    }

    let json = serde_json::to_vec(&manifest)
        .map_err(|e| FormatError::ManifestJson { reason: e.to_string() })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + json.len() + payload.len());
    bytes.extend_from_slice(&PACK_MAGIC);
    bytes.extend_from_slice(&PACK_VERSION.to_le_bytes());
    bytes.extend_from_slice(&to_u32("tensor count", manifest.tensors.len())?.to_le_bytes());
    bytes.extend_from_slice(&to_u32("manifest length", json.len())?.to_le_bytes());
    bytes.extend_from_slice(&json);
    bytes.extend_from_slice(&payload);

    info!(tensors = manifest.tensors.len(), payload_bytes = payload.len(), "built weight pack");
    Ok(PackedBlob { manifest, bytes })
}

// ---------------------------------------------------------------------------
// Unpacking
// ---------------------------------------------------------------------------

/// Fully validated contents of a pack.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightPack {
    pub header: PackHeader,
    pub manifest: Manifest,
    pub tensors: BTreeMap<String, QuantizedTensor>,
}

/// Parse the header and manifest without materializing tensors.
///
/// Returns the header, the manifest, and the payload slice, after the manifest
/// has been checked against the payload.
pub fn read_manifest(data: &[u8]) -> Result<(PackHeader, Manifest, &[u8])> {
    let header = parse_header(data)?;

    let manifest_end = HEADER_LEN + header.manifest_len as usize;
    if data.len() < manifest_end {
        return Err(FormatError::Truncated { what: "manifest", needed: manifest_end, found: data.len() }
            .into());
    }
    let manifest: Manifest = serde_json::from_slice(&data[HEADER_LEN..manifest_end])
        .map_err(|e| FormatError::ManifestJson { reason: e.to_string() })?;

    if manifest.tensors.len() != header.tensor_count as usize {
        return Err(FormatError::TensorCountMismatch {
            header: header.tensor_count,
            manifest: manifest.tensors.len(),
        }
        .into());
    }

    let payload = &data[manifest_end..];
    manifest.validate(payload.len() as u64)?;
    Ok((header, manifest, payload))
}

/// Validate a pack and reconstruct every quantized tensor.
pub fn unpack(data: &[u8]) -> Result<WeightPack> {
    let (header, manifest, payload) = read_manifest(data)?;

    let mut tensors = BTreeMap::new();
    for (name, entry) in &manifest.tensors {
        let start = entry.offset as usize;
        let end = start + entry.nbytes as usize;
        let values = Tensor::from_i8_bytes(entry.shape.clone(), &payload[start..end])?;
        tensors.insert(name.clone(), QuantizedTensor::new(values, entry.scale)?);
    }

    debug!(tensors = tensors.len(), payload_bytes = payload.len(), "unpacked weight pack");
    Ok(WeightPack { header, manifest, tensors })
}

/// Write a pack to disk.
pub fn write_pack_file(path: &Path, blob: &PackedBlob) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| NpuError::io(parent, e))?;
    }
    std::fs::write(path, blob.as_bytes()).map_err(|e| NpuError::io(path, e))
}

/// Read and fully validate a pack from disk.
pub fn read_pack_file(path: &Path) -> Result<WeightPack> {
    let data = std::fs::read(path).map_err(|e| NpuError::io(path, e))?;
    unpack(&data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
