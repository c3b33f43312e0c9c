//! Binary connectivity snapshots (`.sncs`)
//!
//! Layout, all integers little-endian:
//!
//! | field            | size                    |
//! |------------------|-------------------------|
//! | magic `SNCS`     | 4                       |
//! | version          | u32                     |
//! | node count       | u64                     |
//! | edge count       | u64                     |
//! | payload CRC32    | u32                     |
//! | row offsets      | u64 x (node count + 1)  |
//! | sources          | u32 x edge count        |
//! | weights          | f32 x edge count        |

use log::debug;
use sparsenet_engine::Connectivity;
use std::fs;
use std::path::Path;

use crate::{
    error::{Result, StorageError},
    magic,
    schemas::{calculate_checksum, validate_checksum, validate_magic, validate_version, ByteReader},
    SNAPSHOT_VERSION,
};

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 28;

/// Encode a connectivity into the snapshot layout
pub fn encode_connectivity(connectivity: &Connectivity) -> Vec<u8> {
    let n = connectivity.node_count();
    let m = connectivity.edge_count();

    let mut payload = Vec::with_capacity((n + 1) * 8 + m * 8);
    for &offset in connectivity.row_offsets() {
        payload.extend_from_slice(&(offset as u64).to_le_bytes());
    }
    for &source in connectivity.sources() {
        payload.extend_from_slice(&source.to_le_bytes());
    }
    for &weight in connectivity.weights() {
        payload.extend_from_slice(&weight.to_le_bytes());
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&magic::SNCS);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(n as u64).to_le_bytes());
    bytes.extend_from_slice(&(m as u64).to_le_bytes());
    bytes.extend_from_slice(&calculate_checksum(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}

/// Decode a snapshot, verifying magic, version, checksum and CSR shape
pub fn decode_connectivity(data: &[u8]) -> Result<Connectivity> {
    validate_magic(data, magic::SNCS)?;
    let mut reader = ByteReader::new(data);
    reader.take(4, "magic")?;
    validate_version(reader.u32("version")?, SNAPSHOT_VERSION)?;
    let node_count = to_usize(reader.u64("node count")?)?;
    let edge_count = to_usize(reader.u64("edge count")?)?;
    let checksum = reader.u32("checksum")?;

    let expected_len = node_count
        .checked_add(1)
        .and_then(|rows| rows.checked_mul(8))
        .and_then(|rows| edge_count.checked_mul(8).and_then(|edges| rows.checked_add(edges)))
        .ok_or_else(|| StorageError::invalid_format("Counts overflow"))?;
    let payload = reader.rest();
    if payload.len() != expected_len {
        return Err(StorageError::invalid_format(format!(
            "Payload is {} bytes, expected {}",
            payload.len(),
            expected_len
        )));
    }
    validate_checksum(payload, checksum)?;

    let mut row_offsets = Vec::with_capacity(node_count + 1);
    for _ in 0..=node_count {
        row_offsets.push(to_usize(reader.u64("row offsets")?)?);
    }
    let mut sources = Vec::with_capacity(edge_count);
    for _ in 0..edge_count {
        sources.push(reader.u32("sources")?);
    }
    let mut weights = Vec::with_capacity(edge_count);
    for _ in 0..edge_count {
        weights.push(reader.f32("weights")?);
    }

    Ok(Connectivity::from_csr(node_count, row_offsets, sources, weights)?)
}

/// Write a snapshot file
pub fn write_connectivity(path: impl AsRef<Path>, connectivity: &Connectivity) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_connectivity(connectivity);
    fs::write(path, &bytes)?;
    debug!(
        "Wrote connectivity snapshot {} ({} edges, {} bytes)",
        path.display(),
        connectivity.edge_count(),
        bytes.len()
    );
    Ok(())
}

/// Read a snapshot file
pub fn read_connectivity(path: impl AsRef<Path>) -> Result<Connectivity> {
    let bytes = fs::read(path)?;
    decode_connectivity(&bytes)
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| StorageError::invalid_format(format!("Count {} too large", value)))
}
