//! Reader for the IDX format the MNIST family of datasets is distributed in.
//!
//! A file starts with two zero bytes, a type byte (`0x08` for unsigned bytes) and the number
//! of dimensions, followed by each dimension as a big endian `u32` and then the raw data.

use std::{fs, path::Path};

use crate::{MlErr, Result};

const UBYTE: u8 = 0x08;

/// The decoded content of an IDX file of unsigned bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxArray {
    pub dims: Vec<usize>,
    pub data: Vec<u8>,
}

impl IdxArray {
    /// The amount of items along the first dimension.
    pub fn len(&self) -> usize {
        self.dims.first().copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads and decodes the IDX file at `path`.
pub fn read<P: AsRef<Path>>(path: P) -> Result<IdxArray> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    parse(&bytes, &path.display().to_string())
}

/// Decodes an in memory IDX file, `name` is only used for error messages.
pub fn parse(bytes: &[u8], name: &str) -> Result<IdxArray> {
    let invalid = |reason: String| MlErr::InvalidIdx {
        path: name.to_string(),
        reason,
    };

    let [0, 0, kind, ndims, rest @ ..] = bytes else {
        return Err(invalid("missing magic number".to_string()));
    };

    if *kind != UBYTE {
        return Err(invalid(format!("unsupported data type {kind:#04x}")));
    }

    let ndims = *ndims as usize;
    if rest.len() < ndims * 4 {
        return Err(invalid(format!("truncated header for {ndims} dimensions")));
    }

    let (header, data) = rest.split_at(ndims * 4);
    let dims: Vec<usize> = header
        .chunks_exact(4)
        .map(|dim| u32::from_be_bytes([dim[0], dim[1], dim[2], dim[3]]) as usize)
        .collect();

    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| invalid(format!("dimensions {dims:?} overflow")))?;
    if data.len() != expected {
        return Err(invalid(format!(
            "expected {expected} data bytes for dimensions {dims:?}, got {}",
            data.len()
        )));
    }

    Ok(IdxArray {
        dims,
        data: data.to_vec(),
    })
}

/// Encodes `data` as an IDX file of unsigned bytes.
pub fn encode(dims: &[usize], data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0, 0, UBYTE, dims.len() as u8];
    for &dim in dims {
        bytes.extend_from_slice(&(dim as u32).to_be_bytes());
    }

    bytes.extend_from_slice(data);
    bytes
}
