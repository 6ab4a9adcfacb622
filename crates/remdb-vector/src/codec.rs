//! Vector row encoding for the `embeddings_meta` CF: a flat, little-endian
//! `f32` array with no length prefix (the row's key already scopes it to
//! one id, and the surrounding index already knows its own dimensionality).

use remdb_core::error::{CResult, Error};

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_vector(bytes: &[u8]) -> CResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::corruption(format!(
            "embedding row is {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect())
}
