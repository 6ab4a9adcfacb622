//! The WAL binary frame (§6 "WAL binary frame"): `length | log_seq_no |
//! tenant_id_len ; tenant_id | op | payload_hash | payload`.

use remdb_core::error::{CResult, Error};
use remdb_core::tenant::TenantId;

/// The mutation kinds a WAL entry can carry (§3 "WAL Entry").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalOp {
    PutEntity,
    DeleteEntity,
    PutEdge,
    DeleteEdge,
    PutSchema,
    Reindex,
}

impl WalOp {
    fn to_byte(self) -> u8 {
        match self {
            WalOp::PutEntity => 0,
            WalOp::DeleteEntity => 1,
            WalOp::PutEdge => 2,
            WalOp::DeleteEdge => 3,
            WalOp::PutSchema => 4,
            WalOp::Reindex => 5,
        }
    }

    fn from_byte(b: u8) -> CResult<Self> {
        match b {
            0 => Ok(WalOp::PutEntity),
            1 => Ok(WalOp::DeleteEntity),
            2 => Ok(WalOp::PutEdge),
            3 => Ok(WalOp::DeleteEdge),
            4 => Ok(WalOp::PutSchema),
            5 => Ok(WalOp::Reindex),
            other => Err(Error::corruption(format!("unknown WAL op byte {other}"))),
        }
    }
}

/// One logical, schema-aware mutation (§6): replicas at the same schema
/// version reproduce identical state by replaying these, not by replaying
/// physical page diffs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalEntry {
    pub log_seq_no: u64,
    pub tenant: TenantId,
    pub op: WalOp,
    pub payload_hash: [u8; 32],
    pub payload: Vec<u8>,
}

impl WalEntry {
    pub fn new(log_seq_no: u64, tenant: TenantId, op: WalOp, payload: Vec<u8>) -> Self {
        let payload_hash = *blake3::hash(&payload).as_bytes();
        WalEntry { log_seq_no, tenant, op, payload_hash, payload }
    }

    /// Encodes the frame body (everything after the leading `u32 length`,
    /// which [`crate::sequencer::WalSequencer`] prepends once the body's
    /// length is known).
    fn encode_body(&self) -> Vec<u8> {
        let tenant_bytes = self.tenant.as_bytes();
        let mut out = Vec::with_capacity(8 + 4 + tenant_bytes.len() + 1 + 32 + self.payload.len());
        out.extend_from_slice(&self.log_seq_no.to_be_bytes());
        out.extend_from_slice(&(tenant_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(tenant_bytes);
        out.push(self.op.to_byte());
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Encodes the full frame, including the leading `u32 length` prefix
    /// covering everything that follows it.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Decodes a full frame (including the `u32 length` prefix), verifying
    /// the payload against `payload_hash` and the declared length against
    /// the buffer actually consumed.
    pub fn decode(bytes: &[u8]) -> CResult<Self> {
        if bytes.len() < 4 {
            return Err(Error::corruption("WAL frame shorter than the length prefix"));
        }
        let declared_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let body = &bytes[4..];
        if body.len() != declared_len {
            return Err(Error::corruption(format!(
                "WAL frame declared length {declared_len} but body is {} bytes",
                body.len()
            )));
        }

        let mut pos = 0usize;
        let log_seq_no = read_u64(body, &mut pos)?;
        let tenant_len = read_u32(body, &mut pos)? as usize;
        let tenant_bytes = read_bytes(body, &mut pos, tenant_len)?;
        let tenant = TenantId::new(String::from_utf8(tenant_bytes.to_vec()).map_err(|e| {
            Error::corruption(format!("WAL frame tenant id is not valid UTF-8: {e}"))
        })?)?;
        let op = WalOp::from_byte(read_byte(body, &mut pos)?)?;
        let payload_hash: [u8; 32] = read_bytes(body, &mut pos, 32)?.try_into().unwrap();
        let payload = body[pos..].to_vec();

        let actual_hash = *blake3::hash(&payload).as_bytes();
        if actual_hash != payload_hash {
            return Err(Error::corruption(format!(
                "WAL entry {log_seq_no} payload hash mismatch"
            )));
        }

        Ok(WalEntry { log_seq_no, tenant, op, payload_hash, payload })
    }

    /// The big-endian `log_seq_no` key this entry sorts under in the `wal`
    /// column family (§6: "packed back-to-back... with `log_seq_no` as the
    /// sort key").
    pub fn storage_key(log_seq_no: u64) -> [u8; 8] {
        log_seq_no.to_be_bytes()
    }
}

fn read_byte(buf: &[u8], pos: &mut usize) -> CResult<u8> {
    let b = *buf.get(*pos).ok_or_else(|| Error::corruption("WAL frame truncated"))?;
    *pos += 1;
    Ok(b)
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> CResult<&'a [u8]> {
    let end = *pos + len;
    let slice = buf.get(*pos..end).ok_or_else(|| Error::corruption("WAL frame truncated"))?;
    *pos = end;
    Ok(slice)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> CResult<u32> {
    let bytes = read_bytes(buf, pos, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> CResult<u64> {
    let bytes = read_bytes(buf, pos, 8)?;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}
