// Cache entry serializer
//
// Layout: MAGIC (4 bytes) || payload length (u32 LE) || payload, where the payload is
// a MessagePack map `{version, data}` and `data` is the program tree.

use super::error::CacheError;
use crate::parser::ast::CobolProgram;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const MAGIC: &[u8; 4] = b"COQU";

/// Bumped whenever the program tree layout changes
pub const FORMAT_VERSION: u64 = 1;

const HEADER_LEN: usize = 8;

/// Versioned payload
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u64,
    data: T,
}

/// Only the version of a payload whose data does not decode
#[derive(Deserialize)]
struct VersionOnly {
    version: u64,
}

/// Encodes program trees into cache entries and back
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer;

impl Serializer {
    pub fn serialize(program: &CobolProgram) -> Result<Vec<u8>, CacheError> {
        frame(&Envelope {
            version: FORMAT_VERSION,
            data: program,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<CobolProgram, CacheError> {
        let payload = payload(bytes)?;

        match rmp_serde::from_slice::<Envelope<CobolProgram>>(payload) {
            Ok(envelope) if envelope.version == FORMAT_VERSION => Ok(envelope.data),
            Ok(envelope) => Err(version_mismatch(envelope.version)),
            // Older or newer trees may not decode at all; report the version when it is readable.
            Err(e) => match rmp_serde::from_slice::<VersionOnly>(payload) {
                Ok(header) if header.version != FORMAT_VERSION => {
                    Err(version_mismatch(header.version))
                }
                _ => Err(e.into()),
            },
        }
    }

    /// Write an entry, replacing any existing file atomically
    ///
    /// Every writer gets its own temporary file next to `path`, so concurrent saves of
    /// the same key never interleave.
    pub fn save(program: &CobolProgram, path: &Path) -> Result<(), CacheError> {
        let bytes = Self::serialize(program)?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<CobolProgram, CacheError> {
        let bytes = fs::read(path)?;
        Self::deserialize(&bytes)
    }

    /// Entry as another format version would have written it
    #[cfg(test)]
    pub(crate) fn serialize_as_version(
        program: &CobolProgram,
        version: u64,
    ) -> Result<Vec<u8>, CacheError> {
        frame(&Envelope {
            version,
            data: program,
        })
    }
}

fn version_mismatch(found: u64) -> CacheError {
    CacheError::VersionMismatch {
        found,
        expected: FORMAT_VERSION,
    }
}

/// Magic and length header around an encoded envelope
fn frame<T: Serialize>(envelope: &Envelope<T>) -> Result<Vec<u8>, CacheError> {
    let payload = rmp_serde::to_vec_named(envelope)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CacheError::malformed("payload exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Check the header and return exactly the payload bytes it announces
fn payload(bytes: &[u8]) -> Result<&[u8], CacheError> {
    if bytes.len() < MAGIC.len() {
        return Err(CacheError::Truncated("missing magic"));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(CacheError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated("missing payload length"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[4..HEADER_LEN]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    let payload = &bytes[HEADER_LEN..];
    if payload.len() < len {
        return Err(CacheError::Truncated("payload shorter than header length"));
    }
    if payload.len() > len {
        return Err(CacheError::malformed("bytes after payload"));
    }
    Ok(payload)
}
