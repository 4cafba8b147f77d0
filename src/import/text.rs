//! Input text decoding
//!
//! Package exports and reference scripts are often saved as UTF-16 with a
//! byte-order mark. Files are decoded by their BOM and treated as UTF-8 when
//! there is none.

use std::path::Path;

use crate::error::{AuditError, AuditResult};

/// Decode file bytes by byte-order mark
pub fn decode_text(bytes: &[u8]) -> Result<String, String> {
    if let Some(body) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(body, true);
    }
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(body, false);
    }
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8(body.to_vec()).map_err(|e| format!("invalid UTF-8: {}", e))
}

fn decode_utf16(body: &[u8], little_endian: bool) -> Result<String, String> {
    if body.len() % 2 != 0 {
        return Err("invalid UTF-16 byte length".to_string());
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|_| "invalid UTF-16".to_string())
}

/// Read and decode a text file
pub fn read_text_file(path: &Path) -> AuditResult<String> {
    let bytes = std::fs::read(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_text(&bytes).map_err(|message| AuditError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, message),
    })
}
