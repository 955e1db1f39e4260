use anyhow::{anyhow, Context, Result};
use serde_json::Value;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Facts about a binary glTF payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlbSummary {
    pub version: u32,
    pub total_length: u32,
    pub json_length: u32,
    pub binary_length: Option<u32>,
    pub mesh_count: usize,
    pub node_count: usize,
    /// `asset.generator` from the JSON chunk, when present.
    pub generator: Option<String>,
}

/// Returns true when the payload starts with the GLB magic.
pub fn looks_like_glb(data: &[u8]) -> bool {
    data.len() >= 4 && &data[..4] == GLB_MAGIC
}

/// Validates the GLB container and summarizes its JSON chunk.
pub fn inspect_glb(data: &[u8]) -> Result<GlbSummary> {
    if data.len() < HEADER_LEN {
        return Err(anyhow!(
            "GLB too small to contain header (len={})",
            data.len()
        ));
    }
    if !looks_like_glb(data) {
        return Err(anyhow!(
            "invalid GLB magic: expected glTF, found {:?}",
            &data[..4]
        ));
    }

    let mut cursor = 4;
    let version = read_u32(data, &mut cursor)?;
    if version != 2 {
        return Err(anyhow!("unsupported GLB version {version}"));
    }
    let total_length = read_u32(data, &mut cursor)?;
    if total_length as usize != data.len() {
        return Err(anyhow!(
            "GLB header declares {total_length} bytes but payload has {}",
            data.len()
        ));
    }

    let (json_type, json_bytes) = read_chunk(data, &mut cursor).context("invalid JSON chunk")?;
    if json_type != CHUNK_JSON {
        return Err(anyhow!(
            "first GLB chunk must be JSON, found type {json_type:#010x}"
        ));
    }
    let json: Value =
        serde_json::from_slice(json_bytes).context("GLB JSON chunk is not valid JSON")?;

    let mut binary_length = None;
    while cursor < data.len() {
        let (chunk_type, chunk) = read_chunk(data, &mut cursor)?;
        if chunk_type == CHUNK_BIN {
            if binary_length.is_some() {
                return Err(anyhow!("GLB contains more than one BIN chunk"));
            }
            binary_length = Some(chunk.len() as u32);
        }
    }

    let count = |key: &str| json.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    Ok(GlbSummary {
        version,
        total_length,
        json_length: json_bytes.len() as u32,
        binary_length,
        mesh_count: count("meshes"),
        node_count: count("nodes"),
        generator: json
            .pointer("/asset/generator")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn read_chunk<'a>(data: &'a [u8], cursor: &mut usize) -> Result<(u32, &'a [u8])> {
    if *cursor % 4 != 0 {
        return Err(anyhow!("GLB chunk at offset {} is not 4-byte aligned", *cursor));
    }
    if data.len().saturating_sub(*cursor) < CHUNK_HEADER_LEN {
        return Err(anyhow!(
            "truncated GLB chunk header at offset {} (len={})",
            *cursor,
            data.len()
        ));
    }
    let length = read_u32(data, cursor)? as usize;
    let chunk_type = read_u32(data, cursor)?;
    let start = *cursor;
    let end = start
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            anyhow!(
                "GLB chunk extends past payload (offset={start}, length={length}, len={})",
                data.len()
            )
        })?;
    *cursor = end;
    Ok((chunk_type, &data[start..end]))
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(*cursor..*cursor + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| anyhow!("unexpected end of GLB while reading 32-bit value"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes))
}

/// Builds a minimal GLB payload with the given JSON and optional BIN chunk.
#[cfg(test)]
pub(crate) fn build_glb(json: &str, binary: Option<&[u8]>) -> Vec<u8> {
    let mut json_bytes = json.as_bytes().to_vec();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut body = Vec::new();
    body.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    body.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    body.extend_from_slice(&json_bytes);
    if let Some(binary) = binary {
        let mut bin = binary.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        body.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        body.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        body.extend_from_slice(&bin);
    }

    let mut buffer = Vec::with_capacity(HEADER_LEN + body.len());
    buffer.extend_from_slice(GLB_MAGIC);
    buffer.extend_from_slice(&2u32.to_le_bytes());
    buffer.extend_from_slice(&((HEADER_LEN + body.len()) as u32).to_le_bytes());
    buffer.extend_from_slice(&body);
    buffer
}
