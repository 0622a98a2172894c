use std::collections::HashMap;
use std::ops::Range;

use tracing::debug;

use crate::constants::{PSSH_BOX_TYPE, PSSH_MIN_BOX_SIZE};
use crate::error::PsshError;
use crate::types::SystemId;

/**
    Parsed PSSH box. All ISOBMFF fields are kept so the box re-encodes unchanged.

    ISOBMFF PSSH box layout:
      [0..4]    box_size: u32 big-endian (total box size including this header)
      [4..8]    box_type: "pssh" (0x70737368)
      [8]       version: u8 (0 or 1)
      [9..12]   flags: u24 (typically 0x000000)
      [12..28]  system_id: 16 bytes
      if version == 1:
        [28..32]  key_id_count: u32 big-endian
        [32..]    key_ids: key_id_count * 16 bytes
      [..]      data_size: u32 big-endian
      [..]      data: data_size bytes
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshBox {
    /**
        PSSH box version (0 or 1).
    */
    pub version: u8,
    /**
        3-byte flags field (typically all zeros).
    */
    pub flags: [u8; 3],
    /**
        16-byte DRM system identifier.
    */
    pub system_id: [u8; 16],
    /**
        Key IDs from the box header (v1 only). Empty for v0 boxes.
    */
    pub key_ids: Vec<[u8; 16]>,
    /**
        Raw data payload. For Widevine this is a serialized WidevinePsshData
        protobuf; for PlayReady it is a PlayReady Header Object; etc.
    */
    pub data: Vec<u8>,
}

impl PsshBox {
    /**
        Build a version 0 box carrying `data` for the given system.
    */
    pub fn new(system_id: SystemId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            version: 0,
            flags: [0; 3],
            system_id: system_id.to_bytes(),
            key_ids: Vec::new(),
            data: data.into(),
        }
    }

    /**
        Build a version 1 box listing `key_ids` in its header.
    */
    pub fn with_key_ids(
        system_id: SystemId,
        key_ids: Vec<[u8; 16]>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            version: 1,
            flags: [0; 3],
            system_id: system_id.to_bytes(),
            key_ids,
            data: data.into(),
        }
    }

    /**
        Parse a base64-encoded PSSH box.
    */
    pub fn from_base64(pssh: &str) -> Result<Self, PsshError> {
        let bytes = crate::utils::decode_base64_lenient(pssh)
            .map_err(|e| PsshError::InvalidBase64(format!("PSSH: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /**
        Parse a PSSH box from raw bytes (full ISOBMFF box starting with box_size).
    */
    pub fn from_bytes(input: &[u8]) -> Result<Self, PsshError> {
        parse_box_at(input, 0)
    }

    /**
        Serialize back to ISOBMFF PSSH box bytes.

        Produces identical bytes to the original input when round-tripping
        through `from_bytes` / `to_bytes`.
    */
    pub fn to_bytes(&self) -> Vec<u8> {
        // header: 4 (size) + 4 (type) + 1 (ver) + 3 (flags) + 16 (sysid) = 28
        let mut size = 28usize;
        if self.version == 1 {
            size += 4 + self.key_ids.len() * 16;
        }
        size += 4 + self.data.len();

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&(size as u32).to_be_bytes());
        buf.extend_from_slice(&PSSH_BOX_TYPE);
        buf.push(self.version);
        buf.extend_from_slice(&self.flags);
        buf.extend_from_slice(&self.system_id);

        if self.version == 1 {
            buf.extend_from_slice(&(self.key_ids.len() as u32).to_be_bytes());
            for kid in &self.key_ids {
                buf.extend_from_slice(kid);
            }
        }

        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);

        buf
    }

    /**
        Serialize to a base64-encoded PSSH box string.
    */
    pub fn to_base64(&self) -> String {
        data_encoding::BASE64.encode(&self.to_bytes())
    }

    /**
        Key IDs from the box header (v1 only).
    */
    pub fn key_ids(&self) -> &[[u8; 16]] {
        &self.key_ids
    }

    /**
        Raw init data payload (the `data` field inside the PSSH box).
    */
    pub fn init_data(&self) -> &[u8] {
        &self.data
    }

    /**
        Identify the DRM system from the PSSH box's system ID.
    */
    pub fn system_id(&self) -> SystemId {
        SystemId::from_bytes(self.system_id)
    }

    /**
        Check that this PSSH box belongs to the given DRM system.
    */
    pub fn ensure_system_id(&self, expected: SystemId) -> Result<(), PsshError> {
        let actual = self.system_id();
        if actual == expected {
            Ok(())
        } else {
            Err(PsshError::SystemIdMismatch(actual, expected))
        }
    }
}

/**
    A PSSH box found while walking a concatenated box sequence, together with
    the byte range it occupies in the source buffer.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshRecord {
    pub range: Range<usize>,
    pub pssh: PsshBox,
}

impl PsshRecord {
    /**
        The complete box bytes as they appear in `source`.
    */
    pub fn box_bytes<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.range.clone()]
    }
}

/**
    Walk a buffer of concatenated ISOBMFF boxes and parse every PSSH box.

    Each iteration advances by the box's declared size. Boxes of other types
    and PSSH boxes with an unsupported version are skipped, but their declared
    size is still validated. A declared size below the minimum header length,
    a size running past the end of the buffer, or a PSSH payload that does not
    fit its box fails the whole call; no partial result is returned.
*/
pub fn parse_initialization_box_list(buffer: &[u8]) -> Result<Vec<PsshRecord>, PsshError> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < buffer.len() {
        let remaining = buffer.len() - offset;
        if remaining < 8 {
            return Err(PsshError::malformed(
                offset,
                format!("{remaining} trailing bytes cannot hold a box header"),
            ));
        }

        let size = read_u32_be(buffer, offset) as usize;
        if size < 8 {
            return Err(PsshError::malformed(
                offset,
                format!("declared box size {size} is smaller than a box header"),
            ));
        }
        if size > remaining {
            return Err(PsshError::malformed(
                offset,
                format!("declared box size {size} exceeds remaining {remaining} bytes"),
            ));
        }

        let box_type = &buffer[offset + 4..offset + 8];
        if box_type != PSSH_BOX_TYPE {
            debug!(
                offset,
                size,
                box_type = %String::from_utf8_lossy(box_type),
                "skipping non-pssh box"
            );
            offset += size;
            continue;
        }

        if size < PSSH_MIN_BOX_SIZE {
            return Err(PsshError::malformed(
                offset,
                format!("declared PSSH size {size} is below the {PSSH_MIN_BOX_SIZE}-byte minimum"),
            ));
        }

        let version = buffer[offset + 8];
        if version > 1 {
            debug!(offset, version, "skipping pssh box with unsupported version");
            offset += size;
            continue;
        }

        let pssh = parse_box_at(&buffer[offset..offset + size], offset)?;
        records.push(PsshRecord {
            range: offset..offset + size,
            pssh,
        });
        offset += size;
    }

    Ok(records)
}

/**
    Parse concatenated PSSH boxes into a mapping of system ID to the exact
    payload bytes of each box.

    When two boxes carry the same system ID the later one wins.
*/
pub fn parse_initialization_boxes(buffer: &[u8]) -> Result<HashMap<SystemId, Vec<u8>>, PsshError> {
    let records = parse_initialization_box_list(buffer)?;
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        map.insert(record.pssh.system_id(), record.pssh.data);
    }
    Ok(map)
}

/**
    Parse a single box; `base` is the offset of `input` within its source
    buffer and is only used for error reporting.
*/
fn parse_box_at(input: &[u8], base: usize) -> Result<PsshBox, PsshError> {
    if input.len() < PSSH_MIN_BOX_SIZE {
        return Err(PsshError::malformed(
            base,
            "input too short for PSSH box header",
        ));
    }

    let box_size = read_u32_be(input, 0) as usize;
    if box_size < PSSH_MIN_BOX_SIZE {
        return Err(PsshError::malformed(
            base,
            format!("box_size {box_size} is below the PSSH minimum"),
        ));
    }
    if box_size > input.len() {
        return Err(PsshError::malformed(base, "box_size exceeds input length"));
    }

    let box_data = &input[..box_size];
    if box_data[4..8] != PSSH_BOX_TYPE {
        return Err(PsshError::malformed(base, "box_type is not 'pssh'"));
    }

    let version = box_data[8];
    if version > 1 {
        return Err(PsshError::malformed(
            base,
            format!("unsupported version {version}"),
        ));
    }

    let mut flags = [0u8; 3];
    flags.copy_from_slice(&box_data[9..12]);

    let mut system_id = [0u8; 16];
    system_id.copy_from_slice(&box_data[12..28]);

    let mut offset = 28;
    let mut key_ids = Vec::new();

    if version == 1 {
        check_bounds(box_data, base, offset, 4, "key_id_count")?;
        let kid_count = read_u32_be(box_data, offset) as usize;
        offset += 4;

        let kid_bytes = kid_count
            .checked_mul(16)
            .ok_or_else(|| PsshError::malformed(base + offset, "key_id_count overflows"))?;
        check_bounds(box_data, base, offset, kid_bytes, "key_ids")?;
        for chunk in box_data[offset..offset + kid_bytes].chunks_exact(16) {
            let mut kid = [0u8; 16];
            kid.copy_from_slice(chunk);
            key_ids.push(kid);
        }
        offset += kid_bytes;
    }

    check_bounds(box_data, base, offset, 4, "data_size")?;
    let data_size = read_u32_be(box_data, offset) as usize;
    offset += 4;

    check_bounds(box_data, base, offset, data_size, "data")?;
    let data = box_data[offset..offset + data_size].to_vec();
    offset += data_size;

    if offset != box_size {
        return Err(PsshError::malformed(
            base,
            format!("trailing bytes: consumed {offset}, box_size {box_size}"),
        ));
    }

    Ok(PsshBox {
        version,
        flags,
        system_id,
        key_ids,
        data,
    })
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn check_bounds(
    data: &[u8],
    base: usize,
    offset: usize,
    need: usize,
    field: &str,
) -> Result<(), PsshError> {
    match offset.checked_add(need) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(PsshError::malformed(base + offset, format!("truncated {field}"))),
    }
}
