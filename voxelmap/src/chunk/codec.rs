//! Binary layout of a persisted chunk column.
//!
//! ```text
//! magic "VXCH" | version u8 | x i32 | z i32 | loaded u8
//! heights      : 1024 × u16
//! band count   : u16, then per band: index i32 + 32768 × u32
//! entity count : u32, then per entity:
//!     x i32 | y i32 | z i32 | kind u8 | len u32 | payload
//! ```
//!
//! All integers are little-endian. Microblock payloads are a list of `u32`
//! material ids; opaque payloads are stored verbatim.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{BlockEntityPayload, ChunkSnapshot, SourceError};
use crate::coord::{BlockPos, ChunkPos, CHUNK_AREA, CHUNK_VOLUME};

const MAGIC: &[u8; 4] = b"VXCH";
const VERSION: u8 = 1;

const KIND_MICROBLOCK: u8 = 1;
const KIND_OPAQUE: u8 = 2;

/// Serializes a snapshot for world storage.
pub fn encode_chunk(snapshot: &ChunkSnapshot) -> Bytes {
    let bands: Vec<_> = snapshot.bands().collect();
    let mut buf = BytesMut::with_capacity(
        14 + CHUNK_AREA * 2 + 2 + bands.len() * (4 + CHUNK_VOLUME * 4) + 4,
    );

    buf.put_slice(MAGIC);
    buf.put_u8(VERSION);
    buf.put_i32_le(snapshot.pos().x);
    buf.put_i32_le(snapshot.pos().z);
    buf.put_u8(snapshot.is_loaded() as u8);

    for &h in snapshot.height_map() {
        buf.put_u16_le(h);
    }

    buf.put_u16_le(bands.len() as u16);
    for (index, ids) in bands {
        buf.put_i32_le(index);
        for &id in ids {
            buf.put_u32_le(id);
        }
    }

    let entities: Vec<_> = snapshot.block_entities().collect();
    buf.put_u32_le(entities.len() as u32);
    for (pos, payload) in entities {
        buf.put_i32_le(pos.x);
        buf.put_i32_le(pos.y);
        buf.put_i32_le(pos.z);
        match payload {
            BlockEntityPayload::Microblock { material_ids } => {
                buf.put_u8(KIND_MICROBLOCK);
                buf.put_u32_le((material_ids.len() * 4) as u32);
                for &id in material_ids {
                    buf.put_u32_le(id);
                }
            }
            BlockEntityPayload::Opaque(data) => {
                buf.put_u8(KIND_OPAQUE);
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
        }
    }

    buf.freeze()
}

/// Parses a stored chunk. `pos` is the key it was stored under; a mismatch
/// with the embedded coordinates is treated as corruption.
pub fn decode_chunk(pos: ChunkPos, data: &[u8]) -> Result<ChunkSnapshot, SourceError> {
    let mut reader = Reader { pos, buf: data };

    reader.need(MAGIC.len() + 1 + 8 + 1)?;
    let mut magic = [0u8; 4];
    reader.buf.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(reader.corrupt("bad magic"));
    }
    let version = reader.buf.get_u8();
    if version != VERSION {
        return Err(reader.corrupt(format!("unsupported version {}", version)));
    }
    let x = reader.buf.get_i32_le();
    let z = reader.buf.get_i32_le();
    if ChunkPos::new(x, z) != pos {
        return Err(reader.corrupt(format!("embedded position ({}, {}) does not match", x, z)));
    }
    let loaded = reader.buf.get_u8() != 0;

    reader.need(CHUNK_AREA * 2)?;
    let heights = (0..CHUNK_AREA).map(|_| reader.buf.get_u16_le()).collect();

    let mut builder = ChunkSnapshot::builder(pos).height_map(heights).loaded(loaded);

    reader.need(2)?;
    let band_count = reader.buf.get_u16_le();
    for _ in 0..band_count {
        reader.need(4 + CHUNK_VOLUME * 4)?;
        let index = reader.buf.get_i32_le();
        let ids = (0..CHUNK_VOLUME).map(|_| reader.buf.get_u32_le()).collect();
        builder = builder.band(index, ids);
    }

    reader.need(4)?;
    let entity_count = reader.buf.get_u32_le();
    for _ in 0..entity_count {
        reader.need(12 + 1 + 4)?;
        let block = BlockPos::new(
            reader.buf.get_i32_le(),
            reader.buf.get_i32_le(),
            reader.buf.get_i32_le(),
        );
        let kind = reader.buf.get_u8();
        let len = reader.buf.get_u32_le() as usize;
        reader.need(len)?;
        let payload = match kind {
            KIND_MICROBLOCK => {
                if len % 4 != 0 {
                    return Err(reader.corrupt("microblock payload is not a list of ids"));
                }
                let material_ids = (0..len / 4).map(|_| reader.buf.get_u32_le()).collect();
                BlockEntityPayload::Microblock { material_ids }
            }
            KIND_OPAQUE => {
                let data = reader.buf[..len].to_vec();
                reader.buf.advance(len);
                BlockEntityPayload::Opaque(data)
            }
            other => return Err(reader.corrupt(format!("unknown entity kind {}", other))),
        };
        builder = builder.block_entity(block, payload);
    }

    if reader.buf.has_remaining() {
        return Err(reader.corrupt(format!("{} trailing bytes", reader.buf.remaining())));
    }

    builder.build()
}

struct Reader<'a> {
    pos: ChunkPos,
    buf: &'a [u8],
}

impl Reader<'_> {
    fn need(&self, n: usize) -> Result<(), SourceError> {
        if self.buf.remaining() < n {
            return Err(self.corrupt(format!(
                "truncated: need {} bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Corrupt {
            pos: self.pos,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChunkSnapshot {
        let mut heights = vec![64u16; CHUNK_AREA];
        heights[5] = 70;
        ChunkSnapshot::builder(ChunkPos::new(-3, 7))
            .height_map(heights)
            .band(2, vec![4; CHUNK_VOLUME])
            .block_entity(
                BlockPos::new(-96, 64, 224),
                BlockEntityPayload::Microblock {
                    material_ids: vec![12, 3],
                },
            )
            .block_entity(BlockPos::new(-95, 64, 224), BlockEntityPayload::Opaque(vec![1, 2, 3]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_contents() {
        let original = sample();
        let decoded = decode_chunk(original.pos(), &encode_chunk(&original)).unwrap();

        assert_eq!(decoded.height_map(), original.height_map());
        assert_eq!(decoded.block_at(0, 64, 0), 4);
        assert_eq!(
            decoded
                .block_entity(&BlockPos::new(-96, 64, 224))
                .and_then(|p| p.first_material()),
            Some(12)
        );
        assert_eq!(
            decoded.block_entity(&BlockPos::new(-95, 64, 224)),
            Some(&BlockEntityPayload::Opaque(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_decode_truncated_is_corrupt() {
        let snapshot = sample();
        let data = encode_chunk(&snapshot);
        let result = decode_chunk(snapshot.pos(), &data[..data.len() - 3]);
        assert!(matches!(result, Err(SourceError::Corrupt { .. })));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let result = decode_chunk(ChunkPos::new(0, 0), b"NOPE\x01");
        assert!(matches!(result, Err(SourceError::Corrupt { .. })));
    }

    #[test]
    fn test_decode_rejects_position_mismatch() {
        let snapshot = sample();
        let result = decode_chunk(ChunkPos::new(0, 0), &encode_chunk(&snapshot));
        assert!(matches!(result, Err(SourceError::Corrupt { .. })));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let snapshot = ChunkSnapshot::uniform(ChunkPos::new(1, 1), 10, 1);
        let mut data = encode_chunk(&snapshot).to_vec();
        data.push(0);
        let result = decode_chunk(snapshot.pos(), &data);
        assert!(matches!(result, Err(SourceError::Corrupt { .. })));
    }

    #[test]
    fn test_decode_negative_band_is_invalid() {
        let snapshot = ChunkSnapshot::uniform(ChunkPos::new(1, 1), 10, 1);
        let mut data = encode_chunk(&snapshot).to_vec();
        let band_offset = 4 + 1 + 8 + 1 + CHUNK_AREA * 2 + 2;
        data[band_offset..band_offset + 4].copy_from_slice(&(-1i32).to_le_bytes());
        let result = decode_chunk(snapshot.pos(), &data);
        assert!(matches!(result, Err(SourceError::InvalidSnapshot { .. })));
    }
}
