//! Object container file framing
//!
//! Locates the pieces of an avro file: the magic, the metadata map carrying
//! the schema and codec, the sync marker, and then one [`BlockFrame`] per
//! data block. Frames stay compressed here; decompression happens on the
//! worker that decodes the block, so the framing pass is nothing but a few
//! varint reads per block.

pub mod codec;

pub use codec::Codec;

use crate::{
	decode::{buffer::ByteBuffer, DecodeError},
	schema::{Schema, SchemaError},
};

use std::collections::HashMap;

/// First four bytes of every avro object container file
pub const MAGIC: [u8; 4] = *b"Obj\x01";

/// Any error raised while reading the container framing
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
	#[error("not an avro object container file (bad magic)")]
	BadMagic,
	#[error("block sync marker does not match the file header")]
	SyncMismatch,
	#[error("file metadata does not declare an avro.schema")]
	MissingSchema,
	#[error("unknown codec `{0}`")]
	UnknownCodec(String),
	#[error("container file is truncated")]
	Truncated,
	#[error("malformed container file: {0}")]
	Malformed(&'static str),
	#[error(transparent)]
	Schema(#[from] SchemaError),
	#[error("deflate decompression failed: {0}")]
	Deflate(std::io::Error),
	#[error("snappy decompression failed: {0}")]
	Snappy(#[from] snap::Error),
	#[error("snappy CRC32 of decompressed block does not match")]
	SnappyCrc,
}

fn framing_error(e: DecodeError) -> ContainerError {
	match e {
		DecodeError::UnexpectedEof => ContainerError::Truncated,
		_ => ContainerError::Malformed("bad varint in file framing"),
	}
}

/// Everything the file header declares
pub struct Header {
	/// Raw metadata entries
	pub metadata: HashMap<String, String>,
	/// Parsed `avro.schema`
	pub schema: Schema,
	/// Parsed `avro.codec`; absent means null
	pub codec: Codec,
	/// Sync marker every block must repeat
	pub sync: [u8; 16],
}

impl Header {
	/// Read the file header, leaving the cursor at the first block
	pub fn read(buffer: &mut ByteBuffer<'_>) -> Result<Self, ContainerError> {
		let magic = buffer.bytes(4).map_err(|_| ContainerError::BadMagic)?;
		if magic != MAGIC {
			return Err(ContainerError::BadMagic);
		}

		let mut metadata = HashMap::new();
		loop {
			let mut count = buffer.read_zigzag().map_err(framing_error)?;
			if count == 0 {
				break;
			}
			if count < 0 {
				// negative map blocks carry a byte count we have no use for
				buffer.read_zigzag().map_err(framing_error)?;
				count = count
					.checked_neg()
					.ok_or(ContainerError::Malformed("metadata block count overflow"))?;
			}
			for _ in 0..count {
				let key = buffer.read_str().map_err(framing_error)?;
				let value = buffer.read_str().map_err(framing_error)?;
				metadata.insert(
					String::from_utf8_lossy(key).into_owned(),
					String::from_utf8_lossy(value).into_owned(),
				);
			}
		}

		let schema = metadata
			.get("avro.schema")
			.ok_or(ContainerError::MissingSchema)?
			.parse()?;
		let codec = match metadata.get("avro.codec") {
			Some(name) => Codec::from_name(name)?,
			None => Codec::Null,
		};
		let sync = buffer.read_const::<16>().map_err(framing_error)?;

		Ok(Self {
			metadata,
			schema,
			codec,
			sync,
		})
	}
}

/// One still-compressed block of the file
pub struct BlockFrame<'a> {
	/// Number of records the block declares
	pub object_count: usize,
	/// Codec-framed payload
	pub data: &'a [u8],
}

/// Iterates the blocks that follow a [`Header`]
pub struct BlockReader<'a> {
	buffer: ByteBuffer<'a>,
	sync: [u8; 16],
}

impl<'a> BlockReader<'a> {
	/// Continue from the cursor a [`Header::read`] left behind
	pub fn new(buffer: ByteBuffer<'a>, sync: [u8; 16]) -> Self {
		Self { buffer, sync }
	}

	/// The next block frame, or `None` at a clean end of file
	pub fn next_block(&mut self) -> Result<Option<BlockFrame<'a>>, ContainerError> {
		if self.buffer.eof() {
			return Ok(None);
		}
		let object_count = self.buffer.read_zigzag().map_err(framing_error)?;
		let object_count = usize::try_from(object_count)
			.map_err(|_| ContainerError::Malformed("negative record count in block header"))?;
		let byte_count = self.buffer.read_zigzag().map_err(framing_error)?;
		let byte_count = usize::try_from(byte_count)
			.map_err(|_| ContainerError::Malformed("negative byte count in block header"))?;
		let data = self.buffer.bytes(byte_count).map_err(framing_error)?;
		let sync = self.buffer.read_const::<16>().map_err(framing_error)?;
		if sync != self.sync {
			return Err(ContainerError::SyncMismatch);
		}
		Ok(Some(BlockFrame { object_count, data }))
	}
}

/// Read the header of a mapped file and hand back the block iterator
pub fn open(data: &[u8]) -> Result<(Header, BlockReader<'_>), ContainerError> {
	let mut buffer = ByteBuffer::new(data);
	let header = Header::read(&mut buffer)?;
	let sync = header.sync;
	Ok((header, BlockReader::new(buffer, sync)))
}

#[cfg(test)]
mod tests {
	use super::*;

	use integer_encoding::VarInt;

	fn zz(value: i64) -> Vec<u8> {
		let mut out = vec![0u8; 10];
		let written = value.encode_var(&mut out);
		out.truncate(written);
		out
	}

	fn string(s: &str) -> Vec<u8> {
		let mut out = zz(s.len() as i64);
		out.extend_from_slice(s.as_bytes());
		out
	}

	const SYNC: [u8; 16] = *b"0123456789abcdef";

	fn file_with_one_block(codec: &str, block: &[u8], object_count: i64) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&MAGIC);
		out.extend(zz(2));
		out.extend(string("avro.schema"));
		out.extend(string(r#"{"type":"record","name":"r","fields":[{"name":"id","type":"long"}]}"#));
		out.extend(string("avro.codec"));
		out.extend(string(codec));
		out.extend(zz(0));
		out.extend_from_slice(&SYNC);
		out.extend(zz(object_count));
		out.extend(zz(block.len() as i64));
		out.extend_from_slice(block);
		out.extend_from_slice(&SYNC);
		out
	}

	#[test]
	fn header_and_blocks_parse() {
		let file = file_with_one_block("null", &[0x02, 0x04], 2);
		let (header, mut blocks) = open(&file).unwrap();
		assert_eq!(header.codec, Codec::Null);
		assert_eq!(header.sync, SYNC);
		assert_eq!(header.metadata["avro.codec"], "null");
		assert_eq!(header.schema.node_count(), 2);

		let frame = blocks.next_block().unwrap().unwrap();
		assert_eq!(frame.object_count, 2);
		assert_eq!(frame.data, [0x02, 0x04]);
		assert!(blocks.next_block().unwrap().is_none());
	}

	#[test]
	fn bad_magic_is_rejected() {
		assert!(matches!(open(b"PAR1"), Err(ContainerError::BadMagic)));
	}

	#[test]
	fn sync_mismatch_is_rejected() {
		let mut file = file_with_one_block("null", &[0x02], 1);
		let last = file.len() - 1;
		file[last] ^= 0xff;
		let (_, mut blocks) = open(&file).unwrap();
		assert!(matches!(
			blocks.next_block(),
			Err(ContainerError::SyncMismatch)
		));
	}

	#[test]
	fn missing_schema_is_rejected() {
		let mut out = Vec::new();
		out.extend_from_slice(&MAGIC);
		out.extend(zz(0));
		out.extend_from_slice(&SYNC);
		assert!(matches!(open(&out), Err(ContainerError::MissingSchema)));
	}

	#[test]
	fn truncated_files_are_rejected() {
		let file = file_with_one_block("null", &[0x02], 1);
		// cutting inside the block payload surfaces as truncation
		let (_, mut blocks) = open(&file[..file.len() - 17]).unwrap();
		assert!(matches!(
			blocks.next_block(),
			Err(ContainerError::Truncated)
		));
	}
}
