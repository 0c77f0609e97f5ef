//! Block compression codecs

use super::ContainerError;

use std::io::Read;

/// Compression codec declared by a file's `avro.codec` metadata entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
	/// Blocks are stored as-is
	Null,
	/// Raw deflate (RFC 1951, no zlib header)
	Deflate,
	/// Raw snappy, with a trailing 4-byte big-endian CRC32 of the
	/// decompressed data
	Snappy,
}

impl Codec {
	pub fn from_name(name: &str) -> Result<Self, ContainerError> {
		Ok(match name {
			"null" => Codec::Null,
			"deflate" => Codec::Deflate,
			"snappy" => Codec::Snappy,
			other => return Err(ContainerError::UnknownCodec(other.to_owned())),
		})
	}

	/// Decompress one block payload
	///
	/// The null codec returns the input slice untouched; the others reuse
	/// `scratch` so one buffer serves every block a worker decodes.
	pub fn decompress<'b>(
		self,
		data: &'b [u8],
		scratch: &'b mut Vec<u8>,
	) -> Result<&'b [u8], ContainerError> {
		match self {
			Codec::Null => Ok(data),
			Codec::Deflate => {
				scratch.clear();
				flate2::read::DeflateDecoder::new(data)
					.read_to_end(scratch)
					.map_err(ContainerError::Deflate)?;
				Ok(scratch)
			}
			Codec::Snappy => {
				if data.len() < 4 {
					return Err(ContainerError::Malformed(
						"snappy block too short to carry its CRC32",
					));
				}
				let (compressed, crc) = data.split_at(data.len() - 4);
				scratch.resize(snap::raw::decompress_len(compressed)?, 0);
				let written = snap::raw::Decoder::new().decompress(compressed, scratch)?;
				scratch.truncate(written);
				let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
				if crc32fast::hash(scratch) != expected {
					return Err(ContainerError::SnappyCrc);
				}
				Ok(scratch)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::io::Write;

	#[test]
	fn codec_names() {
		assert_eq!(Codec::from_name("null").unwrap(), Codec::Null);
		assert_eq!(Codec::from_name("deflate").unwrap(), Codec::Deflate);
		assert_eq!(Codec::from_name("snappy").unwrap(), Codec::Snappy);
		assert!(matches!(
			Codec::from_name("zstandard"),
			Err(ContainerError::UnknownCodec(_))
		));
	}

	#[test]
	fn null_passes_through() {
		let mut scratch = Vec::new();
		assert_eq!(
			Codec::Null.decompress(b"abc", &mut scratch).unwrap(),
			b"abc"
		);
	}

	#[test]
	fn deflate_round_trips() {
		let payload = b"hello hello hello hello";
		let mut encoder =
			flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
		encoder.write_all(payload).unwrap();
		let compressed = encoder.finish().unwrap();

		let mut scratch = Vec::new();
		assert_eq!(
			Codec::Deflate.decompress(&compressed, &mut scratch).unwrap(),
			payload
		);
	}

	#[test]
	fn snappy_round_trips_and_checks_crc() {
		let payload = b"snappy snappy snappy";
		let mut block = snap::raw::Encoder::new().compress_vec(payload).unwrap();
		block.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());

		let mut scratch = Vec::new();
		assert_eq!(
			Codec::Snappy.decompress(&block, &mut scratch).unwrap(),
			payload
		);

		let last = block.len() - 1;
		block[last] ^= 0xff;
		assert!(matches!(
			Codec::Snappy.decompress(&block, &mut scratch),
			Err(ContainerError::SnappyCrc)
		));
	}
}
