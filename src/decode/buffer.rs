//! Byte-level access to a decompressed block
//!
//! [`ByteBuffer`] is a forward-only cursor over a contiguous byte slice with
//! one extra capability: the position at the start of the current record can
//! be marked and rewound to, so that a record which passes the filter can be
//! walked a second time for dumping without copying anything.

use super::DecodeError;

use integer_encoding::VarInt;

/// Longest legal varint encoding of a 64-bit value
const MAX_VARINT_LEN: usize = 10;

/// Cursor over the decompressed bytes of one block
pub struct ByteBuffer<'a> {
	data: &'a [u8],
	pos: usize,
	record_start: usize,
}

impl<'a> ByteBuffer<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Self {
			data,
			pos: 0,
			record_start: 0,
		}
	}

	/// Whether the cursor has consumed all bytes
	pub fn eof(&self) -> bool {
		self.pos >= self.data.len()
	}

	/// Current cursor position, in bytes from the start of the block
	pub fn position(&self) -> usize {
		self.pos
	}

	/// Remember the current position as the start of a record
	pub fn mark_record_start(&mut self) {
		self.record_start = self.pos;
	}

	/// Move the cursor back to the last marked record start
	pub fn rewind_to_record_start(&mut self) {
		self.pos = self.record_start;
	}

	pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
		let byte = *self.data.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
		self.pos += 1;
		Ok(byte)
	}

	/// Borrow the next `n` bytes; the slice stays valid for the whole block
	pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
		let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
		let slice = self
			.data
			.get(self.pos..end)
			.ok_or(DecodeError::UnexpectedEof)?;
		self.pos = end;
		Ok(slice)
	}

	pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
		self.bytes(n).map(|_| ())
	}

	pub fn read_const<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
		let mut buf = [0u8; N];
		buf.copy_from_slice(self.bytes(N)?);
		Ok(buf)
	}

	/// Read a zig-zag encoded varint
	///
	/// All avro integers (ints, longs, lengths, block counts, union tags,
	/// enum indices) use this encoding.
	pub fn read_zigzag(&mut self) -> Result<i64, DecodeError> {
		match i64::decode_var(&self.data[self.pos.min(self.data.len())..]) {
			Some((value, read)) => {
				self.pos += read;
				Ok(value)
			}
			None => {
				if self.data.len() - self.pos >= MAX_VARINT_LEN {
					Err(DecodeError::BadVarint)
				} else {
					Err(DecodeError::UnexpectedEof)
				}
			}
		}
	}

	/// Consume a varint without assembling its value
	pub fn skip_varint(&mut self) -> Result<(), DecodeError> {
		for _ in 0..MAX_VARINT_LEN {
			if self.read_byte()? & 0x80 == 0 {
				return Ok(());
			}
		}
		Err(DecodeError::BadVarint)
	}

	/// Read a length-prefixed string, borrowed from the block
	///
	/// The bytes are assumed to be UTF-8 but are not validated.
	pub fn read_str(&mut self) -> Result<&'a [u8], DecodeError> {
		let len = self.read_len()?;
		self.bytes(len)
	}

	pub fn skip_str(&mut self) -> Result<(), DecodeError> {
		let len = self.read_len()?;
		self.skip(len)
	}

	/// Read a zig-zag length prefix, rejecting negative values
	pub fn read_len(&mut self) -> Result<usize, DecodeError> {
		let len = self.read_zigzag()?;
		usize::try_from(len).map_err(|_| DecodeError::InvalidLength(len))
	}

	pub fn read_float(&mut self) -> Result<f32, DecodeError> {
		Ok(f32::from_le_bytes(self.read_const::<4>()?))
	}

	pub fn read_double(&mut self) -> Result<f64, DecodeError> {
		Ok(f64::from_le_bytes(self.read_const::<8>()?))
	}

	pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
		Ok(self.read_byte()? == 1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encode_zigzag(value: i64) -> Vec<u8> {
		let mut out = vec![0u8; MAX_VARINT_LEN];
		let written = value.encode_var(&mut out);
		out.truncate(written);
		out
	}

	#[test]
	fn zigzag_round_trips() {
		for value in [
			0,
			1,
			-1,
			63,
			64,
			-64,
			-65,
			i64::from(i32::MAX),
			i64::from(i32::MIN),
			i64::MAX,
			i64::MIN,
		] {
			let encoded = encode_zigzag(value);
			let mut buffer = ByteBuffer::new(&encoded);
			assert_eq!(buffer.read_zigzag().unwrap(), value, "value {value}");
			assert!(buffer.eof());

			// skip_varint consumes exactly the same bytes as read_zigzag
			let mut buffer = ByteBuffer::new(&encoded);
			buffer.skip_varint().unwrap();
			assert_eq!(buffer.position(), encoded.len(), "value {value}");
		}
	}

	#[test]
	fn known_encodings() {
		// avro spec examples: 0 -> 00, -1 -> 01, 1 -> 02, -2 -> 03, 2 -> 04
		assert_eq!(encode_zigzag(0), [0x00]);
		assert_eq!(encode_zigzag(-1), [0x01]);
		assert_eq!(encode_zigzag(1), [0x02]);
		assert_eq!(encode_zigzag(-2), [0x03]);
		assert_eq!(encode_zigzag(2), [0x04]);
		assert_eq!(encode_zigzag(64), [0x80, 0x01]);
	}

	#[test]
	fn overlong_varint_is_rejected() {
		let encoded = [0x80u8; 11];
		assert!(matches!(
			ByteBuffer::new(&encoded).read_zigzag(),
			Err(DecodeError::BadVarint)
		));
		assert!(matches!(
			ByteBuffer::new(&encoded).skip_varint(),
			Err(DecodeError::BadVarint)
		));
	}

	#[test]
	fn truncated_varint_is_eof() {
		let encoded = [0x80u8, 0x80];
		assert!(matches!(
			ByteBuffer::new(&encoded).read_zigzag(),
			Err(DecodeError::UnexpectedEof)
		));
	}

	#[test]
	fn primitive_reads() {
		let mut data = Vec::new();
		data.extend_from_slice(&1.5f32.to_le_bytes());
		data.extend_from_slice(&(-2.5f64).to_le_bytes());
		data.push(1);
		data.push(0);
		data.extend_from_slice(&encode_zigzag(3));
		data.extend_from_slice(b"abc");

		let mut buffer = ByteBuffer::new(&data);
		assert_eq!(buffer.read_float().unwrap(), 1.5);
		assert_eq!(buffer.read_double().unwrap(), -2.5);
		assert!(buffer.read_bool().unwrap());
		assert!(!buffer.read_bool().unwrap());
		assert_eq!(buffer.read_str().unwrap(), b"abc");
		assert!(buffer.eof());
		assert!(matches!(
			buffer.read_byte(),
			Err(DecodeError::UnexpectedEof)
		));
	}

	#[test]
	fn negative_string_length_is_rejected() {
		let encoded = encode_zigzag(-5);
		assert!(matches!(
			ByteBuffer::new(&encoded).read_str(),
			Err(DecodeError::InvalidLength(-5))
		));
	}

	#[test]
	fn record_start_rewinds() {
		let data = [1, 2, 3, 4];
		let mut buffer = ByteBuffer::new(&data);
		buffer.skip(1).unwrap();
		buffer.mark_record_start();
		buffer.skip(2).unwrap();
		assert_eq!(buffer.position(), 3);
		buffer.rewind_to_record_start();
		assert_eq!(buffer.position(), 1);
		assert_eq!(buffer.read_byte().unwrap(), 2);
	}
}
