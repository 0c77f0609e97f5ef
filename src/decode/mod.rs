//! Schema-directed block decoding
//!
//! A [`BlockDecoder`] takes one decompressed block at a time and, for each of
//! the records the block declares:
//!
//! 1. walks the record bytes against the schema while feeding the values the
//!    filter targets into the predicate engine (either with the recursive
//!    walker or, when the parse loop is enabled, with a precompiled flat
//!    instruction stream),
//! 2. evaluates the filter,
//! 3. rewinds to the start of the record and walks it again with a dumper if
//!    it passed.
//!
//! The decoder is single-threaded; schema, filter structure and compiled
//! instruction streams are read-only once decoding starts, so one decoder
//! per worker thread shares nothing but the output sinks and the limiter.

pub mod buffer;
mod compiled;
mod walker;

use crate::{
	dump::{plain::PlainDumper, tsv::TsvRow, TsvSpec},
	filter::Filter,
	limit::Limiter,
	schema::Schema,
};

use buffer::ByteBuffer;

/// Any error raised while decoding record data
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	/// The block buffer was exhausted mid-walk
	#[error("unexpected end of block data")]
	UnexpectedEof,
	/// The process-wide record limit was reached; not an error for the user,
	/// the worker unwinds cleanly
	#[error("record limit reached")]
	Finished,
	/// A varint ran over the 10-byte maximum
	#[error("avro varint spans more than 10 bytes")]
	BadVarint,
	/// A negative length prefix
	#[error("invalid length prefix {0} in record data")]
	InvalidLength(i64),
	/// A union tag with no corresponding branch
	#[error("union tag {0} has no matching branch")]
	BadUnionTag(i64),
	/// An enum index outside the symbol table
	#[error("enum index {0} has no matching symbol")]
	BadEnumIndex(i64),
	/// Maps with values other than strings and integers can be skipped but
	/// not dumped
	#[error("map values of this type are not supported for dumping")]
	UnsupportedMapValue,
}

/// One decompressed block handed over by the framing layer
pub struct Block<'a> {
	/// Decompressed record data
	pub data: &'a [u8],
	/// Number of records the block header declared
	pub object_count: usize,
}

/// Decodes blocks, applies the filter, and drives the dumpers
///
/// Configure with the setters, then feed blocks to
/// [`decode_and_dump_block`](BlockDecoder::decode_and_dump_block).
pub struct BlockDecoder<'s> {
	schema: &'s Schema,
	limit: &'s Limiter,
	filter: Option<Filter>,
	tsv: Option<TsvSpec>,
	count_only: bool,
	parse_loop_enabled: bool,
	decode_loop: Vec<compiled::Instr>,
	tsv_loop: Vec<compiled::TsvInstr>,
	dump_sink: Box<dyn FnMut(&str) + 's>,
	count_sink: Box<dyn FnMut(u64) + 's>,
}

impl<'s> BlockDecoder<'s> {
	pub fn new(schema: &'s Schema, limit: &'s Limiter) -> Self {
		Self {
			schema,
			limit,
			filter: None,
			tsv: None,
			count_only: false,
			parse_loop_enabled: false,
			decode_loop: Vec::new(),
			tsv_loop: Vec::new(),
			dump_sink: Box::new(|_| {}),
			count_sink: Box::new(|_| {}),
		}
	}

	/// Install a filter already bound to this decoder's schema
	pub fn set_filter(&mut self, filter: Filter) {
		self.filter = Some(filter);
		self.recompile();
	}

	/// Install a TSV projection; when set, passing records are emitted as
	/// TSV rows instead of the structured dump
	pub fn set_tsv_projection(&mut self, spec: TsvSpec) {
		self.tsv = Some(spec);
		self.recompile();
	}

	/// Receives one finished output line (or dump chunk) per passing record
	pub fn set_dump_sink(&mut self, sink: Box<dyn FnMut(&str) + 's>) {
		self.dump_sink = sink;
	}

	/// Receives record counts in count-only mode
	pub fn set_count_sink(&mut self, sink: Box<dyn FnMut(u64) + 's>) {
		self.count_sink = sink;
	}

	/// Count passing records instead of dumping them
	pub fn enable_count_only(&mut self) {
		self.count_only = true;
	}

	/// Decode with flat instruction streams instead of recursive walks
	pub fn enable_parse_loop(&mut self) {
		self.parse_loop_enabled = true;
		self.recompile();
	}

	fn recompile(&mut self) {
		if !self.parse_loop_enabled {
			return;
		}
		self.decode_loop = compiled::compile_decode(
			self.schema,
			self.filter.as_ref().map(|filter| filter.predicates()),
		);
		self.tsv_loop = match &self.tsv {
			Some(spec) => compiled::compile_tsv(self.schema, spec),
			None => Vec::new(),
		};
	}

	/// Decode one block and emit whatever its records produce
	pub fn decode_and_dump_block(&mut self, block: &Block<'_>) -> Result<(), DecodeError> {
		if self.count_only && self.filter.is_none() {
			// The block header already knows the answer
			(self.count_sink)(block.object_count as u64);
			return Ok(());
		}

		let mut buffer = ByteBuffer::new(block.data);
		for _ in 0..block.object_count {
			if self.limit.finished() {
				return Err(DecodeError::Finished);
			}
			if buffer.eof() {
				return Err(DecodeError::UnexpectedEof);
			}
			buffer.mark_record_start();

			let predicates = self.filter.as_ref().map(|filter| filter.predicates());
			if self.parse_loop_enabled {
				compiled::run_decode_loop(&self.decode_loop, self.schema, &mut buffer, predicates)?;
			} else {
				walker::decode_value(self.schema, self.schema.root(), &mut buffer, predicates)?;
			}

			let passed = self.filter.as_ref().map_or(true, Filter::passed);
			if let Some(filter) = &self.filter {
				filter.reset_state();
			}
			if passed {
				if !self.limit.admit() {
					return Err(DecodeError::Finished);
				}
				self.dump_record(&mut buffer)?;
			}
		}
		Ok(())
	}

	fn dump_record(&mut self, buffer: &mut ByteBuffer<'_>) -> Result<(), DecodeError> {
		if self.count_only {
			(self.count_sink)(1);
			return Ok(());
		}
		buffer.rewind_to_record_start();
		if let Some(spec) = &self.tsv {
			let mut row = TsvRow::new(spec);
			if self.parse_loop_enabled {
				compiled::run_tsv_loop(&self.tsv_loop, self.schema, buffer, &mut row)?;
			} else {
				walker::dump_value(self.schema, self.schema.root(), buffer, &mut row)?;
			}
			row.finish(&mut *self.dump_sink);
		} else {
			let mut dumper = PlainDumper::new();
			walker::dump_value(self.schema, self.schema.root(), buffer, &mut dumper)?;
			dumper.finish(&mut *self.dump_sink);
		}
		Ok(())
	}
}
