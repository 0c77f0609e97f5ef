//! Block dispatch across a fixed pool of decoder threads
//!
//! The framing pass is cheap, so one thread walks the file handing
//! still-compressed [`BlockFrame`]s to a bounded channel; each worker owns
//! its own [`BlockDecoder`] and scratch decompression buffer and drains the
//! channel. Workers share only the output sink (a mutex, taken once per
//! emitted record) and the [`Limiter`].
//!
//! Output records are never interleaved mid-line, but block order across
//! workers is unspecified, as is record order across files.

use crate::{
	container::{self, BlockFrame, ContainerError, Header},
	decode::{Block, BlockDecoder, DecodeError},
	dump::TsvSpec,
	filter::{Expr, Filter},
	limit::Limiter,
	schema::SchemaError,
};

use std::{
	io::Write,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

/// Any error that aborts the processing of one file
#[derive(Debug, thiserror::Error)]
pub enum RunError {
	#[error(transparent)]
	Container(#[from] ContainerError),
	#[error(transparent)]
	Schema(#[from] SchemaError),
	#[error(transparent)]
	Decode(#[from] DecodeError),
}

/// What to do with every file, as resolved from the command line
pub struct RunOptions {
	/// Parsed filter expression; bound per file schema
	pub filter: Option<Expr>,
	/// Raw comma-separated projection list; bound per file schema
	pub fields: Option<String>,
	/// Emit counts instead of records
	pub count_only: bool,
	/// Decode with the compiled instruction loop
	pub parse_loop: bool,
	/// Number of decoder threads per file
	pub jobs: usize,
}

/// The only mutable state decoders share: the output stream and the running
/// count
pub struct OutputSink {
	out: Mutex<Box<dyn Write + Send>>,
	counted: AtomicU64,
}

impl OutputSink {
	pub fn new(out: Box<dyn Write + Send>) -> Self {
		Self {
			out: Mutex::new(out),
			counted: AtomicU64::new(0),
		}
	}

	pub fn stdout() -> Self {
		Self::new(Box::new(std::io::stdout()))
	}

	fn write_record(&self, record: &str) {
		let mut out = self.out.lock().expect("output lock poisoned");
		if let Err(e) = out.write_all(record.as_bytes()) {
			log::warn!("failed to write record: {e}");
		}
	}

	fn add_count(&self, n: u64) {
		self.counted.fetch_add(n, Ordering::Relaxed);
	}

	/// Total seen by count sinks so far
	pub fn total_count(&self) -> u64 {
		self.counted.load(Ordering::Relaxed)
	}

	pub fn flush(&self) {
		let mut out = self.out.lock().expect("output lock poisoned");
		if let Err(e) = out.flush() {
			log::warn!("failed to flush output: {e}");
		}
	}
}

/// Decode one mapped file with a pool of workers
///
/// Filter and projection paths are validated against the file's schema
/// before any thread spawns, so configuration errors surface immediately.
pub fn process_file(
	data: &[u8],
	options: &RunOptions,
	limit: &Limiter,
	output: &OutputSink,
) -> Result<(), RunError> {
	let (header, mut blocks) = container::open(data)?;

	if let Some(expr) = &options.filter {
		Filter::new(expr, &header.schema)?;
	}
	if let Some(fields) = &options.fields {
		TsvSpec::new(fields, &header.schema)?;
	}

	let jobs = options.jobs.max(1);
	let (sender, receiver) = crossbeam_channel::bounded(jobs * 2);

	std::thread::scope(|scope| {
		let header = &header;
		let mut workers = Vec::with_capacity(jobs);
		for _ in 0..jobs {
			let receiver = receiver.clone();
			workers
				.push(scope.spawn(move || worker_loop(receiver, header, options, limit, output)));
		}
		drop(receiver);

		let mut feed_result = Ok(());
		loop {
			if limit.finished() {
				break;
			}
			match blocks.next_block() {
				Ok(Some(frame)) => {
					if sender.send(frame).is_err() {
						// all workers are gone; their results say why
						break;
					}
				}
				Ok(None) => break,
				Err(e) => {
					feed_result = Err(RunError::Container(e));
					break;
				}
			}
		}
		drop(sender);

		for worker in workers {
			let result = worker.join().expect("worker thread panicked");
			if feed_result.is_ok() {
				feed_result = result;
			}
		}
		feed_result
	})
}

fn worker_loop(
	receiver: crossbeam_channel::Receiver<BlockFrame<'_>>,
	header: &Header,
	options: &RunOptions,
	limit: &Limiter,
	output: &OutputSink,
) -> Result<(), RunError> {
	let mut decoder = BlockDecoder::new(&header.schema, limit);
	if options.parse_loop {
		decoder.enable_parse_loop();
	}
	if options.count_only {
		decoder.enable_count_only();
	}
	if let Some(expr) = &options.filter {
		decoder.set_filter(Filter::new(expr, &header.schema)?);
	}
	if let Some(fields) = &options.fields {
		decoder.set_tsv_projection(TsvSpec::new(fields, &header.schema)?);
	}
	decoder.set_dump_sink(Box::new(|record| output.write_record(record)));
	decoder.set_count_sink(Box::new(|n| output.add_count(n)));

	let mut scratch = Vec::new();
	for frame in receiver {
		let data = header.codec.decompress(frame.data, &mut scratch)?;
		let block = Block {
			data,
			object_count: frame.object_count,
		};
		match decoder.decode_and_dump_block(&block) {
			Ok(()) => {}
			// the global limit was reached; unwind cleanly
			Err(DecodeError::Finished) => break,
			Err(e) => return Err(e.into()),
		}
	}
	Ok(())
}
