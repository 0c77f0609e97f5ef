use avq::{
	filter,
	limit::Limiter,
	worker::{process_file, OutputSink, RunOptions},
};

use {
	anyhow::Context,
	clap::Parser,
	std::path::{Path, PathBuf},
};

/// Query avro object container files: filter records, project fields to
/// TSV, or count matches.
#[derive(Debug, Parser)]
#[command(name = "avq", version, about)]
struct Args {
	/// Input avro files
	#[arg(required = true)]
	files: Vec<PathBuf>,

	/// Filter expression, e.g. `user.name == "bob" and score ~= nil`
	#[arg(short, long)]
	filter: Option<String>,

	/// Comma-separated field paths to print as TSV columns
	#[arg(short = 't', long = "fields")]
	fields: Option<String>,

	/// Print the number of matching records instead of the records
	#[arg(short, long)]
	count: bool,

	/// Stop after emitting this many records
	#[arg(short = 'n', long)]
	limit: Option<u64>,

	/// Number of decoder threads per file
	#[arg(short, long)]
	jobs: Option<usize>,

	/// Decode with the precompiled instruction loop
	#[arg(long)]
	parse_loop: bool,
}

fn main() {
	env_logger::init();
	let args = Args::parse();
	match run(&args) {
		Ok(true) => {}
		Ok(false) => std::process::exit(1),
		Err(e) => {
			eprintln!("avq: {e:#}");
			std::process::exit(1);
		}
	}
}

fn run(args: &Args) -> anyhow::Result<bool> {
	let filter = args
		.filter
		.as_deref()
		.map(filter::parse)
		.transpose()
		.context("invalid filter expression")?;

	let options = RunOptions {
		filter,
		fields: args.fields.clone(),
		count_only: args.count,
		parse_loop: args.parse_loop,
		jobs: args.jobs.unwrap_or_else(default_jobs),
	};
	let limit = Limiter::new(args.limit);
	let output = OutputSink::stdout();

	let mut all_ok = true;
	for path in &args.files {
		if limit.finished() {
			break;
		}
		if let Err(e) = query_file(path, &options, &limit, &output) {
			log::error!("{}: {e:#}", path.display());
			all_ok = false;
		}
	}
	output.flush();

	if args.count {
		println!("{}", output.total_count());
	}
	Ok(all_ok)
}

fn query_file(
	path: &Path,
	options: &RunOptions,
	limit: &Limiter,
	output: &OutputSink,
) -> anyhow::Result<()> {
	let file = std::fs::File::open(path).context("failed to open")?;
	// Safety: avq only reads the mapping; concurrent truncation of an input
	// file is outside our contract
	let mapped = unsafe { memmap2::Mmap::map(&file) }.context("failed to mmap")?;
	log::debug!("{}: {} bytes mapped", path.display(), mapped.len());
	process_file(&mapped, options, limit, output)?;
	Ok(())
}

fn default_jobs() -> usize {
	std::thread::available_parallelism()
		.map(std::num::NonZeroUsize::get)
		.unwrap_or(1)
}
