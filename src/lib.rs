//! Query engine for [Avro object container files](https://avro.apache.org/docs/current/specification/#object-container-files)
//!
//! `avq` reads avro files, applies predicate filters to the records they
//! contain, and emits the matching records as TSV projections, as an indented
//! textual dump, or as a count. Records are never materialised: the decoder
//! walks the raw block bytes in lockstep with the schema, feeding only the
//! values the filter or the projection actually needs.
//!
//! The crate is primarily a CLI tool (see the `avq` binary), but the pieces
//! compose as a library too:
//!
//! ```
//! let schema: avq::Schema = r#"
//! {
//! 	"type": "record",
//! 	"name": "Event",
//! 	"fields": [
//! 		{ "name": "id", "type": "long" },
//! 		{ "name": "tags", "type": { "type": "array", "items": "string" } }
//! 	]
//! }
//! "#
//! .parse()
//! .expect("failed to parse schema");
//!
//! // Field paths resolve to stable pre-order node ids
//! let id = schema.node_by_path("tags").unwrap();
//! assert_eq!(id.index(), 2);
//! ```
//!
//! Decoding a block is driven by [`decode::BlockDecoder`]: it walks every
//! record once to evaluate the filter (either recursively or through a
//! precompiled flat instruction stream), then re-walks the records that pass
//! to produce output. See the module documentation of [`decode`] for details.

pub mod container;
pub mod decode;
pub mod dump;
pub mod filter;
pub mod limit;
pub mod schema;
pub mod worker;

pub use {limit::Limiter, schema::Schema};
