//! Flat instruction streams replacing recursive schema walking
//!
//! The recursive walker dispatches on the node variant at every schema
//! position of every record. For blocks with thousands of records that
//! dispatch dominates, so the schema is compiled once into a flat array of
//! small instructions: each one consumes the stream bytes of exactly one
//! schema position and returns the offset of the next instruction to run.
//! The hot loop is then just `i += step(&instructions[i])`.
//!
//! Layout: a record contributes its fields in declaration order, each with a
//! next-offset of 1. A union contributes one dispatch instruction followed
//! by one slot per branch; the dispatch reads the tag and returns
//! `tag + base` to land on the branch's slot, and each branch's next-offset
//! is sized to leave the union entirely. Branches that need more than one
//! slot (records, nested unions) compile to a single instruction that runs
//! the recursive walker over the branch subtree, which keeps the dispatch
//! arithmetic valid for every schema. Arrays and maps are variable-length
//! and keep the recursive walker for their interior too.

use super::{buffer::ByteBuffer, walker, DecodeError};
use crate::{
	dump::tsv::{TsvRow, TsvSpec},
	filter::PredicateSet,
	schema::{NodeId, NodeType, Schema, SchemaNode},
};

use std::ops::Range;

/// One step of the filtering decode loop
pub(super) enum Instr {
	SkipVarint {
		ret: usize,
	},
	SkipString {
		ret: usize,
	},
	SkipBytes {
		n: usize,
		ret: usize,
	},
	ApplyLong {
		predicates: Range<usize>,
		ret: usize,
	},
	ApplyString {
		predicates: Range<usize>,
		ret: usize,
	},
	ApplyFloat {
		predicates: Range<usize>,
		ret: usize,
	},
	ApplyDouble {
		predicates: Range<usize>,
		ret: usize,
	},
	ApplyBool {
		predicates: Range<usize>,
		ret: usize,
	},
	/// Union dispatch: reads the tag, records nullness on targeting leaves,
	/// and jumps into the branch table
	Dispatch {
		predicates: Range<usize>,
		null_variant: Option<i64>,
		branches: usize,
		ret: usize,
	},
	SkipArray {
		items: NodeId,
		ret: usize,
	},
	ApplyArray {
		items: NodeId,
		push: Range<usize>,
		ret: usize,
	},
	SkipMap {
		values: NodeId,
		ret: usize,
	},
	/// Complex union branch: recursively walk the whole branch subtree
	Subtree {
		node: NodeId,
		ret: usize,
	},
}

pub(super) fn compile_decode(schema: &Schema, predicates: Option<&PredicateSet>) -> Vec<Instr> {
	let mut instructions = Vec::new();
	emit(schema, predicates, schema.root(), 1, &mut instructions);
	instructions
}

fn pred_range(predicates: Option<&PredicateSet>, node: NodeId) -> Range<usize> {
	predicates
		.map(|predicates| predicates.equal_range(node))
		.unwrap_or(0..0)
}

fn emit(
	schema: &Schema,
	predicates: Option<&PredicateSet>,
	node: &SchemaNode,
	ret: usize,
	out: &mut Vec<Instr>,
) {
	match &node.ty {
		NodeType::Ref(target) => emit(schema, predicates, schema.node(*target), ret, out),
		NodeType::Record(record) => {
			for &field in &record.fields {
				emit(schema, predicates, schema.node(field), 1, out);
			}
		}
		NodeType::Union(union) => {
			let branches = union.variants.len();
			out.push(Instr::Dispatch {
				predicates: pred_range(predicates, node.id),
				null_variant: union.null_variant.map(|index| index as i64),
				branches,
				ret,
			});
			for (i, &variant) in union.variants.iter().enumerate() {
				// after branch i runs, control leaves the union
				let branch_ret = branches + ret - 1 - i;
				let branch = schema.resolve(variant);
				match branch.ty {
					NodeType::Record(_) | NodeType::Union(_) => out.push(Instr::Subtree {
						node: branch.id,
						ret: branch_ret,
					}),
					_ => emit(schema, predicates, branch, branch_ret, out),
				}
			}
		}
		NodeType::Array(array) => {
			let push = pred_range(predicates, node.id);
			out.push(if push.is_empty() {
				Instr::SkipArray {
					items: array.items,
					ret,
				}
			} else {
				Instr::ApplyArray {
					items: array.items,
					push,
					ret,
				}
			});
		}
		NodeType::Map(map) => out.push(Instr::SkipMap {
			values: map.values,
			ret,
		}),
		NodeType::Enum(_) | NodeType::Int | NodeType::Long => {
			let range = pred_range(predicates, node.id);
			out.push(if range.is_empty() {
				Instr::SkipVarint { ret }
			} else {
				Instr::ApplyLong {
					predicates: range,
					ret,
				}
			});
		}
		NodeType::String => {
			let range = pred_range(predicates, node.id);
			out.push(if range.is_empty() {
				Instr::SkipString { ret }
			} else {
				Instr::ApplyString {
					predicates: range,
					ret,
				}
			});
		}
		NodeType::Float => {
			let range = pred_range(predicates, node.id);
			out.push(if range.is_empty() {
				Instr::SkipBytes { n: 4, ret }
			} else {
				Instr::ApplyFloat {
					predicates: range,
					ret,
				}
			});
		}
		NodeType::Double => {
			let range = pred_range(predicates, node.id);
			out.push(if range.is_empty() {
				Instr::SkipBytes { n: 8, ret }
			} else {
				Instr::ApplyDouble {
					predicates: range,
					ret,
				}
			});
		}
		NodeType::Boolean => {
			let range = pred_range(predicates, node.id);
			out.push(if range.is_empty() {
				Instr::SkipBytes { n: 1, ret }
			} else {
				Instr::ApplyBool {
					predicates: range,
					ret,
				}
			});
		}
		NodeType::Null => out.push(Instr::SkipBytes { n: 0, ret }),
	}
}

pub(super) fn run_decode_loop(
	instructions: &[Instr],
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	predicates: Option<&PredicateSet>,
) -> Result<(), DecodeError> {
	let mut i = 0;
	while i < instructions.len() {
		i += step(&instructions[i], schema, buffer, predicates)?;
	}
	Ok(())
}

fn step(
	instruction: &Instr,
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	predicates: Option<&PredicateSet>,
) -> Result<usize, DecodeError> {
	Ok(match instruction {
		Instr::SkipVarint { ret } => {
			buffer.skip_varint()?;
			*ret
		}
		Instr::SkipString { ret } => {
			buffer.skip_str()?;
			*ret
		}
		Instr::SkipBytes { n, ret } => {
			buffer.skip(*n)?;
			*ret
		}
		Instr::ApplyLong {
			predicates: range,
			ret,
		} => {
			let value = buffer.read_zigzag()?;
			if let Some(predicates) = predicates {
				predicates.apply_long(range.clone(), value);
			}
			*ret
		}
		Instr::ApplyString {
			predicates: range,
			ret,
		} => {
			let value = buffer.read_str()?;
			if let Some(predicates) = predicates {
				predicates.apply_str(range.clone(), value);
			}
			*ret
		}
		Instr::ApplyFloat {
			predicates: range,
			ret,
		} => {
			let value = buffer.read_float()?;
			if let Some(predicates) = predicates {
				predicates.apply_double(range.clone(), f64::from(value));
			}
			*ret
		}
		Instr::ApplyDouble {
			predicates: range,
			ret,
		} => {
			let value = buffer.read_double()?;
			if let Some(predicates) = predicates {
				predicates.apply_double(range.clone(), value);
			}
			*ret
		}
		Instr::ApplyBool {
			predicates: range,
			ret,
		} => {
			let value = buffer.read_bool()?;
			if let Some(predicates) = predicates {
				predicates.apply_bool(range.clone(), value);
			}
			*ret
		}
		Instr::Dispatch {
			predicates: range,
			null_variant,
			branches,
			ret,
		} => {
			let tag = buffer.read_zigzag()?;
			if tag < 0 || tag >= *branches as i64 {
				return Err(DecodeError::BadUnionTag(tag));
			}
			if !range.is_empty() {
				if let Some(predicates) = predicates {
					predicates.set_is_null(range.clone(), Some(tag) == *null_variant);
				}
			}
			tag as usize + ret
		}
		Instr::SkipArray { items, ret } => {
			walker::decode_array(schema, buffer, *items, predicates, 0..0)?;
			*ret
		}
		Instr::ApplyArray { items, push, ret } => {
			walker::decode_array(schema, buffer, *items, predicates, push.clone())?;
			*ret
		}
		Instr::SkipMap { values, ret } => {
			walker::decode_map(schema, buffer, *values, predicates)?;
			*ret
		}
		Instr::Subtree { node, ret } => {
			walker::decode_value(schema, schema.node(*node), buffer, predicates)?;
			*ret
		}
	})
}

/// One step of the TSV projection loop
pub(super) enum TsvInstr {
	SkipVarint {
		ret: usize,
	},
	SkipString {
		ret: usize,
	},
	SkipBytes {
		n: usize,
		ret: usize,
	},
	SkipArray {
		items: NodeId,
		ret: usize,
	},
	SkipMap {
		values: NodeId,
		ret: usize,
	},
	EmitLong {
		columns: Range<usize>,
		ret: usize,
	},
	EmitString {
		columns: Range<usize>,
		ret: usize,
	},
	EmitFloat {
		columns: Range<usize>,
		ret: usize,
	},
	EmitDouble {
		columns: Range<usize>,
		ret: usize,
	},
	EmitBool {
		columns: Range<usize>,
		ret: usize,
	},
	/// Projected enums emit the symbol, so the table travels with the
	/// instruction
	EmitEnum {
		symbols: Vec<String>,
		columns: Range<usize>,
		ret: usize,
	},
	/// A projected null branch renders as the literal `null`
	EmitNull {
		columns: Range<usize>,
		ret: usize,
	},
	/// Union dispatch; projection columns are carried by the branches
	Jump {
		branches: usize,
		ret: usize,
	},
	/// Complex union branch: recursively dump the whole branch subtree
	Subtree {
		node: NodeId,
		ret: usize,
	},
}

pub(super) fn compile_tsv(schema: &Schema, spec: &TsvSpec) -> Vec<TsvInstr> {
	let mut instructions = Vec::new();
	emit_tsv(schema, spec, schema.root(), 1, &mut instructions);
	instructions
}

fn emit_tsv(schema: &Schema, spec: &TsvSpec, node: &SchemaNode, ret: usize, out: &mut Vec<TsvInstr>) {
	match &node.ty {
		NodeType::Ref(target) => emit_tsv(schema, spec, schema.node(*target), ret, out),
		NodeType::Record(record) => {
			for &field in &record.fields {
				emit_tsv(schema, spec, schema.node(field), 1, out);
			}
		}
		NodeType::Union(union) => {
			let branches = union.variants.len();
			out.push(TsvInstr::Jump { branches, ret });
			for (i, &variant) in union.variants.iter().enumerate() {
				let branch_ret = branches + ret - 1 - i;
				let branch = schema.resolve(variant);
				match branch.ty {
					NodeType::Record(_) | NodeType::Union(_) => out.push(TsvInstr::Subtree {
						node: branch.id,
						ret: branch_ret,
					}),
					_ => emit_tsv(schema, spec, branch, branch_ret, out),
				}
			}
		}
		NodeType::Array(array) => out.push(TsvInstr::SkipArray {
			items: array.items,
			ret,
		}),
		NodeType::Map(map) => out.push(TsvInstr::SkipMap {
			values: map.values,
			ret,
		}),
		NodeType::Enum(enum_) => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipVarint { ret }
			} else {
				TsvInstr::EmitEnum {
					symbols: enum_.symbols.clone(),
					columns,
					ret,
				}
			});
		}
		NodeType::Int | NodeType::Long => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipVarint { ret }
			} else {
				TsvInstr::EmitLong { columns, ret }
			});
		}
		NodeType::String => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipString { ret }
			} else {
				TsvInstr::EmitString { columns, ret }
			});
		}
		NodeType::Float => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipBytes { n: 4, ret }
			} else {
				TsvInstr::EmitFloat { columns, ret }
			});
		}
		NodeType::Double => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipBytes { n: 8, ret }
			} else {
				TsvInstr::EmitDouble { columns, ret }
			});
		}
		NodeType::Boolean => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipBytes { n: 1, ret }
			} else {
				TsvInstr::EmitBool { columns, ret }
			});
		}
		NodeType::Null => {
			let columns = spec.equal_range(node.id);
			out.push(if columns.is_empty() {
				TsvInstr::SkipBytes { n: 0, ret }
			} else {
				TsvInstr::EmitNull { columns, ret }
			});
		}
	}
}

pub(super) fn run_tsv_loop(
	instructions: &[TsvInstr],
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	row: &mut TsvRow<'_>,
) -> Result<(), DecodeError> {
	let mut i = 0;
	while i < instructions.len() {
		i += step_tsv(&instructions[i], schema, buffer, row)?;
	}
	Ok(())
}

fn step_tsv(
	instruction: &TsvInstr,
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	row: &mut TsvRow<'_>,
) -> Result<usize, DecodeError> {
	Ok(match instruction {
		TsvInstr::SkipVarint { ret } => {
			buffer.skip_varint()?;
			*ret
		}
		TsvInstr::SkipString { ret } => {
			buffer.skip_str()?;
			*ret
		}
		TsvInstr::SkipBytes { n, ret } => {
			buffer.skip(*n)?;
			*ret
		}
		TsvInstr::SkipArray { items, ret } => {
			walker::decode_array(schema, buffer, *items, None, 0..0)?;
			*ret
		}
		TsvInstr::SkipMap { values, ret } => {
			walker::decode_map(schema, buffer, *values, None)?;
			*ret
		}
		TsvInstr::EmitLong { columns, ret } => {
			let value = buffer.read_zigzag()?;
			row.fill(columns.clone(), &value.to_string());
			*ret
		}
		TsvInstr::EmitString { columns, ret } => {
			let value = buffer.read_str()?;
			row.fill(columns.clone(), &String::from_utf8_lossy(value));
			*ret
		}
		TsvInstr::EmitFloat { columns, ret } => {
			let value = buffer.read_float()?;
			row.fill(columns.clone(), &value.to_string());
			*ret
		}
		TsvInstr::EmitDouble { columns, ret } => {
			let value = buffer.read_double()?;
			row.fill(columns.clone(), &value.to_string());
			*ret
		}
		TsvInstr::EmitBool { columns, ret } => {
			let value = buffer.read_bool()?;
			row.fill(columns.clone(), if value { "true" } else { "false" });
			*ret
		}
		TsvInstr::EmitEnum {
			symbols,
			columns,
			ret,
		} => {
			let index = buffer.read_zigzag()?;
			let symbol = usize::try_from(index)
				.ok()
				.and_then(|index| symbols.get(index))
				.ok_or(DecodeError::BadEnumIndex(index))?;
			row.fill(columns.clone(), symbol);
			*ret
		}
		TsvInstr::EmitNull { columns, ret } => {
			row.fill(columns.clone(), "null");
			*ret
		}
		TsvInstr::Jump { branches, ret } => {
			let tag = buffer.read_zigzag()?;
			if tag < 0 || tag >= *branches as i64 {
				return Err(DecodeError::BadUnionTag(tag));
			}
			tag as usize + ret
		}
		TsvInstr::Subtree { node, ret } => {
			walker::dump_value(schema, schema.node(*node), buffer, row)?;
			*ret
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::filter::{parse, Filter};

	use integer_encoding::VarInt;

	const SCHEMA: &str = r#"{
		"type": "record",
		"name": "r",
		"fields": [
			{ "name": "a", "type": "long" },
			{ "name": "u", "type": ["null", "string"] },
			{ "name": "tags", "type": { "type": "array", "items": "string" } },
			{ "name": "attrs", "type": { "type": "map", "values": "string" } },
			{ "name": "kind", "type": { "type": "enum", "name": "Kind", "symbols": ["X", "Y"] } },
			{ "name": "ok", "type": "boolean" }
		]
	}"#;

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

	/// a record with a = 1, u = "x", tags = ["red", "gold"],
	/// attrs = {"k": "v"}, kind = Y, ok = true
	fn record() -> Vec<u8> {
		let mut out = Vec::new();
		out.extend(zz(1));
		out.extend(zz(1)); // union tag 1: string
		out.extend(string("x"));
		out.extend(zz(2)); // array block of 2
		out.extend(string("red"));
		out.extend(string("gold"));
		out.extend(zz(0)); // end of array
		out.extend(zz(1)); // map block of 1
		out.extend(string("k"));
		out.extend(string("v"));
		out.extend(zz(0)); // end of map
		out.extend(zz(1)); // enum index 1
		out.push(1); // true
		out
	}

	#[test]
	fn layout_counts_slots() {
		let schema: Schema = SCHEMA.parse().unwrap();
		let instructions = compile_decode(&schema, None);
		// a, dispatch + 2 branches, tags, attrs, kind, ok
		assert_eq!(instructions.len(), 8);
	}

	#[test]
	fn compiled_decode_matches_recursive_walk() {
		let schema: Schema = SCHEMA.parse().unwrap();
		let filter = Filter::new(
			&parse(r#"a == 1 and u == "x" and tags == "gold" and ok == 1"#).unwrap(),
			&schema,
		)
		.unwrap();
		let data = record();

		let mut recursive = ByteBuffer::new(&data);
		walker::decode_value(
			&schema,
			schema.root(),
			&mut recursive,
			Some(filter.predicates()),
		)
		.unwrap();
		let recursive_pos = recursive.position();
		let recursive_state = filter.predicates().snapshot();
		assert!(filter.passed());
		filter.reset_state();

		let instructions = compile_decode(&schema, Some(filter.predicates()));
		let mut compiled = ByteBuffer::new(&data);
		run_decode_loop(
			&instructions,
			&schema,
			&mut compiled,
			Some(filter.predicates()),
		)
		.unwrap();

		assert_eq!(compiled.position(), recursive_pos);
		assert_eq!(compiled.position(), data.len());
		assert_eq!(filter.predicates().snapshot(), recursive_state);
		assert!(filter.passed());
	}

	#[test]
	fn skip_walk_consumes_whole_record() {
		let schema: Schema = SCHEMA.parse().unwrap();
		let data = record();

		let mut buffer = ByteBuffer::new(&data);
		walker::decode_value(&schema, schema.root(), &mut buffer, None).unwrap();
		assert_eq!(buffer.position(), data.len());

		let instructions = compile_decode(&schema, None);
		let mut buffer = ByteBuffer::new(&data);
		run_decode_loop(&instructions, &schema, &mut buffer, None).unwrap();
		assert_eq!(buffer.position(), data.len());
	}

	#[test]
	fn compiled_tsv_matches_recursive_dump() {
		let schema: Schema = SCHEMA.parse().unwrap();
		let spec = TsvSpec::new("a,u,kind,ok", &schema).unwrap();
		let data = record();

		let mut recursive_line = String::new();
		let mut buffer = ByteBuffer::new(&data);
		let mut row = TsvRow::new(&spec);
		walker::dump_value(&schema, schema.root(), &mut buffer, &mut row).unwrap();
		row.finish(&mut |s| recursive_line.push_str(s));

		let instructions = compile_tsv(&schema, &spec);
		let mut compiled_line = String::new();
		let mut buffer = ByteBuffer::new(&data);
		let mut row = TsvRow::new(&spec);
		run_tsv_loop(&instructions, &schema, &mut buffer, &mut row).unwrap();
		assert_eq!(buffer.position(), data.len());
		row.finish(&mut |s| compiled_line.push_str(s));

		assert_eq!(compiled_line, recursive_line);
		assert_eq!(compiled_line, "1\tx\tY\ttrue\n");
	}

	#[test]
	fn negative_block_counts_use_the_byte_count_hint() {
		let schema: Schema = SCHEMA.parse().unwrap();
		let mut data = Vec::new();
		data.extend(zz(1));
		data.extend(zz(0)); // union tag 0: null
		let items: Vec<u8> = [string("red"), string("blue")].concat();
		data.extend(zz(-2)); // two items, with byte count
		data.extend(zz(items.len() as i64));
		data.extend(items);
		data.extend(zz(0));
		data.extend(zz(0)); // empty map
		data.extend(zz(0)); // enum index 0
		data.push(0); // false

		let mut buffer = ByteBuffer::new(&data);
		walker::decode_value(&schema, schema.root(), &mut buffer, None).unwrap();
		assert_eq!(buffer.position(), data.len());
	}
}
