//! Recursive schema walkers
//!
//! The reference implementation of record decoding: dispatch on the node
//! variant at every step. The compiled walker replaces this on the hot path
//! but falls back to these functions for array, map and complex union branch
//! interiors, where the work is variable-length anyway.

use super::{buffer::ByteBuffer, DecodeError};
use crate::{
	dump::Dumper,
	filter::PredicateSet,
	schema::{NodeId, NodeType, Schema, SchemaNode},
};

use std::ops::Range;

/// Walk one value, feeding targeted primitive values into the predicate
/// engine and skipping everything else
pub(super) fn decode_value(
	schema: &Schema,
	node: &SchemaNode,
	buffer: &mut ByteBuffer<'_>,
	predicates: Option<&PredicateSet>,
) -> Result<(), DecodeError> {
	match &node.ty {
		NodeType::Record(record) => {
			for &field in &record.fields {
				decode_value(schema, schema.node(field), buffer, predicates)?;
			}
		}
		NodeType::Ref(target) => {
			decode_value(schema, schema.node(*target), buffer, predicates)?
		}
		NodeType::Union(union) => {
			let tag = buffer.read_zigzag()?;
			let branch = usize::try_from(tag)
				.ok()
				.and_then(|tag| union.variants.get(tag))
				.copied()
				.ok_or(DecodeError::BadUnionTag(tag))?;
			decode_value(schema, schema.node(branch), buffer, predicates)?;
			if let Some(predicates) = predicates {
				let range = predicates.equal_range(node.id);
				if !range.is_empty() {
					let branch_is_null =
						matches!(schema.resolve(branch).ty, NodeType::Null);
					predicates.set_is_null(range, branch_is_null);
				}
			}
		}
		NodeType::Enum(_) | NodeType::Int | NodeType::Long => {
			skip_or_apply_long(buffer, predicates, node.id)?
		}
		NodeType::Array(array) => {
			let push = predicates
				.map(|predicates| predicates.equal_range(node.id))
				.unwrap_or(0..0);
			decode_array(schema, buffer, array.items, predicates, push)?;
		}
		NodeType::Map(map) => decode_map(schema, buffer, map.values, predicates)?,
		NodeType::String => skip_or_apply_str(buffer, predicates, node.id)?,
		NodeType::Float => match target_range(predicates, node.id) {
			Some((predicates, range)) => {
				let value = buffer.read_float()?;
				predicates.apply_double(range, f64::from(value));
			}
			None => buffer.skip(4)?,
		},
		NodeType::Double => match target_range(predicates, node.id) {
			Some((predicates, range)) => {
				let value = buffer.read_double()?;
				predicates.apply_double(range, value);
			}
			None => buffer.skip(8)?,
		},
		NodeType::Boolean => match target_range(predicates, node.id) {
			Some((predicates, range)) => {
				let value = buffer.read_bool()?;
				predicates.apply_bool(range, value);
			}
			None => buffer.skip(1)?,
		},
		NodeType::Null => {}
	}
	Ok(())
}

/// The predicate range for a node, when there is one to apply
fn target_range<'f>(
	predicates: Option<&'f PredicateSet>,
	node: NodeId,
) -> Option<(&'f PredicateSet, Range<usize>)> {
	let predicates = predicates?;
	let range = predicates.equal_range(node);
	(!range.is_empty()).then_some((predicates, range))
}

fn skip_or_apply_long(
	buffer: &mut ByteBuffer<'_>,
	predicates: Option<&PredicateSet>,
	node: NodeId,
) -> Result<(), DecodeError> {
	match target_range(predicates, node) {
		Some((predicates, range)) => {
			let value = buffer.read_zigzag()?;
			predicates.apply_long(range, value);
			Ok(())
		}
		None => buffer.skip_varint(),
	}
}

fn skip_or_apply_str(
	buffer: &mut ByteBuffer<'_>,
	predicates: Option<&PredicateSet>,
	node: NodeId,
) -> Result<(), DecodeError> {
	match target_range(predicates, node) {
		Some((predicates, range)) => {
			let value = buffer.read_str()?;
			predicates.apply_str(range, value);
			Ok(())
		}
		None => buffer.skip_str(),
	}
}

/// Walk the block sequence of an array
///
/// `push` is the predicate range keyed on the array node itself; after each
/// element those leaves aggregate their per-element verdicts under "exists"
/// semantics. Blocks with a negative count carry a byte count; when nothing
/// inside the array is targeted, that hint skips the whole block in one
/// jump.
pub(super) fn decode_array(
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	items: NodeId,
	predicates: Option<&PredicateSet>,
	push: Range<usize>,
) -> Result<(), DecodeError> {
	let item_node = schema.node(items);
	loop {
		let mut count = buffer.read_zigzag()?;
		if count == 0 {
			return Ok(());
		}
		if count < 0 {
			let byte_count = buffer.read_len()?;
			if push.is_empty() {
				buffer.skip(byte_count)?;
				continue;
			}
			count = count
				.checked_neg()
				.ok_or(DecodeError::InvalidLength(count))?;
		}
		for _ in 0..count {
			decode_value(schema, item_node, buffer, predicates)?;
			if let Some(predicates) = predicates {
				if !push.is_empty() {
					predicates.push_array_state(push.clone());
				}
			}
		}
	}
}

/// Walk the block sequence of a map, skipping every key
///
/// Filter paths cannot reach inside maps, so negative-count blocks always
/// take the byte-count shortcut.
pub(super) fn decode_map(
	schema: &Schema,
	buffer: &mut ByteBuffer<'_>,
	values: NodeId,
	predicates: Option<&PredicateSet>,
) -> Result<(), DecodeError> {
	let value_node = schema.node(values);
	loop {
		let count = buffer.read_zigzag()?;
		if count == 0 {
			return Ok(());
		}
		if count < 0 {
			let byte_count = buffer.read_len()?;
			buffer.skip(byte_count)?;
			continue;
		}
		for _ in 0..count {
			buffer.skip_str()?;
			decode_value(schema, value_node, buffer, predicates)?;
		}
	}
}

/// Walk one value, handing every visited position to a dumper
pub(super) fn dump_value<D: Dumper>(
	schema: &Schema,
	node: &SchemaNode,
	buffer: &mut ByteBuffer<'_>,
	dumper: &mut D,
) -> Result<(), DecodeError> {
	match &node.ty {
		NodeType::Record(record) => {
			dumper.record_begin(node);
			for &field in &record.fields {
				dump_value(schema, schema.node(field), buffer, dumper)?;
			}
			dumper.record_end(node);
		}
		NodeType::Ref(target) => dump_value(schema, schema.node(*target), buffer, dumper)?,
		NodeType::Union(union) => {
			let tag = buffer.read_zigzag()?;
			let branch = usize::try_from(tag)
				.ok()
				.and_then(|tag| union.variants.get(tag))
				.copied()
				.ok_or(DecodeError::BadUnionTag(tag))?;
			let branch_node = schema.node(branch);
			dumper.union_branch(tag as usize, branch_node);
			dump_value(schema, branch_node, buffer, dumper)?;
		}
		NodeType::Enum(enum_) => {
			let index = buffer.read_zigzag()?;
			let symbol = usize::try_from(index)
				.ok()
				.and_then(|index| enum_.symbols.get(index))
				.ok_or(DecodeError::BadEnumIndex(index))?;
			dumper.enum_symbol(node, symbol);
		}
		NodeType::Array(array) => {
			let item_node = schema.node(array.items);
			dumper.array_begin(node);
			loop {
				let mut count = buffer.read_zigzag()?;
				if count == 0 {
					break;
				}
				if count < 0 {
					// dumping has to visit the elements, the byte count
					// hint is of no use here
					let _byte_count = buffer.read_len()?;
					count = count
						.checked_neg()
						.ok_or(DecodeError::InvalidLength(count))?;
				}
				for _ in 0..count {
					dump_value(schema, item_node, buffer, dumper)?;
				}
			}
			dumper.array_end(node);
		}
		NodeType::Map(map) => {
			let value_node = schema.resolve(map.values);
			dumper.map_begin(node);
			loop {
				let mut count = buffer.read_zigzag()?;
				if count == 0 {
					break;
				}
				if count < 0 {
					let _byte_count = buffer.read_len()?;
					count = count
						.checked_neg()
						.ok_or(DecodeError::InvalidLength(count))?;
				}
				for _ in 0..count {
					let key = buffer.read_str()?;
					dumper.map_key(key);
					match value_node.ty {
						NodeType::String => dumper.map_value_string(buffer.read_str()?),
						NodeType::Int | NodeType::Long => {
							dumper.map_value_long(buffer.read_zigzag()?)
						}
						_ => return Err(DecodeError::UnsupportedMapValue),
					}
				}
			}
			dumper.map_end(node);
		}
		NodeType::String => {
			let value = buffer.read_str()?;
			dumper.string(node, value);
		}
		NodeType::Int => {
			let value = buffer.read_zigzag()?;
			dumper.int(node, value as i32);
		}
		NodeType::Long => {
			let value = buffer.read_zigzag()?;
			dumper.long(node, value);
		}
		NodeType::Float => dumper.float(node, buffer.read_float()?),
		NodeType::Double => dumper.double(node, buffer.read_double()?),
		NodeType::Boolean => dumper.boolean(node, buffer.read_bool()?),
		NodeType::Null => dumper.null(node),
	}
	Ok(())
}
