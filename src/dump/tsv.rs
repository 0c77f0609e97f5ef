//! TSV projection: selected fields, one TAB-separated row per record

use super::Dumper;
use crate::schema::{NodeId, NodeType, Schema, SchemaError, SchemaNode};

use std::ops::Range;

/// Maps schema nodes to output column indices
///
/// Built once from a comma-separated list of dotted paths; column order
/// follows the input order. A projected union maps all of its branches to
/// the same column, so whichever branch materialises fills the right slot.
pub struct TsvSpec {
	/// `(resolved node, column)` multimap, sorted by node id
	index: Vec<(NodeId, usize)>,
	columns: usize,
}

impl TsvSpec {
	pub fn new(field_list: &str, schema: &Schema) -> Result<Self, SchemaError> {
		let mut index = Vec::new();
		let mut columns = 0;
		for (column, path) in field_list.split(',').enumerate() {
			let id = schema.node_by_path(path.trim())?;
			let node = schema.resolve(id);
			index.push((node.id, column));
			if let NodeType::Union(union) = &node.ty {
				// a materialised null branch leaves the column empty, so
				// only value-carrying branches are mapped
				for &variant in &union.variants {
					let branch = schema.resolve(variant);
					if !matches!(branch.ty, NodeType::Null) {
						index.push((branch.id, column));
					}
				}
			}
			columns = column + 1;
		}
		index.sort_by_key(|&(node, column)| (node, column));
		Ok(Self { index, columns })
	}

	/// Number of output columns
	pub fn columns(&self) -> usize {
		self.columns
	}

	/// Index entries selecting the given node
	pub(crate) fn equal_range(&self, node: NodeId) -> Range<usize> {
		let start = self.index.partition_point(|&(n, _)| n < node);
		let end = self.index.partition_point(|&(n, _)| n <= node);
		start..end
	}

	pub(crate) fn entries(&self, range: Range<usize>) -> &[(NodeId, usize)] {
		&self.index[range]
	}
}

/// One output row in the making
///
/// Fills its cells as the walker (or the compiled TSV loop) delivers values,
/// then joins them with TABs.
pub struct TsvRow<'s> {
	spec: &'s TsvSpec,
	cells: Vec<Option<String>>,
}

impl<'s> TsvRow<'s> {
	pub fn new(spec: &'s TsvSpec) -> Self {
		Self {
			spec,
			cells: vec![None; spec.columns],
		}
	}

	/// Fill every column the given spec entries select
	pub(crate) fn fill(&mut self, range: Range<usize>, value: &str) {
		for &(_, column) in self.spec.entries(range) {
			self.cells[column] = Some(value.to_owned());
		}
	}

	fn add_if_selected(&mut self, node: NodeId, value: impl FnOnce() -> String) {
		let range = self.spec.equal_range(node);
		if !range.is_empty() {
			let value = value();
			self.fill(range, &value);
		}
	}

	/// Join the cells into a TAB-separated line and hand it to `emit`
	///
	/// Unfilled cells (e.g. a union branch that did not materialise) come
	/// out empty.
	pub fn finish(&mut self, emit: &mut dyn FnMut(&str)) {
		let mut line = String::new();
		for (i, cell) in self.cells.iter().enumerate() {
			if i > 0 {
				line.push('\t');
			}
			if let Some(value) = cell {
				line.push_str(value);
			}
		}
		line.push('\n');
		emit(&line);
	}
}

impl Dumper for TsvRow<'_> {
	fn enum_symbol(&mut self, node: &SchemaNode, symbol: &str) {
		self.add_if_selected(node.id, || symbol.to_owned());
	}

	fn string(&mut self, node: &SchemaNode, value: &[u8]) {
		self.add_if_selected(node.id, || String::from_utf8_lossy(value).into_owned());
	}

	fn int(&mut self, node: &SchemaNode, value: i32) {
		self.add_if_selected(node.id, || value.to_string());
	}

	fn long(&mut self, node: &SchemaNode, value: i64) {
		self.add_if_selected(node.id, || value.to_string());
	}

	fn float(&mut self, node: &SchemaNode, value: f32) {
		self.add_if_selected(node.id, || value.to_string());
	}

	fn double(&mut self, node: &SchemaNode, value: f64) {
		self.add_if_selected(node.id, || value.to_string());
	}

	fn boolean(&mut self, node: &SchemaNode, value: bool) {
		self.add_if_selected(node.id, || if value { "true" } else { "false" }.to_owned());
	}

	fn null(&mut self, node: &SchemaNode) {
		self.add_if_selected(node.id, || "null".to_owned());
	}
}
