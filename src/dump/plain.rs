//! Structured textual dump: the whole record, indented, one primitive per
//! line annotated with its field name

use super::Dumper;
use crate::schema::SchemaNode;

use std::fmt::Write;

pub struct PlainDumper {
	out: String,
	indent: usize,
}

impl PlainDumper {
	pub fn new() -> Self {
		Self {
			out: String::new(),
			indent: 0,
		}
	}

	fn open(&mut self, node: &SchemaNode, bracket: char) {
		self.label(node);
		self.out.push(bracket);
		self.out.push('\n');
		self.indent += 1;
	}

	fn close(&mut self, bracket: char) {
		self.indent -= 1;
		self.pad();
		self.out.push(bracket);
		self.out.push('\n');
	}

	fn pad(&mut self) {
		for _ in 0..self.indent {
			self.out.push_str("  ");
		}
	}

	fn label(&mut self, node: &SchemaNode) {
		self.pad();
		if !node.name.is_empty() {
			self.out.push_str(&node.name);
			self.out.push_str(": ");
		}
	}

	fn value(&mut self, node: &SchemaNode, value: std::fmt::Arguments<'_>) {
		self.label(node);
		// writing to a String cannot fail
		let _ = self.out.write_fmt(value);
		self.out.push('\n');
	}

	/// Hand the finished record text to `emit`
	pub fn finish(&mut self, emit: &mut dyn FnMut(&str)) {
		emit(&self.out);
		self.out.clear();
	}
}

impl Dumper for PlainDumper {
	fn record_begin(&mut self, node: &SchemaNode) {
		self.open(node, '{');
	}

	fn record_end(&mut self, _node: &SchemaNode) {
		self.close('}');
	}

	fn array_begin(&mut self, node: &SchemaNode) {
		self.open(node, '[');
	}

	fn array_end(&mut self, _node: &SchemaNode) {
		self.close(']');
	}

	fn map_begin(&mut self, node: &SchemaNode) {
		self.open(node, '{');
	}

	fn map_end(&mut self, _node: &SchemaNode) {
		self.close('}');
	}

	fn map_key(&mut self, key: &[u8]) {
		self.pad();
		self.out.push_str(&String::from_utf8_lossy(key));
		self.out.push_str(": ");
	}

	fn map_value_string(&mut self, value: &[u8]) {
		let _ = writeln!(self.out, "\"{}\"", String::from_utf8_lossy(value));
	}

	fn map_value_long(&mut self, value: i64) {
		let _ = writeln!(self.out, "{value}");
	}

	fn enum_symbol(&mut self, node: &SchemaNode, symbol: &str) {
		self.value(node, format_args!("{symbol}"));
	}

	fn string(&mut self, node: &SchemaNode, value: &[u8]) {
		self.value(node, format_args!("\"{}\"", String::from_utf8_lossy(value)));
	}

	fn int(&mut self, node: &SchemaNode, value: i32) {
		self.value(node, format_args!("{value}"));
	}

	fn long(&mut self, node: &SchemaNode, value: i64) {
		self.value(node, format_args!("{value}"));
	}

	fn float(&mut self, node: &SchemaNode, value: f32) {
		self.value(node, format_args!("{value}"));
	}

	fn double(&mut self, node: &SchemaNode, value: f64) {
		self.value(node, format_args!("{value}"));
	}

	fn boolean(&mut self, node: &SchemaNode, value: bool) {
		self.value(node, format_args!("{value}"));
	}

	fn null(&mut self, node: &SchemaNode) {
		self.value(node, format_args!("null"));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		decode::{Block, BlockDecoder},
		limit::Limiter,
		schema::Schema,
	};

	#[test]
	fn records_render_as_indented_trees() {
		let schema: Schema = r#"{
			"type": "record",
			"name": "point",
			"fields": [
				{ "name": "x", "type": "long" },
				{ "name": "label", "type": "string" }
			]
		}"#
		.parse()
		.unwrap();

		// x = 3, label = "hi"
		let data = [0x06, 0x04, b'h', b'i'];
		let limit = Limiter::new(None);
		let mut out = String::new();
		{
			let mut decoder = BlockDecoder::new(&schema, &limit);
			decoder.set_dump_sink(Box::new(|s| out.push_str(s)));
			decoder
				.decode_and_dump_block(&Block {
					data: &data,
					object_count: 1,
				})
				.unwrap();
		}
		assert_eq!(out, "point: {\n  x: 3\n  label: \"hi\"\n}\n");
	}
}
