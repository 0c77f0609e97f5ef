//! Turns the JSON schema document into the node arena

use super::{Array, Enum, Map, NodeId, NodeType, Record, Schema, SchemaError, SchemaNode, Union};

use std::collections::HashMap;

/// Raw serde-level representation of a schema document
///
/// A schema is either a bare type name, a union (JSON array), or an object
/// with a `type` attribute.
#[derive(serde_derive::Deserialize)]
#[serde(untagged)]
enum RawSchema<'a> {
	Name(#[serde(borrow)] &'a str),
	Union(#[serde(borrow)] Vec<RawSchema<'a>>),
	Object(#[serde(borrow)] RawObject<'a>),
}

#[derive(serde_derive::Deserialize)]
struct RawObject<'a> {
	#[serde(rename = "type", borrow)]
	ty: &'a str,
	#[serde(borrow, default)]
	name: Option<&'a str>,
	#[serde(borrow, default)]
	namespace: Option<&'a str>,
	#[serde(borrow, default)]
	fields: Option<Vec<RawField<'a>>>,
	#[serde(default)]
	symbols: Option<Vec<String>>,
	#[serde(borrow, default)]
	items: Option<Box<RawSchema<'a>>>,
	#[serde(borrow, default)]
	values: Option<Box<RawSchema<'a>>>,
}

#[derive(serde_derive::Deserialize)]
struct RawField<'a> {
	name: String,
	#[serde(rename = "type", borrow)]
	ty: RawSchema<'a>,
}

pub(super) fn parse(s: &str) -> Result<Schema, SchemaError> {
	let raw: RawSchema<'_> = serde_json::from_str(s)?;
	let mut parser = Parser {
		nodes: Vec::new(),
		named: HashMap::new(),
	};
	parser.node(&raw, String::new(), None)?;
	check_for_cycles(&parser.nodes)?;
	Ok(Schema::from_nodes(parser.nodes))
}

struct Parser {
	nodes: Vec<SchemaNode>,
	/// Named type definitions seen so far, by qualified and short name
	named: HashMap<String, NodeId>,
}

impl Parser {
	/// Reserve the pre-order slot for a node before its children are parsed
	fn push_placeholder(&mut self, name: String) -> NodeId {
		let id = NodeId::new(self.nodes.len());
		self.nodes.push(SchemaNode {
			id,
			name,
			ty: NodeType::Null,
		});
		id
	}

	fn set(&mut self, id: NodeId, ty: NodeType) {
		self.nodes[id.index()].ty = ty;
	}

	fn node(
		&mut self,
		raw: &RawSchema<'_>,
		name: String,
		namespace: Option<&str>,
	) -> Result<NodeId, SchemaError> {
		match raw {
			RawSchema::Name(type_name) => self.leaf_or_reference(type_name, name, namespace),
			RawSchema::Union(branches) => {
				let id = self.push_placeholder(name.clone());
				let mut variants = Vec::with_capacity(branches.len());
				for branch in branches {
					// branches inherit the field name, it is what dumpers
					// annotate the materialised value with
					variants.push(self.node(branch, name.clone(), namespace)?);
				}
				let null_variant = variants
					.iter()
					.position(|&v| matches!(self.nodes[v.index()].ty, NodeType::Null));
				self.set(id, NodeType::Union(Union {
					variants,
					null_variant,
				}));
				Ok(id)
			}
			RawSchema::Object(object) => self.object(object, name, namespace),
		}
	}

	fn object(
		&mut self,
		object: &RawObject<'_>,
		name: String,
		namespace: Option<&str>,
	) -> Result<NodeId, SchemaError> {
		match object.ty {
			"record" => {
				let type_name = object.name.ok_or(SchemaError::MissingAttribute {
					attribute: "name",
					type_name: "record",
				})?;
				let namespace = object.namespace.or(namespace);
				let id = self.push_placeholder(if name.is_empty() {
					type_name.to_owned()
				} else {
					name
				});
				// Registered before the fields are parsed so that nested
				// references to the record name resolve
				self.register(type_name, namespace, id);
				let raw_fields = object.fields.as_ref().ok_or(SchemaError::MissingAttribute {
					attribute: "fields",
					type_name: "record",
				})?;
				let mut fields = Vec::with_capacity(raw_fields.len());
				for field in raw_fields {
					fields.push(self.node(&field.ty, field.name.clone(), namespace)?);
				}
				self.set(id, NodeType::Record(Record { fields }));
				Ok(id)
			}
			"enum" => {
				let type_name = object.name.ok_or(SchemaError::MissingAttribute {
					attribute: "name",
					type_name: "enum",
				})?;
				let symbols = object.symbols.clone().ok_or(SchemaError::MissingAttribute {
					attribute: "symbols",
					type_name: "enum",
				})?;
				let id = self.push_placeholder(if name.is_empty() {
					type_name.to_owned()
				} else {
					name
				});
				self.register(type_name, object.namespace.or(namespace), id);
				self.set(id, NodeType::Enum(Enum { symbols }));
				Ok(id)
			}
			"array" => {
				let raw_items = object.items.as_deref().ok_or(SchemaError::MissingAttribute {
					attribute: "items",
					type_name: "array",
				})?;
				let id = self.push_placeholder(name);
				let items = self.node(raw_items, String::new(), namespace)?;
				self.set(id, NodeType::Array(Array { items }));
				Ok(id)
			}
			"map" => {
				let raw_values = object.values.as_deref().ok_or(SchemaError::MissingAttribute {
					attribute: "values",
					type_name: "map",
				})?;
				let id = self.push_placeholder(name);
				let values = self.node(raw_values, String::new(), namespace)?;
				self.set(id, NodeType::Map(Map { values }));
				Ok(id)
			}
			// `{"type": "string"}` style wrappers and named references
			other => self.leaf_or_reference(other, name, namespace),
		}
	}

	fn leaf_or_reference(
		&mut self,
		type_name: &str,
		name: String,
		namespace: Option<&str>,
	) -> Result<NodeId, SchemaError> {
		if let Some(ty) = primitive(type_name) {
			let id = self.push_placeholder(name);
			self.set(id, ty);
			return Ok(id);
		}
		if matches!(type_name, "bytes" | "fixed") {
			return Err(SchemaError::UnsupportedType(type_name.to_owned()));
		}
		let target = self
			.lookup(type_name, namespace)
			.ok_or_else(|| SchemaError::UnknownReference(type_name.to_owned()))?;
		let id = self.push_placeholder(name);
		self.set(id, NodeType::Ref(target));
		Ok(id)
	}

	fn lookup(&self, type_name: &str, namespace: Option<&str>) -> Option<NodeId> {
		if let Some(&id) = self.named.get(type_name) {
			return Some(id);
		}
		if !type_name.contains('.') {
			if let Some(ns) = namespace {
				return self.named.get(&format!("{ns}.{type_name}")).copied();
			}
		}
		None
	}

	fn register(&mut self, type_name: &str, namespace: Option<&str>, id: NodeId) {
		if let Some(ns) = namespace {
			if !type_name.contains('.') {
				self.named.entry(format!("{ns}.{type_name}")).or_insert(id);
			}
		}
		self.named.entry(type_name.to_owned()).or_insert(id);
	}
}

fn primitive(type_name: &str) -> Option<NodeType> {
	Some(match type_name {
		"null" => NodeType::Null,
		"boolean" => NodeType::Boolean,
		"int" => NodeType::Int,
		"long" => NodeType::Long,
		"float" => NodeType::Float,
		"double" => NodeType::Double,
		"string" => NodeType::String,
		_ => return None,
	})
}

/// Reject schemas where walking would never terminate
///
/// Tree edges always point forward in the arena; only named references can
/// point backward, so any cycle goes through at least one [`NodeType::Ref`].
fn check_for_cycles(nodes: &[SchemaNode]) -> Result<(), SchemaError> {
	#[derive(Copy, Clone, PartialEq)]
	enum Mark {
		New,
		Active,
		Done,
	}

	fn visit(nodes: &[SchemaNode], idx: usize, marks: &mut [Mark]) -> Result<(), SchemaError> {
		match marks[idx] {
			Mark::Done => return Ok(()),
			Mark::Active => return Err(SchemaError::Cyclic),
			Mark::New => {}
		}
		marks[idx] = Mark::Active;
		match &nodes[idx].ty {
			NodeType::Record(record) => {
				for &field in &record.fields {
					visit(nodes, field.index(), marks)?;
				}
			}
			NodeType::Union(union) => {
				for &variant in &union.variants {
					visit(nodes, variant.index(), marks)?;
				}
			}
			NodeType::Array(array) => visit(nodes, array.items.index(), marks)?,
			NodeType::Map(map) => visit(nodes, map.values.index(), marks)?,
			NodeType::Ref(target) => visit(nodes, target.index(), marks)?,
			_ => {}
		}
		marks[idx] = Mark::Done;
		Ok(())
	}

	let mut marks = vec![Mark::New; nodes.len()];
	visit(nodes, 0, &mut marks)
}

#[cfg(test)]
mod tests {
	use crate::schema::{NodeType, Schema, SchemaError};

	#[test]
	fn enums_keep_their_symbols() {
		let schema: Schema = r#"{
			"type": "record",
			"name": "r",
			"fields": [
				{ "name": "color", "type": { "type": "enum", "name": "Color", "symbols": ["RED", "GOLD", "BLUE"] } }
			]
		}"#
		.parse()
		.unwrap();
		let color = schema.node_by_path("color").unwrap();
		match &schema.resolve(color).ty {
			NodeType::Enum(e) => assert_eq!(e.symbols, ["RED", "GOLD", "BLUE"]),
			other => panic!("expected enum, got {other:?}"),
		}
	}

	#[test]
	fn namespaced_references_resolve() {
		let schema: Schema = r#"{
			"type": "record",
			"name": "Outer",
			"namespace": "com.example",
			"fields": [
				{ "name": "a", "type": { "type": "record", "name": "Inner", "fields": [{ "name": "x", "type": "int" }] } },
				{ "name": "b", "type": "com.example.Inner" },
				{ "name": "c", "type": "Inner" }
			]
		}"#
		.parse()
		.unwrap();
		assert_eq!(
			schema.node_by_path("b.x").unwrap(),
			schema.node_by_path("a.x").unwrap()
		);
		assert_eq!(
			schema.node_by_path("c.x").unwrap(),
			schema.node_by_path("a.x").unwrap()
		);
	}

	#[test]
	fn unsupported_types_are_rejected() {
		assert!(matches!(
			r#"{"type": "record", "name": "r", "fields": [{"name": "f", "type": "bytes"}]}"#
				.parse::<Schema>(),
			Err(SchemaError::UnsupportedType(_))
		));
	}

	#[test]
	fn unknown_references_are_rejected() {
		assert!(matches!(
			r#"{"type": "record", "name": "r", "fields": [{"name": "f", "type": "Mystery"}]}"#
				.parse::<Schema>(),
			Err(SchemaError::UnknownReference(_))
		));
	}

	#[test]
	fn self_referential_schemas_are_rejected() {
		assert!(matches!(
			r#"{"type": "record", "name": "List", "fields": [
				{"name": "value", "type": "long"},
				{"name": "next", "type": ["null", "List"]}
			]}"#
			.parse::<Schema>(),
			Err(SchemaError::Cyclic)
		));
	}
}
