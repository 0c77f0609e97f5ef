//! Schema tree model
//!
//! A parsed schema is an arena of [`SchemaNode`]s addressed by [`NodeId`].
//! Nodes are stored in pre-order, so a node's id doubles as its stable
//! position in the tree and ids can be used as cheap sort/lookup keys by the
//! filter engine and the TSV projection.
//!
//! Named types (`record`, `enum`) are referenced through [`NodeType::Ref`],
//! a by-id link into the same arena. References are resolved with
//! [`Schema::resolve`]; parsing rejects schemas where following references
//! would loop forever.

mod parsing;

/// Any error raised while parsing a schema or resolving paths against it
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
	/// The schema document is not valid JSON
	#[error("failed to parse schema JSON: {0}")]
	Json(#[from] serde_json::Error),
	/// The schema uses a type this tool does not model (e.g. `fixed`)
	#[error("unsupported schema type `{0}`")]
	UnsupportedType(String),
	/// A type name is referenced but never defined
	#[error("unknown type reference `{0}`")]
	UnknownReference(String),
	/// A complex type is missing a required attribute
	#[error("missing `{attribute}` attribute on `{type_name}` schema")]
	MissingAttribute {
		/// Name of the missing JSON attribute
		attribute: &'static str,
		/// The `type` of the schema object it is missing from
		type_name: &'static str,
	},
	/// Following named references would never terminate
	#[error("schema contains a reference cycle")]
	Cyclic,
	/// A filter or projection path does not name a field of the schema
	#[error("field path `{0}` does not match the schema")]
	PathNotFound(String),
}

/// Identifier of a node in a [`Schema`]
///
/// Ids are assigned in pre-order during parsing and are dense: the root is
/// `0` and every id below [`Schema::node_count`] is valid.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
	pub(crate) fn new(idx: usize) -> Self {
		Self(idx as u32)
	}

	/// Position of the node in the pre-order arena
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl std::fmt::Debug for NodeId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(&self.0, f)
	}
}

/// A parsed avro schema
///
/// Construct with [`str::parse`]. The first node is the root.
pub struct Schema {
	nodes: Vec<SchemaNode>,
}

/// One node of a [`Schema`]
#[derive(Debug)]
pub struct SchemaNode {
	/// Pre-order id of this node
	pub id: NodeId,
	/// Field name under which the node appears in its enclosing record, or
	/// the type name for named types at definition site (empty for
	/// synthesized positions such as array items)
	pub name: String,
	/// What the node is
	pub ty: NodeType,
}

/// The variant-specific part of a [`SchemaNode`]
#[derive(Debug)]
pub enum NodeType {
	Null,
	Boolean,
	Int,
	Long,
	Float,
	Double,
	String,
	Record(Record),
	Enum(Enum),
	Array(Array),
	Map(Map),
	Union(Union),
	/// Reference to a previously defined named type
	Ref(NodeId),
}

/// Component of a [`SchemaNode`]
#[derive(Debug)]
pub struct Record {
	/// Field nodes, in declaration order
	pub fields: Vec<NodeId>,
}

/// Component of a [`SchemaNode`]
#[derive(Debug)]
pub struct Enum {
	/// Symbol names, indexed by the on-wire symbol index
	pub symbols: Vec<String>,
}

/// Component of a [`SchemaNode`]
#[derive(Debug)]
pub struct Array {
	/// Element type
	pub items: NodeId,
}

/// Component of a [`SchemaNode`]
#[derive(Debug)]
pub struct Map {
	/// Value type (map keys are always strings)
	pub values: NodeId,
}

/// Component of a [`SchemaNode`]
#[derive(Debug)]
pub struct Union {
	/// Branch nodes, in declaration order
	pub variants: Vec<NodeId>,
	/// Index of the `null` branch, if the union has one
	pub null_variant: Option<usize>,
}

impl Schema {
	pub(crate) fn from_nodes(nodes: Vec<SchemaNode>) -> Self {
		Self { nodes }
	}

	/// The root node of the schema
	pub fn root(&self) -> &SchemaNode {
		&self.nodes[0]
	}

	/// Number of nodes in the schema
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// The node with the given id
	pub fn node(&self, id: NodeId) -> &SchemaNode {
		&self.nodes[id.index()]
	}

	/// The node with the given id, with named references followed to their
	/// definition
	pub fn resolve(&self, id: NodeId) -> &SchemaNode {
		let mut node = self.node(id);
		while let NodeType::Ref(target) = node.ty {
			node = self.node(target);
		}
		node
	}

	/// Resolve a dotted field path to a node id
	///
	/// Path segments traverse record fields by name; named references are
	/// transparent. Anything else along the way (including running into a
	/// primitive with segments left over) is [`SchemaError::PathNotFound`].
	pub fn node_by_path(&self, path: &str) -> Result<NodeId, SchemaError> {
		let mut current = NodeId::new(0);
		for segment in path.split('.') {
			let node = self.resolve(current);
			let NodeType::Record(record) = &node.ty else {
				return Err(SchemaError::PathNotFound(path.to_owned()));
			};
			current = *record
				.fields
				.iter()
				.find(|&&f| self.node(f).name == segment)
				.ok_or_else(|| SchemaError::PathNotFound(path.to_owned()))?;
		}
		Ok(current)
	}
}

impl std::str::FromStr for Schema {
	type Err = SchemaError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parsing::parse(s)
	}
}

impl std::fmt::Debug for Schema {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list().entries(&self.nodes).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const EVENT: &str = r#"
	{
		"type": "record",
		"name": "Event",
		"fields": [
			{ "name": "id", "type": "long" },
			{ "name": "user", "type": {
				"type": "record",
				"name": "User",
				"fields": [
					{ "name": "name", "type": "string" },
					{ "name": "age", "type": ["null", "int"] }
				]
			} },
			{ "name": "friend", "type": "User" },
			{ "name": "tags", "type": { "type": "array", "items": "string" } }
		]
	}
	"#;

	#[test]
	fn preorder_ids() {
		let schema: Schema = EVENT.parse().unwrap();
		// Event, id, User, name, age-union, null, int, friend-ref, tags, items
		assert_eq!(schema.node_count(), 10);
		assert_eq!(schema.root().id.index(), 0);
		assert!(matches!(schema.node(NodeId::new(1)).ty, NodeType::Long));
		assert!(matches!(schema.node(NodeId::new(2)).ty, NodeType::Record(_)));
		assert!(matches!(schema.node(NodeId::new(7)).ty, NodeType::Ref(_)));
		for (idx, node) in schema.nodes.iter().enumerate() {
			assert_eq!(node.id.index(), idx);
		}
	}

	#[test]
	fn paths_resolve_through_records_and_refs() {
		let schema: Schema = EVENT.parse().unwrap();
		assert_eq!(schema.node_by_path("id").unwrap().index(), 1);
		assert_eq!(schema.node_by_path("user.name").unwrap().index(), 3);
		// `friend` is a reference to User; its fields resolve transparently
		let through_ref = schema.node_by_path("friend.age").unwrap();
		assert_eq!(through_ref.index(), 4);
	}

	#[test]
	fn bad_paths_are_rejected() {
		let schema: Schema = EVENT.parse().unwrap();
		assert!(matches!(
			schema.node_by_path("nope"),
			Err(SchemaError::PathNotFound(_))
		));
		// cannot traverse into an array
		assert!(matches!(
			schema.node_by_path("tags.inner"),
			Err(SchemaError::PathNotFound(_))
		));
	}

	#[test]
	fn union_knows_its_null_branch() {
		let schema: Schema = EVENT.parse().unwrap();
		let age = schema.node_by_path("user.age").unwrap();
		match &schema.resolve(age).ty {
			NodeType::Union(union) => {
				assert_eq!(union.variants.len(), 2);
				assert_eq!(union.null_variant, Some(0));
			}
			other => panic!("expected union, got {other:?}"),
		}
	}
}
