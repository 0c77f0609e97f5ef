//! Filter expressions and the predicate engine
//!
//! A filter starts life as an [`Expr`] parsed from the command line, gets
//! bound to a concrete schema as a [`Filter`], and is then consulted by the
//! decoder once per record: the walkers feed values into the bound
//! [`PredicateSet`] while decoding, and [`Filter::passed`] folds the boolean
//! expression over the per-leaf verdicts afterwards.

mod parser;
mod predicate;

pub use parser::{parse, FilterError};
pub use predicate::PredicateSet;

use crate::schema::{NodeId, NodeType, Schema, SchemaError};

/// A parsed filter expression, not yet bound to any schema
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Compare(Comparison),
}

/// One `path == constant` / `path ~= constant` leaf
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
	/// Dotted field path into the schema
	pub path: String,
	pub op: Op,
	pub value: Literal,
}

/// Comparison operator of a filter leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
	/// `==`
	Eq,
	/// `~=`
	Ne,
}

/// Constant a field is compared against
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
	Int(i64),
	Str(String),
	Nil,
}

/// A filter bound to a schema, ready for record evaluation
pub struct Filter {
	expr: BoundExpr,
	predicates: PredicateSet,
}

enum BoundExpr {
	And(Box<BoundExpr>, Box<BoundExpr>),
	Or(Box<BoundExpr>, Box<BoundExpr>),
	Leaf(usize),
}

impl Filter {
	/// Bind every leaf path of `expr` against `schema`
	///
	/// A leaf that resolves to a union is promoted to the union's string or
	/// integer branch so the comparison applies to the value that actually
	/// materialises; a leaf that resolves to an array is applied per element
	/// with "exists" aggregation. In both cases the enclosing node is indexed
	/// too, so union dispatch and array walking can reach the leaf.
	pub fn new(expr: &Expr, schema: &Schema) -> Result<Self, SchemaError> {
		let mut binder = Binder {
			schema,
			comparisons: Vec::new(),
			index: Vec::new(),
		};
		let bound = binder.bind(expr)?;
		Ok(Self {
			expr: bound,
			predicates: PredicateSet::new(binder.comparisons, binder.index),
		})
	}

	/// Whether the record walked since the last reset satisfies the filter
	pub fn passed(&self) -> bool {
		fn eval(expr: &BoundExpr, predicates: &PredicateSet) -> bool {
			match expr {
				BoundExpr::And(left, right) => {
					eval(left, predicates) && eval(right, predicates)
				}
				BoundExpr::Or(left, right) => eval(left, predicates) || eval(right, predicates),
				BoundExpr::Leaf(leaf) => predicates.leaf_satisfied(*leaf),
			}
		}
		eval(&self.expr, &self.predicates)
	}

	/// Clear all per-record state; call after each record's verdict
	pub fn reset_state(&self) {
		self.predicates.reset();
	}

	pub(crate) fn predicates(&self) -> &PredicateSet {
		&self.predicates
	}
}

struct Binder<'s> {
	schema: &'s Schema,
	comparisons: Vec<(Op, Literal)>,
	index: Vec<(NodeId, usize)>,
}

impl Binder<'_> {
	fn bind(&mut self, expr: &Expr) -> Result<BoundExpr, SchemaError> {
		Ok(match expr {
			Expr::And(left, right) => {
				BoundExpr::And(Box::new(self.bind(left)?), Box::new(self.bind(right)?))
			}
			Expr::Or(left, right) => {
				BoundExpr::Or(Box::new(self.bind(left)?), Box::new(self.bind(right)?))
			}
			Expr::Compare(comparison) => BoundExpr::Leaf(self.bind_leaf(comparison)?),
		})
	}

	fn bind_leaf(&mut self, comparison: &Comparison) -> Result<usize, SchemaError> {
		let leaf = self.comparisons.len();
		let mut id = self.schema.node_by_path(&comparison.path)?;
		loop {
			let node = self.schema.resolve(id);
			match &node.ty {
				NodeType::Array(array) => {
					self.index.push((node.id, leaf));
					id = array.items;
				}
				NodeType::Union(union) => {
					self.index.push((node.id, leaf));
					match promoted_branch(self.schema, &union.variants) {
						Some(branch) => id = branch,
						None => break,
					}
				}
				_ => {
					self.index.push((node.id, leaf));
					break;
				}
			}
		}
		self.comparisons
			.push((comparison.op, comparison.value.clone()));
		Ok(leaf)
	}
}

/// The union branch a comparison value binds to: the string branch if there
/// is one, otherwise the int branch, otherwise the long branch
fn promoted_branch(schema: &Schema, variants: &[NodeId]) -> Option<NodeId> {
	let find = |wanted: fn(&NodeType) -> bool| {
		variants
			.iter()
			.copied()
			.find(|&branch| wanted(&schema.resolve(branch).ty))
	};
	find(|ty| matches!(ty, NodeType::String))
		.or_else(|| find(|ty| matches!(ty, NodeType::Int)))
		.or_else(|| find(|ty| matches!(ty, NodeType::Long)))
}
