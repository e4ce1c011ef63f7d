use std::cmp::Ordering;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use super::{Key, NODE_MAX_DEG, NODE_MAX_SZ, keycmp};
use crate::{
	Result, err,
	matrix::canonical::{b64encode_unpadded, sha256},
};

/// Content-address of a node: unpadded base64 of the SHA-256 of its
/// canonical JSON.
pub type NodeId = String;

/// Overflow capacity of the working representation: one key and one
/// child beyond the maximum degree, occupied only between shift-insert
/// and split.
const REP_KEY: usize = NODE_MAX_DEG;
const REP_CHD: usize = NODE_MAX_DEG + 1;

/// One immutable tree node as persisted: `k` the ordered keys, `v` the
/// leaf values (event ids), `c` the child node-ids. A pure leaf has no
/// `c`; a branch carries exactly `|k| + 1` children.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Node {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub c: Vec<NodeId>,
	pub k: Vec<Key>,
	pub v: Vec<String>,
}

impl Node {
	pub fn parse(bytes: &[u8]) -> Result<Self> {
		let node: Self = serde_json::from_slice(bytes)?;
		node.validate()?;
		Ok(node)
	}

	/// Shape constraints; violation means the database is corrupt.
	pub fn validate(&self) -> Result {
		if self.k.is_empty() || self.k.len() != self.v.len() {
			return Err(err!(Database("state node has mismatched key/value arity")));
		}

		if !self.c.is_empty() && self.c.len() != self.k.len() + 1 {
			return Err(err!(Database("state node is neither leaf nor full-arity branch")));
		}

		if self.k.windows(2).any(|w| keycmp(&w[0], &w[1]) != Ordering::Less) {
			return Err(err!(Database("state node keys out of order")));
		}

		if self
			.c
			.iter()
			.enumerate()
			.any(|(i, c)| self.c[..i].contains(c))
		{
			return Err(err!(Database("state node has duplicate children")));
		}

		Ok(())
	}

	/// Canonical serialized form; the hash preimage for the node-id.
	#[must_use]
	pub fn canonical(&self) -> Vec<u8> {
		let bytes = serde_json::to_vec(self).expect("state node always serializes");
		debug_assert!(bytes.len() <= NODE_MAX_SZ, "state node exceeds maximum size");
		bytes
	}

	#[must_use]
	pub fn id(&self) -> NodeId { b64encode_unpadded(&sha256(&self.canonical())) }

	/// First position whose key is >= the argument; `|k|` when every key
	/// is smaller.
	#[must_use]
	pub fn find(&self, key: &Key) -> usize {
		self.k
			.iter()
			.position(|k| keycmp(key, k) != Ordering::Greater)
			.unwrap_or(self.k.len())
	}

	#[inline]
	#[must_use]
	pub fn is_leaf(&self) -> bool { self.c.is_empty() }
}

/// Mutable working representation of one node during insertion, with
/// overflow room for the shift-insert preceding a split.
#[derive(Debug, Default)]
pub(super) struct Rep {
	pub keys: ArrayVec<Key, REP_KEY>,
	pub vals: ArrayVec<String, REP_KEY>,
	pub chld: ArrayVec<NodeId, REP_CHD>,
}

impl From<Node> for Rep {
	fn from(node: Node) -> Self {
		let mut rep = Self::default();
		rep.keys.extend(node.k);
		rep.vals.extend(node.v);
		rep.chld.extend(node.c);
		rep
	}
}

impl Rep {
	#[inline]
	pub fn is_leaf(&self) -> bool { self.chld.is_empty() }

	#[inline]
	pub fn overfull(&self, max_key: usize) -> bool { self.keys.len() > max_key }

	pub fn find(&self, key: &Key) -> usize {
		self.keys
			.iter()
			.position(|k| keycmp(key, k) != Ordering::Greater)
			.unwrap_or(self.keys.len())
	}

	/// Shift-insert a key/value into a leaf.
	pub fn insert_leaf(&mut self, pos: usize, key: Key, val: String) {
		debug_assert!(self.is_leaf(), "only leaves take direct insertions");
		self.keys.insert(pos, key);
		self.vals.insert(pos, val);
	}

	/// Merge a promotion from the child at `pos`: adopt its single
	/// key/value and replace the one child slot with its two.
	pub fn insert_push(&mut self, pos: usize, pushed: Self) {
		debug_assert_eq!(pushed.keys.len(), 1, "promotion carries exactly one key");
		debug_assert_eq!(pushed.chld.len(), 2, "promotion carries exactly two children");

		let mut pushed = pushed;
		self.keys.insert(pos, pushed.keys.remove(0));
		self.vals.insert(pos, pushed.vals.remove(0));
		self.chld[pos] = pushed.chld.remove(0);
		self.chld.insert(pos.saturating_add(1), pushed.chld.remove(0));
	}

	/// Freeze into the persisted form.
	pub fn into_node(self) -> Node {
		let node = Node {
			c: self.chld.into_iter().collect(),
			k: self.keys.into_iter().collect(),
			v: self.vals.into_iter().collect(),
		};

		debug_assert!(node.validate().is_ok(), "rewriting an invalid node");
		node
	}
}
