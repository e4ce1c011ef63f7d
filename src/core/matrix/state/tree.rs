use std::cmp::Ordering;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{
	Key, MAX_HEIGHT, NODE_MAX_KEY, keycmp, prefix_eq,
	node::{Node, NodeId, Rep},
};
use crate::{Result, err};

/// Read access to persisted nodes. Writes never go through the store:
/// an insertion returns every freshly-created node in an [`Appendix`]
/// for the caller to stage into its transaction.
#[async_trait]
pub trait NodeStore: Send + Sync {
	async fn get_node(&self, id: &str) -> Result<Node>;
}

/// Content-addressed nodes produced by one insertion, in creation order.
/// Nodes are never mutated after creation; re-inserting identical
/// content yields the identical id.
#[derive(Debug, Default)]
pub struct Appendix {
	nodes: Vec<(NodeId, Vec<u8>)>,
}

impl Appendix {
	/// Serialize and address a node; records it and returns its id.
	pub fn push(&mut self, node: &Node) -> NodeId {
		let bytes = node.canonical();
		let id = node.id();
		self.nodes.push((id.clone(), bytes));
		id
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
		self.nodes
			.iter()
			.map(|(id, bytes)| (id.as_str(), bytes.as_slice()))
	}

	#[must_use]
	pub fn len(&self) -> usize { self.nodes.len() }

	#[must_use]
	pub fn is_empty(&self) -> bool { self.nodes.is_empty() }
}

/// Promotion result of a recursive insertion: either the id of the
/// rewritten node, or a single-key rep pushed up for the parent to merge.
enum Outcome {
	Id(NodeId),
	Push(Rep),
}

/// The B-tree algorithm. Stateless besides the fan-out bound, which is
/// the compile-time [`NODE_MAX_KEY`] everywhere outside shape tests.
#[derive(Clone, Copy, Debug)]
pub struct Tree {
	max_key: usize,
}

impl Default for Tree {
	fn default() -> Self { Self::new() }
}

impl Tree {
	#[must_use]
	pub const fn new() -> Self { Self { max_key: NODE_MAX_KEY } }

	/// Reduced fan-out for exercising split behavior.
	#[must_use]
	pub const fn with_max_key(max_key: usize) -> Self {
		assert!(max_key >= 2 && max_key <= NODE_MAX_KEY);
		Self { max_key }
	}

	/// Recursive descent for the value at `key` starting from `root`.
	pub async fn get(&self, store: &dyn NodeStore, root: &str, key: &Key) -> Result<String> {
		let mut id = root.to_owned();
		for _ in 0..MAX_HEIGHT {
			let node = store.get_node(&id).await?;
			let pos = node.find(key);
			if pos < node.k.len() && keycmp(key, &node.k[pos]) == Ordering::Equal {
				return Ok(node.v[pos].clone());
			}

			if node.is_leaf() {
				return Err(err!(NotFound("{key:?} not found in tree {root}")));
			}

			id = node.c[pos.min(node.c.len().saturating_sub(1))].clone();
		}

		panic!("recursion limit exceeded; state tree corrupt");
	}

	/// Insert `key -> val`, producing a new root. `root` of None grows a
	/// new single-leaf tree. Every created node lands in `out`; nothing
	/// already persisted is touched.
	pub async fn insert(
		&self,
		store: &dyn NodeStore,
		root: Option<&str>,
		key: Key,
		val: &str,
		out: &mut Appendix,
	) -> Result<NodeId> {
		let Some(root) = root.filter(|root| !root.is_empty()) else {
			let node = Node {
				c: Vec::new(),
				k: vec![key],
				v: vec![val.to_owned()],
			};

			return Ok(out.push(&node));
		};

		let node = store.get_node(root).await?;
		match self.insert_at(store, node, key, val, 0, out).await? {
			| Outcome::Id(id) => Ok(id),
			// The root split; the promotion becomes the new root and the
			// tree grows one level.
			| Outcome::Push(push) => Ok(out.push(&push.into_node())),
		}
	}

	fn insert_at<'a>(
		&'a self,
		store: &'a dyn NodeStore,
		node: Node,
		key: Key,
		val: &'a str,
		height: usize,
		out: &'a mut Appendix,
	) -> BoxFuture<'a, Result<Outcome>> {
		Box::pin(async move {
			assert!(height < MAX_HEIGHT, "recursion limit exceeded; state tree corrupt");

			let mut rep = Rep::from(node);
			let pos = rep.find(&key);

			// Exact match: overwrite in place, rewrite this node.
			if pos < rep.keys.len() && keycmp(&key, &rep.keys[pos]) == Ordering::Equal {
				rep.vals[pos] = val.to_owned();
				return Ok(Outcome::Id(out.push(&rep.into_node())));
			}

			if rep.is_leaf() {
				rep.insert_leaf(pos, key, val.to_owned());
				if rep.overfull(self.max_key) {
					return Ok(self.split(rep, out));
				}

				return Ok(Outcome::Id(out.push(&rep.into_node())));
			}

			let child = store.get_node(&rep.chld[pos]).await?;
			match self
				.insert_at(store, child, key, val, height.saturating_add(1), out)
				.await?
			{
				| Outcome::Id(id) => {
					rep.chld[pos] = id;
					Ok(Outcome::Id(out.push(&rep.into_node())))
				},
				| Outcome::Push(pushed) => {
					rep.insert_push(pos, pushed);
					if rep.overfull(self.max_key) {
						return Ok(self.split(rep, out));
					}

					Ok(Outcome::Id(out.push(&rep.into_node())))
				},
			}
		})
	}

	/// Split an overfull rep at the midpoint. The halves are written out;
	/// the middle key rides up in a single-key promotion rep.
	fn split(&self, rep: Rep, out: &mut Appendix) -> Outcome {
		let mid = rep.keys.len() / 2;
		let branch = !rep.is_leaf();

		let mut keys = rep.keys.into_iter();
		let mut vals = rep.vals.into_iter();
		let mut chld = rep.chld.into_iter();

		let left = Node {
			c: if branch {
				chld.by_ref().take(mid.saturating_add(1)).collect()
			} else {
				Vec::new()
			},
			k: keys.by_ref().take(mid).collect(),
			v: vals.by_ref().take(mid).collect(),
		};

		let mid_key = keys.next().expect("midpoint key");
		let mid_val = vals.next().expect("midpoint value");

		let right = Node {
			c: chld.collect(),
			k: keys.collect(),
			v: vals.collect(),
		};

		let mut push = Rep::default();
		push.keys.push(mid_key);
		push.vals.push(mid_val);
		push.chld.push(out.push(&left));
		push.chld.push(out.push(&right));

		Outcome::Push(push)
	}

	/// Depth-first visitation of leaves in key order, optionally bounded
	/// to a prefix. The closure returning true stops the walk; the return
	/// reports whether it did.
	pub async fn until(
		&self,
		store: &dyn NodeStore,
		root: &str,
		prefix: Option<&Key>,
		closure: &mut (dyn FnMut(&Key, &str) -> bool + Send),
	) -> Result<bool> {
		let node = store.get_node(root).await?;
		self.dfs_at(store, node, prefix, 0, closure).await
	}

	pub async fn for_each(
		&self,
		store: &dyn NodeStore,
		root: &str,
		prefix: Option<&Key>,
		closure: &mut (dyn FnMut(&Key, &str) + Send),
	) -> Result {
		self.until(store, root, prefix, &mut |key, val| {
			closure(key, val);
			false
		})
		.await?;

		Ok(())
	}

	pub async fn count(&self, store: &dyn NodeStore, root: &str) -> Result<usize> {
		let mut count: usize = 0;
		self.for_each(store, root, None, &mut |_, _| count = count.saturating_add(1))
			.await?;

		Ok(count)
	}

	fn dfs_at<'a>(
		&'a self,
		store: &'a dyn NodeStore,
		node: Node,
		prefix: Option<&'a Key>,
		depth: usize,
		closure: &'a mut (dyn FnMut(&Key, &str) -> bool + Send),
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			assert!(depth < MAX_HEIGHT, "recursion limit exceeded; state tree corrupt");

			let start = prefix.map_or(0, |key| node.find(key));
			for pos in start..node.k.len().max(node.c.len()) {
				if let Some(child) = node.c.get(pos) {
					let child = store.get_node(child).await?;
					if self
						.dfs_at(store, child, prefix, depth.saturating_add(1), closure)
						.await?
					{
						return Ok(true);
					}
				}

				let Some(key) = node.k.get(pos) else {
					continue;
				};

				if let Some(prefix) = prefix {
					if !prefix_eq(prefix, key) {
						break;
					}
				}

				if closure(key, &node.v[pos]) {
					return Ok(true);
				}
			}

			Ok(false)
		})
	}
}
