#![cfg(test)]

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use futures::executor::block_on;

use super::{Appendix, Key, Node, NodeId, NodeStore, Tree, keycmp};
use crate::{
	Result, err,
	matrix::canonical::{b64encode_unpadded, sha256},
	utils::result::NotFound,
};

#[derive(Default)]
struct MemStore {
	nodes: Mutex<HashMap<NodeId, Vec<u8>>>,
}

impl MemStore {
	fn absorb(&self, out: &Appendix) {
		let mut nodes = self.nodes.lock().unwrap();
		for (id, bytes) in out.iter() {
			nodes.insert(id.to_owned(), bytes.to_owned());
		}
	}

	fn raw(&self, id: &str) -> Option<Vec<u8>> { self.nodes.lock().unwrap().get(id).cloned() }

	fn node(&self, id: &str) -> Node { Node::parse(&self.raw(id).expect("node exists")).unwrap() }
}

#[async_trait]
impl NodeStore for MemStore {
	async fn get_node(&self, id: &str) -> Result<Node> {
		let Some(bytes) = self.raw(id) else {
			return Err(err!(NotFound("no node {id}")));
		};

		Node::parse(&bytes)
	}
}

fn insert(tree: &Tree, store: &MemStore, root: Option<&str>, key: Key, val: &str) -> NodeId {
	let mut out = Appendix::default();
	let root = block_on(tree.insert(store, root, key, val, &mut out)).unwrap();
	store.absorb(&out);
	root
}

fn get(tree: &Tree, store: &MemStore, root: &str, key: &Key) -> Result<String> {
	block_on(tree.get(store, root, key))
}

#[test]
fn create_grows_single_leaf() {
	let tree = Tree::new();
	let store = MemStore::default();

	let key = Key::make("m.room.create", "");
	let root = insert(&tree, &store, None, key.clone(), "$create:a.example");

	let node = store.node(&root);
	assert!(node.is_leaf());
	assert_eq!(node.k, vec![key.clone()]);
	assert_eq!(node.v, vec!["$create:a.example".to_owned()]);

	assert_eq!(get(&tree, &store, &root, &key).unwrap(), "$create:a.example");
}

#[test]
fn get_missing_key_is_not_found() {
	let tree = Tree::new();
	let store = MemStore::default();

	let root = insert(&tree, &store, None, Key::make("m.room.create", ""), "$c:x");
	assert!(get(&tree, &store, &root, &Key::make("m.room.name", "")).is_not_found());
}

#[test]
fn last_writer_wins_per_key() {
	let tree = Tree::new();
	let store = MemStore::default();

	let key = Key::make("m.room.topic", "");
	let root = insert(&tree, &store, None, key.clone(), "$one:x");
	let root = insert(&tree, &store, Some(&root), key.clone(), "$two:x");

	assert_eq!(get(&tree, &store, &root, &key).unwrap(), "$two:x");
}

#[test]
fn old_roots_stay_addressable() {
	let tree = Tree::new();
	let store = MemStore::default();

	let key = Key::make("m.room.topic", "");
	let old = insert(&tree, &store, None, key.clone(), "$one:x");
	let new = insert(&tree, &store, Some(&old), key.clone(), "$two:x");

	assert_ne!(old, new);
	assert_eq!(get(&tree, &store, &old, &key).unwrap(), "$one:x");
	assert_eq!(get(&tree, &store, &new, &key).unwrap(), "$two:x");
}

#[test]
fn insert_order_does_not_matter() {
	let tree = Tree::new();
	let k1 = Key::make("m.room.name", "");
	let k2 = Key::make("m.room.topic", "");

	let store_a = MemStore::default();
	let root_a = insert(&tree, &store_a, None, k1.clone(), "$n:x");
	let root_a = insert(&tree, &store_a, Some(&root_a), k2.clone(), "$t:x");

	let store_b = MemStore::default();
	let root_b = insert(&tree, &store_b, None, k2.clone(), "$t:x");
	let root_b = insert(&tree, &store_b, Some(&root_b), k1.clone(), "$n:x");

	for (store, root) in [(&store_a, &root_a), (&store_b, &root_b)] {
		assert_eq!(get(&tree, store, root, &k1).unwrap(), "$n:x");
		assert_eq!(get(&tree, store, root, &k2).unwrap(), "$t:x");
	}
}

#[test]
fn members_iterate_in_state_key_order() {
	let tree = Tree::new();
	let store = MemStore::default();

	let mut root = insert(&tree, &store, None, Key::make("m.room.create", ""), "$create:x");
	for i in 0..32 {
		let state_key = format!("@u{i:02}:x");
		let key = Key::make("m.room.member", &state_key);
		root = insert(&tree, &store, Some(&root), key, &format!("$m{i:02}:x"));
	}

	assert_eq!(block_on(tree.count(&store, &root)).unwrap(), 33);

	let mut visited = Vec::new();
	let prefix = Key::make_type("m.room.member");
	block_on(tree.for_each(&store, &root, Some(&prefix), &mut |key, val| {
		visited.push((key.state_key().to_owned(), val.to_owned()));
	}))
	.unwrap();

	assert_eq!(visited.len(), 32);
	assert!(visited.windows(2).all(|w| w[0].0 < w[1].0), "lex order of state_key");
	assert_eq!(visited[0], ("@u00:x".to_owned(), "$m00:x".to_owned()));
	assert_eq!(visited[31], ("@u31:x".to_owned(), "$m31:x".to_owned()));
}

#[test]
fn split_promotes_middle_key() {
	let tree = Tree::with_max_key(3);
	let store = MemStore::default();

	let key = |s: &str| Key::make("t", s);
	let mut root = insert(&tree, &store, None, key("a"), "$a:x");
	for s in ["b", "c"] {
		root = insert(&tree, &store, Some(&root), key(s), &format!("${s}:x"));
	}

	// Three keys fill the root leaf exactly.
	let node = store.node(&root);
	assert!(node.is_leaf());
	assert_eq!(node.k.len(), 3);

	// The fourth insertion forces exactly one split: a one-key branch
	// over two leaves, the middle key promoted.
	root = insert(&tree, &store, Some(&root), key("d"), "$d:x");
	let node = store.node(&root);
	assert_eq!(node.k, vec![key("c")]);
	assert_eq!(node.c.len(), 2);

	let left = store.node(&node.c[0]);
	let right = store.node(&node.c[1]);
	assert!(left.is_leaf() && right.is_leaf());
	assert_eq!(left.k, vec![key("a"), key("b")]);
	assert_eq!(right.k, vec![key("d")]);

	// The fifth lands in the right leaf; still two leaves, the middle
	// key still at the root.
	root = insert(&tree, &store, Some(&root), key("e"), "$e:x");
	let node = store.node(&root);
	assert_eq!(node.k, vec![key("c")]);
	let right = store.node(&node.c[1]);
	assert_eq!(right.k, vec![key("d"), key("e")]);

	for s in ["a", "b", "c", "d", "e"] {
		assert_eq!(get(&tree, &store, &root, &key(s)).unwrap(), format!("${s}:x"));
	}
}

#[test]
fn nodes_are_content_addressed() {
	let tree = Tree::with_max_key(4);
	let store = MemStore::default();

	let mut root = insert(&tree, &store, None, Key::make("t", "00"), "$0:x");
	for i in 1..20 {
		let key = Key::make("t", &format!("{i:02}"));
		root = insert(&tree, &store, Some(&root), key, &format!("${i}:x"));
	}

	let nodes = store.nodes.lock().unwrap();
	for (id, bytes) in nodes.iter() {
		assert_eq!(*id, b64encode_unpadded(&sha256(bytes)), "node-id is the content hash");

		let node = Node::parse(bytes).unwrap();
		assert_eq!(node.canonical(), *bytes, "canonical form roundtrips");
	}
}

// Walks the tree shape: returns (depth, key count) per node and checks
// leaf depth uniformity plus the minimum-occupancy bound for non-roots.
fn check_shape(store: &MemStore, id: &str, depth: usize, root: bool, min_keys: usize) -> Vec<usize> {
	let node = store.node(id);
	node.validate().unwrap();

	if !root {
		assert!(node.k.len() >= min_keys, "non-root below minimum occupancy");
	}

	if node.is_leaf() {
		return vec![depth];
	}

	node.c
		.iter()
		.flat_map(|child| check_shape(store, child, depth + 1, false, min_keys))
		.collect()
}

#[test]
fn balance_holds_under_many_inserts() {
	let tree = Tree::with_max_key(4);
	let store = MemStore::default();

	let mut root = insert(&tree, &store, None, Key::make("t", "000"), "$0:x");
	for i in 1..100 {
		let key = Key::make("t", &format!("{i:03}"));
		root = insert(&tree, &store, Some(&root), key, &format!("${i}:x"));
	}

	let depths = check_shape(&store, &root, 0, true, 2);
	assert!(depths.windows(2).all(|w| w[0] == w[1]), "all leaves at equal depth");

	// In-order traversal yields strictly ascending keys.
	let mut last: Option<Key> = None;
	block_on(tree.for_each(&store, &root, None, &mut |key, _| {
		if let Some(ref last) = last {
			assert_eq!(keycmp(last, key), std::cmp::Ordering::Less);
		}
		last = Some(key.clone());
	}))
	.unwrap();
}

#[test]
fn until_stops_early() {
	let tree = Tree::with_max_key(4);
	let store = MemStore::default();

	let mut root = insert(&tree, &store, None, Key::make("t", "00"), "$0:x");
	for i in 1..10 {
		let key = Key::make("t", &format!("{i:02}"));
		root = insert(&tree, &store, Some(&root), key, &format!("${i}:x"));
	}

	let mut seen = 0;
	let stopped = block_on(tree.until(&store, &root, None, &mut |_, _| {
		seen += 1;
		seen == 3
	}))
	.unwrap();

	assert!(stopped);
	assert_eq!(seen, 3);
}

#[test]
#[should_panic(expected = "recursion limit exceeded")]
fn descent_beyond_max_height_faults() {
	let tree = Tree::with_max_key(3);
	let store = MemStore::default();

	// A pathological left-descending chain deeper than any balanced
	// tree can be; only a corrupt store can produce one.
	let leaf = Node {
		c: vec![],
		k: vec![Key::make("t", "a")],
		v: vec!["$a:x".into()],
	};
	let mut id = leaf.id();
	store
		.nodes
		.lock()
		.unwrap()
		.insert(id.clone(), leaf.canonical());

	for i in 0..=super::MAX_HEIGHT {
		let right = Node {
			c: vec![],
			k: vec![Key::make("t", &format!("z{i:02}"))],
			v: vec![format!("$z{i}:x")],
		};
		let right_id = right.id();
		store
			.nodes
			.lock()
			.unwrap()
			.insert(right_id.clone(), right.canonical());

		let branch = Node {
			c: vec![id.clone(), right_id],
			k: vec![Key::make("t", "y")],
			v: vec!["$y:x".into()],
		};
		id = branch.id();
		store
			.nodes
			.lock()
			.unwrap()
			.insert(id.clone(), branch.canonical());
	}

	_ = block_on(tree.get(&store, &id, &Key::make("t", "a")));
}

#[test]
fn descent_into_missing_node_fails() {
	let tree = Tree::with_max_key(3);
	let store = MemStore::default();

	let key = |s: &str| Key::make("t", s);
	let mut root = insert(&tree, &store, None, key("a"), "$a:x");
	for s in ["b", "c", "d"] {
		root = insert(&tree, &store, Some(&root), key(s), &format!("${s}:x"));
	}

	// Remove a leaf out from under the branch root.
	let child = store.node(&root).c[0].clone();
	store.nodes.lock().unwrap().remove(&child);
	assert!(get(&tree, &store, &root, &key("a")).is_not_found());
}
