//! The per-room state index: a functional B-tree keyed by
//! `[type, state_key]` with event-id values and content-addressed,
//! immutable nodes. Insertion never mutates a shared node; it produces a
//! fresh root and the set of new nodes to persist. Old roots remain
//! addressable as historical state.

mod node;
#[cfg(test)]
mod tests;
mod tree;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use self::{
	node::{Node, NodeId},
	tree::{Appendix, NodeStore, Tree},
};
use crate::matrix::StateKey;

/// Fan-out upper bound: maximum keys per node.
pub const NODE_MAX_KEY: usize = 128;

/// Maximum children per node.
pub const NODE_MAX_DEG: usize = NODE_MAX_KEY + 1;

/// Maximum serialized size of one key.
pub const KEY_MAX_SZ: usize = 768;

/// Maximum serialized size of one node.
pub const NODE_MAX_SZ: usize = 65_536;

/// Descent bound; exceeding it indicates a corrupt tree and is a hard
/// fault.
pub const MAX_HEIGHT: usize = 16;

/// A tree key: `[type, state_key]` as an array of string parts. Prefix
/// keys (`[type]` alone) address every state_key of a type during
/// iteration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Key(SmallVec<[StateKey; 2]>);

impl Key {
	#[must_use]
	pub fn make(kind: &str, state_key: &str) -> Self {
		Self(smallvec::smallvec![kind.into(), state_key.into()])
	}

	/// Single-part prefix key for iterating all state of one type.
	#[must_use]
	pub fn make_type(kind: &str) -> Self { Self(smallvec::smallvec![kind.into()]) }

	#[inline]
	#[must_use]
	pub fn parts(&self) -> &[StateKey] { &self.0 }

	#[inline]
	#[must_use]
	pub fn kind(&self) -> &str { self.0.first().map_or("", StateKey::as_str) }

	#[inline]
	#[must_use]
	pub fn state_key(&self) -> &str { self.0.get(1).map_or("", StateKey::as_str) }
}

/// Compares two keys element-wise; parts concatenate lexically, a key
/// which is a strict prefix of another orders before it.
#[must_use]
pub fn keycmp(a: &Key, b: &Key) -> Ordering {
	for (a, b) in a.parts().iter().zip(b.parts()) {
		match a.as_str().cmp(b.as_str()) {
			| Ordering::Equal => {},
			| other => return other,
		}
	}

	a.parts().len().cmp(&b.parts().len())
}

/// True when `b` falls under prefix `a`: the first part equal and at most
/// one part differing thereafter.
#[must_use]
pub fn prefix_eq(a: &Key, b: &Key) -> bool {
	let mut differing: usize = 0;
	let mut ai = a.parts().iter();
	let mut bi = b.parts().iter();
	loop {
		match (ai.next(), bi.next()) {
			| (Some(a), Some(b)) if differing < 2 => {
				if a == b {
					if differing != 0 {
						return false;
					}
				} else {
					differing += 1;
				}
			},
			| (None, None) => return differing < 2,
			| _ => return differing == 0,
		}
	}
}

#[cfg(test)]
mod key_tests {
	use std::cmp::Ordering;

	use super::{Key, keycmp, prefix_eq};

	#[test]
	fn keycmp_orders_by_type_then_state_key() {
		let a = Key::make("m.room.member", "@a:x");
		let b = Key::make("m.room.member", "@b:x");
		let c = Key::make("m.room.name", "");

		assert_eq!(keycmp(&a, &b), Ordering::Less);
		assert_eq!(keycmp(&b, &c), Ordering::Less);
		assert_eq!(keycmp(&a, &a), Ordering::Equal);
		assert_eq!(keycmp(&c, &a), Ordering::Greater);
	}

	#[test]
	fn type_prefix_orders_before_full_key() {
		let prefix = Key::make_type("m.room.member");
		let full = Key::make("m.room.member", "");
		assert_eq!(keycmp(&prefix, &full), Ordering::Less);
	}

	#[test]
	fn prefix_eq_matches_same_type() {
		let prefix = Key::make_type("m.room.member");
		assert!(prefix_eq(&prefix, &Key::make("m.room.member", "@a:x")));
		assert!(prefix_eq(&prefix, &Key::make("m.room.member", "@b:x")));
		assert!(!prefix_eq(&prefix, &Key::make("m.room.name", "")));
	}

	#[test]
	fn prefix_eq_full_keys_differ_in_state_key_only() {
		let a = Key::make("m.room.member", "@a:x");
		let b = Key::make("m.room.member", "@b:x");
		let c = Key::make("m.room.name", "@a:x");

		assert!(prefix_eq(&a, &b));
		assert!(!prefix_eq(&a, &c));
	}
}
