use std::{collections::BTreeMap, ops::Deref, sync::RwLock};

use super::Config;
use crate::{Result, err, warn};

/// Runtime-overridable configuration item. Items with `persist` set are
/// mirrored as `ircd.conf.item` state events in the `!conf` room and
/// folded back into the manager at startup.
#[derive(Clone, Copy, Debug)]
pub struct Item {
	pub name: &'static str,
	pub persist: bool,
}

pub const ITEMS: &[Item] = &[
	Item { name: "event.max_size", persist: true },
	Item {
		name: "federation.backfill_ids.limit.default",
		persist: true,
	},
	Item {
		name: "federation.backfill_ids.limit.max",
		persist: true,
	},
	Item { name: "eval.inflight.max", persist: true },
];

/// Owns the immutable base [`Config`] plus the runtime override layer.
/// Reads are lock-free for the base; overridden items take a read lock.
pub struct Manager {
	base: Config,
	overrides: RwLock<BTreeMap<&'static str, String>>,
}

impl Manager {
	#[must_use]
	pub fn new(base: Config) -> Self {
		Self {
			base,
			overrides: RwLock::new(BTreeMap::new()),
		}
	}

	/// Current effective value of a named item, rendered as a string.
	#[must_use]
	pub fn item(&self, name: &str) -> Option<String> {
		let item = Self::find(name)?;
		if let Some(val) = self
			.overrides
			.read()
			.expect("config overrides")
			.get(item.name)
		{
			return Some(val.clone());
		}

		Some(self.base_value(item.name))
	}

	/// Override a named item. Unknown names and unparsable values are
	/// rejected; the base config is never modified.
	pub fn set(&self, name: &str, value: &str) -> Result {
		let item =
			Self::find(name).ok_or_else(|| err!(NotFound("no configuration item named {name}")))?;

		if value.parse::<u64>().is_err() {
			return Err(err!(Config("conf", "item {name} expects an integer, got {value:?}")));
		}

		self.overrides
			.write()
			.expect("config overrides")
			.insert(item.name, value.to_owned());

		Ok(())
	}

	pub fn items(&self) -> impl Iterator<Item = (&'static Item, String)> + '_ {
		ITEMS
			.iter()
			.map(|item| (item, self.item(item.name).expect("registered item")))
	}

	#[inline]
	#[must_use]
	pub fn event_max_size(&self) -> usize {
		self.integer_item("event.max_size", self.base.event_max_size)
	}

	#[inline]
	#[must_use]
	pub fn backfill_ids_limit_default(&self) -> usize {
		self.integer_item(
			"federation.backfill_ids.limit.default",
			self.base.backfill_ids_limit_default,
		)
	}

	#[inline]
	#[must_use]
	pub fn backfill_ids_limit_max(&self) -> usize {
		self.integer_item("federation.backfill_ids.limit.max", self.base.backfill_ids_limit_max)
	}

	#[inline]
	#[must_use]
	pub fn eval_inflight_max(&self) -> usize {
		self.integer_item("eval.inflight.max", self.base.eval_inflight_max)
	}

	fn integer_item(&self, name: &'static str, base: usize) -> usize {
		let Some(val) = self
			.overrides
			.read()
			.expect("config overrides")
			.get(name)
			.cloned()
		else {
			return base;
		};

		val.parse().unwrap_or_else(|e| {
			warn!("ignoring unparsable override for {name}: {e}");
			base
		})
	}

	fn base_value(&self, name: &str) -> String {
		match name {
			| "event.max_size" => self.base.event_max_size.to_string(),
			| "federation.backfill_ids.limit.default" =>
				self.base.backfill_ids_limit_default.to_string(),
			| "federation.backfill_ids.limit.max" =>
				self.base.backfill_ids_limit_max.to_string(),
			| "eval.inflight.max" => self.base.eval_inflight_max.to_string(),
			| _ => unreachable!("item registry covers every base value"),
		}
	}

	fn find(name: &str) -> Option<&'static Item> {
		ITEMS.iter().find(|item| item.name == name)
	}
}

impl Deref for Manager {
	type Target = Config;

	fn deref(&self) -> &Config { &self.base }
}
