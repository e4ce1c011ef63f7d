use std::{collections::BTreeMap, sync::Arc};

use crate::{Engine, Map};

/// Every column in the database. The `eventidx_*` group is the
/// column-sharded event field store, keyed by big-endian event_idx; one
/// column per schema field.
pub const MAPS: &[&'static str] = &[
	"eventid_eventidx",
	"eventidx_authevents",
	"eventidx_content",
	"eventidx_depth",
	"eventidx_eventid",
	"eventidx_hashes",
	"eventidx_membership",
	"eventidx_origin",
	"eventidx_originserverts",
	"eventidx_prevevents",
	"eventidx_prevstate",
	"eventidx_redacts",
	"eventidx_roomid",
	"eventidx_sender",
	"eventidx_signatures",
	"eventidx_statekey",
	"eventidx_stateroot",
	"eventidx_type",
	"global",
	"roomeventidx_eventid",
	"roomid_head",
	"roomid_stateroot",
	"server_signingkeys",
	"statenode",
];

pub(crate) fn open(engine: &Arc<Engine>) -> BTreeMap<&'static str, Arc<Map>> {
	MAPS.iter()
		.map(|name| (*name, Map::open(engine, name)))
		.collect()
}
