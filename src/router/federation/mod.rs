pub(crate) mod backfill_ids;
pub(crate) mod send_join;
pub(crate) mod version;
