pub mod bytes;
pub mod future;
pub mod mutex_map;
pub mod result;
pub mod time;

pub use ::lattice_macros::implement;

pub use self::{
	bytes::{u64_from_be, u64_from_le, u64_to_be, u64_to_le},
	future::{Future, Promise, when_all, when_any},
	mutex_map::{Guard as MutexMapGuard, MutexMap},
	time::{backoff_delay, now_millis},
};

#[inline]
pub fn exchange<T>(state: &mut T, source: T) -> T { std::mem::replace(state, source) }
