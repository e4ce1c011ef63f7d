pub mod auth;
pub mod canonical;
pub mod event;
pub mod state;

pub use event::Event;

/// Dense local event sequence number, assigned monotonically on first
/// admission. Zero means "absent": no event has index 0.
pub type EventIdx = u64;

/// Tuned state-key string. Most state keys are empty or a user mxid;
/// either fits inline.
pub type StateKey = smallstr::SmallString<[u8; 48]>;
