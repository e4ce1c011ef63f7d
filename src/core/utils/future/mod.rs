mod promise;

pub use promise::{Future, Promise, promise, when_all, when_any};
