//! Single-shot promise/future pair with an observable lifecycle.
//!
//! A value moves through PENDING -> READY -> OBSERVED. The promise is the
//! single writer; delivering to a consumer (an await or a `when_any`
//! selection) transitions READY to OBSERVED. Each future carries one
//! intrusive callback slot armed at most once; the first arming caller
//! wins. `when_all`/`when_any` are built on that slot without a heap
//! allocation per wakeup beyond the armed closure itself.

use std::{
	pin::Pin,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	task::{Context, Poll, Waker},
};

type Then = Box<dyn FnOnce() + Send + 'static>;

enum State<T> {
	Pending { waker: Option<Waker>, then: Option<Then> },
	Ready(T),
	Observed,
}

struct Shared<T> {
	state: Mutex<State<T>>,
}

pub struct Promise<T> {
	shared: Arc<Shared<T>>,
}

pub struct Future<T> {
	shared: Arc<Shared<T>>,
}

/// Create a connected promise/future pair in the PENDING state.
#[must_use]
pub fn promise<T>() -> (Promise<T>, Future<T>) {
	let shared = Arc::new(Shared {
		state: Mutex::new(State::Pending { waker: None, then: None }),
	});

	(Promise { shared: shared.clone() }, Future { shared })
}

impl<T> Promise<T> {
	/// Fulfill the promise. Consumes the promise: the transition out of
	/// PENDING is single-writer by construction.
	pub fn set(self, val: T) {
		let (waker, then) = {
			let mut state = self.shared.state.lock().expect("promise state");
			match std::mem::replace(&mut *state, State::Ready(val)) {
				| State::Pending { waker, then } => (waker, then),
				| _ => unreachable!("promise fulfilled twice"),
			}
		};

		// Run outside the lock; the callback may observe the future.
		if let Some(then) = then {
			then();
		}

		if let Some(waker) = waker {
			waker.wake();
		}
	}
}

impl<T> Future<T> {
	#[inline]
	#[must_use]
	pub fn is_pending(&self) -> bool {
		matches!(*self.shared.state.lock().expect("future state"), State::Pending { .. })
	}

	#[inline]
	#[must_use]
	pub fn is_ready(&self) -> bool {
		matches!(*self.shared.state.lock().expect("future state"), State::Ready(_))
	}

	#[inline]
	#[must_use]
	pub fn is_observed(&self) -> bool {
		matches!(*self.shared.state.lock().expect("future state"), State::Observed)
	}

	/// Take the value, transitioning READY to OBSERVED. NotFound-style
	/// None when still pending or already observed.
	#[must_use]
	pub fn try_take(&self) -> Option<T> {
		let mut state = self.shared.state.lock().expect("future state");
		match *state {
			| State::Ready(_) => match std::mem::replace(&mut *state, State::Observed) {
				| State::Ready(val) => Some(val),
				| _ => unreachable!(),
			},
			| _ => None,
		}
	}

	/// Mark READY as OBSERVED without taking the value.
	fn mark_observed(&self) {
		let mut state = self.shared.state.lock().expect("future state");
		if matches!(*state, State::Ready(_)) {
			*state = State::Observed;
		}
	}

	/// Arm the one-shot completion callback. If the future is no longer
	/// pending the callback runs immediately on this stack. If a callback
	/// is already armed the first caller wins and this one is dropped.
	fn set_then(&self, f: Then) {
		let run_now = {
			let mut state = self.shared.state.lock().expect("future state");
			match *state {
				| State::Pending { ref mut then, .. } => {
					if then.is_none() {
						*then = Some(f);
						None
					} else {
						None
					}
				},
				| _ => Some(f),
			}
		};

		if let Some(f) = run_now {
			f();
		}
	}
}

impl<T> std::future::Future for Future<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
		let mut state = self.shared.state.lock().expect("future state");
		match *state {
			| State::Ready(_) => match std::mem::replace(&mut *state, State::Observed) {
				| State::Ready(val) => Poll::Ready(val),
				| _ => unreachable!(),
			},
			| State::Pending { ref mut waker, .. } => {
				*waker = Some(cx.waker().clone());
				Poll::Pending
			},
			| State::Observed => panic!("single-shot future polled after observation"),
		}
	}
}

/// Future which becomes ready when every input has transitioned out of
/// PENDING. Short-circuits to ready when none are pending on entry.
pub fn when_all<T>(futures: &[Future<T>]) -> Future<()>
where
	T: Send + 'static,
{
	let (p, ret) = promise();

	let pending: Vec<_> = futures.iter().filter(|f| f.is_pending()).collect();
	if pending.is_empty() {
		p.set(());
		return ret;
	}

	let remaining = Arc::new(AtomicUsize::new(pending.len()));
	let p = Arc::new(Mutex::new(Some(p)));
	for fut in pending {
		let remaining = remaining.clone();
		let p = p.clone();
		fut.set_then(Box::new(move || {
			if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
				if let Some(p) = p.lock().expect("when_all promise").take() {
					p.set(());
				}
			}
		}));
	}

	ret
}

/// Future which becomes ready with the index of the first input to leave
/// PENDING; that input is marked OBSERVED and will be skipped by the next
/// invocation over the same collection. If an input is already READY on
/// entry it is selected immediately. If no input is pending (or ready)
/// the result is `futures.len()`.
pub fn when_any<T>(futures: &[Future<T>]) -> Future<usize>
where
	T: Send + 'static,
{
	let (p, ret) = promise();

	for (i, fut) in futures.iter().enumerate() {
		if fut.is_ready() {
			fut.mark_observed();
			p.set(i);
			return ret;
		}
	}

	let armed = futures.iter().filter(|f| f.is_pending()).count();
	if armed == 0 {
		p.set(futures.len());
		return ret;
	}

	let p = Arc::new(Mutex::new(Some(p)));
	for (i, fut) in futures.iter().enumerate() {
		if !fut.is_pending() {
			continue;
		}

		let p = p.clone();
		let shared = fut.shared.clone();
		fut.set_then(Box::new(move || {
			if let Some(p) = p.lock().expect("when_any promise").take() {
				let mut state = shared.state.lock().expect("future state");
				if matches!(*state, State::Ready(_)) {
					*state = State::Observed;
				}
				drop(state);
				p.set(i);
			}
		}));
	}

	ret
}

#[cfg(test)]
mod tests {
	use futures::executor::block_on;

	use super::{promise, when_all, when_any};

	#[test]
	fn fulfilled_before_await() {
		let (p, f) = promise();
		assert!(f.is_pending());

		p.set(42);
		assert!(f.is_ready());
		assert_eq!(block_on(f), 42);
	}

	#[test]
	fn take_marks_observed() {
		let (p, f) = promise();
		p.set("value");

		assert_eq!(f.try_take(), Some("value"));
		assert!(f.is_observed());
		assert_eq!(f.try_take(), None);
	}

	#[test]
	fn when_all_short_circuits() {
		let futures: Vec<super::Future<u8>> = (0..3)
			.map(|i| {
				let (p, f) = promise();
				p.set(i);
				f
			})
			.collect();

		let all = when_all(&futures);
		assert!(all.is_ready());
		block_on(all);
	}

	#[test]
	fn when_all_waits_for_every_input() {
		let (p0, f0) = promise();
		let (p1, f1) = promise();
		let (p2, f2) = promise();
		let futures = [f0, f1, f2];

		let all = when_all(&futures);
		assert!(all.is_pending());

		p1.set(1);
		assert!(all.is_pending());

		p0.set(0);
		assert!(all.is_pending());

		p2.set(2);
		assert!(all.is_ready());
		block_on(all);
	}

	#[test]
	fn when_any_eager_path() {
		let (_p0, f0) = promise::<u8>();
		let (p1, f1) = promise();
		p1.set(1);
		let futures = [f0, f1];

		let any = when_any(&futures);
		assert_eq!(block_on(any), 1);
		assert!(futures[1].is_observed());
		assert!(futures[0].is_pending());
	}

	#[test]
	fn when_any_armed_path() {
		let (p0, f0) = promise::<u8>();
		let (_p1, f1) = promise();
		let futures = [f0, f1];

		let any = when_any(&futures);
		assert!(any.is_pending());

		p0.set(0);
		assert_eq!(block_on(any), 0);
		assert!(futures[0].is_observed());
	}

	#[test]
	fn when_any_observes_exactly_one_per_call() {
		let mut promises = Vec::new();
		let futures: Vec<super::Future<u8>> = (0..4)
			.map(|_| {
				let (p, f) = promise();
				promises.push(p);
				f
			})
			.collect();

		for p in promises {
			p.set(0);
		}

		let mut seen = Vec::new();
		for _ in 0..4 {
			let i = block_on(when_any(&futures));
			assert!(i < futures.len());
			seen.push(i);
		}

		seen.sort_unstable();
		seen.dedup();
		assert_eq!(seen.len(), 4, "each call selects a distinct input");

		// All inputs observed; a further call indicates exhaustion.
		assert_eq!(block_on(when_any(&futures)), futures.len());
	}

	#[test]
	fn when_any_skips_observed() {
		let (p0, f0) = promise();
		let (p1, f1) = promise();
		p0.set(0);
		p1.set(1);
		let futures = [f0, f1];

		let first = block_on(when_any(&futures));
		let second = block_on(when_any(&futures));
		assert_ne!(first, second);
	}
}
