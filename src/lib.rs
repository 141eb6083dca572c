//! Push-based reactive signals with automatic dependency tracking.
//!
//! A [`Mutable`] holds a value and pushes every real change to its
//! followers. A [`Derived`] computes its value from other signals; the
//! signals it reads while computing become its dependencies, and that set is
//! re-derived on every recomputation. Signals are lazy: a signal with no
//! followers holds no live upstream subscriptions and no running source.
//!
//! ```
//! use signal_graph::{Derived, Mutable, Signal};
//!
//! let count = Mutable::new(0);
//! let doubled = Derived::new({
//! 	let count = count.clone();
//! 	move || count.get() * 2
//! });
//!
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let _subscription = doubled.follow({
//! 	let seen = seen.clone();
//! 	move |value| seen.borrow_mut().push(*value)
//! });
//!
//! count.set(1);
//! count.set(1);
//! count.set(3);
//! assert_eq!(*seen.borrow(), vec![2, 6]);
//! ```
//!
//! Everything is single-threaded: nodes are `Rc`-shared and the tracking
//! stack is thread-local.

pub mod macros;

mod addr;
mod dependencies;
mod derived;
mod error;
pub mod evaluation;
mod followers;
mod mutable;
mod reaction;
mod signal;
mod value;

use std::fmt::Display;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use dependencies::{Dependencies, Diff};
pub use derived::{Derived, MAX_SETTLE_PASSES};
pub use error::{Error, Result};
pub use evaluation::{is_tracking, track, untracked, Read, Tracking};
pub use followers::{Callback, FollowMode, Subscription};
pub use mutable::{Cleanup, Mutable, Setter};
pub use reaction::Reaction;
pub use signal::{Access, Signal};
pub use value::Value;

/// A reactive node seen without its value type.
///
/// This is what dependency tracking records and what a derived signal
/// subscribes to.
pub trait Observable: 'static {
	fn id(&self) -> SignalId;

	/// Bumped every time the node delivers a change to its followers.
	fn version(&self) -> u64;

	/// Follow the node without looking at its value.
	fn observe(self: Rc<Self>, on_change: Rc<dyn Fn() -> Result<()>>) -> Result<Subscription>;
}

/// Process-unique signal identity, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
	pub(crate) fn next() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(0);
		SignalId(COUNTER.fetch_add(1, Ordering::Relaxed))
	}

	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl Display for SignalId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "signal#{}", self.0)
	}
}
