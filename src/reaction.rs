use tracing::debug;

use crate::{Derived, FollowMode, Result, Signal, SignalId, Subscription};

/// Runs a closure now and again whenever a signal it read changes.
///
/// The closure is tracked like a derive function, so the set of signals it
/// reacts to is whatever it read on its last run. Dropping the reaction (or
/// calling [`Reaction::dispose`]) stops it and releases those signals.
pub struct Reaction {
	subscription: Subscription,
	node: Derived<()>,
}

impl Reaction {
	/// # Panics
	///
	/// If the first run fails, see [`Reaction::try_new`].
	#[must_use = "the reaction stops as soon as it is dropped"]
	pub fn new(func: impl Fn() + 'static) -> Self {
		Self::try_new(func).unwrap_or_else(|err| panic!("{err}"))
	}

	/// Run `func` once and keep it following what it read.
	pub fn try_new(func: impl Fn() + 'static) -> Result<Self> {
		let node = Derived::new(func);
		// The node's value is always `()`, so this follower is never called;
		// it only keeps the node active.
		let subscription = node.subscribe(FollowMode::Normal, |_| Ok(()))?;
		debug!(signal = %node.id(), "reaction started");

		Ok(Reaction { subscription, node })
	}

	pub fn id(&self) -> SignalId {
		self.node.id()
	}

	/// Number of signals the last run read.
	pub fn dependency_count(&self) -> usize {
		self.node.dependency_count()
	}

	pub fn is_active(&self) -> bool {
		self.subscription.is_active()
	}

	pub fn dispose(mut self) {
		self.subscription.unfollow();
		debug!(signal = %self.node.id(), "reaction disposed");
	}
}

impl std::fmt::Debug for Reaction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reaction")
			.field("id", &self.node.id())
			.field("dependencies", &self.dependency_count())
			.finish()
	}
}
