use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::{Error, Result, SignalId};

/// A follower callback. Returning an error aborts the notification pass
/// and hands the error back to whoever caused the change.
pub type Callback<T> = Rc<dyn Fn(&T) -> Result<()>>;

/// How a follower wants to hear about a signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowMode {
	/// Future changes only.
	#[default]
	Normal,
	/// The current value right away, then future changes.
	Immediate,
	/// The next change only, then the follower removes itself.
	Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct FollowerId(u64);

struct Follower<T> {
	id: FollowerId,
	once: bool,
	callback: Callback<T>,
}

impl<T> Clone for Follower<T> {
	fn clone(&self) -> Self {
		Follower {
			id: self.id,
			once: self.once,
			callback: self.callback.clone(),
		}
	}
}

/// Per-signal registry of followers.
///
/// The registry owns the activation flag: a signal is active from the
/// moment its first follower starts activating it until its last follower
/// leaves. Starting and stopping the actual source stays with the signal.
pub(crate) struct Followers<T> {
	signal: SignalId,
	list: RefCell<SmallVec<[Follower<T>; 2]>>,
	next_id: Cell<u64>,
	active: Cell<bool>,
	notifying: Cell<bool>,
}

struct Notifying<'a>(&'a Cell<bool>);

impl<'a> Notifying<'a> {
	fn enter(flag: &'a Cell<bool>) -> Self {
		flag.set(true);
		Notifying(flag)
	}
}

impl Drop for Notifying<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

/// An activation in progress. See [`Followers::start_activation`].
pub(crate) struct Activation<'a, T, F: FnMut()> {
	followers: &'a Followers<T>,
	rollback: F,
	armed: bool,
}

impl<T, F: FnMut()> Activation<'_, T, F> {
	pub fn complete(mut self) {
		self.armed = false;
	}
}

impl<T, F: FnMut()> Drop for Activation<'_, T, F> {
	fn drop(&mut self) {
		if self.armed {
			warn!(signal = %self.followers.signal, "activation rolled back");
			self.followers.abort_activation();
			(self.rollback)();
		}
	}
}

impl<T> Followers<T> {
	pub fn new(signal: SignalId) -> Self {
		Followers {
			signal,
			list: RefCell::new(SmallVec::new()),
			next_id: Cell::new(0),
			active: Cell::new(false),
			notifying: Cell::new(false),
		}
	}

	pub fn len(&self) -> usize {
		self.list.borrow().len()
	}

	pub fn is_active(&self) -> bool {
		self.active.get()
	}

	pub fn is_notifying(&self) -> bool {
		self.notifying.get()
	}

	pub fn contains(&self, id: FollowerId) -> bool {
		self.list.borrow().iter().any(|follower| follower.id == id)
	}

	/// Fails if a notification pass of this signal is on the stack.
	pub fn ensure_idle(&self) -> Result<()> {
		if self.notifying.get() {
			warn!(signal = %self.signal, "avoided recursive signalling");
			return Err(Error::RecursiveNotify(self.signal));
		}

		Ok(())
	}

	/// Returns `true` if the caller has to activate the signal.
	pub fn begin_activation(&self) -> bool {
		!self.active.replace(true)
	}

	pub fn abort_activation(&self) {
		if self.list.borrow().is_empty() {
			self.active.set(false);
		}
	}

	/// Like [`Followers::begin_activation`], but hands back a guard that
	/// undoes the activation and runs `rollback` unless it is completed.
	/// This also covers an activation that unwinds.
	pub fn start_activation<F: FnMut()>(&self, rollback: F) -> Option<Activation<'_, T, F>> {
		if !self.begin_activation() {
			return None;
		}

		Some(Activation {
			followers: self,
			rollback,
			armed: true,
		})
	}

	pub fn insert(&self, callback: Callback<T>, once: bool) -> FollowerId {
		let id = FollowerId(self.next_id.get());
		self.next_id.set(id.0 + 1);

		let mut list = self.list.borrow_mut();
		list.push(Follower { id, once, callback });
		trace!(signal = %self.signal, follower = id.0, followers = list.len(), "followed");

		id
	}

	/// Returns `true` if this removed the last follower and the caller has to
	/// deactivate the signal. Removing an unknown follower does nothing.
	pub fn remove(&self, id: FollowerId) -> bool {
		let mut list = self.list.borrow_mut();
		let Some(position) = list.iter().position(|follower| follower.id == id) else {
			return false;
		};

		list.remove(position);
		trace!(signal = %self.signal, follower = id.0, followers = list.len(), "unfollowed");

		list.is_empty() && self.active.replace(false)
	}

	/// Hand the current value to a single follower, as part of an immediate
	/// subscription.
	pub fn deliver(&self, callback: &Callback<T>, value: &T) -> Result<()> {
		self.ensure_idle()?;
		let _pass = Notifying::enter(&self.notifying);
		callback(value)
	}

	/// Deliver `value` to every follower in registration order.
	///
	/// The pass iterates over a snapshot: followers added during the pass
	/// wait for the next change, followers removed during the pass are
	/// skipped. The returned flag asks the caller to deactivate the signal,
	/// which happens when the pass consumed the last `Once` follower.
	pub fn notify(&self, value: &T) -> (Result<()>, bool) {
		if let Err(err) = self.ensure_idle() {
			return (Err(err), false);
		}

		let snapshot = self.list.borrow().clone();
		let mut consumed = false;

		let result = {
			let _pass = Notifying::enter(&self.notifying);
			snapshot.iter().try_for_each(|follower| {
				if follower.once {
					let mut list = self.list.borrow_mut();
					let Some(position) = list.iter().position(|f| f.id == follower.id) else {
						return Ok(());
					};
					list.remove(position);
					consumed = true;
				} else if !self.contains(follower.id) {
					return Ok(());
				}

				(follower.callback)(value)
			})
		};

		let deactivate = consumed && self.list.borrow().is_empty() && self.active.replace(false);
		(result, deactivate)
	}
}

/// Implemented by signal bodies so that a [`Subscription`] can find its way
/// back without knowing the value type.
pub(crate) trait Unfollow {
	fn unfollow(&self, id: FollowerId);
	fn is_following(&self, id: FollowerId) -> bool;
}

/// One follower registered on one signal.
///
/// Dropping the subscription unfollows. [`Subscription::unfollow`] does the
/// same explicitly and may be called any number of times.
#[must_use = "dropping a `Subscription` unfollows immediately"]
pub struct Subscription {
	source: Option<Weak<dyn Unfollow>>,
	id: FollowerId,
	signal: SignalId,
}

impl Subscription {
	pub(crate) fn new(source: Weak<dyn Unfollow>, id: FollowerId, signal: SignalId) -> Self {
		Subscription {
			source: Some(source),
			id,
			signal,
		}
	}

	/// The signal this subscription follows.
	pub fn signal(&self) -> SignalId {
		self.signal
	}

	/// Whether the follower is still registered. A `Once` follower stops
	/// being active after its first delivery.
	pub fn is_active(&self) -> bool {
		self.source
			.as_ref()
			.and_then(Weak::upgrade)
			.map_or(false, |source| source.is_following(self.id))
	}

	pub fn unfollow(&mut self) {
		if let Some(source) = self.source.take().and_then(|source| source.upgrade()) {
			source.unfollow(self.id);
		}
	}

	/// Keep the follower registered for as long as the signal lives.
	pub fn detach(mut self) {
		self.source = None;
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unfollow()
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("signal", &self.signal)
			.field("follower", &self.id.0)
			.field("attached", &self.source.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn recorder(log: &Rc<RefCell<Vec<(u8, i32)>>>, tag: u8) -> Callback<i32> {
		let log = log.clone();
		Rc::new(move |value: &i32| -> Result<()> {
			log.borrow_mut().push((tag, *value));
			Ok(())
		})
	}

	#[test]
	fn notifies_in_registration_order() {
		let followers = Followers::new(SignalId::next());
		let log = Rc::new(RefCell::new(Vec::new()));

		assert!(followers.begin_activation());
		followers.insert(recorder(&log, 1), false);
		assert!(!followers.begin_activation());
		followers.insert(recorder(&log, 2), false);

		let (result, deactivate) = followers.notify(&7);
		assert!(result.is_ok());
		assert!(!deactivate);
		assert_eq!(*log.borrow(), vec![(1, 7), (2, 7)]);
	}

	#[test]
	fn once_followers_are_consumed() {
		let followers = Followers::new(SignalId::next());
		let log = Rc::new(RefCell::new(Vec::new()));

		assert!(followers.begin_activation());
		let id = followers.insert(recorder(&log, 1), true);

		let (_, deactivate) = followers.notify(&1);
		assert!(deactivate);
		assert!(!followers.is_active());
		assert!(!followers.contains(id));

		let (_, deactivate) = followers.notify(&2);
		assert!(!deactivate);
		assert_eq!(*log.borrow(), vec![(1, 1)]);
	}

	#[test]
	fn removing_twice_deactivates_once() {
		let followers = Followers::new(SignalId::next());
		let log = Rc::new(RefCell::new(Vec::new()));

		followers.begin_activation();
		let id = followers.insert(recorder(&log, 1), false);

		assert!(followers.remove(id));
		assert!(!followers.remove(id));
		assert_eq!(followers.len(), 0);
	}

	#[test]
	fn unfinished_activation_is_rolled_back() {
		let followers = Followers::<i32>::new(SignalId::next());
		let rolled_back = Cell::new(0);

		let activation = followers.start_activation(|| rolled_back.set(rolled_back.get() + 1));
		assert!(activation.is_some());
		assert!(followers.is_active());
		drop(activation);
		assert!(!followers.is_active());
		assert_eq!(rolled_back.get(), 1);

		let activation = followers.start_activation(|| rolled_back.set(rolled_back.get() + 1));
		activation.unwrap().complete();
		assert!(followers.is_active());
		assert!(followers.start_activation(|| {}).is_none());
		assert_eq!(rolled_back.get(), 1);
	}

	#[test]
	fn follower_error_stops_the_pass() {
		let followers = Followers::new(SignalId::next());
		let log = Rc::new(RefCell::new(Vec::new()));
		let signal = SignalId::next();

		followers.begin_activation();
		followers.insert(
			Rc::new(move |_: &i32| -> Result<()> { Err(Error::Cycle(signal)) }),
			false,
		);
		followers.insert(recorder(&log, 2), false);

		let (result, _) = followers.notify(&1);
		assert_eq!(result, Err(Error::Cycle(signal)));
		assert!(log.borrow().is_empty());
		assert!(!followers.is_notifying());
	}
}
