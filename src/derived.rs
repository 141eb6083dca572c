use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::dependencies::Dependencies;
use crate::evaluation::{self, Read, Tracking};
use crate::followers::{FollowerId, Followers, Unfollow};
use crate::signal::Access;
use crate::{Callback, Error, FollowMode, Observable, Result, Signal, SignalId, Subscription, Value};

/// How many evaluations one recompute may run before the signal is
/// considered to be feeding itself.
pub const MAX_SETTLE_PASSES: usize = 64;

thread_local! {
	static BY_FN: RefCell<FxHashMap<(usize, TypeId), Weak<dyn Any>>> =
		RefCell::new(FxHashMap::default());
}

/// A signal computed from other signals.
///
/// While it has followers the signal keeps subscriptions to exactly the
/// signals its last evaluation read, recomputes when one of them changes and
/// notifies its own followers only when the result differs. Reads between
/// changes are served from the cached value. Without followers it holds no
/// subscriptions and every read evaluates afresh.
pub struct Derived<T> {
	body: Rc<DerivedBody<T>>,
}

enum DependencyMode {
	Dynamic,
	Static(Vec<Rc<dyn Observable>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Idle,
	/// Recomputing on behalf of followers, between evaluations.
	Settling,
	/// The derive function is running.
	Evaluating,
}

struct PhaseGuard<'a> {
	cell: &'a Cell<Phase>,
	prev: Phase,
}

impl<'a> PhaseGuard<'a> {
	fn enter(cell: &'a Cell<Phase>, phase: Phase) -> Self {
		let prev = cell.replace(phase);
		PhaseGuard { cell, prev }
	}
}

impl Drop for PhaseGuard<'_> {
	fn drop(&mut self) {
		self.cell.set(self.prev);
	}
}

pub struct DerivedBody<T> {
	id: SignalId,
	func: Box<dyn Fn() -> T>,
	mode: DependencyMode,
	value: RefCell<Option<T>>,
	version: Cell<u64>,
	followers: Followers<T>,
	dependencies: RefCell<Dependencies>,
	phase: Cell<Phase>,
	stale: Cell<bool>,
	this: Weak<DerivedBody<T>>,
}

impl<T> Clone for Derived<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Derived<T>
where
	T: PartialEq + 'static,
{
	/// A derived signal that discovers its dependencies on every evaluation.
	pub fn new(func: impl Fn() -> T + 'static) -> Self {
		Self::build(Box::new(func), DependencyMode::Dynamic)
	}

	/// A derived signal bound to a fixed list of dependencies. Any change of
	/// any of them recomputes it; reads inside `func` are not tracked.
	pub fn with_dependencies<I>(dependencies: I, func: impl Fn() -> T + 'static) -> Self
	where
		I: IntoIterator<Item = Rc<dyn Observable>>,
	{
		let dependencies = dependencies.into_iter().collect();
		Self::build(Box::new(func), DependencyMode::Static(dependencies))
	}

	/// Like [`Derived::new`], but calling it twice with the same function
	/// returns the same signal for as long as that signal is alive.
	pub fn from_fn(func: fn() -> T) -> Self {
		let key = (func as usize, TypeId::of::<T>());

		let cached = BY_FN.with(|cache| {
			cache
				.borrow()
				.get(&key)
				.and_then(Weak::upgrade)
				.and_then(|body| Rc::downcast::<DerivedBody<T>>(body).ok())
		});

		if let Some(body) = cached {
			trace!(signal = %body.id, "derived signal reused by function identity");
			return Derived { body };
		}

		let derived = Self::new(func);
		BY_FN.with(|cache| {
			let mut cache = cache.borrow_mut();
			cache.retain(|_, body| body.strong_count() > 0);
			let body = Rc::downgrade(&derived.body) as Weak<dyn Any>;
			cache.insert(key, body);
		});

		derived
	}

	fn build(func: Box<dyn Fn() -> T>, mode: DependencyMode) -> Self {
		let id = SignalId::next();
		Derived {
			body: Rc::new_cyclic(|this| DerivedBody {
				id,
				func,
				mode,
				value: RefCell::new(None),
				version: Cell::new(0),
				followers: Followers::new(id),
				dependencies: RefCell::new(Dependencies::new()),
				phase: Cell::new(Phase::Idle),
				stale: Cell::new(false),
				this: this.clone(),
			}),
		}
	}

	/// Number of live upstream subscriptions. Zero while inactive.
	pub fn dependency_count(&self) -> usize {
		self.body.dependencies.borrow().len()
	}

	pub fn ptr_eq(&self, other: &Derived<T>) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl<T> DerivedBody<T>
where
	T: PartialEq + 'static,
{
	fn evaluate(&self) -> (T, Vec<Read>) {
		let _phase = PhaseGuard::enter(&self.phase, Phase::Evaluating);
		match self.mode {
			DependencyMode::Dynamic => {
				let scope = Tracking::enter(Some(self.id), false);
				let value = (self.func)();
				(value, scope.finish())
			}
			DependencyMode::Static(_) => {
				let _scope = Tracking::enter(Some(self.id), true);
				((self.func)(), Vec::new())
			}
		}
	}

	/// Returns whether the cached value changed.
	fn store(&self, value: T) -> bool {
		let mut current = self.value.borrow_mut();
		if current.as_ref() == Some(&value) {
			return false;
		}

		*current = Some(value);
		self.version.set(self.version.get() + 1);
		true
	}

	/// Make sure the cached value can be served to a reader.
	fn refresh(&self) -> Result<()> {
		match self.phase.get() {
			Phase::Evaluating => {
				if evaluation::current_owner() != Some(self.id) {
					warn!(signal = %self.id, "derived signal read while it was being evaluated");
					return Err(Error::Cycle(self.id));
				}

				// Reading itself: served from the previous value, dropped from
				// the dependency set afterwards.
				if self.value.borrow().is_none() {
					return Err(Error::SelfReadBeforeInit(self.id));
				}

				Ok(())
			}
			Phase::Settling => {
				if self.value.borrow().is_none() {
					warn!(signal = %self.id, "derived signal read while activating");
					return Err(Error::Cycle(self.id));
				}

				Ok(())
			}
			Phase::Idle => {
				let live = self.followers.is_active() || self.followers.is_notifying();
				if live && self.value.borrow().is_some() {
					return Ok(());
				}

				// An outer read of this signal is still holding the value it
				// just computed.
				if self.value.try_borrow_mut().is_err() {
					return Ok(());
				}

				trace!(signal = %self.id, "evaluating inactive derived signal");
				let (value, _) = self.evaluate();
				self.store(value);
				Ok(())
			}
		}
	}

	/// Evaluate until neither a dependency notification nor a version
	/// mismatch asks for another pass. Returns whether the value changed.
	fn settle(&self) -> Result<bool> {
		let _phase = PhaseGuard::enter(&self.phase, Phase::Settling);
		let before = self.version.get();

		for pass in 0..MAX_SETTLE_PASSES {
			self.stale.set(false);

			let (value, reads) = self.evaluate();
			self.store(value);

			let valid = match self.mode {
				DependencyMode::Dynamic => {
					self.resubscribe(reads)?;
					self.dependencies.borrow().are_valid()
				}
				DependencyMode::Static(_) => true,
			};

			if valid && !self.stale.get() {
				return Ok(self.version.get() != before);
			}

			trace!(signal = %self.id, pass, "derived signal unsettled, evaluating again");
		}

		warn!(signal = %self.id, passes = MAX_SETTLE_PASSES, "derived signal never settled");
		Err(Error::Cycle(self.id))
	}

	fn resubscribe(&self, reads: Vec<Read>) -> Result<()> {
		let mut dependencies = self.dependencies.borrow_mut().take();
		let this = self.this.clone();

		let result = dependencies.swap(reads, |observable| {
			let this = this.clone();
			observable.clone().observe(Rc::new(move || match this.upgrade() {
				Some(body) => body.dependency_changed(),
				None => Ok(()),
			}))
		});

		if let Ok(diff) = &result {
			if !diff.is_empty() {
				debug!(
					signal = %self.id,
					added = diff.added,
					removed = diff.removed,
					kept = diff.kept,
					"dependencies changed"
				);
			}
		}

		// Deactivated while following the new set: let the subscriptions go.
		if self.followers.is_active() {
			*self.dependencies.borrow_mut() = dependencies;
		}

		result.map(drop)
	}

	fn dependency_changed(&self) -> Result<()> {
		match self.phase.get() {
			Phase::Settling => {
				self.stale.set(true);
				return Ok(());
			}
			Phase::Evaluating => {
				warn!(signal = %self.id, "dependency changed by its own derive function");
				return Err(Error::Cycle(self.id));
			}
			Phase::Idle => {}
		}

		if !self.followers.is_active() {
			return Ok(());
		}

		self.followers.ensure_idle()?;
		debug!(signal = %self.id, "recomputing");

		if self.settle()? {
			self.notify()
		} else {
			Ok(())
		}
	}

	fn notify(&self) -> Result<()> {
		let Ok(value) = Ref::filter_map(self.value.borrow(), Option::as_ref) else {
			return Ok(());
		};

		let (result, deactivate) = self.followers.notify(&value);
		std::mem::drop(value);

		if deactivate {
			self.deactivate();
		}

		result
	}

	fn activate(&self) -> Result<()> {
		debug!(signal = %self.id, "activating");
		match &self.mode {
			DependencyMode::Dynamic => self.settle().map(drop),
			DependencyMode::Static(list) => {
				let _phase = PhaseGuard::enter(&self.phase, Phase::Settling);
				let reads = list.iter().cloned().map(Read::current).collect();
				self.resubscribe(reads)?;

				let (value, _) = self.evaluate();
				self.store(value);
				Ok(())
			}
		}
	}

	fn deactivate(&self) {
		debug!(signal = %self.id, "deactivating");
		let dependencies = self.dependencies.borrow_mut().take();
		std::mem::drop(dependencies);
	}
}

impl<T> Unfollow for DerivedBody<T>
where
	T: PartialEq + 'static,
{
	fn unfollow(&self, id: FollowerId) {
		if self.followers.remove(id) {
			self.deactivate();
		}
	}

	fn is_following(&self, id: FollowerId) -> bool {
		self.followers.contains(id)
	}
}

impl<T> Observable for DerivedBody<T>
where
	T: PartialEq + 'static,
{
	fn id(&self) -> SignalId {
		self.id
	}

	fn version(&self) -> u64 {
		self.version.get()
	}

	fn observe(self: Rc<Self>, on_change: Rc<dyn Fn() -> Result<()>>) -> Result<Subscription> {
		self.follow_raw(FollowMode::Normal, Rc::new(move |_: &T| on_change()))
	}
}

impl<T> Access<T> for DerivedBody<T>
where
	T: PartialEq + 'static,
{
	fn borrow_value(&self) -> Result<Ref<'_, T>> {
		self.refresh()?;
		Ref::filter_map(self.value.borrow(), Option::as_ref)
			.map_err(|_| Error::SelfReadBeforeInit(self.id))
	}

	fn follow_raw(self: Rc<Self>, mode: FollowMode, callback: Callback<T>) -> Result<Subscription> {
		if let Some(activation) = self.followers.start_activation(|| self.deactivate()) {
			self.activate()?;
			activation.complete();
		}

		let id = self
			.followers
			.insert(callback.clone(), mode == FollowMode::Once);
		let source = Rc::downgrade(&self) as Weak<dyn Unfollow>;
		let subscription = Subscription::new(source, id, self.id);

		if mode == FollowMode::Immediate {
			let value = self.borrow_value()?;
			self.followers.deliver(&callback, &value)?;
		}

		Ok(subscription)
	}

	fn follower_count(&self) -> usize {
		self.followers.len()
	}

	fn is_active(&self) -> bool {
		self.followers.is_active()
	}

	fn as_observable(self: Rc<Self>) -> Rc<dyn Observable> {
		self
	}
}

impl<T> Signal<T> for Derived<T>
where
	T: PartialEq + 'static,
{
	fn source(&self) -> Rc<dyn Access<T>> {
		self.body.clone()
	}
}

impl<T> From<Derived<T>> for Value<T>
where
	T: PartialEq + 'static,
{
	fn from(derived: Derived<T>) -> Self {
		Value::from_source(derived.body)
	}
}

impl<T> Debug for Derived<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut debug = f.debug_struct("Derived");
		debug.field("id", &self.body.id);
		match self.body.value.try_borrow() {
			Ok(value) => debug.field("cached", &*value),
			Err(_) => debug.field("cached", &"<borrowed>"),
		};
		debug
			.field("followers", &self.body.followers.len())
			.field("dependencies", &self.body.dependencies.borrow().len())
			.finish()
	}
}
