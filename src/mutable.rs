use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::followers::{FollowerId, Followers, Unfollow};
use crate::signal::Access;
use crate::{Callback, FollowMode, Observable, Result, Signal, SignalId, Subscription, Value};

/// A signal whose value is set directly.
///
/// An optional starter feeds the signal from an external source while it
/// has followers: it runs when the first follower arrives and the
/// [`Cleanup`] it returns runs when the last one leaves.
pub struct Mutable<T> {
	body: Rc<MutableBody<T>>,
}

pub struct MutableBody<T> {
	id: SignalId,
	value: RefCell<T>,
	version: Cell<u64>,
	followers: Followers<T>,
	starter: Option<Box<dyn Fn(Setter<T>) -> Cleanup>>,
	cleanup: RefCell<Cleanup>,
	this: Weak<MutableBody<T>>,
}

/// Deactivation hook returned by a starter.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
	pub fn none() -> Self {
		Cleanup(None)
	}

	pub fn new(func: impl FnOnce() + 'static) -> Self {
		Cleanup(Some(Box::new(func)))
	}

	fn run(self) {
		if let Some(func) = self.0 {
			func()
		}
	}
}

/// Write handle given to starters. It does not keep the signal alive.
pub struct Setter<T> {
	body: Weak<MutableBody<T>>,
}

impl<T> Clone for Setter<T> {
	fn clone(&self) -> Self {
		Setter {
			body: self.body.clone(),
		}
	}
}

impl<T> Clone for Mutable<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for Mutable<T>
where
	T: Default + 'static,
{
	fn default() -> Self {
		Mutable::new(Default::default())
	}
}

impl<T> Mutable<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self {
		Self::build(value, None)
	}

	/// A signal fed by `starter` while it has followers.
	///
	/// Values the starter sets synchronously are visible to reads and to
	/// `Immediate` followers, but are not reported as a change to the
	/// follower whose arrival started the source.
	pub fn with_starter(value: T, starter: impl Fn(Setter<T>) -> Cleanup + 'static) -> Self {
		Self::build(value, Some(Box::new(starter)))
	}

	fn build(value: T, starter: Option<Box<dyn Fn(Setter<T>) -> Cleanup>>) -> Self {
		let id = SignalId::next();
		Mutable {
			body: Rc::new_cyclic(|this| MutableBody {
				id,
				value: RefCell::new(value),
				version: Cell::new(0),
				followers: Followers::new(id),
				starter,
				cleanup: RefCell::new(Cleanup::none()),
				this: this.clone(),
			}),
		}
	}

	pub fn setter(&self) -> Setter<T> {
		Setter {
			body: self.body.this.clone(),
		}
	}

	pub fn ptr_eq(&self, other: &Mutable<T>) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	/// Store `value` and notify followers if it differs from the current
	/// one.
	pub fn try_set(&self, value: T) -> Result<()>
	where
		T: PartialEq,
	{
		self.body.try_replace(value).map(drop)
	}

	/// # Panics
	///
	/// When called from inside this signal's own notification pass.
	pub fn set(&self, value: T)
	where
		T: PartialEq,
	{
		self.try_set(value).unwrap_or_else(|err| panic!("{err}"))
	}

	/// Like [`Mutable::set`], returning the previous value. An equal value
	/// is handed back untouched.
	pub fn replace(&self, value: T) -> T
	where
		T: PartialEq,
	{
		self.body
			.try_replace(value)
			.unwrap_or_else(|err| panic!("{err}"))
	}

	/// Mutate the value in place and notify followers unconditionally.
	pub fn try_update(&self, func: impl FnOnce(&mut T)) -> Result<()> {
		self.body.try_update(func)
	}

	pub fn update(&self, func: impl FnOnce(&mut T)) {
		self.try_update(func).unwrap_or_else(|err| panic!("{err}"))
	}

	/// Re-deliver the current value to every follower.
	pub fn try_ping(&self) -> Result<()> {
		self.body.try_ping()
	}

	pub fn ping(&self) {
		self.try_ping().unwrap_or_else(|err| panic!("{err}"))
	}
}

impl<T> MutableBody<T>
where
	T: 'static,
{
	fn try_replace(&self, value: T) -> Result<T>
	where
		T: PartialEq,
	{
		self.followers.ensure_idle()?;

		let old = {
			let mut current = self.value.borrow_mut();
			if *current == value {
				return Ok(value);
			}
			std::mem::replace(&mut *current, value)
		};

		self.notify()?;
		Ok(old)
	}

	fn try_update(&self, func: impl FnOnce(&mut T)) -> Result<()> {
		self.followers.ensure_idle()?;
		func(&mut *self.value.borrow_mut());
		self.notify()
	}

	fn try_ping(&self) -> Result<()> {
		self.followers.ensure_idle()?;
		self.notify()
	}

	fn notify(&self) -> Result<()> {
		self.version.set(self.version.get() + 1);

		let value = self.value.borrow();
		let (result, deactivate) = self.followers.notify(&value);
		std::mem::drop(value);

		if deactivate {
			self.deactivate();
		}

		result
	}

	fn activate(&self) {
		if let Some(starter) = &self.starter {
			debug!(signal = %self.id, "starting source");
			let cleanup = starter(Setter {
				body: self.this.clone(),
			});
			*self.cleanup.borrow_mut() = cleanup;
		}
	}

	fn deactivate(&self) {
		let cleanup = std::mem::take(&mut *self.cleanup.borrow_mut());
		if self.starter.is_some() {
			debug!(signal = %self.id, "stopping source");
		}
		cleanup.run();
	}
}

impl<T> Setter<T>
where
	T: PartialEq + 'static,
{
	/// Does nothing once the signal is gone.
	pub fn try_set(&self, value: T) -> Result<()> {
		match self.body.upgrade() {
			Some(body) => body.try_replace(value).map(drop),
			None => Ok(()),
		}
	}

	pub fn set(&self, value: T) {
		self.try_set(value).unwrap_or_else(|err| panic!("{err}"))
	}

	pub fn update(&self, func: impl FnOnce(&mut T)) {
		if let Some(body) = self.body.upgrade() {
			body.try_update(func).unwrap_or_else(|err| panic!("{err}"))
		}
	}
}

impl<T: 'static> Unfollow for MutableBody<T> {
	fn unfollow(&self, id: FollowerId) {
		if self.followers.remove(id) {
			self.deactivate();
		}
	}

	fn is_following(&self, id: FollowerId) -> bool {
		self.followers.contains(id)
	}
}

impl<T: 'static> Observable for MutableBody<T> {
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

impl<T: 'static> Access<T> for MutableBody<T> {
	fn borrow_value(&self) -> Result<Ref<'_, T>> {
		Ok(self.value.borrow())
	}

	fn follow_raw(self: Rc<Self>, mode: FollowMode, callback: Callback<T>) -> Result<Subscription> {
		if let Some(activation) = self.followers.start_activation(|| self.deactivate()) {
			self.activate();
			activation.complete();
		}

		let id = self
			.followers
			.insert(callback.clone(), mode == FollowMode::Once);
		let source = Rc::downgrade(&self) as Weak<dyn Unfollow>;
		let subscription = Subscription::new(source, id, self.id);

		if mode == FollowMode::Immediate {
			let value = self.value.borrow();
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

impl<T: 'static> Signal<T> for Mutable<T> {
	fn source(&self) -> Rc<dyn Access<T>> {
		self.body.clone()
	}
}

impl<T: 'static> From<Mutable<T>> for Value<T> {
	fn from(mutable: Mutable<T>) -> Self {
		Value::from_source(mutable.body)
	}
}

impl<T> Debug for Mutable<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut debug = f.debug_struct("Mutable");
		debug.field("id", &self.body.id);
		match self.body.value.try_borrow() {
			Ok(value) => debug.field("value", &*value),
			Err(_) => debug.field("value", &"<borrowed>"),
		};
		debug.field("followers", &self.body.followers.len()).finish()
	}
}
