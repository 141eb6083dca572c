use std::cell::Ref;
use std::rc::Rc;

use crate::evaluation;
use crate::{Callback, Derived, FollowMode, Observable, Result, SignalId, Subscription, Value};

/// The typed side of a signal body. Implemented by [`Mutable`](crate::Mutable)
/// and [`Derived`] bodies and stored type-erased inside [`Value`].
pub trait Access<T>: Observable {
	/// Borrow the current value without recording a read. A derived signal
	/// that has no followers recomputes here.
	fn borrow_value(&self) -> Result<Ref<'_, T>>;

	/// Register a follower, activating the signal if it is the first one.
	fn follow_raw(self: Rc<Self>, mode: FollowMode, callback: Callback<T>) -> Result<Subscription>;

	fn follower_count(&self) -> usize;

	fn is_active(&self) -> bool;

	fn as_observable(self: Rc<Self>) -> Rc<dyn Observable>;
}

/// Read and follow access shared by every kind of signal.
///
/// The `try_*` methods surface engine errors; the plain forms panic with the
/// error message instead.
pub trait Signal<T: 'static> {
	fn source(&self) -> Rc<dyn Access<T>>;

	fn id(&self) -> SignalId {
		self.source().id()
	}

	fn version(&self) -> u64 {
		self.source().version()
	}

	fn follower_count(&self) -> usize {
		self.source().follower_count()
	}

	fn is_active(&self) -> bool {
		self.source().is_active()
	}

	/// The signal as a dependency handle, e.g. for
	/// [`Derived::with_dependencies`].
	fn observable(&self) -> Rc<dyn Observable> {
		self.source().as_observable()
	}

	/// Read the value, recording the signal as a dependency of the
	/// evaluation in progress.
	fn try_with<R>(&self, func: impl FnOnce(&T) -> R) -> Result<R> {
		let source = self.source();
		let value = source.borrow_value()?;
		evaluation::record(|| source.clone().as_observable());
		Ok(func(&value))
	}

	/// # Panics
	///
	/// If reading fails, see [`Signal::try_with`].
	fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		self.try_with(func).unwrap_or_else(|err| panic!("{err}"))
	}

	fn try_with_untracked<R>(&self, func: impl FnOnce(&T) -> R) -> Result<R> {
		let source = self.source();
		let value = source.borrow_value()?;
		Ok(func(&value))
	}

	fn with_untracked<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		self.try_with_untracked(func)
			.unwrap_or_else(|err| panic!("{err}"))
	}

	fn try_get(&self) -> Result<T>
	where
		T: Clone,
	{
		self.try_with(T::clone)
	}

	fn get(&self) -> T
	where
		T: Clone,
	{
		self.with(T::clone)
	}

	fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		self.with_untracked(T::clone)
	}

	/// Register a follower whose errors propagate to the writer that caused
	/// the change.
	fn subscribe(
		&self,
		mode: FollowMode,
		callback: impl Fn(&T) -> Result<()> + 'static,
	) -> Result<Subscription> {
		self.source().follow_raw(mode, Rc::new(callback))
	}

	/// # Panics
	///
	/// If activating the signal or the immediate delivery fails.
	fn follow_with(&self, mode: FollowMode, callback: impl Fn(&T) + 'static) -> Subscription {
		self.subscribe(mode, move |value| {
			callback(value);
			Ok(())
		})
		.unwrap_or_else(|err| panic!("{err}"))
	}

	/// Follow future changes.
	fn follow(&self, callback: impl Fn(&T) + 'static) -> Subscription {
		self.follow_with(FollowMode::Normal, callback)
	}

	/// A derived signal computing `func` from this one. The dependency is
	/// static: nothing `func` reads is tracked.
	fn map<R, F>(&self, func: F) -> Derived<R>
	where
		F: Fn(&T) -> R + 'static,
		R: PartialEq + 'static,
	{
		let source = Value::from_source(self.source());
		Derived::with_dependencies([source.observable()], move || source.with_untracked(&func))
	}
}
