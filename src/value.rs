use std::fmt::Debug;
use std::rc::Rc;

use crate::{Access, Signal};

/// A signal of any kind behind one type.
///
/// Binding layers hold a `Value<T>` when they do not care whether the value
/// is set directly or derived.
pub struct Value<T> {
	source: Rc<dyn Access<T>>,
}

impl<T> Clone for Value<T> {
	fn clone(&self) -> Self {
		Value {
			source: self.source.clone(),
		}
	}
}

impl<T> Value<T>
where
	T: 'static,
{
	pub fn from_source(source: Rc<dyn Access<T>>) -> Self {
		Value { source }
	}

	pub fn ptr_eq(&self, other: &Value<T>) -> bool {
		Rc::ptr_eq(&self.source, &other.source)
	}
}

impl<T: 'static> Signal<T> for Value<T> {
	fn source(&self) -> Rc<dyn Access<T>> {
		self.source.clone()
	}
}

impl<T> Debug for Value<T>
where
	T: Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut debug = f.debug_struct("Value");
		debug.field("id", &self.source.id());
		match self.source.borrow_value() {
			Ok(value) => debug.field("value", &*value),
			Err(err) => debug.field("error", &err),
		};
		debug.finish()
	}
}
