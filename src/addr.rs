use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

/// Keys an `Rc` by the address of its allocation.
///
/// Comparison uses the thin data pointer only, so two handles to the same
/// node compare equal even if they were coerced through different vtables.
pub struct RcAddr<T: ?Sized> {
	ptr: Rc<T>,
}

impl<T: ?Sized> RcAddr<T> {
	pub fn new(ptr: Rc<T>) -> Self {
		RcAddr { ptr }
	}

	fn addr(&self) -> *const () {
		Rc::as_ptr(&self.ptr) as *const ()
	}
}

impl<T: ?Sized> Deref for RcAddr<T> {
	type Target = Rc<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for RcAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl<T: ?Sized> Eq for RcAddr<T> {}

impl<T: ?Sized> Hash for RcAddr<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state)
	}
}
