use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

mod mock;

mod reaction;
mod scenarios;
mod tracker;

/// Route engine logs to the test output. Filtered by `RUST_LOG`.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_env_filter(EnvFilter::from_default_env())
		.try_init();
}

/// A follower that appends every delivered value to `log`.
pub fn record<T: Clone + 'static>(log: &Rc<RefCell<Vec<T>>>) -> impl Fn(&T) + 'static {
	let log = log.clone();
	move |value: &T| log.borrow_mut().push(value.clone())
}

pub fn log<T>() -> Rc<RefCell<Vec<T>>> {
	Rc::new(RefCell::new(Vec::new()))
}
