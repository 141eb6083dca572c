//! Dependency tracking.
//!
//! Each thread owns a stack of evaluation scopes. A derived signal pushes a
//! scope before running its derive function and pops it afterwards; every
//! tracked read in between lands in the scope on top of the stack, and only
//! there. Nested derived signals push their own scope, so their reads never
//! leak outwards, while the read of the nested signal itself is recorded by
//! the outer scope.
//!
//! Evaluation is synchronous from start to finish. Nothing here survives an
//! `.await` in the middle of a scope.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use fxhash::FxHashSet;
use tracing::trace;

use crate::{Observable, SignalId};

thread_local! {
	static STACK: RefCell<Vec<Evaluation>> = RefCell::new(Vec::new());
}

/// A node read inside a tracking scope, together with the version it had
/// when it was read.
#[derive(Clone)]
pub struct Read {
	observable: Rc<dyn Observable>,
	version: u64,
}

impl Read {
	pub(crate) fn current(observable: Rc<dyn Observable>) -> Self {
		let version = observable.version();
		Read {
			observable,
			version,
		}
	}

	pub fn observable(&self) -> &Rc<dyn Observable> {
		&self.observable
	}

	pub fn id(&self) -> SignalId {
		self.observable.id()
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn into_observable(self) -> Rc<dyn Observable> {
		self.observable
	}
}

impl Debug for Read {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Read")
			.field("signal", &self.observable.id())
			.field("version", &self.version)
			.finish()
	}
}

struct Evaluation {
	owner: Option<SignalId>,
	paused: bool,
	reads: Vec<Read>,
	seen: FxHashSet<*const ()>,
}

impl Evaluation {
	fn record(&mut self, observable: Rc<dyn Observable>) {
		if self.paused {
			return;
		}

		// The first read wins: if the node changes later in the same
		// evaluation the recorded version is stale and the owner re-runs.
		let addr = Rc::as_ptr(&observable) as *const ();
		if self.seen.insert(addr) {
			self.reads.push(Read::current(observable));
		}
	}

	fn into_reads(self) -> Vec<Read> {
		let Evaluation {
			owner, mut reads, ..
		} = self;

		if let Some(owner) = owner {
			reads.retain(|read| read.id() != owner);
		}

		reads
	}
}

/// Guard for one tracking scope.
///
/// The scope is popped by [`Tracking::finish`] or, if the evaluation
/// unwinds, when the guard is dropped.
#[must_use = "the scope is closed as soon as the guard is dropped"]
pub struct Tracking {
	depth: usize,
	done: bool,
}

impl Tracking {
	/// Open a fresh scope on top of the stack.
	pub fn begin() -> Self {
		Self::enter(None, false)
	}

	pub(crate) fn enter(owner: Option<SignalId>, paused: bool) -> Self {
		let depth = STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			stack.push(Evaluation {
				owner,
				paused,
				reads: Vec::new(),
				seen: FxHashSet::default(),
			});
			stack.len()
		});

		trace!(depth, paused, "tracking scope entered");
		Tracking { depth, done: false }
	}

	/// Close the scope and return everything read inside it, in read order,
	/// without duplicates and without the owner itself.
	pub fn finish(mut self) -> Vec<Read> {
		self.done = true;
		let evaluation = STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			debug_assert_eq!(stack.len(), self.depth, "tracking scopes closed out of order");
			stack.pop()
		});

		trace!(depth = self.depth, "tracking scope finished");
		evaluation.map(Evaluation::into_reads).unwrap_or_default()
	}
}

impl Drop for Tracking {
	fn drop(&mut self) {
		if !self.done {
			STACK.with(|stack| stack.borrow_mut().pop());
			trace!(depth = self.depth, "tracking scope abandoned");
		}
	}
}

/// Record a read in the scope on top of the stack, if any.
///
/// The node is only materialised when something is listening.
pub(crate) fn record(observable: impl FnOnce() -> Rc<dyn Observable>) {
	if !is_tracking() {
		return;
	}

	let observable = observable();
	STACK.with(|stack| {
		if let Some(top) = stack.borrow_mut().last_mut() {
			top.record(observable);
		}
	});
}

/// The derived signal whose derive function is currently on top of the
/// stack.
pub(crate) fn current_owner() -> Option<SignalId> {
	STACK.with(|stack| stack.borrow().last().and_then(|top| top.owner))
}

/// Whether a read right now would be recorded.
pub fn is_tracking() -> bool {
	STACK.with(|stack| stack.borrow().last().map_or(false, |top| !top.paused))
}

/// Run `func` with tracking suspended. Reads inside are not recorded by
/// the enclosing scope.
pub fn untracked<R>(func: impl FnOnce() -> R) -> R {
	let _scope = Tracking::enter(current_owner(), true);
	func()
}

/// Run `func` in a fresh scope and return its result together with the
/// nodes it read.
pub fn track<R>(func: impl FnOnce() -> R) -> (R, Vec<Read>) {
	let scope = Tracking::begin();
	let value = func();
	(value, scope.finish())
}
