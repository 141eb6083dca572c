use std::panic::{catch_unwind, AssertUnwindSafe};

use signal_graph::{is_tracking, track, untracked, Derived, Mutable, Read, Signal, Tracking};

#[test]
fn manual_scope_collects_reads() {
	let a = Mutable::new(1);
	let b = Mutable::new("b");

	let scope = Tracking::begin();
	assert!(is_tracking());
	a.get();
	b.get();
	a.get();
	let reads = scope.finish();

	assert!(!is_tracking());
	let ids: Vec<_> = reads.iter().map(Read::id).collect();
	assert_eq!(ids, vec![a.id(), b.id()]);
}

#[test]
fn untracked_reads_are_invisible() {
	let a = Mutable::new(1);

	let (value, reads) = track(|| untracked(|| a.get()) + a.get_untracked());
	assert_eq!(value, 2);
	assert!(reads.is_empty());
}

#[test]
fn nested_derived_reads_stay_inside() {
	let a = Mutable::new(1);
	let b = Mutable::new(10);
	let inner = Derived::new({
		let a = a.clone();
		move || a.get() + 1
	});

	let (sum, reads) = track(|| inner.get() + b.get());
	assert_eq!(sum, 12);

	let ids: Vec<_> = reads.iter().map(Read::id).collect();
	assert_eq!(ids, vec![inner.id(), b.id()]);
}

#[test]
fn panicking_derive_function_leaves_the_stack_clean() {
	crate::init_tracing();

	let explode = Mutable::new(true);
	let a = Mutable::new(3);
	let derived = Derived::new({
		let explode = explode.clone();
		let a = a.clone();
		move || {
			if explode.get() {
				panic!("boom");
			}
			a.get()
		}
	});

	let result = catch_unwind(AssertUnwindSafe(|| derived.get()));
	assert!(result.is_err());
	assert!(!is_tracking());

	// The signal is usable again once the derive function stops panicking.
	explode.set(false);
	let (value, reads) = track(|| derived.get());
	assert_eq!(value, 3);
	assert_eq!(reads.len(), 1);
	assert_eq!(reads[0].id(), derived.id());
}
