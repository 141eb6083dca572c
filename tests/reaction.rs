use mockall::predicate::eq;
use signal_graph::{derived, reaction, Derived, Mutable, Reaction, Signal, Value};

use crate::log;
use crate::mock::{SharedMock, Spy};

#[test]
fn reaction_runs_now_and_on_every_change() {
	crate::init_tracing();

	let a = Mutable::new(1_i64);
	let mock = SharedMock::new();

	mock.get().expect_trigger().with(eq(1)).times(1).return_const(());
	let reaction = Reaction::new({
		let a = a.clone();
		let mock = mock.clone();
		move || mock.get().trigger(a.get())
	});
	mock.get().checkpoint();
	assert!(reaction.is_active());
	assert_eq!(reaction.dependency_count(), 1);

	mock.get().expect_trigger().with(eq(2)).times(1).return_const(());
	a.set(2);
	a.set(2);
	mock.get().checkpoint();

	drop(reaction);
	assert_eq!(a.follower_count(), 0);

	mock.get().expect_trigger().never();
	a.set(3);
	mock.get().checkpoint();
}

#[test]
fn disposed_reaction_stops() {
	let a = Mutable::new(0);
	let runs = log();

	let reaction = Reaction::new({
		let a = a.clone();
		let runs = runs.clone();
		move || runs.borrow_mut().push(a.get())
	});

	a.set(1);
	reaction.dispose();
	a.set(2);

	assert_eq!(*runs.borrow(), vec![0, 1]);
	assert!(!a.is_active());
}

#[test]
fn reaction_tracks_what_it_read_last() {
	let enabled = Mutable::new(false);
	let a = Mutable::new(0);
	let runs = log();

	let reaction = Reaction::new({
		let enabled = enabled.clone();
		let a = a.clone();
		let runs = runs.clone();
		move || {
			if enabled.get() {
				runs.borrow_mut().push(a.get());
			}
		}
	});
	assert_eq!(reaction.dependency_count(), 1);

	a.set(1);
	assert!(runs.borrow().is_empty());

	enabled.set(true);
	assert_eq!(reaction.dependency_count(), 2);
	a.set(2);

	assert_eq!(*runs.borrow(), vec![1, 2]);
}

#[test]
fn macros_clone_their_captures() {
	let a = Mutable::new(1);
	let b = Mutable::new(2);
	let seen = log();

	let sum = derived!((a, b) => a.get() + b.get());
	let _reaction = reaction!((sum, seen) => seen.borrow_mut().push(sum.get()));

	a.set(10);
	b.set(20);

	assert_eq!(sum.get(), 30);
	assert_eq!(*seen.borrow(), vec![3, 12, 30]);
}

#[test]
fn values_hide_the_kind_of_signal() {
	let a = Mutable::new(2);
	let doubled = Derived::new({
		let a = a.clone();
		move || a.get() * 2
	});

	let values: Vec<Value<i32>> = vec![a.clone().into(), doubled.into()];
	assert_eq!(values[0].get(), 2);
	assert_eq!(values[1].get(), 4);
	assert!(values[0].ptr_eq(&values[0].clone()));
	assert!(!values[0].ptr_eq(&values[1]));

	let seen = log();
	let _subscriptions: Vec<_> = values
		.iter()
		.map(|value| value.follow(crate::record(&seen)))
		.collect();

	a.set(3);
	assert_eq!(*seen.borrow(), vec![3, 6]);
}
