use std::cell::RefCell;
use std::rc::Rc;

use signal_graph::{Derived, Error, FollowMode, Mutable, Signal, Subscription};

use crate::{log, record};

#[test]
fn counter() {
	crate::init_tracing();

	let count = Mutable::new(0);
	let doubled = Derived::new({
		let count = count.clone();
		move || count.get() * 2
	});

	let seen = log();
	let _subscription = doubled.follow(record(&seen));

	count.set(1);
	count.set(1);
	count.set(3);

	assert_eq!(*seen.borrow(), vec![2, 6]);
}

#[test]
#[should_panic(expected = "avoided recursive signalling")]
fn follower_writing_its_own_signal_panics() {
	let x = Mutable::new(0);
	let _subscription = x.follow({
		let x = x.clone();
		move |value| x.set(value + 1)
	});

	x.set(1);
}

#[test]
fn follower_writing_its_own_signal_fails_the_write() {
	let x = Mutable::new(0);
	let subscription = x
		.subscribe(FollowMode::Normal, {
			let x = x.clone();
			move |value| x.try_set(value + 1)
		})
		.unwrap();

	assert_eq!(x.try_set(1), Err(Error::RecursiveNotify(x.id())));
	assert_eq!(x.get(), 1);

	drop(subscription);
	assert_eq!(x.try_ping(), Ok(()));
}

#[test]
fn equal_write_from_inside_the_pass_is_still_rejected() {
	let x = Mutable::new(0);
	let _subscription = x
		.subscribe(FollowMode::Normal, {
			let x = x.clone();
			move |value| x.try_set(*value)
		})
		.unwrap();

	assert_eq!(x.try_set(1), Err(Error::RecursiveNotify(x.id())));
}

#[test]
fn follower_may_write_another_signal() {
	let a = Mutable::new(0);
	let b = Mutable::new(0);
	let seen = log();

	let _forward = a.follow({
		let b = b.clone();
		move |value| b.set(value * 10)
	});
	let _observe = b.follow(record(&seen));

	a.set(1);
	a.set(2);
	assert_eq!(*seen.borrow(), vec![10, 20]);
}

#[test]
fn write_back_through_another_signal_is_rejected() {
	let a = Mutable::new(0);
	let b = Mutable::new(0);

	let _forward = a
		.subscribe(FollowMode::Normal, {
			let b = b.clone();
			move |value| b.try_set(*value)
		})
		.unwrap();
	let _back = b
		.subscribe(FollowMode::Normal, {
			let a = a.clone();
			move |value| a.try_set(value + 1)
		})
		.unwrap();

	assert_eq!(a.try_set(1), Err(Error::RecursiveNotify(a.id())));
	assert_eq!(b.get(), 1);
}

#[test]
fn derived_follower_writing_a_dependency_is_rejected() {
	let a = Mutable::new(0);
	let doubled = Derived::new({
		let a = a.clone();
		move || a.get() * 2
	});

	let _subscription = doubled
		.subscribe(FollowMode::Normal, {
			let a = a.clone();
			move |value| a.try_set(value + 1)
		})
		.unwrap();

	assert_eq!(a.try_set(1), Err(Error::RecursiveNotify(a.id())));
	assert_eq!(doubled.get(), 2);
}

#[test]
fn unfollow_from_inside_a_notification() {
	let a = Mutable::new(0);
	let seen = log();
	let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

	let subscription = a.follow({
		let slot = slot.clone();
		let seen = seen.clone();
		move |value: &i32| {
			seen.borrow_mut().push(*value);
			if let Some(mut subscription) = slot.borrow_mut().take() {
				subscription.unfollow();
				subscription.unfollow();
			}
		}
	});
	*slot.borrow_mut() = Some(subscription);

	a.set(1);
	a.set(2);

	assert_eq!(*seen.borrow(), vec![1]);
	assert_eq!(a.follower_count(), 0);
}
