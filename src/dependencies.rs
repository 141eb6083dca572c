use std::rc::Rc;

use fxhash::FxHashMap;

use crate::addr::RcAddr;
use crate::evaluation::Read;
use crate::{Observable, Result, Subscription};

/// The live upstream edges of a derived signal: every node it read during
/// its last evaluation, the version it saw, and the subscription that calls
/// it back when the node changes.
#[derive(Default)]
pub struct Dependencies {
	based_on: FxHashMap<RcAddr<dyn Observable>, Dependency>,
}

struct Dependency {
	version: u64,
	#[allow(unused)]
	subscription: Subscription,
}

/// What one [`Dependencies::swap`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Diff {
	pub added: usize,
	pub removed: usize,
	pub kept: usize,
}

impl Diff {
	pub fn is_empty(&self) -> bool {
		self.added == 0 && self.removed == 0
	}
}

impl Dependencies {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.based_on.len()
	}

	pub fn is_empty(&self) -> bool {
		self.based_on.is_empty()
	}

	pub fn contains(&self, observable: &Rc<dyn Observable>) -> bool {
		self.based_on.contains_key(&RcAddr::new(observable.clone()))
	}

	/// Whether every dependency still has the version it had when it was
	/// read.
	pub fn are_valid(&self) -> bool {
		self.based_on
			.iter()
			.all(|(base, dependency)| base.version() == dependency.version)
	}

	/// Replace the dependency set with `next`.
	///
	/// Nodes present in both sets keep their subscription. Nodes only in
	/// `next` are followed through `follow`, in read order. Nodes that were
	/// not read again are unfollowed once every new subscription is in place,
	/// so a node shared by both sets is never deactivated in between.
	///
	/// If `follow` fails the old nodes are kept as well, so a change of any
	/// of them still reaches the owner and gives it another go.
	pub fn swap(
		&mut self,
		next: Vec<Read>,
		mut follow: impl FnMut(&Rc<dyn Observable>) -> Result<Subscription>,
	) -> Result<Diff> {
		let mut prev = std::mem::take(&mut self.based_on);
		let mut diff = Diff::default();

		for read in next {
			let version = read.version();
			let key = RcAddr::new(read.into_observable());

			if let Some(mut dependency) = prev.remove(&key) {
				dependency.version = version;
				self.based_on.insert(key, dependency);
				diff.kept += 1;
				continue;
			}

			if self.based_on.contains_key(&key) {
				continue;
			}

			match follow(&key) {
				Ok(subscription) => {
					self.based_on.insert(
						key,
						Dependency {
							version,
							subscription,
						},
					);
					diff.added += 1;
				}
				Err(err) => {
					self.based_on.extend(prev);
					return Err(err);
				}
			}
		}

		diff.removed = prev.len();
		std::mem::drop(prev);

		Ok(diff)
	}

	/// Detach every dependency. The caller drops the result, which unfollows
	/// them, once it holds no borrows that an unfollow could re-enter.
	pub fn take(&mut self) -> Dependencies {
		std::mem::take(self)
	}
}
