use thiserror::Error;

use crate::SignalId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
	/// The signal was written, pinged or recomputed while its own
	/// notification pass was still running.
	#[error("avoided recursive signalling of {0}")]
	RecursiveNotify(SignalId),

	/// A derived signal was read while it was being evaluated, or it kept
	/// invalidating itself while settling.
	#[error("dependency cycle through {0}")]
	Cycle(SignalId),

	#[error("{0} read its own value before it was first computed")]
	SelfReadBeforeInit(SignalId),
}

impl Error {
	/// The signal the error was raised on.
	pub fn signal(&self) -> SignalId {
		match *self {
			Error::RecursiveNotify(id) | Error::Cycle(id) | Error::SelfReadBeforeInit(id) => id,
		}
	}
}
