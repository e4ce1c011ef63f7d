use tracing::error;

use super::Result;

pub trait LogErr<T, E>
where
	E: std::fmt::Display,
{
	#[must_use]
	fn log_err(self) -> Self;
}

impl<T, E> LogErr<T, E> for Result<T, E>
where
	E: std::fmt::Display,
{
	#[inline]
	fn log_err(self) -> Self {
		if let Err(ref e) = self {
			error!("{e}");
		}

		self
	}
}
