mod log_err;
mod not_found;

pub use self::{log_err::LogErr, not_found::NotFound};

pub type Result<T = (), E = crate::Error> = std::result::Result<T, E>;
