pub mod attendance;
pub mod checkin;
pub mod error;
pub mod excuse;
pub mod recognition;
pub mod session;
pub mod verification_log;

pub use error::ServiceError;

#[cfg(test)]
mod test_support;
