//! Cooperative cancellation.
//!
//! Backoff waits and long-running steps poll a shared [`CancellationToken`]
//! so an operator interrupt is never forced to wait out a pending backoff
//! before the driver can checkpoint and exit.

mod token;

pub use token::CancellationToken;
