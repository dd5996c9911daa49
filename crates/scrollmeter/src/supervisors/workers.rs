//! 🧵 Workers: the two tasks that actually do the scan while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! 🚀 One paginator, one aggregator, one bounded channel between them. The paginator
//! walks the scroll and weighs records; the aggregator adds the weights up. That's it.
//! That's the factory floor. 🦆
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

mod aggregator;
mod paginator;

pub(crate) use aggregator::Aggregator;
pub(crate) use paginator::Paginator;

/// 🏗️ A background worker, that does work. duh.
///
/// 🎯 Each worker hands back whatever it produced through its join handle, so the
/// Supervisor can collect results without sharing anything mutable in the meantime.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(crate) trait Worker {
    type Output: Send + 'static;

    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify. Okay, we don't trust at all.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
