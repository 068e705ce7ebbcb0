//! Batch environment implementations.
//!
//! [`LoopbackEnvironment`] executes jobs inside the current process. It stages
//! through a [`LocalStorage`](crate::storage::LocalStorage), simulates queue and
//! run times and can inject failures, which makes it suitable for trying the
//! engine end to end and for tests.

mod loopback;

pub use loopback::{LoopbackConfig, LoopbackEnvironment, LoopbackJob, LoopbackJobService};
