//! Stream combinators for progress subscribers

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
