mod delay;
mod options;
mod refresh;
mod scheduler;

pub use delay::{DelayCalculator, MAX_DELAY_MS};
pub use options::{AutoRefreshOptions, Clock, DelayFn, DelayInput, LeadSeconds};
pub use refresh::{RefreshFn, RefreshFuture, Refreshed};
pub use scheduler::{AutoRefresh, CancelHandle, CycleStatus};
