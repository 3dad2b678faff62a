mod pass_finder;
mod types;

pub use pass_finder::{next_pass, DEFAULT_THRESHOLD_DEG};
pub use types::Pass;
