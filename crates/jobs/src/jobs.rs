pub mod artifacts;
pub mod bump;
pub mod check_run;
pub mod lint;
pub mod merge;
pub mod post_result;

pub use artifacts::{CiTarget, collect_artifacts, trigger_rebuild};
pub use bump::bump;
pub use check_run::{LINT_CHECK_NAME, create_check_run, fetch_latest_commit};
pub use lint::lint;
pub use merge::{MAX_MERGE_ATTEMPTS, MERGE_RETRY_DELAY, MergeStep, merge};
pub use post_result::post_result;
