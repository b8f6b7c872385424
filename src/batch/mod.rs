pub mod cherry_pick;
pub mod pipeline;
pub mod publisher;
pub mod selector;

pub use cherry_pick::{BatchApplication, CherryPicker, PickResult};
pub use pipeline::{BatchPipeline, RunReport, SkipReason, SkippedPullRequest};
pub use publisher::{PublishedBatch, Publisher};
pub use selector::select_candidates;
