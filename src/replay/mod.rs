pub mod batch;
pub mod dates;
pub mod engine;
pub mod fill;
pub mod profile;
pub mod progress;
pub mod submission;

pub use batch::{BatchJob, BatchRunner, SiteSummary};
pub use dates::DateFormat;
pub use engine::ReplayEngine;
pub use fill::{FieldFiller, FillOutcome};
pub use profile::Profile;
pub use progress::{CancelFlag, ProgressSink, ProgressStatus, ProgressUpdate};
pub use submission::{evaluate_submission, submit_form};
