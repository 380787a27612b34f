pub mod classifier;
pub mod extractor;
pub mod selector;
pub mod trainer;

pub use classifier::{classify_fill_strategy, normalize_field, StrategyDecision};
pub use extractor::{validate_recording, ExtractionResult, RecordingExtractor};
pub use trainer::{Trainer, TrainingOutcome};
