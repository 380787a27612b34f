pub mod browser;
pub mod core;
pub mod errors;
pub mod extensions;
pub mod recording;
pub mod replay;
pub mod store;
pub mod testing;
pub mod types;
pub mod utils;

pub use crate::core::{BrowserDriver, Config, DriverFactory};
pub use errors::{ExtractionError, ReplayError, Result};
pub use extensions::{ExtensionManager, ExtensionRegistry, ReplayExtension};
pub use recording::{RecordingExtractor, Trainer};
pub use replay::{BatchRunner, Profile, ReplayEngine};
pub use store::MappingStore;
pub use types::*;
