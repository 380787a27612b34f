pub mod base;
pub mod captcha;
pub mod data_substitution;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod screenshot;

pub use base::{ErrorAction, ReplayContext, ReplayExtension, StepData};
pub use captcha::{detect_captcha, CaptchaExtension, CaptchaKind, CaptchaSolver, ManualSolver};
pub use data_substitution::{DataSubstitutionExtension, SubstitutionStats};
pub use logging::LoggingExtension;
pub use manager::ExtensionManager;
pub use registry::{ExtensionFactory, ExtensionRegistry};
pub use screenshot::ScreenshotExtension;
