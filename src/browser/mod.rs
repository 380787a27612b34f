#[cfg(feature = "chrome")]
pub mod chrome;
pub mod navigation;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeDriver, ChromeDriverFactory};
pub use navigation::{NavigationManager, NavigationResult};
