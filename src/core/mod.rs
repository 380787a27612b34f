pub mod browser;
pub mod config;

pub use browser::{BrowserDriver, CookieData, DriverFactory, ElementInfo};
pub use config::{BrowserConfig, Config, ExtensionsConfig, ReplayConfig, StoreConfig, Viewport};
