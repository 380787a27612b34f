use crate::core::{BrowserConfig, BrowserDriver, CookieData, DriverFactory, ElementInfo};
use crate::errors::{ReplayError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One element on a [`MockDriver`] page.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub tag: String,
    pub input_type: Option<String>,
    pub value: String,
    pub checked: bool,
    /// `(value, visible text)` pairs for selects and custom dropdowns.
    pub options: Vec<(String, String)>,
    pub visible: bool,
    pub text: String,
    pub ancestor_classes: Vec<String>,
    /// Typing or clicking fails with this message.
    pub broken: Option<String>,
}

impl MockElement {
    pub fn input(input_type: &str) -> Self {
        Self {
            tag: "input".to_string(),
            input_type: Some(input_type.to_string()),
            visible: true,
            ..Self::default()
        }
    }

    pub fn textarea() -> Self {
        Self {
            tag: "textarea".to_string(),
            visible: true,
            ..Self::default()
        }
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        Self {
            tag: "select".to_string(),
            options: to_options(options),
            visible: true,
            ..Self::default()
        }
    }

    pub fn checkbox(checked: bool) -> Self {
        Self {
            checked,
            ..Self::input("checkbox")
        }
    }

    pub fn radio() -> Self {
        Self::input("radio")
    }

    pub fn button(text: &str) -> Self {
        Self {
            tag: "button".to_string(),
            text: text.to_string(),
            visible: true,
            ..Self::default()
        }
    }

    /// A `div` trigger inside a dropdown widget; clicking it reveals
    /// `options` as clickable menu entries.
    pub fn custom_dropdown(options: &[(&str, &str)]) -> Self {
        Self {
            tag: "div".to_string(),
            options: to_options(options),
            visible: true,
            ancestor_classes: vec!["dropdown-container".to_string()],
            ..Self::default()
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn broken(mut self, message: &str) -> Self {
        self.broken = Some(message.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    fn info(&self) -> ElementInfo {
        ElementInfo {
            tag_name: self.tag.clone(),
            input_type: self.input_type.clone(),
            ancestor_classes: self.ancestor_classes.clone(),
            option_count: if self.tag == "select" { self.options.len() } else { 0 },
            ..ElementInfo::default()
        }
    }
}

fn to_options(options: &[(&str, &str)]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(v, t)| (v.to_string(), t.to_string()))
        .collect()
}

/// What happens to the page when a selector is clicked.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub url: Option<String>,
    pub page_text: Option<String>,
    pub status: Option<u16>,
}

#[derive(Debug, Default)]
pub struct MockPage {
    pub url: String,
    pub elements: BTreeMap<String, MockElement>,
    pub page_text: String,
    pub extra_html: String,
    pub status: Option<u16>,
    pub mutated: bool,
    pub open_dropdown: Option<String>,
    pub click_effects: HashMap<String, ClickEffect>,
    pub clicks: Vec<String>,
    /// `(selector, text)` for every `type_text` call.
    pub typed: Vec<(String, String)>,
    pub navigations: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub scripts: Vec<String>,
    pub closed: bool,
    pub fail_screenshots: bool,
}

/// Scripted in-memory page implementing [`BrowserDriver`].
#[derive(Debug, Default)]
pub struct MockDriver {
    page: Mutex<MockPage>,
}

impl MockDriver {
    pub fn new(url: &str) -> Self {
        let driver = Self::default();
        driver.page().url = url.to_string();
        driver
    }

    pub fn with_element(self, selector: &str, element: MockElement) -> Self {
        self.page().elements.insert(selector.to_string(), element);
        self
    }

    pub fn with_page_text(self, text: &str) -> Self {
        self.page().page_text = text.to_string();
        self
    }

    pub fn with_html(self, html: &str) -> Self {
        self.page().extra_html = html.to_string();
        self
    }

    pub fn with_status(self, status: u16) -> Self {
        self.page().status = Some(status);
        self
    }

    pub fn on_click(self, selector: &str, effect: ClickEffect) -> Self {
        self.page().click_effects.insert(selector.to_string(), effect);
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.page().fail_screenshots = true;
        self
    }

    pub fn set_url(&self, url: &str) {
        self.page().url = url.to_string();
    }

    pub fn set_html(&self, html: &str) {
        self.page().extra_html = html.to_string();
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.page().elements.get(selector).map(|e| e.value.clone())
    }

    pub fn checked(&self, selector: &str) -> Option<bool> {
        self.page().elements.get(selector).map(|e| e.checked)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.page().clicks.clone()
    }

    /// Each chunk of text typed into `selector`, in order.
    pub fn typed(&self, selector: &str) -> Vec<String> {
        self.page()
            .typed
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.page().navigations.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.page().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.page().closed
    }

    pub fn page(&self) -> MutexGuard<'_, MockPage> {
        match self.page.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_element_mut<T>(
        &self,
        selector: &str,
        f: impl FnOnce(&mut MockElement) -> Result<T>,
    ) -> Result<T> {
        let mut page = self.page();
        let element = page
            .elements
            .get_mut(selector)
            .ok_or_else(|| ReplayError::ElementNotFound(selector.to_string()))?;
        if let Some(message) = &element.broken {
            return Err(ReplayError::JavaScriptFailed(message.clone()));
        }
        f(element)
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut page = self.page();
        page.navigations.push(url.to_string());
        page.url = url.to_string();
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<bool> {
        Ok(self.page().elements.contains_key(selector))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self
            .page()
            .elements
            .get(selector)
            .map(|e| e.visible)
            .unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let opens_dropdown = self.with_element_mut(selector, |element| {
            match element.input_type.as_deref() {
                Some("checkbox") => element.checked = !element.checked,
                Some("radio") => element.checked = true,
                _ => {}
            }
            Ok(element.tag != "select" && !element.options.is_empty())
        })?;

        let mut page = self.page();
        page.clicks.push(selector.to_string());
        page.open_dropdown = opens_dropdown.then(|| selector.to_string());
        if let Some(effect) = page.click_effects.get(selector).cloned() {
            if let Some(url) = effect.url {
                page.url = url;
            }
            if let Some(text) = effect.page_text {
                page.page_text = text;
            }
            if effect.status.is_some() {
                page.status = effect.status;
            }
            page.mutated = true;
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        self.with_element_mut(selector, |element| {
            element.value.push_str(value);
            Ok(())
        })?;
        self.page().typed.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        self.with_element_mut(selector, |element| {
            element.value.clear();
            Ok(())
        })
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<bool> {
        self.with_element_mut(selector, |element| {
            let wanted = value.trim().to_lowercase();
            let found = element
                .options
                .iter()
                .find(|(v, _)| v.trim().to_lowercase() == wanted)
                .map(|(v, _)| v.clone());
            Ok(found.map(|v| element.value = v).is_some())
        })
    }

    async fn select_by_text(&self, selector: &str, text: &str) -> Result<bool> {
        self.with_element_mut(selector, |element| {
            let wanted = text.trim().to_lowercase();
            let found = element
                .options
                .iter()
                .find(|(_, t)| t.trim().to_lowercase() == wanted)
                .map(|(v, _)| v.clone());
            Ok(found.map(|v| element.value = v).is_some())
        })
    }

    async fn is_checked(&self, selector: &str) -> Result<bool> {
        self.page()
            .elements
            .get(selector)
            .map(|e| e.checked)
            .ok_or_else(|| ReplayError::ElementNotFound(selector.to_string()))
    }

    async fn execute_script(&self, script: &str, _args: &[Value]) -> Result<Value> {
        self.page().scripts.push(script.to_string());
        Ok(Value::Null)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page().url.clone())
    }

    async fn page_source(&self) -> Result<String> {
        let page = self.page();
        Ok(format!(
            "<html><body><main>{}</main>{}</body></html>",
            page.page_text, page.extra_html
        ))
    }

    async fn cookies(&self) -> Result<Vec<CookieData>> {
        Ok(Vec::new())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let mut page = self.page();
        if page.fail_screenshots {
            return Err(ReplayError::ScreenshotFailed("capture refused".to_string()));
        }
        page.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.page().closed = true;
        Ok(())
    }

    async fn describe_element(&self, selector: &str) -> Result<Option<ElementInfo>> {
        Ok(self.page().elements.get(selector).map(|e| e.info()))
    }

    async fn set_value_scripted(&self, selector: &str, value: &str) -> Result<bool> {
        match self.with_element_mut(selector, |element| {
            element.value = value.to_string();
            Ok(())
        }) {
            Ok(()) => Ok(true),
            Err(ReplayError::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn click_option_with_text(&self, text: &str) -> Result<bool> {
        let mut page = self.page();
        let Some(open) = page.open_dropdown.clone() else {
            return Ok(false);
        };
        let wanted = text.trim().to_lowercase();
        let Some(element) = page.elements.get_mut(&open) else {
            return Ok(false);
        };
        let found = element
            .options
            .iter()
            .find(|(v, t)| t.trim().to_lowercase() == wanted || v.trim().to_lowercase() == wanted)
            .map(|(v, _)| v.clone());
        match found {
            Some(value) => {
                element.value = value;
                page.open_dropdown = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_clickable_by_text(&self, words: &[&str]) -> Result<Option<String>> {
        let page = self.page();
        Ok(page
            .elements
            .iter()
            .filter(|(_, e)| e.visible && e.tag == "button")
            .find(|(_, e)| {
                let text = e.text.to_lowercase();
                words.iter().any(|w| text.contains(&w.to_lowercase()))
            })
            .map(|(selector, _)| selector.clone()))
    }

    async fn response_status(&self) -> Result<Option<u16>> {
        Ok(self.page().status)
    }

    async fn watch_mutations(&self) -> Result<()> {
        self.page().mutated = false;
        Ok(())
    }

    async fn mutations_seen(&self) -> Result<bool> {
        Ok(self.page().mutated)
    }
}

type PageBuilder = dyn Fn() -> MockDriver + Send + Sync;

/// Hands out a fresh [`MockDriver`] per acquisition and keeps them for
/// inspection.
pub struct MockDriverFactory {
    build: Box<PageBuilder>,
    issued: Mutex<Vec<Arc<MockDriver>>>,
    fail_with: Option<String>,
}

impl MockDriverFactory {
    pub fn new(build: impl Fn() -> MockDriver + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            issued: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    /// Every acquisition fails as if the browser could not start.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(|| MockDriver::new("about:blank"))
        }
    }

    pub fn issued(&self) -> Vec<Arc<MockDriver>> {
        match self.issued.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn acquire(&self, _config: &BrowserConfig) -> Result<Arc<dyn BrowserDriver>> {
        if let Some(message) = &self.fail_with {
            return Err(ReplayError::LaunchFailed(message.clone()));
        }
        let driver = Arc::new((self.build)());
        match self.issued.lock() {
            Ok(mut guard) => guard.push(Arc::clone(&driver)),
            Err(poisoned) => poisoned.into_inner().push(Arc::clone(&driver)),
        }
        Ok(driver)
    }
}
