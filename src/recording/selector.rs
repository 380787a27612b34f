use regex::Regex;
use std::sync::LazyLock;

pub const ARIA_PREFIX: &str = "aria/";
pub const PIERCE_PREFIX: &str = "pierce/";
pub const XPATH_PREFIX: &str = "xpath/";
pub const TEXT_PREFIX: &str = "text/";

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#[\w-]+$").unwrap());
static ID_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([\w-]+)").unwrap());
static ATTR_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*(id|name)\s*=\s*["']?([^"'\]]+)["']?\s*\]"#).unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Id,
    PierceId,
    Css,
    PierceCss,
    XPath,
    Aria,
    Text,
}

pub fn kind_of(selector: &str) -> SelectorKind {
    if selector.starts_with(ARIA_PREFIX) {
        SelectorKind::Aria
    } else if selector.starts_with(TEXT_PREFIX) {
        SelectorKind::Text
    } else if selector.starts_with(XPATH_PREFIX) {
        SelectorKind::XPath
    } else if let Some(inner) = selector.strip_prefix(PIERCE_PREFIX) {
        if BARE_ID.is_match(inner) {
            SelectorKind::PierceId
        } else {
            SelectorKind::PierceCss
        }
    } else if BARE_ID.is_match(selector) {
        SelectorKind::Id
    } else {
        SelectorKind::Css
    }
}

/// Picks the single locator to drive a step with.
///
/// Order: bare `#id`, then `pierce/#id` with the prefix stripped, then any
/// other CSS, then `xpath/`. Accessibility and text entries describe the
/// element but are never returned.
pub fn resolve(groups: &[Vec<String>]) -> Option<String> {
    let mut pierce_id = None;
    let mut css = None;
    let mut xpath = None;

    for selector in groups.iter().flatten() {
        let selector = selector.trim();
        if selector.is_empty() {
            continue;
        }
        match kind_of(selector) {
            SelectorKind::Id => return Some(selector.to_string()),
            SelectorKind::PierceId => {
                pierce_id.get_or_insert_with(|| selector[PIERCE_PREFIX.len()..].to_string());
            }
            SelectorKind::Css => {
                css.get_or_insert_with(|| selector.to_string());
            }
            SelectorKind::PierceCss => {
                css.get_or_insert_with(|| selector[PIERCE_PREFIX.len()..].to_string());
            }
            SelectorKind::XPath => {
                xpath.get_or_insert_with(|| selector.to_string());
            }
            SelectorKind::Aria | SelectorKind::Text => {}
        }
    }

    pierce_id.or(css).or(xpath)
}

/// Accessibility labels attached to a step, prefix removed.
pub fn aria_labels(groups: &[Vec<String>]) -> Vec<String> {
    prefixed(groups, ARIA_PREFIX)
}

/// Visible-text entries attached to a step, prefix removed.
pub fn text_labels(groups: &[Vec<String>]) -> Vec<String> {
    prefixed(groups, TEXT_PREFIX)
}

fn prefixed(groups: &[Vec<String>], prefix: &str) -> Vec<String> {
    groups
        .iter()
        .flatten()
        .filter_map(|s| s.strip_prefix(prefix))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `id` and `name` values a CSS selector pins the element by.
pub fn identifiers(selector: &str) -> Identifiers {
    let mut found = Identifiers::default();
    if selector.starts_with(XPATH_PREFIX) {
        for caps in XPATH_ATTR.captures_iter(selector) {
            found.push(&caps[1], &caps[2]);
        }
        return found;
    }
    let selector = selector.strip_prefix(PIERCE_PREFIX).unwrap_or(selector);
    for caps in ID_FRAGMENT.captures_iter(selector) {
        found.push("id", &caps[1]);
    }
    for caps in ATTR_FRAGMENT.captures_iter(selector) {
        found.push(&caps[1], &caps[2]);
    }
    found
}

static XPATH_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@(id|name)\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifiers {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Identifiers {
    fn push(&mut self, attr: &str, value: &str) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }
        match attr {
            "id" => {
                self.id.get_or_insert(value);
            }
            "name" => {
                self.name.get_or_insert(value);
            }
            _ => {}
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.name.iter().chain(self.id.iter()).map(|s| s.as_str())
    }
}

/// Other ways of reaching the same element, built from its `id`/`name`.
/// Used when the recorded locator stops matching.
pub fn alternate_selectors(selector: &str) -> Vec<String> {
    let ids = identifiers(selector);
    let mut alternates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != selector && !alternates.contains(&candidate) {
            alternates.push(candidate);
        }
    };

    if let Some(name) = &ids.name {
        push(format!("[name=\"{}\"]", name));
        if BARE_ID.is_match(&format!("#{}", name)) {
            push(format!("#{}", name));
        }
    }
    if let Some(id) = &ids.id {
        if BARE_ID.is_match(&format!("#{}", id)) {
            push(format!("#{}", id));
        }
        push(format!("[id=\"{}\"]", id));
        push(format!("[name=\"{}\"]", id));
    }
    alternates
}
