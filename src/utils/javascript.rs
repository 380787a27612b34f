use crate::core::BrowserDriver;
use crate::errors::Result;
use serde_json::Value;

/// Resolves `xpath/`, `pierce/` and plain CSS selectors to a node.
const FIND_ELEMENT: &str = r#"
    const findElement = (selector) => {
        if (selector.startsWith('xpath/')) {
            return document.evaluate(selector.slice(6), document, null,
                XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        }
        if (selector.startsWith('pierce/')) {
            selector = selector.slice(7);
        }
        return document.querySelector(selector);
    };
"#;

pub fn describe_element_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        if (!el) return null;
        const ancestorClasses = [];
        let node = el.parentElement;
        for (let depth = 0; node && depth < 6; depth++) {{
            if (typeof node.className === 'string' && node.className.trim()) {{
                ancestorClasses.push(node.className.trim());
            }}
            node = node.parentElement;
        }}
        return {{
            tagName: el.tagName.toLowerCase(),
            inputType: el.getAttribute('type') ? el.type : null,
            ancestorClasses: ancestorClasses,
            optionCount: el.tagName === 'SELECT' ? el.options.length : 0,
            id: el.id || null,
            name: el.getAttribute('name'),
            ariaLabel: el.getAttribute('aria-label'),
            placeholder: el.getAttribute('placeholder')
        }};
        "#
    )
}

pub fn set_value_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        if (!el) return false;
        el.focus();
        el.value = args[1];
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        el.blur();
        return true;
        "#
    )
}

pub fn select_option_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        if (!el || el.tagName !== 'SELECT') return false;
        const wanted = String(args[1]).trim().toLowerCase();
        const byText = args[2] === 'text';
        const option = Array.from(el.options).find(o => byText
            ? o.text.trim().toLowerCase() === wanted
            : o.value.trim().toLowerCase() === wanted);
        if (!option) return false;
        el.value = option.value;
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;
        "#
    )
}

pub fn click_option_script() -> String {
    r#"
        const wanted = String(args[0]).trim().toLowerCase();
        const candidates = document.querySelectorAll(
            'li, a, span, div[data-value], [role="option"], [role="menuitem"]');
        for (const el of candidates) {
            const rect = el.getBoundingClientRect();
            if (rect.width === 0 || rect.height === 0) continue;
            const text = (el.textContent || '').trim().toLowerCase();
            const value = (el.getAttribute('data-value') || '').toLowerCase();
            if (text === wanted || value === wanted) {
                el.click();
                return true;
            }
        }
        return false;
    "#
    .to_string()
}

pub fn find_clickable_by_text_script() -> String {
    r#"
        const words = args[0].map(w => w.toLowerCase());
        const candidates = document.querySelectorAll(
            'button, input[type="submit"], input[type="button"], a.btn, a.button, [role="button"]');
        for (const el of candidates) {
            const rect = el.getBoundingClientRect();
            if (rect.width === 0 || rect.height === 0) continue;
            if (el.disabled || el.getAttribute('aria-disabled') === 'true') continue;
            const text = ((el.innerText || el.value || '') + '').trim().toLowerCase();
            if (words.some(w => text.includes(w))) {
                el.setAttribute('data-form-replay-submit', '1');
                return '[data-form-replay-submit="1"]';
            }
        }
        return null;
    "#
    .to_string()
}

pub fn is_visible_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        if (!el) return false;
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 &&
               rect.height > 0 &&
               style.visibility !== 'hidden' &&
               style.display !== 'none' &&
               parseFloat(style.opacity) > 0;
        "#
    )
}

pub fn is_checked_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        return !!(el && (el.checked || el.getAttribute('aria-checked') === 'true'));
        "#
    )
}

pub fn clear_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        const el = findElement(args[0]);
        if (!el) return false;
        el.value = '';
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;
        "#
    )
}

pub fn exists_script() -> String {
    format!(
        r#"{FIND_ELEMENT}
        return findElement(args[0]) !== null;
        "#
    )
}

pub const RESPONSE_STATUS_SCRIPT: &str = r#"
    const entries = performance.getEntriesByType('navigation');
    if (!entries.length || typeof entries[0].responseStatus !== 'number') return null;
    return entries[0].responseStatus;
"#;

pub const INSTALL_MUTATION_WATCH_SCRIPT: &str = r#"
    if (window.__formReplayObserver) {
        window.__formReplayObserver.disconnect();
    }
    window.__formReplayMutations = 0;
    window.__formReplayObserver = new MutationObserver((mutations) => {
        window.__formReplayMutations += mutations.length;
    });
    window.__formReplayObserver.observe(document.body, {
        childList: true,
        subtree: true,
        attributes: true,
        attributeFilter: ['class', 'style', 'hidden', 'aria-hidden']
    });
    return true;
"#;

pub const DOCUMENT_READY_SCRIPT: &str = r#"
    return document.readyState === 'complete';
"#;

pub const MUTATIONS_SEEN_SCRIPT: &str = r#"
    return (window.__formReplayMutations || 0) > 0;
"#;

/// Wraps a function body so it can be evaluated as a single expression.
pub fn wrap_with_args(script: &str, args: &[Value]) -> Result<String> {
    let args_json = serde_json::to_string(args)?;
    Ok(format!("(function(args) {{ {} }})({})", script, args_json))
}

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    /// Polls `condition` (a function body returning a boolean) until it holds.
    pub async fn wait_for_condition(
        driver: &dyn BrowserDriver,
        condition: &str,
        timeout_ms: u64,
        poll_interval_ms: u64,
    ) -> Result<bool> {
        let start_time = std::time::Instant::now();
        let timeout = tokio::time::Duration::from_millis(timeout_ms);
        let poll_interval = tokio::time::Duration::from_millis(poll_interval_ms.max(1));

        loop {
            let result = driver.execute_script(condition, &[]).await?;
            if result.as_bool() == Some(true) {
                return Ok(true);
            }
            if start_time.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
