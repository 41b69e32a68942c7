use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info};

use super::{BrowserSession, ElementHandle};
use crate::error::CrawlError;

const READY_POLL: Duration = Duration::from_millis(200);

const JS_VISIBLE: &str = "function() { \
    const r = this.getBoundingClientRect(); const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";
const JS_ENABLED: &str = "function() { return !this.disabled && !this.readOnly; }";
const JS_SELECT: &str = "function() { if (this.select) { this.select(); } }";
const JS_RESET_VALUE: &str = "function() { this.value = ''; \
    this.dispatchEvent(new Event('input', { bubbles: true })); \
    this.dispatchEvent(new Event('change', { bubbles: true })); }";
const JS_SUBMIT_FORM: &str = "function() { const f = this.form || this.closest('form'); \
    if (!f) { return false; } \
    if (f.requestSubmit) { f.requestSubmit(); } else { f.submit(); } return true; }";

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub timeout: Duration,
}

/// A single Chrome tab. Dropping the session closes the browser process.
pub struct ChromeSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

fn browser_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Browser(e.to_string())
}

impl ChromeSession {
    pub fn launch(opts: &ChromeOptions) -> Result<Self, CrawlError> {
        let browser = Browser::new(LaunchOptions {
            headless: opts.headless,
            sandbox: false,
            window_size: Some((1920, 1080)),
            idle_browser_timeout: opts.timeout.max(Duration::from_secs(60)),
            args: vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
            ],
            ..Default::default()
        })
        .map_err(|e| CrawlError::SessionStart(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| CrawlError::SessionStart(e.to_string()))?;
        tab.set_default_timeout(opts.timeout);
        info!(headless = opts.headless, "browser session started");

        Ok(ChromeSession {
            tab,
            _browser: browser,
        })
    }

    fn element(&self, el: ElementHandle) -> Result<Element<'_>, CrawlError> {
        Element::new(&self.tab, el.0).map_err(browser_err)
    }

    fn eval(&self, expr: &str) -> Result<Option<Value>, CrawlError> {
        self.tab
            .evaluate(expr, false)
            .map(|o| o.value)
            .map_err(browser_err)
    }

    fn call_on(&self, el: ElementHandle, func: &str) -> Result<Option<Value>, CrawlError> {
        self.element(el)?
            .call_js_fn(func, vec![], false)
            .map(|o| o.value)
            .map_err(browser_err)
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        debug!(url = %url, "navigate");
        self.tab.navigate_to(url).map_err(browser_err)?;
        self.tab.wait_until_navigated().map_err(browser_err)?;
        Ok(())
    }

    fn wait_ready(&self, timeout: Duration) -> Result<(), CrawlError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.eval("document.readyState")?;
            if state.as_ref().and_then(Value::as_str) == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!("document not ready before timeout");
                return Ok(());
            }
            std::thread::sleep(READY_POLL);
        }
    }

    fn body_text(&self) -> Result<String, CrawlError> {
        let v = self.eval("document.body ? document.body.innerText : ''")?;
        Ok(v.as_ref().and_then(Value::as_str).unwrap_or("").to_string())
    }

    fn page_html(&self) -> Result<String, CrawlError> {
        self.tab.get_content().map_err(browser_err)
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, CrawlError> {
        match self.tab.find_elements(css) {
            Ok(els) => Ok(els.iter().map(|e| ElementHandle(e.node_id)).collect()),
            Err(e) => {
                debug!(selector = css, error = %e, "no elements");
                Ok(Vec::new())
            }
        }
    }

    fn scroll_to_bottom(&self) -> Result<(), CrawlError> {
        self.eval("window.scrollTo(0, document.body.scrollHeight)")?;
        Ok(())
    }

    fn is_visible(&self, el: ElementHandle) -> bool {
        matches!(self.call_on(el, JS_VISIBLE), Ok(Some(Value::Bool(true))))
    }

    fn is_enabled(&self, el: ElementHandle) -> bool {
        matches!(self.call_on(el, JS_ENABLED), Ok(Some(Value::Bool(true))))
    }

    fn text(&self, el: ElementHandle) -> Result<String, CrawlError> {
        self.element(el)?.get_inner_text().map_err(browser_err)
    }

    fn attr(&self, el: ElementHandle, name: &str) -> Result<Option<String>, CrawlError> {
        self.element(el)?.get_attribute_value(name).map_err(browser_err)
    }

    fn click(&self, el: ElementHandle) -> Result<(), CrawlError> {
        self.element(el)?.click().map_err(browser_err)?;
        Ok(())
    }

    fn clear(&self, el: ElementHandle) -> Result<(), CrawlError> {
        let element = self.element(el)?;
        element.click().map_err(browser_err)?;
        element.call_js_fn(JS_SELECT, vec![], false).map_err(browser_err)?;
        self.tab.press_key("Backspace").map_err(browser_err)?;
        element
            .call_js_fn(JS_RESET_VALUE, vec![], false)
            .map_err(browser_err)?;
        Ok(())
    }

    fn type_text(&self, el: ElementHandle, text: &str) -> Result<(), CrawlError> {
        self.element(el)?.type_into(text).map_err(browser_err)?;
        Ok(())
    }

    fn press_enter(&self, el: ElementHandle) -> Result<(), CrawlError> {
        self.element(el)?.focus().map_err(browser_err)?;
        self.tab.press_key("Enter").map_err(browser_err)?;
        Ok(())
    }

    fn submit_form(&self, el: ElementHandle) -> Result<(), CrawlError> {
        match self.call_on(el, JS_SUBMIT_FORM)? {
            Some(Value::Bool(true)) => Ok(()),
            _ => Err(CrawlError::Browser("element has no enclosing form".into())),
        }
    }

    fn scroll_into_view(&self, el: ElementHandle) -> Result<(), CrawlError> {
        self.element(el)?.scroll_into_view().map_err(browser_err)?;
        Ok(())
    }
}
