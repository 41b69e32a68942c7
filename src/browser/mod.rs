//! Live browser capability used by the scroll strategy and the browser
//! search engine. Every method takes `&self`; element handles are opaque
//! ids that stay valid until the page re-renders the node.

mod chrome;

use std::time::Duration;

pub use chrome::{ChromeOptions, ChromeSession};

use crate::error::CrawlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u32);

pub trait BrowserSession {
    fn navigate(&self, url: &str) -> Result<(), CrawlError>;
    /// Block until `document.readyState` is complete or the timeout passes.
    fn wait_ready(&self, timeout: Duration) -> Result<(), CrawlError>;
    /// Rendered `document.body.innerText`.
    fn body_text(&self) -> Result<String, CrawlError>;
    fn page_html(&self) -> Result<String, CrawlError>;
    /// Address of the loaded document, after redirects and form submits.
    fn current_url(&self) -> String;
    /// Matching elements in document order; an unmatched selector is an empty list.
    fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, CrawlError>;
    fn scroll_to_bottom(&self) -> Result<(), CrawlError>;

    fn is_visible(&self, el: ElementHandle) -> bool;
    fn is_enabled(&self, el: ElementHandle) -> bool;
    fn text(&self, el: ElementHandle) -> Result<String, CrawlError>;
    fn attr(&self, el: ElementHandle, name: &str) -> Result<Option<String>, CrawlError>;
    fn click(&self, el: ElementHandle) -> Result<(), CrawlError>;
    /// Empty an input through key events and a direct value reset, firing
    /// `input`/`change` afterwards.
    fn clear(&self, el: ElementHandle) -> Result<(), CrawlError>;
    fn type_text(&self, el: ElementHandle, text: &str) -> Result<(), CrawlError>;
    fn press_enter(&self, el: ElementHandle) -> Result<(), CrawlError>;
    /// Submit the element's enclosing form natively.
    fn submit_form(&self, el: ElementHandle) -> Result<(), CrawlError>;
    fn scroll_into_view(&self, el: ElementHandle) -> Result<(), CrawlError>;
}

/// Opens a session on demand, so strategies that never need a browser never start one.
pub trait SessionFactory {
    fn open(&self) -> Result<Box<dyn BrowserSession>, CrawlError>;
}

impl SessionFactory for ChromeOptions {
    fn open(&self) -> Result<Box<dyn BrowserSession>, CrawlError> {
        Ok(Box::new(ChromeSession::launch(self)?))
    }
}
