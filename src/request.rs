use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Form `method` attribute; anything but POST is a GET.
    pub fn from_attr(attr: Option<&str>) -> Self {
        match attr.map(|m| m.trim().to_ascii_uppercase()) {
            Some(m) if m == "POST" => Method::Post,
            _ => Method::Get,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// One request the crawler intends to make. The body is only set for POST;
/// GET form fields are folded into the URL before a descriptor is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub body: Option<BTreeMap<String, String>>,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        RequestDescriptor {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: BTreeMap<String, String>) -> Self {
        RequestDescriptor {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    /// `METHOD|url|{sorted body json}`. Equal fingerprints mean the same request.
    pub fn fingerprint(&self) -> String {
        let empty = BTreeMap::new();
        let body = self.body.as_ref().unwrap_or(&empty);
        let body_json = serde_json::to_string(body).unwrap_or_default();
        format!("{}|{}|{}", self.method, self.url, body_json)
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_body_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("page".to_string(), "2".to_string());
        a.insert("__VIEWSTATE".to_string(), "xyz".to_string());
        let mut b = BTreeMap::new();
        b.insert("__VIEWSTATE".to_string(), "xyz".to_string());
        b.insert("page".to_string(), "2".to_string());

        let ra = RequestDescriptor::post("https://x.edu/dir", a);
        let rb = RequestDescriptor::post("https://x.edu/dir", b);
        assert_eq!(ra.fingerprint(), rb.fingerprint());
    }

    #[test]
    fn get_and_post_differ() {
        let get = RequestDescriptor::get("https://x.edu/dir");
        let post = RequestDescriptor::post("https://x.edu/dir", BTreeMap::new());
        assert_ne!(get.fingerprint(), post.fingerprint());
        assert_eq!(get.fingerprint(), "GET|https://x.edu/dir|{}");
    }

    #[test]
    fn method_attr_defaults_to_get() {
        assert_eq!(Method::from_attr(None), Method::Get);
        assert_eq!(Method::from_attr(Some("post")), Method::Post);
        assert_eq!(Method::from_attr(Some("dialog")), Method::Get);
    }
}
