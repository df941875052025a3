//! Request classification into handling lanes.

use crate::http::{Destination, Method, Request, RequestMode};

/// The lane a request is handled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
  Api,
  Image,
  Static,
  Navigation,
  Default,
}

const EXTENSION_SCHEMES: &[&str] = &[
  "chrome-extension",
  "moz-extension",
  "safari-extension",
  "safari-web-extension",
  "ms-browser-extension",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"];

const STATIC_EXTENSIONS: &[&str] = &[
  "css", "js", "mjs", "json", "woff", "woff2", "ttf", "otf", "eot",
];

/// Pure classifier over the configured API prefixes.
#[derive(Debug, Clone)]
pub struct Classifier {
  api_prefixes: Vec<String>,
}

impl Classifier {
  pub fn new(api_prefixes: Vec<String>) -> Self {
    Self { api_prefixes }
  }

  /// Assign a request to its lane.
  ///
  /// Returns `None` for requests that must pass through untouched:
  /// anything but GET, and browser-extension URLs.
  pub fn classify(&self, request: &Request) -> Option<Lane> {
    if request.method != Method::Get {
      return None;
    }
    if EXTENSION_SCHEMES.contains(&request.url.scheme()) {
      return None;
    }

    let path = request.url.path();
    let ext = extension(path);
    let has_ext = |list: &[&str]| ext.as_deref().is_some_and(|e| list.contains(&e));

    if self.api_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
      return Some(Lane::Api);
    }

    if has_ext(IMAGE_EXTENSIONS) || request.destination == Destination::Image {
      return Some(Lane::Image);
    }

    if has_ext(STATIC_EXTENSIONS)
      || matches!(
        request.destination,
        Destination::Script | Destination::Style | Destination::Font
      )
    {
      return Some(Lane::Static);
    }

    if request.mode == RequestMode::Navigate {
      return Some(Lane::Navigation);
    }

    Some(Lane::Default)
  }
}

/// Lower-cased extension of the last path segment.
fn extension(path: &str) -> Option<String> {
  let segment = path.rsplit('/').next()?;
  let (stem, ext) = segment.rsplit_once('.')?;
  if stem.is_empty() || ext.is_empty() {
    return None;
  }
  Some(ext.to_ascii_lowercase())
}
