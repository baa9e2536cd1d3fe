//! The page context every loader is handed, built once at startup.

use crate::error::ConfigError;
use tracing::debug;
use url::Url;
use wasm_bindgen::UnwrapThrowExt;

/// Sampling weight used when the page is not explicitly opted into RUM.
pub const DEFAULT_WEIGHT: u32 = 100;

/// Sampling weight forced by `?rum=on`: every page view is reported.
pub const SELECTED_WEIGHT: u32 = 1;

pub const RUM_ENDPOINT: &str = "https://rum.hlx.page/.rum";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RumConfig {
	pub weight: u32,
	/// Collection base URL. The weight is appended as the last path segment.
	pub endpoint: String,
}

impl Default for RumConfig {
	fn default() -> Self {
		Self {
			weight: DEFAULT_WEIGHT,
			endpoint: RUM_ENDPOINT.to_owned(),
		}
	}
}

/// CSS selectors that define where blocks, fragments and icons live in the authored markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
	pub main: String,
	pub containers: String,
	pub fragments: String,
	pub icons: String,
}

impl Default for Selectors {
	fn default() -> Self {
		Self {
			main: "main".to_owned(),
			containers: "header, footer, main > div > div[class]:not(.fragment), .fragment > div > div > div > div[class]".to_owned(),
			fragments: ".fragment".to_owned(),
			icons: "span.icon".to_owned(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
	pub code_base_path: String,
	pub origin: String,
	pub href: String,
	pub lighthouse: bool,
	pub rum: RumConfig,
	pub selectors: Selectors,
	pub eager_images: usize,
}

impl Context {
	/// Reads the current page location.
	///
	/// # Errors
	///
	/// Iff there is no window or its location is not a valid absolute URL.
	pub fn from_window() -> Result<Self, ConfigError> {
		let window = web_sys::window().ok_or(ConfigError::NoWindow)?;
		let href = window.location().href().expect_throw("aem-block-loader: Could not read `location.href`.");
		Self::from_href(&href)
	}

	/// Builds the context for a page at `href`.
	///
	/// # Errors
	///
	/// Iff `href` is not a valid absolute URL.
	pub fn from_href(href: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(href).map_err(|source| ConfigError::InvalidHref { href: href.to_owned(), source })?;

		let flag = |name: &str| url.query_pairs().any(|(key, value)| key == name && value == "on");

		let context = Self {
			code_base_path: String::new(),
			origin: url.origin().ascii_serialization(),
			href: url.to_string(),
			lighthouse: flag("lighthouse"),
			rum: RumConfig {
				weight: if flag("rum") { SELECTED_WEIGHT } else { DEFAULT_WEIGHT },
				..RumConfig::default()
			},
			selectors: Selectors::default(),
			eager_images: 1,
		};
		debug!(?context, "Page context");
		Ok(context)
	}

	#[must_use]
	pub fn with_code_base_path(mut self, code_base_path: impl Into<String>) -> Self {
		let mut code_base_path = code_base_path.into();
		while code_base_path.ends_with('/') {
			code_base_path.pop();
		}
		self.code_base_path = code_base_path;
		self
	}

	#[must_use]
	pub fn with_selectors(mut self, selectors: Selectors) -> Self {
		self.selectors = selectors;
		self
	}

	/// `<codeBase>/blocks/<block>/<block>.<extension>`
	#[must_use]
	pub fn block_resource_url(&self, block: &str, extension: &str) -> String {
		format!("{}/blocks/{block}/{block}.{extension}", self.code_base_path)
	}

	#[must_use]
	pub fn icon_url(&self, name: &str) -> String {
		format!("{}/icons/{name}.svg", self.code_base_path)
	}

	/// Resolves an authored fragment path against the page origin.
	#[must_use]
	pub fn fragment_url(&self, path: &str) -> Option<String> {
		let base = Url::parse(&self.origin).ok()?;
		base.join(&format!("{path}.plain.html")).ok().map(String::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_without_query() {
		let context = Context::from_href("https://example.com/en/page").unwrap();
		assert_eq!(context.origin, "https://example.com");
		assert!(!context.lighthouse);
		assert_eq!(context.rum.weight, DEFAULT_WEIGHT);
		assert_eq!(context.code_base_path, "");
	}

	#[test]
	fn query_flags() {
		let context = Context::from_href("https://example.com/?rum=on&lighthouse=on").unwrap();
		assert!(context.lighthouse);
		assert_eq!(context.rum.weight, SELECTED_WEIGHT);

		let context = Context::from_href("https://example.com/?rum=off&lighthouse=1").unwrap();
		assert!(!context.lighthouse);
		assert_eq!(context.rum.weight, DEFAULT_WEIGHT);
	}

	#[test]
	fn invalid_href() {
		assert!(matches!(Context::from_href("not a url"), Err(ConfigError::InvalidHref { .. })));
	}

	#[test]
	fn resource_urls() {
		let context = Context::from_href("https://example.com/page").unwrap().with_code_base_path("/code/");
		assert_eq!(context.block_resource_url("cards", "js"), "/code/blocks/cards/cards.js");
		assert_eq!(context.icon_url("search"), "/code/icons/search.svg");
		assert_eq!(
			context.fragment_url("/fragments/footer").as_deref(),
			Some("https://example.com/fragments/footer.plain.html")
		);
		assert_eq!(
			context.fragment_url("fragments/nav").as_deref(),
			Some("https://example.com/fragments/nav.plain.html")
		);
	}
}
