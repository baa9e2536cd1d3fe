//! Error taxonomy shared by the loaders.
//!
//! [`LoadError`] is [`Clone`] so that one failed load can be handed to every awaiter of a deduplicated request.

use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
	/// The resource does not exist (HTTP 404).
	#[error("resource not found: {url}")]
	NotFound { url: String },

	#[error("request for {url} failed with status {status}")]
	Http { url: String, status: u16 },

	#[error("transport failure for {url}: {message}")]
	Transport { url: String, message: String },

	/// A code module resolved, but without a usable behavior for `kind`.
	#[error("module for {kind} has no usable export")]
	MissingExport { kind: String },

	#[error("stylesheet {href} failed to load")]
	Stylesheet { href: String },

	/// Authored content that breaks the mapped-item contract (label + value).
	#[error("<{tag}> item {index} has {children} child element(s), expected a label and a value")]
	MalformedItem { tag: String, index: usize, children: u32 },

	#[error("DOM operation failed: {message}")]
	Dom { message: String },
}

impl LoadError {
	/// Wraps a JavaScript exception thrown by a DOM call.
	#[must_use]
	pub fn dom(error: &JsValue) -> Self {
		Self::Dom { message: describe(error) }
	}

	#[must_use]
	pub fn transport(url: &str, error: &JsValue) -> Self {
		Self::Transport {
			url: url.to_owned(),
			message: describe(error),
		}
	}

	/// Whether the failure only means "this optional resource doesn't exist".
	#[must_use]
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	#[error("invalid page location {href:?}: {source}")]
	InvalidHref {
		href: String,
		#[source]
		source: url::ParseError,
	},

	#[error("no browser window available")]
	NoWindow,
}

/// Best-effort rendering of a thrown JavaScript value.
pub(crate) fn describe(error: &JsValue) -> String {
	if let Some(message) = error.as_string() {
		return message;
	}
	match error.dyn_ref::<js_sys::Error>() {
		Some(error) => String::from(error.message()),
		None => format!("{error:?}"),
	}
}
