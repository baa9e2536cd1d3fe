//! Inlines `.fragment` placeholders before blocks are discovered.
//!
//! A placeholder holds the fragment's path in a nested element:
//!
//! ```html
//! <div class="fragment"><div><div>/fragments/footer</div></div></div>
//! ```
//!
//! That nested element's content is replaced with `/fragments/footer.plain.html`.

use crate::{config::Context, error::LoadError, fetch::Transport};
use futures::future::join_all;
use tracing::{instrument, warn};
use wasm_bindgen::JsCast;
use web_sys::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
	Inlined { path: String },
	/// The placeholder was left as it was.
	Retained { path: String, error: LoadError },
	/// There was no path to load.
	Empty,
}

/// The element that holds the path and receives the fetched markup.
#[must_use]
pub fn slot(placeholder: &Element) -> Element {
	placeholder
		.first_element_child()
		.and_then(|row| row.first_element_child())
		.or_else(|| placeholder.first_element_child())
		.unwrap_or_else(|| placeholder.clone())
}

/// Never fails outward: any failure is logged as warning and reported as [`FragmentOutcome::Retained`].
#[instrument(skip(context, transport))]
pub async fn preload(context: &Context, transport: &dyn Transport, placeholder: &Element) -> FragmentOutcome {
	let slot = slot(placeholder);
	let path = slot.text_content().unwrap_or_default().trim().to_owned();
	if path.is_empty() {
		return FragmentOutcome::Empty;
	}

	match fetch(context, transport, &path).await {
		Ok(markup) => {
			slot.set_inner_html(&markup);
			FragmentOutcome::Inlined { path }
		}
		Err(error) => {
			warn!("Failed to load fragment {}: {}", path, error);
			FragmentOutcome::Retained { path, error }
		}
	}
}

async fn fetch(context: &Context, transport: &dyn Transport, path: &str) -> Result<String, LoadError> {
	let url = context.fragment_url(path).ok_or_else(|| LoadError::Transport {
		url: path.to_owned(),
		message: "not resolvable against the page origin".to_owned(),
	})?;
	let response = transport.get(&url).await?;
	match response.status {
		404 => Err(LoadError::NotFound { url }),
		status if !response.ok() => Err(LoadError::Http { url, status }),
		_ => Ok(response.body),
	}
}

/// Preloads every placeholder below `root` concurrently and waits for all of them to settle.
pub async fn preload_all(context: &Context, transport: &dyn Transport, root: &Element) -> Vec<FragmentOutcome> {
	let placeholders = match root.query_selector_all(&context.selectors.fragments) {
		Ok(placeholders) => placeholders,
		Err(error) => {
			warn!("Fragment query failed: {}", crate::error::describe(&error));
			return Vec::new();
		}
	};
	let placeholders: Vec<Element> = (0..placeholders.length())
		.filter_map(|i| placeholders.item(i))
		.filter_map(|node| node.dyn_into::<Element>().ok())
		.collect();
	join_all(placeholders.iter().map(|placeholder| preload(context, transport, placeholder))).await
}
