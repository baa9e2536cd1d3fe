use crate::config::Context;
use tracing::trace;
use wasm_bindgen::JsCast;
use web_sys::{Element, Node};

pub const ICON_CLASS_PREFIX: &str = "icon-";

/// `["icon", "icon-search"]` → `Some("search")`
#[must_use]
pub fn icon_name<'a>(classes: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
	classes
		.into_iter()
		.filter_map(|class| class.strip_prefix(ICON_CLASS_PREFIX))
		.find(|name| !name.is_empty())
}

/// Appends a lazily loaded `<img>` for the named icon to `marker`.
///
/// There's no deduplication. Decorating a marker twice appends a second image.
pub fn decorate_icon(context: &Context, marker: &Element) {
	let classes = marker.class_name();
	let Some(name) = icon_name(classes.split_whitespace()) else {
		trace!("Icon marker without name: {:?}", marker);
		return;
	};

	let Some(document) = marker.owner_document() else { return };
	let Ok(img) = document.create_element("img") else { return };
	let src = context.icon_url(name);
	let attributes = [("data-icon-name", name), ("src", src.as_str()), ("alt", ""), ("loading", "lazy")];
	for (attribute, value) in attributes {
		if img.set_attribute(attribute, value).is_err() {
			return;
		}
	}
	// Failure to append means the marker can't have children; nothing to decorate then.
	let _ = marker.append_child(&img);
}

/// Decorates `root` itself if it is an icon marker, and every marker below it.
pub fn decorate_icons(context: &Context, root: &Element) {
	let selector = &context.selectors.icons;
	if root.matches(selector).unwrap_or(false) {
		decorate_icon(context, root);
	}
	if let Ok(markers) = root.query_selector_all(selector) {
		for i in 0..markers.length() {
			if let Some(marker) = markers.item(i).and_then(|node| node.dyn_into::<Element>().ok()) {
				decorate_icon(context, &marker);
			}
		}
	}
}

/// The decoration pass run for newly inserted subtrees. Non-element nodes are ignored.
pub fn decorate_inserted(context: &Context, nodes: impl IntoIterator<Item = Node>) {
	for node in nodes {
		if let Some(element) = node.dyn_ref::<Element>() {
			decorate_icons(context, element);
		}
	}
}
