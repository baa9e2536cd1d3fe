//! Turns authored block containers into `aem-*` elements.

use crate::error::LoadError;
use tracing::{instrument, trace};
use web_sys::Element;

pub const TAG_PREFIX: &str = "aem-";

/// Marks an immediate child of an upgraded element as one of its items.
pub const ITEM_SLOT: &str = "item";

/// `aem-` + the declared type (or the raw tag name), lower-cased.
#[must_use]
pub fn component_tag(declared_type: Option<&str>, tag_name: &str) -> String {
	let name = declared_type.map(str::trim).filter(|declared| !declared.is_empty()).unwrap_or(tag_name);
	format!("{TAG_PREFIX}{}", name.to_lowercase())
}

/// The authored block name of a component kind: `aem-cards` → `cards`.
#[must_use]
pub fn block_name(kind: &str) -> &str {
	kind.strip_prefix(TAG_PREFIX).unwrap_or(kind)
}

/// A container's declared type is its first class.
#[must_use]
pub fn declared_type(container: &Element) -> Option<String> {
	container.class_list().item(0)
}

/// Replaces `container` with an `aem-*` element holding the same markup, in the same position.
///
/// Every immediate child of the new element is marked with `slot="item"`.
///
/// # Errors
///
/// Iff a DOM call throws, for example because the derived tag name is not a valid element name.
#[instrument]
pub fn upgrade(container: &Element) -> Result<Element, LoadError> {
	let tag = component_tag(declared_type(container).as_deref(), &container.local_name());
	let document = container.owner_document().ok_or_else(|| LoadError::Dom {
		message: "container has no owner document".to_owned(),
	})?;

	let element = document.create_element(&tag).map_err(|error| LoadError::dom(&error))?;
	element.set_inner_html(&container.inner_html());

	if let Some(parent) = container.parent_node() {
		parent.replace_child(&element, container).map_err(|error| LoadError::dom(&error))?;
	}

	let mut child = element.first_element_child();
	while let Some(item) = child {
		item.set_attribute("slot", ITEM_SLOT).map_err(|error| LoadError::dom(&error))?;
		child = item.next_element_sibling();
	}

	trace!("Upgraded to <{}>.", tag);
	Ok(element)
}
