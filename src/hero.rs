use crate::error::LoadError;
use tracing::{debug, instrument};
use web_sys::{Element, Node};

pub const HERO_CLASS: &str = "hero";

/// Moves a leading picture + `<h1>` into a new first section `<div class="hero">`.
///
/// Only applies if the first picture comes strictly before the first heading, at any depth.
/// Returns the new section, if any. A region that already starts with a hero section is left alone.
///
/// # Errors
///
/// Iff a DOM operation throws.
#[instrument]
pub fn promote_hero(main: &Element) -> Result<Option<Element>, LoadError> {
	if main.query_selector(&format!(":scope > .{HERO_CLASS}")).map_err(|error| LoadError::dom(&error))?.is_some() {
		debug!("Hero already present.");
		return Ok(None);
	}
	let h1 = main.query_selector("h1").map_err(|error| LoadError::dom(&error))?;
	let picture = main.query_selector("picture").map_err(|error| LoadError::dom(&error))?;
	let (Some(h1), Some(picture)) = (h1, picture) else {
		return Ok(None);
	};
	if picture.compare_document_position(&h1) & Node::DOCUMENT_POSITION_FOLLOWING == 0 {
		debug!("Heading precedes picture; not promoting.");
		return Ok(None);
	}

	let document = main.owner_document().ok_or_else(|| LoadError::Dom {
		message: "main region has no owner document".to_owned(),
	})?;
	let section = document.create_element("div").map_err(|error| LoadError::dom(&error))?;
	section.set_class_name(HERO_CLASS);
	for original in [&picture, &h1] {
		let clone = original.clone_node_with_deep(true).map_err(|error| LoadError::dom(&error))?;
		section.append_child(&clone).map_err(|error| LoadError::dom(&error))?;
	}

	let picture_parent = picture.parent_element();
	picture.remove();
	h1.remove();
	// Pictures are authored wrapped in a paragraph that's empty now.
	if let Some(parent) = picture_parent.filter(|parent| parent.local_name() == "p" && parent.child_element_count() == 0) {
		if parent.text_content().unwrap_or_default().trim().is_empty() {
			parent.remove();
		}
	}

	main.prepend_with_node_1(&section).map_err(|error| LoadError::dom(&error))?;
	debug!("Promoted hero.");
	Ok(Some(section))
}
