//! Finds block containers, upgrades them and collects the kinds whose resources are needed.

use crate::{config::Selectors, error::LoadError, transform};
use hashbrown::HashSet;
use tracing::{debug, instrument, trace};
use wasm_bindgen::JsCast;
use web_sys::Element;

pub const STATUS_ATTRIBUTE: &str = "data-status";
pub const STATUS_LOADING: &str = "loading";
pub const STATUS_LOADED: &str = "loaded";

/// Kinds ending in this carry page metadata only and never have a template.
pub const METADATA_SUFFIX: &str = "-metadata";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovered {
	pub component_kinds: HashSet<String>,
	pub template_kinds: HashSet<String>,
}

impl Discovered {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.component_kinds.is_empty()
	}
}

/// Whether a container was picked up by an earlier scan.
#[must_use]
pub fn is_claimed(container: &Element) -> bool {
	matches!(container.get_attribute(STATUS_ATTRIBUTE).as_deref(), Some(STATUS_LOADING | STATUS_LOADED))
}

/// Upgrades every unclaimed block container below `root`.
///
/// Containers are claimed by their status attribute, so rescanning the same tree yields nothing new.
/// Nested containers (blocks inlined into a header or footer through a fragment) are upgraded before the containers
/// around them, so that their upgraded markup is what the outer component copies.
///
/// # Errors
///
/// Iff a DOM operation throws. Containers processed before that stay upgraded.
#[instrument(skip(selectors))]
pub fn scan(root: &Element, selectors: &Selectors) -> Result<Discovered, LoadError> {
	let containers = root.query_selector_all(&selectors.containers).map_err(|error| LoadError::dom(&error))?;

	let mut discovered = Discovered::default();
	// Reverse document order visits descendants before their ancestors.
	for i in (0..containers.length()).rev() {
		let Some(container) = containers.item(i).and_then(|node| node.dyn_into::<Element>().ok()) else { continue };
		if !root.contains(Some(container.as_ref())) {
			trace!("Skipping detached container {:?}", container);
			continue;
		}
		if is_claimed(&container) {
			trace!("Skipping claimed container {:?}", container);
			continue;
		}
		container.set_attribute(STATUS_ATTRIBUTE, STATUS_LOADING).map_err(|error| LoadError::dom(&error))?;

		let element = transform::upgrade(&container)?;
		let kind = element.local_name();
		if !kind.ends_with(METADATA_SUFFIX) {
			discovered.template_kinds.insert(kind.clone());
		}
		discovered.component_kinds.insert(kind);

		container.set_attribute(STATUS_ATTRIBUTE, STATUS_LOADED).map_err(|error| LoadError::dom(&error))?;
		element.set_attribute(STATUS_ATTRIBUTE, STATUS_LOADED).map_err(|error| LoadError::dom(&error))?;
	}

	debug!(components = discovered.component_kinds.len(), templates = discovered.template_kinds.len(), "Scan complete.");
	Ok(discovered)
}
