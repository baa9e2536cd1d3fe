//! Defines component kinds and upgrades their elements.

use crate::{component::Component, config::Context, error::LoadError, modules::BehaviorFactory};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{debug, instrument, warn};
use wasm_bindgen::JsCast;
use web_sys::{Document, Element};

/// The counterpart of `customElements`: once a kind is defined, each of its elements is wrapped in a [`Component`].
///
/// Components are kept alive (and attached) for as long as the registry is.
pub struct ComponentRegistry {
	context: Rc<Context>,
	document: Document,
	definitions: RefCell<HashMap<String, Rc<dyn BehaviorFactory>>>,
	components: RefCell<Vec<Component>>,
}

impl Debug for ComponentRegistry {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentRegistry")
			.field("definitions", &self.definitions.borrow().keys().collect::<Vec<_>>())
			.field("components", &self.components.borrow().len())
			.finish_non_exhaustive()
	}
}

impl ComponentRegistry {
	#[must_use]
	pub fn new(context: Rc<Context>, document: Document) -> Self {
		Self {
			context,
			document,
			definitions: RefCell::default(),
			components: RefCell::default(),
		}
	}

	#[must_use]
	pub fn is_defined(&self, kind: &str) -> bool {
		self.definitions.borrow().contains_key(kind)
	}

	#[must_use]
	pub fn get(&self, kind: &str) -> Option<Rc<dyn BehaviorFactory>> {
		self.definitions.borrow().get(kind).cloned()
	}

	/// Defines `kind` and upgrades its existing elements in the document.
	/// Redefinitions are ignored with a warning.
	///
	/// Returns how many elements were upgraded.
	///
	/// # Errors
	///
	/// Iff an element's authored content is malformed ([`LoadError::MalformedItem`]).
	/// Elements upgraded before that stay upgraded. Other failures only skip the element they occur for.
	#[instrument(skip(self, factory))]
	pub fn define(&self, kind: &str, factory: Rc<dyn BehaviorFactory>) -> Result<usize, LoadError> {
		if self.is_defined(kind) {
			warn!("{} is already defined.", kind);
			return Ok(0);
		}
		self.definitions.borrow_mut().insert(kind.to_owned(), factory);
		let root = self.document.document_element().ok_or_else(|| LoadError::Dom {
			message: "document has no root element".to_owned(),
		})?;
		self.upgrade_kind(&root, kind)
	}

	/// Upgrades the elements of all defined kinds at or below `root` that aren't upgraded yet.
	///
	/// # Errors
	///
	/// Iff an element's authored content is malformed. See [`ComponentRegistry::define`].
	pub fn upgrade(&self, root: &Element) -> Result<usize, LoadError> {
		let kinds: Vec<String> = self.definitions.borrow().keys().cloned().collect();
		let mut count = 0;
		for kind in kinds {
			count += self.upgrade_kind(root, &kind)?;
		}
		Ok(count)
	}

	fn upgrade_kind(&self, root: &Element, kind: &str) -> Result<usize, LoadError> {
		let Some(factory) = self.get(kind) else { return Ok(0) };

		let mut elements = Vec::new();
		if root.local_name() == kind {
			elements.push(root.clone());
		}
		let found = root.query_selector_all(kind).map_err(|error| LoadError::dom(&error))?;
		elements.extend((0..found.length()).filter_map(|i| found.item(i)).filter_map(|node| node.dyn_into::<Element>().ok()));

		let mut count = 0;
		for element in elements {
			if element.shadow_root().is_some() {
				continue;
			}
			let component = match Component::construct(Rc::clone(&self.context), element, factory.create()) {
				Ok(component) => component,
				Err(error @ LoadError::MalformedItem { .. }) => return Err(error),
				Err(error) => {
					warn!("Skipping <{}>: {}", kind, error);
					continue;
				}
			};
			if let Err(error) = component.connect() {
				warn!("Could not attach <{}>: {}", kind, error);
				continue;
			}
			self.components.borrow_mut().push(component);
			count += 1;
		}
		debug!("Upgraded {} <{}> element(s).", count, kind);
		Ok(count)
	}

	/// Runs `f` with the components upgraded so far, in upgrade order.
	pub fn with_components<R>(&self, f: impl FnOnce(&[Component]) -> R) -> R {
		f(&self.components.borrow())
	}

	/// Detaches and drops every component whose element is no longer in the document.
	pub fn collect_detached(&self) -> usize {
		let mut components = self.components.borrow_mut();
		let before = components.len();
		components.retain(|component| {
			let attached = component.element().is_connected();
			if !attached {
				component.disconnect();
			}
			attached
		});
		before - components.len()
	}
}
