//! The base every upgraded `aem-*` element is wrapped in.
//!
//! A [`Component`] is constructed exactly once per element. Construction attaches an open shadow root,
//! instantiates the kind's template into it (if there is one) and classifies the element's items
//! (its `slot="item"` children) according to the [`Behavior`]'s [`ValueMode`]:
//!
//! - [`ValueMode::List`] collects the items in document order and leaves them untouched.
//! - [`ValueMode::Mapped`] reads each item as label/value pair, renames its slot to the label and replaces its
//!   content with the value markup. A `style` label (any case) adds the value as classes to the host,
//!   any other label becomes a `data-*` attribute.
//!
//! Items added after construction are never classified. They only receive icon decoration while the component is
//! [attached](`Lifecycle::Attached`).

use crate::{
	config::Context,
	error::LoadError,
	fetch::find_template,
	icons::decorate_inserted,
	modules::{Behavior, ValueMode},
	transform::ITEM_SLOT,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use js_sys::Array;
use std::rc::Rc;
use tracing::{instrument, trace, trace_span};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord, Node, ShadowRoot, ShadowRootInit, ShadowRootMode};

/// The label that is applied as classes rather than as data attribute.
pub const STYLE_KEY: &str = "style";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
	Constructed,
	Attached,
	Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Values {
	List(Vec<Element>),
	Mapped(HashMap<String, String>),
}

pub struct Component {
	tag: String,
	element: Element,
	root: ShadowRoot,
	values: Values,
	lifecycle: Cell<Lifecycle>,
	watcher: SubtreeWatcher,
	behavior: RefCell<Box<dyn Behavior>>,
	context: Rc<Context>,
}

impl Debug for Component {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("tag", &self.tag)
			.field("lifecycle", &self.lifecycle.get())
			.field("values", &self.values)
			.finish_non_exhaustive()
	}
}

impl Component {
	/// Wraps `element`. Call [`Component::connect`] to start observing it.
	///
	/// # Errors
	///
	/// [`LoadError::MalformedItem`] iff an item of a [mapped](`ValueMode::Mapped`) component lacks its label or value.
	/// This is an authoring mistake and isn't recovered from: the element may be left partially classified.
	///
	/// Otherwise, whatever [`Behavior::decorate`] fails with, or [`LoadError::Dom`] (for example if `element` already has a shadow root).
	#[instrument(skip(context, behavior))]
	pub fn construct(context: Rc<Context>, element: Element, behavior: Box<dyn Behavior>) -> Result<Self, LoadError> {
		let tag = element.local_name();

		let root = element.attach_shadow(&ShadowRootInit::new(ShadowRootMode::Open)).map_err(|error| LoadError::dom(&error))?;
		let template = element.owner_document().and_then(|document| find_template(&document, &tag));
		match template {
			Some(template) => {
				let content = template.content().clone_node_with_deep(true).map_err(|error| LoadError::dom(&error))?;
				root.append_child(&content).map_err(|error| LoadError::dom(&error))?;
			}
			None => root.set_inner_html(&format!("<slot name=\"{ITEM_SLOT}\"></slot><slot></slot>")),
		}

		let items = items(&element);
		let values = match behavior.mode() {
			ValueMode::List => Values::List(items),
			ValueMode::Mapped => Values::Mapped(map_items(&tag, &element, &items)?),
		};

		let component = Self {
			watcher: SubtreeWatcher::new(Rc::clone(&context))?,
			tag,
			element,
			root,
			values,
			lifecycle: Cell::new(Lifecycle::Constructed),
			behavior: RefCell::new(behavior),
			context,
		};
		component.behavior.borrow_mut().decorate(&component)?;
		Ok(component)
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn element(&self) -> &Element {
		&self.element
	}

	#[must_use]
	pub fn root(&self) -> &ShadowRoot {
		&self.root
	}

	#[must_use]
	pub fn values(&self) -> &Values {
		&self.values
	}

	/// The items in document order, iff this is a list component.
	#[must_use]
	pub fn list(&self) -> Option<&[Element]> {
		match &self.values {
			Values::List(items) => Some(items),
			Values::Mapped(_) => None,
		}
	}

	#[must_use]
	pub fn mapped(&self) -> Option<&HashMap<String, String>> {
		match &self.values {
			Values::List(_) => None,
			Values::Mapped(mapping) => Some(mapping),
		}
	}

	/// The value markup for a label of a mapped component.
	#[must_use]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.mapped()?.get(key).map(String::as_str)
	}

	#[must_use]
	pub fn lifecycle(&self) -> Lifecycle {
		self.lifecycle.get()
	}

	/// Starts decorating inserted subtrees. Does nothing while already attached.
	///
	/// # Errors
	///
	/// Iff the mutation observer can't be started.
	pub fn connect(&self) -> Result<(), LoadError> {
		if self.lifecycle.get() == Lifecycle::Attached {
			trace!("<{}> is already attached.", self.tag);
			return Ok(());
		}
		self.watcher.observe(&self.element)?;
		self.lifecycle.set(Lifecycle::Attached);
		self.behavior.borrow_mut().connected(self);
		Ok(())
	}

	/// Stops decorating inserted subtrees. Does nothing unless attached.
	pub fn disconnect(&self) {
		if self.lifecycle.get() != Lifecycle::Attached {
			return;
		}
		self.watcher.stop();
		self.lifecycle.set(Lifecycle::Detached);
		self.behavior.borrow_mut().disconnected(self);
	}

	/// Runs the decoration pass for `nodes`, which were just inserted below this component.
	///
	/// This is what the mutation observer does too, but synchronously.
	pub fn notify_inserted(&self, nodes: impl IntoIterator<Item = Node>) {
		let span = trace_span!("notify_inserted", tag = %self.tag);
		let _enter = span.enter();
		decorate_inserted(&self.context, nodes);
	}
}

/// `element`'s children marked as items, in document order.
fn items(element: &Element) -> Vec<Element> {
	let mut items = Vec::new();
	let mut child = element.first_element_child();
	while let Some(item) = child {
		child = item.next_element_sibling();
		if item.get_attribute("slot").as_deref() == Some(ITEM_SLOT) {
			items.push(item);
		}
	}
	items
}

fn map_items(tag: &str, host: &Element, items: &[Element]) -> Result<HashMap<String, String>, LoadError> {
	let mut mapping = HashMap::with_capacity(items.len());
	for (index, item) in items.iter().enumerate() {
		let children = item.child_element_count();
		let pair = item.first_element_child().and_then(|label| {
			let value = label.next_element_sibling()?;
			Some((label, value))
		});
		let Some((label, value)) = pair else {
			return Err(LoadError::MalformedItem {
				tag: tag.to_owned(),
				index,
				children,
			});
		};

		let key = label.text_content().unwrap_or_default().trim().to_owned();
		let markup = value.inner_html().trim().to_owned();
		let text = value.text_content().unwrap_or_default();

		item.set_attribute("slot", &key).map_err(|error| LoadError::dom(&error))?;
		item.set_inner_html(&markup);

		if is_style_key(&key) {
			for class in text.split_whitespace() {
				host.class_list().add_1(class).map_err(|error| LoadError::dom(&error))?;
			}
		} else if let Some(attribute) = data_attribute_name(&key) {
			host.set_attribute(&attribute, text.trim()).map_err(|error| LoadError::dom(&error))?;
		}

		mapping.insert(key, markup);
	}
	Ok(mapping)
}

#[must_use]
pub fn is_style_key(key: &str) -> bool {
	key.eq_ignore_ascii_case(STYLE_KEY)
}

/// `"Background Color"` → `data-background-color`. [`None`] iff the label has no alphanumeric characters.
#[must_use]
pub fn data_attribute_name(key: &str) -> Option<String> {
	let mut name = String::from("data-");
	let mut pending_dash = false;
	for c in key.chars() {
		if c.is_alphanumeric() {
			if pending_dash && name.len() > "data-".len() {
				name.push('-');
			}
			pending_dash = false;
			name.extend(c.to_lowercase());
		} else {
			pending_dash = true;
		}
	}
	(name.len() > "data-".len()).then_some(name)
}

/// Decorates inserted subtrees from a [`MutationObserver`].
///
/// The observer is disconnected when this is dropped, as its callback doesn't outlive it.
struct SubtreeWatcher {
	observer: MutationObserver,
	_callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

impl SubtreeWatcher {
	fn new(context: Rc<Context>) -> Result<Self, LoadError> {
		let callback = Closure::wrap(Box::new(move |records: Array, _: MutationObserver| {
			for record in records.iter() {
				let Ok(record) = record.dyn_into::<MutationRecord>() else { continue };
				let added = record.added_nodes();
				decorate_inserted(&context, (0..added.length()).filter_map(|i| added.item(i)));
			}
		}) as Box<dyn FnMut(Array, MutationObserver)>);
		let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(|error| LoadError::dom(&error))?;
		Ok(Self { observer, _callback: callback })
	}

	fn observe(&self, target: &Node) -> Result<(), LoadError> {
		let options = MutationObserverInit::new();
		options.set_child_list(true);
		options.set_subtree(true);
		self.observer.observe_with_options(target, &options).map_err(|error| LoadError::dom(&error))
	}

	fn stop(&self) {
		self.observer.disconnect();
	}
}

impl Drop for SubtreeWatcher {
	fn drop(&mut self) {
		self.stop();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn style_key_ignores_case() {
		assert!(is_style_key("style"));
		assert!(is_style_key("STYLE"));
		assert!(is_style_key("Style"));
		assert!(!is_style_key("styles"));
		assert!(!is_style_key("Color"));
	}

	#[test]
	fn data_attribute_names() {
		assert_eq!(data_attribute_name("Color").as_deref(), Some("data-color"));
		assert_eq!(data_attribute_name("Background Color").as_deref(), Some("data-background-color"));
		assert_eq!(data_attribute_name("  link / target ").as_deref(), Some("data-link-target"));
		assert_eq!(data_attribute_name("--"), None);
		assert_eq!(data_attribute_name(""), None);
	}
}
