//! Page-lifetime event listeners on `window`.
//!
//! The JavaScript side only holds a function reference, so the Rust closures are kept here until unpublished.

use core::cell::RefCell;
use hashbrown::{hash_map::Entry, HashMap};
use tracing::{trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Event, EventTarget};

thread_local! {
	#[allow(clippy::type_complexity)]
	static LISTENERS: RefCell<HashMap<(&'static str, &'static str), (EventTarget, Closure<dyn Fn(Event)>)>> = RefCell::default();
}

/// Adds `handler` as listener for `event` on `target` under `key`.
///
/// Each `(event, key)` combination can only be published once at a time. Republishing is warned about and ignored.
///
/// # Errors
///
/// Iff `addEventListener` throws.
pub fn publish(target: &EventTarget, event: &'static str, key: &'static str, handler: impl Fn(Event) + 'static) -> Result<(), JsValue> {
	LISTENERS.with(|listeners| {
		let mut listeners = listeners.borrow_mut();
		let vacant = match listeners.entry((event, key)) {
			Entry::Vacant(vacant) => vacant,
			Entry::Occupied(_) => {
				warn!("Listener {}/{} is already published.", event, key);
				return Ok(());
			}
		};
		let closure = Closure::wrap(Box::new(handler) as Box<dyn Fn(Event)>);
		target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
		vacant.insert((target.clone(), closure));
		trace!("Published {}/{}.", event, key);
		Ok(())
	})
}

/// Removes and frees a listener added through [`publish`]. Returns whether there was one.
pub fn unpublish(event: &'static str, key: &'static str) -> bool {
	let removed = LISTENERS.with(|listeners| listeners.borrow_mut().remove(&(event, key)));
	match removed {
		Some((target, closure)) => {
			// Removal can only fail for invalid arguments, which these aren't.
			let _ = target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
			trace!("Unpublished {}/{}.", event, key);
			true
		}
		None => false,
	}
}

#[must_use]
pub fn is_published(event: &'static str, key: &'static str) -> bool {
	LISTENERS.with(|listeners| listeners.borrow().contains_key(&(event, key)))
}
