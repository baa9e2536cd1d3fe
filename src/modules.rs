//! Kind → behavior resolution.
//!
//! Blocks don't ship code that is evaluated at runtime. Instead, the host application bundles a
//! [`BehaviorFactory`] per kind and hands them to a [`ModuleSource`], which the loader queries
//! asynchronously the same way it would import a code module.

use crate::{component::Component, error::LoadError};
use async_trait::async_trait;
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{instrument, warn};

/// How a component interprets the items it was upgraded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueMode {
	/// Items stay in place and are collected in document order.
	#[default]
	List,
	/// Each item is a label/value pair that becomes a named slot.
	Mapped,
}

/// Per-kind presentation logic driven by a [`Component`].
///
/// Value extraction happens before [`Behavior::decorate`] is called, exactly once per element.
pub trait Behavior {
	fn mode(&self) -> ValueMode {
		ValueMode::List
	}

	/// Called once, right after construction.
	///
	/// # Errors
	///
	/// Failures abort the construction of this component only.
	fn decorate(&mut self, component: &Component) -> Result<(), LoadError> {
		let _ = component;
		Ok(())
	}

	/// May be called multiple times, alternating with [`Behavior::disconnected`].
	fn connected(&mut self, component: &Component) {
		let _ = component;
	}

	fn disconnected(&mut self, component: &Component) {
		let _ = component;
	}
}

/// Creates one [`Behavior`] instance per upgraded element.
pub trait BehaviorFactory {
	fn create(&self) -> Box<dyn Behavior>;
}

impl<F: Fn() -> Box<dyn Behavior>> BehaviorFactory for F {
	fn create(&self) -> Box<dyn Behavior> {
		self()
	}
}

/// Resolves the behavior of a component kind.
#[async_trait(?Send)]
pub trait ModuleSource {
	/// `url` is where the kind's code module would live and is informational.
	///
	/// # Errors
	///
	/// [`LoadError::MissingExport`] iff nothing is known for `kind`, or any transport error.
	async fn import(&self, kind: &str, url: &str) -> Result<Rc<dyn BehaviorFactory>, LoadError>;
}

/// Behaviors compiled into the application, keyed by block name (`cards`, not `aem-cards`).
#[derive(Default)]
pub struct BundledModules {
	factories: HashMap<String, Rc<dyn BehaviorFactory>>,
}

impl BundledModules {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers (or replaces) the behavior for `block`.
	#[must_use]
	pub fn with(mut self, block: impl Into<String>, factory: impl BehaviorFactory + 'static) -> Self {
		self.factories.insert(block.into(), Rc::new(factory));
		self
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.factories.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.factories.is_empty()
	}
}

impl Debug for BundledModules {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.factories.keys()).finish()
	}
}

#[async_trait(?Send)]
impl ModuleSource for BundledModules {
	#[instrument(skip(self))]
	async fn import(&self, kind: &str, url: &str) -> Result<Rc<dyn BehaviorFactory>, LoadError> {
		let block = crate::transform::block_name(kind);
		match self.factories.get(block) {
			Some(factory) => Ok(Rc::clone(factory)),
			None => {
				warn!("No behavior bundled for {}", kind);
				Err(LoadError::MissingExport { kind: kind.to_owned() })
			}
		}
	}
}
