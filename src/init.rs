//! Page initialization, in order:
//!
//! 1. `top` checkpoint
//! 2. eager image marking and hero promotion in the main region
//! 3. fragment preloading (all placeholders, best-effort)
//! 4. block discovery
//! 5. template and code loading, as two concurrent batches that are each allowed to partially fail
//! 6. component registration for every kind whose code resolved
//! 7. `data-status="loaded"` on the body
//!
//! [`Loader::load_lazy`] then reports `lazy` and pulls in the non-critical stylesheet.

use crate::{
	config::Context,
	discovery::{self, Discovered, STATUS_ATTRIBUTE, STATUS_LOADED},
	error::LoadError,
	fetch::{ResourceFetcher, Transport, WebTransport},
	fragment::{self, FragmentOutcome},
	hero, listeners,
	modules::ModuleSource,
	registry::ComponentRegistry,
	rum::{Data, Environment, Sampler, WindowEnvironment},
};
use core::fmt::{self, Debug, Formatter};
use futures::future::{join, join_all};
use serde_json::Value;
use std::rc::Rc;
use tracing::{error, info, instrument, warn};
use wasm_bindgen::{JsCast, UnwrapThrowExt};
use web_sys::{Document, Element, ErrorEvent, Event};

pub const LAZY_STYLES: &str = "styles/lazy-styles.css";
pub const ENHANCER_PATH: &str = "@adobe/helix-rum-enhancer@^1/src/index.js";

/// What [`Loader::init`] did.
#[derive(Debug, Default)]
pub struct InitReport {
	pub hero: bool,
	pub fragments: Vec<FragmentOutcome>,
	pub discovered: Discovered,
	/// Kinds whose behavior was defined.
	pub registered: Vec<String>,
	/// Kinds whose code failed to load. They stay plain, un-upgraded elements.
	pub failed: Vec<(String, LoadError)>,
	/// Template loads that failed for reasons other than the template not existing.
	pub template_failures: Vec<(String, LoadError)>,
}

pub struct Loader<E: Environment = WindowEnvironment> {
	context: Rc<Context>,
	document: Document,
	transport: Rc<dyn Transport>,
	fetcher: ResourceFetcher,
	registry: ComponentRegistry,
	sampler: Rc<Sampler<E>>,
}

impl<E: Environment> Debug for Loader<E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Loader")
			.field("context", &self.context)
			.field("fetcher", &self.fetcher)
			.field("registry", &self.registry)
			.field("sampler", &self.sampler)
			.finish_non_exhaustive()
	}
}

impl Loader<WindowEnvironment> {
	/// A loader for the current page, over `window.fetch` and `navigator.sendBeacon`.
	#[must_use]
	pub fn for_window(context: Context, modules: impl ModuleSource + 'static) -> Self {
		let document = web_sys::window()
			.and_then(|window| window.document())
			.expect_throw("aem-block-loader: No document.");
		let sampler = Rc::new(Sampler::for_context(&context));
		Self::new(Rc::new(context), document, Rc::new(WebTransport), Rc::new(modules), sampler)
	}
}

impl<E: Environment + 'static> Loader<E> {
	#[must_use]
	pub fn new(context: Rc<Context>, document: Document, transport: Rc<dyn Transport>, modules: Rc<dyn ModuleSource>, sampler: Rc<Sampler<E>>) -> Self {
		if !context.lighthouse {
			let document = document.clone();
			let src = format!("{}/{ENHANCER_PATH}", context.rum.endpoint);
			sampler.on("lazy", move |_: &Data| inject_script(&document, &src));
		}

		Self {
			fetcher: ResourceFetcher::new(Rc::clone(&context), document.clone(), Rc::clone(&transport), modules),
			registry: ComponentRegistry::new(Rc::clone(&context), document.clone()),
			context,
			document,
			transport,
			sampler,
		}
	}

	#[must_use]
	pub fn context(&self) -> &Context {
		&self.context
	}

	#[must_use]
	pub fn fetcher(&self) -> &ResourceFetcher {
		&self.fetcher
	}

	#[must_use]
	pub fn registry(&self) -> &ComponentRegistry {
		&self.registry
	}

	#[must_use]
	pub fn sampler(&self) -> &Rc<Sampler<E>> {
		&self.sampler
	}

	/// Wires telemetry, then runs [`Loader::init`] and [`Loader::load_lazy`] in the background.
	pub fn start(self: Rc<Self>) {
		if let Err(error) = self.wire_page_events() {
			warn!("Failed to wire page events: {}", crate::error::describe(&error));
		}
		wasm_bindgen_futures::spawn_local(async move {
			match self.init().await {
				Ok(report) => {
					info!(registered = report.registered.len(), failed = report.failed.len(), "Page loaded.");
					self.load_lazy().await;
				}
				Err(error) => error!("Page initialization aborted: {}", error),
			}
		});
	}

	/// Loads the page's blocks. Individual resource failures are collected in the report.
	///
	/// # Errors
	///
	/// Iff the document is structurally unusable or authored content is malformed ([`LoadError::MalformedItem`]).
	/// The body isn't marked as loaded in that case.
	#[instrument(skip(self))]
	pub async fn init(&self) -> Result<InitReport, LoadError> {
		self.sampler.record("top", Data::new());

		let mut report = InitReport::default();
		let body: Element = self
			.document
			.body()
			.ok_or_else(|| LoadError::Dom {
				message: "document has no body".to_owned(),
			})?
			.into();

		let main = self.document.query_selector(&self.context.selectors.main).map_err(|error| LoadError::dom(&error))?;
		if let Some(main) = &main {
			mark_eager_images(main, self.context.eager_images)?;
			report.hero = hero::promote_hero(main)?.is_some();
		}

		report.fragments = fragment::preload_all(&self.context, self.transport.as_ref(), &body).await;

		report.discovered = discovery::scan(&body, &self.context.selectors)?;

		let templates = join_all(report.discovered.template_kinds.iter().map(|kind| async move { (kind, self.fetcher.load_template(kind).await) }));
		let code = join_all(report.discovered.component_kinds.iter().map(|kind| async move { (kind, self.fetcher.load_code(kind).await) }));
		let (templates, code) = join(templates, code).await;

		for (kind, result) in templates {
			if let Err(error) = result {
				warn!("Template for {} failed to load: {}", kind, error);
				report.template_failures.push((kind.clone(), error));
			}
		}

		let mut registered = Vec::new();
		let mut failed = Vec::new();
		for (kind, result) in code {
			match result {
				Ok(factory) => {
					self.registry.define(kind, factory)?;
					registered.push(kind.clone());
				}
				Err(error) => failed.push((kind.clone(), error)),
			}
		}
		report.registered = registered;
		report.failed = failed;

		body.set_attribute(STATUS_ATTRIBUTE, STATUS_LOADED).map_err(|error| LoadError::dom(&error))?;
		Ok(report)
	}

	/// Best-effort, after [`Loader::init`].
	#[instrument(skip(self))]
	pub async fn load_lazy(&self) {
		self.sampler.record("lazy", Data::new());
		let href = format!("{}/{LAZY_STYLES}", self.context.code_base_path);
		if let Err(error) = self.fetcher.load_css(&href).await {
			warn!("{}", error);
		}
	}

	/// Reports `load` and `error` window events. Each is wired once per page.
	///
	/// # Errors
	///
	/// Iff `addEventListener` throws.
	pub fn wire_page_events(&self) -> Result<(), wasm_bindgen::JsValue> {
		let window = web_sys::window().expect_throw("aem-block-loader: No window.");

		let sampler = Rc::clone(&self.sampler);
		listeners::publish(&window, "load", "rum", move |_| sampler.record("load", Data::new()))?;

		let sampler = Rc::clone(&self.sampler);
		listeners::publish(&window, "error", "rum", move |event| sampler.record("error", error_details(&event)))
	}
}

/// The `error` checkpoint fields for a window error event: `source` is the script URL, `target` the line.
#[must_use]
pub fn error_details(event: &Event) -> Data {
	let mut data = Data::new();
	if let Some(event) = event.dyn_ref::<ErrorEvent>() {
		data.insert("source".to_owned(), Value::from(event.filename()));
		data.insert("target".to_owned(), Value::from(event.lineno()));
	}
	data
}

/// Lets the first `count` images of `main` load eagerly.
///
/// # Errors
///
/// Iff a DOM operation throws.
pub fn mark_eager_images(main: &Element, count: usize) -> Result<(), LoadError> {
	if count == 0 {
		return Ok(());
	}
	let images = main.query_selector_all("img").map_err(|error| LoadError::dom(&error))?;
	for image in (0..images.length()).filter_map(|i| images.item(i)).filter_map(|node| node.dyn_into::<Element>().ok()).take(count) {
		image.set_attribute("loading", "eager").map_err(|error| LoadError::dom(&error))?;
	}
	Ok(())
}

/// Appends `<script src=…>` to the head unless it's already there.
fn inject_script(document: &Document, src: &str) -> Result<(), LoadError> {
	if document.query_selector(&format!("script[src=\"{src}\"]")).map_err(|error| LoadError::dom(&error))?.is_some() {
		return Ok(());
	}
	let head = document.head().ok_or_else(|| LoadError::Dom {
		message: "document has no head".to_owned(),
	})?;
	let script = document.create_element("script").map_err(|error| LoadError::dom(&error))?;
	script.set_attribute("src", src).map_err(|error| LoadError::dom(&error))?;
	head.append_child(&script).map_err(|error| LoadError::dom(&error))?;
	Ok(())
}
