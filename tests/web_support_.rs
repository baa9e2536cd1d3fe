#![allow(dead_code)]

use aem_block_loader::{
	fetch::{Response, Transport},
	rum::Environment,
	Behavior, BehaviorFactory, Context, LoadError, ModuleSource,
};
use async_trait::async_trait;
use std::{
	cell::{Cell, RefCell},
	collections::HashMap,
	rc::Rc,
	sync::Once,
};
use wasm_bindgen::JsCast;
use web_sys::{window, Document, Element, HtmlElement};

static LOG_INIT: Once = Once::new();

pub fn init_logging() {
	//TODO: Fail on Warning or Error where a test doesn't expect one.
	LOG_INIT.call_once(tracing_wasm::set_as_global_default);
}

pub fn document() -> Document {
	window().unwrap().document().unwrap()
}

pub fn body() -> HtmlElement {
	document().body().unwrap()
}

/// Replaces the page content with `html` and clears templates and status left over from other tests.
pub fn fixture(html: &str) -> HtmlElement {
	init_logging();
	let body = body();
	body.set_inner_html(html);
	body.remove_attribute("data-status").unwrap();
	body
}

pub fn select(selector: &str) -> Element {
	document().query_selector(selector).unwrap().unwrap_or_else(|| panic!("{selector} not found"))
}

pub fn select_all(selector: &str) -> Vec<Element> {
	let nodes = document().query_selector_all(selector).unwrap();
	(0..nodes.length()).map(|i| nodes.item(i).unwrap().dyn_into().unwrap()).collect()
}

pub fn context() -> Rc<Context> {
	Rc::new(Context::from_window().unwrap())
}

#[derive(Default)]
pub struct MockTransport {
	responses: RefCell<HashMap<String, Response>>,
	requests: RefCell<Vec<String>>,
}

impl MockTransport {
	pub fn with(self, url: impl Into<String>, status: u16, body: &str) -> Self {
		self.responses.borrow_mut().insert(
			url.into(),
			Response {
				status,
				body: body.to_owned(),
			},
		);
		self
	}

	pub fn requests(&self) -> Vec<String> {
		self.requests.borrow().clone()
	}

	pub fn count(&self, url: &str) -> usize {
		self.requests.borrow().iter().filter(|request| *request == url).count()
	}
}

#[async_trait(?Send)]
impl Transport for MockTransport {
	async fn get(&self, url: &str) -> Result<Response, LoadError> {
		self.requests.borrow_mut().push(url.to_owned());
		// Yield once, so that concurrent loads actually overlap.
		wasm_bindgen_futures::JsFuture::from(js_sys::Promise::resolve(&wasm_bindgen::JsValue::NULL)).await.unwrap();
		Ok(self.responses.borrow().get(url).cloned().unwrap_or(Response {
			status: 404,
			body: String::new(),
		}))
	}
}

/// Resolves the blocks it was given, fails for everything else.
#[derive(Default)]
pub struct MockModules {
	factories: HashMap<String, Rc<dyn BehaviorFactory>>,
	imports: RefCell<Vec<String>>,
}

impl MockModules {
	pub fn with(mut self, kind: &str, factory: impl BehaviorFactory + 'static) -> Self {
		self.factories.insert(kind.to_owned(), Rc::new(factory));
		self
	}

	pub fn imports(&self) -> Vec<String> {
		self.imports.borrow().clone()
	}
}

#[async_trait(?Send)]
impl ModuleSource for MockModules {
	async fn import(&self, kind: &str, _url: &str) -> Result<Rc<dyn BehaviorFactory>, LoadError> {
		self.imports.borrow_mut().push(kind.to_owned());
		self.factories
			.get(kind)
			.cloned()
			.ok_or_else(|| LoadError::MissingExport { kind: kind.to_owned() })
	}
}

/// A list-mode behavior that does nothing.
pub struct Plain;
impl Behavior for Plain {}

pub fn plain() -> Box<dyn Behavior> {
	Box::new(Plain)
}

/// Unselected at the default weight. Keeps every beacon it is handed.
#[derive(Default)]
pub struct SilentEnvironment {
	pub beacons: RefCell<Vec<(String, String)>>,
	pub clock: Cell<f64>,
}

impl Environment for SilentEnvironment {
	fn random(&self) -> f64 {
		0.5
	}

	fn now(&self) -> f64 {
		self.clock.get()
	}

	fn send_beacon(&self, url: &str, body: &str) -> bool {
		self.beacons.borrow_mut().push((url.to_owned(), body.to_owned()));
		true
	}
}
