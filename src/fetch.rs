//! Cached, deduplicated loading of templates, code modules and stylesheets.

use crate::{
	config::Context,
	error::LoadError,
	modules::{BehaviorFactory, ModuleSource},
	transform::block_name,
};
use async_trait::async_trait;
use core::fmt::{self, Debug, Formatter};
use futures::{
	future::{LocalBoxFuture, Shared},
	FutureExt,
};
use hashbrown::{hash_map::Entry, HashMap};
use js_sys::Promise;
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, instrument, trace, warn};
use wasm_bindgen::{JsCast, UnwrapThrowExt};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlLinkElement, HtmlTemplateElement};

/// The parts of an HTTP response the loaders care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
	pub status: u16,
	pub body: String,
}

impl Response {
	#[must_use]
	pub fn ok(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Network access, abstracted so pages can be loaded against canned responses.
#[async_trait(?Send)]
pub trait Transport {
	/// Resolves with any HTTP response, successful or not.
	///
	/// # Errors
	///
	/// [`LoadError::Transport`] iff no response was received at all.
	async fn get(&self, url: &str) -> Result<Response, LoadError>;
}

/// [`Transport`] over `window.fetch`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebTransport;

#[async_trait(?Send)]
impl Transport for WebTransport {
	#[instrument]
	async fn get(&self, url: &str) -> Result<Response, LoadError> {
		let window = web_sys::window().expect_throw("aem-block-loader: No window.");
		let response = JsFuture::from(window.fetch_with_str(url))
			.await
			.map_err(|error| LoadError::transport(url, &error))?
			.dyn_into::<web_sys::Response>()
			.map_err(|error| LoadError::transport(url, &error))?;
		let status = response.status();
		let text = response.text().map_err(|error| LoadError::transport(url, &error))?;
		let body = JsFuture::from(text)
			.await
			.map_err(|error| LoadError::transport(url, &error))?
			.as_string()
			.unwrap_or_default();
		Ok(Response { status, body })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
	Template,
	Code,
	Stylesheet,
}

#[derive(Clone)]
pub enum Resource {
	/// [`None`] iff the kind has no template.
	Template(Option<HtmlTemplateElement>),
	Code(Rc<dyn BehaviorFactory>),
	Stylesheet(HtmlLinkElement),
}

impl Debug for Resource {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
			Self::Code(_) => f.debug_tuple("Code").finish_non_exhaustive(),
			Self::Stylesheet(link) => f.debug_tuple("Stylesheet").field(link).finish(),
		}
	}
}

type PendingLoad = Shared<LocalBoxFuture<'static, Result<Resource, LoadError>>>;

/// Loads each `(kind, resource type)` pair at most once per page.
///
/// Concurrent requests for the same pair share a single in-flight load, and its outcome (including failure) is kept.
pub struct ResourceFetcher {
	context: Rc<Context>,
	document: Document,
	transport: Rc<dyn Transport>,
	modules: Rc<dyn ModuleSource>,
	loads: RefCell<HashMap<(ResourceType, String), PendingLoad>>,
}

impl Debug for ResourceFetcher {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceFetcher")
			.field("code_base_path", &self.context.code_base_path)
			.field("loads", &self.loads.borrow().len())
			.finish_non_exhaustive()
	}
}

impl ResourceFetcher {
	#[must_use]
	pub fn new(context: Rc<Context>, document: Document, transport: Rc<dyn Transport>, modules: Rc<dyn ModuleSource>) -> Self {
		Self {
			context,
			document,
			transport,
			modules,
			loads: RefCell::default(),
		}
	}

	/// For [`ResourceType::Stylesheet`], `kind` is the stylesheet's href.
	///
	/// # Errors
	///
	/// The cached outcome of the (single) load of this resource.
	#[instrument(skip(self))]
	pub async fn load(&self, kind: &str, resource_type: ResourceType) -> Result<Resource, LoadError> {
		if resource_type == ResourceType::Template {
			if let Some(template) = find_template(&self.document, kind) {
				trace!("Template {} already present.", kind);
				return Ok(Resource::Template(Some(template)));
			}
		}

		let pending = match self.loads.borrow_mut().entry((resource_type, kind.to_owned())) {
			Entry::Occupied(occupied) => {
				debug!("Joining existing load.");
				occupied.get().clone()
			}
			Entry::Vacant(vacant) => vacant.insert(self.start(kind, resource_type)).clone(),
		};
		pending.await
	}

	/// # Errors
	///
	/// Anything but a missing template, which resolves to [`None`].
	pub async fn load_template(&self, kind: &str) -> Result<Option<HtmlTemplateElement>, LoadError> {
		match self.load(kind, ResourceType::Template).await? {
			Resource::Template(template) => Ok(template),
			other => unreachable!("template load resolved to {:?}", other),
		}
	}

	/// # Errors
	///
	/// Iff the kind's module can't be resolved. This is logged as warning.
	pub async fn load_code(&self, kind: &str) -> Result<Rc<dyn BehaviorFactory>, LoadError> {
		match self.load(kind, ResourceType::Code).await? {
			Resource::Code(factory) => Ok(factory),
			other => unreachable!("code load resolved to {:?}", other),
		}
	}

	/// # Errors
	///
	/// Iff the stylesheet fires its error event.
	pub async fn load_css(&self, href: &str) -> Result<HtmlLinkElement, LoadError> {
		match self.load(href, ResourceType::Stylesheet).await? {
			Resource::Stylesheet(link) => Ok(link),
			other => unreachable!("stylesheet load resolved to {:?}", other),
		}
	}

	fn start(&self, kind: &str, resource_type: ResourceType) -> PendingLoad {
		let kind = kind.to_owned();
		let context = Rc::clone(&self.context);
		let document = self.document.clone();
		match resource_type {
			ResourceType::Template => {
				let transport = Rc::clone(&self.transport);
				async move { fetch_template(&context, &document, transport.as_ref(), &kind).await.map(Resource::Template) }.boxed_local()
			}
			ResourceType::Code => {
				let modules = Rc::clone(&self.modules);
				async move {
					let url = context.block_resource_url(block_name(&kind), "js");
					modules.import(&kind, &url).await.map(Resource::Code).map_err(|error| {
						warn!("Failed to load module for {}: {}", kind, error);
						error
					})
				}
				.boxed_local()
			}
			ResourceType::Stylesheet => async move { load_stylesheet(&document, &kind).await.map(Resource::Stylesheet) }.boxed_local(),
		}
		.shared()
	}
}

#[must_use]
pub fn find_template(document: &Document, kind: &str) -> Option<HtmlTemplateElement> {
	document.get_element_by_id(kind)?.dyn_into::<HtmlTemplateElement>().ok()
}

async fn fetch_template(context: &Context, document: &Document, transport: &dyn Transport, kind: &str) -> Result<Option<HtmlTemplateElement>, LoadError> {
	let url = context.block_resource_url(block_name(kind), "html");
	let response = transport.get(&url).await?;
	match response.status {
		404 => {
			debug!("No template for {}.", kind);
			return Ok(None);
		}
		status if !response.ok() => return Err(LoadError::Http { url, status }),
		_ => (),
	}

	// Another load may have raced this one through a different fetcher.
	if let Some(template) = find_template(document, kind) {
		return Ok(Some(template));
	}

	let template: HtmlTemplateElement = document.create_element("template").map_err(|error| LoadError::dom(&error))?.unchecked_into();
	template.set_id(kind);
	template.set_inner_html(&response.body);
	let parent = document.body().expect_throw("aem-block-loader: No document body.");
	parent.append_child(&template).map_err(|error| LoadError::dom(&error))?;
	Ok(Some(template))
}

/// Appends `<link rel="stylesheet">` and resolves on its load event.
/// If a link with the same href exists already, it is reused without waiting.
async fn load_stylesheet(document: &Document, href: &str) -> Result<HtmlLinkElement, LoadError> {
	let existing = document
		.query_selector(&format!("link[href=\"{href}\"]"))
		.map_err(|error| LoadError::dom(&error))?;
	if let Some(existing) = existing {
		if let Ok(link) = existing.dyn_into::<HtmlLinkElement>() {
			trace!("Stylesheet {} already linked.", href);
			return Ok(link);
		}
	}

	let link: HtmlLinkElement = document.create_element("link").map_err(|error| LoadError::dom(&error))?.unchecked_into();
	link.set_rel("stylesheet");
	link.set_href(href);
	let settled = Promise::new(&mut |resolve, reject| {
		link.set_onload(Some(&resolve));
		link.set_onerror(Some(&reject));
	});
	let head = document.head().expect_throw("aem-block-loader: No document head.");
	head.append_child(&link).map_err(|error| LoadError::dom(&error))?;

	let outcome = JsFuture::from(settled).await;
	link.set_onload(None);
	link.set_onerror(None);
	match outcome {
		Ok(_) => Ok(link),
		Err(_) => {
			warn!("Stylesheet {} failed to load.", href);
			Err(LoadError::Stylesheet { href: href.to_owned() })
		}
	}
}
