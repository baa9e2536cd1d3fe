use aem_block_loader::{
	config::{RumConfig, SELECTED_WEIGHT},
	init::{error_details, ENHANCER_PATH, LAZY_STYLES},
	listeners,
	rum::{Data, Sampler},
	Behavior, Component, Context, Loader, LoadError, ValueMode,
};
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, ErrorEvent, ErrorEventInit, Event};

wasm_bindgen_test_configure!(run_in_browser);

mod web_support_;
use web_support_::{body, document, fixture, plain, select, select_all, MockModules, MockTransport, SilentEnvironment};

fn loader(context: Context, transport: MockTransport, modules: MockModules, weight: u32) -> Loader<SilentEnvironment> {
	let rum = RumConfig {
		weight,
		..RumConfig::default()
	};
	let sampler = Rc::new(Sampler::new(rum, context.href.clone(), SilentEnvironment::default()));
	Loader::new(Rc::new(context), document(), Rc::new(transport), Rc::new(modules), sampler)
}

fn page_context() -> Context {
	Context::from_window().unwrap()
}

#[wasm_bindgen_test]
async fn one_failing_module_does_not_stop_the_page() {
	fixture(
		r#"<main>
			<div>
				<p><picture><img src="/media/a.png"></picture></p>
				<h1>Welcome</h1>
				<p><img src="/media/b.png"></p>
			</div>
			<div>
				<div class="cards"><div><div>a</div></div></div>
				<div class="broken"><div><div>b</div></div></div>
			</div>
		</main>"#,
	);
	let transport = MockTransport::default().with("/blocks/cards/cards.html", 200, "<slot name=\"item\"></slot>");
	let modules = MockModules::default().with("aem-cards", plain);
	let loader = loader(page_context(), transport, modules, 100);

	let report = loader.init().await.unwrap();

	assert!(report.hero);
	assert_eq!(report.registered, ["aem-cards"]);
	assert_eq!(report.failed, [("aem-broken".to_owned(), LoadError::MissingExport { kind: "aem-broken".to_owned() })]);
	assert!(report.template_failures.is_empty());

	assert_eq!(body().get_attribute("data-status").as_deref(), Some("loaded"));
	assert!(select("aem-cards").shadow_root().is_some());
	assert!(select("aem-broken").shadow_root().is_none());
	assert!(loader.registry().is_defined("aem-cards"));
	assert!(!loader.registry().is_defined("aem-broken"));

	let images = select_all("main img");
	assert_eq!(images[0].get_attribute("loading").as_deref(), Some("eager"));
	assert_eq!(images[1].get_attribute("loading"), None);
}

#[wasm_bindgen_test]
async fn fragments_are_inlined_before_discovery() {
	fixture(r#"<main><div><div class="fragment"><div><div>/fragments/promo</div></div></div></div></main>"#);
	let context = page_context();
	let transport = MockTransport::default().with(
		context.fragment_url("/fragments/promo").unwrap(),
		200,
		r#"<div><div class="teaser"><div><div>Sale</div></div></div></div>"#,
	);
	let modules = MockModules::default().with("aem-teaser", plain);
	let loader = loader(context, transport, modules, 100);

	let report = loader.init().await.unwrap();

	assert_eq!(report.fragments.len(), 1);
	assert_eq!(report.registered, ["aem-teaser"]);
	assert!(select_all(".fragment div.teaser").is_empty());
	assert!(select(".fragment aem-teaser").shadow_root().is_some());
	assert_eq!(body().get_attribute("data-status").as_deref(), Some("loaded"));
}

struct Mapped;
impl Behavior for Mapped {
	fn mode(&self) -> ValueMode {
		ValueMode::Mapped
	}
}

fn mapped() -> Box<dyn Behavior> {
	Box::new(Mapped)
}

#[wasm_bindgen_test]
async fn malformed_content_aborts_initialization() {
	fixture(r#"<main><div><div class="columns"><div><div>Only a label</div></div></div></div></main>"#);
	let modules = MockModules::default().with("aem-columns", mapped);
	let loader = loader(page_context(), MockTransport::default(), modules, 100);

	let error = loader.init().await.unwrap_err();
	assert!(matches!(error, LoadError::MalformedItem { index: 0, children: 1, .. }));
	assert_eq!(body().get_attribute("data-status"), None);
}

#[wasm_bindgen_test]
async fn top_checkpoint_is_reported_when_selected() {
	fixture("<main></main>");
	let loader = loader(page_context(), MockTransport::default(), MockModules::default(), SELECTED_WEIGHT);

	loader.init().await.unwrap();

	let beacons = loader.sampler().environment().beacons.borrow();
	assert_eq!(beacons.len(), 1);
	let body: Data = serde_json::from_str(&beacons[0].1).unwrap();
	assert_eq!(body["checkpoint"], Value::from("top"));
	assert_eq!(body["weight"], Value::from(1));
	assert!(body.contains_key("id"));
}

#[wasm_bindgen_test]
async fn unselected_pages_send_nothing() {
	fixture("<main></main>");
	let loader = loader(page_context(), MockTransport::default(), MockModules::default(), 100);
	loader.init().await.unwrap();
	assert!(!loader.sampler().is_selected());
	assert!(loader.sampler().environment().beacons.borrow().is_empty());
}

struct Failing;
impl Behavior for Failing {
	fn decorate(&mut self, _: &Component) -> Result<(), LoadError> {
		Err(LoadError::Dom {
			message: "decoration failed".to_owned(),
		})
	}
}

fn failing() -> Box<dyn Behavior> {
	Box::new(Failing)
}

#[wasm_bindgen_test]
async fn failing_decoration_only_skips_that_element() {
	fixture(
		r#"<main><div>
			<div class="carousel"><div><div>a</div></div></div>
			<div class="cards"><div><div>b</div></div></div>
			<div class="teaser"><div><div>c</div></div></div>
		</div></main>"#,
	);
	let modules = MockModules::default().with("aem-carousel", failing).with("aem-cards", plain).with("aem-teaser", plain);
	let loader = loader(page_context(), MockTransport::default(), modules, 100);

	let mut report = loader.init().await.unwrap();
	report.registered.sort_unstable();

	assert_eq!(report.registered, ["aem-cards", "aem-carousel", "aem-teaser"]);
	assert!(report.failed.is_empty());
	assert_eq!(body().get_attribute("data-status").as_deref(), Some("loaded"));
	assert!(select("aem-cards").shadow_root().is_some());
	assert!(select("aem-teaser").shadow_root().is_some());
	loader.registry().with_components(|components| {
		assert_eq!(components.len(), 2);
		assert!(components.iter().all(|component| component.tag() != "aem-carousel"));
	});
}

const UNREACHABLE_ENDPOINT: &str = "http://127.0.0.1:9/rum";

/// A page context whose enhancer URL points nowhere, so no third-party script runs.
fn lazy_context(lighthouse: bool) -> Context {
	let mut context = page_context();
	context.lighthouse = lighthouse;
	context.rum.endpoint = UNREACHABLE_ENDPOINT.to_owned();
	context
}

fn enhancer_scripts() -> Vec<web_sys::Element> {
	select_all(&format!("head script[src=\"{UNREACHABLE_ENDPOINT}/{ENHANCER_PATH}\"]"))
}

fn reset_head() {
	for script in enhancer_scripts() {
		script.remove();
	}
}

#[wasm_bindgen_test]
async fn lazy_phase_injects_enhancer_for_selected_pages() {
	fixture("<main></main>");
	reset_head();
	let loader = loader(lazy_context(false), MockTransport::default(), MockModules::default(), SELECTED_WEIGHT);

	loader.load_lazy().await;
	loader.load_lazy().await;

	assert_eq!(enhancer_scripts().len(), 1);
	assert_eq!(select_all(&format!("head link[href=\"/{LAZY_STYLES}\"]")).len(), 1);

	let beacons = loader.sampler().environment().beacons.borrow();
	let body: Data = serde_json::from_str(&beacons[0].1).unwrap();
	assert_eq!(body["checkpoint"], Value::from("lazy"));
	reset_head();
}

#[wasm_bindgen_test]
async fn lighthouse_suppresses_enhancer() {
	fixture("<main></main>");
	reset_head();
	let loader = loader(lazy_context(true), MockTransport::default(), MockModules::default(), SELECTED_WEIGHT);

	loader.load_lazy().await;

	assert!(enhancer_scripts().is_empty());
	assert_eq!(loader.sampler().environment().beacons.borrow().len(), 1);
}

#[wasm_bindgen_test]
async fn unselected_pages_get_no_enhancer() {
	fixture("<main></main>");
	reset_head();
	let loader = loader(lazy_context(false), MockTransport::default(), MockModules::default(), 100);

	loader.load_lazy().await;

	assert!(enhancer_scripts().is_empty());
}

#[wasm_bindgen_test]
fn error_events_report_source_and_line() {
	let init = ErrorEventInit::new();
	init.set_filename("https://example.com/scripts/cards.js");
	init.set_lineno(42);
	let event = ErrorEvent::new_with_event_init_dict("error", &init).unwrap();

	let data = error_details(&event);
	assert_eq!(data["source"], Value::from("https://example.com/scripts/cards.js"));
	assert_eq!(data["target"], Value::from(42));

	assert!(error_details(&Event::new("error").unwrap()).is_empty());
}

#[wasm_bindgen_test]
fn load_event_is_reported() {
	listeners::unpublish("load", "rum");
	listeners::unpublish("error", "rum");
	let loader = loader(page_context(), MockTransport::default(), MockModules::default(), SELECTED_WEIGHT);

	loader.wire_page_events().unwrap();
	assert!(listeners::is_published("error", "rum"));
	window().unwrap().dispatch_event(&Event::new("load").unwrap()).unwrap();

	{
		let beacons = loader.sampler().environment().beacons.borrow();
		assert_eq!(beacons.len(), 1);
		let body: Data = serde_json::from_str(&beacons[0].1).unwrap();
		assert_eq!(body["checkpoint"], Value::from("load"));
	}
	listeners::unpublish("load", "rum");
	listeners::unpublish("error", "rum");
}
