//! Sampled real-user monitoring.
//!
//! The first [`Sampler::record`] establishes the page's [`Session`]: an id, the sampling weight and whether this page
//! view is selected for reporting (`random * weight < 1`). Selected checkpoints are sent as one-way beacons.
//!
//! Handlers for late-bound functionality (for example Core Web Vitals collection) are addressed by name through
//! [`Sampler::call`]. Calls made before [`Sampler::drain`] installs the handler are queued and replayed in order.
//!
//! Handlers report failures through their return value. Those are logged and otherwise absorbed.

use crate::{
	config::{Context, RumConfig},
	error::LoadError,
};
use core::{
	cell::{OnceCell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::VecDeque, rc::Rc};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Caller-supplied fields that make it into a beacon. Anything else is dropped.
pub const CALLER_FIELDS: &[&str] = &["value", "source", "target", "cwv", "CLS", "LCP", "FID", "INP", "TTFB"];

/// Checkpoints that are forwarded to the [deferred](`Sampler::call`) handler of the same name.
pub const FORWARDED_CHECKPOINTS: &[&str] = &["cwv"];

const ID_LENGTH: usize = 5;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub type Data = Map<String, Value>;
pub type Handler = Rc<dyn Fn(&Data) -> Result<(), LoadError>>;

/// The page-dependent inputs of the sampler.
pub trait Environment {
	/// Uniform in `[0, 1)`.
	fn random(&self) -> f64;
	/// Milliseconds on a monotonic clock.
	fn now(&self) -> f64;
	/// Queues `body` for delivery to `url` without waiting for a response. Returns whether it was accepted.
	fn send_beacon(&self, url: &str, body: &str) -> bool;
}

/// `Math.random`, `performance.now` and `navigator.sendBeacon`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowEnvironment;

impl Environment for WindowEnvironment {
	fn random(&self) -> f64 {
		js_sys::Math::random()
	}

	fn now(&self) -> f64 {
		web_sys::window()
			.and_then(|window| window.performance())
			.map_or_else(js_sys::Date::now, |performance| performance.now())
	}

	fn send_beacon(&self, url: &str, body: &str) -> bool {
		web_sys::window()
			.and_then(|window| window.navigator().send_beacon_with_opt_str(url, Some(body)).ok())
			.unwrap_or(false)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
	pub weight: u32,
	pub id: String,
	pub selected: bool,
	/// [`Environment::now`] when the session was established.
	pub origin: f64,
}

impl Session {
	fn establish(config: &RumConfig, environment: &impl Environment) -> Self {
		let id = (0..ID_LENGTH)
			.map(|_| {
				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let i = (environment.random() * ID_ALPHABET.len() as f64) as usize;
				char::from(ID_ALPHABET[i.min(ID_ALPHABET.len() - 1)])
			})
			.collect();
		let selected = environment.random() * f64::from(config.weight) < 1.0;
		Self {
			weight: config.weight,
			id,
			selected,
			origin: environment.now(),
		}
	}
}

#[derive(Debug, Error)]
enum RumError {
	#[error("payload serialization failed: {0}")]
	Serialize(#[from] serde_json::Error),
	#[error("handler for {name:?} failed: {source}")]
	Handler {
		name: String,
		#[source]
		source: LoadError,
	},
}

#[derive(Serialize)]
struct Payload<'a> {
	weight: u32,
	id: &'a str,
	referer: &'a str,
	checkpoint: &'a str,
	t: u64,
	#[serde(flatten)]
	data: Data,
}

pub struct Sampler<E: Environment = WindowEnvironment> {
	config: RumConfig,
	referer: String,
	environment: E,
	session: OnceCell<Session>,
	cases: RefCell<HashMap<String, Handler>>,
	always: RefCell<HashMap<String, Handler>>,
	internals: RefCell<HashMap<String, Handler>>,
	deferred: RefCell<VecDeque<(String, Data)>>,
}

impl<E: Environment> Debug for Sampler<E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Sampler")
			.field("config", &self.config)
			.field("session", &self.session.get())
			.field("deferred", &self.deferred.borrow().len())
			.finish_non_exhaustive()
	}
}

impl Sampler<WindowEnvironment> {
	#[must_use]
	pub fn for_context(context: &Context) -> Self {
		Self::new(context.rum.clone(), context.href.clone(), WindowEnvironment)
	}
}

impl<E: Environment> Sampler<E> {
	#[must_use]
	pub fn new(config: RumConfig, referer: String, environment: E) -> Self {
		Self {
			config,
			referer,
			environment,
			session: OnceCell::new(),
			cases: RefCell::default(),
			always: RefCell::default(),
			internals: RefCell::default(),
			deferred: RefCell::default(),
		}
	}

	/// Established on first use and kept for the rest of the page's life.
	pub fn session(&self) -> &Session {
		self.session.get_or_init(|| {
			let session = Session::establish(&self.config, &self.environment);
			debug!(id = %session.id, weight = session.weight, selected = session.selected, "RUM session");
			session
		})
	}

	pub fn environment(&self) -> &E {
		&self.environment
	}

	pub fn is_selected(&self) -> bool {
		self.session().selected
	}

	/// Reports `checkpoint`. Failures, including those of handlers, are logged and never surface.
	#[instrument(skip(self, data))]
	pub fn record(&self, checkpoint: &str, data: Data) {
		if let Err(error) = self.try_record(checkpoint, &data) {
			debug!("RUM failure: {}", error);
		}
	}

	fn try_record(&self, checkpoint: &str, data: &Data) -> Result<(), RumError> {
		let session = self.session();
		if session.selected {
			let body = self.payload(session, checkpoint, data)?;
			#[cfg(feature = "dangerous-logging")]
			trace!(%body, "Beacon payload");
			let url = format!("{}/{}", self.config.endpoint, session.weight);
			if !self.environment.send_beacon(&url, &body) {
				debug!("Beacon for {} was not accepted.", checkpoint);
			}

			if FORWARDED_CHECKPOINTS.contains(&checkpoint) {
				self.call(checkpoint, data.clone());
			}
			let case = self.cases.borrow().get(checkpoint).cloned();
			if let Some(case) = case {
				if let Err(error) = invoke(checkpoint, &case, data) {
					debug!("{}", error);
				}
			}
		}

		let always = self.always.borrow().get(checkpoint).cloned();
		if let Some(always) = always {
			invoke(checkpoint, &always, data)?;
		}
		Ok(())
	}

	fn payload(&self, session: &Session, checkpoint: &str, data: &Data) -> Result<String, RumError> {
		let data = data
			.iter()
			.filter(|(key, _)| CALLER_FIELDS.contains(&key.as_str()))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect();
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let t = (self.environment.now() - session.origin).max(0.0).round() as u64;
		let payload = Payload {
			weight: session.weight,
			id: &session.id,
			referer: &self.referer,
			checkpoint,
			t,
			data,
		};
		Ok(serde_json::to_string(&payload)?)
	}

	/// Runs `handler` for `checkpoint` on selected page views, after the beacon is sent.
	pub fn on(&self, checkpoint: impl Into<String>, handler: impl Fn(&Data) -> Result<(), LoadError> + 'static) {
		self.cases.borrow_mut().insert(checkpoint.into(), Rc::new(handler));
	}

	/// Runs `handler` for `checkpoint` on every page view.
	pub fn always_on(&self, checkpoint: impl Into<String>, handler: impl Fn(&Data) -> Result<(), LoadError> + 'static) {
		self.always.borrow_mut().insert(checkpoint.into(), Rc::new(handler));
	}

	/// Invokes the handler installed as `name`, or queues the call until [`Sampler::drain`] installs it.
	pub fn call(&self, name: &str, data: Data) {
		let handler = self.internals.borrow().get(name).cloned();
		match handler {
			Some(handler) => {
				if let Err(error) = invoke(name, &handler, &data) {
					debug!("{}", error);
				}
			}
			None => {
				trace!("Deferring call to {}.", name);
				self.deferred.borrow_mut().push_back((name.to_owned(), data));
			}
		}
	}

	/// Installs `handler` as `name` and replays the calls queued for it, in arrival order.
	pub fn drain(&self, name: impl Into<String>, handler: impl Fn(&Data) -> Result<(), LoadError> + 'static) {
		let name = name.into();
		let handler: Handler = Rc::new(handler);
		if self.internals.borrow_mut().insert(name.clone(), Rc::clone(&handler)).is_some() {
			warn!("Replaced RUM handler {}.", name);
		}

		let queued: Vec<Data> = {
			let mut deferred = self.deferred.borrow_mut();
			let (matching, rest) = deferred.drain(..).partition(|(queued, _)| *queued == name);
			*deferred = rest;
			matching.into_iter().map(|(_, data)| data).collect()
		};
		for data in queued {
			if let Err(error) = invoke(&name, &handler, &data) {
				debug!("{}", error);
			}
		}
	}

	/// The number of calls still waiting for their handler.
	pub fn deferred_len(&self) -> usize {
		self.deferred.borrow().len()
	}
}

fn invoke(name: &str, handler: &Handler, data: &Data) -> Result<(), RumError> {
	handler(data).map_err(|source| RumError::Handler { name: name.to_owned(), source })
}
