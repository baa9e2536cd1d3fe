#![doc(html_root_url = "https://docs.rs/aem-block-loader/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod component;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod fragment;
pub mod hero;
pub mod icons;
pub mod init;
pub mod listeners;
pub mod modules;
pub mod registry;
pub mod rum;
pub mod transform;

pub use component::{Component, Lifecycle, Values};
pub use config::Context;
pub use error::LoadError;
pub use init::{InitReport, Loader};
pub use modules::{Behavior, BehaviorFactory, BundledModules, ModuleSource, ValueMode};
