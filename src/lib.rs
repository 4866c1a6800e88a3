//! Provisioning engine for Liberty application-server images.
//!
//! Given an application directory and a downloaded Liberty runtime archive,
//! this crate decides what was supplied (a packaged server or a compiled
//! application), picks the server to configure, resolves user features and
//! ifixes, and builds a cached runtime layer ready for launch.
//!
//! - **Build sources** - [`source`] detects packaged servers and compiled apps
//! - **Servers** - [`server`] handles paths and the user directory swap
//! - **Features** - [`feature`] resolves, links and activates user features
//! - **Runtime** - [`distribution`] orchestrates the runtime layer
//! - **Layers** - [`layer`] caches contributions by fingerprint
//!
//! # Architecture
//!
//! ```text
//! provision
//!     │
//!     ├── source::select ──── ServerSource ─┐
//!     │                  └─── AppSource     ├── server::ServerInstance
//!     ├── base::Base (templates, external configuration)
//!     └── distribution::Distribution
//!             ├── extract, bin/server create
//!             ├── feature::installer
//!             ├── ifix
//!             └── classes
//! ```

pub mod base;
pub mod config;
pub mod distribution;
pub mod error;
pub mod exec;
pub mod feature;
pub mod fsutil;
pub mod layer;
pub mod logging;
pub mod provision;
pub mod server;
pub mod source;

pub use config::BuildConfig;
pub use distribution::{Dependency, Distribution};
pub use error::ProvisionError;
pub use layer::Layers;
pub use provision::{detect, provision, Provisioned};
