//! zbuild-lib: resolution and locking of zbuild definitions
//!
//! This crate provides:
//! - `builddef`: the kind-agnostic definition model (contexts, version maps, locks)
//! - `stage`: the generic stage derivation and merge engine
//! - `defkinds`: the php, nodejs and webserver kinds
//! - `pkgsolver`: system package solvers (APT, APK, Debian indexes)
//! - `statesolver`: access to build contexts and container images
//! - `builder`: lock file updates, build plans and config dumps

pub mod builddef;
pub mod builder;
pub mod consts;
pub mod defkinds;
pub mod defloader;
pub mod pkgsolver;
pub mod plan;
pub mod platform;
pub mod registry;
pub mod stage;
pub mod statesolver;
pub mod util;
