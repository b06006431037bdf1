//! phpsift - heuristic PHP source checker.
//!
//! phpsift is not a PHP parser. It classifies each line into a lexical
//! context (code, string, comment, template region) and runs independent
//! line heuristics over that context, plus plugins hooked into the
//! analysis lifecycle. Results are cached per file and many findings can
//! be fixed in place.
//!
//! # Architecture
//!
//! - `detect`: lexical context tracking and the built-in checks
//! - `plugin`: plugin contract, registry, typed plugin configuration
//! - `cache`: content-addressed result cache
//! - `fix`: line-scoped automatic fixes
//! - `analyzer`: the per-file pipeline and batch driver
//! - `config`: YAML project settings
//! - `report`: output formatting (pretty, JSON)
//!
//! # Writing a Plugin
//!
//! Implement [`plugin::Plugin`], yield it from a [`plugin::PluginModule`]
//! and pass the module to [`Analyzer::new`]. See `src/plugin/builtin.rs`
//! for examples.

pub mod analyzer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detect;
pub mod fix;
pub mod plugin;
pub mod report;

pub use analyzer::{Analyzer, FileReport};
pub use cache::{CacheEntry, ResultCache};
pub use config::Settings;
pub use detect::{CheckRunner, Diagnostic, ErrorKind};
pub use fix::FixEngine;
pub use plugin::{Plugin, PluginModule, PluginRegistry};
