//! Server configuration, deserialised from `config.toml` plus `TALLY_*`
//! environment overrides.

use serde::Deserialize;
use tally_core::concept::ConceptAlias;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_port")]
  pub port: u16,

  /// Path to the SQLite database file.
  #[serde(default = "default_store_path")]
  pub store_path: String,

  /// Size of the refresh worker pool.
  #[serde(default = "default_refresh_workers")]
  pub refresh_workers: usize,

  /// Seed aliases loaded into the table at boot, e.g.:
  ///
  /// ```toml
  /// [[aliases]]
  /// raw_tag   = "us-gaap:Revenues"
  /// canonical = "revenue"
  /// kind      = "flow"
  /// ```
  #[serde(default)]
  pub aliases: Vec<ConceptAlias>,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> String { "tally.db".into() }
fn default_refresh_workers() -> usize { 4 }
