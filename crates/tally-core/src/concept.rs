//! Canonical concept vocabulary and the concept normalizer.
//!
//! Filers report the same economic quantity under wildly different tags; the
//! alias table maps each raw tag to a stable canonical name plus its
//! flow/stock classification. The table is an explicitly owned, versioned
//! value — never ambient global state — so alias changes can be audited and
//! rolled back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Classification ──────────────────────────────────────────────────────────

/// The accounting semantics of a canonical concept. Decides whether values
/// may be algebraically combined across periods.
///
/// A property of the canonical concept, never of the raw tag: no two aliases
/// may classify the same canonical concept differently.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConceptKind {
  /// Reported over a duration; additive across contiguous sub-periods.
  Flow,
  /// Reported at a point in time; never summed or differenced.
  Stock,
  /// No alias exists yet. Excluded from derivation.
  Unknown,
}

// ─── Alias ───────────────────────────────────────────────────────────────────

/// One raw-tag → canonical-concept mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptAlias {
  pub raw_tag:        String,
  /// Optional structural hint; when present the alias only applies to facts
  /// reported on that statement.
  pub statement_hint: Option<String>,
  pub canonical:      String,
  pub kind:           ConceptKind,
}

// ─── AliasTable ──────────────────────────────────────────────────────────────

/// The versioned alias registry backing the concept normalizer.
///
/// Append-only: inserting a new alias for an already-mapped tag revises the
/// mapping (the latest matching alias wins) without discarding the history
/// held by stored facts. Every successful insert bumps `version`, which
/// marks previously-normalized groups as eligible for lazy recomputation.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
  version:           u64,
  by_tag:            HashMap<String, Vec<ConceptAlias>>,
  kind_by_canonical: HashMap<String, ConceptKind>,
}

impl AliasTable {
  pub fn new() -> Self { Self::default() }

  /// Monotonic revision counter; bumped on every successful insert.
  pub fn version(&self) -> u64 { self.version }

  /// Register an alias. Fails if `kind` is [`ConceptKind::Unknown`] (an
  /// alias exists precisely to classify) or if it contradicts the
  /// classification already recorded for the same canonical concept.
  pub fn insert(&mut self, alias: ConceptAlias) -> Result<u64> {
    if alias.kind == ConceptKind::Unknown {
      return Err(Error::UnclassifiedAlias(alias.raw_tag));
    }

    if let Some(&existing) = self.kind_by_canonical.get(&alias.canonical) {
      if existing != alias.kind {
        return Err(Error::AliasConflict {
          raw_tag:   alias.raw_tag,
          canonical: alias.canonical,
          existing,
          proposed:  alias.kind,
        });
      }
    } else {
      self
        .kind_by_canonical
        .insert(alias.canonical.clone(), alias.kind);
    }

    self
      .by_tag
      .entry(alias.raw_tag.clone())
      .or_default()
      .push(alias);
    self.version += 1;
    Ok(self.version)
  }

  /// Normalize a raw tag: the canonical concept name and classification, or
  /// `None` if no alias applies. Deterministic for a given table version.
  ///
  /// An alias whose hint matches the fact's statement is preferred over a
  /// hint-free alias; within each tier the latest-inserted alias wins.
  pub fn normalize(
    &self,
    raw_tag: &str,
    statement: Option<&str>,
  ) -> Option<(&str, ConceptKind)> {
    let aliases = self.by_tag.get(raw_tag)?;

    let hinted = statement.and_then(|s| {
      aliases
        .iter()
        .rev()
        .find(|a| a.statement_hint.as_deref() == Some(s))
    });

    let chosen = hinted
      .or_else(|| aliases.iter().rev().find(|a| a.statement_hint.is_none()))?;

    Some((chosen.canonical.as_str(), chosen.kind))
  }

  pub fn is_empty(&self) -> bool { self.by_tag.is_empty() }
}
