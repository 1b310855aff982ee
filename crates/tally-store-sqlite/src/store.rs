//! [`SqliteStore`] — the SQLite implementation of [`MetricStore`].
//!
//! `tokio_rusqlite` funnels every call through one background connection
//! thread, so statements within a single `call` closure execute as a unit;
//! multi-statement writes additionally run inside an explicit transaction so
//! a storage failure leaves no partial state.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  company::{Company, NewCompany},
  fact::{FinancialFact, NewFact},
  filing::{Filing, FilingMeta},
  metric::{GroupKey, QuarterlyMetric, YearlyMetric},
  store::{LedgerTag, MetricStore, SourcedFact},
};

use crate::{
  Error, Result,
  encode::{
    RawCompany, RawFact, RawFiling, RawQuarterly, RawYearly,
    encode_concept_kind, encode_date, encode_decimal, encode_dt,
    encode_filing_ids, encode_fiscal_period, encode_form_type, encode_period,
    encode_span, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally metric store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Outcome of the atomic filing insert, computed inside the write
/// transaction so duplicate checks and inserts cannot interleave with other
/// writers.
enum RecordOutcome {
  Recorded,
  CompanyMissing,
  DuplicateAccession,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn filings_for_company_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> Result<Vec<Filing>> {
    let company_str = encode_uuid(company_id);

    let raws: Vec<RawFiling> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT filing_id, company_id, form_type, fiscal_year,
                  fiscal_period, fiscal_year_end, filed_date,
                  accession_number
           FROM filings
           WHERE company_id = ?1 AND fiscal_year = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![company_str, fiscal_year], |row| {
            Ok(RawFiling {
              filing_id:        row.get(0)?,
              company_id:       row.get(1)?,
              form_type:        row.get(2)?,
              fiscal_year:      row.get(3)?,
              fiscal_period:    row.get(4)?,
              fiscal_year_end:  row.get(5)?,
              filed_date:       row.get(6)?,
              accession_number: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFiling::into_filing).collect()
  }
}

fn fact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFact> {
  Ok(RawFact {
    fact_id:     row.get(0)?,
    filing_id:   row.get(1)?,
    raw_tag:     row.get(2)?,
    concept:     row.get(3)?,
    kind:        row.get(4)?,
    value:       row.get(5)?,
    unit:        row.get(6)?,
    statement:   row.get(7)?,
    period_json: row.get(8)?,
    span_json:   row.get(9)?,
    recorded_at: row.get(10)?,
  })
}

const FACT_COLUMNS: &str = "f.fact_id, f.filing_id, f.raw_tag, f.concept, \
   f.kind, f.value, f.unit, f.statement, f.period_json, f.span_json, \
   f.recorded_at";

fn quarterly_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawQuarterly> {
  Ok(RawQuarterly {
    company_id:     row.get(0)?,
    fiscal_year:    row.get(1)?,
    quarter:        row.get(2)?,
    concept:        row.get(3)?,
    value:          row.get(4)?,
    unit:           row.get(5)?,
    derived:        row.get(6)?,
    source_filings: row.get(7)?,
  })
}

const QUARTERLY_COLUMNS: &str = "company_id, fiscal_year, quarter, concept, \
   value, unit, derived, source_filings";

// ─── MetricStore impl ────────────────────────────────────────────────────────

impl MetricStore for SqliteStore {
  type Error = Error;

  // ── Companies ─────────────────────────────────────────────────────────────

  async fn add_company(&self, input: NewCompany) -> Result<Company> {
    let company = Company {
      company_id:    Uuid::new_v4(),
      ticker:        input.ticker,
      exchange:      input.exchange,
      registrant_id: input.registrant_id,
      created_at:    Utc::now(),
    };

    let id_str = encode_uuid(company.company_id);
    let at_str = encode_dt(company.created_at);
    let ticker = company.ticker.clone();
    let exchange = company.exchange.clone();
    let registrant = company.registrant_id.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO companies
             (company_id, ticker, exchange, registrant_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, ticker, exchange, registrant, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(company)
  }

  async fn get_company(&self, id: Uuid) -> Result<Option<Company>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT company_id, ticker, exchange, registrant_id, created_at
               FROM companies WHERE company_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawCompany {
                  company_id:    row.get(0)?,
                  ticker:        row.get(1)?,
                  exchange:      row.get(2)?,
                  registrant_id: row.get(3)?,
                  created_at:    row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn company_by_ticker(&self, ticker: &str) -> Result<Option<Company>> {
    let ticker = ticker.to_owned();

    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT company_id, ticker, exchange, registrant_id, created_at
               FROM companies WHERE ticker = ?1",
              rusqlite::params![ticker],
              |row| {
                Ok(RawCompany {
                  company_id:    row.get(0)?,
                  ticker:        row.get(1)?,
                  exchange:      row.get(2)?,
                  registrant_id: row.get(3)?,
                  created_at:    row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn list_companies(&self) -> Result<Vec<Company>> {
    let raws: Vec<RawCompany> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT company_id, ticker, exchange, registrant_id, created_at
           FROM companies ORDER BY ticker",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawCompany {
              company_id:    row.get(0)?,
              ticker:        row.get(1)?,
              exchange:      row.get(2)?,
              registrant_id: row.get(3)?,
              created_at:    row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCompany::into_company).collect()
  }

  // ── Fact ledger — append-only writes ──────────────────────────────────────

  async fn record_filing(
    &self,
    meta: FilingMeta,
    facts: Vec<NewFact>,
  ) -> Result<(Filing, Vec<GroupKey>)> {
    let filing = Filing {
      filing_id:        Uuid::new_v4(),
      company_id:       meta.company_id,
      form_type:        meta.form_type,
      fiscal_year:      meta.fiscal_year,
      fiscal_period:    meta.fiscal_period,
      fiscal_year_end:  meta.fiscal_year_end,
      filed_date:       meta.filed_date,
      accession_number: meta.accession_number,
    };

    let recorded_at = Utc::now();
    let stored: Vec<FinancialFact> = facts
      .into_iter()
      .map(|f| FinancialFact {
        fact_id: Uuid::new_v4(),
        filing_id: filing.filing_id,
        raw_tag: f.raw_tag,
        concept: f.concept,
        kind: f.kind,
        value: f.value,
        unit: f.unit,
        statement: f.statement,
        period: f.period,
        span: f.span,
        recorded_at,
      })
      .collect();

    // The invalidation events: one key per distinct derivable concept.
    let mut keys: Vec<GroupKey> = Vec::new();
    for fact in &stored {
      if let (Some(concept), Some(_)) = (&fact.concept, fact.span) {
        let key = GroupKey {
          company_id:  filing.company_id,
          fiscal_year: filing.fiscal_year,
          concept:     concept.clone(),
        };
        if !keys.contains(&key) {
          keys.push(key);
        }
      }
    }

    // Pre-encode all rows so the write closure is pure statement execution.
    let filing_row = (
      encode_uuid(filing.filing_id),
      encode_uuid(filing.company_id),
      encode_form_type(filing.form_type).to_owned(),
      filing.fiscal_year,
      encode_fiscal_period(filing.fiscal_period).to_owned(),
      encode_date(filing.fiscal_year_end),
      encode_date(filing.filed_date),
      filing.accession_number.clone(),
    );

    let mut fact_rows = Vec::with_capacity(stored.len());
    for fact in &stored {
      fact_rows.push((
        encode_uuid(fact.fact_id),
        encode_uuid(fact.filing_id),
        fact.raw_tag.clone(),
        fact.concept.clone(),
        encode_concept_kind(fact.kind).to_owned(),
        encode_decimal(fact.value),
        fact.unit.clone(),
        fact.statement.clone(),
        encode_period(&fact.period)?,
        fact.span.as_ref().map(encode_span).transpose()?,
        encode_dt(fact.recorded_at),
      ));
    }

    let company_str = encode_uuid(filing.company_id);
    let accession = filing.accession_number.clone();

    let outcome: RecordOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let company_exists: bool = tx
          .query_row(
            "SELECT 1 FROM companies WHERE company_id = ?1",
            rusqlite::params![company_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !company_exists {
          return Ok(RecordOutcome::CompanyMissing);
        }

        let duplicate: bool = tx
          .query_row(
            "SELECT 1 FROM filings
             WHERE company_id = ?1 AND accession_number = ?2",
            rusqlite::params![company_str, accession],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if duplicate {
          return Ok(RecordOutcome::DuplicateAccession);
        }

        tx.execute(
          "INSERT INTO filings
             (filing_id, company_id, form_type, fiscal_year, fiscal_period,
              fiscal_year_end, filed_date, accession_number)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            filing_row.0,
            filing_row.1,
            filing_row.2,
            filing_row.3,
            filing_row.4,
            filing_row.5,
            filing_row.6,
            filing_row.7,
          ],
        )?;

        for row in &fact_rows {
          tx.execute(
            "INSERT INTO facts
               (fact_id, filing_id, raw_tag, concept, kind, value, unit,
                statement, period_json, span_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
              row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7,
              row.8, row.9, row.10,
            ],
          )?;
        }

        tx.commit()?;
        Ok(RecordOutcome::Recorded)
      })
      .await?;

    match outcome {
      RecordOutcome::Recorded => Ok((filing, keys)),
      RecordOutcome::CompanyMissing => {
        Err(Error::CompanyNotFound(filing.company_id))
      }
      RecordOutcome::DuplicateAccession => Err(Error::DuplicateAccession {
        company_id: filing.company_id,
        accession:  filing.accession_number,
      }),
    }
  }

  async fn get_filing(&self, id: Uuid) -> Result<Option<Filing>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawFiling> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT filing_id, company_id, form_type, fiscal_year,
                      fiscal_period, fiscal_year_end, filed_date,
                      accession_number
               FROM filings WHERE filing_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawFiling {
                  filing_id:        row.get(0)?,
                  company_id:       row.get(1)?,
                  form_type:        row.get(2)?,
                  fiscal_year:      row.get(3)?,
                  fiscal_period:    row.get(4)?,
                  fiscal_year_end:  row.get(5)?,
                  filed_date:       row.get(6)?,
                  accession_number: row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFiling::into_filing).transpose()
  }

  async fn facts_for_filing(&self, filing_id: Uuid) -> Result<Vec<FinancialFact>> {
    let id_str = encode_uuid(filing_id);

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACT_COLUMNS} FROM facts f
           WHERE f.filing_id = ?1
           ORDER BY f.fact_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| fact_from_row(row))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn facts_for_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> Result<Vec<SourcedFact>> {
    let filings = self
      .filings_for_company_year(company_id, fiscal_year)
      .await?;
    let company_str = encode_uuid(company_id);

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACT_COLUMNS}
           FROM facts f
           JOIN filings g ON g.filing_id = f.filing_id
           WHERE g.company_id = ?1 AND g.fiscal_year = ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![company_str, fiscal_year], |row| {
            fact_from_row(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut sourced = Vec::with_capacity(raws.len());
    for raw in raws {
      let fact = raw.into_fact()?;
      // The foreign key guarantees every fact's filing is in `filings`.
      if let Some(filing) =
        filings.iter().find(|f| f.filing_id == fact.filing_id)
      {
        sourced.push(SourcedFact { fact, filing: filing.clone() });
      }
    }

    Ok(sourced)
  }

  async fn ledger_tags_for_company(
    &self,
    company_id: Uuid,
  ) -> Result<Vec<LedgerTag>> {
    let company_str = encode_uuid(company_id);

    let tags: Vec<LedgerTag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT g.fiscal_year, f.raw_tag, f.statement, f.concept
           FROM facts f
           JOIN filings g ON g.filing_id = f.filing_id
           WHERE g.company_id = ?1 AND f.span_json IS NOT NULL
           ORDER BY g.fiscal_year, f.raw_tag",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![company_str], |row| {
            Ok(LedgerTag {
              fiscal_year:      row.get(0)?,
              raw_tag:          row.get(1)?,
              statement:        row.get(2)?,
              recorded_concept: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(tags)
  }

  // ── Materialized tables — transactional overwrites ────────────────────────

  async fn replace_quarterly(
    &self,
    key: &GroupKey,
    rows: Vec<QuarterlyMetric>,
  ) -> Result<()> {
    let company_str = encode_uuid(key.company_id);
    let fiscal_year = key.fiscal_year;
    let concept = key.concept.clone();

    let mut encoded = Vec::with_capacity(rows.len());
    for m in &rows {
      encoded.push((
        encode_uuid(m.company_id),
        m.fiscal_year,
        i64::from(m.quarter),
        m.concept.clone(),
        encode_decimal(m.value),
        m.unit.clone(),
        m.derived,
        encode_filing_ids(&m.source_filings)?,
      ));
    }

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM quarterly_metrics
           WHERE company_id = ?1 AND fiscal_year = ?2 AND concept = ?3",
          rusqlite::params![company_str, fiscal_year, concept],
        )?;
        for row in &encoded {
          tx.execute(
            "INSERT INTO quarterly_metrics
               (company_id, fiscal_year, quarter, concept, value, unit,
                derived, source_filings)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn replace_yearly(
    &self,
    key: &GroupKey,
    row: Option<YearlyMetric>,
  ) -> Result<()> {
    let company_str = encode_uuid(key.company_id);
    let fiscal_year = key.fiscal_year;
    let concept = key.concept.clone();

    let encoded = match &row {
      Some(m) => Some((
        encode_uuid(m.company_id),
        m.fiscal_year,
        m.concept.clone(),
        encode_decimal(m.value),
        m.unit.clone(),
        encode_uuid(m.filing_id),
      )),
      None => None,
    };

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM yearly_metrics
           WHERE company_id = ?1 AND fiscal_year = ?2 AND concept = ?3",
          rusqlite::params![company_str, fiscal_year, concept],
        )?;
        if let Some(row) = &encoded {
          tx.execute(
            "INSERT INTO yearly_metrics
               (company_id, fiscal_year, concept, value, unit, filing_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![row.0, row.1, row.2, row.3, row.4, row.5],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  // ── Read accessors — materialized rows only ───────────────────────────────

  async fn quarterly_by_company_and_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> Result<Vec<QuarterlyMetric>> {
    let company_str = encode_uuid(company_id);

    let raws: Vec<RawQuarterly> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {QUARTERLY_COLUMNS} FROM quarterly_metrics
           WHERE company_id = ?1 AND fiscal_year = ?2
           ORDER BY concept, quarter"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![company_str, fiscal_year], |row| {
            quarterly_from_row(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuarterly::into_metric).collect()
  }

  async fn quarterly_by_company_and_concept(
    &self,
    company_id: Uuid,
    concept: &str,
  ) -> Result<Vec<QuarterlyMetric>> {
    let company_str = encode_uuid(company_id);
    let concept = concept.to_owned();

    let raws: Vec<RawQuarterly> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {QUARTERLY_COLUMNS} FROM quarterly_metrics
           WHERE company_id = ?1 AND concept = ?2
           ORDER BY fiscal_year DESC, quarter"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![company_str, concept], |row| {
            quarterly_from_row(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuarterly::into_metric).collect()
  }

  async fn yearly_by_company_and_year(
    &self,
    company_id: Uuid,
    fiscal_year: i32,
  ) -> Result<Vec<YearlyMetric>> {
    let company_str = encode_uuid(company_id);

    let raws: Vec<RawYearly> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT company_id, fiscal_year, concept, value, unit, filing_id
           FROM yearly_metrics
           WHERE company_id = ?1 AND fiscal_year = ?2
           ORDER BY concept",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![company_str, fiscal_year], |row| {
            Ok(RawYearly {
              company_id:  row.get(0)?,
              fiscal_year: row.get(1)?,
              concept:     row.get(2)?,
              value:       row.get(3)?,
              unit:        row.get(4)?,
              filing_id:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawYearly::into_metric).collect()
  }

  async fn latest_quarterly(
    &self,
    company_id: Uuid,
  ) -> Result<Vec<QuarterlyMetric>> {
    let company_str = encode_uuid(company_id);

    let raws: Vec<RawQuarterly> = self
      .conn
      .call(move |conn| {
        let newest: Option<(i32, i64)> = conn
          .query_row(
            "SELECT fiscal_year, quarter FROM quarterly_metrics
             WHERE company_id = ?1
             ORDER BY fiscal_year DESC, quarter DESC
             LIMIT 1",
            rusqlite::params![company_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let Some((fiscal_year, quarter)) = newest else {
          return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(&format!(
          "SELECT {QUARTERLY_COLUMNS} FROM quarterly_metrics
           WHERE company_id = ?1 AND fiscal_year = ?2 AND quarter = ?3
           ORDER BY concept"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![company_str, fiscal_year, quarter],
            quarterly_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuarterly::into_metric).collect()
  }
}
