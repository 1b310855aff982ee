//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All dates are stored as ISO 8601 strings, timestamps as RFC 3339.
//! Decimals are stored as their canonical string form — never as binary
//! floats. Structured fields (ReportedPeriod, FiscalSpan, provenance lists)
//! are stored as compact JSON. UUIDs are stored as hyphenated lowercase
//! strings.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_core::{
  company::Company,
  concept::ConceptKind,
  fact::{FinancialFact, FiscalSpan, ReportedPeriod},
  filing::{Filing, FiscalPeriod, FormType},
  metric::{QuarterlyMetric, YearlyMetric},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates and timestamps ────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(v: Decimal) -> String { v.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> {
  s.parse().map_err(|_| Error::DecimalParse(s.to_owned()))
}

// ─── Closed enums ────────────────────────────────────────────────────────────

pub fn encode_form_type(f: FormType) -> &'static str {
  match f {
    FormType::Annual => "annual",
    FormType::Quarterly => "quarterly",
  }
}

pub fn decode_form_type(s: &str) -> Result<FormType> {
  match s {
    "annual" => Ok(FormType::Annual),
    "quarterly" => Ok(FormType::Quarterly),
    other => Err(Error::DateParse(format!("unknown form type: {other:?}"))),
  }
}

pub fn encode_fiscal_period(p: FiscalPeriod) -> &'static str {
  match p {
    FiscalPeriod::Q1 => "q1",
    FiscalPeriod::Q2 => "q2",
    FiscalPeriod::Q3 => "q3",
    FiscalPeriod::Q4 => "q4",
    FiscalPeriod::FullYear => "full_year",
  }
}

pub fn decode_fiscal_period(s: &str) -> Result<FiscalPeriod> {
  match s {
    "q1" => Ok(FiscalPeriod::Q1),
    "q2" => Ok(FiscalPeriod::Q2),
    "q3" => Ok(FiscalPeriod::Q3),
    "q4" => Ok(FiscalPeriod::Q4),
    "full_year" => Ok(FiscalPeriod::FullYear),
    other => {
      Err(Error::DateParse(format!("unknown fiscal period: {other:?}")))
    }
  }
}

pub fn encode_concept_kind(k: ConceptKind) -> &'static str {
  match k {
    ConceptKind::Flow => "flow",
    ConceptKind::Stock => "stock",
    ConceptKind::Unknown => "unknown",
  }
}

pub fn decode_concept_kind(s: &str) -> Result<ConceptKind> {
  match s {
    "flow" => Ok(ConceptKind::Flow),
    "stock" => Ok(ConceptKind::Stock),
    "unknown" => Ok(ConceptKind::Unknown),
    other => {
      Err(Error::DateParse(format!("unknown concept kind: {other:?}")))
    }
  }
}

// ─── Structured columns ──────────────────────────────────────────────────────

pub fn encode_period(p: &ReportedPeriod) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_period(s: &str) -> Result<ReportedPeriod> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_span(s: &FiscalSpan) -> Result<String> {
  Ok(serde_json::to_string(s)?)
}

pub fn decode_span(s: &str) -> Result<FiscalSpan> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_filing_ids(ids: &[Uuid]) -> Result<String> {
  let strings: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
  Ok(serde_json::to_string(&strings)?)
}

pub fn decode_filing_ids(s: &str) -> Result<Vec<Uuid>> {
  let strings: Vec<String> = serde_json::from_str(s)?;
  strings.iter().map(|s| decode_uuid(s)).collect()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `companies` row.
pub struct RawCompany {
  pub company_id:    String,
  pub ticker:        String,
  pub exchange:      String,
  pub registrant_id: String,
  pub created_at:    String,
}

impl RawCompany {
  pub fn into_company(self) -> Result<Company> {
    Ok(Company {
      company_id:    decode_uuid(&self.company_id)?,
      ticker:        self.ticker,
      exchange:      self.exchange,
      registrant_id: self.registrant_id,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `filings` row.
pub struct RawFiling {
  pub filing_id:        String,
  pub company_id:       String,
  pub form_type:        String,
  pub fiscal_year:      i32,
  pub fiscal_period:    String,
  pub fiscal_year_end:  String,
  pub filed_date:       String,
  pub accession_number: String,
}

impl RawFiling {
  pub fn into_filing(self) -> Result<Filing> {
    Ok(Filing {
      filing_id:        decode_uuid(&self.filing_id)?,
      company_id:       decode_uuid(&self.company_id)?,
      form_type:        decode_form_type(&self.form_type)?,
      fiscal_year:      self.fiscal_year,
      fiscal_period:    decode_fiscal_period(&self.fiscal_period)?,
      fiscal_year_end:  decode_date(&self.fiscal_year_end)?,
      filed_date:       decode_date(&self.filed_date)?,
      accession_number: self.accession_number,
    })
  }
}

/// Raw strings read directly from a `facts` row.
pub struct RawFact {
  pub fact_id:     String,
  pub filing_id:   String,
  pub raw_tag:     String,
  pub concept:     Option<String>,
  pub kind:        String,
  pub value:       String,
  pub unit:        Option<String>,
  pub statement:   Option<String>,
  pub period_json: String,
  pub span_json:   Option<String>,
  pub recorded_at: String,
}

impl RawFact {
  pub fn into_fact(self) -> Result<FinancialFact> {
    Ok(FinancialFact {
      fact_id:     decode_uuid(&self.fact_id)?,
      filing_id:   decode_uuid(&self.filing_id)?,
      raw_tag:     self.raw_tag,
      concept:     self.concept,
      kind:        decode_concept_kind(&self.kind)?,
      value:       decode_decimal(&self.value)?,
      unit:        self.unit,
      statement:   self.statement,
      period:      decode_period(&self.period_json)?,
      span:        self.span_json.as_deref().map(decode_span).transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `quarterly_metrics` row.
pub struct RawQuarterly {
  pub company_id:     String,
  pub fiscal_year:    i32,
  pub quarter:        i64,
  pub concept:        String,
  pub value:          String,
  pub unit:           Option<String>,
  pub derived:        bool,
  pub source_filings: String,
}

impl RawQuarterly {
  pub fn into_metric(self) -> Result<QuarterlyMetric> {
    Ok(QuarterlyMetric {
      company_id:     decode_uuid(&self.company_id)?,
      fiscal_year:    self.fiscal_year,
      quarter:        self.quarter as u8,
      concept:        self.concept,
      value:          decode_decimal(&self.value)?,
      unit:           self.unit,
      derived:        self.derived,
      source_filings: decode_filing_ids(&self.source_filings)?,
    })
  }
}

/// Raw strings read directly from a `yearly_metrics` row.
pub struct RawYearly {
  pub company_id:  String,
  pub fiscal_year: i32,
  pub concept:     String,
  pub value:       String,
  pub unit:        Option<String>,
  pub filing_id:   String,
}

impl RawYearly {
  pub fn into_metric(self) -> Result<YearlyMetric> {
    Ok(YearlyMetric {
      company_id:  decode_uuid(&self.company_id)?,
      fiscal_year: self.fiscal_year,
      concept:     self.concept,
      value:       decode_decimal(&self.value)?,
      unit:        self.unit,
      filing_id:   decode_uuid(&self.filing_id)?,
    })
  }
}
