//! Financial domains and their structured-field schemas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MemoryError;

/// A financial-modeling subdomain.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    #[default]
    General,
    Lbo,
    #[serde(rename = "ma")]
    MergersAcquisitions,
    Debt,
    Lending,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::General,
        Domain::Lbo,
        Domain::MergersAcquisitions,
        Domain::Debt,
        Domain::Lending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::General => "general",
            Domain::Lbo => "lbo",
            Domain::MergersAcquisitions => "ma",
            Domain::Debt => "debt",
            Domain::Lending => "lending",
        }
    }

    /// Structured-field schema for this domain.
    pub fn schema(&self) -> &'static DomainSchema {
        match self {
            Domain::General => &GENERAL_SCHEMA,
            Domain::Lbo => &LBO_SCHEMA,
            Domain::MergersAcquisitions => &MA_SCHEMA,
            Domain::Debt => &DEBT_SCHEMA,
            Domain::Lending => &LENDING_SCHEMA,
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Domain::General => "general financial",
            Domain::Lbo => "leveraged buyout",
            Domain::MergersAcquisitions => "mergers and acquisitions",
            Domain::Debt => "debt modeling",
            Domain::Lending => "commercial lending",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Domain::General),
            "lbo" => Ok(Domain::Lbo),
            "ma" | "m&a" | "mergers_acquisitions" => Ok(Domain::MergersAcquisitions),
            "debt" => Ok(Domain::Debt),
            "lending" => Ok(Domain::Lending),
            other => Err(MemoryError::Config(format!("unknown domain: {other}"))),
        }
    }
}

/// One schema key and whether condensers must keep its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub must_preserve: bool,
}

const fn preserve(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        must_preserve: true,
    }
}

const fn optional(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        must_preserve: false,
    }
}

/// Fixed set of structured keys a domain event may carry.
#[derive(Debug, PartialEq, Eq)]
pub struct DomainSchema {
    domain: Domain,
    fields: &'static [FieldSpec],
}

impl DomainSchema {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key)
    }

    pub fn is_must_preserve(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key && f.must_preserve)
    }

    pub fn must_preserve_keys(&self) -> impl Iterator<Item = &'static str> {
        self.fields
            .iter()
            .filter(|f| f.must_preserve)
            .map(|f| f.key)
    }
}

static GENERAL_SCHEMA: DomainSchema = DomainSchema {
    domain: Domain::General,
    fields: &[],
};

static LBO_SCHEMA: DomainSchema = DomainSchema {
    domain: Domain::Lbo,
    fields: &[
        preserve("transaction_structure"),
        preserve("purchase_price"),
        preserve("debt_terms"),
        preserve("equity_contribution"),
        preserve("exit_multiple"),
        preserve("exit_year"),
        optional("sponsor"),
        optional("irr_target"),
        optional("management_rollover"),
    ],
};

static MA_SCHEMA: DomainSchema = DomainSchema {
    domain: Domain::MergersAcquisitions,
    fields: &[
        preserve("deal_structure"),
        preserve("purchase_price"),
        preserve("consideration_mix"),
        preserve("exchange_ratio"),
        preserve("synergies"),
        optional("accretion_dilution"),
        optional("closing_conditions"),
        optional("financing"),
    ],
};

static DEBT_SCHEMA: DomainSchema = DomainSchema {
    domain: Domain::Debt,
    fields: &[
        preserve("tranche_sizes"),
        preserve("interest_rates"),
        preserve("covenant_terms"),
        preserve("amortization"),
        preserve("maturity"),
        optional("leverage_ratio"),
        optional("call_protection"),
    ],
};

static LENDING_SCHEMA: DomainSchema = DomainSchema {
    domain: Domain::Lending,
    fields: &[
        preserve("loan_amount"),
        preserve("interest_rate"),
        preserve("covenant_terms"),
        preserve("collateral"),
        optional("ltv"),
        optional("dscr"),
        optional("borrower_rating"),
    ],
};
