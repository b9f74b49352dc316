//! Versioned normalization rule sets.
//!
//! Synonym tables live here rather than inline in the pipelines so that a
//! correction to a canonical spelling is a data change with a version bump.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::canonical_form;
use crate::constants::columns;
use crate::domain::Value;
use crate::error::{EtlError, Result};

pub const RULES_VERSION: &str = "2024.1";

/// Casing applied to a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStyle {
    /// Split on whitespace, capitalise each word, lowercase the rest and
    /// rejoin with single spaces ("12 HIGH st" -> "12 High St").
    Words,
    /// Capitalise the first letter of every run of letters ("KENSINGTON &
    /// chelsea" -> "Kensington & Chelsea", "king's" -> "King'S").
    Title,
    Upper,
}

/// Maps recognised variant spellings to a canonical value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymMap(BTreeMap<String, String>);

impl SynonymMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every `variant` as a spelling of `canonical`.
    pub fn with(mut self, canonical: &str, variants: &[&str]) -> Self {
        for variant in variants {
            self.0.insert(variant.to_string(), canonical.to_string());
        }
        self
    }

    /// Canonical value for `value`, or `None` when it is not a known variant.
    pub fn canonical(&self, value: &str) -> Option<&str> {
        self.0.get(value).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRule {
    /// Overrides the table-wide stripping default for this column.
    pub strip_whitespace: Option<bool>,
    /// Canonicalise the value as a postcode key.
    pub postcode: bool,
    pub title_case: Option<CaseStyle>,
    pub synonyms: SynonymMap,
    pub parse_date: bool,
    /// Drop the row when this column is empty after the other steps.
    pub drop_if_empty: bool,
}

impl ColumnRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn postcode(mut self) -> Self {
        self.postcode = true;
        self
    }

    pub fn title_case(mut self, style: CaseStyle) -> Self {
        self.title_case = Some(style);
        self
    }

    pub fn synonyms(mut self, synonyms: SynonymMap) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn parse_date(mut self) -> Self {
        self.parse_date = true;
        self
    }

    pub fn drop_if_empty(mut self) -> Self {
        self.drop_if_empty = true;
        self
    }

    pub fn strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = Some(strip);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    pub version: String,
    /// Strip surrounding whitespace from every text column unless the column
    /// rule says otherwise.
    pub strip_text: bool,
    pub columns: BTreeMap<String, ColumnRule>,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            version: RULES_VERSION.to_string(),
            strip_text: true,
            columns: BTreeMap::new(),
        }
    }
}

impl NormalizationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, rule: ColumnRule) -> Self {
        self.columns.insert(name.to_string(), rule);
        self
    }

    /// Rejects synonym maps that never settle, such as a cycle of variants
    /// or one closed by the column's casing.
    pub fn validate(&self) -> Result<()> {
        for (column, rule) in &self.columns {
            let strip = self.strips(column);
            for variant in rule.synonyms.variants() {
                let (_, settled) = canonical_form(&Value::text(variant), rule, strip);
                if !settled {
                    return Err(EtlError::Config(format!(
                        "rules {}: synonyms for column '{}' loop from '{}'",
                        self.version, column, variant
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn strips(&self, column: &str) -> bool {
        self.columns
            .get(column)
            .and_then(|rule| rule.strip_whitespace)
            .unwrap_or(self.strip_text)
    }

    /// Business census rows: postcode required and canonical, company
    /// category collapsed to its canonical labels, address lines word-cased.
    pub fn business_census() -> Self {
        Self::new()
            .column(columns::POSTCODE, ColumnRule::new().postcode().drop_if_empty())
            .column(
                columns::COMPANY_CATEGORY,
                ColumnRule::new()
                    .synonyms(company_category_synonyms())
                    .drop_if_empty(),
            )
            .column(columns::INCORPORATION_DATE, ColumnRule::new().parse_date())
            .column(columns::ADDRESS_LINE_1, ColumnRule::new().title_case(CaseStyle::Words))
            .column(columns::ADDRESS_LINE_2, ColumnRule::new().title_case(CaseStyle::Words))
    }

    /// Cultural venue rows: borough pair required, names title-cased and
    /// corrected.
    pub fn cultural_venues() -> Self {
        Self::borough_mapping().column(columns::POSTCODE, ColumnRule::new().postcode())
    }

    pub fn borough_mapping() -> Self {
        Self::new()
            .column(columns::BOROUGH_CODE, ColumnRule::new().drop_if_empty())
            .column(
                columns::BOROUGH_NAME,
                ColumnRule::new()
                    .title_case(CaseStyle::Title)
                    .synonyms(borough_name_synonyms())
                    .drop_if_empty(),
            )
    }

    /// Tables keyed by postcode alone.
    pub fn postcodes() -> Self {
        Self::new().column(columns::POSTCODE, ColumnRule::new().postcode().drop_if_empty())
    }
}

pub fn company_category_synonyms() -> SynonymMap {
    // "Comapany" is the label already loaded downstream; keep it verbatim.
    SynonymMap::new()
        .with(
            "Private Limited Comapany",
            &[
                "PRI/LTD BY GUAR/NSC (Private, limited by guarantee, no share capital)",
                "PRI/LBG/NSC (Private, Limited by guarantee, no share capital, use of 'Limited' exemption)",
                "PRIV LTD SECT. 30 (Private limited company, section 30 of the Companies Act)",
            ],
        )
        .with("Private Unlimited Company", &["Private Unlimited"])
}

/// Truncated and historical borough spellings, matched after title-casing.
pub fn borough_name_synonyms() -> SynonymMap {
    SynonymMap::new()
        .with(
            "City Of London",
            &[
                "City And County Of Th",
                "City And County Of The Cit",
                "City And County Of The City Of London",
            ],
        )
        .with(
            "Hammersmith And Fulham",
            &["Hammersmith & Fulham", "Hammersmith And Fulha"],
        )
        .with(
            "Kensington And Chelsea",
            &["Kensington & Chelsea", "Kensington And Chelse"],
        )
        .with("City Of Westminster", &["Westminster"])
        .with("Barking And Dagenham", &["Barking"])
}
