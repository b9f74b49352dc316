use serde::{Deserialize, Serialize};

use crate::constants::{self, columns};
use crate::pipeline::dedupe::{DedupePass, Keep};
use crate::pipeline::normalize::NormalizationRules;

/// Row cap applied before extracting work from a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SampleSizeRepr", into = "SampleSizeRepr")]
pub enum SampleSize {
    Limited(usize),
    Unbounded,
}

impl SampleSize {
    pub fn limit(&self) -> Option<usize> {
        match self {
            SampleSize::Limited(n) => Some(*n),
            SampleSize::Unbounded => None,
        }
    }
}

impl Default for SampleSize {
    fn default() -> Self {
        SampleSize::Limited(constants::DEFAULT_SAMPLE_SIZE)
    }
}

/// Accepts either a row count or the word "unbounded".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SampleSizeRepr {
    Count(usize),
    Word(String),
}

impl TryFrom<SampleSizeRepr> for SampleSize {
    type Error = String;

    fn try_from(repr: SampleSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            SampleSizeRepr::Count(n) => Ok(SampleSize::Limited(n)),
            SampleSizeRepr::Word(w) if w.eq_ignore_ascii_case("unbounded") => {
                Ok(SampleSize::Unbounded)
            }
            SampleSizeRepr::Word(w) => Err(format!(
                "invalid sample size '{}', expected a count or \"unbounded\"",
                w
            )),
        }
    }
}

impl From<SampleSize> for SampleSizeRepr {
    fn from(size: SampleSize) -> Self {
        match size {
            SampleSize::Limited(n) => SampleSizeRepr::Count(n),
            SampleSize::Unbounded => SampleSizeRepr::Word("unbounded".to_string()),
        }
    }
}

/// Source dataset names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetNames {
    pub business_census: String,
    pub cultural_sites: String,
    pub postcode_areas: String,
    /// Where the business pipeline reads enriched postcodes from when the
    /// postcode pipeline is not part of the run.
    pub enriched_postcodes: String,
}

impl Default for DatasetNames {
    fn default() -> Self {
        Self {
            business_census: constants::BUSINESS_CENSUS_DATASET.to_string(),
            cultural_sites: constants::CULTURAL_SITES_DATASET.to_string(),
            postcode_areas: constants::POSTCODE_AREAS_DATASET.to_string(),
            enriched_postcodes: constants::ENRICHED_POSTCODES_DATASET.to_string(),
        }
    }
}

/// Sink table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub postcodes: String,
    pub business: String,
    pub venues: String,
    pub boroughs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            postcodes: constants::POSTCODES_TABLE.to_string(),
            business: constants::BUSINESS_TABLE.to_string(),
            venues: constants::VENUES_TABLE.to_string(),
            boroughs: constants::BOROUGH_TABLE.to_string(),
        }
    }
}

/// Normalization rules per dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBook {
    pub business: NormalizationRules,
    pub venues: NormalizationRules,
    pub boroughs: NormalizationRules,
    /// Tables keyed by postcode alone: sampled postcodes, postcode areas and
    /// previously enriched postcodes.
    pub postcodes: NormalizationRules,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self {
            business: NormalizationRules::business_census(),
            venues: NormalizationRules::cultural_venues(),
            boroughs: NormalizationRules::borough_mapping(),
            postcodes: NormalizationRules::postcodes(),
        }
    }
}

/// Everything the three sub-pipelines need besides their collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub datasets: DatasetNames,
    pub tables: TableNames,
    pub postcode_sample: SampleSize,
    pub venue_sample: SampleSize,
    /// Keep only business rows from this post town, compared
    /// case-insensitively.
    pub post_town: Option<String>,
    /// Applied in order to the borough mapping.
    pub borough_passes: Vec<DedupePass>,
    pub rules: RuleBook,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            datasets: DatasetNames::default(),
            tables: TableNames::default(),
            postcode_sample: SampleSize::default(),
            venue_sample: SampleSize::default(),
            post_town: None,
            borough_passes: default_borough_passes(),
            rules: RuleBook::default(),
        }
    }
}

pub fn default_borough_passes() -> Vec<DedupePass> {
    vec![
        DedupePass::new(&[columns::BOROUGH_NAME], Keep::Last),
        DedupePass::new(&[columns::BOROUGH_CODE], Keep::Last),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        size: SampleSize,
    }

    #[test]
    fn sample_size_accepts_count_or_unbounded() {
        let h: Holder = toml::from_str("size = 250").unwrap();
        assert_eq!(h.size, SampleSize::Limited(250));
        let h: Holder = toml::from_str("size = \"unbounded\"").unwrap();
        assert_eq!(h.size.limit(), None);
        assert!(toml::from_str::<Holder>("size = \"lots\"").is_err());
    }
}
