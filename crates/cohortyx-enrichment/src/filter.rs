//! Filter normalisation.
//!
//! Assay-data requests arrive in one of four shapes. Each is resolved into a
//! single [`CanonicalQuery`] that the data-access gateway understands:
//!
//! | Shape | Profiles | Samples |
//! |-------|----------|---------|
//! | `SampleList` | `[profile]` | `None` (the gateway resolves the list) |
//! | `SampleIds` | `[profile]` | the explicit ids |
//! | `SampleMolecularPairs` | one per pair | one per pair, same order |
//! | `MolecularProfiles` | the profiles | `None` (every sample) |

use serde::{Deserialize, Serialize};

use cohortyx_common::error::{CohortyxError, Result};

/// One `(profile, sample)` pair of a cross-profile request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMolecularIdentifier {
    pub molecular_profile_id: String,
    pub sample_id: String,
}

impl SampleMolecularIdentifier {
    pub fn new(molecular_profile_id: impl Into<String>, sample_id: impl Into<String>) -> Self {
        Self {
            molecular_profile_id: molecular_profile_id.into(),
            sample_id: sample_id.into(),
        }
    }
}

/// A validated request shape. Exactly one variant is active per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssayDataFilter {
    SampleList {
        molecular_profile_id: String,
        sample_list_id: String,
        stable_ids: Vec<String>,
    },
    SampleIds {
        molecular_profile_id: String,
        sample_ids: Vec<String>,
        stable_ids: Vec<String>,
    },
    SampleMolecularPairs {
        pairs: Vec<SampleMolecularIdentifier>,
        stable_ids: Vec<String>,
    },
    MolecularProfiles {
        molecular_profile_ids: Vec<String>,
        stable_ids: Vec<String>,
    },
}

/// The nullable request body as it arrives from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAssayDataFilter {
    #[serde(default)]
    pub molecular_profile_id: Option<String>,
    #[serde(default)]
    pub sample_list_id: Option<String>,
    #[serde(default)]
    pub sample_ids: Option<Vec<String>>,
    #[serde(default)]
    pub sample_molecular_identifiers: Option<Vec<SampleMolecularIdentifier>>,
    #[serde(default)]
    pub molecular_profile_ids: Option<Vec<String>>,
    #[serde(default)]
    pub generic_assay_stable_ids: Option<Vec<String>>,
}

impl TryFrom<RawAssayDataFilter> for AssayDataFilter {
    type Error = CohortyxError;

    fn try_from(raw: RawAssayDataFilter) -> Result<Self> {
        let mut present = Vec::new();
        if raw.sample_list_id.is_some() { present.push("sampleListId"); }
        if raw.sample_ids.is_some() { present.push("sampleIds"); }
        if raw.sample_molecular_identifiers.is_some() { present.push("sampleMolecularIdentifiers"); }
        if raw.molecular_profile_ids.is_some() { present.push("molecularProfileIds"); }

        if present.len() != 1 {
            return Err(CohortyxError::InvalidFilterShape(format!(
                "exactly one of sampleListId, sampleIds, sampleMolecularIdentifiers, \
                 molecularProfileIds must be set, got [{}]",
                present.join(", ")
            )));
        }

        let stable_ids = raw
            .generic_assay_stable_ids
            .ok_or_else(|| missing("genericAssayStableIds"))?;

        let filter = match (
            raw.molecular_profile_id,
            raw.sample_list_id,
            raw.sample_ids,
            raw.sample_molecular_identifiers,
            raw.molecular_profile_ids,
        ) {
            (Some(molecular_profile_id), Some(sample_list_id), None, None, None) => {
                AssayDataFilter::SampleList { molecular_profile_id, sample_list_id, stable_ids }
            }
            (Some(molecular_profile_id), None, Some(sample_ids), None, None) => {
                AssayDataFilter::SampleIds { molecular_profile_id, sample_ids, stable_ids }
            }
            (None, None, None, Some(pairs), None) => {
                AssayDataFilter::SampleMolecularPairs { pairs, stable_ids }
            }
            (None, None, None, None, Some(molecular_profile_ids)) => {
                AssayDataFilter::MolecularProfiles { molecular_profile_ids, stable_ids }
            }
            (None, _, _, _, _) => return Err(missing("molecularProfileId")),
            (Some(_), _, _, _, _) => {
                return Err(CohortyxError::InvalidFilterShape(format!(
                    "molecularProfileId cannot be combined with {}",
                    present[0]
                )))
            }
        };

        filter.validate()?;
        Ok(filter)
    }
}

impl AssayDataFilter {
    /// Check that every required field of the active shape is populated.
    pub fn validate(&self) -> Result<()> {
        match self {
            AssayDataFilter::SampleList { molecular_profile_id, sample_list_id, stable_ids } => {
                require_id(molecular_profile_id, "molecularProfileId")?;
                require_id(sample_list_id, "sampleListId")?;
                require_ids(stable_ids, "genericAssayStableIds")
            }
            AssayDataFilter::SampleIds { molecular_profile_id, sample_ids, stable_ids } => {
                require_id(molecular_profile_id, "molecularProfileId")?;
                require_ids(sample_ids, "sampleIds")?;
                require_ids(stable_ids, "genericAssayStableIds")
            }
            AssayDataFilter::SampleMolecularPairs { pairs, stable_ids } => {
                if pairs.is_empty() {
                    return Err(missing("sampleMolecularIdentifiers"));
                }
                for pair in pairs {
                    require_id(&pair.molecular_profile_id, "sampleMolecularIdentifiers.molecularProfileId")?;
                    require_id(&pair.sample_id, "sampleMolecularIdentifiers.sampleId")?;
                }
                require_ids(stable_ids, "genericAssayStableIds")
            }
            AssayDataFilter::MolecularProfiles { molecular_profile_ids, stable_ids } => {
                require_ids(molecular_profile_ids, "molecularProfileIds")?;
                require_ids(stable_ids, "genericAssayStableIds")
            }
        }
    }
}

fn missing(field: &str) -> CohortyxError {
    CohortyxError::InvalidFilterShape(format!("{field} is required"))
}

fn require_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(missing(field))
    } else {
        Ok(())
    }
}

fn require_ids(values: &[String], field: &str) -> Result<()> {
    if values.is_empty() {
        return Err(missing(field));
    }
    values.iter().try_for_each(|v| require_id(v, field))
}

/// The canonical `(profiles, samples, units)` tuple handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalQuery {
    pub profile_ids: Vec<String>,
    /// `None` means "every sample", narrowed by `sample_list_id` when set.
    pub sample_ids: Option<Vec<String>>,
    pub sample_list_id: Option<String>,
    pub unit_ids: Vec<String>,
}

impl CanonicalQuery {
    /// Explicit `(profile, sample)` pairs, or `None` when samples are not enumerated.
    ///
    /// A single profile is paired with every sample; otherwise profiles and
    /// samples are zipped index by index.
    pub fn case_pairs(&self) -> Option<Vec<(&str, &str)>> {
        let samples = self.sample_ids.as_ref()?;
        let pairs = if self.profile_ids.len() == 1 {
            let profile = self.profile_ids[0].as_str();
            samples.iter().map(|s| (profile, s.as_str())).collect()
        } else {
            self.profile_ids
                .iter()
                .zip(samples.iter())
                .map(|(p, s)| (p.as_str(), s.as_str()))
                .collect()
        };
        Some(pairs)
    }

    /// Distinct profile ids in first-seen order.
    pub fn distinct_profiles(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.profile_ids
            .iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

/// Resolve a validated filter into its canonical query.
pub fn resolve_filter(filter: AssayDataFilter) -> Result<CanonicalQuery> {
    filter.validate()?;

    let query = match filter {
        AssayDataFilter::SampleList { molecular_profile_id, sample_list_id, stable_ids } => CanonicalQuery {
            profile_ids: vec![molecular_profile_id],
            sample_ids: None,
            sample_list_id: Some(sample_list_id),
            unit_ids: stable_ids,
        },
        AssayDataFilter::SampleIds { molecular_profile_id, sample_ids, stable_ids } => CanonicalQuery {
            profile_ids: vec![molecular_profile_id],
            sample_ids: Some(sample_ids),
            sample_list_id: None,
            unit_ids: stable_ids,
        },
        AssayDataFilter::SampleMolecularPairs { pairs, stable_ids } => {
            let (profile_ids, sample_ids): (Vec<String>, Vec<String>) = pairs
                .into_iter()
                .map(|p| (p.molecular_profile_id, p.sample_id))
                .unzip();
            CanonicalQuery {
                profile_ids,
                sample_ids: Some(sample_ids),
                sample_list_id: None,
                unit_ids: stable_ids,
            }
        }
        AssayDataFilter::MolecularProfiles { molecular_profile_ids, stable_ids } => CanonicalQuery {
            profile_ids: molecular_profile_ids,
            sample_ids: None,
            sample_list_id: None,
            unit_ids: stable_ids,
        },
    };

    tracing::debug!(
        profiles = query.profile_ids.len(),
        samples = query.sample_ids.as_ref().map(Vec::len),
        units = query.unit_ids.len(),
        "Resolved assay data filter"
    );
    Ok(query)
}

/// Convert and resolve a nullable request body in one step.
pub fn resolve_raw_filter(raw: RawAssayDataFilter) -> Result<CanonicalQuery> {
    resolve_filter(AssayDataFilter::try_from(raw)?)
}
