//! Trait for assay data access.
//!
//! Abstracts the backing store so that the enrichment engine can request raw
//! rows without being coupled to how they are persisted or queried.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cohortyx_common::entities::{
    AlterationTypeFilter, EnrichmentType, GenericAssayData, GenericAssayMeta, RawObservation,
};
use cohortyx_common::error::{CohortyxError, Result};

use crate::filter::CanonicalQuery;

/// Row filter for one observation fetch.
///
/// `case_ids` runs parallel to `profile_ids` (one entry per pair). When
/// `case_type` is `Patient` the ids are patient ids and every sample row of
/// those patients is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationQuery {
    pub profile_ids: Vec<String>,
    pub case_ids: Option<Vec<String>>,
    pub case_type: EnrichmentType,
    /// Empty means every unit.
    pub unit_ids: Vec<String>,
    pub alteration_types: AlterationTypeFilter,
}

/// Trait for accessing raw assay rows.
///
/// Implementations can use:
/// - a relational store (production)
/// - a JSON dataset file (CLI)
/// - builder-populated rows (testing)
#[async_trait]
pub trait DataAccessGateway: Send + Sync {
    /// Fetch alteration/measurement rows.
    ///
    /// Fails with `MolecularProfileNotFound` if a requested profile has no
    /// data source.
    async fn fetch_observations(&self, query: &ObservationQuery) -> Result<Vec<RawObservation>>;

    /// Fetch generic assay measurements for a canonical query.
    async fn fetch_generic_assay_data(&self, query: &CanonicalQuery) -> Result<Vec<GenericAssayData>>;

    /// Fetch metadata for the given stable ids. Unknown ids are skipped.
    async fn fetch_generic_assay_meta(&self, stable_ids: &[String]) -> Result<Vec<GenericAssayMeta>>;
}

// ── In-memory implementation ───────────────────────────────────────────────

/// Gateway over rows held in memory, populated by builder calls or loaded
/// from a JSON dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryGateway {
    #[serde(default)]
    profiles: BTreeSet<String>,
    #[serde(default)]
    sample_lists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    observations: Vec<RawObservation>,
    #[serde(default)]
    generic_assay_data: Vec<GenericAssayData>,
    #[serde(default)]
    generic_assay_meta: Vec<GenericAssayMeta>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset file. Profiles referenced by rows are registered implicitly.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut gateway: Self = serde_json::from_str(content)?;
        gateway.register_row_profiles();
        tracing::debug!(
            profiles = gateway.profiles.len(),
            observations = gateway.observations.len(),
            assay_rows = gateway.generic_assay_data.len(),
            "Loaded in-memory dataset"
        );
        Ok(gateway)
    }

    fn register_row_profiles(&mut self) {
        let from_obs = self.observations.iter().map(|o| o.molecular_profile_id.clone());
        let from_data = self.generic_assay_data.iter().map(|d| d.molecular_profile_id.clone());
        let implied: Vec<String> = from_obs.chain(from_data).collect();
        self.profiles.extend(implied);
    }

    /// Register a profile that exists but may hold no rows.
    pub fn with_profile(mut self, molecular_profile_id: &str) -> Self {
        self.profiles.insert(molecular_profile_id.to_string());
        self
    }

    pub fn with_sample_list(mut self, sample_list_id: &str, sample_ids: &[&str]) -> Self {
        self.sample_lists.insert(
            sample_list_id.to_string(),
            sample_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_observation(mut self, observation: RawObservation) -> Self {
        self.profiles.insert(observation.molecular_profile_id.clone());
        self.observations.push(observation);
        self
    }

    pub fn with_observations<I: IntoIterator<Item = RawObservation>>(self, observations: I) -> Self {
        observations.into_iter().fold(self, |g, o| g.with_observation(o))
    }

    pub fn with_assay_data(mut self, data: GenericAssayData) -> Self {
        self.profiles.insert(data.molecular_profile_id.clone());
        self.generic_assay_data.push(data);
        self
    }

    pub fn with_meta(mut self, meta: GenericAssayMeta) -> Self {
        self.generic_assay_meta.push(meta);
        self
    }

    fn check_profiles<'a, I>(&self, requested: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for profile in requested {
            if !self.profiles.contains(profile) {
                return Err(CohortyxError::MolecularProfileNotFound(profile.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataAccessGateway for InMemoryGateway {
    async fn fetch_observations(&self, query: &ObservationQuery) -> Result<Vec<RawObservation>> {
        self.check_profiles(&query.profile_ids)?;

        let profiles: HashSet<&str> = query.profile_ids.iter().map(String::as_str).collect();
        let pairs: Option<HashSet<(&str, &str)>> = query.case_ids.as_ref().map(|cases| {
            query
                .profile_ids
                .iter()
                .zip(cases.iter())
                .map(|(p, c)| (p.as_str(), c.as_str()))
                .collect()
        });
        let units: HashSet<&str> = query.unit_ids.iter().map(String::as_str).collect();

        let rows: Vec<RawObservation> = self
            .observations
            .iter()
            .filter(|o| profiles.contains(o.molecular_profile_id.as_str()))
            .filter(|o| match &pairs {
                Some(pairs) => pairs.contains(&(o.molecular_profile_id.as_str(), o.case_key(query.case_type))),
                None => true,
            })
            .filter(|o| units.is_empty() || units.contains(o.alteration_unit_key.as_str()))
            .filter(|o| query.alteration_types.allows(o.alteration_type_code))
            .cloned()
            .collect();

        tracing::debug!(rows = rows.len(), "Fetched observations");
        Ok(rows)
    }

    async fn fetch_generic_assay_data(&self, query: &CanonicalQuery) -> Result<Vec<GenericAssayData>> {
        self.check_profiles(&query.profile_ids)?;

        let profiles: HashSet<&str> = query.profile_ids.iter().map(String::as_str).collect();
        let pairs: Option<HashSet<(&str, &str)>> =
            query.case_pairs().map(|p| p.into_iter().collect());
        let listed: Option<HashSet<&str>> = match (&pairs, &query.sample_list_id) {
            (None, Some(list_id)) => {
                let members = self.sample_lists.get(list_id);
                if members.is_none() {
                    tracing::debug!(sample_list = %list_id, "Unknown sample list, no samples selected");
                }
                Some(members.map(|m| m.iter().map(String::as_str).collect()).unwrap_or_default())
            }
            _ => None,
        };
        let units: HashSet<&str> = query.unit_ids.iter().map(String::as_str).collect();

        let rows = self
            .generic_assay_data
            .iter()
            .filter(|d| profiles.contains(d.molecular_profile_id.as_str()))
            .filter(|d| match (&pairs, &listed) {
                (Some(pairs), _) => pairs.contains(&(d.molecular_profile_id.as_str(), d.sample_id.as_str())),
                (None, Some(listed)) => listed.contains(d.sample_id.as_str()),
                (None, None) => true,
            })
            .filter(|d| units.contains(d.generic_assay_stable_id.as_str()))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn fetch_generic_assay_meta(&self, stable_ids: &[String]) -> Result<Vec<GenericAssayMeta>> {
        Ok(stable_ids
            .iter()
            .filter_map(|id| self.generic_assay_meta.iter().find(|m| &m.stable_id == id))
            .cloned()
            .collect())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
