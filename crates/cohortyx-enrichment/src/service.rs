//! Request-level orchestration.
//!
//! Each service call does one gateway round trip, then runs the synchronous
//! pipeline (resolve, compute, shape) on the fetched rows.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use cohortyx_common::entities::{
    AlterationEnrichment, AlterationTypeFilter, CaseSets, EnrichmentType, GenericAssayData,
    GenericAssayMeta, Projection,
};
use cohortyx_common::error::{CohortyxError, Result};

use crate::engine::{EngineOptions, EnrichmentEngine};
use crate::filter::{resolve_raw_filter, RawAssayDataFilter};
use crate::gateway::{DataAccessGateway, ObservationQuery};
use crate::projection::{shape, Shaped};
use crate::resolver::CaseGroups;

/// Derive the single observation fetch a set of groups needs: distinct
/// `(profile, case)` pairs in declaration order, as parallel vectors.
pub fn observation_query(
    case_sets: &CaseSets,
    alteration_types: &AlterationTypeFilter,
    enrichment_type: EnrichmentType,
) -> ObservationQuery {
    let mut seen = HashSet::new();
    let (profile_ids, case_ids): (Vec<String>, Vec<String>) = case_sets
        .iter()
        .flat_map(|set| set.members.iter())
        .filter(|id| seen.insert(*id))
        .map(|id| (id.molecular_profile_id.clone(), id.case_id.clone()))
        .unzip();

    ObservationQuery {
        profile_ids,
        case_ids: Some(case_ids),
        case_type: enrichment_type,
        unit_ids: vec![],
        alteration_types: alteration_types.clone(),
    }
}

// ── Copy-number enrichment ──────────────────────────────────────────────────

pub struct CopyNumberEnrichmentService<G: DataAccessGateway> {
    gateway: Arc<G>,
    engine: EnrichmentEngine,
}

impl<G: DataAccessGateway> CopyNumberEnrichmentService<G> {
    pub fn new(gateway: Arc<G>, options: EngineOptions) -> Self {
        Self { gateway, engine: EnrichmentEngine::new(options) }
    }

    /// Copy-number alteration enrichments of `case_sets`.
    #[instrument(
        skip(self, case_sets, alteration_types, cancel),
        fields(request_id = %Uuid::new_v4(), groups = case_sets.len(), ?enrichment_type)
    )]
    pub async fn get_copy_number_enrichments(
        &self,
        case_sets: &CaseSets,
        alteration_types: &AlterationTypeFilter,
        enrichment_type: EnrichmentType,
        cancel: &CancellationToken,
    ) -> Result<Vec<AlterationEnrichment>> {
        let groups = CaseGroups::new(case_sets, enrichment_type);
        if groups.all_empty() {
            return Err(CohortyxError::EmptyCaseSet);
        }

        let query = observation_query(case_sets, alteration_types, enrichment_type);
        let observations = self.gateway.fetch_observations(&query).await?;
        debug!(rows = observations.len(), "Observations fetched");

        let bound = groups.bind(&observations);
        let results = self.engine.compute_bound(&groups, &bound, alteration_types, cancel)?;

        info!(units = results.len(), "Copy-number enrichment complete");
        Ok(results)
    }

    /// Same as [`Self::get_copy_number_enrichments`], shaped by `projection`.
    pub async fn get_copy_number_enrichments_projected(
        &self,
        case_sets: &CaseSets,
        alteration_types: &AlterationTypeFilter,
        enrichment_type: EnrichmentType,
        projection: Projection,
        cancel: &CancellationToken,
    ) -> Result<Shaped<AlterationEnrichment>> {
        let results = self
            .get_copy_number_enrichments(case_sets, alteration_types, enrichment_type, cancel)
            .await?;
        Ok(shape(results, projection))
    }
}

// ── Generic assay ───────────────────────────────────────────────────────────

pub struct GenericAssayService<G: DataAccessGateway> {
    gateway: Arc<G>,
}

impl<G: DataAccessGateway> GenericAssayService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    pub async fn get_generic_assay_meta_by_stable_id(&self, stable_id: &str) -> Result<GenericAssayMeta> {
        self.gateway
            .fetch_generic_assay_meta(&[stable_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CohortyxError::GenericAssayNotFound(stable_id.to_string()))
    }

    /// Metadata for every known id, in request order. Fails only when none is known.
    pub async fn get_generic_assay_meta_by_stable_ids(&self, stable_ids: &[String]) -> Result<Vec<GenericAssayMeta>> {
        let metas = self.gateway.fetch_generic_assay_meta(stable_ids).await?;
        if metas.is_empty() {
            return Err(CohortyxError::GenericAssayNotFound(stable_ids.join(",")));
        }
        if metas.len() < stable_ids.len() {
            debug!(requested = stable_ids.len(), found = metas.len(), "Some stable ids unknown");
        }
        Ok(metas)
    }

    #[instrument(skip(self, filter), fields(request_id = %Uuid::new_v4(), %projection))]
    pub async fn fetch_generic_assay_data(
        &self,
        filter: RawAssayDataFilter,
        projection: Projection,
    ) -> Result<Shaped<GenericAssayData>> {
        let query = resolve_raw_filter(filter)?;
        let data = self.gateway.fetch_generic_assay_data(&query).await?;
        info!(rows = data.len(), "Generic assay data fetched");
        Ok(shape(data, projection))
    }
}
