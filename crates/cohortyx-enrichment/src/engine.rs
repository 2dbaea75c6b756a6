//! Enrichment computation.
//!
//! For every alteration unit found in the bound rows, counts altered cases
//! per group and tests each group for differential alteration frequency:
//!
//! - two non-empty groups: one A-vs-B Fisher test;
//! - more than two: one test per group against the union of the others;
//! - one: counts only.
//!
//! Output follows the order in which units are first met in the rows.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use cohortyx_common::config::EnrichmentConfig;
use cohortyx_common::entities::{
    AlterationEnrichment, AlterationTypeFilter, AlterationUnit, CaseSets, ComparisonMode,
    ContingencyTable, EnrichmentType, GroupComparison, GroupStats, RawObservation, Versus,
};
use cohortyx_common::error::{CohortyxError, Result};

use crate::contingency::{associate, benjamini_hochberg};
use crate::resolver::{BoundObservations, CaseGroups};

/// Tuning knobs for one computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Unit count from which per-unit statistics run on the rayon pool.
    pub parallel_threshold: usize,
    /// Attach Benjamini–Hochberg q-values.
    pub adjust_p_values: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for EngineOptions {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            parallel_threshold: config.parallel_threshold.max(1),
            adjust_p_values: config.adjust_p_values,
        }
    }
}

/// Rows of one unit, reduced to case slots.
#[derive(Debug)]
struct UnitObservations<'a> {
    key: &'a str,
    altered: HashSet<usize>,
    // case -> (sum, count) of numeric values
    values: BTreeMap<usize, (f64, u32)>,
}

impl UnitObservations<'_> {
    fn mean_value(&self, in_group: impl Fn(usize) -> bool) -> Option<f64> {
        let per_case: Vec<f64> = self
            .values
            .iter()
            .filter(|(case, _)| in_group(**case))
            .map(|(_, (sum, n))| sum / f64::from(*n))
            .collect();
        if per_case.is_empty() {
            None
        } else {
            Some(per_case.iter().sum::<f64>() / per_case.len() as f64)
        }
    }
}

/// Group the counted rows by unit in first-encountered order.
fn collect_units<'a>(
    bound: &BoundObservations<'a>,
    alteration_types: &AlterationTypeFilter,
) -> Vec<UnitObservations<'a>> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut units: Vec<UnitObservations<'a>> = Vec::new();

    for bound_row in &bound.rows {
        let row: &'a RawObservation = bound_row.row;
        if !alteration_types.allows(row.alteration_type_code) {
            continue;
        }
        let slot = *index.entry(row.alteration_unit_key.as_str()).or_insert_with(|| {
            units.push(UnitObservations {
                key: row.alteration_unit_key.as_str(),
                altered: HashSet::new(),
                values: BTreeMap::new(),
            });
            units.len() - 1
        });

        let unit = &mut units[slot];
        unit.altered.insert(bound_row.case);
        if let Some(value) = row.numeric_value.filter(|v| v.is_finite()) {
            let entry = unit.values.entry(bound_row.case).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    units
}

fn count_overlap(a: &HashSet<usize>, b: &HashSet<usize>) -> u64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter(|c| large.contains(*c)).count() as u64
}

/// Per-request comparison layout, shared by every unit.
struct Layout<'g> {
    groups: &'g CaseGroups,
    /// Indices of non-empty groups in declaration order.
    active: Vec<usize>,
    mode: ComparisonMode,
    /// One-vs-rest reference sets, parallel to `active`.
    rests: Vec<HashSet<usize>>,
    alteration_type: Option<i32>,
}

impl<'g> Layout<'g> {
    fn new(groups: &'g CaseGroups, alteration_types: &AlterationTypeFilter) -> Self {
        let active: Vec<usize> = groups
            .groups()
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.is_empty())
            .map(|(i, _)| i)
            .collect();

        let mode = match active.len() {
            0 | 1 => ComparisonMode::Descriptive,
            2 => ComparisonMode::TwoGroup,
            _ => ComparisonMode::OneVsRest,
        };

        let rests = if mode == ComparisonMode::OneVsRest {
            active.iter().map(|&g| groups.rest_of(g)).collect()
        } else {
            vec![]
        };

        Self { groups, active, mode, rests, alteration_type: alteration_types.single() }
    }

    fn enrich(&self, unit: &UnitObservations<'_>, cancel: &CancellationToken) -> Result<AlterationEnrichment> {
        if cancel.is_cancelled() {
            return Err(CohortyxError::Cancelled);
        }

        let memberships = self.groups.groups();
        let altered: Vec<u64> = self
            .active
            .iter()
            .map(|&g| memberships[g].count_in(&unit.altered))
            .collect();

        let per_group_stats = self
            .active
            .iter()
            .zip(&altered)
            .map(|(&g, &altered_count)| {
                let group = &memberships[g];
                let total_count = group.total_count();
                GroupStats {
                    group_name: group.name.clone(),
                    altered_count,
                    total_count,
                    frequency: altered_count as f64 / total_count as f64,
                    mean_value: unit.mean_value(|case| group.contains(case)),
                }
            })
            .collect();

        let comparisons = match self.mode {
            ComparisonMode::Descriptive => vec![],
            ComparisonMode::TwoGroup => {
                let (a, b) = (&memberships[self.active[0]], &memberships[self.active[1]]);
                let table = ContingencyTable::new(altered[0], a.total_count(), altered[1], b.total_count());
                vec![comparison(&a.name, Versus::Group(b.name.clone()), table)?]
            }
            ComparisonMode::OneVsRest => self
                .active
                .iter()
                .enumerate()
                .map(|(i, &g)| {
                    let group = &memberships[g];
                    let rest = &self.rests[i];
                    let table = ContingencyTable::new(
                        altered[i],
                        group.total_count(),
                        count_overlap(&unit.altered, rest),
                        rest.len() as u64,
                    );
                    comparison(&group.name, Versus::Rest, table)
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(AlterationEnrichment {
            unit: AlterationUnit {
                alteration_unit_key: unit.key.to_string(),
                alteration_type: self.alteration_type,
            },
            per_group_stats,
            mode: self.mode,
            comparisons,
        })
    }
}

fn comparison(group_name: &str, versus: Versus, table: ContingencyTable) -> Result<GroupComparison> {
    let assoc = associate(&table)?;
    Ok(GroupComparison {
        group_name: group_name.to_string(),
        versus,
        table,
        odds_ratio: assoc.odds_ratio,
        log2_odds_ratio: Some(assoc.log2_odds_ratio),
        p_value: assoc.p_value,
        q_value: None,
    })
}

/// Attach q-values slot by slot: comparison `j` of every unit forms one family.
fn adjust_p_values(results: &mut [AlterationEnrichment]) {
    let slots = results.first().map_or(0, |r| r.comparisons.len());
    for slot in 0..slots {
        let p_values: Vec<f64> = results.iter().map(|r| r.comparisons[slot].p_value).collect();
        for (result, q) in results.iter_mut().zip(benjamini_hochberg(&p_values)) {
            result.comparisons[slot].q_value = Some(q);
        }
    }
}

/// Stateless enrichment engine; one instance can serve concurrent requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichmentEngine {
    options: EngineOptions,
}

impl EnrichmentEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Compute enrichments for raw rows against the given case sets.
    ///
    /// Fails with `EmptyCaseSet` when no group declares any case. Rows of
    /// undeclared cases are dropped. The cancellation token is checked before
    /// every unit.
    pub fn compute(
        &self,
        case_sets: &CaseSets,
        observations: &[RawObservation],
        alteration_types: &AlterationTypeFilter,
        enrichment_type: EnrichmentType,
        cancel: &CancellationToken,
    ) -> Result<Vec<AlterationEnrichment>> {
        let groups = CaseGroups::new(case_sets, enrichment_type);
        if groups.all_empty() {
            return Err(CohortyxError::EmptyCaseSet);
        }
        let bound = groups.bind(observations);
        self.compute_bound(&groups, &bound, alteration_types, cancel)
    }

    /// Compute from rows already bound by a [`CaseGroups`].
    pub fn compute_bound(
        &self,
        groups: &CaseGroups,
        bound: &BoundObservations<'_>,
        alteration_types: &AlterationTypeFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<AlterationEnrichment>> {
        if groups.all_empty() {
            return Err(CohortyxError::EmptyCaseSet);
        }

        let layout = Layout::new(groups, alteration_types);
        let units = collect_units(bound, alteration_types);

        let mut results: Vec<AlterationEnrichment> = if units.len() >= self.options.parallel_threshold {
            units.par_iter().map(|u| layout.enrich(u, cancel)).collect::<Result<_>>()?
        } else {
            units.iter().map(|u| layout.enrich(u, cancel)).collect::<Result<_>>()?
        };

        if self.options.adjust_p_values {
            adjust_p_values(&mut results);
        }

        tracing::info!(
            units = results.len(),
            groups = layout.active.len(),
            mode = ?layout.mode,
            dropped_rows = bound.dropped_rows,
            "Computed alteration enrichments"
        );
        Ok(results)
    }
}

/// Convenience wrapper over [`EnrichmentEngine::compute`].
pub fn compute_enrichment(
    case_sets: &CaseSets,
    observations: &[RawObservation],
    alteration_types: &AlterationTypeFilter,
    enrichment_type: EnrichmentType,
    options: &EngineOptions,
    cancel: &CancellationToken,
) -> Result<Vec<AlterationEnrichment>> {
    EnrichmentEngine::new(*options).compute(case_sets, observations, alteration_types, enrichment_type, cancel)
}
