//! Case group resolution.
//!
//! Every distinct `(profile, case)` declared by any group gets one slot in a
//! shared arena; groups hold sets of slots. Rows are bound to a slot, so that
//! per-group numerators are counted case-wise rather than row-wise and a case
//! shared by several groups is only looked up once.

use std::collections::{HashMap, HashSet};

use cohortyx_common::entities::{CaseSets, EnrichmentType, RawObservation};
use cohortyx_common::error::{CohortyxError, Result};

/// Deduplicated membership of one comparison group.
#[derive(Debug, Clone)]
pub struct GroupMembership {
    pub name: String,
    members: HashSet<usize>,
}

impl GroupMembership {
    /// Number of distinct declared cases.
    pub fn total_count(&self) -> u64 {
        self.members.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, case: usize) -> bool {
        self.members.contains(&case)
    }

    /// How many of `cases` belong to this group.
    pub fn count_in(&self, cases: &HashSet<usize>) -> u64 {
        // iterate the smaller side
        if cases.len() < self.members.len() {
            cases.iter().filter(|c| self.members.contains(*c)).count() as u64
        } else {
            self.members.iter().filter(|c| cases.contains(*c)).count() as u64
        }
    }
}

/// A row bound to its case slot.
#[derive(Debug, Clone, Copy)]
pub struct BoundRow<'a> {
    pub case: usize,
    pub row: &'a RawObservation,
}

#[derive(Debug, Clone)]
pub struct BoundObservations<'a> {
    pub rows: Vec<BoundRow<'a>>,
    /// Rows whose case no group declares.
    pub dropped_rows: usize,
}

/// Membership tables for one request.
#[derive(Debug, Clone)]
pub struct CaseGroups {
    enrichment_type: EnrichmentType,
    // profile -> case -> slot
    case_index: HashMap<String, HashMap<String, usize>>,
    case_count: usize,
    groups: Vec<GroupMembership>,
}

impl CaseGroups {
    /// Build membership tables. Cases are patient ids when `enrichment_type`
    /// is `Patient`, sample ids otherwise.
    pub fn new(case_sets: &CaseSets, enrichment_type: EnrichmentType) -> Self {
        let mut case_index: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut case_count = 0usize;
        let mut groups = Vec::with_capacity(case_sets.len());

        for set in case_sets {
            let mut members = HashSet::new();
            for id in set.distinct_members() {
                let slot = *case_index
                    .entry(id.molecular_profile_id.clone())
                    .or_default()
                    .entry(id.case_id.clone())
                    .or_insert_with(|| {
                        case_count += 1;
                        case_count - 1
                    });
                members.insert(slot);
            }
            groups.push(GroupMembership { name: set.name.clone(), members });
        }

        tracing::debug!(
            groups = groups.len(),
            cases = case_count,
            ?enrichment_type,
            "Resolved case groups"
        );

        Self { enrichment_type, case_index, case_count, groups }
    }

    pub fn groups(&self) -> &[GroupMembership] {
        &self.groups
    }

    /// Distinct cases across all groups.
    pub fn case_count(&self) -> usize {
        self.case_count
    }

    /// True when no group declares a single case.
    pub fn all_empty(&self) -> bool {
        self.groups.iter().all(GroupMembership::is_empty)
    }

    /// Slot of the case a row counts towards.
    pub fn case_of(&self, row: &RawObservation) -> Result<usize> {
        let case_key = row.case_key(self.enrichment_type);
        self.case_index
            .get(&row.molecular_profile_id)
            .and_then(|cases| cases.get(case_key))
            .copied()
            .ok_or_else(|| CohortyxError::UnknownGroup {
                molecular_profile_id: row.molecular_profile_id.clone(),
                case_id: case_key.to_string(),
            })
    }

    /// Bind rows to case slots. Rows of undeclared cases are dropped, not fatal.
    pub fn bind<'a>(&self, observations: &'a [RawObservation]) -> BoundObservations<'a> {
        let mut rows = Vec::with_capacity(observations.len());
        let mut dropped_rows = 0usize;

        for row in observations {
            match self.case_of(row) {
                Ok(case) => rows.push(BoundRow { case, row }),
                Err(e) => {
                    tracing::debug!("Dropping row for {}: {}", row.alteration_unit_key, e);
                    dropped_rows += 1;
                }
            }
        }

        if dropped_rows > 0 {
            tracing::warn!(
                dropped_rows,
                kept_rows = rows.len(),
                "Observations reference cases outside every group; excluded from comparison"
            );
        }

        BoundObservations { rows, dropped_rows }
    }

    /// Cases of every other group that are not also in `group`.
    pub fn rest_of(&self, group: usize) -> HashSet<usize> {
        let tested = &self.groups[group];
        self.groups
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != group)
            .flat_map(|(_, g)| g.members.iter().copied())
            .filter(|c| !tested.contains(*c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohortyx_common::entities::MolecularProfileCaseIdentifier;

    fn ids(profile: &str, cases: &[&str]) -> Vec<MolecularProfileCaseIdentifier> {
        cases.iter().map(|c| MolecularProfileCaseIdentifier::new(profile, *c)).collect()
    }

    #[test]
    fn test_totals_are_distinct_cases() {
        let sets = CaseSets::from_groups(vec![
            ("A", ids("cna", &["s1", "s2", "s1", "s3"])),
            ("B", ids("cna", &["s3", "s4"])),
        ])
        .unwrap();
        let groups = CaseGroups::new(&sets, EnrichmentType::Sample);
        assert_eq!(groups.groups()[0].total_count(), 3);
        assert_eq!(groups.groups()[1].total_count(), 2);
        // s3 shared between groups occupies one slot
        assert_eq!(groups.case_count(), 4);
    }

    #[test]
    fn test_unknown_case_dropped() {
        let sets = CaseSets::from_groups(vec![("A", ids("cna", &["s1"]))]).unwrap();
        let groups = CaseGroups::new(&sets, EnrichmentType::Sample);
        let rows = vec![
            RawObservation::new("cna", "s1", "EGFR"),
            RawObservation::new("cna", "s9", "EGFR"),
            RawObservation::new("other", "s1", "EGFR"),
        ];
        let bound = groups.bind(&rows);
        assert_eq!(bound.rows.len(), 1);
        assert_eq!(bound.dropped_rows, 2);
        assert!(matches!(
            groups.case_of(&rows[1]),
            Err(CohortyxError::UnknownGroup { case_id, .. }) if case_id == "s9"
        ));
    }

    #[test]
    fn test_patient_rows_share_a_slot() {
        let sets = CaseSets::from_groups(vec![("A", ids("cna", &["P1", "P2"]))]).unwrap();
        let groups = CaseGroups::new(&sets, EnrichmentType::Patient);
        let rows = vec![
            RawObservation::new("cna", "P1-s1", "EGFR").with_patient("P1"),
            RawObservation::new("cna", "P1-s2", "EGFR").with_patient("P1"),
        ];
        let bound = groups.bind(&rows);
        assert_eq!(bound.rows.len(), 2);
        assert_eq!(bound.rows[0].case, bound.rows[1].case);
    }

    #[test]
    fn test_rest_excludes_overlap() {
        let sets = CaseSets::from_groups(vec![
            ("A", ids("cna", &["s1", "s2"])),
            ("B", ids("cna", &["s2", "s3"])),
            ("C", ids("cna", &["s4"])),
        ])
        .unwrap();
        let groups = CaseGroups::new(&sets, EnrichmentType::Sample);
        let rest = groups.rest_of(0);
        assert_eq!(rest.len(), 2); // s3, s4
        assert!(rest.iter().all(|c| !groups.groups()[0].contains(*c)));
    }

    #[test]
    fn test_count_in() {
        let sets = CaseSets::from_groups(vec![("A", ids("cna", &["s1", "s2", "s3"]))]).unwrap();
        let groups = CaseGroups::new(&sets, EnrichmentType::Sample);
        let altered: HashSet<usize> = [0, 2, 99].into_iter().collect();
        assert_eq!(groups.groups()[0].count_in(&altered), 2);
    }
}
