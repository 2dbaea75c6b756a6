/// Core request-scoped types: case identifiers, case sets, raw observations
/// and enrichment results. Nothing here outlives a single request.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CohortyxError, Result};

// ---------------------------------------------------------------------------
// Case identifiers and case sets
// ---------------------------------------------------------------------------

/// One case (sample or patient) within one molecular profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MolecularProfileCaseIdentifier {
    pub molecular_profile_id: String,
    pub case_id: String,
}

impl MolecularProfileCaseIdentifier {
    pub fn new(molecular_profile_id: impl Into<String>, case_id: impl Into<String>) -> Self {
        Self {
            molecular_profile_id: molecular_profile_id.into(),
            case_id: case_id.into(),
        }
    }
}

/// A named comparison group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSet {
    pub name: String,
    pub members: Vec<MolecularProfileCaseIdentifier>,
}

impl CaseSet {
    pub fn new(name: impl Into<String>, members: Vec<MolecularProfileCaseIdentifier>) -> Self {
        Self { name: name.into(), members }
    }

    /// Members with repeats removed, in declaration order.
    pub fn distinct_members(&self) -> Vec<&MolecularProfileCaseIdentifier> {
        let mut seen = HashSet::new();
        self.members.iter().filter(|m| seen.insert(*m)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Ordered collection of case sets with unique names.
///
/// Deserializes from a JSON array of `{name, members}` objects so that group
/// order is preserved end to end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CaseSet>", into = "Vec<CaseSet>")]
pub struct CaseSets {
    sets: Vec<CaseSet>,
}

impl CaseSets {
    pub fn new(sets: Vec<CaseSet>) -> Result<Self> {
        let mut names = HashSet::new();
        for set in &sets {
            if !names.insert(set.name.as_str()) {
                return Err(CohortyxError::DuplicateGroup(set.name.clone()));
            }
        }
        Ok(Self { sets })
    }

    /// Build from `(group name, members)` pairs, keeping iteration order.
    pub fn from_groups<I, S>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<MolecularProfileCaseIdentifier>)>,
        S: Into<String>,
    {
        Self::new(
            groups
                .into_iter()
                .map(|(name, members)| CaseSet::new(name, members))
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CaseSet> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }
}

impl TryFrom<Vec<CaseSet>> for CaseSets {
    type Error = CohortyxError;

    fn try_from(sets: Vec<CaseSet>) -> Result<Self> {
        CaseSets::new(sets)
    }
}

impl From<CaseSets> for Vec<CaseSet> {
    fn from(sets: CaseSets) -> Self {
        sets.sets
    }
}

impl<'a> IntoIterator for &'a CaseSets {
    type Item = &'a CaseSet;
    type IntoIter = std::slice::Iter<'a, CaseSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.sets.iter()
    }
}

// ---------------------------------------------------------------------------
// Enrichment type
// ---------------------------------------------------------------------------

/// Whether denominators are counted per sample or per patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrichmentType {
    #[default]
    Sample,
    Patient,
}

impl FromStr for EnrichmentType {
    type Err = CohortyxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SAMPLE" => Ok(EnrichmentType::Sample),
            "PATIENT" => Ok(EnrichmentType::Patient),
            other => Err(CohortyxError::Config(format!("unknown enrichment type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Alteration units and type codes
// ---------------------------------------------------------------------------

/// The thing being tested for enrichment: a gene/region or an assay stable id,
/// optionally tagged with the alteration type it was tested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterationUnit {
    pub alteration_unit_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alteration_type: Option<i32>,
}

/// Discrete copy-number calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CnaType {
    HomozygousDeletion,
    HemizygousDeletion,
    Diploid,
    Gain,
    Amplification,
}

impl CnaType {
    pub fn code(&self) -> i32 {
        match self {
            CnaType::HomozygousDeletion => -2,
            CnaType::HemizygousDeletion => -1,
            CnaType::Diploid            =>  0,
            CnaType::Gain               =>  1,
            CnaType::Amplification      =>  2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(CnaType::HomozygousDeletion),
            -1 => Some(CnaType::HemizygousDeletion),
            0  => Some(CnaType::Diploid),
            1  => Some(CnaType::Gain),
            2  => Some(CnaType::Amplification),
            _  => None,
        }
    }
}

/// Set of alteration-type codes that count as "altered". Empty means no filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlterationTypeFilter(BTreeSet<i32>);

impl AlterationTypeFilter {
    pub fn new<I: IntoIterator<Item = i32>>(codes: I) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A row without a code never matches a non-empty filter.
    pub fn allows(&self, code: Option<i32>) -> bool {
        if self.0.is_empty() {
            return true;
        }
        code.is_some_and(|c| self.0.contains(&c))
    }

    /// The code when the filter names exactly one.
    pub fn single(&self) -> Option<i32> {
        if self.0.len() == 1 {
            self.0.iter().next().copied()
        } else {
            None
        }
    }
}

impl From<Vec<i32>> for AlterationTypeFilter {
    fn from(codes: Vec<i32>) -> Self {
        Self::new(codes)
    }
}

// ---------------------------------------------------------------------------
// Raw observations
// ---------------------------------------------------------------------------

/// One measurement row as returned by the data-access gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub molecular_profile_id: String,
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub alteration_unit_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alteration_type_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
}

impl RawObservation {
    pub fn new(
        molecular_profile_id: impl Into<String>,
        case_id: impl Into<String>,
        alteration_unit_key: impl Into<String>,
    ) -> Self {
        Self {
            molecular_profile_id: molecular_profile_id.into(),
            case_id: case_id.into(),
            patient_id: None,
            alteration_unit_key: alteration_unit_key.into(),
            alteration_type_code: None,
            numeric_value: None,
        }
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_alteration_type(mut self, code: i32) -> Self {
        self.alteration_type_code = Some(code);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.numeric_value = Some(value);
        self
    }

    /// The case this row counts towards at the given granularity.
    /// Patient-level rows without a patient id fall back to their case id.
    pub fn case_key(&self, enrichment_type: EnrichmentType) -> &str {
        match enrichment_type {
            EnrichmentType::Sample => &self.case_id,
            EnrichmentType::Patient => self.patient_id.as_deref().unwrap_or(&self.case_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment results
// ---------------------------------------------------------------------------

/// Per-group counts for one alteration unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub group_name: String,
    pub altered_count: u64,
    pub total_count: u64,
    pub frequency: f64,
    /// Mean numeric value over altered cases that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<f64>,
}

/// 2×2 table: altered/unaltered × tested group/reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContingencyTable {
    pub altered_in_group: u64,
    pub unaltered_in_group: u64,
    pub altered_in_reference: u64,
    pub unaltered_in_reference: u64,
}

impl ContingencyTable {
    pub fn new(altered_in_group: u64, group_total: u64, altered_in_reference: u64, reference_total: u64) -> Self {
        Self {
            altered_in_group,
            unaltered_in_group: group_total.saturating_sub(altered_in_group),
            altered_in_reference,
            unaltered_in_reference: reference_total.saturating_sub(altered_in_reference),
        }
    }

    pub fn group_total(&self) -> u64 {
        self.altered_in_group + self.unaltered_in_group
    }

    pub fn reference_total(&self) -> u64 {
        self.altered_in_reference + self.unaltered_in_reference
    }

    pub fn altered_total(&self) -> u64 {
        self.altered_in_group + self.altered_in_reference
    }

    pub fn total(&self) -> u64 {
        self.group_total() + self.reference_total()
    }
}

/// What a group is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Versus {
    Group(String),
    Rest,
}

/// One association test for one group of one alteration unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupComparison {
    pub group_name: String,
    pub versus: Versus,
    pub table: ContingencyTable,
    pub odds_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log2_odds_ratio: Option<f64>,
    pub p_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Exactly two non-empty groups: one A-vs-B test.
    TwoGroup,
    /// More than two non-empty groups: one test per group against the rest.
    OneVsRest,
    /// A single non-empty group: counts only.
    Descriptive,
}

/// Output unit of the enrichment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterationEnrichment {
    #[serde(flatten)]
    pub unit: AlterationUnit,
    pub per_group_stats: Vec<GroupStats>,
    pub mode: ComparisonMode,
    pub comparisons: Vec<GroupComparison>,
}

impl AlterationEnrichment {
    pub fn key(&self) -> &str {
        &self.unit.alteration_unit_key
    }

    pub fn group(&self, name: &str) -> Option<&GroupStats> {
        self.per_group_stats.iter().find(|g| g.group_name == name)
    }

    pub fn comparison(&self, group_name: &str) -> Option<&GroupComparison> {
        self.comparisons.iter().find(|c| c.group_name == group_name)
    }
}

// ---------------------------------------------------------------------------
// Generic assay reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericAssayMeta {
    pub stable_id: String,
    pub entity_type: String,
    #[serde(default)]
    pub generic_entity_meta_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericAssayData {
    pub molecular_profile_id: String,
    pub sample_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    pub generic_assay_stable_id: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Requested response detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Projection {
    #[default]
    Summary,
    Detailed,
    Meta,
}

impl Projection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Projection::Summary  => "SUMMARY",
            Projection::Detailed => "DETAILED",
            Projection::Meta     => "META",
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Projection {
    type Err = CohortyxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUMMARY"  => Ok(Projection::Summary),
            "DETAILED" => Ok(Projection::Detailed),
            "META"     => Ok(Projection::Meta),
            _          => Err(CohortyxError::InvalidProjection(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(profile: &str, case: &str) -> MolecularProfileCaseIdentifier {
        MolecularProfileCaseIdentifier::new(profile, case)
    }

    #[test]
    fn test_duplicate_group_names_rejected() {
        let err = CaseSets::from_groups(vec![
            ("A", vec![id("p", "s1")]),
            ("A", vec![id("p", "s2")]),
        ])
        .unwrap_err();
        assert!(matches!(err, CohortyxError::DuplicateGroup(name) if name == "A"));
    }

    #[test]
    fn test_distinct_members_keeps_first_occurrence() {
        let set = CaseSet::new("A", vec![id("p", "s1"), id("p", "s2"), id("p", "s1")]);
        let distinct = set.distinct_members();
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].case_id, "s1");
        assert_eq!(distinct[1].case_id, "s2");
    }

    #[test]
    fn test_case_sets_json_keeps_order() {
        let json = r#"[
            {"name": "zeta", "members": [{"molecularProfileId": "p", "caseId": "s1"}]},
            {"name": "alpha", "members": []}
        ]"#;
        let sets: CaseSets = serde_json::from_str(json).unwrap();
        assert_eq!(sets.names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_alteration_filter_semantics() {
        let any = AlterationTypeFilter::any();
        assert!(any.allows(None));
        assert!(any.allows(Some(-2)));

        let amp = AlterationTypeFilter::new([CnaType::Amplification.code()]);
        assert!(amp.allows(Some(2)));
        assert!(!amp.allows(Some(-2)));
        assert!(!amp.allows(None));
        assert_eq!(amp.single(), Some(2));
    }

    #[test]
    fn test_patient_case_key_falls_back_to_sample() {
        let obs = RawObservation::new("p", "s1", "KRAS");
        assert_eq!(obs.case_key(EnrichmentType::Patient), "s1");
        let obs = obs.with_patient("P1");
        assert_eq!(obs.case_key(EnrichmentType::Patient), "P1");
        assert_eq!(obs.case_key(EnrichmentType::Sample), "s1");
    }

    #[test]
    fn test_projection_parse() {
        assert_eq!("meta".parse::<Projection>().unwrap(), Projection::Meta);
        assert_eq!("DETAILED".parse::<Projection>().unwrap(), Projection::Detailed);
        assert!("ID".parse::<Projection>().is_err());
    }

    #[test]
    fn test_cna_codes() {
        for code in -2..=2 {
            assert_eq!(CnaType::from_code(code).map(|t| t.code()), Some(code));
        }
        assert_eq!(CnaType::from_code(7), None);
    }
}
