//! Fixture builders shared by tests across the workspace.

use cohortyx_common::entities::{
    CaseSets, GenericAssayData, GenericAssayMeta, MolecularProfileCaseIdentifier, RawObservation,
};

/// Copy-number profile used by the fixtures.
pub const CNA_PROFILE: &str = "brca_tcga_gistic";

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ids(profile: &str, cases: &[&str]) -> Vec<MolecularProfileCaseIdentifier> {
    cases.iter().map(|c| MolecularProfileCaseIdentifier::new(profile, *c)).collect()
}

/// Case sets over one profile, in the given order.
///
/// Panics on duplicate group names.
pub fn case_sets(profile: &str, groups: &[(&str, &[&str])]) -> CaseSets {
    CaseSets::from_groups(groups.iter().map(|(name, cases)| (*name, ids(profile, cases))))
        .expect("fixture group names must be unique")
}

/// A copy-number row with an alteration code.
pub fn cna(profile: &str, case: &str, unit: &str, code: i32) -> RawObservation {
    RawObservation::new(profile, case, unit).with_alteration_type(code)
}

/// Sample-level row attached to a patient.
pub fn patient_row(profile: &str, sample: &str, patient: &str, unit: &str, code: i32) -> RawObservation {
    cna(profile, sample, unit, code).with_patient(patient)
}

pub fn assay_row(profile: &str, sample: &str, stable_id: &str, value: &str) -> GenericAssayData {
    GenericAssayData {
        molecular_profile_id: profile.to_string(),
        sample_id: sample.to_string(),
        patient_id: Some(format!("{sample}-P")),
        study_id: profile.split('_').next().map(str::to_string),
        generic_assay_stable_id: stable_id.to_string(),
        value: value.to_string(),
    }
}

pub fn meta(stable_id: &str, entity_type: &str) -> GenericAssayMeta {
    GenericAssayMeta {
        stable_id: stable_id.to_string(),
        entity_type: entity_type.to_string(),
        generic_entity_meta_properties: [("NAME".to_string(), stable_id.to_string())].into_iter().collect(),
    }
}

/// A={p1,p2,p3}, B={p4,p5}; GENE_X amplified in p1 and p4, MYC deleted in p2.
pub fn two_group_cohort() -> (CaseSets, Vec<RawObservation>) {
    let sets = case_sets(CNA_PROFILE, &[("A", &["p1", "p2", "p3"]), ("B", &["p4", "p5"])]);
    let rows = vec![
        cna(CNA_PROFILE, "p1", "GENE_X", 2),
        cna(CNA_PROFILE, "p4", "GENE_X", 2),
        cna(CNA_PROFILE, "p2", "MYC", -2),
    ];
    (sets, rows)
}

/// The JSON dataset layout read by the CLI gateway.
pub fn dataset_json(observations: &[RawObservation]) -> String {
    serde_json::json!({
        "profiles": [CNA_PROFILE],
        "observations": observations,
    })
    .to_string()
}
