//! Generic assay data and metadata through the service layer.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use cohortyx_common::entities::Projection;
use cohortyx_common::error::CohortyxError;
use cohortyx_enrichment::{
    GenericAssayService, InMemoryGateway, RawAssayDataFilter, SampleMolecularIdentifier, Shaped,
};
use cohortyx_test_utils::{assay_row, meta};

const IC50: &str = "ccle_treatment_ic50";
const AUC: &str = "gdsc_treatment_auc";

fn gateway() -> InMemoryGateway {
    InMemoryGateway::new()
        .with_sample_list("ccle_all", &["s1", "s2"])
        .with_assay_data(assay_row(IC50, "s1", "Erlotinib", "2.1"))
        .with_assay_data(assay_row(IC50, "s2", "Erlotinib", "8.0"))
        .with_assay_data(assay_row(IC50, "s3", "Erlotinib", "0.4"))
        .with_assay_data(assay_row(IC50, "s1", "Lapatinib", "1.2"))
        .with_assay_data(assay_row(AUC, "s9", "Erlotinib", "0.77"))
        .with_meta(meta("Erlotinib", "TREATMENT"))
        .with_meta(meta("Lapatinib", "TREATMENT"))
}

fn service() -> GenericAssayService<InMemoryGateway> {
    GenericAssayService::new(Arc::new(gateway()))
}

fn stable_ids(ids: &[&str]) -> Option<Vec<String>> {
    Some(ids.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn test_sample_list_filter() {
    let filter = RawAssayDataFilter {
        molecular_profile_id: Some(IC50.to_string()),
        sample_list_id: Some("ccle_all".to_string()),
        generic_assay_stable_ids: stable_ids(&["Erlotinib"]),
        ..Default::default()
    };
    let body = service()
        .fetch_generic_assay_data(filter, Projection::Detailed)
        .await
        .unwrap()
        .into_body()
        .unwrap();
    let samples: Vec<&str> = body.iter().map(|d| d.sample_id.as_str()).collect();
    assert_eq!(samples, vec!["s1", "s2"]);
    assert!(body[0].patient_id.is_some());
}

#[tokio::test]
async fn test_cross_profile_pairs_are_not_crossed() {
    let filter = RawAssayDataFilter {
        sample_molecular_identifiers: Some(vec![
            SampleMolecularIdentifier::new(IC50, "s3"),
            SampleMolecularIdentifier::new(AUC, "s9"),
        ]),
        generic_assay_stable_ids: stable_ids(&["Erlotinib"]),
        ..Default::default()
    };
    let body = service()
        .fetch_generic_assay_data(filter, Projection::Summary)
        .await
        .unwrap()
        .into_body()
        .unwrap();
    let pairs: Vec<(&str, &str)> = body
        .iter()
        .map(|d| (d.molecular_profile_id.as_str(), d.sample_id.as_str()))
        .collect();
    assert_eq!(pairs, vec![(IC50, "s3"), (AUC, "s9")]);
    assert!(body.iter().all(|d| d.patient_id.is_none() && d.study_id.is_none()));
}

#[tokio::test]
async fn test_molecular_profiles_filter_returns_all_samples() {
    let filter = RawAssayDataFilter {
        molecular_profile_ids: stable_ids(&[IC50]),
        generic_assay_stable_ids: stable_ids(&["Erlotinib", "Lapatinib"]),
        ..Default::default()
    };
    let shaped = service().fetch_generic_assay_data(filter, Projection::Meta).await.unwrap();
    assert_eq!(shaped, Shaped::Count(4));
}

#[tokio::test]
async fn test_contradictory_filter_rejected() {
    let filter = RawAssayDataFilter {
        molecular_profile_id: Some(IC50.to_string()),
        sample_list_id: Some("ccle_all".to_string()),
        sample_ids: stable_ids(&["s1"]),
        generic_assay_stable_ids: stable_ids(&["Erlotinib"]),
        ..Default::default()
    };
    let err = service().fetch_generic_assay_data(filter, Projection::Summary).await.unwrap_err();
    assert!(matches!(err, CohortyxError::InvalidFilterShape(_)));
}

#[tokio::test]
async fn test_unknown_profile_not_found() {
    let filter = RawAssayDataFilter {
        molecular_profile_id: Some("missing_profile".to_string()),
        sample_ids: stable_ids(&["s1"]),
        generic_assay_stable_ids: stable_ids(&["Erlotinib"]),
        ..Default::default()
    };
    let err = service().fetch_generic_assay_data(filter, Projection::Summary).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_meta_lookup() {
    let svc = service();
    let one = svc.get_generic_assay_meta_by_stable_id("Lapatinib").await.unwrap();
    assert_eq!(one.entity_type, "TREATMENT");

    let ids = vec!["Lapatinib".to_string(), "Unknown".to_string(), "Erlotinib".to_string()];
    let many = svc.get_generic_assay_meta_by_stable_ids(&ids).await.unwrap();
    let found: Vec<&str> = many.iter().map(|m| m.stable_id.as_str()).collect();
    assert_eq!(found, vec!["Lapatinib", "Erlotinib"]);

    let err = svc
        .get_generic_assay_meta_by_stable_ids(&["Unknown".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, CohortyxError::GenericAssayNotFound(_)));
}
