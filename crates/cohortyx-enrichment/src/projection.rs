//! Response shaping by projection.
//!
//! SUMMARY drops optional detail, DETAILED returns records untouched and META
//! returns only the record count (exposed as the `total-count` header).

use serde::Serialize;

use cohortyx_common::entities::{AlterationEnrichment, GenericAssayData, Projection};

/// Name of the header carrying the META count.
pub const TOTAL_COUNT_HEADER: &str = "total-count";

/// A record with a reduced SUMMARY form.
pub trait Projectable {
    /// Strip everything SUMMARY does not carry.
    fn summarize(&mut self);
}

impl Projectable for AlterationEnrichment {
    fn summarize(&mut self) {
        for stats in &mut self.per_group_stats {
            stats.mean_value = None;
        }
        for cmp in &mut self.comparisons {
            cmp.log2_odds_ratio = None;
            cmp.q_value = None;
        }
    }
}

impl Projectable for GenericAssayData {
    fn summarize(&mut self) {
        self.patient_id = None;
        self.study_id = None;
    }
}

/// A shaped response: either records or a bare count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Shaped<T> {
    Body(Vec<T>),
    Count(usize),
}

impl<T> Shaped<T> {
    /// Number of records the response stands for.
    pub fn total_count(&self) -> usize {
        match self {
            Shaped::Body(items) => items.len(),
            Shaped::Count(n) => *n,
        }
    }

    pub fn into_body(self) -> Option<Vec<T>> {
        match self {
            Shaped::Body(items) => Some(items),
            Shaped::Count(_) => None,
        }
    }
}

/// Apply a projection to a computed result.
pub fn shape<T: Projectable>(mut items: Vec<T>, projection: Projection) -> Shaped<T> {
    match projection {
        Projection::Meta => Shaped::Count(items.len()),
        Projection::Detailed => Shaped::Body(items),
        Projection::Summary => {
            items.iter_mut().for_each(Projectable::summarize);
            Shaped::Body(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assay(sample: &str) -> GenericAssayData {
        GenericAssayData {
            molecular_profile_id: "treatment_ic50".to_string(),
            sample_id: sample.to_string(),
            patient_id: Some("P1".to_string()),
            study_id: Some("ccle".to_string()),
            generic_assay_stable_id: "Erlotinib".to_string(),
            value: "2.35".to_string(),
        }
    }

    #[test]
    fn test_meta_is_count_only() {
        let items: Vec<GenericAssayData> = (0..42).map(|i| assay(&format!("s{i}"))).collect();
        let shaped = shape(items, Projection::Meta);
        assert_eq!(shaped, Shaped::Count(42));
        assert_eq!(shaped.total_count(), 42);
        assert_eq!(serde_json::to_value(&shaped).unwrap(), serde_json::json!(42));
    }

    #[test]
    fn test_summary_strips_optional_fields() {
        let shaped = shape(vec![assay("s1")], Projection::Summary);
        let body = shaped.into_body().unwrap();
        assert_eq!(body[0].patient_id, None);
        assert_eq!(body[0].study_id, None);
        assert_eq!(body[0].value, "2.35");
    }

    #[test]
    fn test_detailed_is_untouched() {
        let body = shape(vec![assay("s1")], Projection::Detailed).into_body().unwrap();
        assert_eq!(body, vec![assay("s1")]);
    }
}
