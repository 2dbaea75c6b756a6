//! Association statistics over 2×2 contingency tables.
//!
//! The significance estimate is the two-sided Fisher exact test: the sum of
//! hypergeometric probabilities of every table with the same margins that is
//! no more likely than the observed one. Odds ratios use the Haldane–Anscombe
//! correction (+0.5 per cell) whenever a cell is zero.

use statrs::distribution::{Discrete, Hypergeometric};

use cohortyx_common::entities::ContingencyTable;
use cohortyx_common::error::{CohortyxError, Result};

/// Relative tolerance when comparing table probabilities against the observed one.
const RELATIVE_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Association {
    pub odds_ratio: f64,
    pub log2_odds_ratio: f64,
    pub p_value: f64,
}

/// Odds ratio and two-sided Fisher p-value for a table.
pub fn associate(table: &ContingencyTable) -> Result<Association> {
    let odds_ratio = odds_ratio(table);
    Ok(Association {
        odds_ratio,
        log2_odds_ratio: odds_ratio.log2(),
        p_value: fisher_exact_two_sided(table)?,
    })
}

pub fn odds_ratio(table: &ContingencyTable) -> f64 {
    let cells = [
        table.altered_in_group,
        table.unaltered_in_group,
        table.altered_in_reference,
        table.unaltered_in_reference,
    ];
    let shift = if cells.contains(&0) { 0.5 } else { 0.0 };
    let [a, b, c, d] = cells.map(|n| n as f64 + shift);
    (a * d) / (b * c)
}

pub fn fisher_exact_two_sided(table: &ContingencyTable) -> Result<f64> {
    let population = table.total();
    if population == 0 {
        return Ok(1.0);
    }
    let successes = table.altered_total();
    let draws = table.group_total();

    let hyper = Hypergeometric::new(population, successes, draws)
        .map_err(|e| CohortyxError::Statistics(e.to_string()))?;

    // support of the altered-in-group cell given fixed margins
    let low = (successes + draws).saturating_sub(population);
    let high = successes.min(draws);

    // log space: linear pmf overflows once the population reaches a few hundred
    let observed = hyper.ln_pmf(table.altered_in_group);
    let threshold = observed + RELATIVE_TOLERANCE.ln_1p();

    let p: f64 = (low..=high)
        .map(|x| hyper.ln_pmf(x))
        .filter(|&ln_p| ln_p <= threshold)
        .map(f64::exp)
        .sum();

    Ok(p.min(1.0))
}

/// Benjamini–Hochberg adjusted p-values, returned in input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&i, &j| {
        p_values[i]
            .partial_cmp(&p_values[j])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(i.cmp(&j))
    });

    let mut adjusted = vec![0.0f64; m];
    let mut running_min = 1.0f64;
    for (rank_idx, &i) in order.iter().enumerate().rev() {
        let rank = (rank_idx + 1) as f64;
        let q = (p_values[i] * m as f64 / rank).min(1.0);
        running_min = running_min.min(q);
        adjusted[i] = running_min;
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(a: u64, b: u64, c: u64, d: u64) -> ContingencyTable {
        ContingencyTable {
            altered_in_group: a,
            unaltered_in_group: b,
            altered_in_reference: c,
            unaltered_in_reference: d,
        }
    }

    #[test]
    fn test_fisher_tea_tasting() {
        // Fisher's lady tasting tea: two-sided p = 34/70
        let p = fisher_exact_two_sided(&table(3, 1, 1, 3)).unwrap();
        assert!((p - 34.0 / 70.0).abs() < 1e-9, "got {p}");
    }

    #[test]
    fn test_fisher_perfect_separation() {
        // only the two extreme tables: 2 / C(20, 10)
        let p = fisher_exact_two_sided(&table(10, 0, 0, 10)).unwrap();
        assert!((p - 2.0 / 184_756.0).abs() < 1e-12, "got {p}");
    }

    #[test]
    fn test_fisher_uninformative_table() {
        let p = fisher_exact_two_sided(&table(1, 2, 1, 1)).unwrap();
        assert!((p - 1.0).abs() < 1e-9);
        assert_eq!(fisher_exact_two_sided(&table(0, 0, 0, 0)).unwrap(), 1.0);
    }

    #[test]
    fn test_fisher_is_symmetric_in_groups() {
        let p1 = fisher_exact_two_sided(&table(7, 3, 2, 8)).unwrap();
        let p2 = fisher_exact_two_sided(&table(2, 8, 7, 3)).unwrap();
        assert!((p1 - p2).abs() < 1e-12);
        assert!(p1 > 0.0 && p1 < 0.1);
    }

    #[test]
    fn test_fisher_equal_frequencies_in_large_groups() {
        let p = fisher_exact_two_sided(&table(500, 500, 500, 500)).unwrap();
        assert!((p - 1.0).abs() < 1e-9, "got {p}");
    }

    #[test]
    fn test_fisher_cohort_sized_tables() {
        // 50/600 vs 40/600
        let p = fisher_exact_two_sided(&table(50, 550, 40, 560)).unwrap();
        assert!((p - 0.323_956_608_6).abs() < 1e-6, "got {p}");

        // 120/500 vs 60/500
        let p = fisher_exact_two_sided(&table(120, 380, 60, 440)).unwrap();
        assert!(p > 0.0, "got {p}");
        assert!((p / 9.968_469e-7 - 1.0).abs() < 1e-4, "got {p}");
    }

    #[test]
    fn test_odds_ratio() {
        assert!((odds_ratio(&table(3, 1, 1, 3)) - 9.0).abs() < 1e-12);
        // zero cell → +0.5 everywhere: (1.5 * 2.5) / (2.5 * 0.5)
        assert!((odds_ratio(&table(1, 2, 0, 2)) - 3.0).abs() < 1e-12);
        let assoc = associate(&table(3, 1, 1, 3)).unwrap();
        assert!((assoc.log2_odds_ratio - 9f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_benjamini_hochberg() {
        let q = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.2]);
        // sorted: 0.01(1) 0.03(2) 0.04(3) 0.2(4); m = 4
        assert!((q[0] - 0.04).abs() < 1e-12);
        assert!((q[2] - 0.0533333333).abs() < 1e-9);
        assert!((q[1] - 0.0533333333).abs() < 1e-9);
        assert!((q[3] - 0.2).abs() < 1e-12);
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
