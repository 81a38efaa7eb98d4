//! Evaluation metrics and importance ranking.

use serde::{Deserialize, Serialize};

/// Fraction of exact matches. Empty input scores 0.
#[must_use]
pub fn accuracy(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    hits as f64 / truth.len() as f64
}

/// Area under the ROC curve from positive-class scores, via the rank-sum
/// statistic with tied ranks averaged.
///
/// `None` unless both classes occur in `truth`.
#[must_use]
pub fn roc_auc(truth: &[usize], scores: &[f64]) -> Option<f64> {
    let n_pos = truth.iter().filter(|&&t| t == 1).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != truth.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|&(&t, _)| t == 1)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[must_use]
pub fn mean_squared_error(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / truth.len() as f64
}

/// Coefficient of determination. A constant target scores 1.0 on a perfect
/// fit and 0.0 otherwise.
#[must_use]
pub fn r2_score(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let ss_res: f64 = truth.iter().zip(predicted).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Pair importances with feature names, most important first (stable on
/// ties).
#[must_use]
pub fn rank_importances(names: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}
