use serde::{Deserialize, Serialize};

use crate::core::types::{Encoding, MatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cosine similarity`
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

/// Compares a live encoding against reference encodings.
pub trait Matcher {
    fn compare(&self, encoding: &[f32], references: &[Encoding]) -> MatchOutcome;
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateMatcher {
    threshold: f32,
    metric: DistanceMetric,
}

impl TemplateMatcher {
    pub fn new(threshold: f32, metric: DistanceMetric) -> Self {
        Self { threshold, metric }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Matcher for TemplateMatcher {
    fn compare(&self, encoding: &[f32], references: &[Encoding]) -> MatchOutcome {
        let distance = references
            .iter()
            .map(|reference| self.metric.distance(encoding, reference))
            .fold(f32::INFINITY, f32::min);

        MatchOutcome {
            matched: distance < self.threshold,
            distance,
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_distance_over_references() {
        let matcher = TemplateMatcher::new(0.55, DistanceMetric::Euclidean);
        let references = vec![vec![1.0, 0.0], vec![0.0, 0.3]];
        let outcome = matcher.compare(&[0.0, 0.0], &references);
        assert!((outcome.distance - 0.3).abs() < 1e-6);
        assert!(outcome.matched);
    }

    #[test]
    fn test_threshold_is_strict() {
        let matcher = TemplateMatcher::new(0.5, DistanceMetric::Euclidean);
        let outcome = matcher.compare(&[0.0], &[vec![0.5]]);
        assert!(!outcome.matched);
    }

    #[test]
    fn test_empty_references_never_match() {
        let matcher = TemplateMatcher::new(0.99, DistanceMetric::Cosine);
        let outcome = matcher.compare(&[1.0, 2.0], &[]);
        assert!(!outcome.matched);
        assert!(outcome.distance.is_infinite());
    }

    #[test]
    fn test_cosine_distance() {
        assert!((DistanceMetric::Cosine.distance(&[1.0, 0.0], &[2.0, 0.0])).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_are_infinitely_far() {
        assert!(euclidean_distance(&[1.0], &[1.0, 2.0]).is_infinite());
    }
}
