//! # Training Configuration
//!
//! This module contains the configuration shared by the HMM trainers: iteration caps,
//! convergence and normalization tolerances, and the K-Means settings used to seed the
//! initial clustering.

use crate::kmeans::{DistanceMetric, KMeansConfig};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for HMM training
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainingConfig {
    /// Cap on trainer iterations before reporting non-convergence
    pub max_iterations: usize,
    /// Baum-Welch stops once the log-likelihood improves by less than this
    pub convergence_tolerance: f64,
    /// Tolerance on π and transition row sums when committing a new model
    pub normalization_tolerance: f64,
    /// Metric for the initial K-Means clustering
    pub distance_metric: DistanceMetric,
    /// Cap on K-Means reassignment passes
    pub kmeans_max_passes: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl TrainingConfig {
    /// Quick configuration: few iterations, loose tolerance
    pub fn quick() -> Self {
        Self {
            max_iterations: 20,
            convergence_tolerance: 1e-4,
            normalization_tolerance: 1e-9,
            distance_metric: DistanceMetric::Euclidean,
            kmeans_max_passes: 100,
        }
    }

    /// Standard configuration (default)
    pub fn standard() -> Self {
        Self {
            max_iterations: 100,
            convergence_tolerance: 1e-6,
            normalization_tolerance: 1e-9,
            distance_metric: DistanceMetric::Euclidean,
            kmeans_max_passes: 1000,
        }
    }

    /// Exhaustive configuration: many iterations, tight tolerance
    pub fn exhaustive() -> Self {
        Self {
            max_iterations: 1000,
            convergence_tolerance: 1e-9,
            normalization_tolerance: 1e-9,
            distance_metric: DistanceMetric::Euclidean,
            kmeans_max_passes: 10_000,
        }
    }

    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the log-likelihood convergence tolerance
    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    /// Set the normalization tolerance used by the commit check
    pub fn with_normalization_tolerance(mut self, tolerance: f64) -> Self {
        self.normalization_tolerance = tolerance;
        self
    }

    /// Set the K-Means distance metric
    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Set the K-Means pass cap
    pub fn with_kmeans_max_passes(mut self, max_passes: usize) -> Self {
        self.kmeans_max_passes = max_passes;
        self
    }

    /// K-Means settings for clustering into `k` groups
    pub fn kmeans_config(&self, k: usize) -> KMeansConfig {
        KMeansConfig::new(k)
            .with_metric(self.distance_metric)
            .with_max_passes(self.kmeans_max_passes)
    }
}
