//! K-Means clustering over observation vectors.
//!
//! Seeding is deterministic: clusters are opened greedily in input order, exact duplicates
//! of an existing seed join that seed's cluster, and points left over once every cluster
//! is open go to the nearest centroid. The reassignment loop then moves any point that is
//! closer to another centroid, updating both centroids incrementally, until a full pass
//! moves nothing.

use crate::errors::{validate_all_finite, validate_dimension, HmmError, HmmResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distance used to compare observation vectors with centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistanceMetric {
    /// L2 distance
    #[default]
    Euclidean,
    /// L1 distance
    Manhattan,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

/// Configuration for [`kmeans`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,
    /// Distance between points and centroids
    pub metric: DistanceMetric,
    /// Cap on reassignment passes
    pub max_passes: usize,
}

impl KMeansConfig {
    /// Euclidean clustering into `k` groups with the default pass cap.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            metric: DistanceMetric::Euclidean,
            max_passes: 1000,
        }
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the reassignment pass cap.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }
}

/// Outcome of [`kmeans`].
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster index of every input point
    pub labels: Vec<usize>,
    /// Point indices per cluster, in insertion order
    pub clusters: Vec<Vec<usize>>,
    /// Centroid per cluster; `None` for a cluster that never received a point
    pub centroids: Vec<Option<Vec<f64>>>,
    /// Reassignment passes run (the final, move-free pass included)
    pub passes: usize,
    /// Whether the last pass moved nothing
    pub converged: bool,
}

impl KMeansResult {
    /// Number of clusters, empty ones included.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Point indices assigned to cluster `c`.
    pub fn members(&self, c: usize) -> &[usize] {
        &self.clusters[c]
    }

    /// Centroid of cluster `c`, if it has any members.
    pub fn centroid(&self, c: usize) -> Option<&[f64]> {
        self.centroids[c].as_deref()
    }
}

/// One cluster with an incrementally maintained centroid.
#[derive(Debug, Clone)]
struct Cluster {
    members: Vec<usize>,
    sum: Vec<f64>,
    centroid: Vec<f64>,
}

impl Cluster {
    fn empty(dimension: usize) -> Self {
        Self {
            members: Vec::new(),
            sum: vec![0.0; dimension],
            centroid: vec![0.0; dimension],
        }
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn add(&mut self, index: usize, point: &[f64]) {
        self.members.push(index);
        for (s, x) in self.sum.iter_mut().zip(point) {
            *s += x;
        }
        self.update_centroid();
    }

    fn remove(&mut self, index: usize, point: &[f64]) {
        if let Some(pos) = self.members.iter().position(|&m| m == index) {
            self.members.remove(pos);
            if self.members.is_empty() {
                self.sum.iter_mut().for_each(|s| *s = 0.0);
            } else {
                for (s, x) in self.sum.iter_mut().zip(point) {
                    *s -= x;
                }
            }
            self.update_centroid();
        }
    }

    fn update_centroid(&mut self) {
        let n = self.members.len().max(1) as f64;
        for (c, s) in self.centroid.iter_mut().zip(&self.sum) {
            *c = s / n;
        }
    }
}

/// Index of the non-empty cluster whose centroid is nearest to `point`; ties go to the
/// lowest index.
fn nearest_cluster(clusters: &[Cluster], point: &[f64], metric: DistanceMetric) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, cluster) in clusters.iter().enumerate() {
        if cluster.is_empty() {
            continue;
        }
        let d = metric.distance(point, &cluster.centroid);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Partition `points` into `config.k` clusters.
///
/// Clusters are only left empty when there are fewer distinct points than clusters.
/// Reaching `config.max_passes` is not an error: the current partition is returned with
/// `converged == false`.
///
/// # Example
/// ```rust
/// use hmm_engine::kmeans::{kmeans, KMeansConfig};
///
/// let data = [[0.0], [0.1], [9.0], [9.1]];
/// let points: Vec<&[f64]> = data.iter().map(|p| &p[..]).collect();
/// let result = kmeans(&points, &KMeansConfig::new(2)).unwrap();
/// assert_eq!(result.labels, vec![0, 0, 1, 1]);
/// ```
pub fn kmeans(points: &[&[f64]], config: &KMeansConfig) -> HmmResult<KMeansResult> {
    if config.k == 0 {
        return Err(HmmError::InvalidParameter {
            parameter: "k".to_string(),
            value: 0.0,
            constraint: ">= 1".to_string(),
        });
    }
    let first = points.first().ok_or(HmmError::InsufficientData {
        required: 1,
        actual: 0,
    })?;
    let dimension = first.len();
    for p in points {
        validate_dimension(p, dimension)?;
        validate_all_finite(p, "kmeans point")?;
    }

    let n = points.len();
    let k = config.k;
    let metric = config.metric;
    let mut clusters: Vec<Cluster> = Vec::with_capacity(k);
    let mut labels = vec![0usize; n];
    let mut next = 0;

    // Seed in input order while more points remain than clusters to open.
    while next < n && clusters.len() < k && n - next > k - clusters.len() {
        let point = points[next];
        let duplicate = clusters
            .iter()
            .position(|c| metric.distance(point, &c.centroid) == 0.0);
        let target = match duplicate {
            Some(c) => c,
            None => {
                clusters.push(Cluster::empty(dimension));
                clusters.len() - 1
            }
        };
        clusters[target].add(next, point);
        labels[next] = target;
        next += 1;
    }

    // Exactly as many points as unopened clusters: one point each.
    while clusters.len() < k && next < n {
        let mut cluster = Cluster::empty(dimension);
        cluster.add(next, points[next]);
        labels[next] = clusters.len();
        clusters.push(cluster);
        next += 1;
    }

    while clusters.len() < k {
        clusters.push(Cluster::empty(dimension));
    }

    for (index, point) in points.iter().enumerate().skip(next) {
        let target = nearest_cluster(&clusters, point, metric).unwrap_or(0);
        clusters[target].add(index, point);
        labels[index] = target;
    }

    let mut passes = 0;
    let mut converged = false;
    while passes < config.max_passes {
        passes += 1;
        let mut moved = false;
        for (index, point) in points.iter().enumerate() {
            let current = labels[index];
            if metric.distance(point, &clusters[current].centroid) == 0.0 {
                continue;
            }
            if let Some(nearest) = nearest_cluster(&clusters, point, metric) {
                if nearest != current {
                    clusters[current].remove(index, point);
                    clusters[nearest].add(index, point);
                    labels[index] = nearest;
                    moved = true;
                }
            }
        }
        if !moved {
            converged = true;
            break;
        }
    }

    if converged {
        log::debug!("K-Means converged after {} passes", passes);
    } else {
        log::warn!(
            "K-Means stopped at the pass cap ({}) with points still moving",
            config.max_passes
        );
    }

    let centroids = clusters
        .iter()
        .map(|c| (!c.is_empty()).then(|| c.centroid.clone()))
        .collect();
    Ok(KMeansResult {
        labels,
        clusters: clusters.into_iter().map(|c| c.members).collect(),
        centroids,
        passes,
        converged,
    })
}
