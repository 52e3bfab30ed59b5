//! Hard assignment of corpus observations to hidden states.
//!
//! Observations are keyed by [`ObservationId`], never by value, so repeated observation
//! vectors at different positions are tracked independently.

use crate::{
    errors::{HmmError, HmmResult},
    kmeans::{kmeans, KMeansConfig},
    observation::{ObservationId, SequenceCorpus},
};

/// Forward map (observation -> state) plus the reverse grouping (state -> observations).
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    members: Vec<Vec<ObservationId>>,
}

impl ClusterAssignment {
    /// Build an assignment from one label per observation id.
    pub fn from_labels(labels: Vec<usize>, cluster_count: usize) -> HmmResult<Self> {
        let mut members = vec![Vec::new(); cluster_count];
        for (id, &label) in labels.iter().enumerate() {
            let bucket = members.get_mut(label).ok_or(HmmError::InvalidState {
                state: label,
                state_count: cluster_count,
            })?;
            bucket.push(id);
        }
        Ok(Self { labels, members })
    }

    /// Cluster every observation of `corpus` into `config.k` groups.
    pub fn from_kmeans(corpus: &SequenceCorpus, config: &KMeansConfig) -> HmmResult<Self> {
        let points: Vec<&[f64]> = corpus.observations().iter().map(Vec::as_slice).collect();
        let result = kmeans(&points, config)?;
        Ok(Self {
            labels: result.labels,
            members: result.clusters,
        })
    }

    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.members.len()
    }

    /// Cluster of observation `id`.
    ///
    /// # Panics
    /// Panics if `id` is not an observation of the clustered corpus.
    pub fn cluster_of(&self, id: ObservationId) -> usize {
        self.labels[id]
    }

    /// Observations currently in cluster `cluster`.
    pub fn members(&self, cluster: usize) -> &[ObservationId] {
        &self.members[cluster]
    }

    /// Whether cluster `cluster` has no members.
    pub fn is_empty(&self, cluster: usize) -> bool {
        self.members[cluster].is_empty()
    }

    /// Label of every observation, indexed by id.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Assign `id` to `cluster`, taking it out of the cluster it was in.
    pub fn put(&mut self, id: ObservationId, cluster: usize) {
        let current = self.labels[id];
        if current == cluster && self.members[cluster].contains(&id) {
            return;
        }
        self.remove(id, current);
        self.members[cluster].push(id);
        self.labels[id] = cluster;
    }

    fn remove(&mut self, id: ObservationId, cluster: usize) {
        if let Some(pos) = self.members[cluster].iter().position(|&m| m == id) {
            self.members[cluster].remove(pos);
        }
    }

    /// Move `id` to `cluster`. Returns whether its cluster changed.
    pub fn migrate(&mut self, id: ObservationId, cluster: usize) -> bool {
        if self.labels[id] == cluster {
            return false;
        }
        self.put(id, cluster);
        true
    }
}
