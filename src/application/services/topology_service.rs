//! Topology Service
//!
//! Camera→zone mapping and the neighbor/travel-time graph used to
//! correlate observations across cameras.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::info;

use crate::domain::entities::Camera;

/// A configured camera-pair edge with its travel time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyEntry {
    pub from: i64,
    pub to: i64,
    pub travel_seconds: u32,
}

/// Topology configuration.
#[derive(Debug, Clone, Default)]
pub struct TopologyConfig {
    /// When set, all cameras sharing a zone are mutual neighbors.
    pub same_zone_is_neighbor: bool,
    /// Configured edges, merged (set union) with same-zone edges.
    pub adjacency: Vec<AdjacencyEntry>,
}

#[derive(Default)]
struct TopologySnapshot {
    camera_zone: HashMap<i64, i64>,
    neighbors: HashMap<i64, HashSet<i64>>,
    travel: HashMap<(i64, i64), u32>,
}

/// Holds the current topology snapshot; readers never block on reload.
pub struct TopologyService {
    config: TopologyConfig,
    inner: RwLock<TopologySnapshot>,
}

impl TopologyService {
    /// Creates an empty topology.
    pub fn new(config: TopologyConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(TopologySnapshot::default()),
        }
    }

    /// Atomically replaces the topology snapshot from the camera registry.
    ///
    /// Neighbor edges are undirected; travel weights keep their configured
    /// direction.
    pub fn load_from_cameras(&self, cameras: &[Camera]) {
        let mut snapshot = TopologySnapshot::default();

        for camera in cameras {
            if let Some(zone_id) = camera.zone_id() {
                snapshot.camera_zone.insert(camera.id(), zone_id);
            }
        }

        if self.config.same_zone_is_neighbor {
            let mut by_zone: HashMap<i64, Vec<i64>> = HashMap::new();
            for (camera_id, zone_id) in &snapshot.camera_zone {
                by_zone.entry(*zone_id).or_default().push(*camera_id);
            }
            for members in by_zone.values() {
                for a in members {
                    for b in members {
                        if a != b {
                            snapshot.neighbors.entry(*a).or_default().insert(*b);
                        }
                    }
                }
            }
        }

        for entry in &self.config.adjacency {
            snapshot
                .neighbors
                .entry(entry.from)
                .or_default()
                .insert(entry.to);
            snapshot
                .neighbors
                .entry(entry.to)
                .or_default()
                .insert(entry.from);
            snapshot
                .travel
                .insert((entry.from, entry.to), entry.travel_seconds);
        }

        let camera_count = snapshot.camera_zone.len();
        if let Ok(mut inner) = self.inner.write() {
            *inner = snapshot;
        }
        info!(camera_count, "Topology snapshot reloaded");
    }

    /// Zone of a camera, if mapped.
    pub fn zone_of(&self, camera_id: i64) -> Option<i64> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.camera_zone.get(&camera_id).copied())
    }

    /// Neighboring cameras, sorted for deterministic iteration.
    pub fn neighbors(&self, camera_id: i64) -> Vec<i64> {
        let mut neighbors: Vec<i64> = self
            .inner
            .read()
            .ok()
            .and_then(|inner| inner.neighbors.get(&camera_id).map(|s| s.iter().copied().collect()))
            .unwrap_or_default();
        neighbors.sort_unstable();
        neighbors
    }

    /// Whether two cameras are neighbors.
    pub fn are_neighbors(&self, a: i64, b: i64) -> bool {
        self.inner
            .read()
            .ok()
            .map(|inner| inner.neighbors.get(&a).is_some_and(|s| s.contains(&b)))
            .unwrap_or(false)
    }

    /// Configured travel time between two cameras, if any.
    pub fn travel_seconds(&self, from: i64, to: i64) -> Option<u32> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.travel.get(&(from, to)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_in_zone(id: i64, zone_id: Option<i64>) -> Camera {
        let mut camera = Camera::new(id, format!("cam-{}", id), "rtsp://test".to_string());
        camera.set_zone(zone_id);
        camera
    }

    #[test]
    fn same_zone_cameras_become_mutual_neighbors() {
        let service = TopologyService::new(TopologyConfig {
            same_zone_is_neighbor: true,
            adjacency: vec![],
        });
        service.load_from_cameras(&[
            camera_in_zone(1, Some(10)),
            camera_in_zone(2, Some(10)),
            camera_in_zone(3, Some(20)),
        ]);

        assert_eq!(service.neighbors(1), vec![2]);
        assert!(service.are_neighbors(2, 1));
        assert!(!service.are_neighbors(1, 3));
    }

    #[test]
    fn same_zone_flag_off_yields_no_zone_edges() {
        let service = TopologyService::new(TopologyConfig {
            same_zone_is_neighbor: false,
            adjacency: vec![],
        });
        service.load_from_cameras(&[camera_in_zone(1, Some(10)), camera_in_zone(2, Some(10))]);
        assert!(service.neighbors(1).is_empty());
    }

    #[test]
    fn configured_adjacency_merges_with_zone_edges() {
        let service = TopologyService::new(TopologyConfig {
            same_zone_is_neighbor: true,
            adjacency: vec![AdjacencyEntry {
                from: 1,
                to: 3,
                travel_seconds: 45,
            }],
        });
        service.load_from_cameras(&[
            camera_in_zone(1, Some(10)),
            camera_in_zone(2, Some(10)),
            camera_in_zone(3, Some(20)),
        ]);

        assert_eq!(service.neighbors(1), vec![2, 3]);
        assert!(service.are_neighbors(3, 1));
    }

    #[test]
    fn travel_seconds_returns_configured_weight_or_none() {
        let service = TopologyService::new(TopologyConfig {
            same_zone_is_neighbor: false,
            adjacency: vec![AdjacencyEntry {
                from: 1,
                to: 2,
                travel_seconds: 30,
            }],
        });
        service.load_from_cameras(&[]);

        assert_eq!(service.travel_seconds(1, 2), Some(30));
        assert_eq!(service.travel_seconds(2, 3), None);
    }

    #[test]
    fn reload_replaces_the_previous_snapshot() {
        let service = TopologyService::new(TopologyConfig {
            same_zone_is_neighbor: true,
            adjacency: vec![],
        });
        service.load_from_cameras(&[camera_in_zone(1, Some(10)), camera_in_zone(2, Some(10))]);
        assert_eq!(service.zone_of(1), Some(10));

        service.load_from_cameras(&[camera_in_zone(1, Some(99))]);
        assert_eq!(service.zone_of(1), Some(99));
        assert!(service.neighbors(1).is_empty());
        assert_eq!(service.zone_of(2), None);
    }
}
