//! Maps each cycle's ranked detections onto a fixed pool of marker slots.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::OverlayConfig;
use crate::detection::{Detection, Rect};
use crate::overlay::host::{CameraPose, MarkerEntity, MarkerFactory};
use crate::overlay::matching;
use crate::overlay::placement::Placement;
use crate::overlay::slot::Slot;

/// How qualifying detections are distributed over slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotAssignment {
    /// The k-th ranked detection goes to slot k.
    ///
    /// No tracking between frames: when two nearly tied detections swap rank,
    /// their markers swap slots too. This is a known limitation.
    #[default]
    Positional,
    /// Detections overlapping a box shown last cycle keep that slot; the rest
    /// fill the lowest free slots in rank order.
    IouMatched,
}

/// Slot pool settings.
#[derive(Debug, Clone)]
pub struct SlotManagerConfig {
    pub capacity: usize,
    pub confidence_threshold: f32,
    pub display_depth: f32,
    pub plane_extent: f32,
    pub assignment: SlotAssignment,
    pub match_threshold: f32,
}

impl Default for SlotManagerConfig {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for SlotManagerConfig {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            capacity: config.max_observations,
            confidence_threshold: config.confidence_threshold,
            display_depth: config.display_depth,
            plane_extent: config.plane_extent,
            assignment: config.slot_assignment,
            match_threshold: config.match_threshold,
        }
    }
}

/// Outcome of one [`SlotManager::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotReport {
    pub shown: usize,
    pub hidden: usize,
    /// Qualifying detections that did not fit in the pool
    pub dropped: usize,
}

/// Fixed-capacity arena of marker slots, addressed by index.
pub struct SlotManager<F: MarkerFactory> {
    factory: F,
    slots: Vec<Slot<F::Entity>>,
    config: SlotManagerConfig,
}

impl<F: MarkerFactory> SlotManager<F> {
    pub fn new(factory: F, config: SlotManagerConfig) -> Self {
        let slots = (0..config.capacity).map(Slot::new).collect();
        Self {
            factory,
            slots,
            config,
        }
    }

    pub fn from_config(factory: F, config: &OverlayConfig) -> Self {
        Self::new(factory, SlotManagerConfig::from(config))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&Slot<F::Entity>> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[Slot<F::Entity>] {
        &self.slots
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Bind one cycle's detections, which must already be in rank order.
    ///
    /// Detections below the confidence threshold are skipped. Slots without a
    /// detection this cycle are hidden; their entities stay for reuse.
    pub fn apply(&mut self, detections: &[Detection]) -> SlotReport {
        let capacity = self.slots.len();
        let qualifying: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .collect();
        let dropped = qualifying.len().saturating_sub(capacity);
        let bound = &qualifying[..qualifying.len().min(capacity)];

        let assignment: Vec<Option<usize>> = match self.config.assignment {
            SlotAssignment::Positional => (0..capacity)
                .map(|k| (k < bound.len()).then_some(k))
                .collect(),
            SlotAssignment::IouMatched => self.match_previous(bound),
        };

        for (index, choice) in assignment.iter().enumerate() {
            if let Some(rank) = *choice {
                self.bind(index, bound[rank]);
            }
        }

        let mut report = SlotReport {
            dropped,
            ..SlotReport::default()
        };
        for (slot, choice) in self.slots.iter_mut().zip(&assignment) {
            let visible = choice.is_some();
            if !visible {
                slot.mark_hidden();
            }
            if let Some(entity) = slot.entity_mut() {
                entity.set_visible(visible);
                if visible {
                    report.shown += 1;
                } else {
                    report.hidden += 1;
                }
            }
        }

        debug!(
            shown = report.shown,
            hidden = report.hidden,
            dropped = report.dropped,
            "slots updated"
        );
        report
    }

    /// Place every created marker in front of the camera, facing along its
    /// view direction. Call once per render tick.
    pub fn follow_camera(&mut self, pose: &CameraPose) {
        let anchor = pose.point_ahead(self.config.display_depth);
        for slot in &mut self.slots {
            if let Some(entity) = slot.entity_mut() {
                entity.set_transform(anchor, pose.rotation);
            }
        }
    }

    fn bind(&mut self, index: usize, detection: &Detection) {
        let placement = Placement::from_bbox(
            &detection.bbox,
            self.config.display_depth,
            self.config.plane_extent,
        );
        let name = detection.display_name();
        trace!(
            slot = index,
            name,
            confidence = detection.confidence,
            x = placement.position.x,
            y = placement.position.y,
            width = placement.width,
            height = placement.height,
            "bind"
        );

        let factory = &mut self.factory;
        let slot = &mut self.slots[index];
        let entity = slot.entity_or_insert_with(|| factory.instantiate(index));
        entity.set_geometry(placement.position, placement.width, placement.height);
        entity.set_label(placement.position, name);
        slot.mark_shown(placement, detection.bbox, name);
    }

    /// Slot index to rank index, keeping slots whose previous box matches.
    fn match_previous(&self, bound: &[&Detection]) -> Vec<Option<usize>> {
        let capacity = self.slots.len();
        let previous: Vec<(usize, Rect)> = self
            .slots
            .iter()
            .filter_map(|s| s.bbox().map(|b| (s.index(), b)))
            .collect();
        let previous_rects: Vec<Rect> = previous.iter().map(|(_, r)| *r).collect();
        let current_rects: Vec<Rect> = bound.iter().map(|d| d.bbox).collect();

        let cost = matching::iou_distance(&previous_rects, &current_rects);
        let result = matching::linear_assignment(&cost, self.config.match_threshold);

        let mut assignment = vec![None; capacity];
        for (prev, rank) in result.matches {
            assignment[previous[prev].0] = Some(rank);
        }
        let free: Vec<usize> = (0..capacity).filter(|&i| assignment[i].is_none()).collect();
        for (slot, rank) in free.into_iter().zip(result.unmatched_current) {
            assignment[slot] = Some(rank);
        }
        assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionBuilder;
    use crate::overlay::slot::SlotState;
    use nalgebra::{Point3, UnitQuaternion, Vector3};

    #[derive(Debug, Default)]
    struct MockMarker {
        visible: bool,
        geometry: Option<(Vector3<f32>, f32, f32)>,
        label: Option<String>,
        transform: Option<Point3<f32>>,
    }

    impl MarkerEntity for MockMarker {
        fn set_geometry(&mut self, position: Vector3<f32>, width: f32, height: f32) {
            self.geometry = Some((position, width, height));
        }

        fn set_label(&mut self, _position: Vector3<f32>, text: &str) {
            self.label = Some(text.to_string());
        }

        fn set_visible(&mut self, visible: bool) {
            self.visible = visible;
        }

        fn set_transform(&mut self, position: Point3<f32>, _rotation: UnitQuaternion<f32>) {
            self.transform = Some(position);
        }
    }

    #[derive(Default)]
    struct MockFactory {
        created: Vec<usize>,
    }

    impl MarkerFactory for MockFactory {
        type Entity = MockMarker;

        fn instantiate(&mut self, slot: usize) -> MockMarker {
            self.created.push(slot);
            MockMarker::default()
        }
    }

    fn det(name: &str, confidence: f32, x: f32) -> Detection {
        DetectionBuilder::new()
            .class(name, 1)
            .tlbr(x, 0.1, x + 0.1, 0.3)
            .confidence(confidence)
            .build()
    }

    fn manager(capacity: usize, assignment: SlotAssignment) -> SlotManager<MockFactory> {
        SlotManager::new(
            MockFactory::default(),
            SlotManagerConfig {
                capacity,
                assignment,
                ..SlotManagerConfig::default()
            },
        )
    }

    #[test]
    fn test_positional_binding_and_hiding() {
        let mut slots = manager(4, SlotAssignment::Positional);
        let report = slots.apply(&[det("cup, mug", 0.9, 0.1), det("dog", 0.8, 0.5)]);
        assert_eq!(report, SlotReport { shown: 2, hidden: 0, dropped: 0 });
        assert_eq!(slots.slot(0).unwrap().last_label(), Some("cup"));
        assert_eq!(slots.slot(1).unwrap().last_label(), Some("dog"));
        assert_eq!(slots.slot(2).unwrap().state(), SlotState::Vacant);

        let report = slots.apply(&[det("dog", 0.8, 0.5)]);
        assert_eq!(report, SlotReport { shown: 1, hidden: 1, dropped: 0 });
        assert_eq!(slots.slot(0).unwrap().last_label(), Some("dog"));
        assert_eq!(slots.slot(1).unwrap().state(), SlotState::Hidden);
        assert!(!slots.slot(1).unwrap().entity().unwrap().visible);
    }

    #[test]
    fn test_entities_are_reused() {
        let mut slots = manager(3, SlotAssignment::Positional);
        slots.apply(&[det("a", 0.9, 0.1), det("b", 0.8, 0.5)]);
        slots.apply(&[]);
        slots.apply(&[det("c", 0.9, 0.2), det("d", 0.8, 0.6)]);
        assert_eq!(slots.factory().created, vec![0, 1]);
        assert!(slots.slot(1).unwrap().entity().unwrap().visible);
    }

    #[test]
    fn test_threshold_boundary() {
        let mut slots = manager(4, SlotAssignment::Positional);
        let report = slots.apply(&[det("at", 0.65, 0.1), det("below", 0.649, 0.5)]);
        assert_eq!(report.shown, 1);
        assert_eq!(slots.slot(0).unwrap().last_label(), Some("at"));
    }

    #[test]
    fn test_capacity_drops_lowest_ranked() {
        let mut slots = manager(10, SlotAssignment::Positional);
        let detections: Vec<Detection> = (0..15)
            .map(|i| det(&format!("d{i}"), 0.99 - i as f32 * 0.01, i as f32 * 0.05))
            .collect();
        let report = slots.apply(&detections);
        assert_eq!(report.dropped, 5);
        assert_eq!(slots.occupied(), 10);
        assert_eq!(slots.slot(9).unwrap().last_label(), Some("d9"));
    }

    #[test]
    fn test_identical_cycles_are_stable() {
        let mut slots = manager(4, SlotAssignment::Positional);
        let detections = [det("a", 0.9, 0.1), det("b", 0.8, 0.5)];
        slots.apply(&detections);
        let first: Vec<_> = slots.slots().iter().map(|s| s.last_placement()).collect();
        slots.apply(&detections);
        let second: Vec<_> = slots.slots().iter().map(|s| s.last_placement()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_iou_matched_keeps_identity_on_rank_flip() {
        let mut slots = manager(4, SlotAssignment::IouMatched);
        slots.apply(&[det("a", 0.81, 0.1), det("b", 0.80, 0.5)]);
        slots.apply(&[det("b", 0.81, 0.5), det("a", 0.80, 0.1)]);
        assert_eq!(slots.slot(0).unwrap().last_label(), Some("a"));
        assert_eq!(slots.slot(1).unwrap().last_label(), Some("b"));

        // A new object takes the lowest free slot.
        slots.apply(&[det("c", 0.95, 0.8), det("b", 0.81, 0.5)]);
        assert_eq!(slots.slot(0).unwrap().last_label(), Some("c"));
        assert_eq!(slots.slot(1).unwrap().last_label(), Some("b"));
    }

    #[test]
    fn test_follow_camera_moves_created_markers() {
        let mut slots = manager(3, SlotAssignment::Positional);
        slots.apply(&[det("a", 0.9, 0.1)]);
        let pose = CameraPose::new(Point3::new(0.0, 1.0, 0.0), UnitQuaternion::identity());
        slots.follow_camera(&pose);
        let marker = slots.slot(0).unwrap().entity().unwrap();
        assert_eq!(marker.transform, Some(Point3::new(0.0, 1.0, 1.0)));
        assert!(slots.slot(1).unwrap().entity().is_none());
    }

    #[test]
    fn test_geometry_sent_to_marker() {
        let mut slots = manager(1, SlotAssignment::Positional);
        slots.apply(&[det("a", 0.9, 0.1)]);
        let (position, width, height) = slots.slot(0).unwrap().entity().unwrap().geometry.unwrap();
        // Box (0.1, 0.1)-(0.2, 0.3): center (-0.35, 0.3), size 0.1 x 0.2.
        assert!((position.x + 0.35).abs() < 1e-6);
        assert!((position.y - 0.3).abs() < 1e-6);
        assert!((width - 0.01).abs() < 1e-6);
        assert!((height - 0.02).abs() < 1e-6);
    }
}
