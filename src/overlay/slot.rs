use crate::detection::Rect;
use crate::overlay::placement::Placement;

/// Slot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// No entity created yet
    #[default]
    Vacant,
    /// Bound to a detection this cycle and visible
    Shown,
    /// Entity exists but is hidden, waiting for reuse
    Hidden,
}

/// One fixed-index display unit.
#[derive(Debug)]
pub struct Slot<E> {
    index: usize,
    state: SlotState,
    entity: Option<E>,
    last_placement: Option<Placement>,
    last_bbox: Option<Rect>,
    last_label: Option<String>,
}

impl<E> Slot<E> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: SlotState::Vacant,
            entity: None,
            last_placement: None,
            last_bbox: None,
            last_label: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_occupied(&self) -> bool {
        self.state == SlotState::Shown
    }

    pub fn entity(&self) -> Option<&E> {
        self.entity.as_ref()
    }

    /// Geometry of the most recent binding, kept while hidden.
    pub fn last_placement(&self) -> Option<Placement> {
        self.last_placement
    }

    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    /// Box currently shown by this slot.
    pub fn bbox(&self) -> Option<Rect> {
        if self.is_occupied() { self.last_bbox } else { None }
    }

    pub(crate) fn entity_mut(&mut self) -> Option<&mut E> {
        self.entity.as_mut()
    }

    pub(crate) fn entity_or_insert_with(&mut self, create: impl FnOnce() -> E) -> &mut E {
        self.entity.get_or_insert_with(create)
    }

    pub(crate) fn mark_shown(&mut self, placement: Placement, bbox: Rect, label: &str) {
        self.state = SlotState::Shown;
        self.last_placement = Some(placement);
        self.last_bbox = Some(bbox);
        self.last_label = Some(label.to_string());
    }

    pub(crate) fn mark_hidden(&mut self) {
        if self.entity.is_some() {
            self.state = SlotState::Hidden;
        }
    }
}
