//! Seams to the rendering host and the device pose.

use nalgebra::{Point3, UnitQuaternion, Vector3};

/// A marker in the host scene: a rectangle with a text label.
///
/// Positions passed to `set_geometry` and `set_label` are local to the
/// marker's own transform, which `set_transform` places in the world.
pub trait MarkerEntity {
    fn set_geometry(&mut self, position: Vector3<f32>, width: f32, height: f32);

    fn set_label(&mut self, position: Vector3<f32>, text: &str);

    fn set_visible(&mut self, visible: bool);

    fn set_transform(&mut self, position: Point3<f32>, rotation: UnitQuaternion<f32>);
}

/// Creates marker entities on first use of a slot.
pub trait MarkerFactory {
    type Entity: MarkerEntity;

    fn instantiate(&mut self, slot: usize) -> Self::Entity;
}

/// Camera pose reported by the tracking subsystem.
///
/// The host convention is a camera looking down its local +Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl CameraPose {
    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    /// Point `distance` units straight ahead of the camera.
    pub fn point_ahead(&self, distance: f32) -> Point3<f32> {
        self.position + self.forward() * distance
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }
}
