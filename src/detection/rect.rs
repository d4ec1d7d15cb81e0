/// Axis-aligned box in normalized image space.
///
/// Stored as TLBR (`x_min`, `y_min`, `x_max`, `y_max`), which is the form the
/// overlay consumes. Helpers convert from the center/size form produced by the
/// box decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Rect {
    /// Create a Rect from TLBR coordinates.
    #[inline]
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Create a Rect from center coordinates and dimensions (XYWH format).
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x_min: cx - width / 2.0,
            y_min: cy - height / 2.0,
            x_max: cx + width / 2.0,
            y_max: cy + height / 2.0,
        }
    }

    /// Convert to TLBR array: (x_min, y_min, x_max, y_max).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Get the area of the bounding box. Inverted boxes have zero area.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Clamp every coordinate into `[0, 1]`.
    #[inline]
    pub fn clip(&self) -> Self {
        Self {
            x_min: self.x_min.clamp(0.0, 1.0),
            y_min: self.y_min.clamp(0.0, 1.0),
            x_max: self.x_max.clamp(0.0, 1.0),
            y_max: self.y_max.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.to_tlbr().iter().all(|v| v.is_finite())
    }

    /// Finite, correctly ordered and with a non-zero area.
    #[inline]
    pub fn is_renderable(&self) -> bool {
        self.is_finite() && self.x_min < self.x_max && self.y_min < self.y_max
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);

        let inter_width = (x2 - x1).max(0.0);
        let inter_height = (y2 - y1).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}
