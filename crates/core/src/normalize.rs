//! Resolution-independent annotation geometry.
//!
//! Annotations are drawn on a video element whose on-screen size varies per
//! device. Two coordinate systems are used to decouple stored geometry from
//! that size:
//!
//! - **Reference space**: canvas objects are rescaled into a fixed canonical
//!   frame ([`REFERENCE_WIDTH`] x [`REFERENCE_HEIGHT`] by default) before they
//!   are stored, and rescaled back to whatever size the video is displayed at.
//! - **Unit space**: shape points are stored as fractions of the current
//!   video's native width/height, so they are independent of both the display
//!   size and the reference frame.
//!
//! Scaling is purely linear. Rotation (`angle`) and intrinsic object size
//! (`width`/`height`) pass through untouched.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Canonical reference width in pixels.
pub const REFERENCE_WIDTH: f64 = 1280.0;

/// Canonical reference height in pixels.
pub const REFERENCE_HEIGHT: f64 = 720.0;

// ---------------------------------------------------------------------------
// Geometry types
// ---------------------------------------------------------------------------

/// A 2D point, in reference pixels, surface pixels or unit space depending
/// on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Ratio between a rendering size and the reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub scale_x: f64,
    pub scale_y: f64,
}

/// A single object as emitted by the drawing surface.
///
/// Only the placement fields are interpreted; every other property (object
/// type, stroke, path commands, ...) is carried through in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasObject {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    /// Intrinsic (local) width, never rescaled.
    #[serde(default)]
    pub width: f64,
    /// Intrinsic (local) height, never rescaled.
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn unit_scale() -> f64 {
    1.0
}

impl CanvasObject {
    /// An object placed at `(left, top)` with unit scale and no extra props.
    pub fn at(left: f64, top: f64) -> Self {
        Self {
            left,
            top,
            scale_x: 1.0,
            scale_y: 1.0,
            width: 0.0,
            height: 0.0,
            angle: 0.0,
            extra: serde_json::Map::new(),
        }
    }

    fn rescaled(&self, fx: f64, fy: f64) -> Self {
        Self {
            left: self.left * fx,
            top: self.top * fy,
            scale_x: self.scale_x * fx,
            scale_y: self.scale_y * fy,
            ..self.clone()
        }
    }
}

/// A full drawing-surface snapshot: its objects plus any surface-level
/// properties (background, version tag, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasState {
    #[serde(default)]
    pub objects: Vec<CanvasObject>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A canvas in reference space, stamped with the frame it was normalized
/// against and the size it was captured at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCanvas {
    #[serde(flatten)]
    pub canvas: CanvasState,
    pub reference_width: f64,
    pub reference_height: f64,
    pub original_width: f64,
    pub original_height: f64,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that both dimensions are finite and strictly positive.
pub fn validate_dimensions(width: f64, height: f64) -> Result<(), CoreError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if valid(width) && valid(height) {
        Ok(())
    } else {
        Err(CoreError::InvalidDimensions { width, height })
    }
}

// ---------------------------------------------------------------------------
// Reference space
// ---------------------------------------------------------------------------

/// The canonical frame that stored canvas geometry is expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSpace {
    width: f64,
    height: f64,
}

impl Default for ReferenceSpace {
    fn default() -> Self {
        Self {
            width: REFERENCE_WIDTH,
            height: REFERENCE_HEIGHT,
        }
    }
}

impl ReferenceSpace {
    pub fn new(width: f64, height: f64) -> Result<Self, CoreError> {
        validate_dimensions(width, height)?;
        Ok(Self { width, height })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// `width / reference_width`, `height / reference_height`.
    pub fn scale_factor(&self, width: f64, height: f64) -> ScaleFactor {
        ScaleFactor {
            scale_x: width / self.width,
            scale_y: height / self.height,
        }
    }

    /// Rescale objects captured at `source_width` x `source_height` into
    /// reference space.
    pub fn try_to_reference(
        &self,
        objects: &[CanvasObject],
        source_width: f64,
        source_height: f64,
    ) -> Result<Vec<CanvasObject>, CoreError> {
        validate_dimensions(source_width, source_height)?;
        let fx = self.width / source_width;
        let fy = self.height / source_height;
        Ok(objects.iter().map(|o| o.rescaled(fx, fy)).collect())
    }

    /// Rescale reference-space objects for display at `target_width` x
    /// `target_height`.
    pub fn try_from_reference(
        &self,
        objects: &[CanvasObject],
        target_width: f64,
        target_height: f64,
    ) -> Result<Vec<CanvasObject>, CoreError> {
        validate_dimensions(target_width, target_height)?;
        let fx = target_width / self.width;
        let fy = target_height / self.height;
        Ok(objects.iter().map(|o| o.rescaled(fx, fy)).collect())
    }

    /// Like [`try_to_reference`](Self::try_to_reference), but an unmeasured
    /// (zero or non-finite) source size logs a warning and returns the input
    /// unchanged.
    pub fn to_reference(
        &self,
        objects: &[CanvasObject],
        source_width: f64,
        source_height: f64,
    ) -> Vec<CanvasObject> {
        self.try_to_reference(objects, source_width, source_height)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Leaving canvas objects unscaled");
                objects.to_vec()
            })
    }

    /// Like [`try_from_reference`](Self::try_from_reference), degrading the
    /// same way as [`to_reference`](Self::to_reference).
    pub fn from_reference(
        &self,
        objects: &[CanvasObject],
        target_width: f64,
        target_height: f64,
    ) -> Vec<CanvasObject> {
        self.try_from_reference(objects, target_width, target_height)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Leaving canvas objects unscaled");
                objects.to_vec()
            })
    }

    /// Normalize a canvas for storage and stamp it with this reference frame
    /// and the capture size.
    ///
    /// An invalid capture size leaves the objects untouched; they are then
    /// stamped as if captured at reference size so that a later restore does
    /// not rescale them either.
    pub fn normalize_for_storage(
        &self,
        canvas: &CanvasState,
        width: f64,
        height: f64,
    ) -> NormalizedCanvas {
        let (objects, original_width, original_height) =
            match self.try_to_reference(&canvas.objects, width, height) {
                Ok(objects) => (objects, width, height),
                Err(err) => {
                    tracing::warn!(error = %err, "Storing canvas without normalization");
                    (canvas.objects.clone(), self.width, self.height)
                }
            };

        NormalizedCanvas {
            canvas: CanvasState {
                objects,
                extra: canvas.extra.clone(),
            },
            reference_width: self.width,
            reference_height: self.height,
            original_width,
            original_height,
        }
    }
}

/// Bring a stored canvas back to display size.
///
/// Uses the reference frame stamped on the stored canvas rather than the
/// currently configured one.
pub fn restore_from_storage(
    stored: &NormalizedCanvas,
    target_width: f64,
    target_height: f64,
) -> CanvasState {
    let objects = match ReferenceSpace::new(stored.reference_width, stored.reference_height) {
        Ok(reference) => reference.from_reference(&stored.canvas.objects, target_width, target_height),
        Err(err) => {
            tracing::warn!(error = %err, "Stored canvas carries an invalid reference frame");
            stored.canvas.objects.clone()
        }
    };

    CanvasState {
        objects,
        extra: stored.canvas.extra.clone(),
    }
}

// ---------------------------------------------------------------------------
// Default-reference shorthands
// ---------------------------------------------------------------------------

/// [`ReferenceSpace::to_reference`] against the default 1280x720 frame.
pub fn to_reference(objects: &[CanvasObject], source_width: f64, source_height: f64) -> Vec<CanvasObject> {
    ReferenceSpace::default().to_reference(objects, source_width, source_height)
}

/// [`ReferenceSpace::from_reference`] against the default 1280x720 frame.
pub fn from_reference(objects: &[CanvasObject], target_width: f64, target_height: f64) -> Vec<CanvasObject> {
    ReferenceSpace::default().from_reference(objects, target_width, target_height)
}

/// [`ReferenceSpace::scale_factor`] against the default 1280x720 frame.
pub fn scale_factor(width: f64, height: f64) -> ScaleFactor {
    ReferenceSpace::default().scale_factor(width, height)
}

/// [`ReferenceSpace::normalize_for_storage`] against the default frame.
pub fn normalize_for_storage(canvas: &CanvasState, width: f64, height: f64) -> NormalizedCanvas {
    ReferenceSpace::default().normalize_for_storage(canvas, width, height)
}

// ---------------------------------------------------------------------------
// Unit space
// ---------------------------------------------------------------------------

/// Express a pixel point as a fraction of the video's native size.
pub fn to_unit(point: Point, width: f64, height: f64) -> Result<Point, CoreError> {
    validate_dimensions(width, height)?;
    Ok(Point::new(point.x / width, point.y / height))
}

/// Project a unit-space point onto a video of the given native size.
pub fn from_unit(point: Point, width: f64, height: f64) -> Result<Point, CoreError> {
    validate_dimensions(width, height)?;
    Ok(Point::new(point.x * width, point.y * height))
}

pub fn points_to_unit(points: &[Point], width: f64, height: f64) -> Result<Vec<Point>, CoreError> {
    validate_dimensions(width, height)?;
    Ok(points
        .iter()
        .map(|p| Point::new(p.x / width, p.y / height))
        .collect())
}

pub fn points_from_unit(points: &[Point], width: f64, height: f64) -> Result<Vec<Point>, CoreError> {
    validate_dimensions(width, height)?;
    Ok(points
        .iter()
        .map(|p| Point::new(p.x * width, p.y * height))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
