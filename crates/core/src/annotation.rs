//! Drawn shapes: kinds, validation, and conversion from drawing-surface
//! pixels into unit space.
//!
//! A [`Shape`] is immutable once built. Its geometry is a tagged union over
//! the three supported kinds, so every consumer matches exhaustively instead
//! of probing object fields at runtime.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::normalize::{self, Point};
use crate::types::{new_id, EntityId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of shapes anchored to a single thread.
pub const MAX_SHAPES_PER_THREAD: usize = 50;

/// Maximum stroke width in pixels.
pub const MAX_STROKE_WIDTH: f64 = 20.0;

/// Minimum stroke width in pixels.
pub const MIN_STROKE_WIDTH: f64 = 0.5;

/// Maximum number of points in a freehand path.
pub const MAX_PATH_POINTS: usize = 5000;

/// Stroke color used when the drawing surface does not supply one.
pub const DEFAULT_COLOR: &str = "#FF4444";

// ---------------------------------------------------------------------------
// Shape kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Path,
    Rect,
    Circle,
}

const VALID_KIND_STRINGS: &[&str] = &["path", "rect", "circle"];

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Rect => "rect",
            Self::Circle => "circle",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "path" => Ok(Self::Path),
            "rect" => Ok(Self::Rect),
            "circle" => Ok(Self::Circle),
            _ => Err(CoreError::Validation(format!(
                "Invalid shape type '{s}'. Must be one of: {}",
                VALID_KIND_STRINGS.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Unit-space geometry of a shape, tagged by `type`.
///
/// Rects and circles are described by two opposite corners of their bounding
/// box; a circle is the ellipse inscribed in that box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Path { points: Vec<Point> },
    Rect { points: [Point; 2] },
    Circle { points: [Point; 2] },
}

impl ShapeGeometry {
    /// Build geometry of `kind` from a flat point list, checking arity.
    pub fn from_points(kind: ShapeKind, points: Vec<Point>) -> Result<Self, CoreError> {
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(CoreError::Validation(format!(
                "Shape point ({}, {}) is not finite",
                bad.x, bad.y
            )));
        }

        match kind {
            ShapeKind::Path => {
                if points.is_empty() {
                    return Err(CoreError::Validation(
                        "A path needs at least one point".to_string(),
                    ));
                }
                if points.len() > MAX_PATH_POINTS {
                    return Err(CoreError::Validation(format!(
                        "A path has {} points, maximum is {MAX_PATH_POINTS}",
                        points.len()
                    )));
                }
                Ok(Self::Path { points })
            }
            ShapeKind::Rect | ShapeKind::Circle => {
                let corners: [Point; 2] = points.try_into().map_err(|pts: Vec<Point>| {
                    CoreError::Validation(format!(
                        "A {} needs exactly 2 corner points, got {}",
                        kind.as_str(),
                        pts.len()
                    ))
                })?;
                Ok(match kind {
                    ShapeKind::Rect => Self::Rect { points: corners },
                    _ => Self::Circle { points: corners },
                })
            }
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Path { .. } => ShapeKind::Path,
            Self::Rect { .. } => ShapeKind::Rect,
            Self::Circle { .. } => ShapeKind::Circle,
        }
    }

    pub fn points(&self) -> &[Point] {
        match self {
            Self::Path { points } => points,
            Self::Rect { points } | Self::Circle { points } => points,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a stroke width lies in
/// [`MIN_STROKE_WIDTH`]..=[`MAX_STROKE_WIDTH`].
pub fn validate_stroke_width(width: f64) -> Result<(), CoreError> {
    if !width.is_finite() {
        return Err(CoreError::Validation(
            "stroke width must be a finite number".to_string(),
        ));
    }
    if !(MIN_STROKE_WIDTH..=MAX_STROKE_WIDTH).contains(&width) {
        return Err(CoreError::Validation(format!(
            "stroke width must be between {MIN_STROKE_WIDTH} and {MAX_STROKE_WIDTH}, got {width}"
        )));
    }
    Ok(())
}

/// Validate a `#RRGGBB` or `#RRGGBBAA` color.
pub fn validate_color_hex(color: &str) -> Result<(), CoreError> {
    let Some(hex) = color.strip_prefix('#') else {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must start with '#'"
        )));
    };

    if hex.len() != 6 && hex.len() != 8 {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must be in #RRGGBB or #RRGGBBAA hex format"
        )));
    }

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must contain only hex digits after '#'"
        )));
    }

    Ok(())
}

/// Validate the number of shapes being attached to a thread in one go.
pub fn validate_shape_count(count: usize) -> Result<(), CoreError> {
    if count == 0 {
        return Err(CoreError::EmptyShapeSet);
    }
    if count > MAX_SHAPES_PER_THREAD {
        return Err(CoreError::Validation(format!(
            "{count} shapes exceed the per-thread maximum of {MAX_SHAPES_PER_THREAD}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// A shape as delivered by the drawing surface, in surface pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnShape {
    pub kind: ShapeKind,
    pub points: Vec<Point>,
    pub color: Option<String>,
    pub stroke_width: f64,
}

/// A validated, unit-space annotation shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    id: EntityId,
    #[serde(flatten)]
    geometry: ShapeGeometry,
    color: String,
    stroke_width: f64,
}

impl Shape {
    /// Build a shape from unit-space geometry.
    pub fn new(
        geometry: ShapeGeometry,
        color: impl Into<String>,
        stroke_width: f64,
    ) -> Result<Self, CoreError> {
        let color = color.into();
        validate_color_hex(&color)?;
        validate_stroke_width(stroke_width)?;
        Ok(Self {
            id: new_id(),
            geometry,
            color,
            stroke_width,
        })
    }

    /// Convert a drawing-surface shape into unit space.
    ///
    /// `surface_width`/`surface_height` are the pixel dimensions the shape
    /// was drawn at; the surface overlays the video, so fractions of it are
    /// fractions of the video's native frame.
    pub fn from_drawn(
        drawn: &DrawnShape,
        surface_width: f64,
        surface_height: f64,
    ) -> Result<Self, CoreError> {
        let unit = normalize::points_to_unit(&drawn.points, surface_width, surface_height)?;
        let geometry = ShapeGeometry::from_points(drawn.kind, unit)?;
        let color = drawn.color.as_deref().unwrap_or(DEFAULT_COLOR);
        Self::new(geometry, color, drawn.stroke_width)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    pub fn geometry(&self) -> &ShapeGeometry {
        &self.geometry
    }

    pub fn points(&self) -> &[Point] {
        self.geometry.points()
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn stroke_width(&self) -> f64 {
        self.stroke_width
    }

    /// Project the shape onto a video rendered at `width` x `height`.
    pub fn to_pixels(&self, width: f64, height: f64) -> Result<Vec<Point>, CoreError> {
        normalize::points_from_unit(self.points(), width, height)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
