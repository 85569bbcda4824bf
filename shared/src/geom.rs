use serde::{Deserialize, Serialize};

/// A point in the 2D world, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A 2D displacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle given by its min corner and extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// A 1D interval with `x1 <= x2`, used for rectangle projections.
#[derive(Debug, Clone, Copy)]
pub struct LineSegment {
    pub x1: f64,
    pub x2: f64,
}

/// Overlap of two intervals, or `None` when they are disjoint.
pub fn intersect_segments(s1: LineSegment, s2: LineSegment) -> Option<LineSegment> {
    let left = s1.x1.max(s2.x1);
    let right = s1.x2.min(s2.x2);
    if right < left {
        return None;
    }
    Some(LineSegment { x1: left, x2: right })
}

pub fn project_x(r: Rect) -> LineSegment {
    LineSegment { x1: r.x, x2: r.x + r.w }
}

pub fn project_y(r: Rect) -> LineSegment {
    LineSegment { x1: r.y, x2: r.y + r.h }
}

/// Intersection of two rectangles via their axis projections.
pub fn intersect_rects(r1: Rect, r2: Rect) -> Option<Rect> {
    let px = intersect_segments(project_x(r1), project_x(r2))?;
    let py = intersect_segments(project_y(r1), project_y(r2))?;
    Some(Rect {
        x: px.x1,
        y: py.x1,
        w: px.x2 - px.x1,
        h: py.x2 - py.x1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_segment_overlap() {
        let s = intersect_segments(
            LineSegment { x1: 0.0, x2: 2.0 },
            LineSegment { x1: 1.0, x2: 3.0 },
        )
        .unwrap();
        assert_approx_eq!(s.x1, 1.0);
        assert_approx_eq!(s.x2, 2.0);
    }

    #[test]
    fn test_segment_disjoint() {
        assert!(intersect_segments(
            LineSegment { x1: 0.0, x2: 1.0 },
            LineSegment { x1: 2.0, x2: 3.0 },
        )
        .is_none());
    }

    #[test]
    fn test_rect_intersection() {
        let r1 = Rect { x: 0.0, y: 0.0, w: 2.0, h: 2.0 };
        let r2 = Rect { x: 1.0, y: 1.0, w: 2.0, h: 2.0 };
        let r = intersect_rects(r1, r2).unwrap();
        assert_approx_eq!(r.x, 1.0);
        assert_approx_eq!(r.y, 1.0);
        assert_approx_eq!(r.w, 1.0);
        assert_approx_eq!(r.h, 1.0);
    }

    #[test]
    fn test_rect_disjoint() {
        let r1 = Rect { x: 0.0, y: 0.0, w: 1.0, h: 1.0 };
        let r2 = Rect { x: 5.0, y: 5.0, w: 1.0, h: 1.0 };
        assert!(intersect_rects(r1, r2).is_none());
    }
}
