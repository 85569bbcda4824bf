//! Swept-path collision detection between moving gatherers and stationary
//! targets (loot items and deposit bases).
//!
//! A gatherer is modelled as a disc of a given width swept along the
//! segment it travelled during the tick. Items are points; bases are
//! axis-aligned rectangles. The detector emits every collision as an event
//! tagged with the fraction of the sweep at which it happens, sorted so the
//! simulation can replay pickups and deposits in physical order.

use std::cmp::Ordering;

use crate::geom::{intersect_rects, Point2D, Rect};

/// Tolerance when comparing event times during sorting.
const TIME_EPSILON: f64 = 1e-10;
/// Tolerance when comparing squared distances during sorting.
const DIST_EPSILON: f64 = 1e-10;

/// Outcome of projecting a target point onto a gatherer sweep.
#[derive(Debug, Clone, Copy)]
pub struct CollectResult {
    /// Squared distance from the target to the sweep line.
    pub sq_distance: f64,
    /// Fraction of the sweep at which the closest approach happens.
    pub proj_ratio: f64,
}

impl CollectResult {
    /// True when the closest approach lies within the sweep and inside the
    /// given collection radius.
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        self.proj_ratio >= 0.0
            && self.proj_ratio <= 1.0
            && self.sq_distance <= collect_radius * collect_radius
    }
}

/// Moving from `a` to `b`, try to collect the point `c`.
///
/// The zero-length sweep is compared with strict equality: even a tiny
/// movement still has to count towards collection, so no tolerance is
/// applied here.
pub fn try_collect_point(a: Point2D, b: Point2D, c: Point2D) -> CollectResult {
    if b.x == a.x && b.y == a.y {
        return CollectResult {
            sq_distance: (b.x - c.x).powi(2) + (b.y - c.y).powi(2),
            proj_ratio: 0.0,
        };
    }
    let u_x = c.x - a.x;
    let u_y = c.y - a.y;
    let v_x = b.x - a.x;
    let v_y = b.y - a.y;
    let u_dot_v = u_x * v_x + u_y * v_y;
    let u_len2 = u_x * u_x + u_y * u_y;
    let v_len2 = v_x * v_x + v_y * v_y;

    CollectResult {
        sq_distance: u_len2 - (u_dot_v * u_dot_v) / v_len2,
        proj_ratio: u_dot_v / v_len2,
    }
}

/// A stationary collectable point.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    pub position: Point2D,
    pub width: f64,
}

/// A moving collector: the segment it swept during the tick plus its width.
#[derive(Debug, Clone, Copy)]
pub struct Gatherer {
    pub start_pos: Point2D,
    pub end_pos: Point2D,
    pub width: f64,
}

/// A deposit base: an axis-aligned rectangle spanned by `position` and
/// `position + offset`, thickened by `width`.
#[derive(Debug, Clone, Copy)]
pub struct Base {
    pub position: Point2D,
    pub offset: Point2D,
    pub width: f64,
}

/// Capability set the detector needs from the world.
///
/// Implemented by the production per-session view and by test doubles.
pub trait ItemGathererProvider {
    fn items_count(&self) -> usize;
    fn item(&self, idx: usize) -> Item;
    fn gatherers_count(&self) -> usize;
    fn gatherer(&self, idx: usize) -> Gatherer;
    fn bases_count(&self) -> usize;
    fn base(&self, idx: usize) -> Base;
}

/// A single collision within a tick.
///
/// `item_id` and `gatherer_id` are indices into the provider; for base
/// events `item_id` carries the base index instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub item_id: usize,
    pub gatherer_id: usize,
    pub sq_distance: f64,
    pub time: f64,
    pub is_base: bool,
}

fn compare_events(left: &CollisionEvent, right: &CollisionEvent) -> Ordering {
    if (left.time - right.time).abs() > TIME_EPSILON {
        return left.time.partial_cmp(&right.time).unwrap_or(Ordering::Equal);
    }
    if (left.sq_distance - right.sq_distance).abs() > DIST_EPSILON {
        return left
            .sq_distance
            .partial_cmp(&right.sq_distance)
            .unwrap_or(Ordering::Equal);
    }
    (left.item_id, left.gatherer_id).cmp(&(right.item_id, right.gatherer_id))
}

/// Inflated bounding rectangle of a base.
fn base_rect(base: &Base) -> Rect {
    let x_min = base.position.x.min(base.position.x + base.offset.x);
    let x_max = base.position.x.max(base.position.x + base.offset.x);
    let y_min = base.position.y.min(base.position.y + base.offset.y);
    let y_max = base.position.y.max(base.position.y + base.offset.y);
    let half = base.width / 2.0;
    Rect {
        x: x_min - half,
        y: y_min - half,
        w: x_max - x_min + base.width,
        h: y_max - y_min + base.width,
    }
}

/// Inflated bounding rectangle of a gatherer sweep.
fn gatherer_rect(gatherer: &Gatherer) -> Rect {
    let x_min = gatherer.start_pos.x.min(gatherer.end_pos.x);
    let x_max = gatherer.start_pos.x.max(gatherer.end_pos.x);
    let y_min = gatherer.start_pos.y.min(gatherer.end_pos.y);
    let y_max = gatherer.start_pos.y.max(gatherer.end_pos.y);
    let half = gatherer.width / 2.0;
    Rect {
        x: x_min - half,
        y: y_min - half,
        w: x_max - x_min + gatherer.width,
        h: y_max - y_min + gatherer.width,
    }
}

/// The four corners of the base/gatherer rectangle overlap, if any.
fn base_corners_on_way(base: &Base, gatherer: &Gatherer) -> Option<[Point2D; 4]> {
    let rect = intersect_rects(base_rect(base), gatherer_rect(gatherer))?;
    Some([
        Point2D::new(rect.x, rect.y),
        Point2D::new(rect.x + rect.w, rect.y),
        Point2D::new(rect.x, rect.y + rect.h),
        Point2D::new(rect.x + rect.w, rect.y + rect.h),
    ])
}

/// Detects every collision during the tick and returns the events sorted by
/// `(time, sq_distance, item_id, gatherer_id)`.
///
/// Gatherers that did not move are skipped. A base contributes at most one
/// event per gatherer: the earliest of its overlap corners that falls
/// inside the sweep.
pub fn find_gather_events(provider: &dyn ItemGathererProvider) -> Vec<CollisionEvent> {
    let mut detected_events = Vec::new();

    for g in 0..provider.gatherers_count() {
        let gatherer = provider.gatherer(g);
        if gatherer.start_pos == gatherer.end_pos {
            continue;
        }
        for i in 0..provider.items_count() {
            let item = provider.item(i);
            let collect_result =
                try_collect_point(gatherer.start_pos, gatherer.end_pos, item.position);

            if collect_result.is_collected((gatherer.width + item.width) / 2.0) {
                detected_events.push(CollisionEvent {
                    item_id: i,
                    gatherer_id: g,
                    sq_distance: collect_result.sq_distance,
                    time: collect_result.proj_ratio,
                    is_base: false,
                });
            }
        }
        for b in 0..provider.bases_count() {
            let base = provider.base(b);
            let Some(corners) = base_corners_on_way(&base, &gatherer) else {
                continue;
            };

            let mut earliest: Option<CollisionEvent> = None;
            for corner in corners {
                let collect_result =
                    try_collect_point(gatherer.start_pos, gatherer.end_pos, corner);
                if !collect_result.is_collected(gatherer.width / 2.0) {
                    continue;
                }
                let candidate = CollisionEvent {
                    item_id: b,
                    gatherer_id: g,
                    sq_distance: collect_result.sq_distance,
                    time: collect_result.proj_ratio,
                    is_base: true,
                };
                match earliest {
                    Some(best) if best.time <= candidate.time => {}
                    _ => earliest = Some(candidate),
                }
            }
            if let Some(event) = earliest {
                detected_events.push(event);
            }
        }
    }

    detected_events.sort_by(compare_events);
    detected_events
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const EPSILON: f64 = 1e-10;

    struct TestProvider {
        items: Vec<Item>,
        gatherers: Vec<Gatherer>,
        bases: Vec<Base>,
    }

    impl ItemGathererProvider for TestProvider {
        fn items_count(&self) -> usize {
            self.items.len()
        }
        fn item(&self, idx: usize) -> Item {
            self.items[idx]
        }
        fn gatherers_count(&self) -> usize {
            self.gatherers.len()
        }
        fn gatherer(&self, idx: usize) -> Gatherer {
            self.gatherers[idx]
        }
        fn bases_count(&self) -> usize {
            self.bases.len()
        }
        fn base(&self, idx: usize) -> Base {
            self.bases[idx]
        }
    }

    fn provider(items: Vec<Item>, gatherers: Vec<Gatherer>) -> TestProvider {
        TestProvider { items, gatherers, bases: Vec::new() }
    }

    /// One gatherer walking a horizontal path over an item placed at a
    /// given fraction of the path should collect it at exactly that time.
    fn check_gathering_one_item(path_ratio: f64) {
        let start = Point2D::new(1.0, 2.0);
        let end = Point2D::new(3.0, 2.0);
        let item_point = Point2D::new(1.0 + path_ratio * 2.0, 2.0);

        let p = provider(
            vec![Item { position: item_point, width: 1.0 }],
            vec![Gatherer { start_pos: start, end_pos: end, width: 1.0 }],
        );
        let events = find_gather_events(&p);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 0);
        assert_eq!(events[0].gatherer_id, 0);
        assert!(!events[0].is_base);
        assert_approx_eq!(events[0].sq_distance, 0.0, EPSILON);
        assert_approx_eq!(events[0].time, path_ratio, EPSILON);
    }

    #[test]
    fn test_no_events_for_empty_world() {
        let p = provider(Vec::new(), Vec::new());
        assert!(find_gather_events(&p).is_empty());
    }

    #[test]
    fn test_collects_item_along_path() {
        for ratio in [0.0, 1e-4, 0.44, 0.5, 1.0 - 1e-4, 1.0] {
            check_gathering_one_item(ratio);
        }
    }

    #[test]
    fn test_collects_item_on_vertical_path() {
        let p = provider(
            vec![Item { position: Point2D::new(-2.0, 0.0), width: 1.0 }],
            vec![Gatherer {
                start_pos: Point2D::new(-2.0, -1.0),
                end_pos: Point2D::new(-2.0, 1.0),
                width: 1.0,
            }],
        );
        let events = find_gather_events(&p);
        assert_eq!(events.len(), 1);
        assert_approx_eq!(events[0].time, 0.5, EPSILON);
    }

    #[test]
    fn test_misses_item_off_path() {
        // Collection radius is (1 + 1) / 2 = 1; the item sits 1.5 away.
        let p = provider(
            vec![Item { position: Point2D::new(2.0, 3.5), width: 1.0 }],
            vec![Gatherer {
                start_pos: Point2D::new(1.0, 2.0),
                end_pos: Point2D::new(3.0, 2.0),
                width: 1.0,
            }],
        );
        assert!(find_gather_events(&p).is_empty());
    }

    #[test]
    fn test_misses_item_behind_start() {
        let p = provider(
            vec![Item { position: Point2D::new(0.0, 2.0), width: 0.1 }],
            vec![Gatherer {
                start_pos: Point2D::new(1.0, 2.0),
                end_pos: Point2D::new(3.0, 2.0),
                width: 0.1,
            }],
        );
        assert!(find_gather_events(&p).is_empty());
    }

    #[test]
    fn test_stationary_gatherer_collects_nothing() {
        let p = provider(
            vec![Item { position: Point2D::new(1.0, 2.0), width: 1.0 }],
            vec![Gatherer {
                start_pos: Point2D::new(1.0, 2.0),
                end_pos: Point2D::new(1.0, 2.0),
                width: 1.0,
            }],
        );
        assert!(find_gather_events(&p).is_empty());
    }

    #[test]
    fn test_events_sorted_by_time_then_distance() {
        let start = Point2D::new(0.0, 0.0);
        let end = Point2D::new(10.0, 0.0);
        let p = provider(
            vec![
                Item { position: Point2D::new(8.0, 0.0), width: 0.0 },
                Item { position: Point2D::new(2.0, 0.0), width: 0.0 },
                Item { position: Point2D::new(5.0, 0.2), width: 0.0 },
                Item { position: Point2D::new(5.0, 0.0), width: 0.0 },
            ],
            vec![Gatherer { start_pos: start, end_pos: end, width: 0.6 }],
        );
        let events = find_gather_events(&p);
        let order: Vec<usize> = events.iter().map(|e| e.item_id).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);

        for pair in events.windows(2) {
            assert!(pair[0].time <= pair[1].time + EPSILON);
        }
    }

    #[test]
    fn test_equal_events_tie_break_on_ids() {
        let sweep = Gatherer {
            start_pos: Point2D::new(0.0, 0.0),
            end_pos: Point2D::new(4.0, 0.0),
            width: 1.0,
        };
        let p = provider(
            vec![
                Item { position: Point2D::new(2.0, 0.0), width: 0.0 },
                Item { position: Point2D::new(2.0, 0.0), width: 0.0 },
            ],
            vec![sweep, sweep],
        );
        let events = find_gather_events(&p);
        assert_eq!(events.len(), 4);
        let keys: Vec<(usize, usize)> =
            events.iter().map(|e| (e.item_id, e.gatherer_id)).collect();
        assert_eq!(keys, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_base_event_uses_earliest_corner() {
        let p = TestProvider {
            items: Vec::new(),
            gatherers: vec![Gatherer {
                start_pos: Point2D::new(0.0, 0.0),
                end_pos: Point2D::new(10.0, 0.0),
                width: 0.6,
            }],
            bases: vec![Base {
                position: Point2D::new(4.0, 0.0),
                offset: Point2D::new(1.0, 1.0),
                width: 0.5,
            }],
        };
        let events = find_gather_events(&p);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_base);
        assert_eq!(events[0].gatherer_id, 0);
        // The near edge of the inflated base sits at x = 3.75.
        assert_approx_eq!(events[0].time, 0.375, EPSILON);
    }

    #[test]
    fn test_base_far_from_sweep_gives_no_event() {
        let p = TestProvider {
            items: Vec::new(),
            gatherers: vec![Gatherer {
                start_pos: Point2D::new(0.0, 0.0),
                end_pos: Point2D::new(10.0, 0.0),
                width: 0.6,
            }],
            bases: vec![Base {
                position: Point2D::new(4.0, 5.0),
                offset: Point2D::new(1.0, 1.0),
                width: 0.5,
            }],
        };
        assert!(find_gather_events(&p).is_empty());
    }
}
