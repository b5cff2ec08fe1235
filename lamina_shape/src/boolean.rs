// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boolean operations on filled paths.
//!
//! Both operands are flattened into line segments. The plane is cut into horizontal slabs at
//! every segment endpoint and every crossing between two segments, so inside a slab no two
//! segments cross and each one spans the full slab height. Walking the segments of a slab from
//! left to right tracks the winding number of each operand. Each operand's fill rule turns its
//! winding number into inside or outside, and the operation combines the two into the spans
//! covered by the result.
//!
//! The result boundary is the sides of those spans plus, at every slab boundary, the
//! horizontal pieces where the spans above and below differ. Spans go clockwise (in y-down
//! coordinates) and holes counter-clockwise, and no two result contours overlap. The result
//! therefore renders the same under either fill rule.

use std::collections::HashMap;

use crate::desc::BoolOp;
use crate::kurbo::{flatten, BezPath, PathEl, Point};
use crate::peniko::Fill;

/// Flattening tolerance for boolean operands, in path units.
pub const TOLERANCE: f64 = 0.01;

/// Points closer than this are merged when rebuilding contours.
const MERGE_DISTANCE: f64 = 1e-9;

/// Combine two filled paths.
///
/// Each operand is interpreted with its own fill rule. The result is made of simple,
/// non-overlapping contours and is empty when the operation covers nothing.
pub fn combine(a: &BezPath, a_rule: Fill, b: &BezPath, b_rule: Fill, op: BoolOp) -> BezPath {
    let mut edges = Vec::new();
    collect_edges(a, 0, &mut edges);
    let a_edges = edges.len();
    collect_edges(b, 1, &mut edges);
    let b_edges = edges.len() - a_edges;

    match op {
        BoolOp::Intersect if a_edges == 0 || b_edges == 0 => return BezPath::new(),
        BoolOp::Subtract if a_edges == 0 => return BezPath::new(),
        _ => {}
    }
    if edges.is_empty() {
        return BezPath::new();
    }

    let ys = breakpoints(&edges);
    let slabs = classify(&edges, &ys, [a_rule, b_rule], op);
    let segments = boundary(&ys, &slabs);
    link(&segments)
}

/// A non-horizontal line segment, stored top to bottom.
#[derive(Clone, Copy, Debug)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    /// `+1` if the original segment pointed down, `-1` otherwise.
    winding: i32,
    operand: usize,
}

impl Edge {
    fn x_at(&self, y: f64) -> f64 {
        if y <= self.y0 {
            self.x0
        } else if y >= self.y1 {
            self.x1
        } else {
            self.x0 + (y - self.y0) * (self.x1 - self.x0) / (self.y1 - self.y0)
        }
    }
}

/// A horizontal run of the result inside one slab, bounded by two edges.
#[derive(Clone, Copy, Debug)]
struct Span {
    left_top: f64,
    left_bottom: f64,
    right_top: f64,
    right_bottom: f64,
}

fn collect_edges(path: &BezPath, operand: usize, edges: &mut Vec<Edge>) {
    let start_len = edges.len();
    let mut push = |p: Point, q: Point| {
        if p.y == q.y {
            return;
        }
        let (top, bottom, winding) = if p.y < q.y { (p, q, 1) } else { (q, p, -1) };
        edges.push(Edge {
            x0: top.x,
            y0: top.y,
            x1: bottom.x,
            y1: bottom.y,
            winding,
            operand,
        });
    };
    let mut start: Option<Point> = None;
    let mut last = Point::ZERO;
    flatten(path.iter(), TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            if let Some(s) = start {
                push(last, s);
            }
            start = Some(p);
            last = p;
        }
        PathEl::LineTo(p) => {
            push(last, p);
            last = p;
        }
        PathEl::ClosePath => {
            if let Some(s) = start {
                push(last, s);
                last = s;
            }
        }
        _ => {}
    });
    if let Some(s) = start {
        push(last, s);
    }
    let new = &edges[start_len..];
    if new
        .iter()
        .any(|e| !(e.x0.is_finite() && e.y0.is_finite() && e.x1.is_finite() && e.y1.is_finite()))
    {
        log::warn!("A boolean operand contains non-finite coordinates, ignoring it.");
        edges.truncate(start_len);
    }
}

/// All ordinates where the slab decomposition must cut: endpoints and crossings.
fn breakpoints(edges: &[Edge]) -> Vec<f64> {
    let mut ys: Vec<f64> = edges.iter().flat_map(|e| [e.y0, e.y1]).collect();
    for (i, a) in edges.iter().enumerate() {
        for b in &edges[i + 1..] {
            if let Some(y) = crossing(a, b) {
                ys.push(y);
            }
        }
    }
    ys.sort_by(f64::total_cmp);
    ys.dedup();
    ys
}

/// The ordinate at which two edges strictly cross, if they do.
fn crossing(a: &Edge, b: &Edge) -> Option<f64> {
    let lo = a.y0.max(b.y0);
    let hi = a.y1.min(b.y1);
    if lo >= hi {
        return None;
    }
    let d_lo = a.x_at(lo) - b.x_at(lo);
    let d_hi = a.x_at(hi) - b.x_at(hi);
    if d_lo * d_hi >= 0. {
        return None;
    }
    let y = lo + (hi - lo) * d_lo / (d_lo - d_hi);
    (y > lo && y < hi).then_some(y)
}

fn inside(rule: Fill, winding: i32) -> bool {
    match rule {
        Fill::NonZero => winding != 0,
        Fill::EvenOdd => winding % 2 != 0,
    }
}

fn apply(op: BoolOp, a: bool, b: bool) -> bool {
    match op {
        BoolOp::Union => a || b,
        BoolOp::Intersect => a && b,
        BoolOp::Subtract => a && !b,
        BoolOp::Exclude => a != b,
    }
}

/// Result spans of each slab `ys[k]..ys[k + 1]`.
fn classify(edges: &[Edge], ys: &[f64], rules: [Fill; 2], op: BoolOp) -> Vec<Vec<Span>> {
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&i, &j| edges[i].y0.total_cmp(&edges[j].y0));
    let mut next = 0;
    let mut active: Vec<usize> = Vec::new();
    let mut sorted: Vec<(f64, usize)> = Vec::new();
    let mut slabs = Vec::with_capacity(ys.len().saturating_sub(1));

    for w in ys.windows(2) {
        let (ya, yb) = (w[0], w[1]);
        while next < order.len() && edges[order[next]].y0 <= ya {
            active.push(order[next]);
            next += 1;
        }
        active.retain(|&i| edges[i].y1 > ya);

        let ym = 0.5 * (ya + yb);
        sorted.clear();
        sorted.extend(active.iter().map(|&i| (edges[i].x_at(ym), i)));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut spans: Vec<Span> = Vec::new();
        let mut winding = [0_i32; 2];
        let mut was_inside = false;
        let mut left = 0;
        for &(_, i) in &sorted {
            let e = &edges[i];
            winding[e.operand] += e.winding;
            let now = apply(
                op,
                inside(rules[0], winding[0]),
                inside(rules[1], winding[1]),
            );
            if now == was_inside {
                continue;
            }
            if now {
                left = i;
            } else {
                let (l, r) = (&edges[left], e);
                let span = Span {
                    left_top: l.x_at(ya),
                    left_bottom: l.x_at(yb),
                    right_top: r.x_at(ya),
                    right_bottom: r.x_at(yb),
                };
                // Spans separated by a zero-width gap are one span.
                match spans.last_mut() {
                    Some(prev)
                        if prev.right_top == span.left_top
                            && prev.right_bottom == span.left_bottom =>
                    {
                        prev.right_top = span.right_top;
                        prev.right_bottom = span.right_bottom;
                    }
                    _ => spans.push(span),
                }
            }
            was_inside = now;
        }
        slabs.push(spans);
    }
    slabs
}

/// Directed boundary segments of the result.
fn boundary(ys: &[f64], slabs: &[Vec<Span>]) -> Vec<(Point, Point)> {
    let mut segments = Vec::new();
    for (k, spans) in slabs.iter().enumerate() {
        let (ya, yb) = (ys[k], ys[k + 1]);
        for s in spans {
            segments.push((
                Point::new(s.right_top, ya),
                Point::new(s.right_bottom, yb),
            ));
            segments.push((Point::new(s.left_bottom, yb), Point::new(s.left_top, ya)));
        }
    }

    let mut above = Vec::new();
    let mut below = Vec::new();
    let mut pieces = Vec::new();
    for (k, &y) in ys.iter().enumerate() {
        above.clear();
        below.clear();
        if k > 0 {
            above.extend(slabs[k - 1].iter().map(|s| (s.left_bottom, s.right_bottom)));
        }
        if let Some(spans) = slabs.get(k) {
            below.extend(spans.iter().map(|s| (s.left_top, s.right_top)));
        }
        // Tops of the spans below run left to right, bottoms of the spans above right to left.
        pieces.clear();
        subtract(&below, &above, &mut pieces);
        segments.extend(
            pieces
                .iter()
                .map(|&(x0, x1)| (Point::new(x0, y), Point::new(x1, y))),
        );
        pieces.clear();
        subtract(&above, &below, &mut pieces);
        segments.extend(
            pieces
                .iter()
                .map(|&(x0, x1)| (Point::new(x1, y), Point::new(x0, y))),
        );
    }
    segments
}

/// Parts of the sorted, disjoint intervals `a` not covered by the sorted, disjoint intervals `b`.
fn subtract(a: &[(f64, f64)], b: &[(f64, f64)], out: &mut Vec<(f64, f64)>) {
    let mut j = 0;
    for &(start, end) in a {
        while j < b.len() && b[j].1 <= start {
            j += 1;
        }
        let mut s = start;
        let mut k = j;
        while k < b.len() && b[k].0 < end {
            if b[k].0 > s {
                out.push((s, b[k].0));
            }
            s = s.max(b[k].1);
            k += 1;
        }
        if s < end {
            out.push((s, end));
        }
    }
}

fn key(p: Point) -> (u64, u64) {
    // Adding zero folds -0.0 into 0.0.
    ((p.x + 0.).to_bits(), (p.y + 0.).to_bits())
}

/// Chain directed segments into closed contours.
fn link(segments: &[(Point, Point)]) -> BezPath {
    let mut outgoing: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
    for (i, (p, _)) in segments.iter().enumerate() {
        outgoing.entry(key(*p)).or_default().push(i);
    }
    let mut used = vec![false; segments.len()];
    let mut path = BezPath::new();
    let mut contour = Vec::new();

    for first in 0..segments.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        contour.clear();
        contour.push(segments[first].0);
        let origin = key(segments[first].0);
        let mut current = first;
        loop {
            let end = segments[current].1;
            if key(end) == origin {
                break;
            }
            let next = outgoing
                .get(&key(end))
                .and_then(|candidates| candidates.iter().copied().find(|&i| !used[i]));
            let Some(next) = next else {
                break;
            };
            contour.push(end);
            used[next] = true;
            current = next;
        }
        emit_contour(&contour, &mut path);
    }
    path
}

fn collinear(a: Point, b: Point, c: Point) -> bool {
    let u = b - a;
    let v = c - b;
    let len = u.hypot() * v.hypot();
    len <= MERGE_DISTANCE || u.cross(v).abs() <= 1e-9 * len
}

fn emit_contour(points: &[Point], path: &mut BezPath) {
    let mut pts: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if pts.last().is_some_and(|q| q.distance(p) <= MERGE_DISTANCE) {
            continue;
        }
        while pts.len() >= 2 && collinear(pts[pts.len() - 2], pts[pts.len() - 1], p) {
            pts.pop();
        }
        pts.push(p);
    }
    if pts.len() >= 2 && pts[0].distance(pts[pts.len() - 1]) <= MERGE_DISTANCE {
        pts.pop();
    }
    while pts.len() >= 3 && collinear(pts[pts.len() - 2], pts[pts.len() - 1], pts[0]) {
        pts.pop();
    }
    while pts.len() >= 3 && collinear(pts[pts.len() - 1], pts[0], pts[1]) {
        pts.remove(0);
    }
    if pts.len() < 3 {
        return;
    }
    path.move_to(pts[0]);
    for &p in &pts[1..] {
        path.line_to(p);
    }
    path.close_path();
}
