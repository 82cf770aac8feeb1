//! Connected blobs of a binary mask and their outer
//! contours.
//!
//! Blobs are 8-connected. The outer boundary of each blob is
//! traced with Moore-neighbour tracing, giving the ordered
//! boundary pixels (clockwise on screen). Holes inside a blob
//! are not traced: only external contours are reported.

use std::collections::VecDeque;

use ndarray::Array2;
use serde_derive::*;

/// Pixel coordinate as `(x, y) = (col, row)`.
pub type Point = (usize, usize);

/// Clockwise (on screen, `y` down) neighbour offsets starting
/// west.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// A connected region of `true` mask pixels.
#[derive(Debug, Clone)]
pub struct Blob {
    pub pixels: Vec<Point>,
    /// Inclusive bounding box `(min_x, min_y, max_x, max_y)`.
    pub bbox: (usize, usize, usize, usize),
    pub contour: Vec<Point>,
}

/// Label all 8-connected blobs of `mask`, in raster order of
/// their first pixel, and trace each outer contour.
pub fn find_blobs(mask: &Array2<bool>) -> Vec<Blob> {
    let (ht, wid) = mask.dim();
    let mut seen = Array2::from_elem((ht, wid), false);
    let mut blobs = vec![];

    for row in 0..ht {
        for col in 0..wid {
            if !mask[(row, col)] || seen[(row, col)] {
                continue;
            }
            let pixels = flood(mask, &mut seen, (col, row));
            let bbox = pixels.iter().fold(
                (usize::MAX, usize::MAX, 0, 0),
                |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            );
            let contour = trace_outer(mask, (col, row));
            blobs.push(Blob {
                pixels,
                bbox,
                contour,
            });
        }
    }
    blobs
}

fn flood(mask: &Array2<bool>, seen: &mut Array2<bool>, start: Point) -> Vec<Point> {
    let mut pixels = vec![];
    let mut queue = VecDeque::new();
    seen[(start.1, start.0)] = true;
    queue.push_back(start);
    while let Some(p) = queue.pop_front() {
        pixels.push(p);
        for &(dx, dy) in NEIGHBOURS.iter() {
            if let Some(q) = step(mask, p, dx, dy) {
                if !seen[(q.1, q.0)] {
                    seen[(q.1, q.0)] = true;
                    queue.push_back(q);
                }
            }
        }
    }
    pixels
}

/// Neighbour of `p` by `(dx, dy)` if it lies inside the mask
/// and is set.
fn step(mask: &Array2<bool>, p: Point, dx: isize, dy: isize) -> Option<Point> {
    let (ht, wid) = mask.dim();
    let x = p.0 as isize + dx;
    let y = p.1 as isize + dy;
    if x < 0 || y < 0 || x >= wid as isize || y >= ht as isize {
        return None;
    }
    let q = (x as usize, y as usize);
    mask[(q.1, q.0)].then(|| q)
}

fn direction(from: Point, to: (isize, isize)) -> usize {
    let d = (to.0 - from.0 as isize, to.1 - from.1 as isize);
    NEIGHBOURS
        .iter()
        .position(|n| *n == d)
        .unwrap_or(0)
}

/// Moore-neighbour tracing from `start`, which must be the
/// first blob pixel in raster order (so its west neighbour is
/// background). Stops when the first move is about to be
/// repeated.
fn trace_outer(mask: &Array2<bool>, start: Point) -> Vec<Point> {
    let mut contour = vec![start];
    let mut p = start;
    // direction (from p) of the last background neighbour visited
    let mut back = 0usize;
    let mut first_move: Option<Point> = None;
    let limit = 4 * mask.len() + 8;

    for _ in 0..limit {
        let found = (1..=8).find_map(|k| {
            let d = (back + k) % 8;
            step(mask, p, NEIGHBOURS[d].0, NEIGHBOURS[d].1).map(|q| (d, q))
        });
        let (d, q) = match found {
            Some(f) => f,
            // isolated pixel
            None => break,
        };

        if p == start {
            match first_move {
                None => first_move = Some(q),
                Some(m) if m == q => break,
                Some(_) => {}
            }
        }

        let prev = NEIGHBOURS[(d + 7) % 8];
        let back_pos = (p.0 as isize + prev.0, p.1 as isize + prev.1);
        back = direction(q, back_pos);
        p = q;
        if p == start {
            continue;
        }
        contour.push(p);
    }
    contour
}

/// Area enclosed by the closed polygon through `contour`
/// (shoelace formula).
pub fn polygon_area(contour: &[Point]) -> f64 {
    if contour.len() < 3 {
        return 0.;
    }
    let twice: f64 = closed_edges(contour)
        .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
        .sum();
    twice.abs() / 2.
}

/// Length of the closed polygon through `contour`.
pub fn perimeter(contour: &[Point]) -> f64 {
    if contour.len() < 2 {
        return 0.;
    }
    closed_edges(contour)
        .map(|((x0, y0), (x1, y1))| ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt())
        .sum()
}

/// `4π·area/perimeter²`; zero for a degenerate contour.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0. {
        return 0.;
    }
    4. * std::f64::consts::PI * area / (perimeter * perimeter)
}

/// Centroid `(x, y)` of the polygon through `contour`. Falls
/// back to the mean of the points when the polygon has no
/// area.
pub fn centroid(contour: &[Point]) -> (f64, f64) {
    let n = contour.len().max(1) as f64;
    let mean = contour.iter().fold((0., 0.), |(sx, sy), &(x, y)| {
        (sx + x as f64 / n, sy + y as f64 / n)
    });

    let (mut a, mut cx, mut cy) = (0., 0., 0.);
    for ((x0, y0), (x1, y1)) in closed_edges(contour) {
        let cross = x0 * y1 - x1 * y0;
        a += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    if contour.len() < 3 || a.abs() < 1e-12 {
        return mean;
    }
    (cx / (3. * a), cy / (3. * a))
}

fn closed_edges(contour: &[Point]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    let to_f = |&(x, y): &Point| (x as f64, y as f64);
    contour
        .iter()
        .map(to_f)
        .zip(contour.iter().cycle().skip(1).map(to_f))
        .take(contour.len())
}

/// Shape summary of a contour, as reported with each hotspot.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    pub centroid: (f64, f64),
}

impl Shape {
    pub fn of(contour: &[Point]) -> Self {
        let area = polygon_area(contour);
        let perimeter = perimeter(contour);
        Shape {
            area,
            perimeter,
            circularity: circularity(area, perimeter),
            centroid: centroid(contour),
        }
    }
}
