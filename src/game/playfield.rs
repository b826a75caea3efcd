//! Trail occupancy grid for the arena

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rasterized record of which arena cells already hold a trail.
///
/// Cells are addressed by truncating a world coordinate toward zero. The
/// grid is `edge + 1` cells on a side so the inclusive bound `edge` itself
/// has a cell. Writes and queries go through the same [`Playfield::cell_of`]
/// so a trail can never be crossed through a rounding gap between them.
///
/// Only the tick driver writes. Cells are atomics so [`ArenaView`] readers
/// can render the grid on another thread without a copy on the driver.
pub struct Playfield {
    edge: u32,
    side: usize,
    trail_radius: u32,
    cells: Arc<[AtomicBool]>,
}

impl Playfield {
    pub fn new(edge: u32, trail_radius: u32) -> Self {
        let side = edge as usize + 1;
        Self {
            edge,
            side,
            trail_radius,
            cells: (0..side * side).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Read-only handle for rendering off the tick driver
    pub fn view(&self) -> ArenaView {
        ArenaView {
            side: self.side,
            cells: Arc::clone(&self.cells),
        }
    }

    /// Arena side length in world units
    pub fn edge(&self) -> f64 {
        self.edge as f64
    }

    /// Whether a world position lies inside `[0, edge]` on both axes
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let edge = self.edge();
        (0.0..=edge).contains(&x) && (0.0..=edge).contains(&y)
    }

    /// Grid cell for a world position, `None` outside the arena
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.contains(x, y) {
            return None;
        }
        Some((x.trunc() as usize, y.trunc() as usize))
    }

    /// Whether the cell under `(x, y)` is already part of a trail
    pub fn is_occupied(&self, x: f64, y: f64) -> bool {
        self.cell_of(x, y)
            .map(|(cx, cy)| self.cells[cy * self.side + cx].load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Mark a single cell occupied
    pub fn mark_cell(&mut self, cx: usize, cy: usize) {
        if cx < self.side && cy < self.side {
            self.cells[cy * self.side + cx].store(true, Ordering::Relaxed);
        }
    }

    /// Lay a trail dot centred on the cell under `(x, y)`.
    ///
    /// The dot is a square of half-width `trail_radius` cells, clipped to the
    /// grid. Positions outside the arena draw nothing.
    pub fn draw_dot(&mut self, x: f64, y: f64) {
        let Some((cx, cy)) = self.cell_of(x, y) else {
            return;
        };
        let r = self.trail_radius as usize;
        let max = self.side - 1;
        for gy in cy.saturating_sub(r)..=(cy + r).min(max) {
            for gx in cx.saturating_sub(r)..=(cx + r).min(max) {
                self.mark_cell(gx, gy);
            }
        }
    }

    /// Wipe every trail
    pub fn clear(&mut self) {
        for cell in self.cells.iter() {
            cell.store(false, Ordering::Relaxed);
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.load(Ordering::Relaxed))
            .count()
    }
}

/// Shared read handle on a [`Playfield`] grid.
///
/// A render taken while a tick is in progress may show part of that tick's
/// dots. Collision never reads through a view.
#[derive(Clone)]
pub struct ArenaView {
    side: usize,
    cells: Arc<[AtomicBool]>,
}

impl ArenaView {
    /// Render the grid as a binary PGM (P5) image: trails white, floor black
    pub fn render_pgm(&self) -> Vec<u8> {
        let header = format!("P5\n{} {}\n255\n", self.side, self.side);
        let mut out = Vec::with_capacity(header.len() + self.cells.len());
        out.extend_from_slice(header.as_bytes());
        out.extend(
            self.cells
                .iter()
                .map(|c| if c.load(Ordering::Relaxed) { 0xff } else { 0x00 }),
        );
        out
    }
}
