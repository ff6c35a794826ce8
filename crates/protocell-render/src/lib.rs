//! Lens rendering for Protocell: read-only grid snapshots mapped to RGBA
//! pixel buffers. Nothing here mutates simulation state; render strictly
//! between steps, against a quiescent world.

use protocell_core::{Cell, CellWorld};
use rayon::prelude::*;

/// Named pixel mapping over a grid snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lens {
    /// Stored energy plus dead/corpse flags.
    Energy,
    /// The ambient fields themselves, one pixel per row.
    Age,
    /// Lineage coloring derived from the identity digest.
    Genome,
    /// Last-action tag palette.
    Feed,
}

/// Tightly packed RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// RGBA channels of the pixel at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * self.width + x) * 4) as usize;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }
}

/// Palette indexed by [`protocell_core::FeedTag::palette_index`]:
/// idle, photo, chemo, share, raid, scavenge.
const FEED_PALETTE: [[u8; 3]; 6] = [
    [192, 192, 192],
    [0, 200, 0],
    [40, 90, 255],
    [160, 32, 240],
    [220, 40, 40],
    [240, 220, 40],
];

/// Render a completed step's grid through the requested lens.
///
/// `Age` yields a 1-row strip with one pixel per grid column-axis row; the
/// other lenses yield one pixel per grid slot in flat scan order.
#[must_use]
pub fn render(world: &CellWorld, lens: Lens) -> PixelBuffer {
    match lens {
        Lens::Energy => render_cells(world, shade_energy),
        Lens::Genome => render_cells(world, shade_genome),
        Lens::Feed => render_cells(world, shade_feed),
        Lens::Age => render_field_strip(world),
    }
}

fn render_cells(world: &CellWorld, shade: fn(&Cell) -> [u8; 3]) -> PixelBuffer {
    let grid = world.grid();
    let cells = grid.cells();
    let mut data = vec![0u8; cells.len() * 4];
    data.par_chunks_exact_mut(4)
        .zip(cells.par_iter())
        .for_each(|(pixel, cell)| {
            let [r, g, b] = shade(cell);
            pixel.copy_from_slice(&[r, g, b, 255]);
        });
    PixelBuffer {
        width: grid.height(),
        height: grid.width(),
        data,
    }
}

fn render_field_strip(world: &CellWorld) -> PixelBuffer {
    let rows = world.grid().height();
    let mut data = Vec::with_capacity(rows as usize * 4);
    for row in 0..rows {
        let light = (world.light_at(row) * 127.0).clamp(0.0, 255.0) as u8;
        let chemo = (world.chemo_at(row) * 127.0).clamp(0.0, 255.0) as u8;
        data.extend_from_slice(&[light, light, chemo, 255]);
    }
    PixelBuffer {
        width: rows,
        height: 1,
        data,
    }
}

fn shade_energy(cell: &Cell) -> [u8; 3] {
    let charge = (cell.energy().clamp(0.0, 100.0) / 100.0 * 255.0) as u8;
    let dead = if cell.is_dead() { 255 } else { 0 };
    let corpse = if cell.is_dead() && cell.energy() > 0.0 {
        255
    } else {
        0
    };
    [charge, dead, corpse]
}

fn shade_genome(cell: &Cell) -> [u8; 3] {
    if cell.is_dead() {
        return [0, 0, 0];
    }
    let mixed = scramble(cell.digest());
    [
        ((mixed / 255 / 255) % 255) as u8,
        ((mixed / 255) % 255) as u8,
        (mixed % 255) as u8,
    ]
}

fn shade_feed(cell: &Cell) -> [u8; 3] {
    FEED_PALETTE[cell.feed().palette_index()]
}

/// Spreads the one-byte digest across the color space so related lineages
/// land far apart.
fn scramble(digest: u8) -> u64 {
    let mut mixed = u64::from(digest).wrapping_add(0x9E37_79B9_7F4A_7C15);
    mixed = (mixed ^ (mixed >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mixed = (mixed ^ (mixed >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    mixed ^ (mixed >> 31)
}
