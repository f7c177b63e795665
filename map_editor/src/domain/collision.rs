// Derived collision index. Always rebuilt from scratch, never patched.

/// One entity footprint anchored on the map.
#[derive(Debug, Clone, Copy)]
pub struct Footprint<'a> {
    pub x: u32,
    pub y: u32,
    pub cells: &'a [Vec<i64>],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionGrid {
    width: u32,
    height: u32,
    cells: Vec<bool>,
    generation: u64,
}

impl CollisionGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of rebuilds performed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_blocked(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            // Outside the map counts as blocked.
            return true;
        }
        self.cells[self.index(x, y)]
    }

    pub fn blocked_count(&self) -> usize {
        self.cells.iter().filter(|blocked| **blocked).count()
    }

    /// Rebuilds the grid from the union of the given footprints.
    pub fn rebuild<'a>(&mut self, footprints: impl IntoIterator<Item = Footprint<'a>>) {
        self.cells.iter_mut().for_each(|cell| *cell = false);

        for footprint in footprints {
            for (row_offset, row) in footprint.cells.iter().enumerate() {
                for (col_offset, cell) in row.iter().enumerate() {
                    if *cell == 0 {
                        continue;
                    }
                    let x = footprint.x as usize + col_offset;
                    let y = footprint.y as usize + row_offset;
                    // Clip parts of the footprint hanging off the map.
                    if x >= self.width as usize || y >= self.height as usize {
                        continue;
                    }
                    let index = y * self.width as usize + x;
                    self.cells[index] = true;
                }
            }
        }

        self.generation += 1;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
