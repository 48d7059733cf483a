//! Regular chunk layouts over N-dimensional arrays.
//!
//! A [`ChunkLayout`] tiles an array shape with equally sized chunks (the last
//! chunk along an axis may be short). Chunks are addressed by their chunk
//! coordinate, and [`ChunkRegion::with_halo`] grows a region by per-axis
//! halos so stencil operations such as convolution can be evaluated chunk by
//! chunk without seams.

use thiserror::Error;

/// Errors produced when building a chunk layout
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    #[error("Chunk shape has {chunk} axes but the array has {array}")]
    RankMismatch { array: usize, chunk: usize },
    #[error("Chunk extent on axis {0} must be at least 1")]
    ZeroExtent(usize),
    #[error("Array shape must have at least one axis")]
    EmptyShape,
}

/// A rectangular block of an array, in voxel indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkRegion {
    /// Position of the chunk in the chunk grid
    pub coord: Vec<usize>,
    /// First voxel covered on each axis
    pub start: Vec<usize>,
    /// Number of voxels covered on each axis
    pub shape: Vec<usize>,
}

impl ChunkRegion {
    /// One-past-the-last voxel on each axis
    pub fn end(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.shape)
            .map(|(s, n)| s + n)
            .collect()
    }

    /// Grow the region by `before`/`after` voxels per axis, clipped to `bounds`.
    ///
    /// The chunk coordinate is preserved so the expanded region can still be
    /// matched back to the chunk it serves.
    pub fn with_halo(&self, before: &[usize], after: &[usize], bounds: &[usize]) -> ChunkRegion {
        let end = self.end();
        let mut start = Vec::with_capacity(self.start.len());
        let mut shape = Vec::with_capacity(self.start.len());

        for axis in 0..self.start.len() {
            let lo = self.start[axis].saturating_sub(before[axis]);
            let hi = (end[axis] + after[axis]).min(bounds[axis]);
            start.push(lo);
            shape.push(hi - lo);
        }

        ChunkRegion {
            coord: self.coord.clone(),
            start,
            shape,
        }
    }
}

/// Regular tiling of an N-dimensional shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    shape: Vec<usize>,
    chunk_shape: Vec<usize>,
}

impl ChunkLayout {
    /// Create a layout tiling `shape` with chunks of `chunk_shape`.
    ///
    /// Chunk extents larger than the array are clamped, so a chunk shape of
    /// `usize::MAX` on an axis means "do not split this axis".
    pub fn new(shape: &[usize], chunk_shape: &[usize]) -> Result<Self, ChunkError> {
        if shape.is_empty() {
            return Err(ChunkError::EmptyShape);
        }
        if shape.len() != chunk_shape.len() {
            return Err(ChunkError::RankMismatch {
                array: shape.len(),
                chunk: chunk_shape.len(),
            });
        }
        if let Some(axis) = chunk_shape.iter().position(|&c| c == 0) {
            return Err(ChunkError::ZeroExtent(axis));
        }

        let chunk_shape = chunk_shape
            .iter()
            .zip(shape)
            .map(|(&c, &n)| c.min(n.max(1)))
            .collect();

        Ok(Self {
            shape: shape.to_vec(),
            chunk_shape,
        })
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    /// Number of chunks along each axis
    pub fn grid_shape(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&n, &c)| n.div_ceil(c))
            .collect()
    }

    pub fn num_chunks(&self) -> usize {
        self.grid_shape().iter().product()
    }

    /// Row-major linear index of a chunk coordinate
    pub fn linear_index(&self, coord: &[usize]) -> usize {
        self.grid_shape()
            .iter()
            .zip(coord)
            .fold(0, |acc, (&extent, &c)| acc * extent + c)
    }

    /// Region covered by the chunk at `coord`
    pub fn region(&self, coord: &[usize]) -> ChunkRegion {
        let start: Vec<usize> = coord
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&c, &size)| c * size)
            .collect();
        let shape = start
            .iter()
            .zip(&self.chunk_shape)
            .zip(&self.shape)
            .map(|((&s, &size), &n)| size.min(n - s))
            .collect();

        ChunkRegion {
            coord: coord.to_vec(),
            start,
            shape,
        }
    }

    /// All chunk regions in row-major chunk order
    pub fn regions(&self) -> Vec<ChunkRegion> {
        let grid = self.grid_shape();
        let total: usize = grid.iter().product();
        let mut regions = Vec::with_capacity(total);

        for linear in 0..total {
            let mut coord = vec![0; grid.len()];
            let mut rem = linear;
            for axis in (0..grid.len()).rev() {
                coord[axis] = rem % grid[axis];
                rem /= grid[axis];
            }
            regions.push(self.region(&coord));
        }

        regions
    }
}
