// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use crate::{grown_capacity, ping_pong::PingPongBuffer};
use anyhow::{ensure, Result};
use gpu::Gpu;
use std::mem;
use zerocopy::AsBytes;

const FLOAT_SIZE: wgpu::BufferAddress = mem::size_of::<f32>() as wgpu::BufferAddress;

/// Double-buffered SoA node positions: X and Y keep separate ping-pong
/// pairs for cache-friendly access in the force kernels, but always swap
/// and resize together.
#[derive(Debug)]
pub struct PositionBuffer {
    x: PingPongBuffer,
    y: PingPongBuffer,
    capacity: usize,
}

impl PositionBuffer {
    pub fn new(gpu: &Gpu, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let size = capacity as wgpu::BufferAddress * FLOAT_SIZE;
        Self {
            x: PingPongBuffer::new(gpu, "hg-position-x", size),
            y: PingPongBuffer::new(gpu, "hg-position-y", size),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn parity(&self) -> usize {
        debug_assert_eq!(self.x.parity(), self.y.parity());
        self.x.parity()
    }

    pub fn x(&self) -> &PingPongBuffer {
        &self.x
    }

    pub fn y(&self) -> &PingPongBuffer {
        &self.y
    }

    /// Full overwrite of both sides of both axes.
    pub fn upload(&self, gpu: &Gpu, xs: &[f32], ys: &[f32]) -> Result<()> {
        ensure!(
            xs.len() == ys.len(),
            "position arrays disagree: {} vs {}",
            xs.len(),
            ys.len()
        );
        ensure!(xs.len() <= self.capacity, "position upload exceeds capacity");
        self.x.write_both(gpu, 0, xs.as_bytes());
        self.y.write_both(gpu, 0, ys.as_bytes());
        Ok(())
    }

    /// Partial write for incremental mutations. Writes both ping-pong sides
    /// so an explicitly-set position survives the next swap.
    pub fn patch_range(&self, gpu: &Gpu, offset: usize, xs: &[f32], ys: &[f32]) -> Result<()> {
        ensure!(
            xs.len() == ys.len(),
            "position patch disagrees: {} vs {}",
            xs.len(),
            ys.len()
        );
        ensure!(offset + xs.len() <= self.capacity, "position patch exceeds capacity");
        let byte_offset = offset as wgpu::BufferAddress * FLOAT_SIZE;
        self.x.write_both(gpu, byte_offset, xs.as_bytes());
        self.y.write_both(gpu, byte_offset, ys.as_bytes());
        Ok(())
    }

    /// Advance both axes together after submit.
    pub fn swap(&mut self) {
        self.x.swap();
        self.y.swap();
    }

    /// Grow (never shrink) to at least `required` slots. Returns true when
    /// the buffers were re-created, which invalidates bind groups.
    pub fn ensure_capacity(
        &mut self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        required: usize,
    ) -> bool {
        if required <= self.capacity {
            return false;
        }
        let new_capacity = grown_capacity(self.capacity, required);
        let new_size = new_capacity as wgpu::BufferAddress * FLOAT_SIZE;
        self.x.resize(gpu, encoder, new_size, true);
        self.y.resize(gpu, encoder, new_size, true);
        self.capacity = new_capacity;
        true
    }
}
