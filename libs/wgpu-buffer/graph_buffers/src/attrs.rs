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
use crate::grown_capacity;
use anyhow::{ensure, Result};
use gpu::Gpu;
use std::{mem, ops::Range};
use zerocopy::AsBytes;

const FLOAT_SIZE: wgpu::BufferAddress = mem::size_of::<f32>() as wgpu::BufferAddress;

/// Interleaved per-record float attributes (node or edge styling) living in
/// a storage buffer, patched by record range.
#[derive(Debug)]
pub struct AttributeBuffer {
    label: String,
    buffer: wgpu::Buffer,
    floats_per_record: usize,
    capacity: usize,
}

impl AttributeBuffer {
    pub fn new(gpu: &Gpu, label: &str, capacity: usize, floats_per_record: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            label: label.to_owned(),
            buffer: Self::create(gpu, label, capacity, floats_per_record),
            floats_per_record,
            capacity,
        }
    }

    fn create(gpu: &Gpu, label: &str, capacity: usize, floats_per_record: usize) -> wgpu::Buffer {
        gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity * floats_per_record) as wgpu::BufferAddress * FLOAT_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upload the records in `range` from the full CPU-side shadow array.
    pub fn patch(&self, gpu: &Gpu, shadow: &[f32], range: Range<usize>) -> Result<()> {
        ensure!(range.end <= self.capacity, "{}: patch beyond capacity", self.label);
        let lo = range.start * self.floats_per_record;
        let hi = range.end * self.floats_per_record;
        gpu.queue().write_buffer(
            &self.buffer,
            lo as wgpu::BufferAddress * FLOAT_SIZE,
            shadow[lo..hi].as_bytes(),
        );
        Ok(())
    }

    /// Grow to hold `required` records; contents are re-uploaded by the
    /// caller from the CPU shadow. True when bind groups must be rebuilt.
    pub fn ensure_capacity(&mut self, gpu: &Gpu, required: usize) -> bool {
        if required <= self.capacity {
            return false;
        }
        self.capacity = grown_capacity(self.capacity, required);
        self.buffer = Self::create(gpu, &self.label, self.capacity, self.floats_per_record);
        true
    }
}

/// One bit per node slot; set bits skip integration so dragged or pinned
/// nodes stay exactly where the host put them.
#[derive(Debug)]
pub struct PinMaskBuffer {
    buffer: wgpu::Buffer,
    words: usize,
}

impl PinMaskBuffer {
    pub fn new(gpu: &Gpu, node_capacity: usize) -> Self {
        let words = (node_capacity.max(1) + 31) / 32;
        Self {
            buffer: Self::create(gpu, words),
            words,
        }
    }

    fn create(gpu: &Gpu, words: usize) -> wgpu::Buffer {
        gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("hg-pin-mask"),
            size: (words.max(1) * mem::size_of::<u32>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn upload(&self, gpu: &Gpu, words: &[u32]) {
        gpu.queue()
            .write_buffer(&self.buffer, 0, words[..words.len().min(self.words)].as_bytes());
    }

    pub fn ensure_capacity(&mut self, gpu: &Gpu, node_capacity: usize) -> bool {
        let words = (node_capacity + 31) / 32;
        if words <= self.words {
            return false;
        }
        self.words = grown_capacity(self.words, words);
        self.buffer = Self::create(gpu, self.words);
        true
    }
}
