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
use gpu::Gpu;
use log::trace;
use std::mem;
use zerocopy::AsBytes;

const U32_SIZE: wgpu::BufferAddress = mem::size_of::<u32>() as wgpu::BufferAddress;

fn storage_buffer(gpu: &Gpu, label: &str, len: usize) -> wgpu::Buffer {
    gpu.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (len.max(1) as wgpu::BufferAddress) * U32_SIZE,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// GPU residence for edge topology: the `(source, target)` pair array the
/// edge vertex stage pulls from, plus forward and inverse CSR for the
/// spring passes.
#[derive(Debug)]
pub struct EdgeBuffer {
    endpoints: wgpu::Buffer,
    forward_offsets: wgpu::Buffer,
    forward_targets: wgpu::Buffer,
    inverse_offsets: wgpu::Buffer,
    inverse_sources: wgpu::Buffer,
    node_capacity: usize,
    edge_capacity: usize,
}

impl EdgeBuffer {
    pub fn new(gpu: &Gpu, node_capacity: usize, edge_capacity: usize) -> Self {
        let node_capacity = node_capacity.max(1);
        let edge_capacity = edge_capacity.max(1);
        Self {
            endpoints: storage_buffer(gpu, "hg-edge-endpoints", edge_capacity * 2),
            forward_offsets: storage_buffer(gpu, "hg-csr-offsets", node_capacity + 1),
            forward_targets: storage_buffer(gpu, "hg-csr-targets", edge_capacity),
            inverse_offsets: storage_buffer(gpu, "hg-csr-inverse-offsets", node_capacity + 1),
            inverse_sources: storage_buffer(gpu, "hg-csr-inverse-sources", edge_capacity),
            node_capacity,
            edge_capacity,
        }
    }

    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    pub fn edge_capacity(&self) -> usize {
        self.edge_capacity
    }

    pub fn endpoints(&self) -> &wgpu::Buffer {
        &self.endpoints
    }

    pub fn forward_offsets(&self) -> &wgpu::Buffer {
        &self.forward_offsets
    }

    pub fn forward_targets(&self) -> &wgpu::Buffer {
        &self.forward_targets
    }

    pub fn inverse_offsets(&self) -> &wgpu::Buffer {
        &self.inverse_offsets
    }

    pub fn inverse_sources(&self) -> &wgpu::Buffer {
        &self.inverse_sources
    }

    /// Patch `(source, target)` pairs starting at edge slot `offset`.
    pub fn upload_endpoints(&self, gpu: &Gpu, offset: usize, interleaved: &[u32]) {
        gpu.queue().write_buffer(
            &self.endpoints,
            offset as wgpu::BufferAddress * 2 * U32_SIZE,
            interleaved.as_bytes(),
        );
    }

    /// Upload a freshly rebuilt CSR. Lengths may be shorter than the buffer
    /// capacities; the kernels never read past the live counts.
    pub fn upload_csr(
        &self,
        gpu: &Gpu,
        offsets: &[u32],
        targets: &[u32],
        inverse_offsets: &[u32],
        inverse_sources: &[u32],
    ) {
        let queue = gpu.queue();
        queue.write_buffer(&self.forward_offsets, 0, offsets.as_bytes());
        if !targets.is_empty() {
            queue.write_buffer(&self.forward_targets, 0, targets.as_bytes());
        }
        queue.write_buffer(&self.inverse_offsets, 0, inverse_offsets.as_bytes());
        if !inverse_sources.is_empty() {
            queue.write_buffer(&self.inverse_sources, 0, inverse_sources.as_bytes());
        }
    }

    /// Re-create any buffer that can no longer hold the requested counts.
    /// Contents are not preserved: the caller re-uploads endpoints and CSR,
    /// which are already dirty whenever capacity changes. Returns true when
    /// bind groups must be rebuilt.
    pub fn ensure_capacity(&mut self, gpu: &Gpu, node_count: usize, edge_count: usize) -> bool {
        let mut recreated = false;
        if node_count > self.node_capacity {
            self.node_capacity = grown_capacity(self.node_capacity, node_count);
            trace!("edge buffer node capacity -> {}", self.node_capacity);
            self.forward_offsets = storage_buffer(gpu, "hg-csr-offsets", self.node_capacity + 1);
            self.inverse_offsets =
                storage_buffer(gpu, "hg-csr-inverse-offsets", self.node_capacity + 1);
            recreated = true;
        }
        if edge_count > self.edge_capacity {
            self.edge_capacity = grown_capacity(self.edge_capacity, edge_count);
            trace!("edge buffer edge capacity -> {}", self.edge_capacity);
            self.endpoints = storage_buffer(gpu, "hg-edge-endpoints", self.edge_capacity * 2);
            self.forward_targets = storage_buffer(gpu, "hg-csr-targets", self.edge_capacity);
            self.inverse_sources = storage_buffer(gpu, "hg-csr-inverse-sources", self.edge_capacity);
            recreated = true;
        }
        recreated
    }
}
