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
use gpu::Gpu;
use log::trace;

/// Two storage buffers of identical layout plus a selector naming the
/// current read side. Compute passes read one side and write the other,
/// then [PingPongBuffer::swap] flips the selector after submit.
#[derive(Debug)]
pub struct PingPongBuffer {
    label: String,
    buffers: [wgpu::Buffer; 2],
    read_index: usize,
    size: wgpu::BufferAddress,
    usage: wgpu::BufferUsages,
}

impl PingPongBuffer {
    pub fn new(gpu: &Gpu, label: &str, size: wgpu::BufferAddress) -> Self {
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let buffers = [
            Self::create(gpu, label, 0, size, usage),
            Self::create(gpu, label, 1, size, usage),
        ];
        Self {
            label: label.to_owned(),
            buffers,
            read_index: 0,
            size,
            usage,
        }
    }

    fn create(
        gpu: &Gpu,
        label: &str,
        side: usize,
        size: wgpu::BufferAddress,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}-{}", label, side)),
            size: size.max(4),
            usage,
            mapped_at_creation: false,
        })
    }

    pub fn size(&self) -> wgpu::BufferAddress {
        self.size
    }

    /// Which side is currently read: 0 or 1. Bind groups are usually built
    /// per parity so swapping costs nothing.
    pub fn parity(&self) -> usize {
        self.read_index
    }

    pub fn read(&self) -> &wgpu::Buffer {
        &self.buffers[self.read_index]
    }

    pub fn write(&self) -> &wgpu::Buffer {
        &self.buffers[1 - self.read_index]
    }

    /// Raw side accessor for parity-indexed bind groups.
    pub fn side(&self, index: usize) -> &wgpu::Buffer {
        &self.buffers[index]
    }

    pub fn swap(&mut self) {
        self.read_index = 1 - self.read_index;
    }

    pub fn write_to_read(&self, gpu: &Gpu, offset: wgpu::BufferAddress, bytes: &[u8]) {
        gpu.queue().write_buffer(self.read(), offset, bytes);
    }

    /// Write the same bytes to both sides; used for host-side position
    /// patches that must survive the next swap without a one-frame flicker.
    pub fn write_both(&self, gpu: &Gpu, offset: wgpu::BufferAddress, bytes: &[u8]) {
        gpu.queue().write_buffer(&self.buffers[0], offset, bytes);
        gpu.queue().write_buffer(&self.buffers[1], offset, bytes);
    }

    pub fn copy_read_to_write(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(self.read(), 0, self.write(), 0, self.size);
    }

    /// Re-create both sides at `new_size`, preserving contents up to
    /// `min(old, new)` via buffer-to-buffer copies recorded on `encoder`.
    pub fn resize(
        &mut self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        new_size: wgpu::BufferAddress,
        preserve: bool,
    ) {
        if new_size == self.size {
            return;
        }
        trace!("{}: resize {} -> {}", self.label, self.size, new_size);
        let replacement = [
            Self::create(gpu, &self.label, 0, new_size, self.usage),
            Self::create(gpu, &self.label, 1, new_size, self.usage),
        ];
        if preserve {
            let copy_size = self.size.min(new_size);
            for side in 0..2 {
                encoder.copy_buffer_to_buffer(
                    &self.buffers[side],
                    0,
                    &replacement[side],
                    0,
                    copy_size,
                );
            }
        }
        self.buffers = replacement;
        self.size = new_size;
    }
}
