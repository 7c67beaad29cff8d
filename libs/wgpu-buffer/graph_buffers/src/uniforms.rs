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
use static_assertions::const_assert_eq;
use std::mem;
use zerocopy::{AsBytes, FromBytes};

/// Simulation parameters; exactly 12 little-endian f32 in this order.
/// Counts ride along as floats so the block stays homogeneous.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct SimUniformData {
    pub repulsion: f32,
    pub attraction: f32,
    pub gravity: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub link_distance: f32,
    pub theta: f32,
    pub alpha: f32,
    pub velocity_decay: f32,
    pub node_count: f32,
    pub edge_count: f32,
    pub dt: f32,
}
const_assert_eq!(mem::size_of::<SimUniformData>(), 48);

impl Default for SimUniformData {
    fn default() -> Self {
        Self {
            repulsion: 30.0,
            attraction: 0.2,
            gravity: 0.05,
            center_x: 0.0,
            center_y: 0.0,
            link_distance: 60.0,
            theta: 1.0,
            alpha: 0.0,
            velocity_decay: 0.6,
            node_count: 0.0,
            edge_count: 0.0,
            dt: 1.0,
        }
    }
}

/// Graph→clip matrix columns (vec4-padded) followed by screen scalars.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct ViewportUniformData {
    pub columns: [[f32; 4]; 3],
    pub screen_width: f32,
    pub screen_height: f32,
    pub scale: f32,
    pub inv_scale: f32,
    pub dpr: f32,
    pub pad: [f32; 3],
}
const_assert_eq!(mem::size_of::<ViewportUniformData>(), 80);

impl Default for ViewportUniformData {
    fn default() -> Self {
        Self {
            columns: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            screen_width: 1.0,
            screen_height: 1.0,
            scale: 1.0,
            inv_scale: 1.0,
            dpr: 1.0,
            pad: [0.0; 3],
        }
    }
}

/// Node/edge styling shared by the render pipelines: selection ring, hover
/// brightening, border, and the birth-pulse animation clock.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct RenderConfigData {
    pub selection_color: [f32; 4],
    pub selection_ring_width: f32,
    pub hover_brightness: f32,
    pub border_enabled: f32,
    pub border_width: f32,
    pub border_color: [f32; 4],
    pub clock: f32,
    pub pulse_duration: f32,
    pub pulse_ring_width: f32,
    pub pulse_brightness: f32,
}
const_assert_eq!(mem::size_of::<RenderConfigData>(), 64);

impl Default for RenderConfigData {
    fn default() -> Self {
        Self {
            selection_color: [1.0, 0.78, 0.16, 1.0],
            selection_ring_width: 2.5,
            hover_brightness: 1.25,
            border_enabled: 0.0,
            border_width: 1.0,
            border_color: [0.0, 0.0, 0.0, 1.0],
            clock: 0.0,
            pulse_duration: 0.6,
            pulse_ring_width: 6.0,
            pulse_brightness: 0.8,
        }
    }
}

/// One PWM flow layer. Color is kept as four scalars so the record packs to
/// twelve floats with no implicit vec4 alignment padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct EdgeFlowLayer {
    pub enabled: f32,
    pub pulse_width: f32,
    pub pulse_count: f32,
    pub speed: f32,
    pub wave_shape: f32,
    pub brightness: f32,
    pub fade: f32,
    pub color_r: f32,
    pub color_g: f32,
    pub color_b: f32,
    pub color_a: f32,
    pub has_color: f32,
}
const_assert_eq!(mem::size_of::<EdgeFlowLayer>(), 48);

impl Default for EdgeFlowLayer {
    fn default() -> Self {
        Self {
            enabled: 0.0,
            pulse_width: 0.3,
            pulse_count: 2.0,
            speed: 1.0,
            wave_shape: 0.0,
            brightness: 1.0,
            fade: 0.5,
            color_r: 1.0,
            color_g: 1.0,
            color_b: 1.0,
            color_a: 1.0,
            has_color: 0.0,
        }
    }
}

/// Two flow layers, the animation time, and a reserved tail vec4 that pads
/// the block to 128 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, AsBytes, FromBytes)]
pub struct EdgeFlowData {
    pub layers: [EdgeFlowLayer; 2],
    pub time: f32,
    pub time_pad: [f32; 3],
    pub reserved: [f32; 4],
}
const_assert_eq!(mem::size_of::<EdgeFlowData>(), 128);

/// A uniform block plus its CPU shadow and a dirty flag; the frame loop
/// calls [UniformBuffer::upload_if_dirty] once before encoding.
#[derive(Debug)]
pub struct UniformBuffer<T: AsBytes + Copy> {
    buffer: wgpu::Buffer,
    value: T,
    dirty: bool,
}

impl<T: AsBytes + Copy> UniformBuffer<T> {
    pub fn new(gpu: &Gpu, label: &str, value: T) -> Self {
        let buffer = gpu.push_data(
            label,
            &value,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        Self {
            buffer,
            value,
            dirty: false,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    pub fn modify(&mut self, apply: impl FnOnce(&mut T)) {
        apply(&mut self.value);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn upload_if_dirty(&mut self, gpu: &Gpu) -> bool {
        if !self.dirty {
            return false;
        }
        gpu.queue().write_buffer(&self.buffer, 0, self.value.as_bytes());
        self.dirty = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_match_the_wire_layout() {
        assert_eq!(mem::size_of::<SimUniformData>(), 12 * 4);
        assert_eq!(mem::size_of::<ViewportUniformData>(), 80);
        assert_eq!(mem::size_of::<RenderConfigData>(), 64);
        assert_eq!(mem::size_of::<EdgeFlowLayer>(), 12 * 4);
        assert_eq!(mem::size_of::<EdgeFlowData>(), 128);
    }

    #[test]
    fn sim_uniform_field_order_is_stable() {
        let data = SimUniformData {
            repulsion: 1.0,
            attraction: 2.0,
            gravity: 3.0,
            center_x: 4.0,
            center_y: 5.0,
            link_distance: 6.0,
            theta: 7.0,
            alpha: 8.0,
            velocity_decay: 9.0,
            node_count: 10.0,
            edge_count: 11.0,
            dt: 12.0,
        };
        let bytes = data.as_bytes();
        for (i, expected) in (1..=12).enumerate() {
            let word = f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(word, expected as f32);
        }
    }

    #[test]
    fn edge_flow_color_lands_at_float_seven() {
        let mut layer = EdgeFlowLayer::default();
        layer.color_r = 0.25;
        let bytes = layer.as_bytes();
        let word = f32::from_le_bytes(bytes[7 * 4..8 * 4].try_into().unwrap());
        assert_eq!(word, 0.25);
    }
}
