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
use log::trace;
use nalgebra::Matrix3;

#[derive(Clone, Debug)]
pub struct ViewportConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.01,
            max_scale: 100.0,
            pan_speed: 1.0,
            zoom_speed: 1.1,
        }
    }
}

/// Pan/zoom state over the graph plane.
///
/// `(x, y)` is the graph coordinate under the top-left corner of the screen;
/// `scale` is screen pixels per graph unit. Both coordinate systems are
/// y-down. Every mutation bumps `generation` so subscribers and the uniform
/// upload path can notice changes cheaply.
#[derive(Clone, Debug)]
pub struct Viewport {
    x: f32,
    y: f32,
    scale: f32,
    width: f32,
    height: f32,
    dpr: f32,
    config: ViewportConfig,
    generation: u64,
}

impl Viewport {
    pub fn new(width: f32, height: f32, dpr: f32, config: ViewportConfig) -> Self {
        let mut viewport = Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            width: width.max(1.0),
            height: height.max(1.0),
            dpr: dpr.max(0.1),
            config,
            generation: 0,
        };
        // Start with the graph origin centered.
        viewport.center_on(0.0, 0.0);
        viewport.generation = 0;
        viewport
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        self.width = width.max(1.0);
        self.height = height.max(1.0);
        self.generation += 1;
    }

    pub fn set_dpr(&mut self, dpr: f32) {
        self.dpr = dpr.max(0.1);
        self.generation += 1;
    }

    /// Pan by a screen-space delta: positive deltas drag the content with
    /// the pointer.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.x -= dx * self.config.pan_speed / self.scale;
        self.y -= dy * self.config.pan_speed / self.scale;
        self.generation += 1;
    }

    /// Multiply the scale by `factor`, keeping the graph point under screen
    /// position `(cx, cy)` fixed. The screen center is used when no anchor
    /// is given.
    pub fn zoom(&mut self, factor: f32, anchor: Option<(f32, f32)>) {
        let (cx, cy) = anchor.unwrap_or((self.width * 0.5, self.height * 0.5));
        let (gx, gy) = self.screen_to_graph(cx, cy);
        self.scale = (self.scale * factor).clamp(self.config.min_scale, self.config.max_scale);
        self.x = gx - cx / self.scale;
        self.y = gy - cy / self.scale;
        self.generation += 1;
    }

    pub fn center_on(&mut self, gx: f32, gy: f32) {
        self.x = gx - self.width * 0.5 / self.scale;
        self.y = gy - self.height * 0.5 / self.scale;
        self.generation += 1;
    }

    /// Frame the given graph-space bounds with `padding` screen pixels on
    /// every side.
    pub fn fit_to_bounds(&mut self, min_x: f32, min_y: f32, max_x: f32, max_y: f32, padding: f32) {
        let bounds_w = (max_x - min_x).max(1e-6);
        let bounds_h = (max_y - min_y).max(1e-6);
        let avail_w = (self.width - padding * 2.0).max(1.0);
        let avail_h = (self.height - padding * 2.0).max(1.0);
        self.scale = (avail_w / bounds_w)
            .min(avail_h / bounds_h)
            .clamp(self.config.min_scale, self.config.max_scale);
        trace!("fit_to_bounds scale {}", self.scale);
        self.center_on((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
    }

    pub fn screen_to_graph(&self, sx: f32, sy: f32) -> (f32, f32) {
        (self.x + sx / self.scale, self.y + sy / self.scale)
    }

    pub fn graph_to_screen(&self, gx: f32, gy: f32) -> (f32, f32) {
        ((gx - self.x) * self.scale, (gy - self.y) * self.scale)
    }

    /// Graph→clip matrix. Column-major; the uniform upload pads each column
    /// to a vec4.
    pub fn clip_matrix(&self) -> Matrix3<f32> {
        let sx = 2.0 * self.scale / self.width;
        let sy = 2.0 * self.scale / self.height;
        #[rustfmt::skip]
        let m = Matrix3::new(
            sx,  0.0, -self.x * sx - 1.0,
            0.0, -sy,  self.y * sy + 1.0,
            0.0, 0.0,  1.0,
        );
        m
    }

    /// The three matrix columns padded to vec4, ready for the viewport
    /// uniform block.
    pub fn clip_columns(&self) -> [[f32; 4]; 3] {
        let m = self.clip_matrix();
        [
            [m[(0, 0)], m[(1, 0)], m[(2, 0)], 0.0],
            [m[(0, 1)], m[(1, 1)], m[(2, 1)], 0.0],
            [m[(0, 2)], m[(1, 2)], m[(2, 2)], 0.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn random_viewport() -> Viewport {
        let mut viewport = Viewport::new(
            fastrand::f32() * 1000.0 + 100.0,
            fastrand::f32() * 1000.0 + 100.0,
            1.0 + fastrand::f32(),
            ViewportConfig::default(),
        );
        viewport.pan(fastrand::f32() * 500.0 - 250.0, fastrand::f32() * 500.0 - 250.0);
        viewport.zoom(0.1 + fastrand::f32() * 4.0, None);
        viewport
    }

    #[test]
    fn screen_graph_round_trips_within_tolerance() {
        fastrand::seed(42);
        for _ in 0..200 {
            let viewport = random_viewport();
            let (sx, sy) = (fastrand::f32() * 800.0, fastrand::f32() * 600.0);
            let (gx, gy) = viewport.screen_to_graph(sx, sy);
            let (rx, ry) = viewport.graph_to_screen(gx, gy);
            assert_abs_diff_eq!(rx, sx, epsilon = 1e-3);
            assert_abs_diff_eq!(ry, sy, epsilon = 1e-3);
        }
    }

    #[test]
    fn zoom_keeps_the_anchor_point_fixed() {
        fastrand::seed(17);
        for _ in 0..50 {
            let mut viewport = random_viewport();
            let anchor = (120.0, 340.0);
            let before = viewport.screen_to_graph(anchor.0, anchor.1);
            viewport.zoom(1.7, Some(anchor));
            let after = viewport.screen_to_graph(anchor.0, anchor.1);
            assert_abs_diff_eq!(before.0, after.0, epsilon = 1e-3);
            assert_abs_diff_eq!(before.1, after.1, epsilon = 1e-3);
        }
    }

    #[test]
    fn zoom_clamps_to_configured_range() {
        let mut viewport = Viewport::new(800.0, 600.0, 1.0, ViewportConfig::default());
        viewport.zoom(1e9, None);
        assert_abs_diff_eq!(viewport.scale(), viewport.config().max_scale);
        viewport.zoom(1e-9, None);
        assert_abs_diff_eq!(viewport.scale(), viewport.config().min_scale);
    }

    #[test]
    fn center_on_puts_the_point_mid_screen() {
        let mut viewport = Viewport::new(800.0, 600.0, 1.0, ViewportConfig::default());
        viewport.center_on(55.0, -20.0);
        let (gx, gy) = viewport.screen_to_graph(400.0, 300.0);
        assert_abs_diff_eq!(gx, 55.0, epsilon = 1e-4);
        assert_abs_diff_eq!(gy, -20.0, epsilon = 1e-4);
    }

    #[test]
    fn fit_to_bounds_contains_the_bounds() {
        let mut viewport = Viewport::new(800.0, 600.0, 1.0, ViewportConfig::default());
        viewport.fit_to_bounds(-100.0, -50.0, 300.0, 150.0, 40.0);
        for (gx, gy) in [(-100.0, -50.0), (300.0, 150.0), (100.0, 50.0)] {
            let (sx, sy) = viewport.graph_to_screen(gx, gy);
            assert!((0.0..=800.0).contains(&sx), "x {} escaped", sx);
            assert!((0.0..=600.0).contains(&sy), "y {} escaped", sy);
        }
    }

    #[test]
    fn clip_matrix_matches_the_scalar_transform() {
        fastrand::seed(3);
        for _ in 0..50 {
            let viewport = random_viewport();
            let (w, h) = viewport.size();
            let (gx, gy) = (fastrand::f32() * 200.0 - 100.0, fastrand::f32() * 200.0 - 100.0);
            let clip = viewport.clip_matrix() * Vector3::new(gx, gy, 1.0);
            let (sx, sy) = viewport.graph_to_screen(gx, gy);
            assert_abs_diff_eq!(clip.x, sx / w * 2.0 - 1.0, epsilon = 1e-3);
            assert_abs_diff_eq!(clip.y, 1.0 - sy / h * 2.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn mutations_bump_the_generation() {
        let mut viewport = Viewport::new(800.0, 600.0, 1.0, ViewportConfig::default());
        let g0 = viewport.generation();
        viewport.pan(1.0, 1.0);
        viewport.zoom(1.5, None);
        viewport.set_size(100.0, 100.0);
        assert_eq!(viewport.generation(), g0 + 3);
    }
}
