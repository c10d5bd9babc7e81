// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The shadow graphics device (§3, §5): an in-process RGBA surface the
//! rendering engine paints into on the faux-GUI thread. Nothing else may
//! touch it — the session thread only ever reads out finished frames
//! through [`ShadowDevice::snapshot`].

use crate::collaborators::rendering::{Rect, Size};

/// A fixed-format RGBA8 backing store plus the dirty region accumulated
/// since the last [`ShadowDevice::take_dirty`].
pub struct ShadowDevice {
    size: Size,
    pixels: Vec<u8>,
    dirty: Option<Rect>,
}

impl ShadowDevice {
    pub fn new(size: Size) -> Self {
        Self {
            pixels: vec![0; Self::byte_len(size)],
            size,
            dirty: None,
        }
    }

    fn byte_len(size: Size) -> usize {
        size.width as usize * size.height as usize * 4
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Resizes the surface, discarding its contents and marking the whole
    /// area dirty (§4.9 `SizeChange`).
    pub fn resize(&mut self, size: Size) {
        self.size = size;
        self.pixels = vec![0; Self::byte_len(size)];
        self.mark_dirty(None);
    }

    /// Marks `area` dirty, or the whole surface when `area` is `None`.
    /// Successive marks accumulate into the smallest enclosing rect.
    pub fn mark_dirty(&mut self, area: Option<Rect>) {
        let area = area.unwrap_or(Rect {
            origin: crate::collaborators::rendering::Point { x: 0, y: 0 },
            size: self.size,
        });
        self.dirty = Some(match self.dirty.take() {
            Some(existing) => union_rect(existing, area),
            None => area,
        });
    }

    /// Writes a single pixel, clamped silently to bounds (painters never
    /// need to bounds-check themselves).
    pub fn put_pixel(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x as u32 >= self.size.width || y as u32 >= self.size.height {
            return;
        }
        let idx = (y as usize * self.size.width as usize + x as usize) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&rgba);
    }

    /// Returns the whole backing buffer as an immutable RGBA8 snapshot.
    pub fn snapshot(&self) -> &[u8] {
        &self.pixels
    }

    /// Takes and clears the accumulated dirty rect.
    pub fn take_dirty(&mut self) -> Option<Rect> {
        self.dirty.take()
    }
}

fn union_rect(a: Rect, b: Rect) -> Rect {
    use crate::collaborators::rendering::Point;
    let x0 = a.origin.x.min(b.origin.x);
    let y0 = a.origin.y.min(b.origin.y);
    let x1 = (a.origin.x + a.size.width as i32).max(b.origin.x + b.size.width as i32);
    let y1 = (a.origin.y + a.size.height as i32).max(b.origin.y + b.size.height as i32);
    Rect {
        origin: Point { x: x0, y: y0 },
        size: Size {
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::rendering::Point;

    #[test]
    fn resize_clears_and_marks_whole_surface_dirty() {
        let mut device = ShadowDevice::new(Size { width: 4, height: 4 });
        device.put_pixel(1, 1, [255, 0, 0, 255]);
        device.resize(Size { width: 2, height: 2 });
        assert_eq!(device.snapshot().len(), 2 * 2 * 4);
        let dirty = device.take_dirty().unwrap();
        assert_eq!(dirty.size, Size { width: 2, height: 2 });
    }

    #[test]
    fn dirty_rects_accumulate_as_union() {
        let mut device = ShadowDevice::new(Size { width: 100, height: 100 });
        device.mark_dirty(Some(Rect {
            origin: Point { x: 0, y: 0 },
            size: Size { width: 10, height: 10 },
        }));
        device.mark_dirty(Some(Rect {
            origin: Point { x: 20, y: 20 },
            size: Size { width: 5, height: 5 },
        }));
        let dirty = device.take_dirty().unwrap();
        assert_eq!(dirty.origin, Point { x: 0, y: 0 });
        assert_eq!(dirty.size, Size { width: 25, height: 25 });
        assert!(device.take_dirty().is_none());
    }

    #[test]
    fn put_pixel_out_of_bounds_is_ignored() {
        let mut device = ShadowDevice::new(Size { width: 2, height: 2 });
        device.put_pixel(-1, 0, [1, 2, 3, 4]);
        device.put_pixel(5, 5, [1, 2, 3, 4]);
        assert_eq!(device.snapshot(), &[0u8; 16][..]);
    }
}
