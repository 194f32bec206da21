// Pixel buffer handed to the window.

#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// A black buffer of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    /// Copy `src` into this buffer with its top-left at row `y`.
    /// Rows or columns that don't fit are dropped.
    pub fn blit_rows(&mut self, src: &FrameBuffer, y: usize) {
        let w = self.width.min(src.width);
        for row in 0..src.height {
            let dst_row = y + row;
            if dst_row >= self.height {
                break;
            }
            let d = dst_row * self.width;
            let s = row * src.width;
            self.pixels[d..d + w].copy_from_slice(&src.pixels[s..s + w]);
        }
    }
}
