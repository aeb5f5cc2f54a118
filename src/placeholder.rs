//! Synthesizes the stand-in image emitted in place of a hi-res file the
//! engine could not use (spec §7): 320×240, CMYK, magenta field,
//! a black corner-to-corner X, and two centered bars standing in for the
//! message text (no font rasterizer is part of this stack, so the text
//! lines are stylized rather than rendered glyphs).

use crate::model::{PixelMode, RasterImage};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

pub fn synthesize() -> RasterImage {
    let mut data = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    let slope = HEIGHT as i64 * 1000 / WIDTH as i64;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let idx = ((y * WIDTH + x) * 4) as usize;
            data[idx] = 0; // C
            data[idx + 1] = 255; // M
            data[idx + 2] = 255; // Y
            data[idx + 3] = 0; // K

            let expected = x as i64 * slope / 1000;
            let on_down_diagonal = (y as i64 - expected).abs() < 2;
            let on_up_diagonal = (y as i64 - (HEIGHT as i64 - 1 - expected)).abs() < 2;

            let in_text_band_1 = (HEIGHT / 2 - 14..HEIGHT / 2 - 4).contains(&y);
            let in_text_band_2 = (HEIGHT / 2 + 4..HEIGHT / 2 + 14).contains(&y);
            let in_text_columns = x > WIDTH / 8 && x < WIDTH * 7 / 8;

            if on_down_diagonal || on_up_diagonal || ((in_text_band_1 || in_text_band_2) && in_text_columns) {
                data[idx..idx + 4].copy_from_slice(&[0, 0, 0, 255]); // black
            }
        }
    }
    RasterImage { mode: PixelMode::Cmyk, width: WIDTH, height: HEIGHT, data, dpi: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_320x240_cmyk() {
        let img = synthesize();
        assert_eq!((img.width, img.height), (320, 240));
        assert_eq!(img.mode, PixelMode::Cmyk);
        assert_eq!(img.data.len(), 320 * 240 * 4);
    }

    #[test]
    fn background_outside_marks_is_magenta() {
        let img = synthesize();
        // A pixel well clear of both diagonals and the text bars.
        let x = 10u32;
        let y = 10u32;
        let idx = ((y * WIDTH + x) * 4) as usize;
        assert_eq!(&img.data[idx..idx + 4], &[0, 255, 255, 0]);
    }
}
