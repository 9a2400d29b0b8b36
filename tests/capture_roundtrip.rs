//! File-level round trips for the capture format.

use std::fs::File;
use std::io::BufWriter;

use lumina::render_system::capture::ppm;

fn gradient_bgra(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 3 + y) as u8); // b
            data.push((x * 5 + y * 7) as u8); // g
            data.push((x + y * 11) as u8); // r
            data.push(255); // a
        }
    }
    data
}

#[test]
fn written_file_reads_back_and_reencodes_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.ppm");
    let source = gradient_bgra(16, 9);

    {
        let mut file = BufWriter::new(File::create(&path).unwrap());
        ppm::encode(&mut file, 16, 9, &source, 16 * 4, true).unwrap();
    }

    let (width, height, pixels) = ppm::read(&path).unwrap();
    assert_eq!((width, height), (16, 9));
    assert_eq!(pixels.len(), 16 * 9 * 3);

    // the reversed-channel source was swizzled into RGB order on write
    for (pixel, bgra) in pixels.chunks_exact(3).zip(source.chunks_exact(4)) {
        assert_eq!(pixel, [bgra[2], bgra[1], bgra[0]]);
    }

    // encoding the same source again reproduces the file byte for byte
    let mut first = Vec::new();
    ppm::encode(&mut first, 16, 9, &source, 16 * 4, true).unwrap();
    let mut second = Vec::new();
    ppm::encode(&mut second, 16, 9, &source, 16 * 4, true).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, std::fs::read(&path).unwrap());
}

#[test]
fn blit_style_capture_is_written_without_swizzle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgba.ppm");
    // a blit already produced RGBA ordering, so no swizzle is applied
    let source = [10, 20, 30, 255, 40, 50, 60, 255];

    {
        let mut file = BufWriter::new(File::create(&path).unwrap());
        ppm::encode(&mut file, 2, 1, &source, 8, false).unwrap();
    }

    let (_, _, pixels) = ppm::read(&path).unwrap();
    assert_eq!(pixels, [10, 20, 30, 40, 50, 60]);
}
