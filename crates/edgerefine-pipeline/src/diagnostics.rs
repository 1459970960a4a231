//! Edge matching overlays for inspecting a refinement run.

use anyhow::{Context, Result};
use edgerefine_core::{trace_line, Correspondence, LineSegment, Vec2};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

const MODEL_EDGE: Rgb<u8> = Rgb([0, 255, 0]);
const SEARCH_SEGMENT: Rgb<u8> = Rgb([0, 110, 0]);
const OBSERVED_EDGE: Rgb<u8> = Rgb([255, 40, 40]);
const MATCH: Rgb<u8> = Rgb([255, 255, 0]);

fn draw_line(img: &mut RgbImage, a: Vec2, b: Vec2, color: Rgb<u8>) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    trace_line(
        a.x.round() as i64,
        a.y.round() as i64,
        b.x.round() as i64,
        b.y.round() as i64,
        |x, y| {
            if x >= 0 && y >= 0 && x < w && y < h {
                img.put_pixel(x as u32, y as u32, color);
            }
        },
    );
}

fn draw_circle(img: &mut RgbImage, center: Vec2, radius: i64, color: Rgb<u8>) {
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (mut x, mut y, mut err) = (radius, 0i64, 1 - radius);
    while x >= y {
        for (dx, dy) in [
            (x, y),
            (y, x),
            (-y, x),
            (-x, y),
            (-x, -y),
            (-y, -x),
            (y, -x),
            (x, -y),
        ] {
            let (px, py) = (cx + dx, cy + dy);
            if px >= 0 && py >= 0 && px < w && py < h {
                img.put_pixel(px as u32, py as u32, color);
            }
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// Overlay of model edges, search segments, observed edges and matches on black.
pub fn edge_match_composite(
    width: u32,
    height: u32,
    model_edges: &[LineSegment],
    observed_edges: &[LineSegment],
    correspondence: &Correspondence,
) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for seg in correspondence.search_segments() {
        draw_line(&mut img, seg[0], seg[1], SEARCH_SEGMENT);
    }
    for e in model_edges {
        draw_line(&mut img, e.start(), e.end(), MODEL_EDGE);
    }
    for e in observed_edges {
        draw_line(&mut img, e.start(), e.end(), OBSERVED_EDGE);
    }
    for c in correspondence.matches() {
        draw_circle(&mut img, c.pixel, 2, MATCH);
    }
    img
}

/// `dir/frame_NNNNNN/it_NNN.png`
pub fn composite_path(dir: &Path, frame_index: usize, iteration: usize) -> PathBuf {
    dir.join(format!("frame_{frame_index:06}"))
        .join(format!("it_{iteration:03}.png"))
}

/// Write the composite for one frame and iteration below `dir`.
pub fn save_edge_match_composite(
    dir: &Path,
    frame_index: usize,
    iteration: usize,
    composite: &RgbImage,
) -> Result<PathBuf> {
    let path = composite_path(dir, frame_index, iteration);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    composite
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgerefine_core::{EdgeCorrespondence, EdgeSample, Pt3};

    #[test]
    fn composite_uses_distinct_layers() {
        let corr = Correspondence::new(vec![EdgeSample {
            search_segment: [Vec2::new(5.0, 10.0), Vec2::new(15.0, 10.0)],
            correspondence: Some(EdgeCorrespondence {
                pixel: Vec2::new(14.0, 10.0),
                world_point: Pt3::origin(),
                edge_id: 0,
                edge_normal: Vec2::new(1.0, 0.0),
            }),
        }]);
        let model = [LineSegment::new(10.0, 2.0, 10.0, 18.0)];
        let observed = [LineSegment::new(14.0, 2.0, 14.0, 18.0)];
        let img = edge_match_composite(24, 20, &model, &observed, &corr);

        assert_eq!(*img.get_pixel(10, 5), MODEL_EDGE);
        assert_eq!(*img.get_pixel(14, 5), OBSERVED_EDGE);
        assert_eq!(*img.get_pixel(7, 10), SEARCH_SEGMENT);
        assert_eq!(*img.get_pixel(16, 10), MATCH);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn composite_is_written_per_frame_and_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::new(8, 8);
        let path = save_edge_match_composite(dir.path(), 3, 7, &img).unwrap();
        assert_eq!(path, dir.path().join("frame_000003").join("it_007.png"));
        assert!(path.is_file());
    }
}
