//! Scene directories on disk: camera poses, RGB-D images and object poses.
//!
//! Layout:
//!
//! ```text
//! scene_dir/
//!   camera_poses.txt            blocks of an index line and four matrix rows
//!   images/rgb/*.png            color frames
//!   images/depth/*.png          16-bit depth in millimeters, same file names
//!   object_poses/NNNNNN.txt     initial 4x4 model pose per model id
//!   refined_object_poses/       written by `write_refined_poses`
//! ```

use crate::frames::FrameSource;
use crate::ModelId;
use anyhow::{bail, ensure, Context, Result};
use edgerefine_core::{iso3_from_mat4, DepthImage, GrayImage, Iso3, Mat4, Real};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Millimeter depth PNGs are converted to meters with this factor.
pub const DEPTH_PNG_SCALE: f32 = 0.001;

const REFINED_POSES_DIR: &str = "refined_object_poses";

/// Parse `rows * cols` whitespace-separated numbers in row-major order.
pub fn parse_matrix_text(text: &str, rows: usize, cols: usize) -> Result<Vec<Real>> {
    let values = text
        .split_whitespace()
        .map(|tok| {
            tok.parse::<Real>()
                .with_context(|| format!("invalid number {tok:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(
        values.len() == rows * cols,
        "expected {} values for a {rows}x{cols} matrix, found {}",
        rows * cols,
        values.len()
    );
    Ok(values)
}

fn parse_pose(text: &str) -> Result<Iso3> {
    let values = parse_matrix_text(text, 4, 4)?;
    iso3_from_mat4(&Mat4::from_row_slice(&values))
}

/// Read a pose stored as four rows of four numbers.
pub fn read_pose_file(path: &Path) -> Result<Iso3> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading pose {}", path.display()))?;
    parse_pose(&text).with_context(|| format!("parsing pose {}", path.display()))
}

/// Write a pose as four rows of four numbers.
pub fn write_pose_file(path: &Path, pose: &Iso3) -> Result<()> {
    let m = pose.to_homogeneous();
    let mut text = String::new();
    for r in 0..4 {
        let row: Vec<String> = (0..4).map(|c| format!("{:.12}", m[(r, c)])).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    fs::write(path, text).with_context(|| format!("writing pose {}", path.display()))
}

/// Parse a camera pose list: every pose is an index line followed by four
/// matrix rows. Blank lines are ignored.
pub fn parse_camera_poses(text: &str) -> Result<Vec<Iso3>> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    ensure!(
        lines.len() % 5 == 0,
        "camera pose list has {} non-empty lines, expected blocks of 5",
        lines.len()
    );
    lines
        .chunks(5)
        .enumerate()
        .map(|(i, block)| {
            parse_pose(&block[1..].join("\n"))
                .with_context(|| format!("camera pose block {i} ({})", block[0]))
        })
        .collect()
}

pub fn read_camera_poses(path: &Path) -> Result<Vec<Iso3>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading camera poses {}", path.display()))?;
    parse_camera_poses(&text)
}

/// Color and depth file of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbdFile {
    pub rgb: PathBuf,
    pub depth: PathBuf,
}

fn png_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_owned());
            }
        }
    }
    Ok(names)
}

/// Pair `rgb_dir` and `depth_dir` images by identical file name, sorted.
pub fn list_rgbd_files(rgb_dir: &Path, depth_dir: &Path) -> Result<Vec<RgbdFile>> {
    let rgb = png_names(rgb_dir)?;
    let depth = png_names(depth_dir)?;
    Ok(rgb
        .intersection(&depth)
        .map(|name| RgbdFile {
            rgb: rgb_dir.join(name),
            depth: depth_dir.join(name),
        })
        .collect())
}

/// Frames stored as PNG files, decoded on demand.
#[derive(Debug, Clone)]
pub struct RgbdSequence {
    files: Vec<RgbdFile>,
    camera_poses: Vec<Iso3>,
    depth_scale: f32,
}

impl RgbdSequence {
    pub fn new(files: Vec<RgbdFile>, camera_poses: Vec<Iso3>) -> Result<Self> {
        ensure!(
            files.len() == camera_poses.len(),
            "{} RGB-D frames but {} camera poses",
            files.len(),
            camera_poses.len()
        );
        Ok(Self {
            files,
            camera_poses,
            depth_scale: DEPTH_PNG_SCALE,
        })
    }

    pub fn files(&self) -> &[RgbdFile] {
        &self.files
    }
}

impl FrameSource for RgbdSequence {
    fn num_frames(&self) -> usize {
        self.files.len()
    }

    fn camera_pose(&self, index: usize) -> Iso3 {
        self.camera_poses[index]
    }

    fn depth(&self, index: usize) -> Result<DepthImage> {
        let path = &self.files[index].depth;
        let img = image::open(path)
            .with_context(|| format!("decoding depth {}", path.display()))?
            .into_luma16();
        let (w, h) = img.dimensions();
        let scale = self.depth_scale;
        let data = img.into_raw().into_iter().map(|d| d as f32 * scale).collect();
        DepthImage::from_vec(w as usize, h as usize, data)
    }

    fn grayscale(&self, index: usize) -> Result<GrayImage> {
        let path = &self.files[index].rgb;
        let img = image::open(path)
            .with_context(|| format!("decoding color {}", path.display()))?
            .into_luma8();
        let (w, h) = img.dimensions();
        GrayImage::from_vec(w as usize, h as usize, img.into_raw())
    }
}

/// Initial model poses and the frames to refine them against.
#[derive(Debug, Clone)]
pub struct RefinementInput<F> {
    pub model_poses: BTreeMap<ModelId, Iso3>,
    pub frames: F,
}

fn pose_file_name(model_id: ModelId) -> String {
    format!("{model_id:06}.txt")
}

/// Initial poses from `object_poses/`: the requested ids, or every
/// `NNNNNN.txt` present when `model_ids` is `None`.
///
/// Requested ids without a pose file are skipped with a warning.
pub fn read_model_poses(
    object_poses_dir: &Path,
    model_ids: Option<&[ModelId]>,
) -> Result<BTreeMap<ModelId, Iso3>> {
    let mut files = BTreeMap::new();
    match model_ids {
        Some(ids) => {
            for &id in ids {
                let path = object_poses_dir.join(pose_file_name(id));
                if path.is_file() {
                    files.insert(id, path);
                } else {
                    warn!("no pose file for model {id} in {}", object_poses_dir.display());
                }
            }
        }
        None => {
            let entries = fs::read_dir(object_poses_dir)
                .with_context(|| format!("listing {}", object_poses_dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let id: ModelId = stem.parse().with_context(|| {
                    format!("pose file name {} is not a model id", path.display())
                })?;
                files.insert(id, path);
            }
        }
    }
    files
        .into_iter()
        .map(|(id, path)| Ok((id, read_pose_file(&path)?)))
        .collect()
}

/// Load a scene directory.
pub fn load_scene(
    scene_dir: &Path,
    model_ids: Option<&[ModelId]>,
) -> Result<RefinementInput<RgbdSequence>> {
    let images = scene_dir.join("images");
    let (rgb_dir, depth_dir) = (images.join("rgb"), images.join("depth"));
    for dir in [&rgb_dir, &depth_dir] {
        if !dir.is_dir() {
            bail!("missing image directory {}", dir.display());
        }
    }
    let files = list_rgbd_files(&rgb_dir, &depth_dir)?;
    let camera_poses = read_camera_poses(&scene_dir.join("camera_poses.txt"))?;
    let frames = RgbdSequence::new(files, camera_poses)?;
    let model_poses = read_model_poses(&scene_dir.join("object_poses"), model_ids)?;
    info!(
        "scene {}: {} frames, {} models",
        scene_dir.display(),
        frames.num_frames(),
        model_poses.len()
    );
    Ok(RefinementInput {
        model_poses,
        frames,
    })
}

/// Write `refined_object_poses/NNNNNN.txt` under `scene_dir`.
pub fn write_refined_poses(scene_dir: &Path, poses: &BTreeMap<ModelId, Iso3>) -> Result<PathBuf> {
    let dir = scene_dir.join(REFINED_POSES_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    for (&id, pose) in poses {
        write_pose_file(&dir.join(pose_file_name(id)), pose)?;
    }
    Ok(dir)
}
