//! Face alignment via 4-DOF similarity transform.
//!
//! Maps five detected landmarks onto canonical positions and warps the
//! face into a 128×128 crop. The canonical table and the output size
//! must match the embedding network's training-time preprocessing
//! exactly; the whole pipeline is threshold-sensitive, so alignment is
//! fully deterministic.

use crate::types::GrayFrame;
use thiserror::Error;

/// Canonical landmark positions for a 96×112 reference face
/// (left eye, right eye, nose, left mouth, right mouth).
const REFERENCE_LANDMARKS_96X112: [(f32, f32); 5] = [
    (30.2946, 51.6963),
    (65.5318, 51.5014),
    (48.0252, 71.7366),
    (33.5493, 92.3655),
    (62.7299, 92.2041),
];

/// Side length of the aligned output crop.
pub const ALIGNED_SIZE: usize = 128;

/// Denominators below this are treated as degenerate geometry.
const DEGENERATE_EPS: f32 = 1e-8;

#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("degenerate landmark geometry — fewer than two independent points")]
    DegenerateLandmarks,
}

/// Canonical landmark table rescaled from the 96×112 reference face to
/// the 128×128 output crop.
pub fn reference_landmarks() -> [(f32, f32); 5] {
    let sx = ALIGNED_SIZE as f32 / 96.0;
    let sy = ALIGNED_SIZE as f32 / 112.0;
    REFERENCE_LANDMARKS_96X112.map(|(x, y)| (x * sx, y * sy))
}

/// Estimate the least-squares similarity transform (uniform scale +
/// rotation + translation) mapping `src` onto `dst`.
///
/// Closed form over the centered point sets: with `u, v` the centered
/// source and `p, q` the centered destination coordinates,
///
/// ```text
/// a = Σ(u·p + v·q) / Σ(u² + v²)
/// b = Σ(u·q − v·p) / Σ(u² + v²)
/// ```
///
/// Returns `[a, -b, tx, b, a, ty]` representing the 2×3 matrix
///
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
///
/// Fails when the source points are (numerically) coincident — there is
/// no fallback, since a silently approximated transform would feed the
/// matcher garbage without any error surfacing.
pub fn estimate_similarity(
    src: &[(f32, f32); 5],
    dst: &[(f32, f32); 5],
) -> Result<[f32; 6], AlignmentError> {
    let n = src.len() as f32;

    let (mut sx_mean, mut sy_mean, mut dx_mean, mut dy_mean) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for i in 0..src.len() {
        sx_mean += src[i].0;
        sy_mean += src[i].1;
        dx_mean += dst[i].0;
        dy_mean += dst[i].1;
    }
    sx_mean /= n;
    sy_mean /= n;
    dx_mean /= n;
    dy_mean /= n;

    let mut numer_a = 0.0f32;
    let mut numer_b = 0.0f32;
    let mut denom = 0.0f32;
    for i in 0..src.len() {
        let u = src[i].0 - sx_mean;
        let v = src[i].1 - sy_mean;
        let p = dst[i].0 - dx_mean;
        let q = dst[i].1 - dy_mean;
        numer_a += u * p + v * q;
        numer_b += u * q - v * p;
        denom += u * u + v * v;
    }

    if denom < DEGENERATE_EPS {
        return Err(AlignmentError::DegenerateLandmarks);
    }

    let a = numer_a / denom;
    let b = numer_b / denom;
    let tx = dx_mean - a * sx_mean + b * sy_mean;
    let ty = dy_mean - b * sx_mean - a * sy_mean;

    Ok([a, -b, tx, b, a, ty])
}

/// Apply a 2×3 similarity matrix to warp `frame` into a square output
/// crop of `out_size` pixels per side.
///
/// Inverse mapping with bilinear interpolation; reads outside the source
/// frame are zero.
fn warp_affine(frame: &GrayFrame, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);
    let width = frame.width as i32;
    let height = frame.height as i32;

    // Inverse of the 2×2 part [[a, -b], [b, a]]: (1/det) [[a, b], [-b, a]]
    let det = a * a + b * b;
    let ia = a / det;
    let ib = b / det;

    let mut out = vec![0u8; out_size * out_size];

    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && x < width && y >= 0 && y < height {
            frame.data[y as usize * frame.width as usize + x as usize] as f32
        } else {
            0.0
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = ia * dy - ib * dx;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            out[oy * out_size + ox] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Align a detected face to the canonical 128×128 crop.
///
/// Estimates the similarity transform from the detected landmarks to the
/// rescaled canonical table and warps the face region accordingly.
pub fn align_face(
    frame: &GrayFrame,
    landmarks: &[(f32, f32); 5],
) -> Result<Vec<u8>, AlignmentError> {
    let matrix = estimate_similarity(landmarks, &reference_landmarks())?;
    // a = b = 0 collapses the warp to a single source sample; reject it
    // the same way as coincident landmarks.
    if matrix[0] * matrix[0] + matrix[3] * matrix[3] < DEGENERATE_EPS {
        return Err(AlignmentError::DegenerateLandmarks);
    }
    Ok(warp_affine(frame, &matrix, ALIGNED_SIZE))
}
