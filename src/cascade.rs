//! Cascaded Shadow Map Math
//!
//! Pure functions behind the directional-light stage: frustum splitting,
//! world-space corner extraction, light-space bounds, and the crop/bias
//! matrices that focus each cascade's orthographic projection onto its
//! frustum slice.
//!
//! All matrices are column-major `glam` matrices applied as `M * v`. The
//! full per-cascade sampling matrix composes as
//! `bias * base_projection * crop * light_view`.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of shadow cascades. Fixed at compile time; arrays throughout the
/// shadow stage are sized by it.
pub const CASCADE_COUNT: usize = 4;

/// Far planes extend slightly past the next cascade's near plane so the
/// sampling shader can blend across the seam.
pub const SPLIT_OVERLAP: f32 = 1.005;

/// Scale quantization step used for cascade stabilization.
const QUANTIZER: f32 = 64.0;

/// Splits `[near, far]` into [`CASCADE_COUNT`] overlapping slices.
///
/// Returns `[near0, far0, near1, far1, ...]`. `lambda` blends between a
/// uniform distribution (`0.0`) and a logarithmic one (`1.0`). Interior
/// fars overlap the following near by [`SPLIT_OVERLAP`].
#[must_use]
pub fn split_frustum(near: f32, far: f32, lambda: f32) -> [f32; CASCADE_COUNT * 2] {
    let ratio = far / near;
    let num_slices = CASCADE_COUNT * 2;
    let num_slices_f = num_slices as f32;

    let mut splits = [0.0f32; CASCADE_COUNT * 2];
    splits[0] = near;

    let (mut nn, mut ff) = (2usize, 1usize);
    while nn < num_slices {
        let si = ff as f32 / num_slices_f;
        let nearp = lambda * (near * ratio.powf(si)) + (1.0 - lambda) * (near + (far - near) * si);
        splits[nn] = nearp;
        splits[ff] = nearp * SPLIT_OVERLAP;
        nn += 2;
        ff += 2;
    }

    splits[num_slices - 1] = far;
    splits
}

/// World-space corners of the camera frustum slice between `near` and
/// `far`.
///
/// `proj_width`/`proj_height` are the frustum half-extents at unit view
/// distance (the reciprocals of the projection diagonal). Corners come out
/// near plane first, counter-clockwise from top-left.
#[must_use]
pub fn frustum_corners_world(
    near: f32,
    far: f32,
    proj_width: f32,
    proj_height: f32,
    inv_view: &Mat4,
) -> [Vec3; 8] {
    let nw = near * proj_width;
    let nh = near * proj_height;
    let fw = far * proj_width;
    let fh = far * proj_height;

    let view_space = [
        Vec3::new(-nw, nh, near),
        Vec3::new(nw, nh, near),
        Vec3::new(nw, -nh, near),
        Vec3::new(-nw, -nh, near),
        Vec3::new(-fw, fh, far),
        Vec3::new(fw, fh, far),
        Vec3::new(fw, -fh, far),
        Vec3::new(-fw, -fh, far),
    ];
    view_space.map(|corner| inv_view.transform_point3(corner))
}

/// View matrix looking from the light direction towards the origin.
///
/// The light is directional, so only the rotation matters; the eye point is
/// the direction itself. Falls back to an X-axis up vector when the light
/// shines straight up or down.
#[must_use]
pub fn light_view_matrix(light_direction: Vec3) -> Mat4 {
    let eye = light_direction.normalize_or_zero();
    if eye == Vec3::ZERO {
        return Mat4::IDENTITY;
    }
    let up = if eye.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    Mat4::look_at_lh(eye, Vec3::ZERO, up)
}

/// Symmetric unit orthographic projection covering `[-far, far]` in depth,
/// with X and Y mirrored to match shadow-map texture orientation. The crop
/// matrix scales and offsets this onto the cascade's slice.
#[must_use]
pub fn base_projection(far: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(-1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -1.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0 / (2.0 * far), 0.0),
        Vec4::new(0.0, 0.0, 0.5, 1.0),
    )
}

/// Axis-aligned bounds of the given world-space points in light space.
#[must_use]
pub fn light_space_bounds(corners: &[Vec3; 8], light_view: &Mat4) -> (Vec3, Vec3) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let p = light_view.transform_point3(*corner);
        min = min.min(p);
        max = max.max(p);
    }
    (min, max)
}

/// Scale and offset focusing the base projection onto one cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeCrop {
    /// XY scale.
    pub scale: Vec2,
    /// XY offset.
    pub offset: Vec2,
}

/// Fits a crop to light-space bounds, optionally stabilized for a shadow
/// map of `resolution` texels.
///
/// Stabilization quantizes the scale to steps of `64 / n` and snaps the
/// offset to half-texel increments, so sub-texel camera motion cannot make
/// cascade texels shimmer.
#[must_use]
pub fn fit_crop(
    bounds_min: Vec3,
    bounds_max: Vec3,
    base_projection: &Mat4,
    stabilize: Option<u32>,
) -> CascadeCrop {
    let min_proj = base_projection.project_point3(bounds_min);
    let max_proj = base_projection.project_point3(bounds_max);

    let mut scale_x = 2.0 / (max_proj.x - min_proj.x);
    let mut scale_y = 2.0 / (max_proj.y - min_proj.y);

    if stabilize.is_some() {
        scale_x = QUANTIZER / (QUANTIZER / scale_x).ceil();
        scale_y = QUANTIZER / (QUANTIZER / scale_y).ceil();
    }

    let mut offset_x = 0.5 * (max_proj.x + min_proj.x) * scale_x;
    let mut offset_y = 0.5 * (max_proj.y + min_proj.y) * scale_y;

    if let Some(resolution) = stabilize {
        let half_size = resolution as f32 * 0.5;
        offset_x = (offset_x * half_size).ceil() / half_size;
        offset_y = (offset_y * half_size).ceil() / half_size;
    }

    CascadeCrop {
        scale: Vec2::new(scale_x, scale_y),
        offset: Vec2::new(offset_x, offset_y),
    }
}

/// The crop as a matrix, applied before [`base_projection`].
#[must_use]
pub fn crop_matrix(crop: CascadeCrop) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(crop.scale.x, 0.0, 0.0, 0.0),
        Vec4::new(0.0, crop.scale.y, 0.0, 0.0),
        Vec4::Z,
        Vec4::new(crop.offset.x, crop.offset.y, 0.0, 1.0),
    )
}

/// NDC-to-texture-space bias. `flip_y` selects the orientation for
/// backends that sample render targets Y-flipped (the OpenGL family).
#[must_use]
pub fn bias_matrix(flip_y: bool) -> Mat4 {
    let ymul = if flip_y { 0.5 } else { -0.5 };
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, ymul, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 0.5, 0.0),
        Vec4::new(0.5, 0.5, 0.5, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn split_endpoints_and_overlap() {
        let splits = split_frustum(0.1, 1000.0, 0.8);
        assert!(approx(splits[0], 0.1, 1e-6));
        assert!(approx(splits[7], 1000.0, 1e-3));
        for i in 0..CASCADE_COUNT - 1 {
            let far_i = splits[i * 2 + 1];
            let near_next = splits[(i + 1) * 2];
            assert!(approx(far_i, near_next * SPLIT_OVERLAP, 1e-4));
            assert!(far_i > near_next);
        }
        // Slice starts are strictly increasing.
        for i in 1..CASCADE_COUNT {
            assert!(splits[i * 2] > splits[(i - 1) * 2]);
        }
    }

    #[test]
    fn zero_lambda_is_uniform() {
        let splits = split_frustum(1.0, 9.0, 0.0);
        // Interior nears at 1/8, 3/8, 5/8 of the range.
        assert!(approx(splits[2], 1.0 + 8.0 / 8.0, 1e-5));
        assert!(approx(splits[4], 1.0 + 24.0 / 8.0, 1e-5));
        assert!(approx(splits[6], 1.0 + 40.0 / 8.0, 1e-5));
    }

    #[test]
    fn corners_with_identity_view() {
        let corners = frustum_corners_world(1.0, 10.0, 0.5, 0.25, &Mat4::IDENTITY);
        assert_eq!(corners[0], Vec3::new(-0.5, 0.25, 1.0));
        assert_eq!(corners[6], Vec3::new(5.0, -2.5, 10.0));
    }

    #[test]
    fn light_view_handles_vertical_light() {
        let m = light_view_matrix(Vec3::new(0.0, -1.0, 0.0));
        assert!(m.is_finite());
        let m = light_view_matrix(Vec3::ZERO);
        assert_eq!(m, Mat4::IDENTITY);
    }

    #[test]
    fn base_projection_maps_depth_range() {
        let proj = base_projection(100.0);
        let near = proj.project_point3(Vec3::new(0.0, 0.0, -100.0));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert!(approx(near.z, 0.0, 1e-6));
        assert!(approx(far.z, 1.0, 1e-6));
        // X and Y are mirrored.
        let p = proj.project_point3(Vec3::new(0.25, -0.5, 0.0));
        assert!(approx(p.x, -0.25, 1e-6));
        assert!(approx(p.y, 0.5, 1e-6));
    }

    #[test]
    fn quantized_scale_steps() {
        let third = 1.0 / 3.0;
        let crop = fit_crop(
            Vec3::new(-third, -third, -20.0),
            Vec3::new(third, third, 20.0),
            &base_projection(100.0),
            Some(1024),
        );
        // Raw scale is -3 (the base projection mirrors X and Y);
        // quantized to 64 / ceil(64 / -3) = 64 / -21.
        assert!(approx(crop.scale.x, 64.0 / -21.0, 1e-5));
        assert!(approx(crop.scale.y, 64.0 / -21.0, 1e-5));
    }

    #[test]
    fn stabilized_crop_ignores_subtexel_motion() {
        let proj = base_projection(100.0);
        let min = Vec3::new(-9.7, -9.7, -20.0);
        let max = Vec3::new(10.3, 10.3, 20.0);
        let jitter = Vec3::new(0.001, 0.001, 0.0);

        let a = fit_crop(min, max, &proj, Some(1024));
        let b = fit_crop(min + jitter, max + jitter, &proj, Some(1024));
        assert_eq!(a, b);

        // Without stabilization the same motion shifts the crop.
        let c = fit_crop(min, max, &proj, None);
        let d = fit_crop(min + jitter, max + jitter, &proj, None);
        assert_ne!(c, d);
    }

    #[test]
    fn crop_matrix_applies_scale_then_offset() {
        let crop = CascadeCrop {
            scale: Vec2::new(2.0, 4.0),
            offset: Vec2::new(0.5, -0.25),
        };
        let p = crop_matrix(crop).transform_point3(Vec3::new(1.0, 1.0, 3.0));
        assert_eq!(p, Vec3::new(2.5, 3.75, 3.0));
    }

    #[test]
    fn bias_orientation_follows_backend() {
        let gl = bias_matrix(true);
        let dx = bias_matrix(false);
        assert!(approx(gl.y_axis.y, 0.5, 1e-6));
        assert!(approx(dx.y_axis.y, -0.5, 1e-6));
        // NDC origin maps to texture center either way.
        let center = dx.project_point3(Vec3::ZERO);
        assert!(approx(center.x, 0.5, 1e-6));
        assert!(approx(center.y, 0.5, 1e-6));
    }
}
