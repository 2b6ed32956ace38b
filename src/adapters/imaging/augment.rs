use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;

use crate::domain::config::TransformConfig;

/// Probabilidades fijas de las transformaciones fotométricas y geométricas.
const ROTATE_P: f64 = 0.5;
const BRIGHTNESS_P: f64 = 0.5;
const CONTRAST_P: f64 = 0.5;
const BLUR_P: f64 = 0.3;

/// Cadena de aumentos de datos. Cada transformación se aplica de forma
/// independiente con su probabilidad; la imagen conserva su tamaño, así que
/// la etiqueta de imagen completa sigue siendo válida.
#[derive(Debug, Clone)]
pub struct Augmenter {
    transforms: TransformConfig,
}

impl Augmenter {
    pub fn new(transforms: TransformConfig) -> Self {
        Self { transforms }
    }

    pub fn apply<R: Rng>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let t = &self.transforms;
        let mut out = img.clone();

        if let Some(p) = t.horizontal_flip.filter(|p| *p > 0.0) {
            if rng.gen_bool(p.min(1.0)) {
                out = imageops::flip_horizontal(&out);
            }
        }

        if let Some(p) = t.vertical_flip.filter(|p| *p > 0.0) {
            if rng.gen_bool(p.min(1.0)) {
                out = imageops::flip_vertical(&out);
            }
        }

        if let Some(limit) = t.rotation.filter(|l| *l > 0.0) {
            if rng.gen_bool(ROTATE_P) {
                let degrees: f32 = rng.gen_range(-limit..=limit);
                out = rotate_about_center(&out, degrees.to_radians(), Interpolation::Bilinear, Rgb([0, 0, 0]));
            }
        }

        if let Some(limit) = t.brightness.filter(|l| *l > 0.0) {
            if rng.gen_bool(BRIGHTNESS_P) {
                let delta: f32 = rng.gen_range(-limit..=limit);
                out = imageops::brighten(&out, (delta * 255.0) as i32);
            }
        }

        if let Some(limit) = t.contrast.filter(|l| *l > 0.0) {
            if rng.gen_bool(CONTRAST_P) {
                let delta: f32 = rng.gen_range(-limit..=limit);
                out = imageops::contrast(&out, delta * 100.0);
            }
        }

        if let Some(limit) = t.blur.filter(|l| *l >= 3) {
            if rng.gen_bool(BLUR_P) {
                let k = odd_kernel(rng.gen_range(3..=limit));
                out = imageops::blur(&out, kernel_sigma(k));
            }
        }

        out
    }
}

fn odd_kernel(k: u32) -> u32 {
    if k % 2 == 0 { k + 1 } else { k }
}

/// Sigma gaussiana equivalente a un kernel de tamaño `k`.
fn kernel_sigma(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 128]))
    }

    #[test]
    fn certain_horizontal_flip_mirrors_pixels() {
        let aug = Augmenter::new(TransformConfig { horizontal_flip: Some(1.0), ..TransformConfig::default() });
        let img = gradient();
        let out = aug.apply(&img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.get_pixel(0, 3), img.get_pixel(15, 3));
    }

    #[test]
    fn keeps_dimensions_and_is_reproducible() {
        let aug = Augmenter::new(TransformConfig {
            horizontal_flip: Some(0.5),
            vertical_flip: Some(0.5),
            rotation: Some(15.0),
            brightness: Some(0.2),
            contrast: Some(0.2),
            blur: Some(5),
        });
        let img = gradient();
        let a = aug.apply(&img, &mut StdRng::seed_from_u64(9));
        let b = aug.apply(&img, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.dimensions(), img.dimensions());
        assert_eq!(a, b);
    }

    #[test]
    fn empty_config_is_identity() {
        let img = gradient();
        let out = Augmenter::new(TransformConfig::default()).apply(&img, &mut StdRng::seed_from_u64(1));
        assert_eq!(out, img);
    }

    #[test]
    fn kernel_helpers() {
        assert_eq!(odd_kernel(4), 5);
        assert_eq!(odd_kernel(3), 3);
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-6);
    }
}
