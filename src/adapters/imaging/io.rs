use anyhow::Result;
use image::{codecs::jpeg::JpegEncoder, ImageReader, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Calidad JPEG de las imágenes del dataset procesado.
pub const JPEG_QUALITY: u8 = 95;

/// Decodifica una imagen de disco (detectando el formato por contenido) a RGB.
pub fn open_rgb(path: &Path) -> Result<RgbImage> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img.to_rgb8())
}

pub fn save_jpeg(img: &RgbImage, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut enc = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    enc.encode_image(img)?;
    Ok(())
}

#[derive(Debug, PartialEq)]
pub enum ImageCheck {
    Valid { width: u32, height: u32 },
    TooSmall { width: u32, height: u32 },
    Corrupt(String),
}

/// Comprueba que un fichero se puede decodificar y que su lado menor alcanza `min_size`.
pub fn check_image(path: &Path, min_size: u32) -> ImageCheck {
    match open_rgb(path) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            if width.min(height) < min_size {
                ImageCheck::TooSmall { width, height }
            } else {
                ImageCheck::Valid { width, height }
            }
        }
        Err(e) => ImageCheck::Corrupt(e.to_string()),
    }
}
