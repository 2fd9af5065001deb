use std::path::Path;

use anyhow::{Context, Result, bail};
use image::{RgbImage, RgbaImage};
use indicatif::ProgressStyle;

use crate::pixels::PixelSet;

/// 读取图片并展平为像素向量集合
///
/// channels 为 3 时解码为 RGB，为 4 时解码为 RGBA
pub fn read_image(path: impl AsRef<Path>, channels: usize) -> Result<PixelSet> {
    let path = path.as_ref();
    let img =
        image::open(path).with_context(|| format!("读取图片失败: {}", path.display()))?;
    let pixels = match channels {
        3 => {
            let img = img.into_rgb8();
            PixelSet::from_raw(img.width() as usize, img.height() as usize, 3, img.into_raw())
        }
        4 => {
            let img = img.into_rgba8();
            PixelSet::from_raw(img.width() as usize, img.height() as usize, 4, img.into_raw())
        }
        _ => bail!("不支持的通道数量: {channels}"),
    };
    Ok(pixels)
}

/// 把像素集合编码为图片文件，格式由扩展名决定
pub fn write_image(path: impl AsRef<Path>, pixels: &PixelSet) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = (pixels.width() as u32, pixels.height() as u32);
    match pixels.channels() {
        3 => RgbImage::from_raw(width, height, pixels.as_raw().to_vec())
            .context("像素数据长度和图片尺寸不一致")?
            .save(path)
            .with_context(|| format!("写入图片失败: {}", path.display()))?,
        4 => RgbaImage::from_raw(width, height, pixels.as_raw().to_vec())
            .context("像素数据长度和图片尺寸不一致")?
            .save(path)
            .with_context(|| format!("写入图片失败: {}", path.display()))?,
        n => bail!("不支持的通道数量: {n}"),
    }
    Ok(())
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap()
        .progress_chars("#>-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.png");

        let mut pixels = PixelSet::new(2, 1, 3);
        pixels.push(&[255, 0, 0]);
        pixels.push(&[0, 0, 255]);
        write_image(&path, &pixels)?;

        let loaded = read_image(&path, 3)?;
        assert_eq!(loaded, pixels);
        Ok(())
    }

    #[test]
    fn read_rgb_as_rgba() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.png");

        let mut pixels = PixelSet::new(1, 1, 3);
        pixels.push(&[10, 20, 30]);
        write_image(&path, &pixels)?;

        // RGB 图片按 RGBA 解码时补全不透明的 alpha 通道
        let loaded = read_image(&path, 4)?;
        assert_eq!(loaded.pixel(0), &[10, 20, 30, 255]);
        Ok(())
    }

    #[test]
    fn unsupported_channels_rejected() {
        let mut pixels = PixelSet::new(1, 1, 2);
        pixels.push(&[1, 2]);
        assert!(write_image("x.png", &pixels).is_err());
    }
}
