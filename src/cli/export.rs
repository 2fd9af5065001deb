use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray::Array2;
use ndarray_npy::write_npy;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::utils::read_image;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 图片路径
    pub image: PathBuf,
    /// 输出的 npy 文件路径
    #[arg(short, long, default_value = "pixels.npy")]
    pub output: PathBuf,
    /// 同时导出透明通道
    #[arg(long)]
    pub alpha: bool,
}

impl SubCommandExtend for ExportCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let channels = if self.alpha { 4 } else { 3 };
        let pixels = read_image(&self.image, channels)?;
        let n = pixels.len();

        // 导出为 n x channels 的矩阵，每行一个像素
        let data = Array2::from_shape_vec((n, channels), pixels.into_raw())?;
        write_npy(&self.output, &data)?;

        info!("已导出 {n} 个像素到 {}", self.output.display());
        Ok(())
    }
}
