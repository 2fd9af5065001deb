use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
#[command(name = "imseg", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 计算使用的线程数量，0 表示使用全部 CPU
    #[arg(short = 'j', long, value_name = "N", default_value_t = 0)]
    pub threads: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 对图片进行颜色分割
    Segment(SegmentCommand),
    /// 导出图片的像素矩阵，供外部工具分析
    Export(ExportCommand),
}

/// 一个颜色向量，RGB 为 3 个分量，RGBA 为 4 个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color(pub Vec<f32>);

#[derive(Parser, Debug, Clone)]
pub struct KMeansOptions {
    /// 初始聚类中心颜色，格式为 R,G,B 或 R,G,B,A，可重复指定
    /// 例：`-C 255,0,0 -C 0,0,255`
    #[arg(short = 'C', long = "center", value_name = "COLOR", value_parser = parse_color, verbatim_doc_comment)]
    pub centers: Vec<Color>,
    /// 从 JSON 文件读取初始中心颜色，格式为 [[R,G,B], ...]
    #[arg(long, value_name = "FILE", conflicts_with = "centers")]
    pub centers_file: Option<PathBuf>,
    /// 最大迭代次数
    #[arg(short, long, value_name = "N", default_value_t = 100)]
    pub max_iter: usize,
    /// 收敛阈值，所有中心点的最大移动量小于该值时判定收敛
    #[arg(short, long, value_name = "EPS", default_value_t = 0.025)]
    pub tolerance: f32,
}

impl KMeansOptions {
    /// 解析实际使用的初始中心点列表，中心点数量即为 K
    pub fn resolve_centers(&self) -> Result<Vec<Vec<f32>>> {
        let centers = match &self.centers_file {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("读取中心点文件失败: {}", path.display()))?;
                serde_json::from_str::<Vec<Color>>(&data)
                    .with_context(|| format!("解析中心点文件失败: {}", path.display()))?
            }
            None => self.centers.clone(),
        };
        if centers.is_empty() {
            bail!("未指定初始聚类中心，请使用 --center 或 --centers-file");
        }
        Ok(centers.into_iter().map(|c| c.0).collect())
    }
}

fn parse_color(s: &str) -> Result<Color> {
    let parts =
        s.split(',').map(|x| x.trim().parse::<f32>()).collect::<Result<Vec<_>, _>>()?;
    if parts.len() != 3 && parts.len() != 4 {
        bail!("无效的颜色: {s}，应为 R,G,B 或 R,G,B,A");
    }
    if parts.iter().any(|c| !(0.0..=255.0).contains(c)) {
        bail!("颜色通道值必须在 0 到 255 之间: {s}");
    }
    Ok(Color(parts))
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_color_rgb_and_rgba() {
        assert_eq!(parse_color("255,0,0").unwrap(), Color(vec![255.0, 0.0, 0.0]));
        assert_eq!(
            parse_color("180, 136, 0, 128").unwrap(),
            Color(vec![180.0, 136.0, 0.0, 128.0])
        );
    }

    #[test]
    fn parse_color_rejects_garbage() {
        assert!(parse_color("255,0").is_err());
        assert!(parse_color("1,2,3,4,5").is_err());
        assert!(parse_color("300,0,0").is_err());
        assert!(parse_color("a,b,c").is_err());
    }
}
