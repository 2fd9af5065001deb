use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressIterator};
use log::{error, info};
use ndarray::Array2;
use ndarray_npy::write_npy;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{KMeansOptions, Opts, OutputFormat};
use crate::kmeans::{self, imbalance_factor};
use crate::render::{palette, render_segments};
use crate::utils::{pb_style, read_image, write_image};

#[derive(Parser, Debug, Clone)]
pub struct SegmentCommand {
    /// 图片路径或目录，目录会被递归扫描
    #[arg(required = true)]
    pub path: Vec<PathBuf>,
    #[command(flatten)]
    pub kmeans: KMeansOptions,
    /// 扫描目录时匹配的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,bmp")]
    pub suffix: String,
    /// 输出目录，默认保存在原图片旁边
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// 把每个像素的标签保存为 npy 文件，只支持单张图片
    #[arg(long, value_name = "FILE")]
    pub dump_labels: Option<PathBuf>,
    /// 聚类统计信息的输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SegmentCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let centers = self.kmeans.resolve_centers()?;
        let images = collect_images(&self.path, &self.suffix)?;
        if images.is_empty() {
            bail!("没有找到任何图片");
        }
        if self.dump_labels.is_some() && images.len() > 1 {
            bail!("--dump-labels 只支持单张图片");
        }
        if let Some(output) = &self.output {
            std::fs::create_dir_all(output)?;
        }

        let mut last_report = None;
        let mut failed = 0;
        let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
        for image in images.iter().progress_with(pb.clone()) {
            pb.set_message(image.display().to_string());
            match self.segment_one(image, &centers) {
                Ok(report) => last_report = Some(report),
                Err(e) if images.len() == 1 => return Err(e),
                // 批量模式下单张图片失败不中断，记录后继续
                Err(e) => {
                    failed += 1;
                    error!("分割失败: {}: {e:#}", image.display());
                }
            }
        }
        pb.finish_and_clear();

        if images.len() == 1 {
            if let Some(report) = &last_report {
                print_report(report, self.output_format)?;
            }
        }
        if failed > 0 {
            bail!("{failed} 张图片分割失败");
        }
        Ok(())
    }
}

impl SegmentCommand {
    fn segment_one(&self, path: &Path, centers: &[Vec<f32>]) -> Result<SegmentReport> {
        // 中心点的维度决定图片按 RGB 还是 RGBA 解码
        let channels = centers[0].len();
        let pixels = read_image(path, channels)?;

        let state = kmeans::initialize(&pixels, centers)?;
        let result = kmeans::run(&pixels, state, self.kmeans.max_iter, self.kmeans.tolerance)?;

        let status = match result.termination.converged() {
            true => "收敛",
            false => "达到迭代上限",
        };
        info!(
            "{}: {} 轮后{}，惯性 {:.0}，不平衡度 {:.2}",
            path.display(),
            result.iterations,
            status,
            result.inertia,
            imbalance_factor(&result.centroid_frequency)
        );

        let output = self.output_path(path);
        let segmented = render_segments(&result, pixels.width(), pixels.height());
        write_image(&output, &segmented)?;

        if let Some(dump) = &self.dump_labels {
            let labels: Vec<u32> = result.labels.iter().map(|&l| l as u32).collect();
            let labels = Array2::from_shape_vec((pixels.height(), pixels.width()), labels)?;
            write_npy(dump, &labels)?;
        }

        let total = result.labels.len();
        let clusters = palette(&result)
            .into_iter()
            .zip(&result.centroid_frequency)
            .map(|(color, &count)| ClusterStat {
                color,
                pixels: count,
                share: count as f32 / total as f32,
            })
            .collect();

        Ok(SegmentReport {
            path: path.display().to_string(),
            output: output.display().to_string(),
            iterations: result.iterations,
            converged: result.termination.converged(),
            inertia: result.inertia,
            clusters,
        })
    }

    /// 输出文件和原图同名，扩展名替换为 seg.png
    fn output_path(&self, path: &Path) -> PathBuf {
        let stem = path.file_stem().unwrap_or_default();
        let name = format!("{}.seg.png", stem.to_string_lossy());
        match &self.output {
            Some(dir) => dir.join(name),
            None => path.with_file_name(name),
        }
    }
}

/// 收集所有待处理的图片，目录按后缀过滤递归扫描
fn collect_images(paths: &[PathBuf], suffix: &str) -> Result<Vec<PathBuf>> {
    let re = Regex::new(&format!("(?i)^({})$", suffix.replace(',', "|")))
        .expect("failed to build regex");
    let mut images = vec![];
    for path in paths {
        if !path.is_dir() {
            images.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if let Some(ext) = path.extension() {
                if re.is_match(&ext.to_string_lossy()) {
                    images.push(path);
                }
            }
        }
    }
    Ok(images)
}

#[derive(Debug, Serialize)]
struct SegmentReport {
    path: String,
    output: String,
    iterations: usize,
    converged: bool,
    inertia: f64,
    clusters: Vec<ClusterStat>,
}

#[derive(Debug, Serialize)]
struct ClusterStat {
    /// 取整后的中心点颜色
    color: Vec<u8>,
    /// 分配到该中心的像素数量
    pixels: usize,
    /// 占全部像素的比例
    share: f32,
}

fn print_report(report: &SegmentReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?)
        }
        OutputFormat::Table => {
            for (i, c) in report.clusters.iter().enumerate() {
                let color =
                    c.color.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
                println!("{i}\t({color})\t{}\t{:.1}%", c.pixels, c.share * 100.0);
            }
            println!("{} -> {}", report.path, report.output);
        }
    }
    Ok(())
}
