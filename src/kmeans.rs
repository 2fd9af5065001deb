use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::pixels::PixelSet;

/// 聚类配置或输入数据不合法时返回的错误
///
/// 所有错误都在迭代开始前检查出来，迭代本身不会失败
#[derive(Debug, Error)]
pub enum KMeansError {
    #[error("无效的聚类配置: {0}")]
    InvalidConfig(String),
    #[error("向量维度不匹配: 期望 {expected} 个通道，实际为 {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// 一次聚类运行的终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 所有像素的标签不再变化
    StableLabels,
    /// 所有中心点的最大移动量小于收敛阈值
    CentroidShift,
    /// 达到最大迭代次数
    MaxIterations,
}

impl Termination {
    /// 是否因收敛而终止。达到最大迭代次数属于正常结果，但不算收敛
    pub fn converged(self) -> bool {
        !matches!(self, Termination::MaxIterations)
    }
}

/// 聚类的可变状态：K 个中心点加上每个像素当前的标签
///
/// 由 [`initialize`] 创建，在 [`run`] 中原地更新，运行结束后固化为 [`ClusterResult`]
#[derive(Debug, Clone)]
pub struct ClusterState {
    /// 中心点通道值，长度为 k * channels 的扁平数组
    centroids: Vec<f32>,
    channels: usize,
    /// 每个像素的标签。第一次分配之前为空
    labels: Vec<usize>,
}

impl ClusterState {
    /// 聚类中心数量
    pub fn k(&self) -> usize {
        self.centroids.len() / self.channels
    }

    /// 第 n 个中心点的通道值
    pub fn centroid(&self, n: usize) -> &[f32] {
        &self.centroids[n * self.channels..(n + 1) * self.channels]
    }
}

/// 聚类结果快照
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// 每个像素的标签，取值范围 [0, k)
    pub labels: Vec<usize>,
    /// 最终中心点，保留小数，渲染时才取整
    pub centroids: Vec<f32>,
    /// 每个中心点的通道数量
    pub channels: usize,
    /// 实际执行的迭代次数
    pub iterations: usize,
    /// 终止原因
    pub termination: Termination,
    /// 最后一次分配时计算的总惯性，即像素到所属中心的平方距离之和
    pub inertia: f64,
    /// 每个中心点分配到的像素数量
    pub centroid_frequency: Vec<usize>,
}

impl ClusterResult {
    pub fn k(&self) -> usize {
        self.centroids.len() / self.channels
    }

    pub fn centroid(&self, n: usize) -> &[f32] {
        &self.centroids[n * self.channels..(n + 1) * self.channels]
    }
}

/// 校验输入并创建初始聚类状态
///
/// 中心点数量决定了 K。所有中心点的维度必须和像素通道数一致
pub fn initialize(pixels: &PixelSet, centers: &[Vec<f32>]) -> Result<ClusterState, KMeansError> {
    if pixels.is_empty() {
        return Err(KMeansError::InvalidConfig("像素集合为空".to_string()));
    }
    if centers.is_empty() {
        return Err(KMeansError::InvalidConfig("初始中心点列表为空".to_string()));
    }

    let channels = pixels.channels();
    for center in centers {
        if center.len() != channels {
            return Err(KMeansError::DimensionMismatch { expected: channels, got: center.len() });
        }
    }

    let centroids = centers.iter().flatten().copied().collect();
    Ok(ClusterState { centroids, channels, labels: vec![] })
}

/// 执行 Lloyd 迭代直到收敛或达到最大迭代次数
///
/// 每轮迭代分两步：先把每个像素分配给最近的中心点，再把每个中心点
/// 移动到其像素的均值位置。耗尽迭代次数不是错误，终止原因会在结果中报告
pub fn run(
    pixels: &PixelSet,
    mut state: ClusterState,
    max_iter: usize,
    tolerance: f32,
) -> Result<ClusterResult, KMeansError> {
    if max_iter == 0 {
        return Err(KMeansError::InvalidConfig("max_iter 必须大于 0".to_string()));
    }
    if !(tolerance > 0.0) {
        return Err(KMeansError::InvalidConfig("tolerance 必须大于 0".to_string()));
    }

    let k = state.k();
    let mut iterations = 0;
    let mut termination = Termination::MaxIterations;
    let mut inertia = 0.0;
    let mut centroid_frequency = vec![0; k];

    for iter in 1..=max_iter {
        iterations = iter;

        // 分配：把每个像素分配给最近的中心点
        let (labels, distsum) = update_assignments(pixels, &state.centroids, state.channels);
        let changed = match state.labels.is_empty() {
            // 第一轮之前没有标签，全部视为变化
            true => pixels.len(),
            false => state.labels.iter().zip(&labels).filter(|(a, b)| a != b).count(),
        };
        state.labels = labels;
        inertia = distsum;

        // 更新：每个中心点移动到其像素的均值位置
        let (centroids, frequency) =
            update_centroids(pixels, &state.labels, &state.centroids, k);
        let shift = max_shift(&state.centroids, &centroids);
        state.centroids = centroids;
        centroid_frequency = frequency;

        debug!("第 {iter} 轮 - 惯性：{inertia:.2} | 标签变化：{changed} | 中心移动：{shift:.4}");

        if changed == 0 {
            termination = Termination::StableLabels;
            break;
        }
        if shift < tolerance {
            termination = Termination::CentroidShift;
            break;
        }
    }

    Ok(ClusterResult {
        labels: state.labels,
        centroids: state.centroids,
        channels: state.channels,
        iterations,
        termination,
        inertia,
        centroid_frequency,
    })
}

/// 将每个像素分配给最近的中心点，返回标签和总平方距离
fn update_assignments(pixels: &PixelSet, centroids: &[f32], channels: usize) -> (Vec<usize>, f64) {
    let (labels, distances): (Vec<_>, Vec<_>) = pixels
        .as_raw()
        .par_chunks_exact(channels)
        .map(|pixel| {
            let mut min_distance = f32::INFINITY;
            let mut best_cluster = 0;

            // 严格小于保证距离相等时保留编号最小的中心点，结果可复现
            for (j, centroid) in centroids.chunks_exact(channels).enumerate() {
                let distance = squared_distance(pixel, centroid);
                if distance < min_distance {
                    min_distance = distance;
                    best_cluster = j;
                }
            }

            (best_cluster, min_distance as f64)
        })
        .unzip();
    let distsum = distances.iter().sum();
    (labels, distsum)
}

/// 重新计算各中心点：每个线程先累加局部的和与计数，再归并求均值
///
/// 通道值都是整数，f64 累加不会丢失精度，归并顺序不影响结果。
/// 没有分配到任何像素的中心点保持原值不变，不会被重新播种或丢弃
fn update_centroids(
    pixels: &PixelSet,
    labels: &[usize],
    old: &[f32],
    k: usize,
) -> (Vec<f32>, Vec<usize>) {
    let channels = pixels.channels();
    let (sums, counts) = pixels
        .as_raw()
        .par_chunks_exact(channels)
        .zip(labels.par_iter())
        .fold(
            || (vec![0f64; k * channels], vec![0usize; k]),
            |(mut sums, mut counts), (pixel, &label)| {
                for (i, &c) in pixel.iter().enumerate() {
                    sums[label * channels + i] += c as f64;
                }
                counts[label] += 1;
                (sums, counts)
            },
        )
        .reduce(
            || (vec![0f64; k * channels], vec![0usize; k]),
            |(mut sums, mut counts), (s, c)| {
                sums.iter_mut().zip(&s).for_each(|(a, b)| *a += b);
                counts.iter_mut().zip(&c).for_each(|(a, b)| *a += b);
                (sums, counts)
            },
        );

    let mut centroids = old.to_vec();
    for j in 0..k {
        if counts[j] == 0 {
            continue;
        }
        for i in 0..channels {
            centroids[j * channels + i] = (sums[j * channels + i] / counts[j] as f64) as f32;
        }
    }
    (centroids, counts)
}

fn squared_distance(pixel: &[u8], centroid: &[f32]) -> f32 {
    pixel
        .iter()
        .zip(centroid)
        .map(|(&p, &c)| {
            let d = p as f32 - c;
            d * d
        })
        .sum()
}

/// 所有中心点的最大单通道移动量
fn max_shift(old: &[f32], new: &[f32]) -> f32 {
    old.iter().zip(new).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max)
}

/// 计算聚类大小的不平衡因子，完全均匀时为 1.0
pub fn imbalance_factor(hist: &[usize]) -> f32 {
    let (mut tot, mut uf) = (0.0, 0.0);
    for h in hist {
        let h = *h as f32;
        tot += h;
        uf += h.powf(2.0);
    }
    uf * hist.len() as f32 / tot.powf(2.0)
}
