use crate::kmeans::ClusterResult;
use crate::pixels::PixelSet;

/// 根据聚类结果渲染分割图像
///
/// 输出和输入同尺寸的像素网格，每个像素替换为所属中心点的颜色。
/// 中心点的通道值在这里才取整到 [0, 255]
pub fn render_segments(result: &ClusterResult, width: usize, height: usize) -> PixelSet {
    assert_eq!(result.labels.len(), width * height);

    let palette = palette(result);
    let mut output = PixelSet::new(width, height, result.channels);
    for &label in &result.labels {
        output.push(&palette[label]);
    }
    output
}

/// 把每个中心点取整为离散的像素颜色
pub fn palette(result: &ClusterResult) -> Vec<Vec<u8>> {
    (0..result.k())
        .map(|n| {
            result
                .centroid(n)
                .iter()
                .map(|&c| c.round().clamp(0.0, 255.0) as u8)
                .collect()
        })
        .collect()
}
