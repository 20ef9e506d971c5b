// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 手部关键点与归一化
//!
//! 检测器输出 21 个关键点 (x, y, z), 展平为 63 个浮点数:
//! 索引 i 的关键点位于 3i, 3i+1, 3i+2。关键点 0 为手腕, 作为归一化原点。

use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, FEATURES_PER_FRAME};

/// 每只手的关键点数
pub const NUM_LANDMARKS: usize = 21;

/// 手腕关键点索引
pub const WRIST: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// 一帧检测结果 (21 × xyz), 创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkFrame {
    data: Vec<f32>,
}

impl LandmarkFrame {
    /// 从展平数组创建, 长度必须为 63
    pub fn from_flat(data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            FEATURES_PER_FRAME,
            "landmark frame must hold {} values (21 x 3), got {}",
            FEATURES_PER_FRAME,
            data.len()
        );
        Self { data }
    }

    /// 从关键点列表创建, 必须恰好 21 个
    pub fn from_points(points: &[Landmark3D]) -> Self {
        assert_eq!(
            points.len(),
            NUM_LANDMARKS,
            "landmark frame must hold {} points, got {}",
            NUM_LANDMARKS,
            points.len()
        );
        let data = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        Self { data }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn point(&self, index: usize) -> Landmark3D {
        let i = index * 3;
        Landmark3D::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }

    pub fn points(&self) -> Vec<Landmark3D> {
        (0..NUM_LANDMARKS).map(|i| self.point(i)).collect()
    }

    /// 所有坐标均为有限值 (无 NaN / ±inf)
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// 手部尺度: 以手腕为原点后 x 范围与 y 范围的较大者 (不含 z)
///
/// 平移不改变范围, 因此可直接在原始坐标上计算。
pub fn hand_scale(raw: &[f32]) -> f32 {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;

    for xyz in raw.chunks_exact(3) {
        min_x = min_x.min(xyz[0]);
        max_x = max_x.max(xyz[0]);
        min_y = min_y.min(xyz[1]);
        max_y = max_y.max(xyz[1]);
    }

    (max_x - min_x).max(max_y - min_y)
}

/// 位置/尺度不变的特征提取
///
/// 1. 减去手腕坐标 (平移不变)
/// 2. scale = max(x范围, y范围)
/// 3. scale 小于 `min_hand_scale` 时钳制为 `min_hand_scale`
/// 4. 所有 63 个值 (含 z) 除以 scale
/// 5. 裁剪到 [-clip_range, clip_range]
pub struct LandmarkNormalizer {
    min_hand_scale: f32,
    clip_range: f32,
    scratch: Vec<f32>,
}

impl LandmarkNormalizer {
    pub fn new(min_hand_scale: f32, clip_range: f32) -> Self {
        assert!(min_hand_scale > 0.0, "min_hand_scale must be > 0");
        assert!(clip_range > 0.0, "clip_range must be > 0");
        Self {
            min_hand_scale,
            clip_range,
            scratch: vec![0.0; FEATURES_PER_FRAME],
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_hand_scale, config.clip_range)
    }

    /// 归一化一帧关键点, 输入长度必须为 63 且全部为有限值
    ///
    /// 内部复用 scratch 缓冲, 返回值总是新分配的副本。
    pub fn normalize(&mut self, raw: &[f32]) -> Vec<f32> {
        assert_eq!(
            raw.len(),
            FEATURES_PER_FRAME,
            "normalize expects {} values (21 x 3), got {}",
            FEATURES_PER_FRAME,
            raw.len()
        );
        // clamp 不处理 NaN
        assert!(
            raw.iter().all(|v| v.is_finite()),
            "normalize expects finite landmark values"
        );

        let (wx, wy, wz) = (raw[WRIST * 3], raw[WRIST * 3 + 1], raw[WRIST * 3 + 2]);
        for (dst, src) in self.scratch.chunks_exact_mut(3).zip(raw.chunks_exact(3)) {
            dst[0] = src[0] - wx;
            dst[1] = src[1] - wy;
            dst[2] = src[2] - wz;
        }

        let scale = hand_scale(&self.scratch).max(self.min_hand_scale);
        let clip = self.clip_range;
        for v in self.scratch.iter_mut() {
            *v = (*v / scale).clamp(-clip, clip);
        }

        self.scratch.clone()
    }

    pub fn normalize_frame(&mut self, frame: &LandmarkFrame) -> Vec<f32> {
        self.normalize(frame.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    fn random_hand(rng: &mut impl Rng) -> Vec<f32> {
        (0..FEATURES_PER_FRAME)
            .map(|_| rng.gen_range(0.2..0.8))
            .collect()
    }

    #[test]
    fn test_wrist_becomes_origin() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut rng = rand::thread_rng();
        let out = normalizer.normalize(&random_hand(&mut rng));
        assert_eq!(&out[0..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_translation_invariance() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let raw = random_hand(&mut rng);
            let (dx, dy, dz) = (
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
                rng.gen_range(-0.5..0.5),
            );
            let shifted: Vec<f32> = raw
                .chunks_exact(3)
                .flat_map(|p| [p[0] + dx, p[1] + dy, p[2] + dz])
                .collect();

            let a = normalizer.normalize(&raw);
            let b = normalizer.normalize(&shifted);
            for (x, y) in a.iter().zip(&b) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_scale_invariance() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut rng = rand::thread_rng();
        let raw = random_hand(&mut rng);
        let k = 1.7;
        // 以手腕为中心缩放 (xyz 同比例, 归一化后 z 也保持一致)
        let (wx, wy, wz) = (raw[0], raw[1], raw[2]);
        let scaled: Vec<f32> = raw
            .chunks_exact(3)
            .flat_map(|p| [wx + (p[0] - wx) * k, wy + (p[1] - wy) * k, wz + (p[2] - wz) * k])
            .collect();

        let a = normalizer.normalize(&raw);
        let b = normalizer.normalize(&scaled);
        for (x, y) in a.iter().zip(&b) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_clip_bound() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        // 一个点在 x 方向很远, 其余点 z 很大
        let mut raw = vec![0.5; FEATURES_PER_FRAME];
        raw[3] = 0.6;
        for i in 0..NUM_LANDMARKS {
            raw[i * 3 + 2] = if i == 0 { 0.0 } else { 5.0 };
        }
        let out = normalizer.normalize(&raw);
        assert!(out.iter().all(|v| (-2.0..=2.0).contains(v)));
        assert_eq!(out[5], 2.0);
    }

    #[test]
    fn test_degenerate_hand_uses_min_scale() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut raw = vec![0.5; FEATURES_PER_FRAME];
        // 所有点重合, 仅一点偏移 0.001
        raw[4] = 0.501;
        let out = normalizer.normalize(&raw);
        assert!(out.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(out[4], 0.1, epsilon = 1e-4);
    }

    #[test]
    fn test_scratch_does_not_leak() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut rng = rand::thread_rng();
        let raw = random_hand(&mut rng);
        let first = normalizer.normalize(&raw);
        let _ = normalizer.normalize(&random_hand(&mut rng));
        assert_eq!(normalizer.normalize(&raw), first);
    }

    #[test]
    #[should_panic(expected = "normalize expects 63 values")]
    fn test_wrong_length_panics() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        normalizer.normalize(&[0.0; 42]);
    }

    #[test]
    fn test_frame_points_roundtrip() {
        let points: Vec<Landmark3D> = (0..NUM_LANDMARKS)
            .map(|i| Landmark3D::new(i as f32, i as f32 * 2.0, -(i as f32)))
            .collect();
        let frame = LandmarkFrame::from_points(&points);
        assert_eq!(frame.as_slice()[3 * 4 + 1], 8.0);
        assert_eq!(frame.point(20), Landmark3D::new(20.0, 40.0, -20.0));
        assert_eq!(frame.points(), points);
        assert!(frame.is_finite());
    }

    #[test]
    fn test_frame_is_finite() {
        let mut data = vec![0.5; FEATURES_PER_FRAME];
        data[10] = f32::NAN;
        assert!(!LandmarkFrame::from_flat(data.clone()).is_finite());
        data[10] = f32::INFINITY;
        assert!(!LandmarkFrame::from_flat(data).is_finite());
    }

    #[test]
    #[should_panic(expected = "normalize expects finite landmark values")]
    fn test_nan_input_panics() {
        let mut normalizer = LandmarkNormalizer::new(0.01, 2.0);
        let mut raw = vec![0.5; FEATURES_PER_FRAME];
        raw[3] = 0.6;
        raw[10] = f32::NAN;
        normalizer.normalize(&raw);
    }
}
