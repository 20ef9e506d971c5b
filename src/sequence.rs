// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 定长帧序列缓冲 (FIFO)
//!
//! 保存最近 N 帧归一化特征, 满 N 帧后送入分类器。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ndarray::Array2;

/// 按插入顺序保存最近 `capacity` 帧, 超出容量时丢弃最旧帧
///
/// 所有方法都在内部加锁, 一个写线程 + 多个读线程可安全共享。
pub struct SequenceBuffer {
    capacity: usize,
    features: usize,
    frames: Mutex<VecDeque<Vec<f32>>>,
}

impl SequenceBuffer {
    pub fn new(capacity: usize, features: usize) -> Self {
        assert!(capacity > 0, "sequence buffer capacity must be > 0");
        assert!(features > 0, "sequence buffer feature count must be > 0");
        Self {
            capacity,
            features,
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<f32>>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, vector: Vec<f32>) {
        assert_eq!(
            vector.len(),
            self.features,
            "sequence buffer expects {} features per frame, got {}",
            self.features,
            vector.len()
        );
        let mut frames = self.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(vector);
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    /// 填充比例 size / capacity
    pub fn fill_ratio(&self) -> f32 {
        self.size() as f32 / self.capacity as f32
    }

    /// 未满时返回 None; 满时返回按时间顺序 (最旧在前) 的深拷贝
    pub fn snapshot(&self) -> Option<Vec<Vec<f32>>> {
        let frames = self.lock();
        if frames.len() < self.capacity {
            return None;
        }
        Some(frames.iter().cloned().collect())
    }

    /// 与 `snapshot` 内容相同, 布局为 [N, F] 连续张量 (帧优先)
    pub fn flattened_snapshot(&self) -> Option<Array2<f32>> {
        let frames = self.lock();
        if frames.len() < self.capacity {
            return None;
        }
        let mut tensor = Array2::zeros((self.capacity, self.features));
        for (mut row, frame) in tensor.rows_mut().into_iter().zip(frames.iter()) {
            row.iter_mut().zip(frame).for_each(|(dst, &src)| *dst = src);
        }
        Some(tensor)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(tag: f32, features: usize) -> Vec<f32> {
        vec![tag; features]
    }

    #[test]
    fn test_readiness() {
        let buffer = SequenceBuffer::new(4, 3);
        for i in 0..3 {
            buffer.push(frame(i as f32, 3));
            assert!(buffer.snapshot().is_none());
            assert!(buffer.flattened_snapshot().is_none());
            assert!(!buffer.is_full());
        }
        buffer.push(frame(3.0, 3));
        assert!(buffer.is_full());
        assert_eq!(buffer.snapshot().unwrap().len(), 4);
        assert_eq!(buffer.fill_ratio(), 1.0);
    }

    #[test]
    fn test_fifo_eviction() {
        let buffer = SequenceBuffer::new(5, 2);
        for i in 0..8 {
            buffer.push(frame(i as f32, 2));
        }
        assert_eq!(buffer.size(), 5);
        let tags: Vec<f32> = buffer.snapshot().unwrap().iter().map(|f| f[0]).collect();
        assert_eq!(tags, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_flattened_layout() {
        let buffer = SequenceBuffer::new(2, 3);
        buffer.push(vec![1.0, 2.0, 3.0]);
        buffer.push(vec![4.0, 5.0, 6.0]);
        let tensor = buffer.flattened_snapshot().unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(
            tensor.iter().copied().collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_snapshot_is_detached() {
        let buffer = SequenceBuffer::new(2, 1);
        buffer.push(vec![1.0]);
        buffer.push(vec![2.0]);
        let snap = buffer.snapshot().unwrap();
        buffer.push(vec![3.0]);
        buffer.clear();
        assert_eq!(snap, vec![vec![1.0], vec![2.0]]);
        assert_eq!(buffer.size(), 0);
    }

    #[test]
    fn test_concurrent_readers() {
        let buffer = Arc::new(SequenceBuffer::new(10, 4));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(buffer.size() <= 10);
                        if let Some(snap) = buffer.snapshot() {
                            assert_eq!(snap.len(), 10);
                        }
                    }
                })
            })
            .collect();
        for i in 0..100 {
            buffer.push(frame(i as f32, 4));
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(buffer.size(), 10);
    }

    #[test]
    #[should_panic(expected = "expects 3 features")]
    fn test_wrong_length_panics() {
        SequenceBuffer::new(2, 3).push(vec![0.0; 2]);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_panics() {
        SequenceBuffer::new(0, 3);
    }
}
