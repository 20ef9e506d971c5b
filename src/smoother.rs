// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 预测平滑 - 最近 M 次预测的多数投票
//!
//! 投票窗口比帧序列短, 用于抑制单帧分类抖动。

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct PredictionSmoother {
    window: usize,
    history: Mutex<VecDeque<usize>>,
}

impl PredictionSmoother {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "smoothing window must be > 0");
        Self {
            window,
            history: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<usize>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_prediction(&self, class_index: usize) {
        let mut history = self.lock();
        if history.len() == self.window {
            history.pop_front();
        }
        history.push_back(class_index);
    }

    /// 多数投票结果, 历史为空时返回 None
    pub fn majority_vote(&self) -> Option<usize> {
        self.majority_vote_with_confidence().map(|(class, _)| class)
    }

    /// (获胜类别, 票数占比)
    ///
    /// 平票时取历史中最早出现的类别。
    pub fn majority_vote_with_confidence(&self) -> Option<(usize, f32)> {
        let history = self.lock();
        if history.is_empty() {
            return None;
        }

        // 按首次出现顺序计票
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for &class in history.iter() {
            match counts.iter_mut().find(|(c, _)| *c == class) {
                Some((_, n)) => *n += 1,
                None => counts.push((class, 1)),
            }
        }

        let mut best = counts[0];
        for &entry in &counts[1..] {
            if entry.1 > best.1 {
                best = entry;
            }
        }
        Some((best.0, best.1 as f32 / history.len() as f32))
    }

    /// 窗口已满且全部一致
    pub fn is_stable(&self) -> bool {
        let history = self.lock();
        match history.front() {
            Some(&first) if history.len() == self.window => history.iter().all(|&c| c == first),
            _ => false,
        }
    }

    /// 当前票数分布
    pub fn distribution(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for &class in self.lock().iter() {
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother_with(window: usize, history: &[usize]) -> PredictionSmoother {
        let smoother = PredictionSmoother::new(window);
        for &c in history {
            smoother.add_prediction(c);
        }
        smoother
    }

    #[test]
    fn test_majority_vote() {
        let smoother = smoother_with(5, &[0, 0, 1, 0, 1]);
        assert_eq!(smoother.majority_vote(), Some(0));
        let (class, fraction) = smoother.majority_vote_with_confidence().unwrap();
        assert_eq!(class, 0);
        assert!((fraction - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_empty_history() {
        let smoother = PredictionSmoother::new(5);
        assert_eq!(smoother.majority_vote(), None);
        assert!(!smoother.is_stable());
        assert!(smoother.distribution().is_empty());
    }

    #[test]
    fn test_tie_prefers_first_seen() {
        assert_eq!(smoother_with(4, &[2, 1, 1, 2]).majority_vote(), Some(2));
        assert_eq!(smoother_with(4, &[3, 1, 3, 1]).majority_vote(), Some(3));
    }

    #[test]
    fn test_stability() {
        assert!(smoother_with(5, &[2, 2, 2, 2, 2]).is_stable());

        let unstable = smoother_with(5, &[2, 2, 2, 2, 3]);
        assert!(!unstable.is_stable());
        assert_eq!(unstable.majority_vote(), Some(2));

        // 未满窗口即使全部一致也不稳定
        assert!(!smoother_with(5, &[2, 2, 2]).is_stable());
    }

    #[test]
    fn test_eviction_and_distribution() {
        let smoother = smoother_with(3, &[1, 1, 1, 0, 0]);
        assert_eq!(smoother.len(), 3);
        assert_eq!(smoother.majority_vote(), Some(0));
        let dist = smoother.distribution();
        assert_eq!(dist.get(&0), Some(&2));
        assert_eq!(dist.get(&1), Some(&1));
        smoother.clear();
        assert!(smoother.is_empty());
    }
}
