//! 空間インデックスとサブセットインデックス

use geo_types::{Coord, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// 一致件数が全件からこの割合（1/10）を引いた数以上ならサブセットインデックスを作らない
const SUBSET_ID_THRESHOLD_FACTOR: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedBox {
    id: u64,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// 地物IDと外接矩形のRツリー
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedBox>,
}

impl SpatialIndex {
    pub fn bulk_load(entries: Vec<(u64, Rect<f64>)>) -> Self {
        let boxes = entries
            .into_iter()
            .map(|(id, rect)| IndexedBox {
                id,
                envelope: aabb(&rect),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(boxes),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// 矩形と交差する地物IDを昇順で返す
    pub fn query(&self, rect: &Rect<f64>) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .tree
            .locate_in_envelope_intersecting(&aabb(rect))
            .map(|b| b.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// 全体の外接矩形
    pub fn bounds(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        let envelope = self.tree.root().envelope();
        let (lower, upper) = (envelope.lower(), envelope.upper());
        Some(Rect::new(
            Coord {
                x: lower[0],
                y: lower[1],
            },
            Coord {
                x: upper[0],
                y: upper[1],
            },
        ))
    }
}

/// 条件式に一致する地物IDの一覧（昇順）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetIndex {
    ids: Vec<u64>,
}

impl SubsetIndex {
    /// 一致件数が全体の9割以上ならインデックスを持つ意味がないので `None`
    pub fn build(mut ids: Vec<u64>, total: usize) -> Option<Self> {
        if !subset_index_worthwhile(ids.len(), total) {
            return None;
        }
        ids.sort_unstable();
        ids.dedup();
        Some(Self { ids })
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

pub fn subset_index_worthwhile(matched: usize, total: usize) -> bool {
    matched < total - total / SUBSET_ID_THRESHOLD_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    #[test]
    fn test_spatial_query_sorted() {
        let index = SpatialIndex::bulk_load(vec![
            (3, rect(20.0, 20.0, 30.0, 30.0)),
            (1, rect(0.0, 0.0, 10.0, 10.0)),
            (2, rect(5.0, 5.0, 15.0, 15.0)),
        ]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.query(&rect(8.0, 8.0, 25.0, 25.0)), vec![1, 2, 3]);
        assert_eq!(index.query(&rect(12.0, 12.0, 13.0, 13.0)), vec![2]);
        assert!(index.query(&rect(100.0, 100.0, 101.0, 101.0)).is_empty());
        assert_eq!(index.bounds(), Some(rect(0.0, 0.0, 30.0, 30.0)));
        assert_eq!(SpatialIndex::default().bounds(), None);
    }

    #[test]
    fn test_subset_threshold() {
        assert!(subset_index_worthwhile(8, 10));
        assert!(!subset_index_worthwhile(9, 10));
        assert!(!subset_index_worthwhile(10, 10));
        assert!(subset_index_worthwhile(0, 1));
        assert!(!subset_index_worthwhile(0, 0));

        let index = SubsetIndex::build(vec![5, 2, 7], 100).unwrap();
        assert_eq!(index.ids(), &[2, 5, 7]);
        assert!(index.contains(5));
        assert!(!index.contains(3));
        assert!(SubsetIndex::build((1..=95).collect(), 100).is_none());
    }
}
