//! 要素からジオメトリへの変換と外接矩形の判定

use geo::{Area, BoundingRect, Intersects};
use geo_types::{Coord, Geometry, LineString, Point, Polygon, Rect};
use wkt::ToWkt;

use crate::model::{Coordinate, ElementKind};

/// 種別ごとのジオメトリ型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    NoGeometry,
}

impl GeometryType {
    pub fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Polygon => GeometryType::Polygon,
            ElementKind::Line | ElementKind::Circle | ElementKind::Arc => GeometryType::LineString,
            ElementKind::Point | ElementKind::Direction | ElementKind::Note => GeometryType::Point,
        }
    }

    /// `dataType` の文字列から。未知の種別はジオメトリなし
    pub fn for_data_type(data_type: &str) -> Self {
        data_type
            .parse::<ElementKind>()
            .map_or(GeometryType::NoGeometry, Self::for_kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::NoGeometry => "NoGeometry",
        }
    }

    pub fn has_geometry(self) -> bool {
        self != GeometryType::NoGeometry
    }
}

fn is_finite(c: &Coordinate) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

fn coord(c: &Coordinate) -> Coord<f64> {
    Coord { x: c.x, y: c.y }
}

/// 座標列からジオメトリを作る。不正な形状は `None`
///
/// * 点: 先頭の座標
/// * 線: 異なる2点以上
/// * 面: 先頭の座標で閉じた環。面積が0の環は不正
///
/// 高さは保持しない。
pub fn build_geometry(geometry_type: GeometryType, points: &[Coordinate]) -> Option<Geometry<f64>> {
    if points.is_empty() || !points.iter().all(is_finite) {
        return None;
    }

    match geometry_type {
        GeometryType::Point => Some(Point::from(coord(&points[0])).into()),
        GeometryType::LineString => {
            let first = points[0];
            if points.iter().all(|p| p.x == first.x && p.y == first.y) {
                return None;
            }
            Some(LineString::from_iter(points.iter().map(coord)).into())
        }
        GeometryType::Polygon => {
            let mut ring: Vec<Coord<f64>> = points.iter().map(coord).collect();
            // 既に閉じた環には終点を足さない
            if ring.first() != ring.last() {
                ring.push(ring[0]);
            }
            let polygon = Polygon::new(LineString::from(ring), vec![]);
            if polygon.unsigned_area() > 0.0 {
                Some(polygon.into())
            } else {
                None
            }
        }
        GeometryType::NoGeometry => None,
    }
}

pub fn bounding_rect(geometry: &Geometry<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

/// 境界を含む交差判定
pub fn rect_intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// `outer` が `inner` を（境界を含めて）包含するか
pub fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

pub fn combine_rects(a: Option<Rect<f64>>, b: Rect<f64>) -> Rect<f64> {
    match a {
        None => b,
        Some(a) => Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            },
        ),
    }
}

/// 矩形との交差判定。`exact` でなければ外接矩形で判定する
pub fn intersects_rect(geometry: &Geometry<f64>, rect: &Rect<f64>, exact: bool) -> bool {
    if exact {
        geometry.intersects(rect)
    } else {
        bounding_rect(geometry).is_some_and(|bbox| rect_intersects(&bbox, rect))
    }
}

pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}
