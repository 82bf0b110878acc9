//! 座標変換
//!
//! 変換元の `srid` と出力先の `srid` から変換器を作る。標準では平面直角座標系
//! （JGD2000 / JGD2011）と地理座標系の相互変換のみを扱う。`gdal` フィーチャを
//! 有効にすると GDAL/OGR による任意の EPSG 間変換が使える。

#[cfg(feature = "gdal")]
mod gdal;
mod plane;

use std::fmt;
use std::sync::Arc;

use geo::MapCoords;
use geo_types::{Coord, Geometry, Rect};

use crate::error::{DmError, Result};

#[cfg(feature = "gdal")]
pub use self::gdal::GdalTransformFactory;
pub use plane::{Datum, PlaneCrs, PlaneRectangularFactory, PlaneTransform};

/// 座標変換器。x は東方向（経度）、y は北方向（緯度）
pub trait CoordinateTransform: fmt::Debug {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)>;

    /// 出力先から変換元への逆変換
    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// 変換器の生成。対応しない組合せはエラー
pub trait TransformFactory: Send + Sync + fmt::Debug {
    fn create(&self, source: &str, destination: &str) -> Result<Box<dyn CoordinateTransform>>;
}

/// `EPSG:2451` / `2451` を EPSG コードとして読む
pub fn epsg_code(srid: &str) -> Option<u32> {
    let s = srid.trim();
    let s = match s.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("epsg:") => &s[5..],
        _ => s,
    };
    s.trim().parse().ok()
}

/// 同じ座標参照系を指しているか
pub fn same_crs(a: &str, b: &str) -> bool {
    match (epsg_code(a), epsg_code(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// 変換不要の場合
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CoordinateTransform for Identity {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}

/// 標準の変換器生成。`gdal` フィーチャが有効なら GDAL を使う
pub fn default_factory() -> Arc<dyn TransformFactory> {
    #[cfg(feature = "gdal")]
    {
        Arc::new(GdalTransformFactory)
    }
    #[cfg(not(feature = "gdal"))]
    {
        Arc::new(PlaneRectangularFactory)
    }
}

pub fn transform_geometry(
    geometry: &Geometry<f64>,
    transform: &dyn CoordinateTransform,
) -> Result<Geometry<f64>> {
    geometry.try_map_coords(|c| {
        let (x, y) = transform.transform(c.x, c.y)?;
        Ok::<_, DmError>(Coord { x, y })
    })
}

/// 出力先の座標系で与えられた矩形を変換元の座標系に戻す。
/// 四隅と各辺の中点を逆変換した外接矩形
pub fn inverse_rect(rect: &Rect<f64>, transform: &dyn CoordinateTransform) -> Result<Rect<f64>> {
    let (min, max) = (rect.min(), rect.max());
    let mid_x = (min.x + max.x) / 2.0;
    let mid_y = (min.y + max.y) / 2.0;
    let samples = [
        (min.x, min.y),
        (mid_x, min.y),
        (max.x, min.y),
        (max.x, mid_y),
        (max.x, max.y),
        (mid_x, max.y),
        (min.x, max.y),
        (min.x, mid_y),
    ];

    let mut lo = Coord {
        x: f64::INFINITY,
        y: f64::INFINITY,
    };
    let mut hi = Coord {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
    };
    for (x, y) in samples {
        let (x, y) = transform.inverse(x, y)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(DmError::Transform(format!(
                "filter rectangle cannot be mapped back: {:?}",
                rect
            )));
        }
        lo.x = lo.x.min(x);
        lo.y = lo.y.min(y);
        hi.x = hi.x.max(x);
        hi.y = hi.y.max(y);
    }
    Ok(Rect::new(lo, hi))
}
