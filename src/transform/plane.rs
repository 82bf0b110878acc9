//! 平面直角座標系（I〜XIX系）のガウス・クリューゲル投影
//!
//! GRS80楕円体、縮尺係数0.9999。投影式は国土地理院の計算式（河瀬の級数展開）による。

use super::{epsg_code, CoordinateTransform, Identity, TransformFactory};
use crate::error::{DmError, Result};

/// GRS80 長半径
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// GRS80 逆扁平率
const INVERSE_FLATTENING: f64 = 298.257_222_101;
const SCALE_FACTOR: f64 = 0.9999;

/// 各系の原点（緯度, 経度）[度]
const ZONE_ORIGINS: [(f64, f64); 19] = [
    (33.0, 129.0 + 30.0 / 60.0),
    (33.0, 131.0),
    (36.0, 132.0 + 10.0 / 60.0),
    (33.0, 133.0 + 30.0 / 60.0),
    (36.0, 134.0 + 20.0 / 60.0),
    (36.0, 136.0),
    (36.0, 137.0 + 10.0 / 60.0),
    (36.0, 138.0 + 30.0 / 60.0),
    (36.0, 139.0 + 50.0 / 60.0),
    (40.0, 140.0 + 50.0 / 60.0),
    (44.0, 140.0 + 15.0 / 60.0),
    (44.0, 142.0 + 15.0 / 60.0),
    (44.0, 144.0 + 15.0 / 60.0),
    (26.0, 142.0),
    (26.0, 127.0 + 30.0 / 60.0),
    (26.0, 124.0),
    (26.0, 131.0),
    (20.0, 136.0),
    (26.0, 154.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datum {
    Jgd2000,
    Jgd2011,
}

impl Datum {
    fn geographic_epsg(self) -> u32 {
        match self {
            Datum::Jgd2000 => 4612,
            Datum::Jgd2011 => 6668,
        }
    }

    /// I系の EPSG コード
    fn first_zone_epsg(self) -> u32 {
        match self {
            Datum::Jgd2000 => 2443,
            Datum::Jgd2011 => 6669,
        }
    }
}

/// 対応する座標参照系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneCrs {
    /// 経緯度（x=経度, y=緯度）
    Geographic(Datum),
    /// 平面直角座標系（x=東方向, y=北方向）。`zone` は1〜19
    Plane { datum: Datum, zone: u8 },
}

impl PlaneCrs {
    pub fn from_epsg(code: u32) -> Option<Self> {
        for datum in [Datum::Jgd2000, Datum::Jgd2011] {
            if code == datum.geographic_epsg() {
                return Some(PlaneCrs::Geographic(datum));
            }
            let first = datum.first_zone_epsg();
            if (first..first + 19).contains(&code) {
                return Some(PlaneCrs::Plane {
                    datum,
                    zone: (code - first + 1) as u8,
                });
            }
        }
        None
    }

    pub fn from_srid(srid: &str) -> Option<Self> {
        epsg_code(srid).and_then(Self::from_epsg)
    }

    pub fn datum(self) -> Datum {
        match self {
            PlaneCrs::Geographic(datum) | PlaneCrs::Plane { datum, .. } => datum,
        }
    }

    fn projection(self) -> Option<Projection> {
        match self {
            PlaneCrs::Geographic(_) => None,
            PlaneCrs::Plane { zone, .. } => {
                let (lat, lon) = ZONE_ORIGINS[usize::from(zone) - 1];
                Some(Projection::new(lat, lon))
            }
        }
    }
}

/// 横メルカトル投影の係数
#[derive(Debug, Clone, Copy)]
struct Projection {
    lon0: f64,
    n: f64,
    /// 子午線弧長の係数 `m0 a / (1 + n) * A0`
    a_bar: f64,
    /// 原点緯度までの子午線弧長
    s_bar: f64,
    alpha: [f64; 5],
    beta: [f64; 5],
    delta: [f64; 6],
}

impl Projection {
    fn new(lat0_deg: f64, lon0_deg: f64) -> Self {
        let n = 1.0 / (2.0 * INVERSE_FLATTENING - 1.0);
        let (n2, n3, n4, n5, n6) = (n.powi(2), n.powi(3), n.powi(4), n.powi(5), n.powi(6));

        let a = [
            1.0 + n2 / 4.0 + n4 / 64.0,
            -1.5 * (n - n3 / 8.0 - n5 / 64.0),
            15.0 / 16.0 * (n2 - n4 / 4.0),
            -35.0 / 48.0 * (n3 - 5.0 / 16.0 * n5),
            315.0 / 512.0 * n4,
            -693.0 / 1280.0 * n5,
        ];
        let alpha = [
            n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3 + 41.0 / 180.0 * n4 - 127.0 / 288.0 * n5,
            13.0 / 48.0 * n2 - 3.0 / 5.0 * n3 + 557.0 / 1440.0 * n4 + 281.0 / 630.0 * n5,
            61.0 / 240.0 * n3 - 103.0 / 140.0 * n4 + 15061.0 / 26880.0 * n5,
            49561.0 / 161280.0 * n4 - 179.0 / 168.0 * n5,
            34729.0 / 80640.0 * n5,
        ];
        let beta = [
            n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3 - n4 / 360.0 - 81.0 / 512.0 * n5,
            n2 / 48.0 + n3 / 15.0 - 437.0 / 1440.0 * n4 + 46.0 / 105.0 * n5,
            17.0 / 480.0 * n3 - 37.0 / 840.0 * n4 - 209.0 / 4480.0 * n5,
            4397.0 / 161280.0 * n4 - 11.0 / 504.0 * n5,
            4583.0 / 161280.0 * n5,
        ];
        let delta = [
            2.0 * n - 2.0 / 3.0 * n2 - 2.0 * n3 + 116.0 / 45.0 * n4 + 26.0 / 45.0 * n5
                - 2854.0 / 675.0 * n6,
            7.0 / 3.0 * n2 - 8.0 / 5.0 * n3 - 227.0 / 45.0 * n4 + 2704.0 / 315.0 * n5
                + 2323.0 / 945.0 * n6,
            56.0 / 15.0 * n3 - 136.0 / 35.0 * n4 - 1262.0 / 105.0 * n5 + 73814.0 / 2835.0 * n6,
            4279.0 / 630.0 * n4 - 332.0 / 35.0 * n5 - 399572.0 / 14175.0 * n6,
            4174.0 / 315.0 * n5 - 144838.0 / 6237.0 * n6,
            601676.0 / 22275.0 * n6,
        ];

        let scale = SCALE_FACTOR * SEMI_MAJOR_AXIS / (1.0 + n);
        let lat0 = lat0_deg.to_radians();
        let arc = a[0] * lat0
            + (1..=5)
                .map(|j| a[j] * (2.0 * j as f64 * lat0).sin())
                .sum::<f64>();

        Self {
            lon0: lon0_deg.to_radians(),
            n,
            a_bar: scale * a[0],
            s_bar: scale * arc,
            alpha,
            beta,
            delta,
        }
    }

    /// 経緯度[度] → (東方向, 北方向)[m]
    fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let dlon = lon_deg.to_radians() - self.lon0;

        let k = 2.0 * self.n.sqrt() / (1.0 + self.n);
        let t = (lat.sin().atanh() - k * (k * lat.sin()).atanh()).sinh();
        let t_bar = (1.0 + t * t).sqrt();
        let xi = (t / dlon.cos()).atan();
        let eta = (dlon.sin() / t_bar).atanh();

        let mut north = xi;
        let mut east = eta;
        for (j, alpha) in self.alpha.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            north += alpha * (m * xi).sin() * (m * eta).cosh();
            east += alpha * (m * xi).cos() * (m * eta).sinh();
        }
        (self.a_bar * east, self.a_bar * north - self.s_bar)
    }

    /// (東方向, 北方向)[m] → 経緯度[度]
    fn inverse(&self, east: f64, north: f64) -> (f64, f64) {
        let xi = (north + self.s_bar) / self.a_bar;
        let eta = east / self.a_bar;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in self.beta.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi_p -= beta * (m * xi).sin() * (m * eta).cosh();
            eta_p -= beta * (m * xi).cos() * (m * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let lat = chi
            + self
                .delta
                .iter()
                .enumerate()
                .map(|(j, delta)| delta * (2.0 * (j + 1) as f64 * chi).sin())
                .sum::<f64>();
        let lon = self.lon0 + (eta_p.sinh() / xi_p.cos()).atan();
        (lon.to_degrees(), lat.to_degrees())
    }
}

/// 同一測地系内の平面直角座標系・経緯度の変換
#[derive(Debug, Clone, Copy)]
pub struct PlaneTransform {
    source: Option<Projection>,
    destination: Option<Projection>,
}

impl PlaneTransform {
    pub fn new(source: PlaneCrs, destination: PlaneCrs) -> Result<Self> {
        if source.datum() != destination.datum() {
            return Err(DmError::Transform(format!(
                "datum shift is not supported: {:?} -> {:?}",
                source, destination
            )));
        }
        Ok(Self {
            source: source.projection(),
            destination: destination.projection(),
        })
    }

    fn convert(from: Option<&Projection>, to: Option<&Projection>, x: f64, y: f64) -> Result<(f64, f64)> {
        let (lon, lat) = match from {
            Some(p) => p.inverse(x, y),
            None => (x, y),
        };
        let (x, y) = match to {
            Some(p) => p.forward(lon, lat),
            None => (lon, lat),
        };
        if x.is_finite() && y.is_finite() {
            Ok((x, y))
        } else {
            Err(DmError::Transform(format!("cannot transform ({}, {})", x, y)))
        }
    }
}

impl CoordinateTransform for PlaneTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Self::convert(self.source.as_ref(), self.destination.as_ref(), x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Self::convert(self.destination.as_ref(), self.source.as_ref(), x, y)
    }
}

/// 平面直角座標系（JGD2000: EPSG 2443〜2461, JGD2011: EPSG 6669〜6687）と
/// 経緯度（EPSG 4612, 6668）の変換器を作る
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneRectangularFactory;

impl TransformFactory for PlaneRectangularFactory {
    fn create(&self, source: &str, destination: &str) -> Result<Box<dyn CoordinateTransform>> {
        let parse = |srid: &str| {
            PlaneCrs::from_srid(srid)
                .ok_or_else(|| DmError::Transform(format!("unsupported reference system: {}", srid)))
        };
        let (source, destination) = (parse(source)?, parse(destination)?);
        if source == destination {
            return Ok(Box::new(Identity));
        }
        Ok(Box::new(PlaneTransform::new(source, destination)?))
    }
}
