use crate::error::RecordError;
use crate::model::Coordinate;

/// 円周の分割角度（度）
const CIRCLE_STEP_DEG: f64 = 10.0;

/// 共線判定の相対許容値
const COLLINEAR_TOLERANCE: f64 = 1e-12;

/// 3点を通る円の中心と半径
///
/// 3点が同一直線上にある場合は [`RecordError::DegenerateCircle`]。
pub fn circle_through(
    a: Coordinate,
    b: Coordinate,
    c: Coordinate,
) -> Result<(Coordinate, f64), RecordError> {
    let (x1, y1) = (a.x, a.y);
    let (x2, y2) = (b.x, b.y);
    let (x3, y3) = (c.x, c.y);

    let d = 2.0 * ((y1 - y3) * (x1 - x2) - (y1 - y2) * (x1 - x3));

    // 3点の広がりに対する相対値で判定する
    let spread = [x1 - x2, x1 - x3, y1 - y2, y1 - y3]
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !d.is_finite() || d.abs() <= COLLINEAR_TOLERANCE * spread * spread || spread == 0.0 {
        return Err(RecordError::DegenerateCircle);
    }

    let s12 = y1 * y1 - y2 * y2 + x1 * x1 - x2 * x2;
    let s13 = y1 * y1 - y3 * y3 + x1 * x1 - x3 * x3;
    let x = ((y1 - y3) * s12 - (y1 - y2) * s13) / d;
    let y = ((x1 - x3) * s12 - (x1 - x2) * s13) / -d;

    let radius = ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
    if !x.is_finite() || !y.is_finite() || !radius.is_finite() {
        return Err(RecordError::DegenerateCircle);
    }

    Ok((Coordinate::new(x, y), radius))
}

/// 0度から360度まで10度刻みの37点（始点と終点は同一点）
pub fn sample_circle(center: Coordinate, radius: f64) -> Vec<Coordinate> {
    (0..=36)
        .map(|i| {
            let rad = (f64::from(i) * CIRCLE_STEP_DEG).to_radians();
            Coordinate::new(center.x + radius * rad.cos(), center.y + radius * rad.sin())
        })
        .collect()
}

/// 始点から1度刻みで回す角度列（終点は含まない）。
///
/// 始点基準で経由点・終点の角度を 0〜360 に正規化し、経由点が終点以下なら
/// 増加方向に終点角度ぶん、そうでなければ減少方向に `360 - 終点角度` ぶん回す。
pub fn arc_angles(start_deg: f64, via_deg: f64, end_deg: f64) -> Vec<f64> {
    let via = normalize(via_deg - start_deg);
    let end = normalize(end_deg - start_deg);

    let (sweep, step) = if via <= end {
        (end, 1.0)
    } else {
        (360.0 - end, -1.0)
    };

    let count = sweep.ceil().max(0.0) as usize;
    (0..count)
        .map(|i| start_deg + i as f64 * step)
        .collect()
}

fn normalize(deg: f64) -> f64 {
    if deg < 0.0 {
        deg + 360.0
    } else if deg > 360.0 {
        deg - 360.0
    } else {
        deg
    }
}
