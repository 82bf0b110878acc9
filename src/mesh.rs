use crate::field::{parse_f64_or_zero, parse_int_or_zero};
use crate::layout::mesh as layout;
use crate::model::Coordinate;

/// 1図郭分の座標系（原点と座標値の単位）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    /// 地図情報レベル
    level: i32,
    /// 図郭の原点（左下）
    origin: Coordinate,
    /// 座標値の単位（m）
    unit: f64,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::degenerate()
    }
}

impl Mesh {
    /// 原点・単位ともに0の図郭。ヘッダが壊れている場合に使われる
    pub fn degenerate() -> Self {
        Self {
            level: 0,
            origin: Coordinate::new(0.0, 0.0),
            unit: 0.0,
        }
    }

    /// 図郭レコード群から原点と単位を決定する。
    ///
    /// `modified_count` は採用する修正回数、`course_counts` は各回の
    /// 図郭レコード(f)の件数。最終修正回の図郭レコード(e)から端数座標を読む。
    pub fn new(rows: &[Vec<u8>], modified_count: usize, course_counts: &[usize]) -> Self {
        let (Some(first), Some(second)) = (rows.first(), rows.get(1)) else {
            return Self::degenerate();
        };

        let level = parse_int_or_zero(first, layout::LEVEL.0, layout::LEVEL.1);
        let unit = unit_from_code(parse_int_or_zero(
            second,
            layout::UNIT_CODE.0,
            layout::UNIT_CODE.1,
        ));

        // 端数単位
        let fraction_unit = if level < 2500 { 0.001 } else { 0.01 };

        // 図郭レコード(d)(e)(f)は新規+修正回数分繰り返している
        let mut fraction_row = layout::FIRST_FRACTION_ROW;
        for cycle in 0..modified_count {
            let Some(count) = course_counts.get(cycle) else {
                return Self::degenerate();
            };
            fraction_row += 2 + count;
        }
        let Some(fraction) = rows.get(fraction_row) else {
            return Self::degenerate();
        };

        let fraction_x = parse_f64_or_zero(fraction, layout::FRACTION_X.0, layout::FRACTION_X.1)
            * fraction_unit;
        let fraction_y = parse_f64_or_zero(fraction, layout::FRACTION_Y.0, layout::FRACTION_Y.1)
            * fraction_unit;

        // Y（東方向）フィールドがx原点、X（北方向）フィールドがy原点になる
        let x = parse_f64_or_zero(second, layout::ORIGIN_Y.0, layout::ORIGIN_Y.1) + fraction_y;
        let y = parse_f64_or_zero(second, layout::ORIGIN_X.0, layout::ORIGIN_X.1) + fraction_x;

        Self {
            level,
            origin: Coordinate::new(x, y),
            unit,
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn unit(&self) -> f64 {
        self.unit
    }

    /// 図郭内座標値（東方向）を絶対座標に変換する
    pub fn x_coord(&self, value: f64) -> f64 {
        self.origin.x + value * self.unit
    }

    /// 図郭内座標値（北方向）を絶対座標に変換する
    pub fn y_coord(&self, value: f64) -> f64 {
        self.origin.y + value * self.unit
    }
}

/// 単位コード: 1=mm, 10=cm, それ以外はm（本来は999のみ）
fn unit_from_code(code: i32) -> f64 {
    match code {
        1 => 0.001,
        10 => 0.01,
        _ => 1.0,
    }
}
