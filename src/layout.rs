//! DMレコードの固定長レイアウト（開始位置, 桁数）。位置は0始まり

pub type Span = (usize, usize);

/// レコードタイプ
pub const RECORD_TYPE: Span = (0, 2);

pub mod tag {
    pub const INDEX: &[u8] = b"I ";
    pub const MESH: &[u8] = b"M ";
    pub const HEADER: &[u8] = b"H ";
    pub const GRID: &[u8] = b"G ";
    pub const TIN: &[u8] = b"T ";
}

/// インデックスレコード: 図郭識別番号レコード数
pub const INDEX_RECORD_COUNT: Span = (37, 2);
/// グリッドレコード: 後続レコード数
pub const GRID_RECORD_COUNT: Span = (26, 4);
/// 不整三角網レコード: 後続レコード数
pub const TIN_RECORD_COUNT: Span = (26, 6);

pub mod mesh {
    use super::Span;

    /// 図郭レコード(a): 地図情報レベル
    pub const LEVEL: Span = (30, 5);
    /// 図郭レコード(a): 修正回数
    pub const MODIFIED_COUNT: Span = (65, 2);
    /// 図郭レコード(b): 左下X座標（北方向）
    pub const ORIGIN_X: Span = (0, 7);
    /// 図郭レコード(b): 左下Y座標（東方向）
    pub const ORIGIN_Y: Span = (7, 7);
    /// 図郭レコード(b): 座標値の単位
    pub const UNIT_CODE: Span = (44, 3);
    /// 図郭レコード(d): 撮影コースレコード数
    pub const COURSE_COUNT: Span = (9, 1);
    /// 図郭レコード(e): 左下図郭の端数座標
    pub const FRACTION_X: Span = (40, 4);
    pub const FRACTION_Y: Span = (44, 4);
    /// 最初の図郭レコード(e)の行位置
    pub const FIRST_FRACTION_ROW: usize = 4;
}

pub mod element {
    use super::Span;

    pub const DMCODE: Span = (2, 4);
    pub const ZUKEI: Span = (18, 2);
    pub const DATA_KUBUN: Span = (20, 1);
    pub const NOTE_KUBUN: Span = (23, 1);
    pub const TENI: Span = (24, 2);
    pub const KANDAN: Span = (26, 1);
    pub const DATA_COUNT: Span = (27, 4);
    pub const RECORD_COUNT: Span = (31, 4);

    /// 記号点・注記の配置座標（Y側フィールドが北方向）
    pub const ANCHOR_Y: Span = (35, 7);
    pub const ANCHOR_X: Span = (42, 7);

    /// 2次元座標セル: 14桁 × 6個/レコード
    pub const CELL_2D_WIDTH: usize = 14;
    pub const CELLS_2D_PER_RECORD: usize = 6;
    /// 3次元座標セル: 21桁 × 4個/レコード
    pub const CELL_3D_WIDTH: usize = 21;
    pub const CELLS_3D_PER_RECORD: usize = 4;
    /// セル内の各軸の桁数
    pub const AXIS_WIDTH: usize = 7;
}

pub mod note {
    use super::Span;

    /// 注記レコード2行目: 縦横区分
    pub const ORIENTATION: Span = (0, 1);
    /// 傾き
    pub const ROTATION: Span = (1, 7);
    /// 字の大きさ(0.1mm)
    pub const SIZE: Span = (8, 5);
    /// 注記文字列の開始位置
    pub const TEXT_START: usize = 20;
    /// 1レコードあたりの文字列バイト数
    pub const TEXT_CHUNK: usize = 64;
}

pub mod header {
    use super::Span;

    /// レイヤヘッダレコードとみなす最小長
    pub const MIN_LENGTH: usize = 69;
    pub const POLYGON_COUNT: Span = (28, 5);
    pub const LINE_COUNT: Span = (33, 5);
    pub const CIRCLE_COUNT: Span = (38, 5);
    pub const ARC_COUNT: Span = (43, 5);
    pub const POINT_COUNT: Span = (48, 5);
    pub const DIRECTION_COUNT: Span = (53, 5);
    pub const NOTE_COUNT: Span = (58, 5);
    /// 数字または空白のみで構成される必要がある範囲
    pub const NUMERIC_RANGE: Span = (2, 66);
    /// 不整三角網の有無（数字1桁）
    pub const TIN_FLAG: usize = 68;
}
