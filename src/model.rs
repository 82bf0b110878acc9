use std::fmt;
use std::str::FromStr;

use crate::error::DmError;

/// 座標値（x=東方向, y=北方向）。3次元データのみ z を持つ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

/// 要素の種別。`token` はデータソースURIの `dataType` に対応する
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Polygon,
    Line,
    Circle,
    Arc,
    Point,
    Direction,
    Note,
}

impl ElementKind {
    pub const ALL: [ElementKind; 7] = [
        ElementKind::Polygon,
        ElementKind::Line,
        ElementKind::Circle,
        ElementKind::Arc,
        ElementKind::Point,
        ElementKind::Direction,
        ElementKind::Note,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ElementKind::Polygon => "dm_pg",
            ElementKind::Line => "dm_pl",
            ElementKind::Circle => "dm_cir",
            ElementKind::Arc => "dm_arc",
            ElementKind::Point => "dm_pt",
            ElementKind::Direction => "dm_dir",
            ElementKind::Note => "dm_tx",
        }
    }

    /// 要素レコードのタグ（E1〜E7）
    pub fn record_tag(self) -> &'static [u8] {
        match self {
            ElementKind::Polygon => b"E1",
            ElementKind::Line => b"E2",
            ElementKind::Circle => b"E3",
            ElementKind::Arc => b"E4",
            ElementKind::Point => b"E5",
            ElementKind::Direction => b"E6",
            ElementKind::Note => b"E7",
        }
    }

    pub fn from_record_tag(tag: &[u8]) -> Option<Self> {
        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.record_tag() == tag)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ElementKind {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.token() == lower)
            .ok_or_else(|| DmError::InvalidDefinition(format!("unknown data type: {}", s)))
    }
}

/// 全要素に共通するヘッダ属性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementHeader {
    /// 地図分類コード
    pub dmcode: i32,
    /// 図形区分
    pub zukei: i32,
    /// 間断区分
    pub kandan: i32,
    /// 転移区分
    pub teni: i32,
    /// データ区分（2:2次元, 3/6:3次元）
    pub data_kubun: i32,
}

/// 種別ごとの固有属性
#[derive(Debug, Clone, PartialEq)]
pub enum ElementDetail {
    Polygon,
    Line,
    Circle { center: Coordinate, radius: f64 },
    Arc { center: Coordinate, radius: f64 },
    Point,
    Direction {
        /// 始点から終点への方位角（度）
        angle: f64,
    },
    Note {
        /// 0:横書き / 1:縦書き
        tateyoko: i32,
        /// 傾き（度）
        angle: i32,
        /// 字の大きさ（0.1mm）
        size: i32,
        text: String,
    },
}

/// 1つの要素レコード群から復元した地物
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub header: ElementHeader,
    pub points: Vec<Coordinate>,
    pub detail: ElementDetail,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self.detail {
            ElementDetail::Polygon => ElementKind::Polygon,
            ElementDetail::Line => ElementKind::Line,
            ElementDetail::Circle { .. } => ElementKind::Circle,
            ElementDetail::Arc { .. } => ElementKind::Arc,
            ElementDetail::Point => ElementKind::Point,
            ElementDetail::Direction { .. } => ElementKind::Direction,
            ElementDetail::Note { .. } => ElementKind::Note,
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// 属性名（大文字小文字を区別しない）から値を取得する
    pub fn field_value(&self, name: &str) -> AttributeValue {
        let name = name.to_ascii_lowercase();
        if let ElementDetail::Note {
            tateyoko,
            angle,
            size,
            text,
        } = &self.detail
        {
            return match name.as_str() {
                "dmcode" => AttributeValue::Int(self.header.dmcode.into()),
                "teni" => AttributeValue::Int(self.header.teni.into()),
                "vangle" => AttributeValue::Double(f64::from(*angle)),
                "tateyoko" => AttributeValue::Int((*tateyoko).into()),
                "size" => AttributeValue::Int((*size).into()),
                "vtext" => AttributeValue::Text(text.clone()),
                _ => AttributeValue::Null,
            };
        }

        match name.as_str() {
            "dmcode" => AttributeValue::Int(self.header.dmcode.into()),
            "zukei" => AttributeValue::Int(self.header.zukei.into()),
            "kandan" => AttributeValue::Int(self.header.kandan.into()),
            "teni" => AttributeValue::Int(self.header.teni.into()),
            "vangle" => match self.detail {
                ElementDetail::Direction { angle } => AttributeValue::Double(angle),
                _ => AttributeValue::Null,
            },
            _ => AttributeValue::Null,
        }
    }
}

/// 地物属性値
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttributeValue {
    #[default]
    Null,
    Int(i64),
    Double(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("NULL"),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => f.write_str(v),
        }
    }
}
