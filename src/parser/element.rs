use tracing::debug;

use crate::error::RecordError;
use crate::field::{parse_f64_or_zero, parse_int, parse_int_or_zero};
use crate::layout::element as layout;
use crate::mesh::Mesh;
use crate::model::{Coordinate, ElementHeader};

/// データ区分の2次元/3次元判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DimensionRule {
    /// 2:2次元, 3/6:3次元
    Standard,
    /// 方向データは 0 も2次元として扱う
    Direction,
}

impl DimensionRule {
    fn is_2d(self, data_kubun: i32) -> bool {
        match self {
            DimensionRule::Standard => data_kubun == 2,
            DimensionRule::Direction => data_kubun == 0 || data_kubun == 2,
        }
    }

    fn is_3d(self, data_kubun: i32) -> bool {
        data_kubun == 3 || data_kubun == 6
    }
}

/// 要素レコードの共通ヘッダ。いずれかの数値が読めなければ失敗
pub(crate) fn read_header(record: &[u8]) -> Result<ElementHeader, RecordError> {
    let field = |(start, width): (usize, usize)| {
        parse_int(record, start, width).ok_or(RecordError::HeaderDecode)
    };

    Ok(ElementHeader {
        dmcode: field(layout::DMCODE)?,
        zukei: field(layout::ZUKEI)?,
        kandan: field(layout::KANDAN)?,
        teni: field(layout::TENI)?,
        data_kubun: field(layout::DATA_KUBUN)?,
    })
}

pub(crate) fn coord_data_count(record: &[u8]) -> i32 {
    parse_int_or_zero(record, layout::DATA_COUNT.0, layout::DATA_COUNT.1)
}

pub(crate) fn coord_record_count(record: &[u8]) -> i32 {
    parse_int_or_zero(record, layout::RECORD_COUNT.0, layout::RECORD_COUNT.1)
}

/// 要素レコード上の配置座標（記号点・注記）
pub(crate) fn read_anchor(record: &[u8], mesh: &Mesh) -> Coordinate {
    let x = mesh.x_coord(parse_f64_or_zero(
        record,
        layout::ANCHOR_X.0,
        layout::ANCHOR_X.1,
    ));
    let y = mesh.y_coord(parse_f64_or_zero(
        record,
        layout::ANCHOR_Y.0,
        layout::ANCHOR_Y.1,
    ));
    Coordinate::new(x, y)
}

pub(crate) fn read_symbol_point(
    record: &[u8],
    _header: &ElementHeader,
    mesh: &Mesh,
) -> Result<Coordinate, RecordError> {
    match coord_data_count(record) {
        0 => Ok(read_anchor(record, mesh)),
        count => Err(RecordError::UnsupportedPointData(count)),
    }
}

/// 共通の座標取込。
///
/// 1. ヘッダ取込
/// 2. データ数0は失敗
/// 3. `expected` が指定されていればデータ数と一致すること
/// 4. データ区分で2次元/3次元を切り替える
pub(crate) fn read_coordinates(
    rows: &[Vec<u8>],
    mesh: &Mesh,
    expected: Option<i32>,
    rule: DimensionRule,
) -> Result<(ElementHeader, Vec<Coordinate>), RecordError> {
    let first = rows.first().ok_or(RecordError::HeaderDecode)?;
    let header = read_header(first)?;

    let record_count = coord_record_count(first);
    let data_count = coord_data_count(first);

    if data_count == 0 {
        return Err(RecordError::NoCoordinateData);
    }
    if let Some(expected) = expected {
        if data_count != expected {
            return Err(RecordError::UnexpectedDataCount {
                expected,
                found: data_count,
            });
        }
    }

    let points = if rule.is_2d(header.data_kubun) {
        extract_2d(rows, mesh, record_count, data_count)?
    } else if rule.is_3d(header.data_kubun) {
        extract_3d(rows, mesh, record_count, data_count)?
    } else {
        return Err(RecordError::UnsupportedDataDimension(header.data_kubun));
    };

    if points.is_empty() {
        debug!(
            "No coordinates decoded (records: {}, data: {})",
            record_count, data_count
        );
        return Err(RecordError::NoCoordinateData);
    }

    Ok((header, points))
}

/// 14桁セル（Y=北, X=東の順）を1レコード6個ずつ読む
fn extract_2d(
    rows: &[Vec<u8>],
    mesh: &Mesh,
    record_count: i32,
    data_count: i32,
) -> Result<Vec<Coordinate>, RecordError> {
    let mut points = Vec::with_capacity(data_count.max(0) as usize);
    let mut record_index = 0usize;

    for data_index in 0..data_count.max(0) as usize {
        let cell = data_index % layout::CELLS_2D_PER_RECORD;
        if cell == 0 {
            record_index += 1;
            if record_index as i64 > i64::from(record_count) {
                break;
            }
        }
        let row = rows.get(record_index).ok_or(RecordError::MissingRecord {
            index: record_index,
            declared: record_count,
        })?;

        let offset = cell * layout::CELL_2D_WIDTH;
        let north = parse_f64_or_zero(row, offset, layout::AXIS_WIDTH);
        let east = parse_f64_or_zero(row, offset + layout::AXIS_WIDTH, layout::AXIS_WIDTH);
        points.push(Coordinate::new(mesh.x_coord(east), mesh.y_coord(north)));
    }

    Ok(points)
}

/// 21桁セル（Y, X, Z）を1レコード4個ずつ読む。
///
/// 2次元と異なり、レコード番号が宣言レコード数に達した時点で打ち切る。
fn extract_3d(
    rows: &[Vec<u8>],
    mesh: &Mesh,
    record_count: i32,
    data_count: i32,
) -> Result<Vec<Coordinate>, RecordError> {
    let mut points = Vec::with_capacity(data_count.max(0) as usize);
    let mut record_index = 0usize;

    for data_index in 0..data_count.max(0) as usize {
        let cell = data_index % layout::CELLS_3D_PER_RECORD;
        if cell == 0 {
            record_index += 1;
            if record_index as i64 >= i64::from(record_count) {
                break;
            }
        }
        let row = rows.get(record_index).ok_or(RecordError::MissingRecord {
            index: record_index,
            declared: record_count,
        })?;

        let offset = cell * layout::CELL_3D_WIDTH;
        let north = parse_f64_or_zero(row, offset, layout::AXIS_WIDTH);
        let east = parse_f64_or_zero(row, offset + layout::AXIS_WIDTH, layout::AXIS_WIDTH);
        // 標高は単位換算しない
        let z = parse_int_or_zero(row, offset + 2 * layout::AXIS_WIDTH, layout::AXIS_WIDTH);
        points.push(Coordinate::with_z(
            mesh.x_coord(east),
            mesh.y_coord(north),
            f64::from(z),
        ));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(line: &mut Vec<u8>, start: usize, text: &str) {
        if line.len() < start + text.len() {
            line.resize(start + text.len(), b' ');
        }
        line[start..start + text.len()].copy_from_slice(text.as_bytes());
    }

    fn header_record(tag: &str, data_kubun: i32, data_count: i32, record_count: i32) -> Vec<u8> {
        let mut line = Vec::new();
        put(&mut line, 0, tag);
        put(&mut line, 2, "2101");
        put(&mut line, 18, " 1");
        put(&mut line, 20, &data_kubun.to_string());
        put(&mut line, 24, " 0");
        put(&mut line, 26, "0");
        put(&mut line, 27, &format!("{:>4}", data_count));
        put(&mut line, 31, &format!("{:>4}", record_count));
        line
    }

    fn mesh() -> Mesh {
        let mut a = b"M ".to_vec();
        put(&mut a, 30, "  500");
        let mut b = Vec::new();
        put(&mut b, 0, "   1000");
        put(&mut b, 7, "   2000");
        put(&mut b, 44, "  1");
        Mesh::new(&[a, b, Vec::new(), Vec::new(), Vec::new()], 0, &[0])
    }

    #[test]
    fn test_header_decode_failure() {
        let mut line = header_record("E2", 2, 1, 1);
        put(&mut line, 2, "ab12");
        assert_eq!(read_header(&line), Err(RecordError::HeaderDecode));
    }

    #[test]
    fn test_2d_cells_span_records() {
        let first = header_record("E2", 2, 7, 2);
        let mut r1 = Vec::new();
        for i in 0..6 {
            put(&mut r1, i * 14, &format!("{:>7}{:>7}", i * 1000, i * 2000));
        }
        let mut r2 = Vec::new();
        put(&mut r2, 0, &format!("{:>7}{:>7}", 500, 700));
        let rows = vec![first, r1, r2];

        let (header, points) = read_coordinates(&rows, &mesh(), None, DimensionRule::Standard).unwrap();
        assert_eq!(header.dmcode, 2101);
        assert_eq!(points.len(), 7);
        // セル先頭が北方向
        assert!((points[1].x - (2000.0 + 2.0)).abs() < 1e-9);
        assert!((points[1].y - (1000.0 + 1.0)).abs() < 1e-9);
        assert!((points[6].x - 2000.7).abs() < 1e-9);
        assert!((points[6].y - 1000.5).abs() < 1e-9);
    }

    #[test]
    fn test_2d_stops_at_declared_record_count() {
        let first = header_record("E2", 2, 8, 1);
        let mut r1 = Vec::new();
        for i in 0..6 {
            put(&mut r1, i * 14, &format!("{:>7}{:>7}", i, i));
        }
        let rows = vec![first, r1];
        let (_, points) = read_coordinates(&rows, &mesh(), None, DimensionRule::Standard).unwrap();
        assert_eq!(points.len(), 6);
    }

    #[test]
    fn test_3d_stops_when_reaching_record_count() {
        let first = header_record("E2", 3, 5, 3);
        let mut r1 = Vec::new();
        for i in 0..4 {
            put(&mut r1, i * 21, &format!("{:>7}{:>7}{:>7}", i, i, 10 + i));
        }
        let mut r2 = Vec::new();
        put(&mut r2, 0, &format!("{:>7}{:>7}{:>7}", 9, 9, 99));
        let rows = vec![first, r1, r2];
        let (_, points) = read_coordinates(&rows, &mesh(), None, DimensionRule::Standard).unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[2].z, Some(12.0));
        assert_eq!(points[4].z, Some(99.0));

        // 宣言レコード数1では座標レコードに到達しない
        let first = header_record("E2", 3, 2, 1);
        let rows = vec![first, Vec::new()];
        assert_eq!(
            read_coordinates(&rows, &mesh(), None, DimensionRule::Standard),
            Err(RecordError::NoCoordinateData)
        );
    }

    #[test]
    fn test_pipeline_failures() {
        let rows = vec![header_record("E1", 2, 0, 0)];
        assert_eq!(
            read_coordinates(&rows, &mesh(), None, DimensionRule::Standard),
            Err(RecordError::NoCoordinateData)
        );

        let rows = vec![header_record("E3", 2, 4, 1), Vec::new()];
        assert_eq!(
            read_coordinates(&rows, &mesh(), Some(3), DimensionRule::Standard),
            Err(RecordError::UnexpectedDataCount {
                expected: 3,
                found: 4
            })
        );

        let rows = vec![header_record("E2", 5, 1, 1), Vec::new()];
        assert_eq!(
            read_coordinates(&rows, &mesh(), None, DimensionRule::Standard),
            Err(RecordError::UnsupportedDataDimension(5))
        );

        let rows = vec![header_record("E6", 0, 2, 1), b"      0      0     10     10".to_vec()];
        assert!(read_coordinates(&rows, &mesh(), None, DimensionRule::Direction).is_ok());
        assert_eq!(
            read_coordinates(&rows, &mesh(), None, DimensionRule::Standard),
            Err(RecordError::UnsupportedDataDimension(0))
        );
    }

    #[test]
    fn test_missing_continuation_record() {
        let rows = vec![header_record("E2", 2, 2, 1)];
        assert_eq!(
            read_coordinates(&rows, &mesh(), None, DimensionRule::Standard),
            Err(RecordError::MissingRecord {
                index: 1,
                declared: 1
            })
        );
    }
}
