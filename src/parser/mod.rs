//! 要素レコード群から地物を復元する

mod arc;
mod element;
mod note;

pub use arc::{arc_angles, circle_through, sample_circle};

use crate::error::RecordError;
use crate::mesh::Mesh;
use crate::model::{Coordinate, Element, ElementDetail, ElementKind};

use element::{read_coordinates, read_header, read_symbol_point, DimensionRule};

/// 円・円弧は3点で定義される
const ARC_SAMPLE_COUNT: i32 = 3;

/// 要素種別に応じて `rows`（先頭が要素レコード）を地物に変換する。
///
/// 失敗時は部分的な結果を返さない。
pub fn parse_element(
    kind: ElementKind,
    rows: &[Vec<u8>],
    mesh: &Mesh,
) -> Result<Element, RecordError> {
    match kind {
        ElementKind::Polygon => parse_polygon(rows, mesh),
        ElementKind::Line => parse_line(rows, mesh),
        ElementKind::Circle => parse_circle(rows, mesh),
        ElementKind::Arc => parse_arc(rows, mesh),
        ElementKind::Point => parse_point(rows, mesh),
        ElementKind::Direction => parse_direction(rows, mesh),
        ElementKind::Note => note::parse_note(rows, mesh),
    }
}

pub fn parse_polygon(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let (header, points) = read_coordinates(rows, mesh, None, DimensionRule::Standard)?;
    Ok(Element {
        header,
        points,
        detail: ElementDetail::Polygon,
    })
}

pub fn parse_line(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let (header, points) = read_coordinates(rows, mesh, None, DimensionRule::Standard)?;
    Ok(Element {
        header,
        points,
        detail: ElementDetail::Line,
    })
}

pub fn parse_circle(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let (header, samples) = read_coordinates(
        rows,
        mesh,
        Some(ARC_SAMPLE_COUNT),
        DimensionRule::Standard,
    )?;
    let (center, radius) = sample_triplet(&samples).and_then(|[a, b, c]| circle_through(a, b, c))?;

    Ok(Element {
        header,
        points: sample_circle(center, radius),
        detail: ElementDetail::Circle { center, radius },
    })
}

pub fn parse_arc(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let (header, samples) = read_coordinates(
        rows,
        mesh,
        Some(ARC_SAMPLE_COUNT),
        DimensionRule::Standard,
    )?;
    let [start, via, end] = sample_triplet(&samples)?;
    let (center, radius) = circle_through(start, via, end)?;

    let bearing = |p: Coordinate| (p.y - center.y).atan2(p.x - center.x).to_degrees();
    let angles = arc_angles(bearing(start), bearing(via), bearing(end));

    let mut points: Vec<_> = angles
        .iter()
        .map(|deg| {
            let rad = deg.to_radians();
            Coordinate::new(
                center.x + radius * rad.cos(),
                center.y + radius * rad.sin(),
            )
        })
        .collect();
    // 終点は計算値ではなく入力値そのもの
    points.push(Coordinate::new(end.x, end.y));

    Ok(Element {
        header,
        points,
        detail: ElementDetail::Arc { center, radius },
    })
}

/// 記号点のみ対象。データ数0以外（標高点群）は対象外
pub fn parse_point(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let first = rows.first().ok_or(RecordError::HeaderDecode)?;
    let header = read_header(first)?;
    let point = read_symbol_point(first, &header, mesh)?;
    Ok(Element {
        header,
        points: vec![point],
        detail: ElementDetail::Point,
    })
}

/// 2点の線として読み、方位角を求めた後に始点のみを残す
pub fn parse_direction(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let (header, mut points) = read_coordinates(rows, mesh, None, DimensionRule::Direction)?;
    if points.len() < 2 {
        return Err(RecordError::DirectionTooShort(points.len()));
    }
    let angle = (points[1].y - points[0].y)
        .atan2(points[1].x - points[0].x)
        .to_degrees();
    points.truncate(1);

    Ok(Element {
        header,
        points,
        detail: ElementDetail::Direction { angle },
    })
}

fn sample_triplet(
    samples: &[Coordinate],
) -> Result<[Coordinate; 3], RecordError> {
    match samples {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(RecordError::UnexpectedDataCount {
            expected: ARC_SAMPLE_COUNT,
            found: samples.len() as i32,
        }),
    }
}
