use encoding_rs::SHIFT_JIS;
use tracing::debug;

use crate::error::RecordError;
use crate::field::{extract_bytes, parse_int};
use crate::layout::{element, note as layout};
use crate::mesh::Mesh;
use crate::model::{Element, ElementDetail, ElementHeader};

use super::element::{coord_data_count, read_anchor};

/// 注記区分
const KUBUN_FULL_WIDTH: i32 = 1;
const KUBUN_HALF_WIDTH: i32 = 2;

/// 注記要素。座標取込の共通処理は使わない
pub(crate) fn parse_note(rows: &[Vec<u8>], mesh: &Mesh) -> Result<Element, RecordError> {
    let first = rows.first().ok_or(RecordError::HeaderDecode)?;
    let int_field = |line: &[u8], (start, width): (usize, usize)| {
        parse_int(line, start, width).ok_or(RecordError::HeaderDecode)
    };

    let dmcode = int_field(first, element::DMCODE)?;
    let teni = int_field(first, element::TENI)?;
    // 漢字か英数字かの区分
    let note_kubun = int_field(first, element::NOTE_KUBUN)?;
    // 文字数
    let char_count = coord_data_count(first);
    let anchor = read_anchor(first, mesh);

    let second = rows.get(1).ok_or(RecordError::MissingRecord {
        index: 1,
        declared: 1,
    })?;
    let tateyoko = int_field(second, layout::ORIENTATION)?;
    let angle = int_field(second, layout::ROTATION)?;
    let size = int_field(second, layout::SIZE)?;

    let text = read_text(rows, note_kubun, char_count)?;

    Ok(Element {
        header: ElementHeader {
            dmcode,
            teni,
            ..ElementHeader::default()
        },
        points: vec![anchor],
        detail: ElementDetail::Note {
            tateyoko,
            angle,
            size,
            text,
        },
    })
}

/// 文字列は2行目以降の20桁目から64バイトずつ格納される
fn read_text(rows: &[Vec<u8>], note_kubun: i32, char_count: i32) -> Result<String, RecordError> {
    let byte_count = match note_kubun {
        KUBUN_FULL_WIDTH => char_count.max(0) as usize * 2,
        KUBUN_HALF_WIDTH => char_count.max(0) as usize,
        other => {
            debug!("Unknown note kubun: {}", other);
            char_count.max(0) as usize
        }
    };
    let (full_chunks, remainder) = match note_kubun {
        KUBUN_FULL_WIDTH | KUBUN_HALF_WIDTH => (
            byte_count / layout::TEXT_CHUNK,
            byte_count % layout::TEXT_CHUNK,
        ),
        _ => (0, 0),
    };

    let row = |index: usize| rows.get(index).ok_or(RecordError::TextTruncated);

    // 2バイト文字が行をまたぐため、連結してから一度に変換する
    let mut bytes = Vec::with_capacity(byte_count);
    if byte_count < layout::TEXT_CHUNK {
        let line = row(full_chunks + 1)?;
        bytes.extend_from_slice(extract_bytes(line, layout::TEXT_START, byte_count));
    } else {
        for chunk in 0..full_chunks {
            let line = row(chunk + 1)?;
            bytes.extend_from_slice(extract_bytes(
                line,
                layout::TEXT_START,
                layout::TEXT_CHUNK,
            ));
        }
        if remainder > 0 {
            let line = row(full_chunks + 1)?;
            bytes.extend_from_slice(extract_bytes(line, layout::TEXT_START, remainder));
        }
    }

    let (text, _) = SHIFT_JIS.decode_without_bom_handling(&bytes);
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(line: &mut Vec<u8>, start: usize, bytes: &[u8]) {
        if line.len() < start + bytes.len() {
            line.resize(start + bytes.len(), b' ');
        }
        line[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn mesh() -> Mesh {
        let mut a = b"M ".to_vec();
        put(&mut a, 30, b"  500");
        let mut b = Vec::new();
        put(&mut b, 0, b"   5000");
        put(&mut b, 7, b"   1000");
        put(&mut b, 44, b" 10");
        Mesh::new(&[a, b, Vec::new(), Vec::new(), Vec::new()], 0, &[0])
    }

    fn note_rows(kubun: u8, count: i32, text_rows: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut first = Vec::new();
        put(&mut first, 0, b"E7");
        put(&mut first, 2, b"7101");
        put(&mut first, 23, &[kubun]);
        put(&mut first, 24, b" 1");
        put(&mut first, 27, format!("{:>4}", count).as_bytes());
        put(&mut first, 35, b"    200");
        put(&mut first, 42, b"    300");

        let mut rows = vec![first];
        for (i, text) in text_rows.iter().enumerate() {
            let mut row = Vec::new();
            if i == 0 {
                put(&mut row, 0, b"1     90   25");
            }
            put(&mut row, 20, text);
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_full_width_text_is_decoded() {
        let (encoded, _, _) = SHIFT_JIS.encode("東京都");
        let rows = note_rows(b'1', 3, &[encoded.as_ref()]);
        let element = parse_note(&rows, &mesh()).unwrap();

        assert_eq!(element.header.dmcode, 7101);
        assert_eq!(element.header.teni, 1);
        assert!((element.points[0].x - (1000.0 + 3.0)).abs() < 1e-9);
        assert!((element.points[0].y - (5000.0 + 2.0)).abs() < 1e-9);
        match element.detail {
            ElementDetail::Note {
                tateyoko,
                angle,
                size,
                ref text,
            } => {
                assert_eq!(tateyoko, 1);
                assert_eq!(angle, 90);
                assert_eq!(size, 25);
                assert_eq!(text, "東京都");
            }
            _ => panic!("not a note"),
        }
    }

    #[test]
    fn test_long_text_spans_records() {
        let long: String = std::iter::repeat("A").take(64).collect();
        let rows = note_rows(b'2', 70, &[long.as_bytes(), &b"BCDEFG"[..]]);
        let element = parse_note(&rows, &mesh()).unwrap();
        match element.detail {
            ElementDetail::Note { text, .. } => {
                assert_eq!(text.len(), 70);
                assert!(text.ends_with("ABCDEFG"));
            }
            _ => panic!("not a note"),
        }
    }

    #[test]
    fn test_double_byte_char_split_across_records() {
        // 「駅」(0x89 0x77) の1バイト目が1行目の末尾に入る
        let mut first: Vec<u8> = vec![b'A'; 63];
        first.push(0x89);
        let rows = note_rows(b'2', 65, &[first.as_slice(), &[0x77u8][..]]);
        let element = parse_note(&rows, &mesh()).unwrap();
        match element.detail {
            ElementDetail::Note { text, .. } => {
                assert!(!text.contains('\u{FFFD}'));
                assert_eq!(text.chars().count(), 64);
                assert!(text.starts_with(&"A".repeat(63)));
                assert!(text.ends_with('駅'));
            }
            _ => panic!("not a note"),
        }
    }

    #[test]
    fn test_missing_text_record_is_truncated() {
        let long: String = std::iter::repeat("A").take(64).collect();
        let rows = note_rows(b'2', 70, &[long.as_bytes()]);
        assert_eq!(parse_note(&rows, &mesh()), Err(RecordError::TextTruncated));
    }

    #[test]
    fn test_invalid_attribute_row() {
        let mut rows = note_rows(b'2', 2, &[&b"AB"[..]]);
        put(&mut rows[1], 0, b"x");
        assert_eq!(parse_note(&rows, &mesh()), Err(RecordError::HeaderDecode));

        let mut rows = note_rows(b'2', 2, &[&b"AB"[..]]);
        put(&mut rows[0], 23, b"?");
        assert_eq!(parse_note(&rows, &mesh()), Err(RecordError::HeaderDecode));
    }
}
