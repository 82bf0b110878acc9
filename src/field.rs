//! 固定長レコードからのフィールド切り出し

use std::borrow::Cow;

/// 行末まで読むことを示す幅
pub const TO_END: usize = usize::MAX;

/// `line` の `start` から `width` バイトを切り出す。
///
/// 幅0や範囲外の開始位置は空文字列を返す（エラーにはしない）。
/// 呼び出し側は空文字列を「フィールドなし」として扱うこと。
pub fn extract_field(line: &[u8], trim: bool, start: usize, width: usize) -> Cow<'_, str> {
    let raw = extract_bytes(line, start, width);
    let text = String::from_utf8_lossy(raw);
    if trim {
        match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
            Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
        }
    } else {
        text
    }
}

/// 生バイト列のまま切り出す（注記文字列のデコード用）
pub fn extract_bytes(line: &[u8], start: usize, width: usize) -> &[u8] {
    if width == 0 || start >= line.len() {
        return &[];
    }
    let end = start.saturating_add(width).min(line.len());
    &line[start..end]
}

/// 整数フィールド。解析失敗は `None` で、0 とは区別される
pub fn parse_int(line: &[u8], start: usize, width: usize) -> Option<i32> {
    extract_field(line, true, start, width).parse().ok()
}

/// 件数系フィールド。解析できない場合は 0 とみなす
pub fn parse_int_or_zero(line: &[u8], start: usize, width: usize) -> i32 {
    parse_int(line, start, width).unwrap_or(0)
}

pub fn parse_f64(line: &[u8], start: usize, width: usize) -> Option<f64> {
    extract_field(line, true, start, width).parse().ok()
}

/// 座標値フィールド。空欄・不正値は 0 として扱う
pub fn parse_f64_or_zero(line: &[u8], start: usize, width: usize) -> f64 {
    parse_f64(line, start, width).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_trimmed_and_raw() {
        let line = b"E1  12        ";
        assert_eq!(extract_field(line, false, 0, 2), "E1");
        assert_eq!(extract_field(line, true, 2, 4), "12");
        assert_eq!(extract_field(line, false, 2, 4), "  12");
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let line = b"M 123";
        assert_eq!(extract_field(line, true, 10, 3), "");
        assert_eq!(extract_field(line, true, 0, 0), "");
        assert_eq!(extract_field(line, true, 2, 10), "123");
        assert_eq!(extract_field(line, true, 2, TO_END), "123");
    }

    #[test]
    fn test_parse_failure_differs_from_zero() {
        let line = b"   0  ab    ";
        assert_eq!(parse_int(line, 0, 4), Some(0));
        assert_eq!(parse_int(line, 4, 4), None);
        assert_eq!(parse_int(line, 8, 4), None);
        assert_eq!(parse_int_or_zero(line, 8, 4), 0);
    }

    #[test]
    fn test_parse_signed_values() {
        let line = b"  -1234   +56";
        assert_eq!(parse_int(line, 0, 7), Some(-1234));
        assert_eq!(parse_f64(line, 7, 6), Some(56.0));
        assert_eq!(parse_f64_or_zero(line, 20, 7), 0.0);
    }
}
