//! DMディレクトリの読込
//!
//! ディレクトリ内の `*.dm` をファイル名順に読み、レコードタイプごとに
//! 後続レコードをまとめて図郭・要素に振り分ける。

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::{DmError, RecordError, Result};
use crate::field::{extract_bytes, parse_int_or_zero};
use crate::layout::{self, header, mesh as mesh_layout, tag};
use crate::mesh::Mesh;
use crate::model::{Element, ElementKind};
use crate::parser::parse_element;

/// 取込エラーとして保持する件数の上限
pub const MAX_REJECTED_RECORDS: usize = 50;

/// 読込条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// 指定された種別以外の要素は生成しない（レコードは読み飛ばす）
    pub kind: Option<ElementKind>,
    /// 採用する修正回数の上限。`None` は最新
    pub overwriting_times: Option<usize>,
}

/// 取込に失敗した要素
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub path: PathBuf,
    /// 要素レコードの行番号（1始まり）
    pub line: usize,
    pub kind: ElementKind,
    pub error: RecordError,
}

impl std::fmt::Display for RejectedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} {}",
            self.path.display(),
            self.line,
            self.kind,
            self.error
        )
    }
}

/// 読み込んだ図郭と種別ごとの要素コレクション
#[derive(Debug, Clone, Default)]
pub struct ElementStore {
    meshes: Vec<Mesh>,
    collections: [Vec<Element>; 7],
    rejected: Vec<RejectedRecord>,
    additional_rejected: usize,
}

impl ElementStore {
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// 種別のコレクション。レコードIDは1始まりの位置
    pub fn elements(&self, kind: ElementKind) -> &[Element] {
        &self.collections[kind.index()]
    }

    pub fn element(&self, kind: ElementKind, record_id: usize) -> Option<&Element> {
        record_id
            .checked_sub(1)
            .and_then(|index| self.collections[kind.index()].get(index))
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.collections[kind.index()].len()
    }

    /// 先頭 [`MAX_REJECTED_RECORDS`] 件の取込エラー
    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    /// 上限を超えて保持しなかった取込エラーの件数
    pub fn additional_rejected(&self) -> usize {
        self.additional_rejected
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.len() + self.additional_rejected
    }

    fn push_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    fn push_element(&mut self, element: Element) {
        let index = element.kind().index();
        self.collections[index].push(element);
    }

    fn reject(&mut self, record: RejectedRecord) {
        debug!("Rejected record: {}", record);
        if self.rejected.len() < MAX_REJECTED_RECORDS {
            self.rejected.push(record);
        } else {
            self.additional_rejected += 1;
        }
    }
}

/// ディレクトリ内のDMファイル（拡張子 `.dm`、大文字小文字を区別しない）をファイル名順に返す
pub fn dm_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DmError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DmError::io(dir, e))? {
        let path = entry.map_err(|e| DmError::io(dir, e))?.path();
        let is_dm = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dm"));
        if is_dm && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(DmError::NoDmFiles {
            path: dir.to_path_buf(),
        });
    }
    files.sort();
    Ok(files)
}

/// ディレクトリ全体を読み込む。いずれかのファイルが読めなければ全体を失敗とする
pub fn read_dir(dir: &Path, options: ReadOptions) -> Result<ElementStore> {
    let files = dm_files(dir)?;
    info!("Reading {} DM files from {:?}", files.len(), dir);

    let mut store = ElementStore::default();
    for path in &files {
        let file = File::open(path).map_err(|e| DmError::io(path, e))?;
        read_records(BufReader::new(file), path, options, &mut store)?;
    }

    debug!(
        "Read {} meshes, {} rejected records",
        store.meshes.len(),
        store.rejected_total()
    );
    Ok(store)
}

/// 1行ずつ読み、行末の改行を取り除く
struct LineSource<R> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> LineSource<R> {
    fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }

    fn at_end(&mut self) -> std::io::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        self.line_no += 1;
        Ok(Some(line))
    }

    /// 最大 `count` 行を `rows` に追加する
    fn take_lines(&mut self, rows: &mut Vec<Vec<u8>>, count: usize) -> std::io::Result<()> {
        for _ in 0..count {
            match self.next_line()? {
                Some(line) => rows.push(line),
                None => break,
            }
        }
        Ok(())
    }
}

/// 1ファイル分のレコードを `store` に追加する
pub fn read_records<R: BufRead>(
    reader: R,
    path: &Path,
    options: ReadOptions,
    store: &mut ElementStore,
) -> Result<()> {
    let mut source = LineSource::new(reader);
    let io_err = |e| DmError::io(path, e);

    while let Some(line) = source.next_line().map_err(io_err)? {
        let line_no = source.line_no;
        let record_type = extract_bytes(&line, layout::RECORD_TYPE.0, layout::RECORD_TYPE.1);

        match record_type {
            tag::INDEX => {
                let count = count_field(&line, layout::INDEX_RECORD_COUNT);
                source.take_lines(&mut Vec::new(), count).map_err(io_err)?;
            }
            tag::MESH => {
                let mesh = read_mesh(&mut source, line, options.overwriting_times)
                    .map_err(io_err)?;
                store.push_mesh(mesh);
            }
            // グループヘッダは1行のみ
            tag::HEADER => {}
            tag::GRID => {
                let count = count_field(&line, layout::GRID_RECORD_COUNT);
                source.take_lines(&mut Vec::new(), count).map_err(io_err)?;
            }
            tag::TIN => {
                let count = count_field(&line, layout::TIN_RECORD_COUNT);
                source.take_lines(&mut Vec::new(), count).map_err(io_err)?;
            }
            [b'E', digit] if digit.is_ascii_digit() => {
                let count = count_field(&line, layout::element::RECORD_COUNT);
                let mut rows = Vec::with_capacity(count + 1);
                rows.push(line);
                source.take_lines(&mut rows, count).map_err(io_err)?;

                // E8（属性）などは読み飛ばす
                let Some(kind) = ElementKind::from_record_tag(record_type_of(&rows[0])) else {
                    continue;
                };
                if options.kind.is_some_and(|wanted| wanted != kind) {
                    continue;
                }

                let parsed = match store.meshes.last() {
                    Some(mesh) => parse_element(kind, &rows, mesh),
                    None => Err(RecordError::NoMesh),
                };
                match parsed {
                    Ok(element) => store.push_element(element),
                    Err(error) => store.reject(RejectedRecord {
                        path: path.to_path_buf(),
                        line: line_no,
                        kind,
                        error,
                    }),
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn record_type_of(line: &[u8]) -> &[u8] {
    extract_bytes(line, layout::RECORD_TYPE.0, layout::RECORD_TYPE.1)
}

fn count_field(line: &[u8], (start, width): layout::Span) -> usize {
    parse_int_or_zero(line, start, width).max(0) as usize
}

/// 図郭レコード(a)に続く(b)(c)と、新規+修正回数分の(d)(e)(f)を読む
fn read_mesh<R: BufRead>(
    source: &mut LineSource<R>,
    first: Vec<u8>,
    overwriting_times: Option<usize>,
) -> std::io::Result<Mesh> {
    let recorded = count_field(&first, mesh_layout::MODIFIED_COUNT);
    let modified_count = overwriting_times.map_or(recorded, |times| times.min(recorded));

    let mut rows = vec![first];
    // (b)(c)
    source.take_lines(&mut rows, 2)?;

    let mut course_counts = Vec::new();
    for _ in 0..=recorded {
        // (d)
        let Some(d) = source.next_line()? else {
            break;
        };
        let course_count = count_field(&d, mesh_layout::COURSE_COUNT);
        rows.push(d);
        if source.at_end()? {
            break;
        }
        course_counts.push(course_count);
        // (e)
        source.take_lines(&mut rows, 1)?;
        // (f)
        source.take_lines(&mut rows, course_count)?;
    }

    Ok(Mesh::new(&rows, modified_count, &course_counts))
}

/// グループヘッダから集計した種別ごとの要素数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSurvey {
    counts: [u64; 7],
}

impl KindSurvey {
    pub fn count(&self, kind: ElementKind) -> u64 {
        self.counts[kind.index()]
    }

    pub fn has(&self, kind: ElementKind) -> bool {
        self.count(kind) > 0
    }

    /// いずれかの種別にデータがあるか
    pub fn any(&self) -> bool {
        self.counts.iter().any(|&c| c > 0)
    }

    fn all(&self) -> bool {
        self.counts.iter().all(|&c| c > 0)
    }

    pub fn kinds(&self) -> Vec<ElementKind> {
        ElementKind::ALL
            .into_iter()
            .filter(|&kind| self.has(kind))
            .collect()
    }

    fn add_header(&mut self, line: &[u8]) -> bool {
        if !is_layer_header(line) {
            return false;
        }
        let spans = [
            header::POLYGON_COUNT,
            header::LINE_COUNT,
            header::CIRCLE_COUNT,
            header::ARC_COUNT,
            header::POINT_COUNT,
            header::DIRECTION_COUNT,
            header::NOTE_COUNT,
        ];
        for (count, (start, width)) in self.counts.iter_mut().zip(spans) {
            *count += parse_int_or_zero(line, start, width).max(0) as u64;
        }
        true
    }
}

/// レイヤヘッダレコードの形をしているか
fn is_layer_header(line: &[u8]) -> bool {
    if record_type_of(line) != tag::HEADER || line.len() < header::MIN_LENGTH {
        return false;
    }
    let (start, width) = header::NUMERIC_RANGE;
    let numeric = line[start..start + width]
        .iter()
        .all(|b| *b == b' ' || b.is_ascii_digit());
    numeric && line[header::TIN_FLAG].is_ascii_digit()
}

/// グループヘッダの要素数を集計する。全種別が見つかった時点で打ち切る
pub fn survey_dir(dir: &Path) -> Result<KindSurvey> {
    let mut survey = KindSurvey::default();
    for path in dm_files(dir)? {
        let file = File::open(&path).map_err(|e| DmError::io(&path, e))?;
        let mut source = LineSource::new(BufReader::new(file));
        while let Some(line) = source.next_line().map_err(|e| DmError::io(&path, e))? {
            if survey.add_header(&line) && survey.all() {
                return Ok(survey);
            }
        }
    }
    Ok(survey)
}

/// ファイル構成の指紋（名前・サイズ・更新時刻）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryFingerprint(Vec<(PathBuf, u64, Option<SystemTime>)>);

pub fn fingerprint(dir: &Path) -> Result<DirectoryFingerprint> {
    let mut entries = Vec::new();
    for path in dm_files(dir)? {
        let meta = fs::metadata(&path).map_err(|e| DmError::io(&path, e))?;
        entries.push((path, meta.len(), meta.modified().ok()));
    }
    Ok(DirectoryFingerprint(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn put(line: &mut Vec<u8>, start: usize, text: &str) {
        if line.len() < start + text.len() {
            line.resize(start + text.len(), b' ');
        }
        line[start..start + text.len()].copy_from_slice(text.as_bytes());
    }

    fn text(lines: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    fn mesh_block(x: i32, y: i32, revisions: &[i32]) -> Vec<Vec<u8>> {
        let mut a = Vec::new();
        put(&mut a, 0, "M ");
        put(&mut a, 30, " 2500");
        put(&mut a, 65, &format!("{:>2}", revisions.len() - 1));
        let mut b = Vec::new();
        put(&mut b, 0, &format!("{:>7}", y));
        put(&mut b, 7, &format!("{:>7}", x));
        put(&mut b, 44, "999");
        let mut rows = vec![a, b, b"c".to_vec()];
        for &fraction in revisions {
            let mut d = Vec::new();
            put(&mut d, 9, "1");
            let mut e = Vec::new();
            put(&mut e, 40, &format!("{:>4}{:>4}", 0, fraction));
            rows.push(d);
            rows.push(e);
            rows.push(b"f".to_vec());
        }
        rows
    }

    fn line_element(points: &[(i32, i32)]) -> Vec<Vec<u8>> {
        let mut first = Vec::new();
        put(&mut first, 0, "E2");
        put(&mut first, 2, "2101");
        put(&mut first, 18, " 1");
        put(&mut first, 20, "2");
        put(&mut first, 24, " 0");
        put(&mut first, 26, "0");
        put(&mut first, 27, &format!("{:>4}", points.len()));
        put(&mut first, 31, &format!("{:>4}", 1));
        let mut row = Vec::new();
        for (i, (x, y)) in points.iter().enumerate() {
            put(&mut row, i * 14, &format!("{:>7}{:>7}", y, x));
        }
        vec![first, row]
    }

    fn polygon_element() -> Vec<Vec<u8>> {
        let mut rows = line_element(&[(0, 0), (10, 0), (10, 10), (0, 0)]);
        put(&mut rows[0], 0, "E1");
        rows
    }

    fn read(lines: Vec<Vec<u8>>, options: ReadOptions) -> ElementStore {
        let mut store = ElementStore::default();
        read_records(
            Cursor::new(text(&lines)),
            Path::new("test.dm"),
            options,
            &mut store,
        )
        .unwrap();
        store
    }

    #[test]
    fn test_elements_bind_to_latest_mesh() {
        let mut lines = mesh_block(1000, 2000, &[0]);
        lines.extend(line_element(&[(1, 1), (2, 2)]));
        lines.extend(mesh_block(5000, 6000, &[0]));
        lines.extend(line_element(&[(1, 1), (2, 2)]));
        lines.extend(polygon_element());

        let store = read(lines, ReadOptions::default());
        assert_eq!(store.meshes().len(), 2);
        assert_eq!(store.count(ElementKind::Line), 2);
        assert_eq!(store.count(ElementKind::Polygon), 1);
        let second = store.element(ElementKind::Line, 2).unwrap();
        assert!((second.points[0].x - 5001.0).abs() < 1e-9);
        assert!((second.points[0].y - 6001.0).abs() < 1e-9);
        assert!(store.element(ElementKind::Line, 0).is_none());
        assert!(store.element(ElementKind::Line, 3).is_none());
    }

    #[test]
    fn test_kind_filter_keeps_records_in_sync() {
        let mut lines = mesh_block(0, 0, &[0]);
        lines.extend(polygon_element());
        lines.extend(line_element(&[(1, 1), (2, 2)]));
        let store = read(
            lines,
            ReadOptions {
                kind: Some(ElementKind::Line),
                overwriting_times: None,
            },
        );
        assert_eq!(store.count(ElementKind::Polygon), 0);
        assert_eq!(store.count(ElementKind::Line), 1);
    }

    #[test]
    fn test_skipped_record_groups() {
        let mut index = Vec::new();
        put(&mut index, 0, "I ");
        put(&mut index, 37, " 2");
        let mut grid = Vec::new();
        put(&mut grid, 0, "G ");
        put(&mut grid, 26, "   1");
        let mut tin = Vec::new();
        put(&mut tin, 0, "T ");
        put(&mut tin, 26, "     1");
        let mut attr = Vec::new();
        put(&mut attr, 0, "E8");
        put(&mut attr, 31, "   1");

        // 後続レコードが要素レコードに見えても読み飛ばされる
        let mut lines = vec![index, b"E2".to_vec(), b"E2".to_vec()];
        lines.extend(mesh_block(0, 0, &[0]));
        lines.push(grid);
        lines.push(b"E2xx".to_vec());
        lines.push(tin);
        lines.push(b"E2xx".to_vec());
        lines.push(attr);
        lines.push(b"E2xx".to_vec());
        lines.push(b"H header".to_vec());
        lines.extend(line_element(&[(1, 1), (2, 2)]));

        let store = read(lines, ReadOptions::default());
        assert_eq!(store.count(ElementKind::Line), 1);
        assert_eq!(store.rejected_total(), 0);
    }

    #[test]
    fn test_failed_elements_are_rejected() {
        let mut lines = line_element(&[(1, 1), (2, 2)]);
        lines.extend(mesh_block(0, 0, &[0]));
        let mut broken = line_element(&[(1, 1), (2, 2)]);
        put(&mut broken[0], 2, "xxxx");
        lines.extend(broken);

        let store = read(lines, ReadOptions::default());
        assert_eq!(store.count(ElementKind::Line), 0);
        assert_eq!(store.rejected().len(), 2);
        assert_eq!(store.rejected()[0].error, RecordError::NoMesh);
        assert_eq!(store.rejected()[0].line, 1);
        assert_eq!(store.rejected()[1].error, RecordError::HeaderDecode);
    }

    #[test]
    fn test_rejected_records_are_capped() {
        let mut lines = mesh_block(0, 0, &[0]);
        for _ in 0..MAX_REJECTED_RECORDS + 5 {
            let mut broken = line_element(&[(1, 1), (2, 2)]);
            put(&mut broken[0], 20, "9");
            lines.extend(broken);
        }
        let store = read(lines, ReadOptions::default());
        assert_eq!(store.rejected().len(), MAX_REJECTED_RECORDS);
        assert_eq!(store.additional_rejected(), 5);
    }

    #[test]
    fn test_overwriting_times_selects_revision() {
        let mut lines = mesh_block(0, 0, &[100, 200, 300]);
        lines.extend(line_element(&[(0, 0), (1, 1)]));

        let latest = read(lines.clone(), ReadOptions::default());
        assert!((latest.meshes()[0].origin().x - 3.0).abs() < 1e-9);

        let forced = read(
            lines,
            ReadOptions {
                kind: None,
                overwriting_times: Some(1),
            },
        );
        assert!((forced.meshes()[0].origin().x - 2.0).abs() < 1e-9);
        // 修正回の図郭レコードを読み終えた後の要素も取り込まれる
        assert_eq!(forced.count(ElementKind::Line), 1);
    }

    #[test]
    fn test_layer_header_survey() {
        let mut header = Vec::new();
        put(&mut header, 0, "H ");
        put(&mut header, 2, &" ".repeat(66));
        put(&mut header, 28, "    3");
        put(&mut header, 58, "   12");
        put(&mut header, 68, "0");
        put(&mut header, 69, &" ".repeat(15));

        let mut survey = KindSurvey::default();
        assert!(survey.add_header(&header));
        assert!(survey.has(ElementKind::Polygon));
        assert_eq!(survey.count(ElementKind::Note), 12);
        assert!(!survey.has(ElementKind::Line));
        assert_eq!(survey.kinds(), vec![ElementKind::Polygon, ElementKind::Note]);

        let mut bad = header.clone();
        put(&mut bad, 30, "x");
        assert!(!survey.add_header(&bad));
        assert!(!survey.add_header(b"H short"));
    }
}
