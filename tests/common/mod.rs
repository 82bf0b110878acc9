#![allow(dead_code)]

use std::fs;
use std::path::Path;

use japan_dm::uri::keys;
use japan_dm::DataSourceUri;
use tempfile::TempDir;

pub const SRID: &str = "6677";

fn put(line: &mut Vec<u8>, start: usize, text: &str) {
    if line.len() < start + text.len() {
        line.resize(start + text.len(), b' ');
    }
    line[start..start + text.len()].copy_from_slice(text.as_bytes());
}

/// 固定長レコードでDMファイルの内容を組み立てる。座標の単位は1m
#[derive(Debug, Clone, Default)]
pub struct DmFixture {
    lines: Vec<Vec<u8>>,
}

impl DmFixture {
    /// 原点(0, 0)の図郭から始める
    pub fn new() -> Self {
        Self::default().mesh(0, 0)
    }

    pub fn mesh(mut self, x: i32, y: i32) -> Self {
        let mut a = Vec::new();
        put(&mut a, 0, "M ");
        put(&mut a, 30, " 2500");
        put(&mut a, 65, " 0");
        let mut b = Vec::new();
        put(&mut b, 0, &format!("{:>7}", y));
        put(&mut b, 7, &format!("{:>7}", x));
        put(&mut b, 44, "999");
        let mut d = Vec::new();
        put(&mut d, 9, "1");
        let mut e = Vec::new();
        put(&mut e, 40, "   0   0");
        self.lines
            .extend([a, b, b"c".to_vec(), d, e, b"f".to_vec()]);
        self
    }

    /// グループヘッダ。種別ごとの要素数は E1〜E7 の順
    pub fn layer_header(mut self, counts: [u32; 7]) -> Self {
        let mut line = b"H ".to_vec();
        put(&mut line, 2, &" ".repeat(66));
        for (i, count) in counts.iter().enumerate() {
            put(&mut line, 28 + i * 5, &format!("{:>5}", count));
        }
        put(&mut line, 68, "0");
        self.lines.push(line);
        self
    }

    fn coordinates(mut self, tag: &str, dmcode: i32, points: &[(i32, i32)]) -> Self {
        let mut first = Vec::new();
        put(&mut first, 0, tag);
        put(&mut first, 2, &format!("{:04}", dmcode));
        put(&mut first, 18, " 1");
        put(&mut first, 20, "2");
        put(&mut first, 24, " 0");
        put(&mut first, 26, "0");
        put(&mut first, 27, &format!("{:>4}", points.len()));
        put(&mut first, 31, &format!("{:>4}", points.len().div_ceil(6)));
        self.lines.push(first);
        for chunk in points.chunks(6) {
            let mut row = Vec::new();
            for (i, (x, y)) in chunk.iter().enumerate() {
                put(&mut row, i * 14, &format!("{:>7}{:>7}", y, x));
            }
            self.lines.push(row);
        }
        self
    }

    pub fn polygon(self, dmcode: i32, points: &[(i32, i32)]) -> Self {
        self.coordinates("E1", dmcode, points)
    }

    pub fn line(self, dmcode: i32, points: &[(i32, i32)]) -> Self {
        self.coordinates("E2", dmcode, points)
    }

    /// 円周上の3点
    pub fn circle(self, dmcode: i32, samples: [(i32, i32); 3]) -> Self {
        self.coordinates("E3", dmcode, &samples)
    }

    /// 記号点（データ数0）
    pub fn symbol_point(mut self, dmcode: i32, x: i32, y: i32) -> Self {
        let mut first = Vec::new();
        put(&mut first, 0, "E5");
        put(&mut first, 2, &format!("{:04}", dmcode));
        put(&mut first, 18, " 1");
        put(&mut first, 20, "2");
        put(&mut first, 24, " 0");
        put(&mut first, 26, "0");
        put(&mut first, 27, "0000");
        put(&mut first, 31, "   0");
        put(&mut first, 35, &format!("{:>7}", y));
        put(&mut first, 42, &format!("{:>7}", x));
        self.lines.push(first);
        self
    }

    pub fn write(&self, dir: &Path, name: &str) {
        let mut out = Vec::new();
        for line in &self.lines {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        fs::write(dir.join(name), out).unwrap();
    }

    /// 一時ディレクトリに `test.dm` として書き出す
    pub fn into_dir(self) -> TempDir {
        let dir = TempDir::new().unwrap();
        self.write(dir.path(), "test.dm");
        dir
    }
}

pub fn uri(dir: &Path, data_type: &str) -> DataSourceUri {
    DataSourceUri::from_path(dir)
        .with_query_item(keys::DATA_TYPE, data_type)
        .with_query_item(keys::SRID, SRID)
}

/// 100m間隔に並んだ `count` 本の線。先頭の1本だけ dmcode 2101、他は 2102
pub fn line_grid(count: i32) -> DmFixture {
    let mut fixture = DmFixture::new();
    for i in 0..count {
        let dmcode = if i == 0 { 2101 } else { 2102 };
        let x = i * 100;
        fixture = fixture.line(dmcode, &[(x, 0), (x + 10, 10)]);
    }
    fixture
}
