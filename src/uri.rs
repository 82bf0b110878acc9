//! データソースURI（`file://<dir>?dataType=dm_pl&srid=2449...`）

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{DmError, Result};
use crate::model::ElementKind;

const SCHEME: &str = "file://";

/// クエリ値でエスケープしない文字以外をすべてエスケープする
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':');

const PATH_SEGMENT: &AsciiSet = &QUERY_VALUE.remove(b'/').remove(b'\\');

pub mod keys {
    pub const DATA_TYPE: &str = "dataType";
    pub const SRID: &str = "srid";
    pub const SUBSET: &str = "subset";
    pub const SUBSET_INDEX: &str = "subsetIndex";
    pub const SPATIAL_INDEX: &str = "spatialIndex";
    pub const QUIET: &str = "quiet";
    pub const OVERWRITING_TIMES: &str = "overwritingTimes";
}

/// ディレクトリパスとクエリ項目（順序を保持）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceUri {
    path: PathBuf,
    query: Vec<(String, String)>,
}

impl DataSourceUri {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_query_item(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }

    pub fn query_item(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 同名の項目を削除してから追加する。空文字列は削除のみ
    pub fn set_query_item(&mut self, key: &str, value: &str) {
        self.remove_query_item(key);
        if !value.is_empty() {
            self.query.push((key.to_string(), value.to_string()));
        }
    }

    /// 値を持たない項目（`quiet` など）を追加する
    pub fn set_query_flag(&mut self, key: &str) {
        self.remove_query_item(key);
        self.query.push((key.to_string(), String::new()));
    }

    pub fn with_query_flag(mut self, key: &str) -> Self {
        self.set_query_flag(key);
        self
    }

    pub fn remove_query_item(&mut self, key: &str) {
        self.query.retain(|(k, _)| k != key);
    }

    pub fn with_query_item(mut self, key: &str, value: &str) -> Self {
        self.set_query_item(key, value);
        self
    }
}

impl FromStr for DataSourceUri {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DmError::InvalidUri("empty uri".to_string()));
        }
        let rest = s.strip_prefix(SCHEME).unwrap_or(s);
        let (raw_path, raw_query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let path = decode(raw_path)?;
        let mut query = Vec::new();
        for item in raw_query.into_iter().flat_map(|q| q.split('&')) {
            if item.is_empty() {
                continue;
            }
            let (key, value) = item.split_once('=').unwrap_or((item, ""));
            query.push((decode(key)?, decode(&value.replace('+', " "))?));
        }

        Ok(Self {
            path: PathBuf::from(path),
            query,
        })
    }
}

impl fmt::Display for DataSourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.to_string_lossy();
        write!(f, "{}{}", SCHEME, utf8_percent_encode(&path, PATH_SEGMENT))?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}", sep, utf8_percent_encode(key, QUERY_VALUE))?;
            if !value.is_empty() {
                write!(f, "={}", utf8_percent_encode(value, QUERY_VALUE))?;
            }
        }
        Ok(())
    }
}

fn decode(text: &str) -> Result<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| DmError::InvalidUri(format!("{}: {}", text, e)))
}

/// `n` で始まる値（no, never...）のみ偽
pub fn parse_toggle(value: &str) -> bool {
    !value.trim().to_lowercase().starts_with('n')
}

/// URIから取り出したプロバイダー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOptions {
    /// 小文字化した `dataType`。空は未指定
    pub data_type: String,
    pub srid: String,
    pub subset: Option<String>,
    pub build_subset_index: bool,
    pub build_spatial_index: bool,
    pub quiet: bool,
    pub overwriting_times: Option<usize>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            data_type: String::new(),
            srid: String::new(),
            subset: None,
            build_subset_index: true,
            build_spatial_index: false,
            quiet: false,
            overwriting_times: None,
        }
    }
}

impl ProviderOptions {
    pub fn from_uri(uri: &DataSourceUri) -> Self {
        let mut options = Self::default();
        if let Some(value) = uri.query_item(keys::DATA_TYPE) {
            options.data_type = value.trim().to_lowercase();
        }
        if let Some(value) = uri.query_item(keys::SRID) {
            options.srid = value.trim().to_lowercase();
        }
        if let Some(value) = uri.query_item(keys::SUBSET_INDEX) {
            options.build_subset_index = parse_toggle(value);
        }
        if let Some(value) = uri.query_item(keys::SPATIAL_INDEX) {
            options.build_spatial_index = parse_toggle(value);
        }
        options.subset = uri
            .query_item(keys::SUBSET)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        options.quiet = uri.has_query_item(keys::QUIET);
        // 負値・不正値は最新の修正回
        options.overwriting_times = uri
            .query_item(keys::OVERWRITING_TIMES)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|v| usize::try_from(v).ok());
        options
    }

    /// `dataType` が7種のいずれかなら種別を返す
    pub fn kind(&self) -> Option<ElementKind> {
        self.data_type.parse().ok()
    }
}
