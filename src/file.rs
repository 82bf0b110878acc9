//! DMディレクトリの定義と要素カーソル

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DmError, Result};
use crate::fields::Fields;
use crate::model::{AttributeValue, Element, ElementKind};
use crate::reader::{self, DirectoryFingerprint, ElementStore, KindSurvey, ReadOptions};
use crate::uri::{keys, DataSourceUri, ProviderOptions};

/// カーソル位置: 読込済みで要素がない
const NO_RECORDS: i64 = -2;
/// カーソル位置: 先頭要素の直前
const BEFORE_FIRST: i64 = -1;

/// 1つのDMディレクトリと、選択した種別の要素を順に読むカーソル。
///
/// 要素は最初に必要になった時点でディレクトリ全体から読み込む。
/// 読み込んだ要素は共有され、複製したカーソルは先頭に戻る。
#[derive(Debug)]
pub struct DmFile {
    dir: PathBuf,
    /// 小文字の `dataType`。空は未指定
    data_type: String,
    srid: String,
    overwriting_times: Option<usize>,
    store: Option<Arc<ElementStore>>,
    fingerprint: Option<DirectoryFingerprint>,
    position: i64,
}

impl Clone for DmFile {
    fn clone(&self) -> Self {
        let mut file = Self {
            dir: self.dir.clone(),
            data_type: self.data_type.clone(),
            srid: self.srid.clone(),
            overwriting_times: self.overwriting_times,
            store: self.store.clone(),
            fingerprint: self.fingerprint.clone(),
            position: BEFORE_FIRST,
        };
        file.reset();
        file
    }
}

impl DmFile {
    pub fn new(dir: impl Into<PathBuf>, data_type: &str, srid: &str) -> Self {
        Self {
            dir: dir.into(),
            data_type: data_type.trim().to_lowercase(),
            srid: srid.trim().to_string(),
            overwriting_times: None,
            store: None,
            fingerprint: None,
            position: BEFORE_FIRST,
        }
    }

    pub fn from_uri(uri: &DataSourceUri) -> Self {
        let options = ProviderOptions::from_uri(uri);
        let mut file = Self::new(uri.path(), &options.data_type, &options.srid);
        file.overwriting_times = options.overwriting_times;
        file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn srid(&self) -> &str {
        &self.srid
    }

    pub fn kind(&self) -> Option<ElementKind> {
        self.data_type.parse().ok()
    }

    pub fn overwriting_times(&self) -> Option<usize> {
        self.overwriting_times
    }

    /// 修正回数を固定する。読込済みの要素は破棄する
    pub fn set_overwriting_times(&mut self, times: Option<usize>) {
        if self.overwriting_times != times {
            self.overwriting_times = times;
            self.close();
        }
    }

    /// 定義を表すURI
    pub fn url(&self) -> DataSourceUri {
        let mut uri = DataSourceUri::from_path(&self.dir)
            .with_query_item(keys::SRID, &self.srid)
            .with_query_item(keys::DATA_TYPE, &self.data_type);
        if let Some(times) = self.overwriting_times {
            uri.set_query_item(keys::OVERWRITING_TIMES, &times.to_string());
        }
        uri
    }

    /// パスがあり、種別が空または7種のいずれか
    pub fn is_valid_definition(&self) -> bool {
        !self.dir.as_os_str().is_empty() && (self.data_type.is_empty() || self.kind().is_some())
    }

    /// 定義が正しく、ディレクトリにDMファイルがある
    pub fn is_valid(&self) -> bool {
        self.is_valid_definition() && reader::dm_files(&self.dir).is_ok()
    }

    pub fn fields(&self) -> Fields {
        self.kind().map(Fields::for_kind).unwrap_or_default()
    }

    /// グループヘッダから種別ごとの要素数を集計する
    pub fn survey(&self) -> Result<KindSurvey> {
        reader::survey_dir(&self.dir)
    }

    /// ディレクトリを読み込む。失敗した場合は読込済みの要素も破棄する
    pub fn read(&mut self) -> Result<()> {
        self.close();
        if !self.is_valid_definition() {
            return Err(DmError::InvalidDefinition(format!(
                "path {:?}, data type '{}'",
                self.dir, self.data_type
            )));
        }

        let options = ReadOptions {
            kind: self.kind(),
            overwriting_times: self.overwriting_times,
        };
        let fingerprint = reader::fingerprint(&self.dir)?;
        let store = reader::read_dir(&self.dir, options)?;
        debug!(
            "Loaded {} {} elements from {:?}",
            self.kind().map_or(0, |kind| store.count(kind)),
            self.data_type,
            self.dir
        );

        self.store = Some(Arc::new(store));
        self.fingerprint = Some(fingerprint);
        self.reset();
        Ok(())
    }

    /// 読込済みの要素を破棄する
    pub fn close(&mut self) {
        self.store = None;
        self.fingerprint = None;
        self.position = BEFORE_FIRST;
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&Arc<ElementStore>> {
        if self.store.is_none() {
            self.read()?;
        }
        self.store
            .as_ref()
            .ok_or_else(|| DmError::InvalidDefinition(format!("{:?} is not loaded", self.dir)))
    }

    /// 要素を返す。読み込んでいなければ読み込む
    pub fn store(&mut self) -> Result<Arc<ElementStore>> {
        self.ensure_loaded().map(Arc::clone)
    }

    pub fn loaded_store(&self) -> Option<&Arc<ElementStore>> {
        self.store.as_ref()
    }

    /// 読込時から構成ファイルが変わったか。読み込んでいなければ `false`
    pub fn has_changed(&self) -> bool {
        let Some(loaded) = &self.fingerprint else {
            return false;
        };
        match reader::fingerprint(&self.dir) {
            Ok(current) => &current != loaded,
            Err(e) => {
                warn!("Failed to check {:?}: {}", self.dir, e);
                true
            }
        }
    }

    fn elements(&self) -> &[Element] {
        match (&self.store, self.kind()) {
            (Some(store), Some(kind)) => store.elements(kind),
            _ => &[],
        }
    }

    /// 選択した種別の要素数。読み込んでいなければ0
    pub fn record_count(&self) -> usize {
        self.elements().len()
    }

    /// 先頭の直前に戻す
    pub fn reset(&mut self) {
        self.position = if self.record_count() == 0 {
            NO_RECORDS
        } else {
            BEFORE_FIRST
        };
    }

    /// 次の要素に進む。末尾に達したら `None`
    pub fn next_element(&mut self) -> Result<Option<&Element>> {
        if self.store.is_none() {
            self.read()?;
        }
        if self.position == NO_RECORDS {
            return Ok(None);
        }

        let next = self.position + 1;
        let count = self.record_count() as i64;
        if next >= count {
            self.position = count;
            return Ok(None);
        }
        self.position = next;
        Ok(self.elements().get(next as usize))
    }

    /// 次の `next_element` が `record_id` を返すように移動する。
    /// `record_id` が0または要素数以上なら移動せず `false`
    pub fn set_next_record_id(&mut self, record_id: u64) -> bool {
        if record_id < 1 || record_id >= self.record_count() as u64 {
            return false;
        }
        self.position = record_id as i64 - 2;
        true
    }

    /// 現在の要素のレコードID（1始まり）
    pub fn record_id(&self) -> u64 {
        (self.position + 1).max(0) as u64
    }

    /// カーソルを動かさずに要素を参照する
    pub fn element(&self, record_id: u64) -> Option<&Element> {
        let index = usize::try_from(record_id).ok()?.checked_sub(1)?;
        self.elements().get(index)
    }

    /// カーソルを動かさずに属性値を参照する。未知の属性・IDは NULL
    pub fn fetch_attribute(&self, name: &str, record_id: u64) -> AttributeValue {
        if self.fields().index_of(name).is_none() {
            return AttributeValue::Null;
        }
        self.element(record_id)
            .map_or(AttributeValue::Null, |element| element.field_value(name))
    }
}
