//! DMデータプロバイダー
//!
//! データソースURIからディレクトリを読み込み、範囲・地物数・インデックスを
//! 求めて不変のスナップショットとして公開する。イテレータはスナップショットを
//! 共有するため、再スキャン中も作成済みのイテレータには影響しない。

use std::fmt;
use std::sync::Arc;

use geo_types::Rect;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::expression::Expression;
use crate::fields::Fields;
use crate::file::DmFile;
use crate::geometry::{bounding_rect, combine_rects, GeometryType};
use crate::index::{SpatialIndex, SubsetIndex};
use crate::iterator::{FeatureIterator, FeatureRequest, FeatureSource};
use crate::model::ElementKind;
use crate::transform::{default_factory, PlaneCrs, TransformFactory};
use crate::uri::{keys, DataSourceUri, ProviderOptions};

pub const PROVIDER_KEY: &str = "dm";
pub const PROVIDER_DESCRIPTION: &str = "DM data provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SelectAtId,
    CreateSpatialIndex,
    CircularGeometries,
}

const CAPABILITIES: [Capability; 3] = [
    Capability::SelectAtId,
    Capability::CreateSpatialIndex,
    Capability::CircularGeometries,
];

/// イテレータに渡すプロバイダーの状態
pub struct ProviderSnapshot {
    pub(crate) valid: bool,
    /// 要素を読込済みのカーソル。イテレータはこれを複製して使う
    pub(crate) file: DmFile,
    pub(crate) geometry_type: GeometryType,
    pub(crate) fields: Arc<Fields>,
    pub(crate) srid: String,
    pub(crate) extent: Option<Rect<f64>>,
    pub(crate) subset: Option<Expression>,
    /// 利用可能な場合のみ `Some`
    pub(crate) spatial_index: Option<Arc<SpatialIndex>>,
    pub(crate) subset_index: Option<Arc<SubsetIndex>>,
    pub(crate) factory: Arc<dyn TransformFactory>,
}

impl fmt::Debug for ProviderSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSnapshot")
            .field("valid", &self.valid)
            .field("dir", &self.file.dir())
            .field("geometry_type", &self.geometry_type)
            .field("srid", &self.srid)
            .field("extent", &self.extent)
            .field("subset", &self.subset.as_ref().map(Expression::text))
            .field("spatial_index", &self.spatial_index.as_ref().map(|i| i.len()))
            .field("subset_index", &self.subset_index.as_ref().map(|i| i.len()))
            .finish()
    }
}

/// 一時的なサブセット指定の前の状態
#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedSubset {
    subset: String,
    use_spatial_index: bool,
    use_subset_index: bool,
}

pub struct DmProvider {
    uri: DataSourceUri,
    options: ProviderOptions,
    file: DmFile,
    geometry_type: GeometryType,
    fields: Arc<Fields>,
    factory: Arc<dyn TransformFactory>,

    layer_valid: bool,
    valid: bool,
    extent: Option<Rect<f64>>,
    feature_count: usize,

    subset_string: String,
    subset: Option<Expression>,
    cached_subset: Option<CachedSubset>,

    build_spatial_index: bool,
    build_subset_index: bool,
    spatial_index: Option<Arc<SpatialIndex>>,
    subset_index: Option<Arc<SubsetIndex>>,
    use_spatial_index: bool,
    use_subset_index: bool,

    reported_errors: Vec<String>,
    snapshot: Arc<ProviderSnapshot>,
}

impl fmt::Debug for DmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmProvider")
            .field("uri", &self.uri.to_string())
            .field("valid", &self.layer_valid)
            .field("feature_count", &self.feature_count)
            .field("subset", &self.subset_string)
            .finish()
    }
}

impl DmProvider {
    pub fn new(uri: DataSourceUri) -> Self {
        Self::with_factory(uri, default_factory())
    }

    pub fn from_uri_str(uri: &str) -> Result<Self> {
        Ok(Self::new(uri.parse()?))
    }

    /// 座標変換器の生成方法を指定して開く
    pub fn with_factory(uri: DataSourceUri, factory: Arc<dyn TransformFactory>) -> Self {
        let options = ProviderOptions::from_uri(&uri);
        let file = DmFile::from_uri(&uri);
        let geometry_type = GeometryType::for_data_type(&options.data_type);
        let fields = Arc::new(file.fields());
        let subset = options.subset.clone().unwrap_or_default();

        let snapshot = Arc::new(ProviderSnapshot {
            valid: false,
            file: file.clone(),
            geometry_type,
            fields: Arc::clone(&fields),
            srid: options.srid.clone(),
            extent: None,
            subset: None,
            spatial_index: None,
            subset_index: None,
            factory: Arc::clone(&factory),
        });

        let mut provider = Self {
            build_spatial_index: options.build_spatial_index,
            build_subset_index: options.build_subset_index,
            uri,
            options,
            file,
            geometry_type,
            fields,
            factory,
            layer_valid: false,
            valid: false,
            extent: None,
            feature_count: 0,
            subset_string: String::new(),
            subset: None,
            cached_subset: None,
            spatial_index: None,
            subset_index: None,
            use_spatial_index: false,
            use_subset_index: false,
            reported_errors: Vec::new(),
            snapshot,
        };

        // サブセットを設定する場合はその時点でインデックスを作り直す
        provider.scan_file(subset.is_empty());
        if !subset.is_empty() {
            provider.set_subset_string(&subset, true);
        }
        provider
    }

    pub fn name(&self) -> &'static str {
        PROVIDER_KEY
    }

    pub fn description(&self) -> &'static str {
        PROVIDER_DESCRIPTION
    }

    pub fn storage_type(&self) -> &'static str {
        "DM files"
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    pub fn is_valid(&self) -> bool {
        self.layer_valid
    }

    /// 現在の定義（サブセット・空間インデックスの指定を含む）
    pub fn uri(&self) -> &DataSourceUri {
        &self.uri
    }

    pub fn kind(&self) -> Option<ElementKind> {
        self.options.kind()
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// 有効なジオメトリ全体の外接矩形
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }

    pub fn srid(&self) -> &str {
        &self.options.srid
    }

    /// 組込みの変換で扱える座標参照系であれば返す
    pub fn crs(&self) -> Option<PlaneCrs> {
        PlaneCrs::from_srid(&self.options.srid)
    }

    pub fn subset_string(&self) -> &str {
        &self.subset_string
    }

    pub fn has_spatial_index(&self) -> bool {
        self.spatial_index.is_some()
    }

    pub fn uses_subset_index(&self) -> bool {
        self.use_subset_index && self.subset_index.is_some()
    }

    /// `quiet` 指定がない場合に、利用者に表示すべきエラー
    pub fn reported_errors(&self) -> &[String] {
        &self.reported_errors
    }

    pub fn feature_source(&self) -> FeatureSource {
        FeatureSource::new(Arc::clone(&self.snapshot))
    }

    pub fn get_features(&self, request: FeatureRequest) -> FeatureIterator {
        self.feature_source().get_features(request)
    }

    /// ディレクトリを読み直す
    pub fn reload(&mut self) {
        info!("Reloading {}", self.file.dir().display());
        self.file.close();
        self.scan_file(true);
    }

    /// 構成ファイルが読込時から変わっていれば読み直す
    pub fn reload_if_changed(&mut self) -> bool {
        if !self.file.has_changed() {
            return false;
        }
        self.reload();
        true
    }

    /// 空間インデックスを作る。作成済みなら何もしない
    pub fn create_spatial_index(&mut self) -> bool {
        if self.build_spatial_index {
            return true;
        }
        self.build_spatial_index = true;
        self.uri.set_query_item(keys::SPATIAL_INDEX, "yes");
        self.rescan_file();
        true
    }

    /// サブセット（属性条件式）を設定する。
    ///
    /// 式が不正な場合は `false` を返し、以前の式を維持する。
    /// `update_feature_count` が偽の場合は一時的な指定とみなし、インデックスを
    /// 作り直さずに以前の状態を保存する。同じ式が再び恒久的に設定されたら
    /// 保存した状態に戻す。
    pub fn set_subset_string(&mut self, subset: &str, update_feature_count: bool) -> bool {
        if subset == self.subset_string {
            return true;
        }

        let expression = if subset.is_empty() {
            None
        } else {
            let parsed = Expression::parse(subset).and_then(|expr| {
                expr.prepare(&self.fields)?;
                Ok(expr)
            });
            match parsed {
                Ok(expr) => Some(expr),
                Err(e) => {
                    warn!(
                        "Invalid subset string {} for {}: {}",
                        subset,
                        self.file.dir().display(),
                        e
                    );
                    return false;
                }
            }
        };

        let previous = std::mem::replace(&mut self.subset_string, subset.to_string());
        self.subset = expression;

        if update_feature_count {
            match self.cached_subset.take() {
                Some(cached) if cached.subset == self.subset_string => {
                    debug!("Resetting cached subset string {}", self.subset_string);
                    self.use_spatial_index = cached.use_spatial_index;
                    self.use_subset_index = cached.use_subset_index;
                }
                _ => {
                    debug!("Setting new subset string {}", self.subset_string);
                    self.rescan_file();
                    self.uri.set_query_item(keys::SUBSET, subset);
                }
            }
        } else {
            debug!("Setting temporary subset string {}", self.subset_string);
            if self.cached_subset.is_none() {
                debug!("Caching previous subset {}", previous);
                self.cached_subset = Some(CachedSubset {
                    subset: previous,
                    use_spatial_index: self.use_spatial_index,
                    use_subset_index: self.use_subset_index,
                });
            }
            self.use_spatial_index = false;
            self.use_subset_index = false;
        }

        self.publish();
        true
    }

    fn reset_indexes(&mut self) {
        self.cached_subset = None;
        self.use_spatial_index = false;
        self.use_subset_index = false;
        self.subset_index = None;
        self.spatial_index = None;
    }

    /// ディレクトリを読み込み、範囲と地物数を求める
    fn scan_file(&mut self, build_indexes: bool) {
        let mut messages = Vec::new();
        self.reported_errors.clear();
        self.layer_valid = false;
        self.valid = false;
        self.reset_indexes();
        self.extent = None;
        self.feature_count = 0;

        if !self.file.is_valid() || self.options.data_type.is_empty() {
            messages.push("DM Files cannot be read or parameters are not valid".to_string());
            self.report_errors(&messages);
            debug!("DM source invalid - directory or parameters");
            self.publish();
            return;
        }

        if let Err(e) = self.file.read() {
            messages.push("DM Files cannot be read".to_string());
            messages.push(e.to_string());
            self.report_errors(&messages);
            debug!("DM source invalid - files failed");
            self.publish();
            return;
        }

        self.layer_valid = true;
        self.valid = true;
        self.scan_features(
            build_indexes && self.build_spatial_index,
            build_indexes && self.build_subset_index,
        );
        self.report_errors(&messages);
    }

    /// サブセットの変更や空間インデックスの作成時に、範囲・地物数・インデックスを作り直す
    fn rescan_file(&mut self) {
        self.reset_indexes();
        self.valid = self.layer_valid && self.file.is_valid();
        if !self.valid {
            self.publish();
            return;
        }
        self.scan_features(self.build_spatial_index, self.build_subset_index);
    }

    /// 変換・範囲指定なしで全地物を走査する
    fn scan_features(&mut self, build_spatial_index: bool, build_subset_index: bool) {
        let build_spatial_index = build_spatial_index && self.geometry_type.has_geometry();
        let build_subset_index = build_subset_index && self.subset.is_some();

        self.publish();
        let mut extent = None;
        let mut count = 0;
        let mut boxes = Vec::new();
        let mut ids = Vec::new();
        for feature in self.get_features(FeatureRequest::new()) {
            if let Some(bbox) = feature.geometry().and_then(bounding_rect) {
                extent = Some(combine_rects(extent, bbox));
                if build_spatial_index {
                    boxes.push((feature.id(), bbox));
                }
            }
            if build_subset_index {
                ids.push(feature.id());
            }
            count += 1;
        }

        self.extent = extent;
        self.feature_count = count;
        if build_spatial_index {
            self.spatial_index = Some(Arc::new(SpatialIndex::bulk_load(boxes)));
            self.use_spatial_index = true;
        }
        if build_subset_index {
            let total = self.file.record_count();
            self.subset_index = SubsetIndex::build(ids, total).map(Arc::new);
            self.use_subset_index = self.subset_index.is_some();
        }
        debug!(
            "Scanned {} features (spatial index: {}, subset index: {})",
            count,
            self.use_spatial_index,
            self.use_subset_index
        );
        self.publish();
    }

    /// 現在の状態をスナップショットとして公開する
    fn publish(&mut self) {
        self.snapshot = Arc::new(ProviderSnapshot {
            valid: self.valid,
            file: self.file.clone(),
            geometry_type: self.geometry_type,
            fields: Arc::clone(&self.fields),
            srid: self.options.srid.clone(),
            extent: self.extent,
            subset: self.subset.clone(),
            spatial_index: self
                .spatial_index
                .clone()
                .filter(|_| self.use_spatial_index),
            subset_index: self.subset_index.clone().filter(|_| self.use_subset_index),
            factory: Arc::clone(&self.factory),
        });
    }

    /// エラーと取込に失敗した要素をログに出力する
    fn report_errors(&mut self, messages: &[String]) {
        let store = self.file.loaded_store().cloned();
        let (rejected, additional) = match &store {
            Some(store) => (store.rejected(), store.additional_rejected()),
            None => (&[][..], 0),
        };
        if messages.is_empty() && rejected.is_empty() {
            return;
        }

        let mut lines = vec![format!(
            "Errors in DM Directory {}",
            self.file.dir().display()
        )];
        lines.extend(messages.iter().cloned());
        if !rejected.is_empty() {
            lines.push("The following lines were not loaded due to errors:".to_string());
            lines.extend(rejected.iter().map(ToString::to_string));
            if additional > 0 {
                lines.push(format!("There are {} additional errors in the file", additional));
            }
        }

        for line in &lines {
            warn!("{}", line);
        }
        if !self.options.quiet {
            self.reported_errors = lines;
        }
    }
}
