//! 地物の取得要求とイテレータ
//!
//! イテレータは作成時に取得方法を1つ選ぶ。
//!
//! * `FileScan`: 要素を先頭から順に読む
//! * `SubsetIndexScan`: サブセットインデックスのIDだけを読む
//! * `IdListScan`: 指定ID、または空間インデックスで絞り込んだIDだけを読む

use std::sync::Arc;

use geo_types::{Geometry, Rect};
use tracing::debug;

use crate::error::{DmError, Result};
use crate::expression::{Expression, FeatureContext};
use crate::fields::Fields;
use crate::file::DmFile;
use crate::geometry::{build_geometry, intersects_rect, rect_contains, rect_intersects};
use crate::model::AttributeValue;
use crate::provider::ProviderSnapshot;
use crate::transform::{inverse_rect, same_crs, transform_geometry, CoordinateTransform};

/// 並び順の指定。取得する属性を決めるためにのみ使う
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub expression: Expression,
    pub ascending: bool,
}

/// 地物の取得条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRequest {
    filter_fid: Option<u64>,
    filter_rect: Option<Rect<f64>>,
    exact_intersect: bool,
    filter_expression: Option<Expression>,
    no_geometry: bool,
    subset_of_attributes: Option<Vec<usize>>,
    order_by: Vec<OrderByClause>,
    destination_srid: Option<String>,
}

impl FeatureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1件だけ取得する
    pub fn with_filter_fid(mut self, fid: u64) -> Self {
        self.filter_fid = Some(fid);
        self
    }

    /// 矩形と交差する地物を取得する。出力先の座標系で指定する
    pub fn with_filter_rect(mut self, rect: Rect<f64>) -> Self {
        self.filter_rect = Some(rect);
        self
    }

    /// 矩形との交差を外接矩形ではなくジオメトリで判定する
    pub fn with_exact_intersect(mut self, exact: bool) -> Self {
        self.exact_intersect = exact;
        self
    }

    pub fn with_filter_expression(mut self, expression: Expression) -> Self {
        self.filter_expression = Some(expression);
        self
    }

    pub fn with_no_geometry(mut self, no_geometry: bool) -> Self {
        self.no_geometry = no_geometry;
        self
    }

    /// 取得する属性（列番号）
    pub fn with_subset_of_attributes(mut self, attributes: Vec<usize>) -> Self {
        self.subset_of_attributes = Some(attributes);
        self
    }

    /// 取得する属性（列名）。スキーマにない名前は無視する
    pub fn with_subset_of_attribute_names(mut self, names: &[&str], fields: &Fields) -> Self {
        self.subset_of_attributes = Some(names.iter().filter_map(|n| fields.index_of(n)).collect());
        self
    }

    pub fn add_order_by(mut self, expression: Expression, ascending: bool) -> Self {
        self.order_by.push(OrderByClause {
            expression,
            ascending,
        });
        self
    }

    /// 出力先の座標系
    pub fn with_destination_srid(mut self, srid: &str) -> Self {
        self.destination_srid = Some(srid.to_string());
        self
    }

    pub fn filter_fid(&self) -> Option<u64> {
        self.filter_fid
    }

    pub fn filter_rect(&self) -> Option<&Rect<f64>> {
        self.filter_rect.as_ref()
    }

    pub fn exact_intersect(&self) -> bool {
        self.exact_intersect
    }

    pub fn filter_expression(&self) -> Option<&Expression> {
        self.filter_expression.as_ref()
    }

    pub fn no_geometry(&self) -> bool {
        self.no_geometry
    }

    pub fn subset_of_attributes(&self) -> Option<&[usize]> {
        self.subset_of_attributes.as_deref()
    }

    pub fn order_by(&self) -> &[OrderByClause] {
        &self.order_by
    }

    pub fn destination_srid(&self) -> Option<&str> {
        self.destination_srid.as_deref()
    }
}

/// 取得した地物。IDはレコードID（1始まり）
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: u64,
    fields: Arc<Fields>,
    attributes: Vec<AttributeValue>,
    geometry: Option<Geometry<f64>>,
}

impl Feature {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// スキーマ順の属性値。取得しなかった属性は NULL
    pub fn attributes(&self) -> &[AttributeValue] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.fields
            .index_of(name)
            .and_then(|index| self.attributes.get(index))
    }

    pub fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }
}

impl FeatureContext for Feature {
    fn attribute(&self, name: &str) -> AttributeValue {
        Feature::attribute(self, name).cloned().unwrap_or_default()
    }

    fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    fn feature_id(&self) -> u64 {
        self.id
    }
}

/// プロバイダーの状態を共有する地物の取得元
#[derive(Debug, Clone)]
pub struct FeatureSource {
    snapshot: Arc<ProviderSnapshot>,
}

impl FeatureSource {
    pub(crate) fn new(snapshot: Arc<ProviderSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn get_features(&self, request: FeatureRequest) -> FeatureIterator {
        FeatureIterator::new(Arc::clone(&self.snapshot), request)
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        self.snapshot.extent
    }

    pub fn fields(&self) -> &Fields {
        &self.snapshot.fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    FileScan,
    SubsetIndexScan,
    IdListScan,
}

pub struct FeatureIterator {
    source: Arc<ProviderSnapshot>,
    file: DmFile,
    request: FeatureRequest,
    mode: ScanMode,
    feature_ids: Vec<u64>,
    next_id: usize,
    filter_rect: Option<Rect<f64>>,
    test_geometry: bool,
    test_geometry_exact: bool,
    test_subset: bool,
    load_geometry: bool,
    /// 取得する属性。`None` は全属性
    attributes: Option<Vec<usize>>,
    transform: Option<Box<dyn CoordinateTransform>>,
    closed: bool,
}

impl std::fmt::Debug for FeatureIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIterator")
            .field("mode", &self.mode)
            .field("test_geometry", &self.test_geometry)
            .field("test_subset", &self.test_subset)
            .field("load_geometry", &self.load_geometry)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FeatureIterator {
    fn new(source: Arc<ProviderSnapshot>, request: FeatureRequest) -> Self {
        let file = source.file.clone();
        let test_subset = source.subset.is_some();
        let mut iter = Self {
            source,
            file,
            request,
            mode: ScanMode::FileScan,
            feature_ids: Vec::new(),
            next_id: 0,
            filter_rect: None,
            test_geometry: false,
            test_geometry_exact: false,
            test_subset,
            load_geometry: true,
            attributes: None,
            transform: None,
            closed: false,
        };

        if !iter.source.valid {
            debug!("Source is not valid - no features to return");
            iter.close();
            return iter;
        }

        if let Err(e) = iter.configure() {
            // 座標変換が作れない場合は何も返さない
            debug!("Closing iterator: {}", e);
            iter.close();
            return iter;
        }

        debug!(
            "Iterator mode {:?}, loading geometries: {}, testing geometries: {}, testing subset: {}",
            iter.mode,
            iter.load_geometry,
            iter.test_geometry,
            iter.test_subset
        );
        iter.rewind();
        iter
    }

    fn configure(&mut self) -> Result<()> {
        if let Some(destination) = self.request.destination_srid.clone() {
            if !same_crs(&destination, &self.source.srid) {
                if self.source.srid.is_empty() {
                    return Err(DmError::Transform(
                        "source reference system is not defined".to_string(),
                    ));
                }
                self.transform = Some(self.source.factory.create(&self.source.srid, &destination)?);
            }
        }

        self.filter_rect = match (self.request.filter_rect, &self.transform) {
            (Some(rect), Some(transform)) => Some(inverse_rect(&rect, transform.as_ref())?),
            (rect, _) => rect,
        };

        if let Some(filter_rect) = self.filter_rect {
            debug!("Configuring for rectangle select");
            self.test_geometry = true;
            self.test_geometry_exact = self.request.exact_intersect;

            let extent = self.source.extent;
            let disjoint = !extent.is_some_and(|e| rect_intersects(&filter_rect, &e));
            let contains = extent.is_some_and(|e| rect_contains(&filter_rect, &e));

            if disjoint && !self.test_subset {
                debug!("Rectangle outside layer extents - no features to return");
                self.mode = ScanMode::IdListScan;
            } else if contains && !self.test_subset {
                debug!("Rectangle contains layer extents - bypass spatial filter");
                self.test_geometry = false;
            } else if let Some(index) = &self.source.spatial_index {
                // 空間インデックスはサブセットを反映しないので条件式は引き続き評価する
                self.feature_ids = index.query(&filter_rect);
                debug!(
                    "Layer has spatial index - selected {} features from index",
                    self.feature_ids.len()
                );
                self.mode = ScanMode::IdListScan;
                self.test_geometry = self.test_geometry_exact;
            }
        }

        if let Some(fid) = self.request.filter_fid {
            debug!("Configuring for returning single id");
            self.feature_ids = if self.mode != ScanMode::IdListScan || self.feature_ids.contains(&fid) {
                vec![fid]
            } else {
                Vec::new()
            };
            self.mode = ScanMode::IdListScan;
        } else if self.mode == ScanMode::FileScan && self.source.subset_index.is_some() {
            debug!("Layer has subset index");
            self.test_subset = false;
            self.mode = ScanMode::SubsetIndexScan;
        }

        let filter_needs_geometry = self
            .request
            .filter_expression
            .as_ref()
            .is_some_and(Expression::needs_geometry);
        let subset_needs_geometry = self.test_subset
            && self
                .source
                .subset
                .as_ref()
                .is_some_and(Expression::needs_geometry);
        self.load_geometry = !self.request.no_geometry
            || self.test_geometry
            || subset_needs_geometry
            || filter_needs_geometry;

        self.attributes = self.request.subset_of_attributes.clone().map(|mut attrs| {
            let fields = &self.source.fields;
            let referenced = self
                .request
                .filter_expression
                .iter()
                .chain(self.request.order_by.iter().map(|o| &o.expression))
                .flat_map(Expression::referenced_columns);
            for name in referenced {
                if let Some(index) = fields.index_of(&name) {
                    attrs.push(index);
                }
            }
            attrs.retain(|&i| i < fields.len());
            attrs.sort_unstable();
            attrs.dedup();
            attrs
        });

        Ok(())
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 次の地物。尽きたらイテレータを閉じる
    pub fn next_feature(&mut self) -> Option<Feature> {
        if self.closed {
            return None;
        }

        let feature = match self.mode {
            ScanMode::FileScan => self.scan_next(),
            ScanMode::SubsetIndexScan | ScanMode::IdListScan => self.next_from_ids(),
        };
        if feature.is_none() {
            self.close();
        }
        feature
    }

    /// 先頭に戻す。閉じた後は戻せない
    pub fn rewind(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.mode {
            ScanMode::FileScan => self.file.reset(),
            _ => self.next_id = 0,
        }
        true
    }

    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.feature_ids = Vec::new();
        self.closed = true;
        true
    }

    fn scan_next(&mut self) -> Option<Feature> {
        loop {
            match self.file.next_element() {
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(e) => {
                    debug!("Failed to read {}: {}", self.file.dir().display(), e);
                    return None;
                }
            }
            let fid = self.file.record_id();
            if let Some(feature) = self.candidate(fid) {
                return Some(feature);
            }
        }
    }

    fn next_from_ids(&mut self) -> Option<Feature> {
        loop {
            let fid = match self.mode {
                ScanMode::IdListScan => self.feature_ids.get(self.next_id).copied(),
                _ => self
                    .source
                    .subset_index
                    .as_ref()
                    .and_then(|index| index.ids().get(self.next_id).copied()),
            }?;
            self.next_id += 1;
            if let Some(feature) = self.candidate(fid) {
                return Some(feature);
            }
        }
    }

    /// ジオメトリ・範囲・条件式を満たせば地物を返す
    fn candidate(&self, fid: u64) -> Option<Feature> {
        let element = self.file.element(fid)?;
        // ジオメトリを返さない要求でも不正な形状は除く。件数と範囲は有効な形状で数える
        let geometry = build_geometry(self.source.geometry_type, element.points())?;

        if self.test_geometry {
            let rect = self.filter_rect.as_ref()?;
            if !intersects_rect(&geometry, rect, self.test_geometry_exact) {
                return None;
            }
        }

        let fields = Arc::clone(&self.source.fields);
        let mut attributes = vec![AttributeValue::Null; fields.len()];
        // サブセットを評価する場合は全属性が必要
        match self.attributes.as_ref().filter(|_| !self.test_subset) {
            Some(indices) => {
                for &index in indices {
                    if let Some(field) = fields.field(index) {
                        attributes[index] = element.field_value(&field.name);
                    }
                }
            }
            None => {
                for (index, field) in fields.iter().enumerate() {
                    attributes[index] = element.field_value(&field.name);
                }
            }
        }

        let mut feature = Feature {
            id: fid,
            fields,
            attributes,
            geometry: Some(geometry),
        };

        if self.test_subset {
            let subset = self.source.subset.as_ref()?;
            if !subset.matches(&feature).unwrap_or(false) {
                return None;
            }
        }
        if let Some(filter) = &self.request.filter_expression {
            if !filter.matches(&feature).unwrap_or(false) {
                return None;
            }
        }

        if !self.load_geometry {
            feature.geometry = None;
        } else if let (Some(transform), Some(geometry)) = (&self.transform, &feature.geometry) {
            match transform_geometry(geometry, transform.as_ref()) {
                Ok(transformed) => feature.geometry = Some(transformed),
                Err(e) => {
                    debug!("Skipping feature {}: {}", fid, e);
                    return None;
                }
            }
        }
        Some(feature)
    }
}

impl Iterator for FeatureIterator {
    type Item = Feature;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_feature()
    }
}
