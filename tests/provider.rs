mod common;

use std::sync::Arc;

use common::{line_grid, uri, DmFixture};
use geo_types::{Coord, Geometry, Rect};
use japan_dm::transform::PlaneRectangularFactory;
use japan_dm::uri::keys;
use japan_dm::{
    AttributeValue, DataSourceUri, DmProvider, Expression, FeatureRequest, GeometryType, ScanMode,
};
use tempfile::TempDir;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
    Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
}

#[test]
fn test_symbol_point_feature() {
    let dir = DmFixture::new()
        .mesh(1000, 2000)
        .symbol_point(5101, 30, 40)
        .into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pt"));

    assert!(provider.is_valid());
    assert_eq!(provider.geometry_type(), GeometryType::Point);
    assert_eq!(provider.feature_count(), 1);

    let features: Vec<_> = provider.get_features(FeatureRequest::new()).collect();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].id(), 1);
    assert_eq!(
        features[0].attribute("dmcode"),
        Some(&AttributeValue::Int(5101))
    );
    match features[0].geometry() {
        Some(Geometry::Point(p)) => {
            assert!((p.x() - 1030.0).abs() < 1e-9);
            assert!((p.y() - 2040.0).abs() < 1e-9);
        }
        other => panic!("unexpected geometry: {:?}", other),
    }
}

#[test]
fn test_collinear_circle_is_rejected_and_reported() {
    let dir = DmFixture::new()
        .circle(3001, [(0, 0), (10, 10), (20, 20)])
        .circle(3001, [(10, 0), (0, 10), (-10, 0)])
        .into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_cir"));

    assert!(provider.is_valid());
    assert_eq!(provider.feature_count(), 1);
    let errors = provider.reported_errors();
    assert!(errors[0].starts_with("Errors in DM Directory"));
    assert!(errors
        .iter()
        .any(|line| line == "The following lines were not loaded due to errors:"));
    assert!(errors.iter().any(|line| line.contains("collinear")));

    assert_eq!(provider.geometry_type(), GeometryType::LineString);

    // 円周は中心(0, 0)から半径10の37点
    let feature = provider.get_features(FeatureRequest::new()).next().unwrap();
    let Some(Geometry::LineString(ring)) = feature.geometry() else {
        panic!("circle is not a line string");
    };
    assert_eq!(ring.0.len(), 37);
    for c in ring.coords() {
        assert!(c.x.is_finite() && c.y.is_finite());
        assert!((c.x.hypot(c.y) - 10.0).abs() < 1e-9);
    }

    let quiet = DmProvider::new(uri(dir.path(), "dm_cir").with_query_flag(keys::QUIET));
    assert!(quiet.reported_errors().is_empty());
}

#[test]
fn test_rect_containing_extent_scans_everything() {
    let dir = line_grid(5).into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    assert_eq!(provider.feature_count(), 5);
    let extent = provider.extent().unwrap();
    assert!((extent.min().x - 0.0).abs() < 1e-9);
    assert!((extent.max().x - 410.0).abs() < 1e-9);
    assert!((extent.max().y - 10.0).abs() < 1e-9);

    let iter = provider.get_features(FeatureRequest::new().with_filter_rect(rect(
        -1.0, -1.0, 1000.0, 1000.0,
    )));
    assert_eq!(iter.mode(), ScanMode::FileScan);
    let ids: Vec<u64> = iter.map(|f| f.id()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_rect_filters() {
    let dir = DmFixture::new()
        .line(2101, &[(0, 0), (10, 10)])
        .line(2101, &[(20, 20), (30, 30)])
        .into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pl"));

    // 外接矩形は交差するが線とは交差しない
    let corner = rect(6.0, 0.0, 10.0, 4.0);
    let loose: Vec<u64> = provider
        .get_features(FeatureRequest::new().with_filter_rect(corner))
        .map(|f| f.id())
        .collect();
    assert_eq!(loose, vec![1]);
    let exact = provider
        .get_features(
            FeatureRequest::new()
                .with_filter_rect(corner)
                .with_exact_intersect(true),
        )
        .count();
    assert_eq!(exact, 0);

    let mut outside = provider.get_features(FeatureRequest::new().with_filter_rect(rect(
        100.0, 100.0, 200.0, 200.0,
    )));
    assert_eq!(outside.mode(), ScanMode::IdListScan);
    assert!(outside.next().is_none());
}

#[test]
fn test_missing_fid_closes_iterator() {
    let dir = line_grid(3).into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pl"));

    let mut iter = provider.get_features(FeatureRequest::new().with_filter_fid(42));
    assert_eq!(iter.mode(), ScanMode::IdListScan);
    assert!(iter.next_feature().is_none());
    assert!(iter.is_closed());
    assert!(!iter.rewind());

    let feature = provider
        .get_features(FeatureRequest::new().with_filter_fid(2))
        .next()
        .unwrap();
    assert_eq!(feature.id(), 2);
}

#[test]
fn test_rewind_before_exhaustion() {
    let dir = line_grid(3).into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    let mut iter = provider.get_features(FeatureRequest::new());
    assert_eq!(iter.next_feature().map(|f| f.id()), Some(1));
    assert_eq!(iter.next_feature().map(|f| f.id()), Some(2));
    assert!(iter.rewind());
    assert_eq!(iter.next_feature().map(|f| f.id()), Some(1));
    assert!(iter.close());
    assert!(iter.next_feature().is_none());
}

#[test]
fn test_subset_index_holds_matching_ids() {
    let dir = line_grid(10).into_dir();
    let provider = DmProvider::new(
        uri(dir.path(), "dm_pl").with_query_item(keys::SUBSET, "dmcode = 2101"),
    );

    assert_eq!(provider.subset_string(), "dmcode = 2101");
    assert_eq!(provider.feature_count(), 1);
    assert!(provider.uses_subset_index());

    let iter = provider.get_features(FeatureRequest::new());
    assert_eq!(iter.mode(), ScanMode::SubsetIndexScan);
    let ids: Vec<u64> = iter.map(|f| f.id()).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_subset_index_discarded_when_most_ids_match() {
    let dir = line_grid(10).into_dir();
    let mut provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    assert!(!provider.uses_subset_index());

    // 9/10 一致はインデックスを作らない
    assert!(provider.set_subset_string("dmcode = 2102", true));
    assert_eq!(provider.feature_count(), 9);
    assert!(!provider.uses_subset_index());
    assert_eq!(
        provider.get_features(FeatureRequest::new()).mode(),
        ScanMode::FileScan
    );
    assert_eq!(provider.get_features(FeatureRequest::new()).count(), 9);
    assert_eq!(provider.uri().query_item(keys::SUBSET), Some("dmcode = 2102"));

    let disabled = DmProvider::new(
        uri(dir.path(), "dm_pl")
            .with_query_item(keys::SUBSET, "dmcode = 2101")
            .with_query_item(keys::SUBSET_INDEX, "no"),
    );
    assert_eq!(disabled.feature_count(), 1);
    assert!(!disabled.uses_subset_index());
}

#[test]
fn test_invalid_subset_keeps_previous() {
    let dir = line_grid(4).into_dir();
    let mut provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    assert!(provider.set_subset_string("dmcode = 2101", true));
    assert!(!provider.set_subset_string("dmcode = ", true));
    assert!(!provider.set_subset_string("nosuchfield = 1", true));
    assert_eq!(provider.subset_string(), "dmcode = 2101");
    assert_eq!(provider.feature_count(), 1);
}

#[test]
fn test_temporary_subset_restores_cached_state() {
    let dir = line_grid(10).into_dir();
    let mut provider = DmProvider::new(
        uri(dir.path(), "dm_pl").with_query_item(keys::SUBSET, "dmcode = 2101"),
    );
    assert!(provider.uses_subset_index());

    assert!(provider.set_subset_string("", false));
    assert!(!provider.uses_subset_index());
    // 地物数は更新しない
    assert_eq!(provider.feature_count(), 1);
    assert_eq!(provider.get_features(FeatureRequest::new()).count(), 10);

    assert!(provider.set_subset_string("dmcode = 2101", true));
    assert!(provider.uses_subset_index());
    let ids: Vec<u64> = provider
        .get_features(FeatureRequest::new())
        .map(|f| f.id())
        .collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_create_spatial_index() {
    let dir = line_grid(10).into_dir();
    let mut provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    assert!(!provider.has_spatial_index());

    assert!(provider.create_spatial_index());
    assert!(provider.has_spatial_index());
    assert_eq!(provider.uri().query_item(keys::SPATIAL_INDEX), Some("yes"));

    let iter = provider.get_features(FeatureRequest::new().with_filter_rect(rect(
        150.0, 0.0, 320.0, 5.0,
    )));
    assert_eq!(iter.mode(), ScanMode::IdListScan);
    let ids: Vec<u64> = iter.map(|f| f.id()).collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn test_spatial_index_hits_still_apply_subset() {
    let dir = line_grid(10).into_dir();
    let provider = DmProvider::new(
        uri(dir.path(), "dm_pl")
            .with_query_item(keys::SPATIAL_INDEX, "yes")
            .with_query_item(keys::SUBSET, "dmcode = 2101"),
    );
    assert!(provider.has_spatial_index());

    let ids: Vec<u64> = provider
        .get_features(FeatureRequest::new().with_filter_rect(rect(-5.0, -5.0, 150.0, 5.0)))
        .map(|f| f.id())
        .collect();
    assert_eq!(ids, vec![1]);

    // 条件式に一致しないIDは取得できない
    assert!(provider
        .get_features(FeatureRequest::new().with_filter_fid(2))
        .next()
        .is_none());
}

#[test]
fn test_filter_expression_and_attribute_subset() {
    let dir = line_grid(4).into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    let filter = Expression::parse("dmcode = 2102 AND $id >= 3").unwrap();

    let features: Vec<_> = provider
        .get_features(
            FeatureRequest::new()
                .with_filter_expression(filter)
                .with_no_geometry(true)
                .with_subset_of_attribute_names(&["teni"], provider.fields()),
        )
        .collect();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].id(), 3);
    assert!(!features[0].has_geometry());
    // 条件式が参照する属性は取得される
    assert_eq!(
        features[0].attribute("dmcode"),
        Some(&AttributeValue::Int(2102))
    );
    assert_eq!(features[0].attribute("teni"), Some(&AttributeValue::Int(0)));
    assert_eq!(features[0].attribute("zukei"), Some(&AttributeValue::Null));
}

#[test]
fn test_attribute_only_request_skips_invalid_shapes() {
    let dir = DmFixture::new()
        .polygon(1101, &[(0, 0), (10, 0), (10, 10), (0, 0)])
        .polygon(1101, &[(0, 0), (5, 5), (10, 10), (0, 0)])
        .polygon(1102, &[(20, 0), (30, 0), (30, 10), (20, 0)])
        .into_dir();
    let provider = DmProvider::new(uri(dir.path(), "dm_pg"));
    assert_eq!(provider.feature_count(), 2);

    let features: Vec<_> = provider
        .get_features(FeatureRequest::new().with_no_geometry(true))
        .collect();
    let ids: Vec<u64> = features.iter().map(|f| f.id()).collect();
    assert_eq!(ids, vec![1, 3]);
    assert!(features.iter().all(|f| !f.has_geometry()));
}

#[test]
fn test_transform_to_geographic() {
    let dir = DmFixture::new().symbol_point(5101, 0, 0).into_dir();
    let provider = DmProvider::with_factory(
        uri(dir.path(), "dm_pt"),
        Arc::new(PlaneRectangularFactory),
    );

    let feature = provider
        .get_features(FeatureRequest::new().with_destination_srid("EPSG:6668"))
        .next()
        .unwrap();
    let Some(Geometry::Point(p)) = feature.geometry() else {
        panic!("not a point");
    };
    assert!((p.x() - (139.0 + 50.0 / 60.0)).abs() < 1e-9);
    assert!((p.y() - 36.0).abs() < 1e-9);

    // 出力先の座標系で指定した範囲
    let hits = provider
        .get_features(
            FeatureRequest::new()
                .with_destination_srid("6668")
                .with_filter_rect(rect(139.8, 35.9, 139.9, 36.1)),
        )
        .count();
    assert_eq!(hits, 1);

    // 組込みの変換で扱えない座標系は何も返さない
    let mut unsupported = provider
        .get_features(FeatureRequest::new().with_destination_srid("4326"));
    assert!(unsupported.is_closed());
    assert!(unsupported.next().is_none());
}

#[test]
fn test_invalid_sources() {
    let missing = DmProvider::new(
        DataSourceUri::from_path("/nonexistent/dm")
            .with_query_item(keys::DATA_TYPE, "dm_pl")
            .with_query_item(keys::SRID, "6677"),
    );
    assert!(!missing.is_valid());
    assert_eq!(missing.feature_count(), 0);
    assert!(missing
        .reported_errors()
        .iter()
        .any(|line| line == "DM Files cannot be read or parameters are not valid"));
    let mut iter = missing.get_features(FeatureRequest::new());
    assert!(iter.is_closed());
    assert!(iter.next().is_none());

    let dir = line_grid(2).into_dir();
    let no_type = DmProvider::new(
        DataSourceUri::from_path(dir.path()).with_query_item(keys::SRID, "6677"),
    );
    assert!(!no_type.is_valid());

    let empty = TempDir::new().unwrap();
    let quiet = DmProvider::new(uri(empty.path(), "dm_pl").with_query_flag(keys::QUIET));
    assert!(!quiet.is_valid());
    assert!(quiet.reported_errors().is_empty());
}

#[test]
fn test_reload_if_changed() {
    let dir = line_grid(2).into_dir();
    let mut provider = DmProvider::new(uri(dir.path(), "dm_pl"));
    assert_eq!(provider.feature_count(), 2);
    assert!(!provider.reload_if_changed());

    // 作成済みのイテレータは読み直しの影響を受けない
    let before = provider.get_features(FeatureRequest::new());

    line_grid(3).write(dir.path(), "more.dm");
    assert!(provider.reload_if_changed());
    assert_eq!(provider.feature_count(), 5);
    assert!(!provider.reload_if_changed());

    assert_eq!(before.count(), 2);
}

#[test]
fn test_provider_metadata() {
    let dir = line_grid(1).into_dir();
    let provider = DmProvider::new(uri(dir.path(), "DM_PL"));
    assert_eq!(provider.name(), "dm");
    assert_eq!(provider.description(), "DM data provider");
    assert_eq!(provider.storage_type(), "DM files");
    assert_eq!(provider.geometry_type(), GeometryType::LineString);
    assert_eq!(provider.fields().names(), vec!["dmcode", "zukei", "kandan", "teni"]);
    assert!(provider.crs().is_some());
    assert_eq!(provider.capabilities().len(), 3);
}
