use anyhow::{Context, Result};
use clap::Parser;
use geo_types::{Coord, Rect};
use japan_dm::geometry::to_wkt;
use japan_dm::uri::keys;
use japan_dm::{DataSourceUri, DmFile, DmProvider, ElementKind, FeatureRequest};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DMファイル（*.dm）を含むディレクトリ
    #[arg(value_name = "DIR", required = true)]
    dirs: Vec<PathBuf>,

    /// データの座標参照系（例: 2449, EPSG:6677）
    #[arg(long)]
    srid: String,

    /// 読み込む種別（dm_pg, dm_pl, dm_cir, dm_arc, dm_pt, dm_dir, dm_tx）。
    /// 省略時はグループヘッダに要素数がある種別をすべて読む
    #[arg(long, value_name = "KIND")]
    data_type: Option<ElementKind>,

    /// 属性条件式（例: "dmcode = 2101"）
    #[arg(long, value_name = "EXPR")]
    subset: Option<String>,

    /// 範囲指定（minx,miny,maxx,maxy）。出力先の座標系で指定する
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<Rect<f64>>,

    /// 範囲をジオメトリで判定する
    #[arg(long)]
    exact: bool,

    /// 指定したIDの地物のみ取得
    #[arg(long)]
    fid: Option<u64>,

    /// 出力先の座標系
    #[arg(long, value_name = "SRID")]
    dest_srid: Option<String>,

    /// 空間インデックスを作成
    #[arg(long)]
    spatial_index: bool,

    /// サブセットインデックスを作成しない
    #[arg(long)]
    no_subset_index: bool,

    /// 読み込む修正回数（デフォルト: 最新）
    #[arg(long)]
    overwriting_times: Option<usize>,

    /// 地物を1件ずつ出力
    #[arg(long)]
    list: bool,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,

    /// 読込エラーの詳細を出力しない
    #[arg(short, long)]
    quiet: bool,
}

fn parse_bbox(value: &str) -> std::result::Result<Rect<f64>, String> {
    let values = value
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid bbox '{}': {}", value, e))?;
    match values[..] {
        [minx, miny, maxx, maxy] => Ok(Rect::new(
            Coord { x: minx, y: miny },
            Coord { x: maxx, y: maxy },
        )),
        _ => Err(format!(
            "bbox needs 4 values (minx,miny,maxx,maxy), got {}",
            values.len()
        )),
    }
}

fn main() -> Result<()> {
    // ログの初期化（RUST_LOG未指定時はinfo）
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    info!("Processing {} directories", args.dirs.len());

    // ディレクトリごとに並列処理し、出力は入力順に表示する
    let results: Vec<Result<String>> = args
        .dirs
        .par_iter()
        .map(|dir| process_directory(dir, &args))
        .collect();

    let mut errors = Vec::new();
    for (dir, result) in args.dirs.iter().zip(results) {
        match result {
            Ok(report) => print!("{}", report),
            Err(e) => errors.push(format!("{}: {:#}", dir.display(), e)),
        }
    }

    info!("Total processing time: {:?}", start_time.elapsed());

    if !errors.is_empty() {
        error!("Failed to process {} directories:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} directories failed to process", errors.len());
    }

    Ok(())
}

fn process_directory(dir: &Path, args: &Args) -> Result<String> {
    let kinds = match args.data_type {
        Some(kind) => vec![kind],
        None => {
            let survey = DmFile::new(dir, "", &args.srid)
                .survey()
                .with_context(|| format!("Failed to survey {}", dir.display()))?;
            if !survey.any() {
                anyhow::bail!("no data found in group headers");
            }
            survey.kinds()
        }
    };

    let mut report = String::new();
    writeln!(report, "# {}", dir.display())?;
    for kind in kinds {
        let provider = DmProvider::new(build_uri(dir, kind, args));
        if !provider.is_valid() {
            let messages = provider.reported_errors().join("; ");
            anyhow::bail!("{} cannot be read: {}", kind, messages);
        }
        info!(
            "{}: {} {} features",
            dir.display(),
            provider.feature_count(),
            kind
        );
        write_layer(&mut report, &provider, args)?;
    }
    Ok(report)
}

fn build_uri(dir: &Path, kind: ElementKind, args: &Args) -> DataSourceUri {
    let mut uri = DataSourceUri::from_path(dir)
        .with_query_item(keys::DATA_TYPE, kind.token())
        .with_query_item(keys::SRID, &args.srid);
    if let Some(subset) = &args.subset {
        uri.set_query_item(keys::SUBSET, subset);
    }
    if args.spatial_index {
        uri.set_query_item(keys::SPATIAL_INDEX, "yes");
    }
    if args.no_subset_index {
        uri.set_query_item(keys::SUBSET_INDEX, "no");
    }
    if let Some(times) = args.overwriting_times {
        uri.set_query_item(keys::OVERWRITING_TIMES, &times.to_string());
    }
    if args.quiet {
        uri.set_query_flag(keys::QUIET);
    }
    uri
}

fn write_layer(report: &mut String, provider: &DmProvider, args: &Args) -> Result<()> {
    let kind = provider.uri().query_item(keys::DATA_TYPE).unwrap_or_default();
    writeln!(
        report,
        "## {} ({}): {} features",
        kind,
        provider.geometry_type().name(),
        provider.feature_count()
    )?;
    match provider.extent() {
        Some(extent) => writeln!(
            report,
            "extent: {},{},{},{}",
            extent.min().x,
            extent.min().y,
            extent.max().x,
            extent.max().y
        )?,
        None => writeln!(report, "extent: empty")?,
    }
    for message in provider.reported_errors() {
        writeln!(report, "warning: {}", message)?;
    }

    let filtered = args.bbox.is_some() || args.fid.is_some() || args.dest_srid.is_some();
    if !args.list && !filtered {
        return Ok(());
    }

    let mut request = FeatureRequest::new()
        .with_exact_intersect(args.exact)
        .with_no_geometry(!args.list);
    if let Some(bbox) = args.bbox {
        request = request.with_filter_rect(bbox);
    }
    if let Some(fid) = args.fid {
        request = request.with_filter_fid(fid);
    }
    if let Some(dest) = &args.dest_srid {
        request = request.with_destination_srid(dest);
    }

    let names = provider.fields().names();
    let mut matched = 0;
    for feature in provider.get_features(request) {
        matched += 1;
        if !args.list {
            continue;
        }
        let attributes = names
            .iter()
            .zip(feature.attributes())
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        let wkt = feature.geometry().map(to_wkt).unwrap_or_default();
        writeln!(report, "{}\t{}\t{}", feature.id(), attributes, wkt)?;
    }
    if filtered {
        writeln!(report, "matched: {}", matched)?;
    }
    Ok(())
}
