use std::fmt;

use ::gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

use super::{epsg_code, CoordinateTransform, TransformFactory};
use crate::error::{DmError, Result};

/// GDAL/OGR による任意の EPSG 間の変換
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalTransformFactory;

impl TransformFactory for GdalTransformFactory {
    fn create(&self, source: &str, destination: &str) -> Result<Box<dyn CoordinateTransform>> {
        let source = spatial_ref(source)?;
        let destination = spatial_ref(destination)?;
        let forward = CoordTransform::new(&source, &destination).map_err(transform_error)?;
        let backward = CoordTransform::new(&destination, &source).map_err(transform_error)?;
        Ok(Box::new(GdalTransform { forward, backward }))
    }
}

fn spatial_ref(srid: &str) -> Result<SpatialRef> {
    let code = epsg_code(srid)
        .ok_or_else(|| DmError::Transform(format!("invalid reference system: {}", srid)))?;
    let mut srs = SpatialRef::from_epsg(code).map_err(transform_error)?;
    // 経度・緯度の順で扱う
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

fn transform_error(e: ::gdal::errors::GdalError) -> DmError {
    DmError::Transform(e.to_string())
}

struct GdalTransform {
    forward: CoordTransform,
    backward: CoordTransform,
}

impl fmt::Debug for GdalTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GdalTransform")
    }
}

fn apply(transform: &CoordTransform, x: f64, y: f64) -> Result<(f64, f64)> {
    let mut xs = [x];
    let mut ys = [y];
    let mut zs = [0.0];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(transform_error)?;
    Ok((xs[0], ys[0]))
}

impl CoordinateTransform for GdalTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        apply(&self.forward, x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        apply(&self.backward, x, y)
    }
}
