pub mod error;
pub mod expression;
pub mod field;
pub mod fields;
pub mod file;
pub mod geometry;
pub mod index;
pub mod iterator;
pub mod layout;
pub mod mesh;
pub mod model;
pub mod parser;
pub mod provider;
pub mod reader;
pub mod transform;
pub mod uri;

pub use error::{DmError, RecordError, Result};
pub use expression::Expression;
pub use fields::{Field, FieldType, Fields};
pub use file::DmFile;
pub use geometry::GeometryType;
pub use iterator::{Feature, FeatureIterator, FeatureRequest, FeatureSource, ScanMode};
pub use model::{AttributeValue, Coordinate, Element, ElementKind};
pub use provider::{Capability, DmProvider};
pub use uri::{DataSourceUri, ProviderOptions};
