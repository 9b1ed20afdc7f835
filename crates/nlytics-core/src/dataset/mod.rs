//! Dataset model: typed cells, labeled series and column-major frames.
//!
//! The executor always works on a private deep copy of a [`DataFrame`]; these
//! types own all of their data, so `Clone` is that copy.

pub mod error;
pub mod frame;
pub mod index;
pub mod scalar;
pub mod series;
pub mod source;

pub use error::DatasetError;
pub use frame::{Column, ColumnInfo, DataFrame};
pub use index::Index;
pub use scalar::{format_float, DType, LookupKey, Scalar};
pub use series::Series;
pub use source::{DatasetSource, InMemorySource, JsonFileSource};

/// The dataset an analysis program runs against.
pub type Dataset = DataFrame;
