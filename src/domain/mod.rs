//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - photometric bands and exposure parameters (`Band`, `ExposureContext`)
//! - per-stage measurements (`SkyStats`, `Centroid`, `SnrCurve`, `PeakMeasurement`)
//! - catalog records (`CatalogEntry`, `CatalogMatch`)
//! - run outputs (`PathMeasurement`, `MeasurementResult`) and `RunConfig`

pub mod types;

pub use types::*;
