//! 🫁欢迎光临🫁
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::consts::{encode_label, region_of, type_of, ChestRegion, ChestType};
pub use crate::volume::{CtScan, DistanceMap, LabelMap, PatchMap, Volume};

pub use crate::table::{FeatureTable, RowKey};
pub use crate::features::{
    DistanceExtractor, ExtractorInput, FeatureExtractor, KdeHistogramExtractor,
};

pub use crate::geometry::{read_vtk, write_vtk, DataArray, ParticleSet, ScalarType, VtkEncoding};
pub use crate::cluster::{ClusterMethod, ClusterParticles, LeftRightLabeling};

pub use crate::particles::{AirwayParticles, AirwayParticlesOptions, SystemRunner};
