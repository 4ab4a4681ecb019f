#![warn(missing_docs)]

//! 核心库. 提供胸部 CT 定量分析所需的数据结构与算法.
//!
//! # 功能
//!
//! ### 逐 patch 特征提取 ✅
//!
//! 距离统计与 HU 核密度直方图, 结果以 `(patch_label, ChestRegion, ChestType)`
//! 为键合并进同一张特征表.
//!
//! 实现位于 `chest-berry/src/features`, 特征表位于 `chest-berry/src/table.rs`.
//!
//! ### 粒子聚类与左右肺划分 ✅
//!
//! 对粒子点坐标标准化后以 DBSCAN, k-means 或 mini-batch k-means 聚类;
//! 两类 k-means 的结果按质心第一坐标分为左右两侧.
//!
//! 实现位于 `chest-berry/src/cluster`, 粒子文件读写位于 `chest-berry/src/geometry`.
//!
//! ### 气道粒子采样编排 ✅
//!
//! 按固定的三轮参数表调用外部采样程序, 最后导出为 VTK.
//!
//! 实现位于 `chest-berry/src/particles`.
//!
//! ### 流水线封装代码生成 ✅
//!
//! 由命令行模块的 XML 描述生成 Python 封装类, 并组织成包.
//!
//! 实现位于 `chest-berry/src/codegen`.
//!
//! # 注意
//!
//! 体数据一律以 `(z, h, w)` 顺序存储, 与 nifti 文件中的 `[W, H, z]` 不同.

/// 三维索引, `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

pub mod volume;

pub mod table;

pub mod features;

pub mod geometry;
pub mod cluster;

pub mod particles;

pub mod codegen;

pub mod prelude;
