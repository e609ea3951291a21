/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of rustronomy-basins.

  rustronomy is free software: you can redistribute it and/or modify it under
  the terms of the European Union Public License version 1.2 or later, as
  published by the European Commission.

  rustronomy is distributed in the hope that it will be useful, but WITHOUT ANY
  WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
  A PARTICULAR PURPOSE. See the European Union Public License for more details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with rustronomy.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

#![doc(
  html_logo_url = "https://raw.githubusercontent.com/smups/rustronomy/main/logos/Rustronomy_ferris.png?raw=true"
)]
//! Rustronomy-basins is a pure-rust implementation of the *watershed from
//! minima* transform (see Falcão, Stolfi & Lotufo, 2004[^1]) for 2D and 3D
//! scalar grids.
//!
//! # Features
//! Given a cost surface (the *topology*), an optional validity mask and a
//! non-negative merging threshold `h`, the transform partitions the masked
//! region into labeled catchment basins, one per regional minimum that is at
//! least `h` deep:
//! 1. regional minima of the masked topology are detected and labeled in
//! row-major discovery order;
//! 2. minima whose basin rises less than `h` from floor to saddle are merged
//! into their deeper neighbours (the *h-minima* simplification);
//! 3. a priority flood propagates optimal paths outward from the surviving
//! minima under the max-edge path metric, so every masked node ends up in
//! the basin of the seed that reaches it at the lowest water level.
//!
//! The transform runs on `u8`, `u16`, `u32`, `i16`, `i32`, `i64`, `f32` and
//! `f64` topologies of rank 2 (4-connected) or 3 (6-connected), and is fully
//! deterministic: ties on cost plateaus are broken by insertion order, so
//! repeated runs over the same input produce byte-identical label grids.
//!
//! In addition, `rustronomy-basins` provides extra functionality which can
//! be accessed via cargo feature gates. A list of all additional features
//! [can be found below](#cargo-feature-gates).
//!
//! # Quickstart
//! To use the latest release of Rustronomy-basins in a cargo project, add
//! the rustronomy-basins crate as a dependency to your `Cargo.toml` file:
//! ```toml
//! [dependencies]
//! rustronomy-basins = "0.1.0"
//! ```
//! To use Rustronomy-basins in a Jupyter notebook, execute a cell containing
//! the following code:
//! ```text
//! :dep rustronomy-basins = {version = "0.1"}
//! ```
//!
//! ## Short example: segmenting a random field
//! `rustronomy-basins` uses the commonly used "builder pattern" to configure
//! the transform before executing it. Create a `TransformBuilder`, set the
//! merging threshold and call `build()` to obtain a (`Sync`&`Send`)
//! transform object, which may be shared between threads and used to execute
//! any number of independent transforms.
//! ```rust
//! use ndarray as nd;
//! use ndarray_rand::{rand_distr::Uniform, RandomExt};
//! use rustronomy_basins::prelude::*;
//!
//! //Create a random uniform cost field
//! let topology = nd::Array2::<u8>::random((256, 256), Uniform::new(0, 254));
//! //Set-up the watershed transform with a merging depth of two grey levels
//! let watershed = TransformBuilder::new().set_merge_level(2u8).build().unwrap();
//! //Execute the transform; passing no mask floods the whole grid
//! let labels = watershed.transform(topology.view(), None).unwrap();
//! assert!(labels.iter().all(|&label| label > 0));
//! ```
//! [^1]: A.X. Falcão, J. Stolfi and R. de Alencar Lotufo, **The image
//! foresting transform: theory, algorithms, and applications.** *IEEE
//! Transactions on Pattern Analysis and Machine Intelligence*, 2004.
//!
//! # Cargo feature gates
//! *By default, all features behind cargo feature gates are **disabled***
//! - `jemalloc`: this feature enables the [jemalloc allocator](https://jemalloc.net).
//! From the jemalloc website: *"jemalloc is a general purpose `malloc`(3)
//! implementation that emphasizes fragmentation avoidance and scalable
//! concurrency support."*. Enabling this feature can improve run-time
//! performance on machines with many cores, at the price of considerably
//! longer compile times. To compile `rustronomy-basins` with the `jemalloc`
//! feature, jemalloc must be installed on the host system.
//! - `progress`: this feature enables a progress bar over the flooding
//! stage. Enabling this feature adds the `indicatif` crate as a dependency,
//! which should not considerably slow down compile times.

//Unconditional imports
use ndarray as nd;
use num_traits::{Float, Num, ToPrimitive};
use thiserror::Error;

//Set Jemalloc as the global allocator for this crate
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod cost;
mod flood;
mod frontier;
mod grid;
mod minima;

pub use cost::CostValue;

//Label reserved for nodes outside the mask
pub const BACKGROUND: usize = 0;

//Special cost values produced by the `u8` pre-processor
const NORMAL_MAX: u8 = u8::MAX - 1;
const ALWAYS_FILL: u8 = u8::MIN;
const NEVER_FILL: u8 = u8::MAX;

//Utility prelude for batch import
pub mod prelude {
  pub use crate::{BasinUtils, CostValue, MinimaWatershed, TransformBuilder, WatershedError};
}

////////////////////////////////////////////////////////////////////////////////
//                              ERROR HANDLING                                //
////////////////////////////////////////////////////////////////////////////////

/// Errors reported while validating a transform configuration or its inputs.
///
/// Every variant is a construction-time validation failure: once validation
/// passes, the flood is a total computation over finitely many nodes and
/// cannot fail mid-run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatershedError {
  /// Topology and mask buffers differ in shape
  #[error("topology shape {topology:?} does not match mask shape {mask:?}")]
  ShapeMismatch { topology: Vec<usize>, mask: Vec<usize> },

  /// Shape rank other than 2 or 3
  #[error("unsupported dimensionality {0}: only 2D and 3D grids are supported")]
  UnsupportedDimensionality(usize),

  /// Element type without a registered cost adapter. The statically typed
  /// API cannot produce this variant — the sealed [`CostValue`] trait is the
  /// adapter registry, checked at compile time — but dynamically-typed
  /// front-ends doing their own dtype dispatch surface it.
  #[error("unsupported element type {0}")]
  UnsupportedElementType(&'static str),

  /// Negative or non-finite merging threshold
  #[error("invalid merging threshold {0}: h must be non-negative and finite")]
  InvalidThreshold(String),

  /// Shape with a zero-length axis
  #[error("malformed shape {0:?}: every axis must be non-empty")]
  MalformedShape(Vec<usize>),
}

/// Result type alias for watershed operations
pub type Result<T> = std::result::Result<T, WatershedError>;

////////////////////////////////////////////////////////////////////////////////
//                           WATERSHED TRANSFORM                              //
////////////////////////////////////////////////////////////////////////////////

/// Builder for configuring a watershed-from-minima transform.
///
/// Use the associated functions to set options, then generate the transform
/// object with `build()`. The merging threshold defaults to zero, which
/// keeps every regional minimum as a separate basin.
///
/// ```rust
/// use rustronomy_basins::prelude::*;
///
/// let watershed = TransformBuilder::new().set_merge_level(0.5f64).build().unwrap();
/// //a negative threshold is rejected at build time
/// assert!(TransformBuilder::new().set_merge_level(-1i32).build().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct TransformBuilder<C: CostValue> {
  merge_level: C,
}

impl<C: CostValue> TransformBuilder<C> {
  /// creates a new `TransformBuilder` with a zero merging threshold
  pub fn new() -> Self {
    TransformBuilder { merge_level: C::zero() }
  }

  /// Set the merging threshold `h`: minima whose basins rise less than `h`
  /// from floor to saddle are merged into a deeper neighbour.
  pub fn set_merge_level(mut self, h: C) -> Self {
    self.merge_level = h;
    self
  }

  /// Build a [`MinimaWatershed`] from the current builder configuration.
  /// Returns an `Err` result if the configured merging threshold is
  /// negative (or, for float thresholds, not finite).
  pub fn build(self) -> Result<MinimaWatershed<C>> {
    if !self.merge_level.is_valid_threshold() {
      return Err(WatershedError::InvalidThreshold(format!("{:?}", self.merge_level)));
    }
    Ok(MinimaWatershed { merge_level: self.merge_level })
  }
}

impl<C: CostValue> Default for TransformBuilder<C> {
  fn default() -> Self {
    Self::new()
  }
}

/// Watershed-from-minima transform for one cost element type.
///
/// The transform object holds no per-call state: `transform` takes `&self`
/// and the object is `Send + Sync`, so independent transforms over different
/// grids may run concurrently from a shared reference. Each call owns its
/// state, path-cost and label buffers; the label grid is the only artifact
/// that survives the call.
#[derive(Debug, Clone)]
pub struct MinimaWatershed<C: CostValue> {
  merge_level: C,
}

impl<C: CostValue> MinimaWatershed<C> {
  /// Returns the watershed-from-minima transform of the masked topology.
  ///
  /// Every masked node receives the label (`1..=k`, numbered in basin
  /// discovery order) of the surviving minimum whose optimum path reaches
  /// it first; unmasked nodes receive [`BACKGROUND`]. Passing `None` for
  /// the mask is equivalent to an all-true mask.
  ///
  /// # Errors
  /// Fails without computing anything if the shape rank is not 2 or 3, if
  /// an axis is empty, or if the mask shape differs from the topology shape.
  pub fn transform<D: nd::Dimension>(
    &self,
    topology: nd::ArrayView<C, D>,
    mask: Option<nd::ArrayView<bool, D>>,
  ) -> Result<nd::Array<usize, D>> {
    let lattice = validated_lattice(&topology, mask.as_ref())?;
    let dim = topology.raw_dim();

    //flatten both buffers to row-major node order
    let topo_flat = topology.to_shape(lattice.len()).expect("node count is the shape product");
    let topo = topo_flat.as_slice().expect("flattened views are standard layout");
    let mask_flat: nd::CowArray<bool, nd::Ix1> = match &mask {
      Some(m) => m.to_shape(lattice.len()).expect("mask shape was checked against topology"),
      None => nd::Array1::from_elem(lattice.len(), true).into(),
    };
    let mask_buf = mask_flat.as_slice().expect("flattened views are standard layout");

    log::debug!(
      "watershed from minima: {:?} grid of {}, h = {:?}",
      topology.shape(),
      C::DTYPE,
      self.merge_level
    );

    //minima detection → h-simplification → flood
    let minima = minima::detect(&lattice, topo, mask_buf);
    let relabel = minima::simplify(&lattice, topo, mask_buf, &minima, self.merge_level);
    let mut labels = vec![BACKGROUND; lattice.len()];
    flood::flood(&lattice, topo, mask_buf, &minima, &relabel, &mut labels);

    Ok(nd::Array::from_shape_vec(dim, labels).expect("one label per node"))
  }

  /// Labels the regional minima of the masked topology without flooding.
  ///
  /// Nodes belonging to the `i`-th regional minimum (in row-major discovery
  /// order) are labeled `i + 1`; all other nodes are [`BACKGROUND`]. The
  /// merging threshold plays no role here: this is the seed set *before*
  /// h-simplification, so the number of distinct labels equals the number
  /// of labels `transform` produces at `h == 0`.
  pub fn find_regional_minima<D: nd::Dimension>(
    &self,
    topology: nd::ArrayView<C, D>,
    mask: Option<nd::ArrayView<bool, D>>,
  ) -> Result<nd::Array<usize, D>> {
    let lattice = validated_lattice(&topology, mask.as_ref())?;
    let dim = topology.raw_dim();

    let topo_flat = topology.to_shape(lattice.len()).expect("node count is the shape product");
    let topo = topo_flat.as_slice().expect("flattened views are standard layout");
    let mask_flat: nd::CowArray<bool, nd::Ix1> = match &mask {
      Some(m) => m.to_shape(lattice.len()).expect("mask shape was checked against topology"),
      None => nd::Array1::from_elem(lattice.len(), true).into(),
    };
    let mask_buf = mask_flat.as_slice().expect("flattened views are standard layout");

    let minima = minima::detect(&lattice, topo, mask_buf);
    let labels: Vec<usize> = minima
      .basin_of
      .iter()
      .map(|&b| if b == minima::NO_BASIN { BACKGROUND } else { b as usize + 1 })
      .collect();

    Ok(nd::Array::from_shape_vec(dim, labels).expect("one label per node"))
  }
}

fn validated_lattice<A, D: nd::Dimension>(
  topology: &nd::ArrayView<A, D>,
  mask: Option<&nd::ArrayView<bool, D>>,
) -> Result<grid::Lattice> {
  let lattice = grid::Lattice::from_shape(topology.shape())?;
  if let Some(m) = mask {
    if m.shape() != topology.shape() {
      return Err(WatershedError::ShapeMismatch {
        topology: topology.shape().to_vec(),
        mask: m.shape().to_vec(),
      });
    }
  }
  Ok(lattice)
}

////////////////////////////////////////////////////////////////////////////////
//                            INPUT PREPARATION                               //
////////////////////////////////////////////////////////////////////////////////

/// This trait contains useful functions for preparing images to be used as
/// input for a watershed transform.
pub trait BasinUtils {
  /// The `pre_processor` function converts an array of any numeric
  /// data-type `T` into a `u8` cost array that the transform knows how to
  /// handle. Finite values are clamped to the range of non-special `u8`
  /// values; `NaN` and positive infinity are mapped to the special
  /// never-flood value (`u8::MAX`, the highest cost) and negative infinity
  /// to the always-flood value (`u8::MIN`, the lowest cost).
  fn pre_processor<T, D>(&self, img: nd::ArrayView<T, D>) -> nd::Array<u8, D>
  where
    T: Num + Copy + ToPrimitive + PartialOrd,
    D: nd::Dimension,
  {
    //Calculate the finite value range of the image
    let mut range: Option<(f64, f64)> = None;
    for float in img.iter().filter_map(|x| x.to_f64()).filter(|f| f.is_finite()) {
      range = Some(match range {
        None => (float, float),
        Some((min, max)) => (min.min(float), max.max(float)),
      });
    }
    let (min, max) = range.unwrap_or((0.0, 1.0));
    let span = if max > min { max - min } else { 1.0 };

    //Map image to the u8 range, taking care of NaN and infinities
    img.mapv(|x| -> u8 {
      let float = x.to_f64().unwrap_or(f64::NAN);
      if float.is_finite() {
        (((float - min) / span) * NORMAL_MAX as f64) as u8
      } else if float == f64::NEG_INFINITY {
        ALWAYS_FILL
      } else {
        NEVER_FILL
      }
    })
  }

  /// Derives a validity mask that excludes every non-finite node of a float
  /// topology. Feeding the returned mask alongside the unmodified topology
  /// keeps `NaN` and infinite nodes in the background instead of letting
  /// them form spurious basins.
  fn finite_mask<T, D>(&self, img: nd::ArrayView<T, D>) -> nd::Array<bool, D>
  where
    T: Float,
    D: nd::Dimension,
  {
    img.mapv(|x| x.is_finite())
  }
}

impl<C: CostValue> BasinUtils for MinimaWatershed<C> {}
