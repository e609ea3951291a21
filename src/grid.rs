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

//! Flat-addressed lattice model for 2D and 3D grids: shape validation,
//! row-major indexing and face-adjacent neighbour enumeration.

use crate::WatershedError;

/// Face-adjacent lattice over a row-major flat buffer.
///
/// Flat addressing follows `ndarray`'s standard (C) order: the last axis is
/// the contiguous one. Connectivity is 4-way for planes and 6-way for
/// volumes. Neighbours are written into a caller-owned scratch buffer so the
/// flood loop never allocates per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lattice {
  Plane { rows: usize, cols: usize },
  Volume { slices: usize, rows: usize, cols: usize },
}

impl Lattice {
  /// Validates a shape slice: the rank must be 2 or 3 and every axis must be
  /// non-empty.
  pub fn from_shape(shape: &[usize]) -> Result<Self, WatershedError> {
    if shape.iter().any(|&ax| ax == 0) {
      return Err(WatershedError::MalformedShape(shape.to_vec()));
    }
    match *shape {
      [rows, cols] => Ok(Lattice::Plane { rows, cols }),
      [slices, rows, cols] => Ok(Lattice::Volume { slices, rows, cols }),
      _ => Err(WatershedError::UnsupportedDimensionality(shape.len())),
    }
  }

  /// Total number of nodes
  pub fn len(&self) -> usize {
    match *self {
      Lattice::Plane { rows, cols } => rows * cols,
      Lattice::Volume { slices, rows, cols } => slices * rows * cols,
    }
  }

  /// Overwrites `out` with the flat indices of the face-adjacent neighbours
  /// of node `p`, in a fixed order: last axis first, negative direction
  /// before positive. The enumeration order is part of the determinism
  /// contract, since it fixes the insertion sequence of the frontier.
  ///
  /// Coordinates wrap around on subtraction, so an upper-bound check alone
  /// rejects both ends of each axis.
  #[inline]
  pub fn neighbours(&self, p: usize, out: &mut Vec<usize>) {
    out.clear();
    match *self {
      Lattice::Plane { rows, cols } => {
        let x = p % cols;
        let y = p / cols;
        for (nx, ny) in
          [(x.wrapping_sub(1), y), (x + 1, y), (x, y.wrapping_sub(1)), (x, y + 1)]
        {
          if nx < cols && ny < rows {
            out.push(nx + ny * cols);
          }
        }
      }
      Lattice::Volume { slices, rows, cols } => {
        let x = p % cols;
        let y = (p / cols) % rows;
        let z = p / (cols * rows);
        for (nx, ny, nz) in [
          (x.wrapping_sub(1), y, z),
          (x + 1, y, z),
          (x, y.wrapping_sub(1), z),
          (x, y + 1, z),
          (x, y, z.wrapping_sub(1)),
          (x, y, z + 1),
        ] {
          if nx < cols && ny < rows && nz < slices {
            out.push(nx + (ny + nz * rows) * cols);
          }
        }
      }
    }
  }
}
