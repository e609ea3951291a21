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

//! Regional-minima detection and h-based basin simplification. The detector
//! labels every regional minimum of the masked topology in row-major
//! discovery order; the simplifier decides which of those minima survive the
//! merging threshold `h` and therefore seed the flood.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::debug;
use rayon::prelude::*;

use crate::cost::CostValue;
use crate::grid::Lattice;

/// Marker for nodes that belong to no minimum basin
pub(crate) const NO_BASIN: u32 = u32::MAX;

/// Regional minima of a masked topology. `basin_of[p]` holds the basin id of
/// node `p` (ids count up in row-major discovery order) or [`NO_BASIN`];
/// `floors[id]` is the plateau cost value of basin `id`.
pub(crate) struct MinimaMap<C> {
  pub basin_of: Vec<u32>,
  pub floors: Vec<C>,
}

impl<C> MinimaMap<C> {
  pub fn basin_count(&self) -> usize {
    self.floors.len()
  }
}

/// Finds all regional minima: maximal connected equal-cost plateaus with no
/// masked neighbour of strictly lower cost.
///
/// Runs in two passes. A parallel scan marks *candidates* (masked nodes with
/// no strictly lower masked neighbour); a sequential row-major pass then
/// labels connected candidate components. A component is discarded when any
/// member touches an equal-cost masked node outside the candidate set: such
/// a plateau drains through that node and is not a minimum.
pub(crate) fn detect<C: CostValue>(lat: &Lattice, topo: &[C], mask: &[bool]) -> MinimaMap<C> {
  let n = lat.len();

  //(1) candidate scan, one independent check per node
  let candidate: Vec<bool> = (0..n)
    .into_par_iter()
    .map_init(
      || Vec::with_capacity(6),
      |scratch, p| {
        if !mask[p] {
          return false;
        }
        lat.neighbours(p, scratch);
        !scratch.iter().any(|&q| mask[q] && topo[q] < topo[p])
      },
    )
    .collect();

  //(2) row-major connected-component labelling of the candidates.
  // Adjacent candidates always share one cost value: a candidate next to a
  // strictly lower node is no candidate at all, so only the equal-cost case
  // can join two of them.
  let mut basin_of = vec![NO_BASIN; n];
  let mut floors: Vec<C> = Vec::new();
  let mut draining: Vec<bool> = Vec::new();
  let mut queue = VecDeque::new();
  let mut scratch = Vec::with_capacity(6);

  for p in 0..n {
    if !candidate[p] || basin_of[p] != NO_BASIN {
      continue;
    }
    let id = floors.len() as u32;
    floors.push(topo[p]);
    draining.push(false);
    basin_of[p] = id;
    queue.push_back(p);

    while let Some(u) = queue.pop_front() {
      lat.neighbours(u, &mut scratch);
      for &q in &scratch {
        if !mask[q] || topo[q] != topo[u] {
          continue;
        }
        if candidate[q] {
          if basin_of[q] == NO_BASIN {
            basin_of[q] = id;
            queue.push_back(q);
          }
        } else {
          //the plateau continues into a node that drains somewhere lower
          draining[id as usize] = true;
        }
      }
    }
  }

  //(3) drop draining plateaus, renumber the rest in discovery order
  let mut remap = vec![NO_BASIN; floors.len()];
  let mut kept: Vec<C> = Vec::new();
  for (id, &drains) in draining.iter().enumerate() {
    if !drains {
      remap[id] = kept.len() as u32;
      kept.push(floors[id]);
    }
  }
  for b in basin_of.iter_mut() {
    if *b != NO_BASIN {
      *b = remap[*b as usize];
    }
  }

  debug!(
    "minima detection: {} candidate nodes, {} regional minima ({} draining plateaus dropped)",
    candidate.iter().filter(|&&c| c).count(),
    kept.len(),
    floors.len() - kept.len()
  );

  MinimaMap { basin_of, floors: kept }
}

/// Applies h-suppression to the detected minima and returns, per basin id,
/// the final seed label (`1..=k` over the survivors in discovery order, `0`
/// for suppressed basins).
///
/// The sweep is a Kruskal pass over the implicit face edges, weighted by
/// `max(cost(p), cost(q))` and visited in ascending order: masked nodes are
/// processed by `(cost, index)` and unioned with their already-processed
/// neighbours. Each fragment tracks its deepest basin — lowest floor, ties
/// to the earlier-discovered one. When two fragments first connect at level
/// `w`, that level is the saddle between their deepest basins, and the
/// shallower of the two is suppressed iff `w - floor < h`. The strict
/// inequality means `h == 0` suppresses nothing, and on equal floors the
/// earlier-discovered basin absorbs the later one.
pub(crate) fn simplify<C: CostValue>(
  lat: &Lattice,
  topo: &[C],
  mask: &[bool],
  minima: &MinimaMap<C>,
  h: C,
) -> Vec<usize> {
  let k = minima.basin_count();
  let mut suppressed = vec![false; k];

  let zero_h = h.total_cmp(&C::zero()) == Ordering::Equal;
  if !zero_h && k > 1 {
    let mut order: Vec<usize> = (0..lat.len()).filter(|&p| mask[p]).collect();
    order.par_sort_unstable_by(|&a, &b| topo[a].total_cmp(&topo[b]).then_with(|| a.cmp(&b)));

    let mut sets = DisjointSets::new(lat.len());
    //deepest basin per fragment, indexed by union-find root
    let mut rep: Vec<u32> = minima.basin_of.clone();
    let mut processed = vec![false; lat.len()];
    let mut scratch = Vec::with_capacity(6);

    for &p in &order {
      processed[p] = true;
      lat.neighbours(p, &mut scratch);
      for &q in &scratch {
        if !mask[q] || !processed[q] {
          continue;
        }
        let root_p = sets.find(p);
        let root_q = sets.find(q);
        if root_p == root_q {
          continue;
        }
        //the two fragments first connect here, at saddle level topo[p]
        let merged_rep = match (rep[root_p], rep[root_q]) {
          (NO_BASIN, other) | (other, NO_BASIN) => other,
          (a, b) => {
            let (deep, shallow) = if outranks(&minima.floors, a, b) { (a, b) } else { (b, a) };
            if C::within_merge_depth(topo[p], minima.floors[shallow as usize], h) {
              suppressed[shallow as usize] = true;
            }
            deep
          }
        };
        let root = sets.union(root_p, root_q);
        rep[root] = merged_rep;
      }
    }
  }

  let mut relabel = vec![0usize; k];
  let mut next = 1usize;
  for (id, &gone) in suppressed.iter().enumerate() {
    if !gone {
      relabel[id] = next;
      next += 1;
    }
  }
  debug!("h-simplification: {}/{} basins survive", next - 1, k);
  relabel
}

/// `true` iff basin `a` outranks basin `b` as the deeper one: lower floor
/// value, ties to the earlier discovery order.
fn outranks<C: CostValue>(floors: &[C], a: u32, b: u32) -> bool {
  match floors[a as usize].total_cmp(&floors[b as usize]) {
    Ordering::Less => true,
    Ordering::Greater => false,
    Ordering::Equal => a < b,
  }
}

/// Union-find over flat node indices, path halving and union by size.
struct DisjointSets {
  parent: Vec<usize>,
  size: Vec<u32>,
}

impl DisjointSets {
  fn new(n: usize) -> Self {
    DisjointSets { parent: (0..n).collect(), size: vec![1; n] }
  }

  fn find(&mut self, mut x: usize) -> usize {
    while self.parent[x] != x {
      self.parent[x] = self.parent[self.parent[x]];
      x = self.parent[x];
    }
    x
  }

  /// Merges two roots, returns the surviving root
  fn union(&mut self, a: usize, b: usize) -> usize {
    let (big, small) = if self.size[a] >= self.size[b] { (a, b) } else { (b, a) };
    self.parent[small] = big;
    self.size[big] += self.size[small];
    big
  }
}
