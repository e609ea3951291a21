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

//! Seeded image-foresting-transform flood. Starting from the surviving
//! minima, optimal paths propagate outward under the max-edge path metric
//! (water rises to the highest point crossed, it never accumulates), and
//! every masked node settles with the label of its optimum-path seed.

use log::debug;

use crate::cost::CostValue;
use crate::frontier::Frontier;
use crate::grid::Lattice;
use crate::minima::{MinimaMap, NO_BASIN};

/// Per-node flood state. Transitions run strictly forward:
/// unvisited → in-queue → settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
  Unvisited,
  InQueue,
  Settled,
}

#[cfg(feature = "progress")]
fn set_up_bar(node_count: u64) -> indicatif::ProgressBar {
  const TEMPLATE: &str = "{spinner}[{elapsed}/{duration}] settled {pos}/{len}{bar:60}";
  let style = indicatif::ProgressStyle::with_template(TEMPLATE);
  let bar = indicatif::ProgressBar::new(node_count);
  bar.set_style(style.unwrap());
  bar
}

/// Floods the masked topology from the seed plateaus and writes the final
/// basin label of every reachable node into `labels` (pre-zeroed by the
/// caller, so unmasked and unreachable nodes stay background).
///
/// `relabel` maps basin ids to seed labels; basins it maps to `0` were
/// suppressed by the simplifier and contribute no seeds — their plateaus are
/// flooded over through their saddles like any other node.
pub(crate) fn flood<C: CostValue>(
  lat: &Lattice,
  topo: &[C],
  mask: &[bool],
  minima: &MinimaMap<C>,
  relabel: &[usize],
  labels: &mut [usize],
) {
  let n = lat.len();

  //(1) the cost domain of the masked region picks the frontier strategy
  let mut bounds: Option<(C, C)> = None;
  for p in 0..n {
    if mask[p] {
      bounds = Some(match bounds {
        None => (topo[p], topo[p]),
        Some((lo, hi)) => (
          if topo[p].total_cmp(&lo).is_lt() { topo[p] } else { lo },
          if topo[p].total_cmp(&hi).is_gt() { topo[p] } else { hi },
        ),
      });
    }
  }
  let (lowest, highest) = match bounds {
    Some(b) => b,
    //nothing masked, nothing to flood
    None => return,
  };

  let mut frontier = Frontier::for_domain(lowest, highest);
  let mut state = vec![NodeState::Unvisited; n];
  let mut cost: Vec<C> = topo.to_vec();

  //(2) seed the frontier with the surviving plateaus, in row-major order so
  //the insertion sequence is reproducible
  for p in 0..n {
    let basin = minima.basin_of[p];
    if basin == NO_BASIN {
      continue;
    }
    let label = relabel[basin as usize];
    if label != 0 {
      labels[p] = label;
      state[p] = NodeState::InQueue;
      frontier.push(p, cost[p]);
    }
  }

  #[cfg(feature = "progress")]
  let bar = set_up_bar(mask.iter().filter(|&&m| m).count() as u64);

  //(3) the flood itself: strictly sequential, monotone in (cost, insertion
  //order). Stale frontier entries surface as already-settled nodes and are
  //skipped, which stands in for removing re-prioritised entries eagerly.
  let mut settled = 0usize;
  let mut scratch = Vec::with_capacity(6);
  while !frontier.is_empty() {
    let p = frontier.pop().expect("a non-empty frontier always pops");
    if state[p] == NodeState::Settled {
      continue;
    }
    state[p] = NodeState::Settled;
    settled += 1;
    #[cfg(feature = "progress")]
    bar.inc(1);

    lat.neighbours(p, &mut scratch);
    for &q in &scratch {
      if !mask[q] || state[q] == NodeState::Settled {
        continue;
      }
      //max-edge path metric
      let candidate = if topo[q] > cost[p] { topo[q] } else { cost[p] };
      if state[q] == NodeState::Unvisited || candidate < cost[q] {
        cost[q] = candidate;
        labels[q] = labels[p];
        state[q] = NodeState::InQueue;
        frontier.push(q, candidate);
      }
    }
  }

  #[cfg(feature = "progress")]
  bar.finish_and_clear();

  debug!("flood settled {settled} of {n} nodes");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::minima;

  fn run<C: CostValue>(shape: &[usize], topo: &[C], mask: &[bool], h: C) -> Vec<usize> {
    let lat = Lattice::from_shape(shape).unwrap();
    let map = minima::detect(&lat, topo, mask);
    let relabel = minima::simplify(&lat, topo, mask, &map, h);
    let mut labels = vec![0usize; lat.len()];
    flood(&lat, topo, mask, &map, &relabel, &mut labels);
    labels
  }

  #[test]
  fn two_pits_split_the_row_at_the_saddle() {
    let labels = run(&[1, 5], &[0u8, 3, 1, 3, 0], &[true; 5], 0);
    assert_eq!(labels, vec![1, 1, 2, 3, 3]);
  }

  #[test]
  fn suppressed_basin_is_flooded_over() {
    //h = 3 absorbs the middle pit; the first-in tie-break hands the contested
    //saddle plateau to the earlier seed
    let labels = run(&[1, 5], &[0u8, 3, 1, 3, 0], &[true; 5], 3);
    assert_eq!(labels, vec![1, 1, 1, 2, 2]);
  }

  #[test]
  fn unmasked_nodes_stay_background() {
    let mask = vec![true, true, false, true, true];
    let labels = run(&[1, 5], &[0u8, 3, 1, 3, 0], &mask, 0);
    assert_eq!(labels[2], 0);
    assert!(labels[0] > 0 && labels[4] > 0);
  }

  #[test]
  fn empty_mask_floods_nothing() {
    let labels = run(&[2, 2], &[1u8, 2, 3, 4], &[false; 4], 0);
    assert_eq!(labels, vec![0; 4]);
  }

  #[test]
  fn float_flood_matches_integer_flood() {
    let as_int = run(&[1, 5], &[0i32, 3, 1, 3, 0], &[true; 5], 0);
    let as_float = run(&[1, 5], &[0.0f32, 3.0, 1.0, 3.0, 0.0], &[true; 5], 0.0);
    assert_eq!(as_int, as_float);
  }

  #[test]
  fn volume_flood_assigns_every_masked_node() {
    //3×3×3 volume with two opposing corner pits
    let mut topo = vec![5u16; 27];
    topo[0] = 0;
    topo[26] = 1;
    let labels = run(&[3, 3, 3], &topo, &[true; 27], 0);
    assert!(labels.iter().all(|&l| l == 1 || l == 2));
    assert_eq!(labels[0], 1);
    assert_eq!(labels[26], 2);
  }
}
