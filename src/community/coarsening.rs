// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use fixedbitset::FixedBitSet;

use super::index::NeighborhoodIndex;
use super::refinement::RefinedPartition;

/// Fold a refined partition into the next level of `index`.
///
/// Every micro community becomes its own community of the index, the index
/// is zoomed out so that each of them is a node of the induced graph, and the
/// induced nodes coming from the same macro community are then moved back
/// together, one community per connected piece of the macro community. Local
/// moving at the next level therefore starts from the macro partition, while
/// the induced graph keeps the refined structure.
///
/// Returns the number of nodes of the induced graph.
pub(crate) fn commit_level<I: NeighborhoodIndex>(index: &mut I, refined: &RefinedPartition) -> usize {
    split(index, refined);

    let relabel = index.zoom_out();
    let induced = index.node_count();

    // induced node -> macro group
    let mut group_of = vec![usize::MAX; induced];
    for (k, nodes) in refined.groups.iter().enumerate() {
        for &i in nodes {
            group_of[relabel[i]] = k;
        }
    }

    // the first node reached in each piece leads it
    let mut seen = FixedBitSet::with_capacity(induced);
    let mut stack = Vec::new();
    for leader in 0..induced {
        if seen.put(leader) {
            continue;
        }
        stack.push(leader);
        while let Some(node) = stack.pop() {
            for (j, _) in index.core().neighbors(node) {
                if group_of[j] == group_of[leader] && !seen.put(j) {
                    stack.push(j);
                }
            }
            if node != leader {
                index.expensive_move(node, leader);
            }
        }
    }

    index.core_mut().patch_dendrogram();
    induced
}

/// Turn every micro community into a community of the index.
///
/// The largest micro community of each macro community keeps the macro id.
/// Each other representative is isolated into a fresh community the first
/// time one of its members is met, and its members follow it.
fn split<I: NeighborhoodIndex>(index: &mut I, refined: &RefinedPartition) {
    let mut sizes = vec![0usize; index.node_count()];
    for &rep in &refined.micro {
        sizes[rep] += 1;
    }

    // representative -> its fresh community
    let mut fresh = vec![usize::MAX; index.node_count()];
    for (nodes, reps) in refined.groups.iter().zip(&refined.representatives) {
        if reps.len() < 2 {
            continue;
        }

        let mut keeper = reps[0];
        for &rep in &reps[1..] {
            if sizes[rep] > sizes[keeper] {
                keeper = rep;
            }
        }

        for &i in nodes {
            let rep = refined.micro[i];
            if rep == keeper {
                continue;
            }
            if fresh[rep] == usize::MAX {
                fresh[rep] = index.expensive_isolate(rep);
            }
            if i != rep {
                index.expensive_move(i, fresh[rep]);
            }
        }
    }
}
