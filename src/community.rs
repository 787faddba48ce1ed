// Licensed under the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License. You may obtain
// a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
// License for the specific language governing permissions and limitations
// under the License.

//! Modularity-based community detection.
//!
//! [`leiden`] drives the multi-level engine: [`local_moving`] greedily moves
//! nodes between communities, [`refinement`] splits every resulting community
//! into well-connected sub-communities and [`coarsening`] folds the refined
//! partition into the next level of the [`index`].

mod coarsening;
mod common;
pub(crate) mod index;
pub mod leiden;
mod local_moving;
pub mod modularity;
pub mod refinement;
