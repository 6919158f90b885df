// Copyright 2023 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! Virtual screening job-matrix generator for AutoDock 4.
//!
//! Ligands are registered and filtered, then every accepted ligand is paired
//! with every receptor conformation. Each pair gets a job directory with the
//! structures, grid maps or grid parameters, a docking parameter file and a
//! run script.

use nalgebra::Vector3;

pub type Point = Vector3<f64>;

/// Largest number of rotatable bonds AutoDock 4 can handle, flexible residues included.
pub const MAX_TORSDOF: usize = 32;

pub mod archive;
pub mod atomtype;
pub mod cli;
pub mod config;
pub mod engine;
pub mod filter;
pub mod flex;
pub mod fsops;
pub mod generate;
pub mod maps;
pub mod params;
pub mod receptor;
pub mod registry;
pub mod request;
pub mod runlog;
pub mod scripts;
pub mod structure;
