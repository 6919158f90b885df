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

use super::{keyword, parameter_file_name, substitute, Template};
use crate::atomtype::{DESOLVATION, ELECTROSTATIC};
use crate::Point;

/// AutoDock 4.2 Lamarckian GA docking template.
pub const DEFAULT_DPF: &str = "\
autodock_parameter_version 4.2       # used by autodock to validate parameter set
outlev 1                             # diagnostic output level
intelec                              # calculate internal electrostatics
seed pid time                        # seeds for random generator
ligand_types HD OA                   # atoms types in ligand
fld receptor.maps.fld                # grid_data_file
map receptor.HD.map                  # atom-specific affinity map
map receptor.OA.map                  # atom-specific affinity map
elecmap receptor.e.map               # electrostatics map
desolvmap receptor.d.map             # desolvation map
move ligand.pdbqt                    # small molecule
about 0.378 0.6623 0.648             # small molecule center
tran0 random                         # initial coordinates/A or random
axisangle0 random                    # initial orientation
dihe0 random                         # initial dihedrals (relative) or random
tstep 2.0                            # translation step/A
qstep 50.0                           # quaternion step/deg
dstep 50.0                           # torsion step/deg
torsdof 0                            # torsional degrees of freedom
rmstol 2.0                           # cluster_tolerance/A
extnrg 1000.0                        # external grid energy
e0max 0.0 10000                      # max initial energy; max number of retries
ga_pop_size 150                      # number of individuals in population
ga_num_evals 2500000                 # maximum number of energy evaluations
ga_num_generations 27000             # maximum number of generations
ga_elitism 1                         # number of top individuals to survive to next generation
ga_mutation_rate 0.02                # rate of gene mutation
ga_crossover_rate 0.8                # rate of crossover
ga_window_size 10                    #
ga_cauchy_alpha 0.0                  # Alpha parameter of Cauchy distribution
ga_cauchy_beta 1.0                   # Beta parameter Cauchy distribution
set_ga                               # set the above parameters for GA or LGA
sw_max_its 300                       # iterations of Solis & Wets local search
sw_max_succ 4                        # consecutive successes before changing rho
sw_max_fail 4                        # consecutive failures before changing rho
sw_rho 1.0                           # size of local search space to sample
sw_lb_rho 0.01                       # lower bound on rho
ls_search_freq 0.06                  # probability of performing local search on individual
set_psw1                             # set the above pseudo-Solis & Wets parameters
unbound_model bound                  # state of unbound ligand
ga_run 10                            # do this many hybrid GA-LS runs
analysis                             # perform a ranked cluster analysis
";

/// Job-specific values substituted into a docking template.
#[derive(Debug, Clone)]
pub struct DockingParameters<'a> {
    /// Ligand file name inside the job directory.
    pub ligand: &'a str,
    /// Map file stem, i.e. the receptor stem.
    pub map_stem: &'a str,
    /// Ligand types followed by any extra flexible residue types.
    pub types: &'a [String],
    /// Flexible residue file name inside the job directory.
    pub flexres: Option<&'a str>,
    pub center: Point,
    /// Number of `BRANCH` records.
    pub dihedrals: usize,
    pub torsdof: usize,
}

impl DockingParameters<'_> {
    /// Render the docking parameter file.
    ///
    /// Lines with keywords that do not depend on the job are copied verbatim.
    /// All `map` lines of the template collapse into one line per type at the
    /// position of the first, and `flexres` always follows `move`.
    pub fn render(&self, template: &Template) -> String {
        let mut lines = Vec::with_capacity(template.lines().len() + self.types.len());
        let mut maps_done = false;
        for line in template.lines() {
            let Some(key) = keyword(line) else {
                lines.push(line.clone());
                continue;
            };
            let code = match key {
                "ligand_types" => format!("ligand_types {}", self.types.join(" ")),
                "fld" => format!("fld {}.maps.fld", self.map_stem),
                "map" => {
                    if !maps_done {
                        maps_done = true;
                        lines.extend(self.types.iter().map(|t| {
                            substitute(line, &format!("map {}.{}.map", self.map_stem, t))
                        }));
                    }
                    continue;
                }
                "elecmap" => format!("elecmap {}.{}.map", self.map_stem, ELECTROSTATIC),
                "desolvmap" => format!("desolvmap {}.{}.map", self.map_stem, DESOLVATION),
                "move" => {
                    lines.push(substitute(line, &format!("move {}", self.ligand)));
                    if let Some(flexres) = self.flexres {
                        lines.push(format!("flexres {}", flexres));
                    }
                    continue;
                }
                "flexres" => continue,
                "about" => format!(
                    "about {:.4} {:.4} {:.4}",
                    self.center.x, self.center.y, self.center.z
                ),
                "ndihe" => format!("ndihe {}", self.dihedrals),
                "torsdof" => format!("torsdof {}", self.torsdof),
                "parameter_file" => match template.parameter_file() {
                    Some(path) => format!("parameter_file {}", parameter_file_name(&path)),
                    None => {
                        lines.push(line.clone());
                        continue;
                    }
                },
                _ => {
                    lines.push(line.clone());
                    continue;
                }
            };
            lines.push(substitute(line, &code));
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}
