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

use super::{parameter_file_name, Template};
use crate::atomtype::{self, DESOLVATION, ELECTROSTATIC};
use itertools::Itertools;

const DEFAULT_NPTS: &str = "40 40 40";
const DEFAULT_SPACING: &str = "0.375";
const DEFAULT_GRIDCENTER: &str = "auto";
const DEFAULT_SMOOTH: &str = "0.5";
const DEFAULT_DIELECTRIC: &str = "-0.1465";

/// Receptor-specific values for a grid parameter file.
#[derive(Debug, Clone)]
pub struct GridParameters<'a> {
    /// Receptor file name inside the directory where AutoGrid runs.
    pub receptor: &'a str,
    /// Map file stem, i.e. the receptor stem.
    pub map_stem: &'a str,
    pub receptor_types: &'a [String],
    /// Atom types to compute maps for. Pseudo-types are skipped.
    pub ligand_types: &'a [String],
}

impl GridParameters<'_> {
    /// Render a grid parameter file in AutoGrid 4 keyword order.
    ///
    /// Box size, spacing, center, smoothing, dielectric and the force field
    /// file come from the template; everything else is computed.
    pub fn render(&self, template: &Template) -> String {
        let value = |key: &str, default: &'static str| -> String {
            template
                .value(key)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let ligand_types: Vec<&String> = self
            .ligand_types
            .iter()
            .filter(|t| !atomtype::PSEUDO_TYPES.contains(&t.as_str()))
            .unique()
            .collect();

        let mut lines = vec![format!("npts {}", value("npts", DEFAULT_NPTS))];
        if let Some(path) = template.parameter_file() {
            lines.push(format!("parameter_file {}", parameter_file_name(&path)));
        }
        lines.push(format!("gridfld {}.maps.fld", self.map_stem));
        lines.push(format!("spacing {}", value("spacing", DEFAULT_SPACING)));
        lines.push(format!("receptor_types {}", self.receptor_types.join(" ")));
        lines.push(format!("ligand_types {}", ligand_types.iter().join(" ")));
        lines.push(format!("receptor {}", self.receptor));
        lines.push(format!("gridcenter {}", value("gridcenter", DEFAULT_GRIDCENTER)));
        lines.push(format!("smooth {}", value("smooth", DEFAULT_SMOOTH)));
        lines.extend(
            ligand_types
                .iter()
                .map(|t| format!("map {}.{}.map", self.map_stem, t)),
        );
        lines.push(format!("elecmap {}.{}.map", self.map_stem, ELECTROSTATIC));
        lines.push(format!("dsolvmap {}.{}.map", self.map_stem, DESOLVATION));
        lines.push(format!("dielectric {}", value("dielectric", DEFAULT_DIELECTRIC)));
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_in_canonical_order() {
        let receptor_types = strings(&["C", "N", "OA"]);
        let ligand_types = strings(&["C", "HD", "e", "d", "C"]);
        let gpf = GridParameters {
            receptor: "rec.pdbqt",
            map_stem: "rec",
            receptor_types: &receptor_types,
            ligand_types: &ligand_types,
        }
        .render(&Template::default());
        assert_eq!(
            gpf,
            "npts 40 40 40
gridfld rec.maps.fld
spacing 0.375
receptor_types C N OA
ligand_types C HD
receptor rec.pdbqt
gridcenter auto
smooth 0.5
map rec.C.map
map rec.HD.map
elecmap rec.e.map
dsolvmap rec.d.map
dielectric -0.1465
"
        );
    }

    #[test]
    fn template_values_are_kept() {
        let template = Template::from_lines([
            "# custom box",
            "spacing 0.5",
            "npts 60 50 40   # points",
            "gridcenter 1.0 2.0 3.0",
            "receptor other.pdbqt",
            "parameter_file ../ff/AD4_custom.dat",
        ]);
        let types = strings(&["A"]);
        let gpf = GridParameters {
            receptor: "rec.pdbqt",
            map_stem: "rec",
            receptor_types: &types,
            ligand_types: &types,
        }
        .render(&template);
        let lines: Vec<&str> = gpf.lines().collect();
        assert_eq!(lines[0], "npts 60 50 40");
        assert_eq!(lines[1], "parameter_file AD4_custom.dat");
        assert_eq!(lines[3], "spacing 0.5");
        assert_eq!(lines[6], "receptor rec.pdbqt");
        assert_eq!(lines[7], "gridcenter 1.0 2.0 3.0");
    }
}
