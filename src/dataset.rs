//! Typed observations and the grouping helpers used by the comparator

use serde::{Deserialize, Serialize};

/// A single measurement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub group: String,
    /// Present iff the dataset has a subgroup column
    pub subgroup: Option<String>,
    pub value: f64,
}

impl Observation {
    pub fn new(group: impl Into<String>, value: f64) -> Self {
        Observation {
            group: group.into(),
            subgroup: None,
            value,
        }
    }

    pub fn nested(group: impl Into<String>, subgroup: impl Into<String>, value: f64) -> Self {
        Observation {
            group: group.into(),
            subgroup: Some(subgroup.into()),
            value,
        }
    }
}

/// Identity of one cell of the design: a group, or a group/subgroup pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub group: String,
    pub subgroup: Option<String>,
}

impl CellKey {
    /// Name of the cell inside its comparison family
    pub fn member(&self) -> &str {
        self.subgroup.as_deref().unwrap_or(&self.group)
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subgroup {
            Some(sub) => write!(f, "{}/{}", self.group, sub),
            None => write!(f, "{}", self.group),
        }
    }
}

/// Values of one cell, in upload order
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub key: CellKey,
    pub values: Vec<f64>,
}

/// A set of cells that are compared against each other.
///
/// Nested designs have one family per group (members are its subgroups);
/// single-factor designs have one family holding every group.
#[derive(Debug, Clone, PartialEq)]
pub struct Family {
    /// Enclosing group, `None` for the single-factor family
    pub group: Option<String>,
    pub cells: Vec<Cell>,
}

impl Family {
    pub fn label(&self) -> &str {
        self.group.as_deref().unwrap_or("all groups")
    }
}

/// Ordered observations from one upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub observations: Vec<Observation>,
    pub has_subgroup: bool,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>, has_subgroup: bool) -> Self {
        Dataset {
            observations,
            has_subgroup,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct groups in first-seen order
    pub fn groups(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for obs in &self.observations {
            if !seen.contains(&obs.group.as_str()) {
                seen.push(&obs.group);
            }
        }
        seen
    }

    /// Distinct subgroups of `group` in first-seen order
    pub fn subgroups(&self, group: &str) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for obs in self.observations.iter().filter(|o| o.group == group) {
            if let Some(sub) = obs.subgroup.as_deref() {
                if !seen.contains(&sub) {
                    seen.push(sub);
                }
            }
        }
        seen
    }

    /// Values of one cell in upload order
    pub fn values(&self, group: &str, subgroup: Option<&str>) -> Vec<f64> {
        self.observations
            .iter()
            .filter(|o| o.group == group && o.subgroup.as_deref() == subgroup)
            .map(|o| o.value)
            .collect()
    }

    /// All cells, groups first-seen then subgroups first-seen
    pub fn cells(&self) -> Vec<Cell> {
        self.families().into_iter().flat_map(|f| f.cells).collect()
    }

    /// Comparison families for this design
    pub fn families(&self) -> Vec<Family> {
        let groups = self.groups();
        if self.has_subgroup {
            groups
                .into_iter()
                .map(|group| Family {
                    group: Some(group.to_string()),
                    cells: self
                        .subgroups(group)
                        .into_iter()
                        .map(|sub| self.cell(group, Some(sub)))
                        .collect(),
                })
                .collect()
        } else {
            vec![Family {
                group: None,
                cells: groups.into_iter().map(|group| self.cell(group, None)).collect(),
            }]
        }
    }

    fn cell(&self, group: &str, subgroup: Option<&str>) -> Cell {
        Cell {
            key: CellKey {
                group: group.to_string(),
                subgroup: subgroup.map(str::to_string),
            },
            values: self.values(group, subgroup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Dataset {
        Dataset::new(
            vec![
                Observation::nested("g2", "b", 1.0),
                Observation::nested("g1", "y", 2.0),
                Observation::nested("g2", "a", 3.0),
                Observation::nested("g1", "x", 4.0),
                Observation::nested("g2", "b", 5.0),
            ],
            true,
        )
    }

    #[test]
    fn test_first_seen_order() {
        let ds = nested();
        assert_eq!(ds.groups(), vec!["g2", "g1"]);
        assert_eq!(ds.subgroups("g2"), vec!["b", "a"]);
        assert_eq!(ds.subgroups("g1"), vec!["y", "x"]);
    }

    #[test]
    fn test_values_and_families() {
        let ds = nested();
        assert_eq!(ds.values("g2", Some("b")), vec![1.0, 5.0]);

        let families = ds.families();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].group.as_deref(), Some("g2"));
        assert_eq!(families[0].cells.len(), 2);
        assert_eq!(families[0].cells[0].key.member(), "b");
        assert_eq!(ds.cells().len(), 4);
    }

    #[test]
    fn test_single_factor_family() {
        let ds = Dataset::new(
            vec![Observation::new("A", 1.0), Observation::new("B", 2.0), Observation::new("A", 3.0)],
            false,
        );
        let families = ds.families();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].label(), "all groups");
        assert_eq!(families[0].cells[0].values, vec![1.0, 3.0]);
        assert_eq!(families[0].cells[1].key.to_string(), "B");
    }
}
