use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;

use crate::config::{WorkflowCatalog, WorkflowProfile};
use crate::error::OrchestratorError;
use crate::run::IoDescriptor;

/// The closed set of workflows the orchestrator knows how to submit.
///
/// Identifiers on the wire are the strings `"0"` and `"1"`; numeric ids are
/// accepted when reading stored records.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WorkflowKind {
    /// Workflow `0`: a molecule simulation over the supplied structure.
    Simulation,
    /// Workflow `1`: simulation of a protein with a selected ligand.
    LigandSimulation,
}

impl WorkflowKind {
    /// Wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Simulation => "0",
            WorkflowKind::LigandSimulation => "1",
        }
    }

    pub fn parse(id: &str) -> Result<Self, OrchestratorError> {
        id.parse()
    }

    pub fn profile<'a>(&self, catalog: &'a WorkflowCatalog) -> &'a WorkflowProfile {
        match self {
            WorkflowKind::Simulation => &catalog.simulation,
            WorkflowKind::LigandSimulation => &catalog.ligand_simulation,
        }
    }

    /// Build the cluster submission for this workflow.
    pub fn submission(
        &self,
        catalog: &WorkflowCatalog,
        inputs: Vec<IoDescriptor>,
    ) -> JobSubmission {
        let profile = self.profile(catalog);
        let mut command = profile.command.clone();

        match self {
            WorkflowKind::Simulation => {
                command.extend(inputs.iter().map(|input| input.name.clone()));
            }
            WorkflowKind::LigandSimulation => {
                // The structure goes first; everything else is a named extra input.
                let structure = inputs.iter().position(|input| input.name.ends_with(".pdb"));
                if let Some(index) = structure {
                    command.push("--structure".to_string());
                    command.push(inputs[index].name.clone());
                }
                for (i, input) in inputs.iter().enumerate() {
                    if Some(i) != structure {
                        command.push("--input".to_string());
                        command.push(input.name.clone());
                    }
                }
            }
        }

        JobSubmission {
            workflow: *self,
            image: profile.image.clone(),
            command,
            inputs,
        }
    }
}

impl Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(WorkflowKind::Simulation),
            "1" => Ok(WorkflowKind::LigandSimulation),
            other => Err(OrchestratorError::UnknownWorkflow(other.to_string())),
        }
    }
}

impl Serialize for WorkflowKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        let id = match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text,
            Repr::Number(number) => number.to_string(),
        };
        id.parse().map_err(serde::de::Error::custom)
    }
}

/// Everything the cluster needs to start a job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSubmission {
    pub workflow: WorkflowKind,
    pub image: String,
    pub command: Vec<String>,
    pub inputs: Vec<IoDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_ids() {
        assert_eq!(WorkflowKind::parse("0").unwrap(), WorkflowKind::Simulation);
        assert_eq!(WorkflowKind::parse(" 1 ").unwrap(), WorkflowKind::LigandSimulation);
        match WorkflowKind::parse("2") {
            Err(OrchestratorError::UnknownWorkflow(id)) => assert_eq!(id, "2"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_numeric_ids_deserialize() {
        let kind: WorkflowKind = serde_json::from_value(serde_json::json!(1)).unwrap();
        assert_eq!(kind, WorkflowKind::LigandSimulation);
        assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!("1"));
        assert!(serde_json::from_value::<WorkflowKind>(serde_json::json!("9")).is_err());
    }

    #[test]
    fn test_simulation_submission_appends_inputs() {
        let catalog = WorkflowCatalog::default();
        let submission = WorkflowKind::Simulation
            .submission(&catalog, vec![IoDescriptor::url("mol.pdb", "https://x/mol.pdb")]);

        assert_eq!(submission.image, catalog.simulation.image);
        assert_eq!(submission.command.last().map(String::as_str), Some("mol.pdb"));
        assert_eq!(submission.inputs.len(), 1);
    }

    #[test]
    fn test_ligand_submission_puts_structure_first() {
        let catalog = WorkflowCatalog::default();
        let submission = WorkflowKind::LigandSimulation.submission(
            &catalog,
            vec![
                IoDescriptor::inline("selection.json", "{\"ligand\":\"ATP\"}"),
                IoDescriptor::url("protein.pdb", "https://x/protein.pdb"),
            ],
        );

        let base = catalog.ligand_simulation.command.len();
        assert_eq!(
            &submission.command[base..],
            ["--structure", "protein.pdb", "--input", "selection.json"]
        );
    }
}
