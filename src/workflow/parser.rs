//! Workflow Parser
//!
//! Handles loading workflow definitions from YAML or JSON files. Files with
//! a `.json` extension are read with `serde_json`; everything else goes
//! through `serde_yaml`.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::error::WorkflowError;
use super::model::Workflow;
use super::validator::validate_workflow;

/// Serialization format of a workflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    Yaml,
    Json,
}

impl WorkflowFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => WorkflowFormat::Json,
            _ => WorkflowFormat::Yaml,
        }
    }
}

/// Loads a workflow from a file.
///
/// This function:
/// 1. Reads and parses the file
/// 2. Validates the workflow structure
/// 3. Sorts blocks topologically
///
/// # Example
///
/// ```rust,no_run
/// use parallelrunner::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("fanout.yaml")?;
///     println!("Loaded {} blocks", workflow.blocks.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: &str) -> Result<Workflow, WorkflowError> {
    info!("Loading workflow from: {}", path);

    let content = fs::read_to_string(path).map_err(|source| WorkflowError::Io {
        path: path.to_string(),
        source,
    })?;

    debug!("Workflow content loaded ({} bytes)", content.len());

    parse_workflow(&content, WorkflowFormat::from_path(path))
}

/// Parses and validates a workflow from an in-memory document.
pub fn parse_workflow(content: &str, format: WorkflowFormat) -> Result<Workflow, WorkflowError> {
    let mut workflow: Workflow = match format {
        WorkflowFormat::Json => serde_json::from_str(content)?,
        WorkflowFormat::Yaml => serde_yaml::from_str(content)?,
    };

    info!(
        "Parsed {} blocks, {} connections, {} parallels",
        workflow.blocks.len(),
        workflow.connections.len(),
        workflow.parallels.len()
    );

    validate_workflow(&mut workflow)?;

    Ok(workflow)
}

/// Saves a workflow to a YAML file.
pub fn save_workflow(workflow: &Workflow, path: &str) -> Result<(), WorkflowError> {
    let yaml_content = serde_yaml::to_string(workflow)?;
    fs::write(path, yaml_content).map_err(|source| WorkflowError::Io {
        path: path.to_string(),
        source,
    })?;
    info!("Workflow saved to: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::BlockType;
    use crate::workflow::value::Value;
    use tempfile::tempdir;

    const FANOUT_YAML: &str = r#"
blocks:
  - id: fanout
    type: parallel
  - id: start
    type: starter
  - id: work
    type: function
connections:
  - { source: start, target: fanout }
  - { source: fanout, target: work, sourceHandle: parallel-start-source }
parallels:
  - id: fanout
    nodes: [work]
    distribution:
      first: 1
      second: 2
"#;

    #[test]
    fn test_format_from_path() {
        assert_eq!(WorkflowFormat::from_path("flow.json"), WorkflowFormat::Json);
        assert_eq!(WorkflowFormat::from_path("flow.JSON"), WorkflowFormat::Json);
        assert_eq!(WorkflowFormat::from_path("flow.yaml"), WorkflowFormat::Yaml);
        assert_eq!(WorkflowFormat::from_path("flow"), WorkflowFormat::Yaml);
    }

    #[test]
    fn test_parse_yaml_workflow() {
        let workflow = parse_workflow(FANOUT_YAML, WorkflowFormat::Yaml).unwrap();

        assert_eq!(workflow.blocks[0].id, "start");
        assert_eq!(workflow.blocks[1].block_type, BlockType::Parallel);
        assert_eq!(workflow.parallels.len(), 1);
        assert_eq!(
            workflow.parallels[0].distribution,
            Some(Value::object([
                ("first", Value::Number(1.0)),
                ("second", Value::Number(2.0)),
            ]))
        );
    }

    #[test]
    fn test_parse_json_workflow() {
        let json = r#"{
            "blocks": [
                {"id": "p", "type": "parallel"},
                {"id": "x", "type": "agent"}
            ],
            "connections": [
                {"source": "p", "target": "x", "sourceHandle": "parallel-start-source"}
            ],
            "parallels": [
                {"id": "p", "nodes": ["x"], "distribution": "[\"a\", \"b\"]"}
            ]
        }"#;

        let workflow = parse_workflow(json, WorkflowFormat::Json).unwrap();
        assert_eq!(workflow.blocks.len(), 2);
        assert_eq!(
            workflow.parallels[0].distribution,
            Some(Value::from(r#"["a", "b"]"#))
        );
    }

    #[test]
    fn test_load_workflow_file_not_found() {
        let result = load_workflow("/nonexistent/path/workflow.yaml");
        assert!(matches!(result, Err(WorkflowError::Io { .. })));
    }

    #[test]
    fn test_load_workflow_invalid_yaml() {
        let temp_dir = tempdir().unwrap();
        let workflow_path = temp_dir.path().join("bad.yaml");
        std::fs::write(&workflow_path, "this is not valid yaml: [[[").unwrap();

        let result = load_workflow(workflow_path.to_str().unwrap());
        assert!(matches!(result, Err(WorkflowError::Yaml(_))));
    }

    #[test]
    fn test_load_workflow_rejects_unknown_block_type() {
        let temp_dir = tempdir().unwrap();
        let workflow_path = temp_dir.path().join("bad_type.yaml");
        std::fs::write(&workflow_path, "blocks:\n  - id: a\n    type: teleporter\n").unwrap();

        assert!(load_workflow(workflow_path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempdir().unwrap();
        let workflow_path = temp_dir.path().join("saved.yaml");
        let path = workflow_path.to_str().unwrap();

        let workflow = parse_workflow(FANOUT_YAML, WorkflowFormat::Yaml).unwrap();
        save_workflow(&workflow, path).unwrap();
        assert!(workflow_path.exists());

        let reloaded = load_workflow(path).unwrap();
        assert_eq!(reloaded, workflow);
    }
}
