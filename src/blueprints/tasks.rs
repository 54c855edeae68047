//! Task graphs for multi-step association mutations
//!
//! A link or unlink touches several rows (load the parent, create the child,
//! write the join row, re-fetch). Each mutation is described up front as a
//! [`TaskGraph`] of named steps with declared dependencies, validated, then run
//! in order against the data service. The first failing step stops the run.

use crate::core::error::{BlueprintError, ConfigError};
use crate::core::query::{Criteria, NewRecord, QueryOptions};
use crate::core::service::{DataService, Record};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Where a step finds the child primary key
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRef {
    /// Known when the graph is built
    Given(Value),
    /// Read `field` from the output of an earlier step
    FromStep { step: String, field: String },
}

/// One data access of a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Fails with 404 when the parent does not exist
    LoadParent { model: String, primary_key: String, id: Value },
    /// Fails with 404 when the child does not exist
    LoadChild { model: String, primary_key: String, id: Value },
    CreateChild { model: String, record: Map<String, Value> },
    /// Point the child's foreign key at the parent
    LinkChild {
        model: String,
        primary_key: String,
        child: ChildRef,
        foreign_key: String,
        parent_id: Value,
    },
    CreateJoinRow {
        model: String,
        source_field: String,
        target_field: String,
        parent_id: Value,
        child: ChildRef,
    },
    /// Delete the child, only if it belongs to the parent
    DestroyChild {
        model: String,
        primary_key: String,
        child_id: Value,
        foreign_key: String,
        parent_id: Value,
    },
    /// Null the child's foreign key, only if it belongs to the parent
    ClearForeignKey {
        model: String,
        primary_key: String,
        child_id: Value,
        foreign_key: String,
        parent_id: Value,
    },
    /// Delete join rows pairing exactly this parent and child
    DestroyJoinRows {
        model: String,
        source_field: String,
        target_field: String,
        parent_id: Value,
        child_id: Value,
    },
    RefetchParent { query: QueryOptions },
}

/// A named step and the steps it needs first
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub step: Step,
    pub depends_on: Vec<String>,
}

/// Output of every step that ran, by step name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutputs {
    outputs: IndexMap<String, Vec<Record>>,
}

impl TaskOutputs {
    /// Records produced by a step
    pub fn get(&self, name: &str) -> Option<&[Record]> {
        self.outputs.get(name).map(Vec::as_slice)
    }

    /// First record produced by a step
    pub fn first(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(<[Record]>::first)
    }

    /// Names of the steps that ran, in execution order
    pub fn executed(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    fn resolve(&self, child: &ChildRef) -> Result<Value, BlueprintError> {
        match child {
            ChildRef::Given(id) => Ok(id.clone()),
            ChildRef::FromStep { step, field } => self
                .first(step)
                .and_then(|record| record.get(field))
                .cloned()
                .ok_or_else(|| {
                    BlueprintError::Store(format!("step `{step}` produced no `{field}`"))
                }),
        }
    }
}

/// Ordered, dependency-checked list of steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn then(mut self, name: &str, step: Step, depends_on: &[&str]) -> Self {
        self.tasks.push(Task {
            name: name.to_string(),
            step,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Check names are unique and every dependency (including a step whose
    /// output supplies a child key) is an earlier step
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidPlan { message };

        for (index, task) in self.tasks.iter().enumerate() {
            let earlier = &self.tasks[..index];
            if earlier.iter().any(|t| t.name == task.name) {
                return Err(invalid(format!("duplicate step `{}`", task.name)));
            }
            for dependency in &task.depends_on {
                if !earlier.iter().any(|t| &t.name == dependency) {
                    return Err(invalid(format!(
                        "step `{}` depends on `{}`, which does not run before it",
                        task.name, dependency
                    )));
                }
            }
            let child = match &task.step {
                Step::LinkChild { child, .. } | Step::CreateJoinRow { child, .. } => Some(child),
                _ => None,
            };
            if let Some(ChildRef::FromStep { step, .. }) = child
                && !task.depends_on.contains(step)
            {
                return Err(invalid(format!(
                    "step `{}` reads the output of `{}` without depending on it",
                    task.name, step
                )));
            }
        }
        Ok(())
    }

    /// Validate, then run every step in order
    pub async fn execute(&self, data: &dyn DataService) -> Result<TaskOutputs, BlueprintError> {
        self.validate()?;

        let mut outputs = TaskOutputs::default();
        for task in &self.tasks {
            tracing::debug!(step = %task.name, "running association step");
            let records = run_step(&task.step, &outputs, data).await?;
            outputs.outputs.insert(task.name.clone(), records);
        }
        Ok(outputs)
    }
}

async fn run_step(
    step: &Step,
    outputs: &TaskOutputs,
    data: &dyn DataService,
) -> Result<Vec<Record>, BlueprintError> {
    match step {
        Step::LoadParent { model, primary_key, id } => {
            let parent = data
                .find_one(&QueryOptions::by_pk(model, primary_key, id.clone()))
                .await?
                .ok_or_else(|| {
                    BlueprintError::not_found(format!("No `{model}` record found with id {id}"))
                })?;
            Ok(vec![parent])
        }
        Step::LoadChild { model, primary_key, id } => {
            let child = data
                .find_one(&QueryOptions::by_pk(model, primary_key, id.clone()))
                .await?
                .ok_or_else(|| {
                    BlueprintError::not_found(format!("No `{model}` record found with id {id}"))
                })?;
            Ok(vec![child])
        }
        Step::CreateChild { model, record } => Ok(data
            .create(&QueryOptions::new(model).with_new_record(NewRecord::Single(record.clone())).fetch())
            .await?),
        Step::LinkChild {
            model,
            primary_key,
            child,
            foreign_key,
            parent_id,
        } => {
            let child_id = outputs.resolve(child)?;
            let mut values = Map::new();
            values.insert(foreign_key.clone(), parent_id.clone());
            Ok(data
                .update(&QueryOptions::by_pk(model, primary_key, child_id).with_values(values).fetch())
                .await?)
        }
        Step::CreateJoinRow {
            model,
            source_field,
            target_field,
            parent_id,
            child,
        } => {
            let mut row = Map::new();
            row.insert(source_field.clone(), parent_id.clone());
            row.insert(target_field.clone(), outputs.resolve(child)?);
            Ok(data
                .create(&QueryOptions::new(model).with_new_record(NewRecord::Single(row)).fetch())
                .await?)
        }
        Step::DestroyChild {
            model,
            primary_key,
            child_id,
            foreign_key,
            parent_id,
        } => {
            let criteria = Criteria::by_field(primary_key, child_id.clone())
                .and(foreign_key, parent_id.clone());
            let destroyed = data
                .destroy(&QueryOptions::new(model).with_criteria(criteria).fetch())
                .await?;
            not_linked_if_empty(destroyed, model, child_id)
        }
        Step::ClearForeignKey {
            model,
            primary_key,
            child_id,
            foreign_key,
            parent_id,
        } => {
            let criteria = Criteria::by_field(primary_key, child_id.clone())
                .and(foreign_key, parent_id.clone());
            let mut values = Map::new();
            values.insert(foreign_key.clone(), Value::Null);
            let updated = data
                .update(&QueryOptions::new(model).with_criteria(criteria).with_values(values).fetch())
                .await?;
            not_linked_if_empty(updated, model, child_id)
        }
        Step::DestroyJoinRows {
            model,
            source_field,
            target_field,
            parent_id,
            child_id,
        } => {
            let criteria = Criteria::by_field(source_field, parent_id.clone())
                .and(target_field, child_id.clone());
            let destroyed = data
                .destroy(&QueryOptions::new(model).with_criteria(criteria).fetch())
                .await?;
            not_linked_if_empty(destroyed, model, child_id)
        }
        Step::RefetchParent { query } => {
            let parent = data.find_one(query).await?.ok_or_else(|| {
                BlueprintError::Store(format!(
                    "Could not find `{}` record after updating its association",
                    query.using
                ))
            })?;
            Ok(vec![parent])
        }
    }
}

fn not_linked_if_empty(
    records: Vec<Record>,
    model: &str,
    child_id: &Value,
) -> Result<Vec<Record>, BlueprintError> {
    if records.is_empty() {
        return Err(BlueprintError::not_found(format!(
            "`{model}` record {child_id} is not linked to this parent"
        )));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ModelDefinition, ModelRegistry};
    use crate::storage::InMemoryDataService;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> InMemoryDataService {
        let registry = ModelRegistry::from_definitions([
            ModelDefinition::new("widget"),
            ModelDefinition::new("part"),
            ModelDefinition::new("widgetpart"),
        ])
        .unwrap();
        InMemoryDataService::new(Arc::new(registry))
    }

    fn load_parent(id: Value) -> Step {
        Step::LoadParent {
            model: "widget".into(),
            primary_key: "id".into(),
            id,
        }
    }

    #[test]
    fn test_validate_rejects_forward_dependency() {
        let graph = TaskGraph::new()
            .then("link", load_parent(json!(1)), &["parent"])
            .then("parent", load_parent(json!(1)), &[]);
        assert!(matches!(graph.validate(), Err(ConfigError::InvalidPlan { .. })));
    }

    #[test]
    fn test_validate_requires_dependency_for_step_output() {
        let graph = TaskGraph::new()
            .then("child", Step::CreateChild { model: "part".into(), record: Map::new() }, &[])
            .then(
                "join",
                Step::CreateJoinRow {
                    model: "widgetpart".into(),
                    source_field: "widgetId".into(),
                    target_field: "partId".into(),
                    parent_id: json!(1),
                    child: ChildRef::FromStep { step: "child".into(), field: "id".into() },
                },
                &[],
            );
        assert!(graph.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_then_join_uses_created_id() {
        let store = store();
        store
            .create(&QueryOptions::new("widget").with_new_record(NewRecord::Single(Map::new())))
            .await
            .unwrap();

        let graph = TaskGraph::new()
            .then("parent", load_parent(json!(1)), &[])
            .then(
                "child",
                Step::CreateChild {
                    model: "part".into(),
                    record: json!({"name": "bolt"}).as_object().cloned().unwrap(),
                },
                &["parent"],
            )
            .then(
                "join",
                Step::CreateJoinRow {
                    model: "widgetpart".into(),
                    source_field: "widgetId".into(),
                    target_field: "partId".into(),
                    parent_id: json!(1),
                    child: ChildRef::FromStep { step: "child".into(), field: "id".into() },
                },
                &["child"],
            );

        let outputs = graph.execute(&store).await.unwrap();
        assert_eq!(outputs.executed(), vec!["parent", "child", "join"]);
        assert_eq!(
            store.rows("widgetpart").unwrap(),
            vec![json!({"widgetId": 1, "partId": 1, "id": 1}).as_object().cloned().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_short_circuits_on_missing_parent() {
        let store = store();
        let graph = TaskGraph::new()
            .then("parent", load_parent(json!(42)), &[])
            .then(
                "child",
                Step::CreateChild { model: "part".into(), record: Map::new() },
                &["parent"],
            );

        let err = graph.execute(&store).await.unwrap_err();
        assert!(matches!(err, BlueprintError::NotFound { .. }));
        assert!(store.rows("part").unwrap().is_empty());
    }
}
