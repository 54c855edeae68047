//! Model registry: model descriptors and their associations
//!
//! The registry is built once at boot from [`ModelDefinition`]s (typed, or
//! loaded from YAML) and then shared read-only behind an `Arc`. Association
//! definitions are resolved into the tagged [`AssociationKind`] here, so nothing
//! downstream ever inspects a loosely-shaped foreign key again.

use crate::core::error::ConfigError;
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a model attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Uuid,
    Datetime,
    Json,
}

/// Join model mediating a many-to-many association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughDescriptor {
    /// Identity of the join model
    pub model: String,
    /// Join attribute holding the owning record's primary key
    pub source_field: String,
    /// Join attribute holding the associated record's primary key
    pub target_field: String,
}

/// Cardinality of an association, with the join model when there is one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociationKind {
    /// `foreign_key` lives on this model and holds the target's primary key
    ToOne,
    /// `foreign_key` lives on the target model and holds this model's primary key
    ToMany,
    /// Rows of the join model pair both primary keys
    ToManyThrough(ThroughDescriptor),
}

/// A named relation from one model to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    /// Public relation name, unique within the owning model
    pub alias: String,
    /// Identity of the associated model
    pub target: String,
    /// See [`AssociationKind`] for which side carries it
    pub foreign_key: String,
    pub kind: AssociationKind,
}

impl AssociationDescriptor {
    /// True for direct and through to-many relations
    pub fn is_to_many(&self) -> bool {
        !matches!(self.kind, AssociationKind::ToOne)
    }

    /// Join model, for many-to-many-through relations
    pub fn through(&self) -> Option<&ThroughDescriptor> {
        match &self.kind {
            AssociationKind::ToManyThrough(through) => Some(through),
            _ => None,
        }
    }
}

/// A registered model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    /// Lowercased model name
    pub identity: String,
    pub primary_key: String,
    pub attributes: IndexMap<String, AttributeType>,
    pub associations: Vec<AssociationDescriptor>,
    /// Identity of the model receiving archived records, if any
    pub archive_model: Option<String>,
}

impl ModelDescriptor {
    /// Find an association by alias
    pub fn association(&self, alias: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.alias == alias)
    }

    /// Declared type of an attribute
    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.attributes.get(name).copied()
    }

    /// Coerce a primary key value to the declared key type
    ///
    /// Path and query parameters arrive as strings; an integer key given as
    /// `"9"` becomes `9`. Values that do not parse are returned unchanged.
    pub fn coerce_pk(&self, value: Value) -> Value {
        match (self.attribute_type(&self.primary_key), &value) {
            (Some(AttributeType::Integer), Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(value),
            (Some(AttributeType::Number), Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            _ => value,
        }
    }
}

// =============================================================================
// Definitions (what configuration files declare)
// =============================================================================

fn default_primary_key() -> String {
    "id".to_string()
}

/// Declared shape of a model, before resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub identity: String,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    #[serde(default)]
    pub attributes: IndexMap<String, AttributeType>,

    #[serde(default)]
    pub associations: Vec<AssociationDefinition>,

    #[serde(default)]
    pub archive_model: Option<String>,
}

impl ModelDefinition {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            primary_key: default_primary_key(),
            attributes: IndexMap::new(),
            associations: Vec::new(),
            archive_model: None,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.insert(name.into(), ty);
        self
    }

    pub fn association(mut self, association: AssociationDefinition) -> Self {
        self.associations.push(association);
        self
    }
}

/// Declared cardinality of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    #[default]
    Many,
}

/// A foreign key declared either as a bare attribute name or as an object
/// carrying the name and, optionally, the public alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForeignKeyDefinition {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
}

impl ForeignKeyDefinition {
    fn name(&self) -> &str {
        match self {
            ForeignKeyDefinition::Name(name) => name,
            ForeignKeyDefinition::Detailed { name, .. } => name,
        }
    }

    fn alias(&self) -> Option<&str> {
        match self {
            ForeignKeyDefinition::Name(_) => None,
            ForeignKeyDefinition::Detailed { alias, .. } => alias.as_deref(),
        }
    }
}

/// Declared join model of a many-to-many association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughDefinition {
    pub model: String,
    /// Defaults to the association's foreign key
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub target_field: Option<String>,
}

/// Declared association, before resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationDefinition {
    /// Falls back to the foreign key's `as`
    #[serde(default)]
    pub alias: Option<String>,
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    pub foreign_key: ForeignKeyDefinition,
    #[serde(default)]
    pub through: Option<ThroughDefinition>,
}

impl AssociationDefinition {
    pub fn to_one(alias: &str, target: &str, foreign_key: &str) -> Self {
        Self {
            alias: Some(alias.to_string()),
            target: target.to_string(),
            cardinality: Cardinality::One,
            foreign_key: ForeignKeyDefinition::Name(foreign_key.to_string()),
            through: None,
        }
    }

    pub fn to_many(alias: &str, target: &str, foreign_key: &str) -> Self {
        Self {
            alias: Some(alias.to_string()),
            target: target.to_string(),
            cardinality: Cardinality::Many,
            foreign_key: ForeignKeyDefinition::Name(foreign_key.to_string()),
            through: None,
        }
    }

    pub fn through(
        alias: &str,
        target: &str,
        through_model: &str,
        source_field: &str,
        target_field: &str,
    ) -> Self {
        Self {
            alias: Some(alias.to_string()),
            target: target.to_string(),
            cardinality: Cardinality::Many,
            foreign_key: ForeignKeyDefinition::Name(source_field.to_string()),
            through: Some(ThroughDefinition {
                model: through_model.to_string(),
                source_field: Some(source_field.to_string()),
                target_field: Some(target_field.to_string()),
            }),
        }
    }

    fn resolve(self, model: &str) -> Result<AssociationDescriptor, ConfigError> {
        let alias = self
            .alias
            .clone()
            .or_else(|| self.foreign_key.alias().map(str::to_string))
            .ok_or_else(|| ConfigError::InvalidAssociation {
                model: model.to_string(),
                alias: self.foreign_key.name().to_string(),
                message: "an association needs an `alias` (or a foreign key `as`)".to_string(),
            })?;
        let foreign_key = self.foreign_key.name().to_string();
        let invalid = |message: &str| ConfigError::InvalidAssociation {
            model: model.to_string(),
            alias: alias.clone(),
            message: message.to_string(),
        };

        let kind = match (self.through, self.cardinality) {
            (Some(_), Cardinality::One) => {
                return Err(invalid("a `through` association must be to-many"));
            }
            (Some(through), Cardinality::Many) => {
                let target_field = through
                    .target_field
                    .ok_or_else(|| invalid("`through.target_field` is required"))?;
                AssociationKind::ToManyThrough(ThroughDescriptor {
                    model: through.model.to_lowercase(),
                    source_field: through.source_field.unwrap_or_else(|| foreign_key.clone()),
                    target_field,
                })
            }
            (None, Cardinality::One) => AssociationKind::ToOne,
            (None, Cardinality::Many) => AssociationKind::ToMany,
        };

        Ok(AssociationDescriptor {
            alias,
            target: self.target.to_lowercase(),
            foreign_key,
            kind,
        })
    }
}

/// Top-level shape of a models YAML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub models: Vec<ModelDefinition>,
}

// =============================================================================
// Registry
// =============================================================================

/// Read-only table of every model known to the blueprints
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and cross-check a registry from definitions
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ModelDefinition>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Load a registry from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ModelsConfig = serde_yaml::from_str(yaml)?;
        Ok(Self::from_definitions(config.models)?)
    }

    /// Load a registry from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Resolve and insert one model definition
    ///
    /// A model registered under an existing identity replaces it.
    pub fn register(&mut self, definition: ModelDefinition) -> Result<(), ConfigError> {
        let identity = definition.identity.to_lowercase();
        let mut associations: Vec<AssociationDescriptor> = Vec::new();

        for raw in definition.associations {
            let association = raw.resolve(&identity)?;
            if associations.iter().any(|a| a.alias == association.alias) {
                return Err(ConfigError::DuplicateAlias {
                    model: identity,
                    alias: association.alias,
                });
            }
            associations.push(association);
        }

        self.models.insert(
            identity.clone(),
            ModelDescriptor {
                identity,
                primary_key: definition.primary_key,
                attributes: definition.attributes,
                associations,
                archive_model: definition.archive_model.map(|m| m.to_lowercase()),
            },
        );
        Ok(())
    }

    /// Check that every association points at registered models
    pub fn validate(&self) -> Result<(), ConfigError> {
        for model in self.models.values() {
            for association in &model.associations {
                if !self.models.contains_key(&association.target) {
                    return Err(ConfigError::UnknownModel {
                        model: association.target.clone(),
                    });
                }
                if let Some(through) = association.through()
                    && !self.models.contains_key(&through.model)
                {
                    return Err(ConfigError::UnknownModel {
                        model: through.model.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Get a model by identity
    pub fn get(&self, identity: &str) -> Option<&ModelDescriptor> {
        self.models.get(identity)
    }

    /// Get a model by identity, failing with a configuration error
    pub fn require(&self, identity: &str) -> Result<&ModelDescriptor, ConfigError> {
        self.get(identity).ok_or_else(|| ConfigError::UnknownModel {
            model: identity.to_string(),
        })
    }

    /// All models, in registration order
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Whether some model archives into the reserved `archive` model
    pub fn default_archive_in_use(&self) -> bool {
        self.models
            .values()
            .any(|m| m.archive_model.as_deref() == Some("archive"))
    }
}
