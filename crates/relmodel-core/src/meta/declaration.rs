//! Declarative entity and property specifications
//!
//! Every property field is optional so that inheritance can tell "declared
//! here" apart from "inherited". Declarations can be built in code or loaded
//! from a TOML/JSON [`SchemaDocument`]:
//!
//! ```toml
//! [[entities]]
//! id = "Folder"
//!
//! [[entities.properties]]
//! id = "items"
//! cardinality = "list"
//! value_type = { entity = "Item" }
//! inverse = "parent"
//! embed = "always"
//! ```

use relmodel_core_types::{EntityId, PropertyId};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{ModelError, Result};
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    List,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::List => "list",
        }
    }
}

/// Deep-copy policy for one property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneStrategy {
    /// Copy scalars; recurse into referenced instances inside the closure
    Clone,
    /// Share the referenced instance (or its sibling clone)
    Reference,
    /// Compute the value from an expression over `self` and `original`
    Custom(String),
    /// Leave the property unset on the clone
    Ignore,
}

/// Ownership rule deciding closure membership
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingRule {
    #[default]
    None,
    Always,
    /// Embedded only when every companion property of the referenced
    /// instance resolves to an instance already in the closure
    WhenResolved(Vec<PropertyId>),
}

impl EmbeddingRule {
    pub fn is_none(&self) -> bool {
        matches!(self, EmbeddingRule::None)
    }

    pub fn companions(&self) -> &[PropertyId] {
        match self {
            EmbeddingRule::WhenResolved(c) => c,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accessors {
    pub get: bool,
    pub set: bool,
    pub add: bool,
    pub remove: bool,
}

impl Default for Accessors {
    fn default() -> Self {
        Self {
            get: true,
            set: true,
            add: true,
            remove: true,
        }
    }
}

/// Declaration of one property; `None` fields are inherited or defaulted
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertyDecl {
    pub id: PropertyId,
    pub cardinality: Option<Cardinality>,
    pub value_type: Option<ValueType>,
    pub inverse: Option<PropertyId>,
    /// Default value in converter text form
    pub default: Option<String>,
    pub clone: Option<CloneStrategy>,
    pub clone_after: Option<Vec<PropertyId>>,
    pub embed: Option<EmbeddingRule>,
    /// Deletion embedding; falls back to `embed` when never declared
    pub delete_embed: Option<EmbeddingRule>,
    pub tag: Option<String>,
    pub derived: Option<bool>,
    pub read_only: Option<bool>,
    pub transient: Option<bool>,
    pub exclude_from_equality: Option<bool>,
    pub allow_duplicates: Option<bool>,
    pub accessors: Option<Accessors>,
}

impl PropertyDecl {
    /// Bare declaration; only the fields set later are authoritative
    pub fn new(id: impl Into<PropertyId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn single(id: impl Into<PropertyId>, value_type: ValueType) -> Self {
        Self {
            cardinality: Some(Cardinality::Single),
            value_type: Some(value_type),
            ..Self::new(id)
        }
    }

    pub fn list(id: impl Into<PropertyId>, value_type: ValueType) -> Self {
        Self {
            cardinality: Some(Cardinality::List),
            value_type: Some(value_type),
            ..Self::new(id)
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn inverse(mut self, inverse: impl Into<PropertyId>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn default_text(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }

    pub fn clone_strategy(mut self, strategy: CloneStrategy) -> Self {
        self.clone = Some(strategy);
        self
    }

    pub fn clone_after<I, P>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyId>,
    {
        self.clone_after = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    /// Structural embedding, always
    pub fn embedded(self) -> Self {
        self.embed(EmbeddingRule::Always)
    }

    pub fn embed(mut self, rule: EmbeddingRule) -> Self {
        self.embed = Some(rule);
        self
    }

    pub fn delete_embed(mut self, rule: EmbeddingRule) -> Self {
        self.delete_embed = Some(rule);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn derived(mut self, derived: bool) -> Self {
        self.derived = Some(derived);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = Some(true);
        self
    }

    pub fn exclude_from_equality(mut self) -> Self {
        self.exclude_from_equality = Some(true);
        self
    }

    pub fn allow_duplicates(mut self) -> Self {
        self.allow_duplicates = Some(true);
        self
    }

    pub fn accessors(mut self, accessors: Accessors) -> Self {
        self.accessors = Some(accessors);
        self
    }
}

/// Declaration of one entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityDecl {
    pub id: EntityId,
    /// Direct parents, in precedence order
    pub parents: Vec<EntityId>,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub requires_initializer: bool,
    pub properties: Vec<PropertyDecl>,
}

impl EntityDecl {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<EntityId>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn abstract_entity(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn requires_initializer(mut self) -> Self {
        self.requires_initializer = true;
        self
    }

    pub fn property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    pub(crate) fn own_property(&self, id: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.id.as_str() == id)
    }
}

/// A set of entity declarations loaded from a document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaDocument {
    pub entities: Vec<EntityDecl>,
}

impl SchemaDocument {
    /// # Errors
    ///
    /// Returns `ModelError::Config` if the text is not a valid schema document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ModelError::Config {
            message: format!("invalid schema document: {}", e),
        })
    }

    /// # Errors
    ///
    /// Returns `ModelError::Config` if the text is not a valid schema document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ModelError::Config {
            message: format!("invalid schema document: {}", e),
        })
    }

    /// Load a `.toml` or `.json` schema file
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Config` if the file cannot be read, has an
    /// unsupported extension or does not parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ModelError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ModelError::Config {
                message: format!("unsupported schema file type: {}", path.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_leaves_undeclared_fields_unset() {
        let decl = PropertyDecl::single("name", ValueType::Text).read_only();
        assert_eq!(decl.read_only, Some(true));
        assert_eq!(decl.transient, None);
        assert_eq!(decl.embed, None);
    }

    #[test]
    fn test_schema_document_from_toml() {
        let doc = SchemaDocument::from_toml_str(
            r#"
            [[entities]]
            id = "Node"
            abstract = true

            [[entities.properties]]
            id = "children"
            cardinality = "list"
            value_type = { entity = "Node" }
            inverse = "parent"
            embed = "always"

            [[entities.properties]]
            id = "parent"
            cardinality = "single"
            value_type = { entity = "Node" }
            inverse = "children"
            delete_embed = { when_resolved = ["owner"] }
            "#,
        )
        .unwrap();

        let node = &doc.entities[0];
        assert!(node.is_abstract);
        assert_eq!(node.properties[0].embed, Some(EmbeddingRule::Always));
        assert_eq!(
            node.properties[1].delete_embed,
            Some(EmbeddingRule::WhenResolved(vec![PropertyId::from("owner")]))
        );
    }

    #[test]
    fn test_schema_document_from_json() {
        let doc = SchemaDocument::from_json_str(
            r#"{"entities": [{
                "id": "Tag",
                "properties": [{
                    "id": "label",
                    "cardinality": "single",
                    "value_type": "text",
                    "clone": {"custom": "original.label + ' copy'"}
                }]
            }]}"#,
        )
        .unwrap();
        assert_eq!(
            doc.entities[0].properties[0].clone,
            Some(CloneStrategy::Custom("original.label + ' copy'".to_string()))
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SchemaDocument::from_toml_str("[[entities]]\nid = \"A\"\nbogus = 1").unwrap_err();
        assert!(matches!(err, ModelError::Config { .. }));
    }
}
