//! Attribute store facade (C4): fetches subject/resource/environment
//! attribute values and definitions, merges request-time attributes over
//! stored ones, and validates writes against each definition's regex.

use std::collections::HashMap;
use std::sync::Arc;

use authz_database::{AttributeEntityKind, AuthzRepository};
use authz_shared::{AttributeDefinition, AttributeValue, EntityKind};
use regex::Regex;
use tracing::instrument;

use crate::errors::{AuthzError, AuthzResult};
use crate::policy::AttributeBundle;

/// All attribute definitions for one business, partitioned by the entity
/// kind they attach to — the shape C9 needs once per `Check` (§4.4).
#[derive(Debug, Clone, Default)]
pub struct BizAttrDefinitions {
    pub subject: Vec<AttributeDefinition>,
    pub resource: Vec<AttributeDefinition>,
    pub environment: Vec<AttributeDefinition>,
}

impl BizAttrDefinitions {
    pub fn all(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.subject.iter().chain(self.resource.iter()).chain(self.environment.iter())
    }

    pub fn by_id(&self, id: i64) -> Option<&AttributeDefinition> {
        self.all().find(|d| d.id == id)
    }

    pub fn by_name_and_kind(&self, name: &str, kind: EntityKind) -> Option<&AttributeDefinition> {
        let set = match kind {
            EntityKind::Subject => &self.subject,
            EntityKind::Resource => &self.resource,
            EntityKind::Environment => &self.environment,
        };
        set.iter().find(|d| d.name == name)
    }

    pub fn data_type_index(&self) -> HashMap<i64, authz_shared::DataType> {
        self.all().map(|d| (d.id, d.data_type)).collect()
    }
}

/// Facade over the repository's attribute-definition/value DAOs, adding the
/// merge and validation semantics C4 specifies.
pub struct AttributeStore {
    repository: Arc<dyn AuthzRepository>,
}

impl AttributeStore {
    pub fn new(repository: Arc<dyn AuthzRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self), fields(biz_id))]
    pub async fn fetch_biz_definitions(&self, biz_id: i64) -> AuthzResult<BizAttrDefinitions> {
        let definitions = self.repository.find_attribute_definitions(biz_id).await?;
        let mut grouped = BizAttrDefinitions::default();
        for definition in definitions {
            match definition.entity_type {
                EntityKind::Subject => grouped.subject.push(definition),
                EntityKind::Resource => grouped.resource.push(definition),
                EntityKind::Environment => grouped.environment.push(definition),
            }
        }
        Ok(grouped)
    }

    /// Fetches one entity's stored attribute values for `kind`, filling in
    /// each value's definition reference by id (§4.4).
    ///
    /// Correction applied to the source oracle (§9): this actually queries
    /// storage and returns, rather than recursing into itself.
    #[instrument(skip(self, definitions), fields(biz_id, entity_id))]
    pub async fn fetch_values(
        &self,
        kind: AttributeEntityKind,
        biz_id: i64,
        entity_id: i64,
        definitions: &BizAttrDefinitions,
    ) -> AuthzResult<AttributeBundle> {
        let values = self.repository.find_attribute_values(kind, biz_id, entity_id).await?;
        let values: Vec<AttributeValue> = values
            .into_iter()
            .filter(|v| definitions.by_id(v.definition_id).is_some())
            .collect();
        Ok(AttributeBundle::from_values(values))
    }

    /// Merges request-time attributes (name -> string value) over the
    /// stored bundle, locating each by name within the given entity kind's
    /// definitions and overwriting (or appending) the matching value (§4.4).
    /// Names with no matching definition are ignored.
    pub fn merge_realtime(
        &self,
        mut bundle: AttributeBundle,
        kind: EntityKind,
        request_attrs: &HashMap<String, String>,
        definitions: &BizAttrDefinitions,
    ) -> AttributeBundle {
        for (name, value) in request_attrs {
            if let Some(def) = definitions.by_name_and_kind(name, kind) {
                bundle.insert(def.id, value.clone());
            }
        }
        bundle
    }

    /// Validates `value` against `definition`'s regex before a write
    /// proceeds. Applies uniformly on every write path — subject, resource,
    /// and environment (§9 correction: the source oracle skipped this on
    /// some paths).
    pub fn validate(&self, definition: &AttributeDefinition, value: &str) -> AuthzResult<()> {
        let re = Regex::new(&definition.validation_rule)
            .map_err(|e| AuthzError::Internal(format!("invalid validation regex on {}: {e}", definition.name)))?;
        if !re.is_match(value) {
            return Err(AuthzError::Validation(format!(
                "value {value:?} does not satisfy validation rule for attribute {:?}",
                definition.name
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, value), fields(biz_id = value.biz_id, entity_id = value.entity_id))]
    pub async fn save_value(
        &self,
        kind: AttributeEntityKind,
        definition: &AttributeDefinition,
        value: AttributeValue,
    ) -> AuthzResult<AttributeValue> {
        self.validate(definition, &value.value)?;
        Ok(self.repository.upsert_attribute_value(kind, value).await?)
    }
}
