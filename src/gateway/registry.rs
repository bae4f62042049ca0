//! Allow-List Registry
//!
//! The total universe of addressable collections and permitted operation
//! kinds. Built once from `GatewayConfig` and never mutated afterwards.
//!
//! Aggregation stages that read another collection (`$lookup`,
//! `$graphLookup`, `$unionWith`) are held to the same list, including
//! inside `$lookup`, `$unionWith` and `$facet` sub-pipelines.

use std::collections::HashSet;

use bson::{Bson, Document};

use super::config::GatewayConfig;
use super::errors::{GatewayError, GatewayResult};
use super::operation::OperationKind;

/// Collections and operations the gateway may address
#[derive(Debug, Clone)]
pub struct AllowList {
    collections: HashSet<String>,
    operations: HashSet<OperationKind>,
}

impl AllowList {
    pub fn new(
        collections: impl IntoIterator<Item = String>,
        operations: impl IntoIterator<Item = OperationKind>,
    ) -> Self {
        Self {
            collections: collections.into_iter().collect(),
            operations: operations.into_iter().collect(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.collections.iter().cloned(),
            config.operations.iter().copied(),
        )
    }

    pub fn allows_collection(&self, name: &str) -> bool {
        self.collections.contains(name)
    }

    pub fn allows_operation(&self, kind: OperationKind) -> bool {
        self.operations.contains(&kind)
    }

    /// Validate a collection name
    pub fn check_collection(&self, name: &str) -> GatewayResult<()> {
        if self.allows_collection(name) {
            Ok(())
        } else {
            Err(GatewayError::CollectionNotAllowed(name.to_string()))
        }
    }

    /// Resolve a wire operation name against the permitted set
    pub fn check_operation(&self, name: &str) -> GatewayResult<OperationKind> {
        match OperationKind::parse(name) {
            Some(kind) if self.allows_operation(kind) => Ok(kind),
            _ => Err(GatewayError::OperationNotAllowed(name.to_string())),
        }
    }

    /// Every collection a pipeline stage reads must be allow-listed
    pub fn check_stage_sources(&self, stage: &Document) -> GatewayResult<()> {
        for (name, spec) in stage {
            match (name.as_str(), spec) {
                ("$lookup" | "$graphLookup", Bson::Document(spec)) => {
                    if let Some(from) = spec.get("from") {
                        self.check_source(from)?;
                    }
                    self.check_sub_pipeline(spec.get("pipeline"))?;
                }
                ("$unionWith", Bson::String(coll)) => self.check_collection(coll)?,
                ("$unionWith", Bson::Document(spec)) => {
                    if let Some(coll) = spec.get("coll") {
                        self.check_source(coll)?;
                    }
                    self.check_sub_pipeline(spec.get("pipeline"))?;
                }
                ("$facet", Bson::Document(facets)) => {
                    for branch in facets.values() {
                        self.check_sub_pipeline(Some(branch))?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Only a plain collection name is addressable; `{db, coll}` forms are not
    fn check_source(&self, source: &Bson) -> GatewayResult<()> {
        match source {
            Bson::String(name) => self.check_collection(name),
            other => Err(GatewayError::CollectionNotAllowed(other.to_string())),
        }
    }

    fn check_sub_pipeline(&self, pipeline: Option<&Bson>) -> GatewayResult<()> {
        let Some(Bson::Array(stages)) = pipeline else {
            return Ok(());
        };
        for stage in stages {
            if let Bson::Document(stage) = stage {
                self.check_stage_sources(stage)?;
            }
        }
        Ok(())
    }

    /// Allow-listed collection names, sorted
    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Permitted operations in declaration order
    pub fn operations(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|k| self.operations.contains(k))
            .collect()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_membership() {
        let list = AllowList::new(
            vec!["users".to_string(), "children".to_string()],
            vec![OperationKind::Find, OperationKind::Count],
        );

        assert!(list.check_collection("users").is_ok());
        assert!(matches!(
            list.check_collection("system.users"),
            Err(GatewayError::CollectionNotAllowed(_))
        ));

        assert_eq!(list.check_operation("find").unwrap(), OperationKind::Find);
        // known but not permitted
        assert!(list.check_operation("deleteMany").is_err());
        // unknown
        assert!(list.check_operation("drop").is_err());
    }

    #[test]
    fn test_collection_names_sorted() {
        let list = AllowList::new(
            vec!["payrolls".to_string(), "children".to_string(), "users".to_string()],
            OperationKind::ALL,
        );
        assert_eq!(list.collection_names(), vec!["children", "payrolls", "users"]);
    }

    #[test]
    fn test_operations_keep_declaration_order() {
        let list = AllowList::new(
            vec!["users".to_string()],
            vec![OperationKind::DeleteOne, OperationKind::Find],
        );
        assert_eq!(
            list.operations(),
            vec![OperationKind::Find, OperationKind::DeleteOne]
        );
    }

    #[test]
    fn test_stage_sources() {
        let list = AllowList::default();
        let allowed = |stage: Document| list.check_stage_sources(&stage).is_ok();

        assert!(allowed(doc! { "$match": { "from": "secrets" } }));
        assert!(allowed(doc! { "$lookup": { "from": "groups", "localField": "g", "foreignField": "_id", "as": "g" } }));
        assert!(allowed(doc! { "$unionWith": "staff" }));

        assert!(!allowed(doc! { "$lookup": { "from": "secrets", "as": "x" } }));
        assert!(!allowed(doc! { "$lookup": { "from": { "db": "admin", "coll": "users" }, "as": "x" } }));
        assert!(!allowed(doc! { "$graphLookup": { "from": "secrets", "startWith": "$a", "connectFromField": "a", "connectToField": "b", "as": "x" } }));
        assert!(!allowed(doc! { "$unionWith": "secrets" }));
        assert!(!allowed(doc! { "$unionWith": { "coll": "secrets" } }));
    }

    #[test]
    fn test_nested_stage_sources() {
        let list = AllowList::default();
        let nested = [
            doc! { "$lookup": { "from": "groups", "as": "g", "pipeline": [ { "$unionWith": "secrets" } ] } },
            doc! { "$unionWith": { "coll": "staff", "pipeline": [ { "$lookup": { "from": "secrets", "as": "s" } } ] } },
            doc! { "$facet": { "a": [ { "$match": {} } ], "b": [ { "$lookup": { "from": "secrets", "as": "s" } } ] } },
        ];
        for stage in nested {
            assert!(matches!(
                list.check_stage_sources(&stage),
                Err(GatewayError::CollectionNotAllowed(name)) if name == "secrets"
            ));
        }
    }

    #[test]
    fn test_name_matching_is_exact() {
        let list = AllowList::default();
        assert!(list.allows_collection("users"));
        assert!(!list.allows_collection("Users"));
        assert!(!list.allows_collection("users "));
    }
}
