//! Related-instance lookup
//!
//! For an instance key, enumerate the instances related to it through
//! link-table relationships and through navigation properties. The set of
//! relationship queries relevant to a class is built once per class id and
//! kept in a [`LockedCache`] until the next schema import.

use std::sync::Arc;

use log::debug;

use crate::db_mapping::MappingSnapshot;
use crate::ec_catalog::{ClassId, NavigationDirection};
use crate::ecdb::EcDb;
use crate::statement::StepResult;
use crate::utils::LockedCache;

use super::errors::RelationshipError;

/// A row of some class, addressed by class and instance id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub class_id: ClassId,
    pub id: i64,
}

impl InstanceKey {
    pub fn new(class_id: ClassId, id: i64) -> Self {
        InstanceKey { class_id, id }
    }
}

/// Which end of a relationship the starting instance plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelatedDirection {
    /// The start is the source; related instances are targets
    Forward,
    /// The start is the target; related instances are sources
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectionFilter {
    Forward,
    Backward,
    #[default]
    Both,
}

impl DirectionFilter {
    fn accepts(self, direction: RelatedDirection) -> bool {
        matches!(
            (self, direction),
            (DirectionFilter::Both, _)
                | (DirectionFilter::Forward, RelatedDirection::Forward)
                | (DirectionFilter::Backward, RelatedDirection::Backward)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInstance {
    pub relationship: ClassId,
    pub direction: RelatedDirection,
    pub related: InstanceKey,
}

/// ECSQL selecting (related id, related class id, relationship class id)
/// for the starting instance id bound to `?`
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedQuery {
    pub relationship: ClassId,
    pub direction: RelatedDirection,
    pub ecsql: String,
}

pub struct RelatedInstanceFinder {
    cache: LockedCache<ClassId, Arc<Vec<RelatedQuery>>>,
}

impl Default for RelatedInstanceFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelatedInstanceFinder {
    pub fn new() -> Self {
        RelatedInstanceFinder {
            cache: LockedCache::unbounded(),
        }
    }

    /// Forget every cached relationship set; called after a schema import
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    pub fn cached_classes(&self) -> usize {
        self.cache.len()
    }

    /// Relationship queries relevant to instances of `class_id`
    pub fn queries(
        &self,
        snapshot: &MappingSnapshot,
        class_id: ClassId,
    ) -> Result<Arc<Vec<RelatedQuery>>, RelationshipError> {
        self.cache
            .get_or_try_build(&class_id, |class_id| build_queries(snapshot, *class_id).map(Arc::new))
    }

    pub fn find_all(
        &self,
        ecdb: &EcDb,
        key: InstanceKey,
        filter: DirectionFilter,
    ) -> Result<Vec<RelatedInstance>, RelationshipError> {
        let queries = self.queries(ecdb.snapshot(), key.class_id)?;
        let mut related = Vec::new();
        for query in queries.iter().filter(|q| filter.accepts(q.direction)) {
            let mut stmt = ecdb.prepare(&query.ecsql)?;
            stmt.bind(1, key.id)?;
            while stmt.step()? == StepResult::Row {
                let (Some(id), Some(class_id)) = (stmt.get_value(0)?.as_i64(), stmt.get_value(1)?.as_i64()) else {
                    continue;
                };
                related.push(RelatedInstance {
                    relationship: stmt.get_value(2)?.as_i64().unwrap_or(query.relationship),
                    direction: query.direction,
                    related: InstanceKey::new(class_id, id),
                });
            }
        }
        debug!(
            "{} related instance(s) for {} of class {}",
            related.len(),
            key.id,
            key.class_id
        );
        Ok(related)
    }
}

fn build_queries(snapshot: &MappingSnapshot, class_id: ClassId) -> Result<Vec<RelatedQuery>, RelationshipError> {
    let catalog = &snapshot.catalog;
    if catalog.get(class_id).is_none() {
        return Err(RelationshipError::UnknownClass(class_id));
    }
    let mut queries = Vec::new();

    for rel in catalog.relationship_classes() {
        let (source, target) = catalog.relationship_ends(rel.id)?;
        let rel_name = catalog.full_name(rel.id);
        let plays_source = catalog.is_a(class_id, source);
        let plays_target = catalog.is_a(class_id, target);
        if !plays_source && !plays_target {
            continue;
        }

        let link_map = snapshot.class_map(rel.id).filter(|m| m.is_link_table && m.is_mapped());
        if let Some(map) = link_map {
            // Derived link relationships are covered by the polymorphic query
            // over their nearest link-table base
            let covered = catalog
                .base(map.class_id)
                .and_then(|base| snapshot.class_map(base))
                .is_some_and(|base| base.is_link_table && base.is_mapped());
            if covered {
                continue;
            }
            if plays_source {
                queries.push(RelatedQuery {
                    relationship: rel.id,
                    direction: RelatedDirection::Forward,
                    ecsql: format!(
                        "SELECT TargetECInstanceId, TargetECClassId, ECClassId FROM {} WHERE SourceECInstanceId = ?",
                        rel_name
                    ),
                });
            }
            if plays_target {
                queries.push(RelatedQuery {
                    relationship: rel.id,
                    direction: RelatedDirection::Backward,
                    ecsql: format!(
                        "SELECT SourceECInstanceId, SourceECClassId, ECClassId FROM {} WHERE TargetECInstanceId = ?",
                        rel_name
                    ),
                });
            }
            continue;
        }

        for nav in catalog.navigation_properties_for(rel.id) {
            let holder = catalog.full_name(nav.holder);
            // The end the navigation property points at
            let (pointed_end, holder_direction) = match nav.direction {
                NavigationDirection::Forward => (target, RelatedDirection::Forward),
                NavigationDirection::Backward => (source, RelatedDirection::Backward),
            };
            let holder_plays = match holder_direction {
                RelatedDirection::Forward => plays_source,
                RelatedDirection::Backward => plays_target,
            };
            if holder_plays {
                queries.push(RelatedQuery {
                    relationship: rel.id,
                    direction: holder_direction,
                    ecsql: format!(
                        "SELECT p.ECInstanceId, p.ECClassId, {rel} FROM {holder} h JOIN {pointed} p ON p.ECInstanceId = h.{prop}.Id WHERE h.ECInstanceId = ?",
                        rel = rel.id,
                        holder = holder,
                        pointed = catalog.full_name(pointed_end),
                        prop = nav.property
                    ),
                });
            }
            let pointed_direction = match holder_direction {
                RelatedDirection::Forward => RelatedDirection::Backward,
                RelatedDirection::Backward => RelatedDirection::Forward,
            };
            let pointed_plays = match pointed_direction {
                RelatedDirection::Forward => plays_source,
                RelatedDirection::Backward => plays_target,
            };
            if pointed_plays {
                queries.push(RelatedQuery {
                    relationship: rel.id,
                    direction: pointed_direction,
                    ecsql: format!(
                        "SELECT h.ECInstanceId, h.ECClassId, {rel} FROM {holder} h WHERE h.{prop}.Id = ?",
                        rel = rel.id,
                        holder = holder,
                        prop = nav.property
                    ),
                });
            }
        }
    }
    debug!(
        "Built {} relationship queries for {}",
        queries.len(),
        catalog.full_name(class_id)
    );
    Ok(queries)
}
