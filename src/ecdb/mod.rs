//! EcDb context
//!
//! [`EcDb`] owns everything one store needs at runtime: the connection, the
//! configuration, the current [`MappingSnapshot`], the function registry, the
//! issue listeners, the id sequence and the caches built on top of the
//! snapshot. Nothing here is global; two `EcDb` values over two stores share
//! no state.
//!
//! Compiling and executing borrow the context shared; a schema import needs
//! it exclusively, so no statement can observe a half-applied import.

pub mod errors;

pub use errors::{EcDbError, ImportDiagnostic, ImportError};

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use validator::Validate;

use crate::config::EcDbConfig;
use crate::db_mapping::{persistence, ClassMappingManager, MappingSnapshot};
use crate::ec_catalog::schema_validator::{validate_additive, validate_catalog, validate_schema_shapes};
use crate::ec_catalog::{ClassId, EcSchema, EcSchemaConfig, SchemaCatalog};
use crate::ecsql_prepare::{self, Issue, IssueCategory, IssueListener, IssueReporter, PrepareError};
use crate::native_sql::{CompiledPlan, EmbeddedPlanCache, FunctionRegistry};
use crate::relationships::{DirectionFilter, InstanceKey, RelatedInstance, RelatedInstanceFinder, RelationshipError};
use crate::statement::EcSqlStatement;
use crate::store::{RepositoryBasedIdSequence, Store, StoreError};
use crate::utils::LockedCache;

/// Outcome of a successful schema import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub schemas: Vec<String>,
    /// Classes that received their first class map
    pub mapped_classes: Vec<ClassId>,
    /// Classes whose existing map gained properties
    pub updated_classes: Vec<ClassId>,
    /// Properties whose columns moved to an overflow table
    pub moved_properties: usize,
}

pub struct EcDb {
    store: Store,
    config: EcDbConfig,
    snapshot: Arc<MappingSnapshot>,
    functions: FunctionRegistry,
    issues: IssueReporter,
    ids: RepositoryBasedIdSequence,
    plans: LockedCache<String, Arc<CompiledPlan>>,
    embedded: EmbeddedPlanCache,
    related: RelatedInstanceFinder,
}

impl EcDb {
    /// Open (or create) the store file at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: EcDbConfig) -> Result<Self, EcDbError> {
        config.validate()?;
        let store = Store::open(path)?;
        Self::init(store, config)
    }

    pub fn open_in_memory(config: EcDbConfig) -> Result<Self, EcDbError> {
        config.validate()?;
        let store = Store::open_in_memory()?;
        Self::init(store, config)
    }

    fn init(store: Store, config: EcDbConfig) -> Result<Self, EcDbError> {
        let ids = RepositoryBasedIdSequence::instance_ids();
        if store.local_value(ids.name())?.is_none() {
            ids.reset(store.connection(), config.repository_id)?;
        } else {
            ids.initialize(store.connection())?;
        }

        let snapshot = persistence::load(store.connection(), &config)?.unwrap_or_default();
        info!(
            "Opened {} with {} class(es) and {} table(s)",
            store
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            snapshot.catalog.len(),
            snapshot.db_schema.tables().count()
        );

        Ok(EcDb {
            plans: LockedCache::new(config.statement_cache_capacity),
            store,
            config,
            snapshot: Arc::new(snapshot),
            functions: FunctionRegistry::new(),
            issues: IssueReporter::new(),
            ids,
            embedded: EmbeddedPlanCache::unbounded(),
            related: RelatedInstanceFinder::new(),
        })
    }

    pub fn config(&self) -> &EcDbConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn snapshot(&self) -> &MappingSnapshot {
        &self.snapshot
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Register additional ECSQL functions. Needs exclusive access because
    /// cached plans were compiled against the old registry.
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        self.invalidate_caches();
        &mut self.functions
    }

    pub fn add_issue_listener(&self, listener: Arc<dyn IssueListener>) {
        self.issues.add_listener(listener);
    }

    pub fn issue_reporter(&self) -> &IssueReporter {
        &self.issues
    }

    /// Class id of `schema.class`; the schema may be given by name or alias
    pub fn class_id(&self, schema: &str, class: &str) -> Option<ClassId> {
        self.snapshot.catalog.find_class(Some(schema), class).ok()
    }

    /// Draw the next id from the instance id sequence
    pub fn next_instance_id(&self) -> Result<i64, StoreError> {
        self.ids.get_next_i64_value(self.store.connection())
    }

    /// Restart instance id generation in the range of `repository_id`
    pub fn reset_instance_ids(&self, repository_id: u32) -> Result<(), StoreError> {
        self.ids.reset(self.store.connection(), repository_id)
    }

    /// Compile `ecsql` (or take it from the plan cache) and wrap it in a
    /// statement ready for binding
    pub fn prepare(&self, ecsql: &str) -> Result<EcSqlStatement<'_>, PrepareError> {
        let plan = self
            .plans
            .get_or_try_build(&ecsql.to_string(), |ecsql| self.compile(ecsql))?;
        Ok(EcSqlStatement::new(
            self.store.connection(),
            &self.ids,
            &self.issues,
            plan,
        ))
    }

    fn compile(&self, ecsql: &str) -> Result<Arc<CompiledPlan>, PrepareError> {
        match ecsql_prepare::compile(ecsql, &self.snapshot, &self.functions, &self.embedded) {
            Ok(prepared) => {
                self.issues.report_all(&prepared.warnings);
                Ok(Arc::new(prepared.plan))
            }
            Err(err) => {
                match &err {
                    PrepareError::Semantic { issues, .. } => self.issues.report_all(issues),
                    PrepareError::Syntax(_) => self
                        .issues
                        .report(&Issue::error(IssueCategory::EcsqlSyntax, err.to_string())),
                    PrepareError::Translation(_) => self
                        .issues
                        .report(&Issue::error(IssueCategory::BusinessRule, err.to_string())),
                    PrepareError::Store(_) => self
                        .issues
                        .report(&Issue::error(IssueCategory::InternalError, err.to_string())),
                }
                Err(err)
            }
        }
    }

    /// Instances related to `key` through any relationship, in the directions
    /// `filter` allows
    pub fn find_related(
        &self,
        key: InstanceKey,
        filter: DirectionFilter,
    ) -> Result<Vec<RelatedInstance>, RelationshipError> {
        self.related.find_all(self, key, filter)
    }

    pub fn related_instance_finder(&self) -> &RelatedInstanceFinder {
        &self.related
    }

    /// Number of compiled plans currently cached
    pub fn cached_plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Import schemas from a YAML (or JSON) schema file
    pub fn import_schema_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ImportReport, ImportError> {
        let config = EcSchemaConfig::from_yaml_file(path)?;
        self.import_schemas(config.into_schemas())
    }

    /// Add `schemas` to the store. New schemas are mapped; known schemas may
    /// only gain classes and properties. Any problem rejects the whole import
    /// and leaves the store as it was.
    pub fn import_schemas(&mut self, schemas: Vec<EcSchema>) -> Result<ImportReport, ImportError> {
        let names: Vec<String> = schemas.iter().map(|s| s.name.clone()).collect();
        let result = self.try_import(schemas);
        match &result {
            Ok(report) => info!(
                "Imported {:?}: {} new class map(s), {} updated",
                names,
                report.mapped_classes.len(),
                report.updated_classes.len()
            ),
            Err(err) => {
                warn!("Import of {:?} rejected", names);
                for diagnostic in err.diagnostics() {
                    self.issues
                        .report(&Issue::error(IssueCategory::SchemaImport, diagnostic.to_string()));
                }
            }
        }
        result
    }

    fn try_import(&mut self, schemas: Vec<EcSchema>) -> Result<ImportReport, ImportError> {
        let shape_errors = validate_schema_shapes(&schemas);
        if !shape_errors.is_empty() {
            return Err(ImportError::Schema(shape_errors));
        }

        let current = &self.snapshot;
        let catalog = if current.catalog.is_empty() {
            SchemaCatalog::build(schemas.clone(), &[])
        } else {
            current.catalog.merge(schemas.clone())
        }
        .map_err(ImportError::Schema)?;

        let mut errors = validate_catalog(&catalog);
        errors.extend(validate_additive(&current.catalog, &catalog));
        if !errors.is_empty() {
            return Err(ImportError::Schema(errors));
        }

        let mut db_schema = current.db_schema.clone();
        let mut class_maps = current.class_maps.clone();
        let report =
            ClassMappingManager::new(&catalog, &self.config, &mut db_schema, &mut class_maps).map_classes();
        if report.has_errors() {
            return Err(ImportError::Mapping(report.errors));
        }

        self.store.in_transaction(|conn| {
            persistence::save(conn, &catalog, &mut db_schema, &class_maps, &report.moves)
        })?;

        self.snapshot = Arc::new(MappingSnapshot {
            catalog,
            db_schema,
            class_maps,
        });
        self.invalidate_caches();

        Ok(ImportReport {
            schemas: schemas.into_iter().map(|s| s.name).collect(),
            mapped_classes: report.mapped_classes,
            updated_classes: report.updated_classes,
            moved_properties: report.moves.len(),
        })
    }

    fn invalidate_caches(&self) {
        self.plans.invalidate_all();
        self.embedded.invalidate_all();
        self.related.invalidate();
        debug!("Invalidated plan, embedded plan and relationship caches");
    }
}
