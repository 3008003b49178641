//! The store facade: every public operation of the metadata store, each
//! running inside exactly one transaction.
//!
//! The methods validate their requests, open a transaction through the
//! executor and drive the access object; composite operations put all of
//! their steps inside the single transaction so partial success is never
//! observable.
mod types;

#[cfg(test)]
mod tests;

use crate::access::AccessObject;
use crate::errors::StoreError;
use crate::executor::{TransactionExecutor, TransactionOptions};
use crate::metadata::{
    Artifact, ArtifactType, Context, ContextType, Execution, ExecutionType, Id, PropertiedType,
    TypeKind,
};
use crate::requests::*;
use crate::simple_types;

/// Maximum hop distance a lineage traversal may expand to.
const MAX_LINEAGE_HOPS: i64 = 20;

/// The transactional service layer over the metadata schema.
///
/// ```no_run
/// # async fn doc() -> Result<(), mlmeta::errors::StoreError> {
/// use mlmeta::MetadataStore;
///
/// let mut store = MetadataStore::new("sqlite://metadata.db").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MetadataStore {
    access: AccessObject,
    executor: TransactionExecutor,
}

impl MetadataStore {
    /// Connects without touching the schema.
    ///
    /// When `options.migration.downgrade_to_schema_version` is set, the
    /// downgrade runs and the connection is then refused with `Cancelled`:
    /// the downgraded database must be used with an older client.
    pub async fn connect(
        database_uri: &str,
        options: ConnectionOptions,
    ) -> Result<Self, StoreError> {
        let mut access = AccessObject::connect(database_uri).await?;
        let executor = TransactionExecutor::default();
        let target = options.migration.downgrade_to_schema_version;
        if target >= 0 {
            executor
                .execute(&mut access, &target, &options.transaction, |access, target| {
                    Box::pin(run_downgrade(access, target))
                })
                .await?;
            return Err(StoreError::Cancelled(format!(
                "downgrade migration was performed and the database is now at schema version {}; \
                 use an older client to connect to it",
                target
            )));
        }
        Ok(Self { access, executor })
    }

    /// Connects with default options and initializes the schema and the
    /// simple-type catalog if needed.
    pub async fn new(database_uri: &str) -> Result<Self, StoreError> {
        let mut store = Self::connect(database_uri, ConnectionOptions::default()).await?;
        store.init_metadata_store_if_not_exists(false).await?;
        Ok(store)
    }

    /// Initializes the backend unconditionally, then seeds the simple-type
    /// catalog.
    pub async fn init_metadata_store(&mut self) -> Result<(), StoreError> {
        let options = TransactionOptions::default();
        self.executor
            .execute(&mut self.access, &(), &options, |access, _| {
                Box::pin(run_init(access))
            })
            .await?;
        self.upsert_simple_types(&options).await
    }

    /// Idempotent initialization; an older schema is migrated upward only
    /// when `enable_upgrade_migration` is set.
    pub async fn init_metadata_store_if_not_exists(
        &mut self,
        enable_upgrade_migration: bool,
    ) -> Result<(), StoreError> {
        let options = TransactionOptions::default();
        self.executor
            .execute(
                &mut self.access,
                &enable_upgrade_migration,
                &options,
                |access, enable| Box::pin(run_init_if_not_exists(access, enable)),
            )
            .await?;
        self.upsert_simple_types(&options).await
    }

    async fn upsert_simple_types(&mut self, options: &TransactionOptions) -> Result<(), StoreError> {
        self.executor
            .execute(&mut self.access, &(), options, |access, _| {
                Box::pin(run_upsert_simple_types(access))
            })
            .await
    }

    // Type writes.

    pub async fn put_types(
        &mut self,
        request: &PutTypesRequest,
    ) -> Result<PutTypesResponse, StoreError> {
        if !request.all_fields_match {
            return Err(StoreError::Unimplemented("must match all fields".to_owned()));
        }
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_put_types(access, request)),
            )
            .await
    }

    pub async fn put_artifact_type(
        &mut self,
        request: &PutArtifactTypeRequest,
    ) -> Result<PutArtifactTypeResponse, StoreError> {
        if !request.all_fields_match {
            return Err(StoreError::Unimplemented("must match all fields".to_owned()));
        }
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let type_id = types::upsert_type(
                            access,
                            &request.artifact_type,
                            request.can_add_fields,
                            request.can_omit_fields,
                        )
                        .await?;
                        Ok(PutArtifactTypeResponse { type_id })
                    })
                },
            )
            .await
    }

    pub async fn put_execution_type(
        &mut self,
        request: &PutExecutionTypeRequest,
    ) -> Result<PutExecutionTypeResponse, StoreError> {
        if !request.all_fields_match {
            return Err(StoreError::Unimplemented("must match all fields".to_owned()));
        }
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let type_id = types::upsert_type(
                            access,
                            &request.execution_type,
                            request.can_add_fields,
                            request.can_omit_fields,
                        )
                        .await?;
                        Ok(PutExecutionTypeResponse { type_id })
                    })
                },
            )
            .await
    }

    pub async fn put_context_type(
        &mut self,
        request: &PutContextTypeRequest,
    ) -> Result<PutContextTypeResponse, StoreError> {
        if !request.all_fields_match {
            return Err(StoreError::Unimplemented("must match all fields".to_owned()));
        }
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let type_id = types::upsert_type(
                            access,
                            &request.context_type,
                            request.can_add_fields,
                            request.can_omit_fields,
                        )
                        .await?;
                        Ok(PutContextTypeResponse { type_id })
                    })
                },
            )
            .await
    }

    // Type reads.

    pub async fn get_artifact_type(
        &mut self,
        request: &GetArtifactTypeRequest,
    ) -> Result<GetArtifactTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_artifact_type(access, request)),
            )
            .await
    }

    pub async fn get_execution_type(
        &mut self,
        request: &GetExecutionTypeRequest,
    ) -> Result<GetExecutionTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_execution_type(access, request)),
            )
            .await
    }

    pub async fn get_context_type(
        &mut self,
        request: &GetContextTypeRequest,
    ) -> Result<GetContextTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_context_type(access, request)),
            )
            .await
    }

    pub async fn get_artifact_types_by_id(
        &mut self,
        request: &GetArtifactTypesByIdRequest,
    ) -> Result<GetArtifactTypesByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let mut artifact_types =
                            find_types_by_id::<ArtifactType>(access, &request.type_ids).await?;
                        types::set_base_types(access, &mut artifact_types).await?;
                        Ok(GetArtifactTypesByIdResponse { artifact_types })
                    })
                },
            )
            .await
    }

    pub async fn get_execution_types_by_id(
        &mut self,
        request: &GetExecutionTypesByIdRequest,
    ) -> Result<GetExecutionTypesByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let mut execution_types =
                            find_types_by_id::<ExecutionType>(access, &request.type_ids).await?;
                        types::set_base_types(access, &mut execution_types).await?;
                        Ok(GetExecutionTypesByIdResponse { execution_types })
                    })
                },
            )
            .await
    }

    pub async fn get_context_types_by_id(
        &mut self,
        request: &GetContextTypesByIdRequest,
    ) -> Result<GetContextTypesByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let context_types =
                            find_types_by_id::<ContextType>(access, &request.type_ids).await?;
                        Ok(GetContextTypesByIdResponse { context_types })
                    })
                },
            )
            .await
    }

    /// All artifact types except the seeded simple-type catalog.
    pub async fn get_artifact_types(
        &mut self,
        request: &GetArtifactTypesRequest,
    ) -> Result<GetArtifactTypesResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, _| {
                    Box::pin(async move {
                        let mut artifact_types: Vec<ArtifactType> = access
                            .find_types()
                            .await?
                            .into_iter()
                            .filter(|ty: &ArtifactType| !simple_types::is_simple_type_name(&ty.name))
                            .collect();
                        types::set_base_types(access, &mut artifact_types).await?;
                        Ok(GetArtifactTypesResponse { artifact_types })
                    })
                },
            )
            .await
    }

    /// All execution types except the seeded simple-type catalog.
    pub async fn get_execution_types(
        &mut self,
        request: &GetExecutionTypesRequest,
    ) -> Result<GetExecutionTypesResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, _| {
                    Box::pin(async move {
                        let mut execution_types: Vec<ExecutionType> = access
                            .find_types()
                            .await?
                            .into_iter()
                            .filter(|ty: &ExecutionType| {
                                !simple_types::is_simple_type_name(&ty.name)
                            })
                            .collect();
                        types::set_base_types(access, &mut execution_types).await?;
                        Ok(GetExecutionTypesResponse { execution_types })
                    })
                },
            )
            .await
    }

    pub async fn get_context_types(
        &mut self,
        request: &GetContextTypesRequest,
    ) -> Result<GetContextTypesResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, _| {
                    Box::pin(async move {
                        let context_types: Vec<ContextType> = access
                            .find_types()
                            .await?
                            .into_iter()
                            .filter(|ty: &ContextType| !simple_types::is_simple_type_name(&ty.name))
                            .collect();
                        Ok(GetContextTypesResponse { context_types })
                    })
                },
            )
            .await
    }

    // Entity writes.

    pub async fn put_artifacts(
        &mut self,
        request: &PutArtifactsRequest,
    ) -> Result<PutArtifactsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_put_artifacts(access, request)),
            )
            .await
    }

    pub async fn put_executions(
        &mut self,
        request: &PutExecutionsRequest,
    ) -> Result<PutExecutionsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let mut execution_ids = Vec::with_capacity(request.executions.len());
                        for execution in &request.executions {
                            execution_ids.push(upsert_execution(access, execution).await?);
                        }
                        Ok(PutExecutionsResponse { execution_ids })
                    })
                },
            )
            .await
    }

    pub async fn put_contexts(
        &mut self,
        request: &PutContextsRequest,
    ) -> Result<PutContextsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let mut context_ids = Vec::with_capacity(request.contexts.len());
                        for context in &request.contexts {
                            context_ids.push(upsert_context(access, context).await?);
                        }
                        Ok(PutContextsResponse { context_ids })
                    })
                },
            )
            .await
    }

    pub async fn put_events(
        &mut self,
        request: &PutEventsRequest,
    ) -> Result<PutEventsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        for event in &request.events {
                            access.create_event(event).await?;
                        }
                        Ok(PutEventsResponse {})
                    })
                },
            )
            .await
    }

    /// Records a complete pipeline step: the execution, its artifacts and
    /// events, and the contexts it belongs to, atomically.
    pub async fn put_execution(
        &mut self,
        request: &PutExecutionRequest,
    ) -> Result<PutExecutionResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_put_execution(access, request)),
            )
            .await
    }

    pub async fn put_attributions_and_associations(
        &mut self,
        request: &PutAttributionsAndAssociationsRequest,
    ) -> Result<PutAttributionsAndAssociationsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        for attribution in &request.attributions {
                            insert_attribution_if_not_exist(
                                access,
                                attribution.context_id,
                                attribution.artifact_id,
                            )
                            .await?;
                        }
                        for association in &request.associations {
                            insert_association_if_not_exist(
                                access,
                                association.context_id,
                                association.execution_id,
                            )
                            .await?;
                        }
                        Ok(PutAttributionsAndAssociationsResponse {})
                    })
                },
            )
            .await
    }

    pub async fn put_parent_contexts(
        &mut self,
        request: &PutParentContextsRequest,
    ) -> Result<PutParentContextsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        for parent_context in &request.parent_contexts {
                            match access
                                .create_parent_context(
                                    parent_context.parent_id,
                                    parent_context.child_id,
                                )
                                .await
                            {
                                Err(e) if e.is_already_exists() => {}
                                other => other?,
                            }
                        }
                        Ok(PutParentContextsResponse {})
                    })
                },
            )
            .await
    }

    // Entity reads.

    pub async fn get_artifacts_by_id(
        &mut self,
        request: &GetArtifactsByIdRequest,
    ) -> Result<GetArtifactsByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let artifacts = access.find_artifacts_by_id(&request.artifact_ids).await?;
                        Ok(GetArtifactsByIdResponse { artifacts })
                    })
                },
            )
            .await
    }

    pub async fn get_executions_by_id(
        &mut self,
        request: &GetExecutionsByIdRequest,
    ) -> Result<GetExecutionsByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let executions =
                            access.find_executions_by_id(&request.execution_ids).await?;
                        Ok(GetExecutionsByIdResponse { executions })
                    })
                },
            )
            .await
    }

    pub async fn get_contexts_by_id(
        &mut self,
        request: &GetContextsByIdRequest,
    ) -> Result<GetContextsByIdResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let contexts = access.find_contexts_by_id(&request.context_ids).await?;
                        Ok(GetContextsByIdResponse { contexts })
                    })
                },
            )
            .await
    }

    pub async fn get_artifacts(
        &mut self,
        request: &GetArtifactsRequest,
    ) -> Result<GetArtifactsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let (artifacts, next_page_token) = match &request.options {
                            Some(options) => access.list_artifacts(options).await?,
                            None => (access.find_artifacts().await?, None),
                        };
                        Ok(GetArtifactsResponse {
                            artifacts,
                            next_page_token,
                        })
                    })
                },
            )
            .await
    }

    pub async fn get_executions(
        &mut self,
        request: &GetExecutionsRequest,
    ) -> Result<GetExecutionsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let (executions, next_page_token) = match &request.options {
                            Some(options) => access.list_executions(options).await?,
                            None => (access.find_executions().await?, None),
                        };
                        Ok(GetExecutionsResponse {
                            executions,
                            next_page_token,
                        })
                    })
                },
            )
            .await
    }

    pub async fn get_contexts(
        &mut self,
        request: &GetContextsRequest,
    ) -> Result<GetContextsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let (contexts, next_page_token) = match &request.options {
                            Some(options) => access.list_contexts(options).await?,
                            None => (access.find_contexts().await?, None),
                        };
                        Ok(GetContextsResponse {
                            contexts,
                            next_page_token,
                        })
                    })
                },
            )
            .await
    }

    /// Union of the artifacts stored under each of the requested URIs.
    pub async fn get_artifacts_by_uri(
        &mut self,
        request: &GetArtifactsByUriRequest,
    ) -> Result<GetArtifactsByUriResponse, StoreError> {
        if let Some(uri) = &request.uri {
            return Err(StoreError::invalid_argument(format!(
                "the request sets the deprecated singular `uri` field ({:?}); use `uris`",
                uri
            )));
        }
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_artifacts_by_uri(access, request)),
            )
            .await
    }

    pub async fn get_artifacts_by_type(
        &mut self,
        request: &GetArtifactsByTypeRequest,
    ) -> Result<GetArtifactsByTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_artifacts_by_type(access, request)),
            )
            .await
    }

    pub async fn get_executions_by_type(
        &mut self,
        request: &GetExecutionsByTypeRequest,
    ) -> Result<GetExecutionsByTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_executions_by_type(access, request)),
            )
            .await
    }

    pub async fn get_contexts_by_type(
        &mut self,
        request: &GetContextsByTypeRequest,
    ) -> Result<GetContextsByTypeResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_contexts_by_type(access, request)),
            )
            .await
    }

    pub async fn get_artifact_by_type_and_name(
        &mut self,
        request: &GetArtifactByTypeAndNameRequest,
    ) -> Result<GetArtifactByTypeAndNameResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_artifact_by_type_and_name(access, request)),
            )
            .await
    }

    pub async fn get_execution_by_type_and_name(
        &mut self,
        request: &GetExecutionByTypeAndNameRequest,
    ) -> Result<GetExecutionByTypeAndNameResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_execution_by_type_and_name(access, request)),
            )
            .await
    }

    pub async fn get_context_by_type_and_name(
        &mut self,
        request: &GetContextByTypeAndNameRequest,
    ) -> Result<GetContextByTypeAndNameResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| Box::pin(run_get_context_by_type_and_name(access, request)),
            )
            .await
    }

    pub async fn get_events_by_artifact_ids(
        &mut self,
        request: &GetEventsByArtifactIdsRequest,
    ) -> Result<GetEventsByArtifactIdsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let events =
                            access.find_events_by_artifacts(&request.artifact_ids).await?;
                        Ok(GetEventsByArtifactIdsResponse { events })
                    })
                },
            )
            .await
    }

    pub async fn get_events_by_execution_ids(
        &mut self,
        request: &GetEventsByExecutionIdsRequest,
    ) -> Result<GetEventsByExecutionIdsResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let events = access
                            .find_events_by_executions(&request.execution_ids)
                            .await?;
                        Ok(GetEventsByExecutionIdsResponse { events })
                    })
                },
            )
            .await
    }

    pub async fn get_contexts_by_artifact(
        &mut self,
        request: &GetContextsByArtifactRequest,
    ) -> Result<GetContextsByArtifactResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let contexts =
                            access.find_contexts_by_artifact(request.artifact_id).await?;
                        Ok(GetContextsByArtifactResponse { contexts })
                    })
                },
            )
            .await
    }

    pub async fn get_contexts_by_execution(
        &mut self,
        request: &GetContextsByExecutionRequest,
    ) -> Result<GetContextsByExecutionResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let contexts = access
                            .find_contexts_by_execution(request.execution_id)
                            .await?;
                        Ok(GetContextsByExecutionResponse { contexts })
                    })
                },
            )
            .await
    }

    pub async fn get_artifacts_by_context(
        &mut self,
        request: &GetArtifactsByContextRequest,
    ) -> Result<GetArtifactsByContextResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let (artifacts, next_page_token) = access
                            .find_artifacts_by_context(
                                request.context_id,
                                request.options.as_ref(),
                            )
                            .await?;
                        Ok(GetArtifactsByContextResponse {
                            artifacts,
                            next_page_token,
                        })
                    })
                },
            )
            .await
    }

    pub async fn get_executions_by_context(
        &mut self,
        request: &GetExecutionsByContextRequest,
    ) -> Result<GetExecutionsByContextResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let (executions, next_page_token) = access
                            .find_executions_by_context(
                                request.context_id,
                                request.options.as_ref(),
                            )
                            .await?;
                        Ok(GetExecutionsByContextResponse {
                            executions,
                            next_page_token,
                        })
                    })
                },
            )
            .await
    }

    pub async fn get_parent_contexts_by_context(
        &mut self,
        request: &GetParentContextsByContextRequest,
    ) -> Result<GetParentContextsByContextResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let contexts = access
                            .find_parent_contexts_by_context_id(request.context_id)
                            .await?;
                        Ok(GetParentContextsByContextResponse { contexts })
                    })
                },
            )
            .await
    }

    pub async fn get_children_contexts_by_context(
        &mut self,
        request: &GetChildrenContextsByContextRequest,
    ) -> Result<GetChildrenContextsByContextResponse, StoreError> {
        self.executor
            .execute(
                &mut self.access,
                request,
                &request.transaction_options,
                |access, request| {
                    Box::pin(async move {
                        let contexts = access
                            .find_child_contexts_by_context_id(request.context_id)
                            .await?;
                        Ok(GetChildrenContextsByContextResponse { contexts })
                    })
                },
            )
            .await
    }

    /// Bounded breadth-limited neighborhood expansion from a filtered seed
    /// set of artifacts.
    pub async fn get_lineage_graph(
        &mut self,
        request: &GetLineageGraphRequest,
    ) -> Result<GetLineageGraphResponse, StoreError> {
        if request.options.query_nodes.is_none() {
            return Err(StoreError::invalid_argument(
                "missing query_nodes conditions".to_owned(),
            ));
        }
        let max_num_hops = match request.options.stop_conditions.max_num_hops {
            Some(hops) if hops < 0 => {
                return Err(StoreError::invalid_argument(format!(
                    "max_num_hops cannot be negative: max_num_hops = {}",
                    hops
                )))
            }
            Some(hops) if hops > MAX_LINEAGE_HOPS => {
                log::warn!(
                    "stop_conditions.max_num_hops: {} is greater than the maximum value \
                     allowed: {}; using {} instead to limit the size of the traversal",
                    hops,
                    MAX_LINEAGE_HOPS,
                    MAX_LINEAGE_HOPS
                );
                MAX_LINEAGE_HOPS
            }
            Some(hops) => hops,
            None => {
                log::info!(
                    "stop_conditions.max_num_hops is not set; using the maximum value {} \
                     to limit the size of the traversal",
                    MAX_LINEAGE_HOPS
                );
                MAX_LINEAGE_HOPS
            }
        };
        let ctx = (request, max_num_hops);
        self.executor
            .execute(
                &mut self.access,
                &ctx,
                &request.transaction_options,
                |access, ctx| Box::pin(run_get_lineage_graph(access, ctx)),
            )
            .await
    }
}

// Transaction bodies. Each runs inside one transaction opened by the
// executor; returning an error rolls the whole operation back.

async fn run_downgrade(access: &mut AccessObject, target: &i64) -> Result<(), StoreError> {
    access.downgrade_metadata_source(*target).await
}

async fn run_init(access: &mut AccessObject) -> Result<(), StoreError> {
    access.init_metadata_source().await
}

async fn run_init_if_not_exists(
    access: &mut AccessObject,
    enable_upgrade_migration: &bool,
) -> Result<(), StoreError> {
    access
        .init_metadata_source_if_not_exists(*enable_upgrade_migration)
        .await
}

async fn run_upsert_simple_types(access: &mut AccessObject) -> Result<(), StoreError> {
    for ty in simple_types::simple_artifact_types() {
        types::upsert_type(access, &ty, true, true).await?;
    }
    for ty in simple_types::simple_execution_types() {
        types::upsert_type(access, &ty, true, true).await?;
    }
    Ok(())
}

async fn run_put_types(
    access: &mut AccessObject,
    request: &PutTypesRequest,
) -> Result<PutTypesResponse, StoreError> {
    let mut response = PutTypesResponse::default();
    for ty in &request.artifact_types {
        response.artifact_type_ids.push(
            types::upsert_type(access, ty, request.can_add_fields, request.can_omit_fields)
                .await?,
        );
    }
    for ty in &request.execution_types {
        response.execution_type_ids.push(
            types::upsert_type(access, ty, request.can_add_fields, request.can_omit_fields)
                .await?,
        );
    }
    for ty in &request.context_types {
        response.context_type_ids.push(
            types::upsert_type(access, ty, request.can_add_fields, request.can_omit_fields)
                .await?,
        );
    }
    Ok(response)
}

async fn find_types_by_id<T: PropertiedType>(
    access: &mut AccessObject,
    type_ids: &[crate::metadata::TypeId],
) -> Result<Vec<T>, StoreError> {
    let mut found = Vec::with_capacity(type_ids.len());
    for type_id in type_ids {
        match access.find_type_by_id::<T>(*type_id).await {
            Ok(ty) => found.push(ty),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(found)
}

async fn run_get_artifact_type(
    access: &mut AccessObject,
    request: &GetArtifactTypeRequest,
) -> Result<GetArtifactTypeResponse, StoreError> {
    let mut found: Vec<ArtifactType> = match access
        .find_type_by_name_and_version(&request.type_name, request.type_version.as_deref())
        .await
    {
        Ok(ty) => vec![ty],
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e),
    };
    types::set_base_types(access, &mut found).await?;
    Ok(GetArtifactTypeResponse {
        artifact_type: found.pop(),
    })
}

async fn run_get_execution_type(
    access: &mut AccessObject,
    request: &GetExecutionTypeRequest,
) -> Result<GetExecutionTypeResponse, StoreError> {
    let mut found: Vec<ExecutionType> = match access
        .find_type_by_name_and_version(&request.type_name, request.type_version.as_deref())
        .await
    {
        Ok(ty) => vec![ty],
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e),
    };
    types::set_base_types(access, &mut found).await?;
    Ok(GetExecutionTypeResponse {
        execution_type: found.pop(),
    })
}

async fn run_get_context_type(
    access: &mut AccessObject,
    request: &GetContextTypeRequest,
) -> Result<GetContextTypeResponse, StoreError> {
    let context_type = match access
        .find_type_by_name_and_version(&request.type_name, request.type_version.as_deref())
        .await
    {
        Ok(ty) => Some(ty),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    Ok(GetContextTypeResponse { context_type })
}

async fn upsert_artifact(
    access: &mut AccessObject,
    artifact: &Artifact,
) -> Result<Id, StoreError> {
    match artifact.id {
        Some(id) => {
            access.update_artifact(artifact).await?;
            Ok(id)
        }
        None => access.create_artifact(artifact).await,
    }
}

async fn upsert_execution(
    access: &mut AccessObject,
    execution: &Execution,
) -> Result<Id, StoreError> {
    match execution.id {
        Some(id) => {
            access.update_execution(execution).await?;
            Ok(id)
        }
        None => access.create_execution(execution).await,
    }
}

async fn upsert_context(access: &mut AccessObject, context: &Context) -> Result<Id, StoreError> {
    match context.id {
        Some(id) => {
            access.update_context(context).await?;
            Ok(id)
        }
        None => access.create_context(context).await,
    }
}

async fn insert_attribution_if_not_exist(
    access: &mut AccessObject,
    context_id: Id,
    artifact_id: Id,
) -> Result<(), StoreError> {
    match access.create_attribution(context_id, artifact_id).await {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}

async fn insert_association_if_not_exist(
    access: &mut AccessObject,
    context_id: Id,
    execution_id: Id,
) -> Result<(), StoreError> {
    match access.create_association(context_id, execution_id).await {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}

async fn run_put_artifacts(
    access: &mut AccessObject,
    request: &PutArtifactsRequest,
) -> Result<PutArtifactsResponse, StoreError> {
    let mut artifact_ids = Vec::with_capacity(request.artifacts.len());
    for artifact in &request.artifacts {
        if request.options.abort_if_latest_updated_time_changed {
            if let Some(id) = artifact.id {
                let stored = access.find_artifacts_by_id(&[id]).await?;
                if let Some(stored) = stored.first() {
                    if stored.last_update_time_since_epoch != artifact.last_update_time_since_epoch
                    {
                        return Err(StoreError::FailedPrecondition(format!(
                            "abort_if_latest_updated_time_changed is set, and the stored \
                             artifact with id = {} has a different last_update_time_since_epoch \
                             ({:?}) from the one in the given artifact ({:?})",
                            id,
                            stored.last_update_time_since_epoch,
                            artifact.last_update_time_since_epoch
                        )));
                    }
                    // The monotonic update expression already guarantees the
                    // post-update timestamp strictly increases.
                }
            }
        }
        artifact_ids.push(upsert_artifact(access, artifact).await?);
    }
    Ok(PutArtifactsResponse { artifact_ids })
}

/// Upserts one (artifact, event) pair of the composite write and returns
/// the artifact id the pair contributes to the response.
async fn upsert_artifact_and_event(
    access: &mut AccessObject,
    pair: &ArtifactAndEvent,
    execution_id: Id,
) -> Result<Option<Id>, StoreError> {
    if pair.artifact.is_none() && pair.event.is_none() {
        return Ok(None);
    }
    let event_artifact_id = pair.event.as_ref().and_then(|event| event.artifact_id);
    if pair.artifact.is_none() && event_artifact_id.is_none() {
        return Err(StoreError::invalid_argument(
            "if no artifact is present, the given event must have an artifact_id".to_owned(),
        ));
    }
    if let Some(artifact) = &pair.artifact {
        if event_artifact_id.is_some() && artifact.id != event_artifact_id {
            return Err(StoreError::invalid_argument(format!(
                "the event's artifact_id {:?} is not aligned with the artifact's id {:?}",
                event_artifact_id, artifact.id
            )));
        }
    }
    let mut artifact_id = event_artifact_id;
    if let Some(artifact) = &pair.artifact {
        artifact_id = Some(upsert_artifact(access, artifact).await?);
    }
    if let Some(event) = &pair.event {
        let mut event = event.clone();
        event.execution_id = Some(execution_id);
        event.artifact_id = artifact_id;
        access.create_event(&event).await?;
    }
    Ok(artifact_id)
}

async fn run_put_execution(
    access: &mut AccessObject,
    request: &PutExecutionRequest,
) -> Result<PutExecutionResponse, StoreError> {
    let execution = request.execution.as_ref().ok_or_else(|| {
        StoreError::invalid_argument("no execution is found in the request".to_owned())
    })?;
    // 1. Upsert the execution.
    let execution_id = upsert_execution(access, execution).await?;
    // 2. Upsert artifacts and insert events.
    let mut artifact_ids = Vec::with_capacity(request.artifact_event_pairs.len());
    for pair in &request.artifact_event_pairs {
        if let Some(event) = &pair.event {
            if let Some(event_execution_id) = event.execution_id {
                if execution.id != Some(event_execution_id) {
                    return Err(StoreError::invalid_argument(format!(
                        "the event's execution_id {} does not match the given execution",
                        event_execution_id
                    )));
                }
            }
        }
        artifact_ids.push(upsert_artifact_and_event(access, pair, execution_id).await?);
    }
    // 3. Upsert contexts and insert associations and attributions.
    let mut context_ids = Vec::with_capacity(request.contexts.len());
    for context in &request.contexts {
        let mut reused_context_id = None;
        if request.options.reuse_context_if_already_exist && context.id.is_none() {
            match access
                .find_context_by_type_id_and_name(context.type_id, &context.name)
                .await
            {
                Ok(existing) => reused_context_id = existing.id,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        let context_id = match reused_context_id {
            Some(id) => id,
            None => match upsert_context(access, context).await {
                Ok(id) => id,
                // Concurrent creation of the same new context: let the
                // client retry the transaction and take the reuse branch.
                Err(e)
                    if request.options.reuse_context_if_already_exist
                        && e.is_already_exists() =>
                {
                    return Err(StoreError::Aborted(format!(
                        "concurrent creation of the same context {:?} at the first time; \
                         retry the transaction to reuse the context",
                        context.name
                    )))
                }
                Err(e) => return Err(e),
            },
        };
        context_ids.push(context_id);
        insert_association_if_not_exist(access, context_id, execution_id).await?;
        for artifact_id in artifact_ids.iter().flatten() {
            insert_attribution_if_not_exist(access, context_id, *artifact_id).await?;
        }
    }
    Ok(PutExecutionResponse {
        execution_id: Some(execution_id),
        artifact_ids,
        context_ids,
    })
}

async fn run_get_artifacts_by_uri(
    access: &mut AccessObject,
    request: &GetArtifactsByUriRequest,
) -> Result<GetArtifactsByUriResponse, StoreError> {
    let uris: std::collections::BTreeSet<&String> = request.uris.iter().collect();
    let mut artifacts = Vec::new();
    for uri in uris {
        artifacts.extend(access.find_artifacts_by_uri(uri.as_str()).await?);
    }
    Ok(GetArtifactsByUriResponse { artifacts })
}

async fn resolve_type_id(
    access: &mut AccessObject,
    kind: TypeKind,
    type_name: &str,
    type_version: Option<&str>,
) -> Result<Option<crate::metadata::TypeId>, StoreError> {
    match access
        .find_type_id_by_name_and_version(kind, type_name, type_version)
        .await
    {
        Ok(type_id) => Ok(Some(type_id)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn run_get_artifacts_by_type(
    access: &mut AccessObject,
    request: &GetArtifactsByTypeRequest,
) -> Result<GetArtifactsByTypeResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Artifact,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetArtifactsByTypeResponse::default()),
    };
    let (artifacts, next_page_token) = access
        .find_artifacts_by_type_id(type_id, request.options.as_ref())
        .await?;
    Ok(GetArtifactsByTypeResponse {
        artifacts,
        next_page_token,
    })
}

async fn run_get_executions_by_type(
    access: &mut AccessObject,
    request: &GetExecutionsByTypeRequest,
) -> Result<GetExecutionsByTypeResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Execution,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetExecutionsByTypeResponse::default()),
    };
    let (executions, next_page_token) = access
        .find_executions_by_type_id(type_id, request.options.as_ref())
        .await?;
    Ok(GetExecutionsByTypeResponse {
        executions,
        next_page_token,
    })
}

async fn run_get_contexts_by_type(
    access: &mut AccessObject,
    request: &GetContextsByTypeRequest,
) -> Result<GetContextsByTypeResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Context,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetContextsByTypeResponse::default()),
    };
    let (contexts, next_page_token) = access
        .find_contexts_by_type_id(type_id, request.options.as_ref())
        .await?;
    Ok(GetContextsByTypeResponse {
        contexts,
        next_page_token,
    })
}

async fn run_get_artifact_by_type_and_name(
    access: &mut AccessObject,
    request: &GetArtifactByTypeAndNameRequest,
) -> Result<GetArtifactByTypeAndNameResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Artifact,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetArtifactByTypeAndNameResponse::default()),
    };
    let artifact = match access
        .find_artifact_by_type_id_and_name(type_id, &request.artifact_name)
        .await
    {
        Ok(artifact) => Some(artifact),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    Ok(GetArtifactByTypeAndNameResponse { artifact })
}

async fn run_get_execution_by_type_and_name(
    access: &mut AccessObject,
    request: &GetExecutionByTypeAndNameRequest,
) -> Result<GetExecutionByTypeAndNameResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Execution,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetExecutionByTypeAndNameResponse::default()),
    };
    let execution = match access
        .find_execution_by_type_id_and_name(type_id, &request.execution_name)
        .await
    {
        Ok(execution) => Some(execution),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    Ok(GetExecutionByTypeAndNameResponse { execution })
}

async fn run_get_context_by_type_and_name(
    access: &mut AccessObject,
    request: &GetContextByTypeAndNameRequest,
) -> Result<GetContextByTypeAndNameResponse, StoreError> {
    let type_id = match resolve_type_id(
        access,
        TypeKind::Context,
        &request.type_name,
        request.type_version.as_deref(),
    )
    .await?
    {
        Some(type_id) => type_id,
        None => return Ok(GetContextByTypeAndNameResponse::default()),
    };
    let context = match access
        .find_context_by_type_id_and_name(type_id, &request.context_name)
        .await
    {
        Ok(context) => Some(context),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    Ok(GetContextByTypeAndNameResponse { context })
}

async fn run_get_lineage_graph(
    access: &mut AccessObject,
    ctx: &(&GetLineageGraphRequest, i64),
) -> Result<GetLineageGraphResponse, StoreError> {
    let (request, max_num_hops) = ctx;
    let options = &request.options;
    let query_nodes = options.query_nodes.as_ref().ok_or_else(|| {
        StoreError::invalid_argument("missing query_nodes conditions".to_owned())
    })?;
    let (mut seeds, _) = access.list_artifacts(query_nodes).await?;
    if seeds.is_empty() {
        return Err(StoreError::not_found(
            "the query_nodes condition does not match any nodes to do traversal".to_owned(),
        ));
    }
    if options.max_node_size > 0 && seeds.len() as i64 > options.max_node_size {
        seeds.truncate(options.max_node_size as usize);
    }
    let subgraph = access
        .query_lineage_graph(
            &seeds,
            *max_num_hops,
            (options.max_node_size > 0).then(|| options.max_node_size),
            options.stop_conditions.boundary_artifacts.as_deref(),
            options.stop_conditions.boundary_executions.as_deref(),
        )
        .await?;
    Ok(GetLineageGraphResponse { subgraph })
}
