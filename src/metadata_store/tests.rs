use super::*;
use crate::errors::StoreError;
use crate::metadata::{
    Artifact, ArtifactBaseType, ArtifactState, ArtifactType, Association, Attribution, Context,
    ContextType, Event, EventStep, EventType, Execution, ExecutionState, ExecutionType, Id,
    ParentContext, PropertyType, TypeId,
};
use tempfile::NamedTempFile;

fn sqlite_uri(path: impl AsRef<std::path::Path>) -> String {
    format!(
        "sqlite://{}",
        path.as_ref()
            .to_str()
            .expect("temporary file path is not valid UTF-8")
    )
}

async fn new_store() -> anyhow::Result<(NamedTempFile, MetadataStore)> {
    let file = NamedTempFile::new()?;
    let store = MetadataStore::new(&sqlite_uri(file.path())).await?;
    Ok((file, store))
}

async fn put_artifact_type(
    store: &mut MetadataStore,
    ty: ArtifactType,
) -> Result<TypeId, StoreError> {
    store
        .put_artifact_type(&PutArtifactTypeRequest::new(ty))
        .await
        .map(|response| response.type_id)
}

async fn fetch_artifact(store: &mut MetadataStore, id: Id) -> anyhow::Result<Artifact> {
    let mut artifacts = store
        .get_artifacts_by_id(&GetArtifactsByIdRequest {
            artifact_ids: vec![id],
            ..GetArtifactsByIdRequest::default()
        })
        .await?
        .artifacts;
    anyhow::ensure!(!artifacts.is_empty(), "artifact {} is missing", id);
    Ok(artifacts.remove(0))
}

#[async_std::test]
async fn initialization_works() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    MetadataStore::new(&sqlite_uri(file.path())).await?;

    // Reopening an existing database is fine.
    MetadataStore::new(&sqlite_uri(file.path())).await?;

    Ok(())
}

#[async_std::test]
async fn init_if_not_exists_is_idempotent() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let mut store =
        MetadataStore::connect(&sqlite_uri(file.path()), ConnectionOptions::default()).await?;
    store.init_metadata_store_if_not_exists(false).await?;
    store.init_metadata_store_if_not_exists(false).await?;
    store.init_metadata_store_if_not_exists(true).await?;
    Ok(())
}

#[async_std::test]
async fn put_artifact_type_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let t0 = put_artifact_type(
        &mut store,
        ArtifactType::new("t0").property("p0", PropertyType::Int),
    )
    .await?;

    assert!(matches!(
        put_artifact_type(
            &mut store,
            ArtifactType::new("t0").property("p0", PropertyType::Double),
        )
        .await,
        Err(StoreError::AlreadyExists(_))
    ));

    assert!(matches!(
        put_artifact_type(
            &mut store,
            ArtifactType::new("t0")
                .property("p0", PropertyType::Int)
                .property("p1", PropertyType::String),
        )
        .await,
        Err(StoreError::AlreadyExists(_))
    ));
    let widened = store
        .put_artifact_type(
            &PutArtifactTypeRequest::new(
                ArtifactType::new("t0")
                    .property("p0", PropertyType::Int)
                    .property("p1", PropertyType::String),
            )
            .can_add_fields(),
        )
        .await?;
    assert_eq!(widened.type_id, t0);

    assert!(matches!(
        put_artifact_type(&mut store, ArtifactType::new("t0")).await,
        Err(StoreError::AlreadyExists(_))
    ));
    store
        .put_artifact_type(
            &PutArtifactTypeRequest::new(ArtifactType::new("t0")).can_omit_fields(),
        )
        .await?;

    let t1 = put_artifact_type(&mut store, ArtifactType::new("t1")).await?;
    assert_ne!(t0, t1);

    Ok(())
}

#[async_std::test]
async fn artifact_type_widening_is_observable() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let first = store
        .put_artifact_type(
            &PutArtifactTypeRequest::new(
                ArtifactType::new("Img").property("u", PropertyType::String),
            )
            .can_add_fields(),
        )
        .await?;
    let second = store
        .put_artifact_type(
            &PutArtifactTypeRequest::new(
                ArtifactType::new("Img")
                    .property("u", PropertyType::String)
                    .property("w", PropertyType::Int),
            )
            .can_add_fields()
            .can_omit_fields(),
        )
        .await?;
    assert_eq!(first.type_id, second.type_id);

    let fetched = store
        .get_artifact_type(&GetArtifactTypeRequest::new("Img"))
        .await?
        .artifact_type
        .expect("the type must exist");
    assert_eq!(fetched.properties.len(), 2);
    assert_eq!(fetched.properties["u"], PropertyType::String);
    assert_eq!(fetched.properties["w"], PropertyType::Int);

    assert!(matches!(
        put_artifact_type(
            &mut store,
            ArtifactType::new("Img").property("u", PropertyType::Int),
        )
        .await,
        Err(StoreError::AlreadyExists(_))
    ));

    Ok(())
}

#[async_std::test]
async fn put_types_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let response = store
        .put_types(&PutTypesRequest {
            artifact_types: vec![ArtifactType::new("a").property("p", PropertyType::String)],
            execution_types: vec![ExecutionType::new("e")],
            context_types: vec![ContextType::new("c")],
            ..PutTypesRequest::default()
        })
        .await?;
    assert_eq!(response.artifact_type_ids.len(), 1);
    assert_eq!(response.execution_type_ids.len(), 1);
    assert_eq!(response.context_type_ids.len(), 1);

    assert!(matches!(
        store
            .put_types(&PutTypesRequest {
                all_fields_match: false,
                ..PutTypesRequest::default()
            })
            .await,
        Err(StoreError::Unimplemented(_))
    ));

    Ok(())
}

#[async_std::test]
async fn type_versions_are_distinct_namespaces() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let v1 = put_artifact_type(&mut store, ArtifactType::new("T").version("1")).await?;
    let v2 = put_artifact_type(&mut store, ArtifactType::new("T").version("2")).await?;
    let unversioned = put_artifact_type(&mut store, ArtifactType::new("T")).await?;
    assert_ne!(v1, v2);
    assert_ne!(v1, unversioned);

    let fetched = store
        .get_artifact_type(&GetArtifactTypeRequest::new("T").version("2"))
        .await?
        .artifact_type
        .expect("version 2 must exist");
    assert_eq!(fetched.id, Some(v2));

    // The empty version string is coerced to "no version".
    let fetched = store
        .get_artifact_type(&GetArtifactTypeRequest::new("T").version(""))
        .await?
        .artifact_type
        .expect("the unversioned type must exist");
    assert_eq!(fetched.id, Some(unversioned));

    Ok(())
}

#[async_std::test]
async fn base_type_link_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let with_base = ArtifactType::new("MyModel").base_type(ArtifactBaseType::Model);
    let first = put_artifact_type(&mut store, with_base.clone()).await?;

    // Upserting the same base again is a no-op.
    let second = put_artifact_type(&mut store, with_base).await?;
    assert_eq!(first, second);

    let fetched = store
        .get_artifact_type(&GetArtifactTypeRequest::new("MyModel"))
        .await?
        .artifact_type
        .expect("the type must exist");
    assert_eq!(fetched.base_type, Some(ArtifactBaseType::Model));

    // Changing the base and deleting it are unsupported.
    assert!(matches!(
        put_artifact_type(
            &mut store,
            ArtifactType::new("MyModel").base_type(ArtifactBaseType::Dataset),
        )
        .await,
        Err(StoreError::Unimplemented(_))
    ));
    assert!(matches!(
        put_artifact_type(
            &mut store,
            ArtifactType::new("MyModel").base_type(ArtifactBaseType::Unset),
        )
        .await,
        Err(StoreError::Unimplemented(_))
    ));

    Ok(())
}

#[async_std::test]
async fn get_types_excludes_the_simple_type_catalog() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    put_artifact_type(&mut store, ArtifactType::new("user-type")).await?;

    let types = store
        .get_artifact_types(&GetArtifactTypesRequest::default())
        .await?
        .artifact_types;
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "user-type");

    let types = store
        .get_execution_types(&GetExecutionTypesRequest::default())
        .await?
        .execution_types;
    assert!(types.is_empty());

    Ok(())
}

#[async_std::test]
async fn get_types_by_id_ignores_missing_ids() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let t0 = put_artifact_type(&mut store, ArtifactType::new("t0")).await?;
    let types = store
        .get_artifact_types_by_id(&GetArtifactTypesByIdRequest {
            type_ids: vec![t0, TypeId::new(12345)],
            ..GetArtifactTypesByIdRequest::default()
        })
        .await?
        .artifact_types;
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "t0");

    Ok(())
}

#[async_std::test]
async fn put_and_get_artifacts_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(
        &mut store,
        ArtifactType::new("DataSet")
            .property("day", PropertyType::Int)
            .property("split", PropertyType::String),
    )
    .await?;

    let artifact = Artifact::new(type_id)
        .uri("path/to/data")
        .name("train-set")
        .state(ArtifactState::Live)
        .property("day", 1i64)
        .property("split", "train")
        .custom_property("annotation", serde_json::json!({"labels": ["cat", "dog"]}));
    let response = store
        .put_artifacts(&PutArtifactsRequest::new(vec![artifact.clone()]))
        .await?;
    assert_eq!(response.artifact_ids.len(), 1);
    let id = response.artifact_ids[0];

    let fetched = store
        .get_artifacts_by_id(&GetArtifactsByIdRequest {
            artifact_ids: vec![id],
            ..GetArtifactsByIdRequest::default()
        })
        .await?
        .artifacts;
    assert_eq!(fetched.len(), 1);
    let fetched = &fetched[0];
    assert_eq!(fetched.id, Some(id));
    assert_eq!(fetched.type_id, type_id);
    assert_eq!(fetched.uri.as_deref(), Some("path/to/data"));
    assert_eq!(fetched.name.as_deref(), Some("train-set"));
    assert_eq!(fetched.state, ArtifactState::Live);
    assert_eq!(fetched.properties, artifact.properties);
    assert_eq!(fetched.custom_properties, artifact.custom_properties);
    assert!(fetched.create_time_since_epoch.as_millis() > 0);

    // By type.
    let by_type = store
        .get_artifacts_by_type(&GetArtifactsByTypeRequest::new("DataSet"))
        .await?
        .artifacts;
    assert_eq!(by_type.len(), 1);

    // By type and name.
    let by_name = store
        .get_artifact_by_type_and_name(&GetArtifactByTypeAndNameRequest::new(
            "DataSet",
            "train-set",
        ))
        .await?
        .artifact;
    assert_eq!(by_name.as_ref().and_then(|a| a.id), Some(id));

    // Unknown ids, types and names are empty results, not errors.
    assert!(store
        .get_artifacts_by_id(&GetArtifactsByIdRequest {
            artifact_ids: vec![crate::metadata::Id::new(777)],
            ..GetArtifactsByIdRequest::default()
        })
        .await?
        .artifacts
        .is_empty());
    assert!(store
        .get_artifacts_by_type(&GetArtifactsByTypeRequest::new("NoSuchType"))
        .await?
        .artifacts
        .is_empty());
    assert!(store
        .get_artifact_by_type_and_name(&GetArtifactByTypeAndNameRequest::new(
            "DataSet",
            "no-such-artifact",
        ))
        .await?
        .artifact
        .is_none());

    Ok(())
}

#[async_std::test]
async fn artifact_name_conflicts_are_rejected() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(&mut store, ArtifactType::new("t")).await?;
    store
        .put_artifacts(&PutArtifactsRequest::new(vec![
            Artifact::new(type_id).name("foo"),
        ]))
        .await?;
    assert!(matches!(
        store
            .put_artifacts(&PutArtifactsRequest::new(vec![
                Artifact::new(type_id).name("foo"),
            ]))
            .await,
        Err(StoreError::AlreadyExists(_))
    ));

    Ok(())
}

#[async_std::test]
async fn undefined_properties_are_rejected() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(
        &mut store,
        ArtifactType::new("t").property("day", PropertyType::Int),
    )
    .await?;

    assert!(matches!(
        store
            .put_artifacts(&PutArtifactsRequest::new(vec![
                Artifact::new(type_id).property("unknown", 1i64),
            ]))
            .await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        store
            .put_artifacts(&PutArtifactsRequest::new(vec![
                Artifact::new(type_id).property("day", "not-an-int"),
            ]))
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    // Custom properties are free-form.
    store
        .put_artifacts(&PutArtifactsRequest::new(vec![
            Artifact::new(type_id).custom_property("anything", 1.5f64),
        ]))
        .await?;

    Ok(())
}

#[async_std::test]
async fn artifact_updates_bump_the_update_timestamp() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(
        &mut store,
        ArtifactType::new("t").property("day", PropertyType::Int),
    )
    .await?;
    let id = store
        .put_artifacts(&PutArtifactsRequest::new(vec![Artifact::new(type_id)]))
        .await?
        .artifact_ids[0];

    let created = fetch_artifact(&mut store, id).await?;

    let mut update = created.clone();
    update.properties.insert("day".to_owned(), 7i64.into());
    store
        .put_artifacts(&PutArtifactsRequest::new(vec![update.clone()]))
        .await?;
    let after_first = fetch_artifact(&mut store, id).await?;
    store
        .put_artifacts(&PutArtifactsRequest::new(vec![update]))
        .await?;
    let after_second = fetch_artifact(&mut store, id).await?;

    assert_eq!(after_second.create_time_since_epoch, created.create_time_since_epoch);
    assert!(after_first.last_update_time_since_epoch > created.last_update_time_since_epoch);
    assert!(after_second.last_update_time_since_epoch > after_first.last_update_time_since_epoch);
    assert_eq!(after_second.properties["day"], 7i64.into());

    Ok(())
}

#[async_std::test]
async fn abort_if_latest_updated_time_changed_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(&mut store, ArtifactType::new("t")).await?;
    let id = store
        .put_artifacts(&PutArtifactsRequest::new(vec![Artifact::new(type_id)]))
        .await?
        .artifact_ids[0];
    let stored = store
        .get_artifacts_by_id(&GetArtifactsByIdRequest {
            artifact_ids: vec![id],
            ..GetArtifactsByIdRequest::default()
        })
        .await?
        .artifacts
        .remove(0);

    // The stored timestamp matches: the guarded update goes through.
    store
        .put_artifacts(&PutArtifactsRequest {
            artifacts: vec![stored.clone()],
            options: PutArtifactsOptions {
                abort_if_latest_updated_time_changed: true,
            },
            ..PutArtifactsRequest::default()
        })
        .await?;

    // The same request again carries a stale timestamp.
    assert!(matches!(
        store
            .put_artifacts(&PutArtifactsRequest {
                artifacts: vec![stored],
                options: PutArtifactsOptions {
                    abort_if_latest_updated_time_changed: true,
                },
                ..PutArtifactsRequest::default()
            })
            .await,
        Err(StoreError::FailedPrecondition(_))
    ));

    Ok(())
}

#[async_std::test]
async fn get_artifacts_by_uri_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(&mut store, ArtifactType::new("t")).await?;
    store
        .put_artifacts(&PutArtifactsRequest::new(vec![
            Artifact::new(type_id).uri("path/a"),
            Artifact::new(type_id).uri("path/a"),
            Artifact::new(type_id).uri("path/b"),
        ]))
        .await?;

    // Requested URIs are deduplicated and the results unioned.
    let artifacts = store
        .get_artifacts_by_uri(&GetArtifactsByUriRequest::new(&[
            "path/a", "path/a", "path/b", "path/c",
        ]))
        .await?
        .artifacts;
    assert_eq!(artifacts.len(), 3);

    // The deprecated singular field is rejected.
    let mut request = GetArtifactsByUriRequest::new(&[]);
    request.uri = Some("path/a".to_owned());
    assert!(matches!(
        store.get_artifacts_by_uri(&request).await,
        Err(StoreError::InvalidArgument(_))
    ));

    Ok(())
}

#[async_std::test]
async fn put_and_get_executions_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = store
        .put_execution_type(&PutExecutionTypeRequest::new(
            ExecutionType::new("Trainer").property("step", PropertyType::Int),
        ))
        .await?
        .type_id;

    let execution = Execution::new(type_id)
        .name("run-1")
        .last_known_state(ExecutionState::Running)
        .property("step", 10i64);
    let id = store
        .put_executions(&PutExecutionsRequest::new(vec![execution]))
        .await?
        .execution_ids[0];

    let mut fetched = store
        .get_executions_by_id(&GetExecutionsByIdRequest {
            execution_ids: vec![id],
            ..GetExecutionsByIdRequest::default()
        })
        .await?
        .executions
        .remove(0);
    assert_eq!(fetched.last_known_state, ExecutionState::Running);
    assert_eq!(fetched.properties["step"], 10i64.into());

    fetched.last_known_state = ExecutionState::Complete;
    store
        .put_executions(&PutExecutionsRequest::new(vec![fetched]))
        .await?;
    let fetched = store
        .get_execution_by_type_and_name(&GetExecutionByTypeAndNameRequest::new(
            "Trainer", "run-1",
        ))
        .await?
        .execution
        .expect("the execution must exist");
    assert_eq!(fetched.last_known_state, ExecutionState::Complete);

    Ok(())
}

#[async_std::test]
async fn put_and_get_contexts_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = store
        .put_context_type(&PutContextTypeRequest::new(
            ContextType::new("Experiment").property("note", PropertyType::String),
        ))
        .await?
        .type_id;

    let id = store
        .put_contexts(&PutContextsRequest::new(vec![
            Context::new(type_id, "exp-1").property("note", "first"),
        ]))
        .await?
        .context_ids[0];

    // (type_id, name) is unique among contexts.
    assert!(matches!(
        store
            .put_contexts(&PutContextsRequest::new(vec![Context::new(type_id, "exp-1")]))
            .await,
        Err(StoreError::AlreadyExists(_))
    ));

    let mut fetched = store
        .get_context_by_type_and_name(&GetContextByTypeAndNameRequest::new(
            "Experiment",
            "exp-1",
        ))
        .await?
        .context
        .expect("the context must exist");
    assert_eq!(fetched.id, Some(id));

    // Renaming is allowed; moving to another type is not.
    fetched.name = "exp-renamed".to_owned();
    store
        .put_contexts(&PutContextsRequest::new(vec![fetched.clone()]))
        .await?;
    let other_type = store
        .put_context_type(&PutContextTypeRequest::new(ContextType::new("Other")))
        .await?
        .type_id;
    fetched.type_id = other_type;
    assert!(matches!(
        store
            .put_contexts(&PutContextsRequest::new(vec![fetched]))
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    Ok(())
}

#[async_std::test]
async fn put_events_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let artifact_type = put_artifact_type(&mut store, ArtifactType::new("a")).await?;
    let execution_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("e")))
        .await?
        .type_id;
    let artifact_id = store
        .put_artifacts(&PutArtifactsRequest::new(vec![Artifact::new(artifact_type)]))
        .await?
        .artifact_ids[0];
    let execution_id = store
        .put_executions(&PutExecutionsRequest::new(vec![Execution::new(
            execution_type,
        )]))
        .await?
        .execution_ids[0];

    let event = Event::new(EventType::Input)
        .artifact_id(artifact_id)
        .execution_id(execution_id)
        .step(EventStep::Index(3))
        .step(EventStep::Key("features".to_owned()));
    store
        .put_events(&PutEventsRequest::new(vec![event]))
        .await?;

    let events = store
        .get_events_by_artifact_ids(&GetEventsByArtifactIdsRequest {
            artifact_ids: vec![artifact_id],
            ..GetEventsByArtifactIdsRequest::default()
        })
        .await?
        .events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ty, EventType::Input);
    assert_eq!(
        events[0].path,
        vec![EventStep::Index(3), EventStep::Key("features".to_owned())]
    );

    let events = store
        .get_events_by_execution_ids(&GetEventsByExecutionIdsRequest {
            execution_ids: vec![execution_id],
            ..GetEventsByExecutionIdsRequest::default()
        })
        .await?
        .events;
    assert_eq!(events.len(), 1);

    // Duplicate events are rejected at the storage layer.
    assert!(matches!(
        store
            .put_events(&PutEventsRequest::new(vec![Event::new(EventType::Input)
                .artifact_id(artifact_id)
                .execution_id(execution_id)]))
            .await,
        Err(StoreError::AlreadyExists(_))
    ));

    // An event referencing a missing endpoint is invalid.
    assert!(matches!(
        store
            .put_events(&PutEventsRequest::new(vec![Event::new(EventType::Output)
                .artifact_id(crate::metadata::Id::new(999))
                .execution_id(execution_id)]))
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    Ok(())
}

#[async_std::test]
async fn attributions_and_associations_are_idempotent() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let artifact_type = put_artifact_type(&mut store, ArtifactType::new("a")).await?;
    let execution_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("e")))
        .await?
        .type_id;
    let context_type = store
        .put_context_type(&PutContextTypeRequest::new(ContextType::new("c")))
        .await?
        .type_id;

    let artifact_id = store
        .put_artifacts(&PutArtifactsRequest::new(vec![Artifact::new(artifact_type)]))
        .await?
        .artifact_ids[0];
    let execution_id = store
        .put_executions(&PutExecutionsRequest::new(vec![Execution::new(
            execution_type,
        )]))
        .await?
        .execution_ids[0];
    let context_id = store
        .put_contexts(&PutContextsRequest::new(vec![Context::new(
            context_type,
            "ctx",
        )]))
        .await?
        .context_ids[0];

    let request = PutAttributionsAndAssociationsRequest {
        attributions: vec![Attribution {
            context_id,
            artifact_id,
        }],
        associations: vec![Association {
            context_id,
            execution_id,
        }],
        ..PutAttributionsAndAssociationsRequest::default()
    };
    store.put_attributions_and_associations(&request).await?;
    // Re-inserting the same links is a silent success.
    store.put_attributions_and_associations(&request).await?;

    let contexts = store
        .get_contexts_by_artifact(&GetContextsByArtifactRequest::new(artifact_id))
        .await?
        .contexts;
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].id, Some(context_id));

    let contexts = store
        .get_contexts_by_execution(&GetContextsByExecutionRequest::new(execution_id))
        .await?
        .contexts;
    assert_eq!(contexts.len(), 1);

    let artifacts = store
        .get_artifacts_by_context(&GetArtifactsByContextRequest::new(context_id))
        .await?
        .artifacts;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].id, Some(artifact_id));

    let executions = store
        .get_executions_by_context(&GetExecutionsByContextRequest::new(context_id))
        .await?
        .executions;
    assert_eq!(executions.len(), 1);

    Ok(())
}

#[async_std::test]
async fn parent_contexts_work() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let context_type = store
        .put_context_type(&PutContextTypeRequest::new(ContextType::new("c")))
        .await?
        .type_id;
    let ids = store
        .put_contexts(&PutContextsRequest::new(vec![
            Context::new(context_type, "parent"),
            Context::new(context_type, "child"),
        ]))
        .await?
        .context_ids;
    let (parent, child) = (ids[0], ids[1]);

    let request = PutParentContextsRequest {
        parent_contexts: vec![ParentContext {
            child_id: child,
            parent_id: parent,
        }],
        ..PutParentContextsRequest::default()
    };
    store.put_parent_contexts(&request).await?;
    // Re-inserting the same edge is a silent success.
    store.put_parent_contexts(&request).await?;

    let parents = store
        .get_parent_contexts_by_context(&GetParentContextsByContextRequest::new(child))
        .await?
        .contexts;
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, Some(parent));

    let children = store
        .get_children_contexts_by_context(&GetChildrenContextsByContextRequest::new(parent))
        .await?
        .contexts;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, Some(child));

    Ok(())
}

#[async_std::test]
async fn put_execution_records_a_complete_step() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let artifact_type = put_artifact_type(&mut store, ArtifactType::new("Model")).await?;
    let execution_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("Trainer")))
        .await?
        .type_id;
    let context_type = store
        .put_context_type(&PutContextTypeRequest::new(ContextType::new("Run")))
        .await?
        .type_id;

    let response = store
        .put_execution(&PutExecutionRequest {
            execution: Some(Execution::new(execution_type)),
            artifact_event_pairs: vec![ArtifactAndEvent {
                artifact: Some(Artifact::new(artifact_type).uri("x")),
                event: Some(Event::new(EventType::Output)),
            }],
            contexts: vec![Context::new(context_type, "run-42")],
            options: PutExecutionOptions {
                reuse_context_if_already_exist: true,
            },
            ..PutExecutionRequest::default()
        })
        .await?;

    let execution_id = response.execution_id.expect("an execution id is returned");
    assert_eq!(response.artifact_ids.len(), 1);
    let artifact_id = response.artifact_ids[0].expect("the pair carries an artifact");
    assert_eq!(response.context_ids.len(), 1);
    let context_id = response.context_ids[0];

    // The event is wired to the new ids.
    let events = store
        .get_events_by_execution_ids(&GetEventsByExecutionIdsRequest {
            execution_ids: vec![execution_id],
            ..GetEventsByExecutionIdsRequest::default()
        })
        .await?
        .events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].artifact_id, Some(artifact_id));
    assert_eq!(events[0].execution_id, Some(execution_id));
    assert_eq!(events[0].ty, EventType::Output);

    // The context is attributed and associated.
    let contexts = store
        .get_contexts_by_artifact(&GetContextsByArtifactRequest::new(artifact_id))
        .await?
        .contexts;
    assert_eq!(contexts[0].id, Some(context_id));

    // A later step reuses the committed context.
    let second = store
        .put_execution(&PutExecutionRequest {
            execution: Some(Execution::new(execution_type)),
            contexts: vec![Context::new(context_type, "run-42")],
            options: PutExecutionOptions {
                reuse_context_if_already_exist: true,
            },
            ..PutExecutionRequest::default()
        })
        .await?;
    assert_eq!(second.context_ids, vec![context_id]);

    // Without the reuse flag, the same new context is a conflict.
    assert!(matches!(
        store
            .put_execution(&PutExecutionRequest {
                execution: Some(Execution::new(execution_type)),
                contexts: vec![Context::new(context_type, "run-42")],
                ..PutExecutionRequest::default()
            })
            .await,
        Err(StoreError::AlreadyExists(_))
    ));

    Ok(())
}

#[async_std::test]
async fn put_execution_validates_its_request() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let artifact_type = put_artifact_type(&mut store, ArtifactType::new("a")).await?;
    let execution_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("e")))
        .await?
        .type_id;

    // The execution is required.
    assert!(matches!(
        store.put_execution(&PutExecutionRequest::default()).await,
        Err(StoreError::InvalidArgument(_))
    ));

    // An event without an artifact must carry an artifact_id.
    assert!(matches!(
        store
            .put_execution(&PutExecutionRequest {
                execution: Some(Execution::new(execution_type)),
                artifact_event_pairs: vec![ArtifactAndEvent {
                    artifact: None,
                    event: Some(Event::new(EventType::Output)),
                }],
                ..PutExecutionRequest::default()
            })
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    // Disagreeing artifact ids are rejected.
    let artifact_id = store
        .put_artifacts(&PutArtifactsRequest::new(vec![Artifact::new(artifact_type)]))
        .await?
        .artifact_ids[0];
    let existing = fetch_artifact(&mut store, artifact_id).await?;
    assert!(matches!(
        store
            .put_execution(&PutExecutionRequest {
                execution: Some(Execution::new(execution_type)),
                artifact_event_pairs: vec![ArtifactAndEvent {
                    artifact: Some(existing.clone()),
                    event: Some(
                        Event::new(EventType::Output)
                            .artifact_id(crate::metadata::Id::new(artifact_id.get() + 100)),
                    ),
                }],
                ..PutExecutionRequest::default()
            })
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    // An event whose execution_id disagrees with the execution is rejected.
    assert!(matches!(
        store
            .put_execution(&PutExecutionRequest {
                execution: Some(Execution::new(execution_type)),
                artifact_event_pairs: vec![ArtifactAndEvent {
                    artifact: Some(existing.clone()),
                    event: Some(
                        Event::new(EventType::Output)
                            .execution_id(crate::metadata::Id::new(4242)),
                    ),
                }],
                ..PutExecutionRequest::default()
            })
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    // A failed composite leaves nothing behind.
    let executions_before = store
        .get_executions(&GetExecutionsRequest::default())
        .await?
        .executions
        .len();
    let result = store
        .put_execution(&PutExecutionRequest {
            execution: Some(Execution::new(execution_type)),
            artifact_event_pairs: vec![ArtifactAndEvent {
                artifact: None,
                event: Some(
                    Event::new(EventType::Output).artifact_id(crate::metadata::Id::new(9999)),
                ),
            }],
            ..PutExecutionRequest::default()
        })
        .await;
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    let executions_after = store
        .get_executions(&GetExecutionsRequest::default())
        .await?
        .executions
        .len();
    assert_eq!(executions_before, executions_after);

    // An event-only pair with a valid artifact_id contributes that id.
    let response = store
        .put_execution(&PutExecutionRequest {
            execution: Some(Execution::new(execution_type)),
            artifact_event_pairs: vec![ArtifactAndEvent {
                artifact: None,
                event: Some(Event::new(EventType::Input).artifact_id(artifact_id)),
            }],
            ..PutExecutionRequest::default()
        })
        .await?;
    assert_eq!(response.artifact_ids, vec![Some(artifact_id)]);

    Ok(())
}

#[async_std::test]
async fn listing_pagination_works() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    let type_id = put_artifact_type(&mut store, ArtifactType::new("t")).await?;
    let artifacts = (0..5)
        .map(|i| Artifact::new(type_id).uri(&format!("path/{}", i)))
        .collect();
    store
        .put_artifacts(&PutArtifactsRequest::new(artifacts))
        .await?;

    let mut seen = Vec::new();
    let mut options = ListOptions::default().max_result_size(2);
    loop {
        let response = store
            .get_artifacts(&GetArtifactsRequest {
                options: Some(options.clone()),
                ..GetArtifactsRequest::default()
            })
            .await?;
        assert!(response.artifacts.len() <= 2);
        seen.extend(response.artifacts);
        match response.next_page_token {
            Some(token) => options = options.next_page_token(&token),
            None => break,
        }
    }
    assert_eq!(seen.len(), 5);
    let uris: Vec<_> = seen.iter().filter_map(|a| a.uri.clone()).collect();
    assert_eq!(uris, vec!["path/0", "path/1", "path/2", "path/3", "path/4"]);

    // Descending order by id.
    let response = store
        .get_artifacts(&GetArtifactsRequest {
            options: Some(
                ListOptions::default()
                    .max_result_size(2)
                    .order_by(OrderByField::Id, false),
            ),
            ..GetArtifactsRequest::default()
        })
        .await?;
    assert_eq!(
        response.artifacts[0].uri.as_deref(),
        Some("path/4"),
    );

    // Filtered listing.
    let response = store
        .get_artifacts(&GetArtifactsRequest {
            options: Some(ListOptions::default().filter_query("uri = 'path/3'")),
            ..GetArtifactsRequest::default()
        })
        .await?;
    assert_eq!(response.artifacts.len(), 1);

    // A malformed filter is an invalid argument.
    assert!(matches!(
        store
            .get_artifacts(&GetArtifactsRequest {
                options: Some(ListOptions::default().filter_query("nonsense ; --")),
                ..GetArtifactsRequest::default()
            })
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    Ok(())
}

/// Builds `a0 -> e0 -> a1 -> ... -> a{length}` and returns the store.
async fn build_chain(length: usize) -> anyhow::Result<(NamedTempFile, MetadataStore)> {
    let (file, mut store) = new_store().await?;
    let artifact_type = put_artifact_type(&mut store, ArtifactType::new("blob")).await?;
    let execution_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("step")))
        .await?
        .type_id;

    let mut previous = store
        .put_artifacts(&PutArtifactsRequest::new(vec![
            Artifact::new(artifact_type).uri("a0"),
        ]))
        .await?
        .artifact_ids[0];
    for i in 0..length {
        let response = store
            .put_execution(&PutExecutionRequest {
                execution: Some(Execution::new(execution_type)),
                artifact_event_pairs: vec![
                    ArtifactAndEvent {
                        artifact: None,
                        event: Some(Event::new(EventType::Input).artifact_id(previous)),
                    },
                    ArtifactAndEvent {
                        artifact: Some(
                            Artifact::new(artifact_type).uri(&format!("a{}", i + 1)),
                        ),
                        event: Some(Event::new(EventType::Output)),
                    },
                ],
                ..PutExecutionRequest::default()
            })
            .await?;
        previous = response.artifact_ids[1].expect("the output artifact is created");
    }
    Ok((file, store))
}

fn lineage_request(filter: &str) -> GetLineageGraphRequest {
    GetLineageGraphRequest {
        options: LineageGraphQueryOptions {
            query_nodes: Some(ListOptions::default().filter_query(filter)),
            ..LineageGraphQueryOptions::default()
        },
        ..GetLineageGraphRequest::default()
    }
}

#[async_std::test]
async fn lineage_traversal_is_clamped_to_the_hop_cap() -> anyhow::Result<()> {
    let (_file, mut store) = build_chain(25).await?;

    let mut request = lineage_request("uri = 'a0'");
    request.options.stop_conditions.max_num_hops = Some(100);
    let subgraph = store.get_lineage_graph(&request).await?.subgraph;

    // Clamped to 20 hops: a0..a20 and the 20 executions crossed on the way.
    assert_eq!(subgraph.artifacts.len(), 21);
    assert_eq!(subgraph.executions.len(), 20);
    let uris: Vec<_> = subgraph
        .artifacts
        .iter()
        .filter_map(|a| a.uri.clone())
        .collect();
    assert!(uris.contains(&"a20".to_owned()));
    assert!(!uris.contains(&"a21".to_owned()));
    // Only edges between included nodes are returned.
    assert_eq!(subgraph.events.len(), 40);
    assert_eq!(subgraph.artifact_types.len(), 1);
    assert_eq!(subgraph.execution_types.len(), 1);

    Ok(())
}

#[async_std::test]
async fn lineage_traversal_respects_small_hop_counts() -> anyhow::Result<()> {
    let (_file, mut store) = build_chain(4).await?;

    let mut request = lineage_request("uri = 'a0'");
    request.options.stop_conditions.max_num_hops = Some(2);
    let subgraph = store.get_lineage_graph(&request).await?.subgraph;
    assert_eq!(subgraph.artifacts.len(), 3);
    assert_eq!(subgraph.executions.len(), 2);

    request.options.stop_conditions.max_num_hops = Some(0);
    let subgraph = store.get_lineage_graph(&request).await?.subgraph;
    assert_eq!(subgraph.artifacts.len(), 1);
    assert!(subgraph.executions.is_empty());

    Ok(())
}

#[async_std::test]
async fn lineage_traversal_stops_at_boundary_nodes() -> anyhow::Result<()> {
    let (_file, mut store) = build_chain(4).await?;

    let mut request = lineage_request("uri = 'a0'");
    request.options.stop_conditions.max_num_hops = Some(20);
    request.options.stop_conditions.boundary_artifacts = Some("uri = 'a2'".to_owned());
    let subgraph = store.get_lineage_graph(&request).await?.subgraph;

    let uris: Vec<_> = subgraph
        .artifacts
        .iter()
        .filter_map(|a| a.uri.clone())
        .collect();
    assert_eq!(uris, vec!["a0", "a1"]);
    assert_eq!(subgraph.executions.len(), 2);

    Ok(())
}

#[async_std::test]
async fn lineage_traversal_validates_its_request() -> anyhow::Result<()> {
    let (_file, mut store) = build_chain(1).await?;

    // query_nodes is required.
    assert!(matches!(
        store
            .get_lineage_graph(&GetLineageGraphRequest::default())
            .await,
        Err(StoreError::InvalidArgument(_))
    ));

    // Negative hop counts are invalid.
    let mut request = lineage_request("uri = 'a0'");
    request.options.stop_conditions.max_num_hops = Some(-1);
    assert!(matches!(
        store.get_lineage_graph(&request).await,
        Err(StoreError::InvalidArgument(_))
    ));

    // An empty seed set is the one read that surfaces not-found.
    assert!(matches!(
        store.get_lineage_graph(&lineage_request("uri = 'nope'")).await,
        Err(StoreError::NotFound(_))
    ));

    Ok(())
}

#[async_std::test]
async fn lineage_seed_set_is_truncated_by_max_node_size() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;
    let type_id = put_artifact_type(&mut store, ArtifactType::new("t")).await?;
    store
        .put_artifacts(&PutArtifactsRequest::new(
            (0..4)
                .map(|_| Artifact::new(type_id).uri("seed"))
                .collect(),
        ))
        .await?;

    let mut request = lineage_request("uri = 'seed'");
    request.options.max_node_size = 2;
    let subgraph = store.get_lineage_graph(&request).await?.subgraph;
    assert_eq!(subgraph.artifacts.len(), 2);

    Ok(())
}

#[async_std::test]
async fn downgrade_refuses_to_return_a_usable_store() -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    MetadataStore::new(&sqlite_uri(file.path())).await?;

    let result = MetadataStore::connect(
        &sqlite_uri(file.path()),
        ConnectionOptions {
            migration: MigrationOptions {
                downgrade_to_schema_version: 0,
            },
            ..ConnectionOptions::default()
        },
    )
    .await;
    assert!(matches!(result, Err(StoreError::Cancelled(_))));

    // The downgraded database can be freshly re-initialized.
    MetadataStore::new(&sqlite_uri(file.path())).await?;

    Ok(())
}

#[async_std::test]
async fn missing_type_reads_are_empty_responses() -> anyhow::Result<()> {
    let (_file, mut store) = new_store().await?;

    assert!(store
        .get_artifact_type(&GetArtifactTypeRequest::new("missing"))
        .await?
        .artifact_type
        .is_none());
    assert!(store
        .get_execution_type(&GetExecutionTypeRequest::new("missing"))
        .await?
        .execution_type
        .is_none());
    assert!(store
        .get_context_type(&GetContextTypeRequest::new("missing"))
        .await?
        .context_type
        .is_none());

    Ok(())
}
