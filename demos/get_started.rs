//! Records one training step end to end: types, artifacts, an execution,
//! its events and the experiment context grouping them.
use mlmeta::metadata::{
    Artifact, ArtifactType, Context, ContextType, Event, EventType, Execution, ExecutionState,
    ExecutionType, PropertyType,
};
use mlmeta::requests::{
    ArtifactAndEvent, GetArtifactsByContextRequest, PutArtifactTypeRequest, PutContextTypeRequest,
    PutExecutionOptions, PutExecutionRequest, PutExecutionTypeRequest,
};
use mlmeta::MetadataStore;
use structopt::StructOpt;

#[derive(StructOpt)]
struct Opt {
    database_uri: String,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let mut store = MetadataStore::new(&opt.database_uri).await?;

    println!("Create ArtifactTypes, e.g., DataSet and SavedModel");
    let data_type = store
        .put_artifact_type(&PutArtifactTypeRequest::new(
            ArtifactType::new("DataSet")
                .property("day", PropertyType::Int)
                .property("split", PropertyType::String),
        ))
        .await?
        .type_id;
    let model_type = store
        .put_artifact_type(&PutArtifactTypeRequest::new(
            ArtifactType::new("SavedModel")
                .property("version", PropertyType::Int)
                .property("name", PropertyType::String),
        ))
        .await?
        .type_id;

    println!("Create an ExecutionType, e.g., Trainer");
    let trainer_type = store
        .put_execution_type(&PutExecutionTypeRequest::new(ExecutionType::new("Trainer")))
        .await?
        .type_id;

    println!("Create a ContextType, e.g., Experiment");
    let experiment_type = store
        .put_context_type(&PutContextTypeRequest::new(
            ContextType::new("Experiment").property("note", PropertyType::String),
        ))
        .await?
        .type_id;

    println!("Record a complete Trainer run in one transaction");
    let response = store
        .put_execution(&PutExecutionRequest {
            execution: Some(
                Execution::new(trainer_type).last_known_state(ExecutionState::Complete),
            ),
            artifact_event_pairs: vec![
                ArtifactAndEvent {
                    artifact: Some(
                        Artifact::new(data_type)
                            .uri("path/to/data")
                            .property("day", 1i64)
                            .property("split", "train"),
                    ),
                    event: Some(Event::new(EventType::DeclaredInput)),
                },
                ArtifactAndEvent {
                    artifact: Some(
                        Artifact::new(model_type)
                            .uri("path/to/model")
                            .property("version", 1i64)
                            .property("name", "MNIST-v1"),
                    ),
                    event: Some(Event::new(EventType::DeclaredOutput)),
                },
            ],
            contexts: vec![
                Context::new(experiment_type, &format!("exp.{}", std::process::id()))
                    .property("note", "My first experiment"),
            ],
            options: PutExecutionOptions {
                reuse_context_if_already_exist: true,
            },
            ..PutExecutionRequest::default()
        })
        .await?;

    let context_id = response.context_ids[0];
    println!(
        "Recorded execution {:?} with artifacts {:?} under context {}",
        response.execution_id, response.artifact_ids, context_id
    );

    let artifacts = store
        .get_artifacts_by_context(&GetArtifactsByContextRequest::new(context_id))
        .await?
        .artifacts;
    for artifact in artifacts {
        println!("attributed artifact: {:?}", artifact.uri);
    }

    Ok(())
}
