//! Walks the lineage neighborhood of the artifacts matching a filter.
use mlmeta::requests::{GetLineageGraphRequest, LineageGraphQueryOptions, ListOptions};
use mlmeta::MetadataStore;
use structopt::StructOpt;

#[derive(StructOpt)]
struct Opt {
    database_uri: String,
    /// Seed filter, e.g. "uri = 'path/to/model'".
    filter: String,
    #[structopt(long, default_value = "20")]
    max_num_hops: i64,
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let mut store = MetadataStore::new(&opt.database_uri).await?;

    let mut request = GetLineageGraphRequest {
        options: LineageGraphQueryOptions {
            query_nodes: Some(ListOptions::default().filter_query(&opt.filter)),
            ..LineageGraphQueryOptions::default()
        },
        ..GetLineageGraphRequest::default()
    };
    request.options.stop_conditions.max_num_hops = Some(opt.max_num_hops);

    let subgraph = store.get_lineage_graph(&request).await?.subgraph;
    println!(
        "{} artifacts, {} executions, {} contexts, {} events",
        subgraph.artifacts.len(),
        subgraph.executions.len(),
        subgraph.contexts.len(),
        subgraph.events.len(),
    );
    for artifact in &subgraph.artifacts {
        println!("artifact {:?}: uri={:?}", artifact.id, artifact.uri);
    }
    for event in &subgraph.events {
        println!(
            "event {:?}: artifact={:?} execution={:?}",
            event.ty, event.artifact_id, event.execution_id
        );
    }

    Ok(())
}
