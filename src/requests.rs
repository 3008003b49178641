//! Request and response shapes of the public store operations.
//!
//! Wire transport is out of scope; these are the plain structs an RPC layer
//! would marshal. Every request carries the transaction options its
//! operation runs with.
use crate::executor::TransactionOptions;
use crate::metadata::{
    Artifact, ArtifactType, Association, Attribution, Context, ContextType, Event, Execution,
    ExecutionType, Id, LineageGraph, ParentContext, TypeId,
};

/// Field a paginated listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByField {
    Id,
    CreateTime,
    LastUpdateTime,
}

impl OrderByField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreateTime => "create_time_since_epoch",
            Self::LastUpdateTime => "last_update_time_since_epoch",
        }
    }
}

/// Options of a paginated listing.
///
/// `next_page_token` and `filter_query` are opaque to the facade; the access
/// object validates and interprets both.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub max_result_size: i64,
    pub order_by_field: OrderByField,
    pub is_asc: bool,
    pub next_page_token: Option<String>,
    pub filter_query: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_result_size: 20,
            order_by_field: OrderByField::Id,
            is_asc: true,
            next_page_token: None,
            filter_query: None,
        }
    }
}

impl ListOptions {
    pub fn max_result_size(mut self, n: i64) -> Self {
        self.max_result_size = n;
        self
    }

    pub fn order_by(mut self, field: OrderByField, is_asc: bool) -> Self {
        self.order_by_field = field;
        self.is_asc = is_asc;
        self
    }

    pub fn next_page_token(mut self, token: &str) -> Self {
        self.next_page_token = Some(token.to_owned());
        self
    }

    pub fn filter_query(mut self, expr: &str) -> Self {
        self.filter_query = Some(expr.to_owned());
        self
    }
}

/// Schema migration knobs applied while connecting.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// When `>= 0`, the connection downgrades the schema to this version and
    /// then refuses to return a usable store (`Cancelled`).
    pub downgrade_to_schema_version: i64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            downgrade_to_schema_version: -1,
        }
    }
}

/// Options of [`MetadataStore::connect`](crate::MetadataStore::connect).
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub migration: MigrationOptions,
    pub transaction: TransactionOptions,
}

// Type writes.

#[derive(Debug, Clone)]
pub struct PutTypesRequest {
    pub artifact_types: Vec<ArtifactType>,
    pub execution_types: Vec<ExecutionType>,
    pub context_types: Vec<ContextType>,
    pub can_add_fields: bool,
    pub can_omit_fields: bool,
    pub all_fields_match: bool,
    pub transaction_options: TransactionOptions,
}

impl Default for PutTypesRequest {
    fn default() -> Self {
        Self {
            artifact_types: Vec::new(),
            execution_types: Vec::new(),
            context_types: Vec::new(),
            can_add_fields: false,
            can_omit_fields: false,
            all_fields_match: true,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutTypesResponse {
    pub artifact_type_ids: Vec<TypeId>,
    pub execution_type_ids: Vec<TypeId>,
    pub context_type_ids: Vec<TypeId>,
}

macro_rules! put_single_type_request {
    ($request:ident, $field:ident, $type:ty) => {
        #[derive(Debug, Clone)]
        pub struct $request {
            pub $field: $type,
            pub can_add_fields: bool,
            pub can_omit_fields: bool,
            pub all_fields_match: bool,
            pub transaction_options: TransactionOptions,
        }

        impl $request {
            pub fn new($field: $type) -> Self {
                Self {
                    $field,
                    can_add_fields: false,
                    can_omit_fields: false,
                    all_fields_match: true,
                    transaction_options: TransactionOptions::default(),
                }
            }

            pub fn can_add_fields(mut self) -> Self {
                self.can_add_fields = true;
                self
            }

            pub fn can_omit_fields(mut self) -> Self {
                self.can_omit_fields = true;
                self
            }
        }
    };
}

put_single_type_request!(PutArtifactTypeRequest, artifact_type, ArtifactType);
put_single_type_request!(PutExecutionTypeRequest, execution_type, ExecutionType);
put_single_type_request!(PutContextTypeRequest, context_type, ContextType);

#[derive(Debug, Clone, PartialEq)]
pub struct PutArtifactTypeResponse {
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutExecutionTypeResponse {
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutContextTypeResponse {
    pub type_id: TypeId,
}

// Type reads.

macro_rules! get_single_type_request {
    ($request:ident) => {
        #[derive(Debug, Clone, Default)]
        pub struct $request {
            pub type_name: String,
            /// The empty string is not a valid version and is treated as absent.
            pub type_version: Option<String>,
            pub transaction_options: TransactionOptions,
        }

        impl $request {
            pub fn new(type_name: &str) -> Self {
                Self {
                    type_name: type_name.to_owned(),
                    ..Self::default()
                }
            }

            pub fn version(mut self, version: &str) -> Self {
                self.type_version = Some(version.to_owned());
                self
            }
        }
    };
}

get_single_type_request!(GetArtifactTypeRequest);
get_single_type_request!(GetExecutionTypeRequest);
get_single_type_request!(GetContextTypeRequest);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactTypeResponse {
    pub artifact_type: Option<ArtifactType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionTypeResponse {
    pub execution_type: Option<ExecutionType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextTypeResponse {
    pub context_type: Option<ContextType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetArtifactTypesByIdRequest {
    pub type_ids: Vec<TypeId>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactTypesByIdResponse {
    pub artifact_types: Vec<ArtifactType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetExecutionTypesByIdRequest {
    pub type_ids: Vec<TypeId>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionTypesByIdResponse {
    pub execution_types: Vec<ExecutionType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetContextTypesByIdRequest {
    pub type_ids: Vec<TypeId>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextTypesByIdResponse {
    pub context_types: Vec<ContextType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetArtifactTypesRequest {
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactTypesResponse {
    pub artifact_types: Vec<ArtifactType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetExecutionTypesRequest {
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionTypesResponse {
    pub execution_types: Vec<ExecutionType>,
}

#[derive(Debug, Clone, Default)]
pub struct GetContextTypesRequest {
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextTypesResponse {
    pub context_types: Vec<ContextType>,
}

// Entity writes.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutArtifactsOptions {
    /// Fails the write with a precondition error when the stored
    /// `last_update_time_since_epoch` differs from the one in the request.
    pub abort_if_latest_updated_time_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PutArtifactsRequest {
    pub artifacts: Vec<Artifact>,
    pub options: PutArtifactsOptions,
    pub transaction_options: TransactionOptions,
}

impl PutArtifactsRequest {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self {
            artifacts,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutArtifactsResponse {
    pub artifact_ids: Vec<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct PutExecutionsRequest {
    pub executions: Vec<Execution>,
    pub transaction_options: TransactionOptions,
}

impl PutExecutionsRequest {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self {
            executions,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutExecutionsResponse {
    pub execution_ids: Vec<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct PutContextsRequest {
    pub contexts: Vec<Context>,
    pub transaction_options: TransactionOptions,
}

impl PutContextsRequest {
    pub fn new(contexts: Vec<Context>) -> Self {
        Self {
            contexts,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutContextsResponse {
    pub context_ids: Vec<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct PutEventsRequest {
    pub events: Vec<Event>,
    pub transaction_options: TransactionOptions,
}

impl PutEventsRequest {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutEventsResponse {}

/// One input slot of the composite execution write: an optional artifact
/// paired with an optional event connecting it to the execution.
#[derive(Debug, Clone, Default)]
pub struct ArtifactAndEvent {
    pub artifact: Option<Artifact>,
    pub event: Option<Event>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutExecutionOptions {
    /// Adopt an existing context with the same (type_id, name) instead of
    /// failing the insert. A race between two writers creating the same new
    /// context surfaces as `Aborted`; retrying reuses the committed row.
    pub reuse_context_if_already_exist: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PutExecutionRequest {
    pub execution: Option<Execution>,
    pub artifact_event_pairs: Vec<ArtifactAndEvent>,
    pub contexts: Vec<Context>,
    pub options: PutExecutionOptions,
    pub transaction_options: TransactionOptions,
}

impl PutExecutionRequest {
    pub fn new(execution: Execution) -> Self {
        Self {
            execution: Some(execution),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutExecutionResponse {
    pub execution_id: Option<Id>,
    /// One entry per request pair; `None` marks a pair with no artifact of
    /// its own and no event-borne artifact id.
    pub artifact_ids: Vec<Option<Id>>,
    pub context_ids: Vec<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct PutAttributionsAndAssociationsRequest {
    pub attributions: Vec<Attribution>,
    pub associations: Vec<Association>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutAttributionsAndAssociationsResponse {}

#[derive(Debug, Clone, Default)]
pub struct PutParentContextsRequest {
    pub parent_contexts: Vec<ParentContext>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutParentContextsResponse {}

// Entity reads.

#[derive(Debug, Clone, Default)]
pub struct GetArtifactsByIdRequest {
    pub artifact_ids: Vec<Id>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactsByIdResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Default)]
pub struct GetExecutionsByIdRequest {
    pub execution_ids: Vec<Id>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionsByIdResponse {
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, Default)]
pub struct GetContextsByIdRequest {
    pub context_ids: Vec<Id>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextsByIdResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, Default)]
pub struct GetArtifactsRequest {
    pub options: Option<ListOptions>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactsResponse {
    pub artifacts: Vec<Artifact>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetExecutionsRequest {
    pub options: Option<ListOptions>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionsResponse {
    pub executions: Vec<Execution>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetContextsRequest {
    pub options: Option<ListOptions>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextsResponse {
    pub contexts: Vec<Context>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetArtifactsByUriRequest {
    pub uris: Vec<String>,
    /// Deprecated singular predecessor of `uris`; requests still setting it
    /// are rejected with an invalid-argument error.
    pub uri: Option<String>,
    pub transaction_options: TransactionOptions,
}

impl GetArtifactsByUriRequest {
    pub fn new(uris: &[&str]) -> Self {
        Self {
            uris: uris.iter().map(|uri| (*uri).to_owned()).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactsByUriResponse {
    pub artifacts: Vec<Artifact>,
}

macro_rules! get_items_by_type_request {
    ($request:ident) => {
        #[derive(Debug, Clone, Default)]
        pub struct $request {
            pub type_name: String,
            pub type_version: Option<String>,
            pub options: Option<ListOptions>,
            pub transaction_options: TransactionOptions,
        }

        impl $request {
            pub fn new(type_name: &str) -> Self {
                Self {
                    type_name: type_name.to_owned(),
                    ..Self::default()
                }
            }
        }
    };
}

get_items_by_type_request!(GetArtifactsByTypeRequest);
get_items_by_type_request!(GetExecutionsByTypeRequest);
get_items_by_type_request!(GetContextsByTypeRequest);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactsByTypeResponse {
    pub artifacts: Vec<Artifact>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionsByTypeResponse {
    pub executions: Vec<Execution>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextsByTypeResponse {
    pub contexts: Vec<Context>,
    pub next_page_token: Option<String>,
}

macro_rules! get_item_by_type_and_name_request {
    ($request:ident, $name_field:ident) => {
        #[derive(Debug, Clone, Default)]
        pub struct $request {
            pub type_name: String,
            pub type_version: Option<String>,
            pub $name_field: String,
            pub transaction_options: TransactionOptions,
        }

        impl $request {
            pub fn new(type_name: &str, $name_field: &str) -> Self {
                Self {
                    type_name: type_name.to_owned(),
                    $name_field: $name_field.to_owned(),
                    ..Self::default()
                }
            }
        }
    };
}

get_item_by_type_and_name_request!(GetArtifactByTypeAndNameRequest, artifact_name);
get_item_by_type_and_name_request!(GetExecutionByTypeAndNameRequest, execution_name);
get_item_by_type_and_name_request!(GetContextByTypeAndNameRequest, context_name);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactByTypeAndNameResponse {
    pub artifact: Option<Artifact>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionByTypeAndNameResponse {
    pub execution: Option<Execution>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextByTypeAndNameResponse {
    pub context: Option<Context>,
}

#[derive(Debug, Clone, Default)]
pub struct GetEventsByArtifactIdsRequest {
    pub artifact_ids: Vec<Id>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetEventsByArtifactIdsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default)]
pub struct GetEventsByExecutionIdsRequest {
    pub execution_ids: Vec<Id>,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetEventsByExecutionIdsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub struct GetContextsByArtifactRequest {
    pub artifact_id: Id,
    pub transaction_options: TransactionOptions,
}

impl GetContextsByArtifactRequest {
    pub fn new(artifact_id: Id) -> Self {
        Self {
            artifact_id,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextsByArtifactResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone)]
pub struct GetContextsByExecutionRequest {
    pub execution_id: Id,
    pub transaction_options: TransactionOptions,
}

impl GetContextsByExecutionRequest {
    pub fn new(execution_id: Id) -> Self {
        Self {
            execution_id,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetContextsByExecutionResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone)]
pub struct GetArtifactsByContextRequest {
    pub context_id: Id,
    pub options: Option<ListOptions>,
    pub transaction_options: TransactionOptions,
}

impl GetArtifactsByContextRequest {
    pub fn new(context_id: Id) -> Self {
        Self {
            context_id,
            options: None,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetArtifactsByContextResponse {
    pub artifacts: Vec<Artifact>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetExecutionsByContextRequest {
    pub context_id: Id,
    pub options: Option<ListOptions>,
    pub transaction_options: TransactionOptions,
}

impl GetExecutionsByContextRequest {
    pub fn new(context_id: Id) -> Self {
        Self {
            context_id,
            options: None,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetExecutionsByContextResponse {
    pub executions: Vec<Execution>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetParentContextsByContextRequest {
    pub context_id: Id,
    pub transaction_options: TransactionOptions,
}

impl GetParentContextsByContextRequest {
    pub fn new(context_id: Id) -> Self {
        Self {
            context_id,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetParentContextsByContextResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone)]
pub struct GetChildrenContextsByContextRequest {
    pub context_id: Id,
    pub transaction_options: TransactionOptions,
}

impl GetChildrenContextsByContextRequest {
    pub fn new(context_id: Id) -> Self {
        Self {
            context_id,
            transaction_options: TransactionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetChildrenContextsByContextResponse {
    pub contexts: Vec<Context>,
}

// Lineage traversal.

/// Boundary conditions bounding a lineage traversal.
#[derive(Debug, Clone, Default)]
pub struct LineageStopConditions {
    /// Clamped to `[0, 20]`; negative values are invalid, absent means the
    /// maximum.
    pub max_num_hops: Option<i64>,
    /// Filter over artifacts that must not be expanded through.
    pub boundary_artifacts: Option<String>,
    /// Filter over executions that must not be expanded through.
    pub boundary_executions: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LineageGraphQueryOptions {
    /// Listing query selecting the seed artifacts. Required.
    pub query_nodes: Option<ListOptions>,
    pub stop_conditions: LineageStopConditions,
    /// Upper bound on returned artifacts + executions; `<= 0` means
    /// unlimited.
    pub max_node_size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct GetLineageGraphRequest {
    pub options: LineageGraphQueryOptions,
    pub transaction_options: TransactionOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetLineageGraphResponse {
    pub subgraph: LineageGraph,
}
