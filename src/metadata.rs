//! Data model shared by the store facade and the access object.
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identifier of an artifact, execution or context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(i64);

impl Id {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an artifact, execution or context type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(i64);

impl TypeId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three disjoint type namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Execution = 0,
    Artifact = 1,
    Context = 2,
}

impl TypeKind {
    pub(crate) fn code(self) -> i64 {
        self as i64
    }

    pub(crate) fn item_table_name(self) -> &'static str {
        match self {
            Self::Execution => "Execution",
            Self::Artifact => "Artifact",
            Self::Context => "Context",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Artifact => write!(f, "artifact"),
            Self::Context => write!(f, "context"),
        }
    }
}

/// Value kind a type property is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Unknown = 0,
    Int = 1,
    Double = 2,
    String = 3,
    Struct = 4,
}

impl PropertyType {
    pub(crate) fn code(self) -> i64 {
        self as i64
    }

    pub(crate) fn from_code(code: i64) -> Result<Self, ConvertError> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Int),
            2 => Ok(Self::Double),
            3 => Ok(Self::String),
            4 => Ok(Self::Struct),
            _ => Err(ConvertError::UndefinedPropertyType { value: code }),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Int => write!(f, "INT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::String => write!(f, "STRING"),
            Self::Struct => write!(f, "STRUCT"),
        }
    }
}

/// A property value attached to an artifact, execution or context.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Double(f64),
    String(String),
    Struct(serde_json::Value),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyType {
        match self {
            Self::Int(_) => PropertyType::Int,
            Self::Double(_) => PropertyType::Double,
            Self::String(_) => PropertyType::String,
            Self::Struct(_) => PropertyType::Struct,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        if let Self::Double(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        if let Self::String(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_struct(&self) -> Option<&serde_json::Value> {
        if let Self::Struct(v) = self {
            Some(v)
        } else {
            None
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<'a> From<&'a str> for PropertyValue {
    fn from(v: &'a str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Struct(v)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("artifact state {value} is undefined")]
    UndefinedArtifactState { value: i64 },

    #[error("execution state {value} is undefined")]
    UndefinedExecutionState { value: i64 },

    #[error("event type {value} is undefined")]
    UndefinedEventType { value: i64 },

    #[error("property type {value} is undefined")]
    UndefinedPropertyType { value: i64 },
}

/// System-defined base types an artifact type can inherit from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactBaseType {
    /// Reserved sentinel; upserting it requests link deletion.
    Unset,
    Dataset,
    Model,
    Metrics,
    Statistics,
}

impl ArtifactBaseType {
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::Unset => None,
            Self::Dataset => Some("mlmd.Dataset"),
            Self::Model => Some("mlmd.Model"),
            Self::Metrics => Some("mlmd.Metrics"),
            Self::Statistics => Some("mlmd.Statistics"),
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "mlmd.Dataset" => Some(Self::Dataset),
            "mlmd.Model" => Some(Self::Model),
            "mlmd.Metrics" => Some(Self::Metrics),
            "mlmd.Statistics" => Some(Self::Statistics),
            _ => None,
        }
    }
}

/// System-defined base types an execution type can inherit from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionBaseType {
    /// Reserved sentinel; upserting it requests link deletion.
    Unset,
    Train,
    Transform,
    Process,
    Evaluate,
    Deploy,
}

impl ExecutionBaseType {
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::Unset => None,
            Self::Train => Some("mlmd.Train"),
            Self::Transform => Some("mlmd.Transform"),
            Self::Process => Some("mlmd.Process"),
            Self::Evaluate => Some("mlmd.Evaluate"),
            Self::Deploy => Some("mlmd.Deploy"),
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "mlmd.Train" => Some(Self::Train),
            "mlmd.Transform" => Some(Self::Transform),
            "mlmd.Process" => Some(Self::Process),
            "mlmd.Evaluate" => Some(Self::Evaluate),
            "mlmd.Deploy" => Some(Self::Deploy),
            _ => None,
        }
    }
}

/// Base-type descriptor carried by a type write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseTypeRequest<'a> {
    /// No descriptor: leave any existing inheritance link alone.
    Absent,
    /// The reserved "unset" sentinel: requests link deletion.
    Unset,
    /// Inherit from the named system type.
    Named(&'a str),
}

/// Shared surface of [`ArtifactType`], [`ExecutionType`] and [`ContextType`].
///
/// The consistency checker and the type upsert engine are written once over
/// this trait; each entity kind keeps its own concrete struct.
pub trait PropertiedType: Clone + Send + Sync {
    const KIND: TypeKind;

    fn from_parts(
        id: TypeId,
        name: String,
        version: Option<String>,
        properties: BTreeMap<String, PropertyType>,
    ) -> Self;

    fn id(&self) -> Option<TypeId>;
    fn name(&self) -> &str;
    fn version(&self) -> Option<&str>;
    fn properties(&self) -> &BTreeMap<String, PropertyType>;
    fn properties_mut(&mut self) -> &mut BTreeMap<String, PropertyType>;

    /// The base-type descriptor of a write request.
    fn base_type_request(&self) -> BaseTypeRequest<'_>;

    /// Populates the read-side base type from a stored parent name.
    ///
    /// Returns `false` if the name is outside the closed system-type mapping.
    fn apply_parent_type(&mut self, parent_name: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactType {
    pub id: Option<TypeId>,
    pub name: String,
    pub version: Option<String>,
    pub properties: BTreeMap<String, PropertyType>,
    pub base_type: Option<ArtifactBaseType>,
}

impl ArtifactType {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            version: None,
            properties: BTreeMap::new(),
            base_type: None,
        }
    }

    pub fn property(mut self, name: &str, ty: PropertyType) -> Self {
        self.properties.insert(name.to_owned(), ty);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_owned());
        self
    }

    pub fn base_type(mut self, base_type: ArtifactBaseType) -> Self {
        self.base_type = Some(base_type);
        self
    }
}

impl PropertiedType for ArtifactType {
    const KIND: TypeKind = TypeKind::Artifact;

    fn from_parts(
        id: TypeId,
        name: String,
        version: Option<String>,
        properties: BTreeMap<String, PropertyType>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            version,
            properties,
            base_type: None,
        }
    }

    fn id(&self) -> Option<TypeId> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut BTreeMap<String, PropertyType> {
        &mut self.properties
    }

    fn base_type_request(&self) -> BaseTypeRequest<'_> {
        match self.base_type {
            None => BaseTypeRequest::Absent,
            Some(base) => match base.type_name() {
                None => BaseTypeRequest::Unset,
                Some(name) => BaseTypeRequest::Named(name),
            },
        }
    }

    fn apply_parent_type(&mut self, parent_name: &str) -> bool {
        match ArtifactBaseType::from_type_name(parent_name) {
            Some(base) => {
                self.base_type = Some(base);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionType {
    pub id: Option<TypeId>,
    pub name: String,
    pub version: Option<String>,
    pub properties: BTreeMap<String, PropertyType>,
    pub base_type: Option<ExecutionBaseType>,
}

impl ExecutionType {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            version: None,
            properties: BTreeMap::new(),
            base_type: None,
        }
    }

    pub fn property(mut self, name: &str, ty: PropertyType) -> Self {
        self.properties.insert(name.to_owned(), ty);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_owned());
        self
    }

    pub fn base_type(mut self, base_type: ExecutionBaseType) -> Self {
        self.base_type = Some(base_type);
        self
    }
}

impl PropertiedType for ExecutionType {
    const KIND: TypeKind = TypeKind::Execution;

    fn from_parts(
        id: TypeId,
        name: String,
        version: Option<String>,
        properties: BTreeMap<String, PropertyType>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            version,
            properties,
            base_type: None,
        }
    }

    fn id(&self) -> Option<TypeId> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut BTreeMap<String, PropertyType> {
        &mut self.properties
    }

    fn base_type_request(&self) -> BaseTypeRequest<'_> {
        match self.base_type {
            None => BaseTypeRequest::Absent,
            Some(base) => match base.type_name() {
                None => BaseTypeRequest::Unset,
                Some(name) => BaseTypeRequest::Named(name),
            },
        }
    }

    fn apply_parent_type(&mut self, parent_name: &str) -> bool {
        match ExecutionBaseType::from_type_name(parent_name) {
            Some(base) => {
                self.base_type = Some(base);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextType {
    pub id: Option<TypeId>,
    pub name: String,
    pub version: Option<String>,
    pub properties: BTreeMap<String, PropertyType>,
}

impl ContextType {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            version: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn property(mut self, name: &str, ty: PropertyType) -> Self {
        self.properties.insert(name.to_owned(), ty);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_owned());
        self
    }
}

impl PropertiedType for ContextType {
    const KIND: TypeKind = TypeKind::Context;

    fn from_parts(
        id: TypeId,
        name: String,
        version: Option<String>,
        properties: BTreeMap<String, PropertyType>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            version,
            properties,
        }
    }

    fn id(&self) -> Option<TypeId> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut BTreeMap<String, PropertyType> {
        &mut self.properties
    }

    fn base_type_request(&self) -> BaseTypeRequest<'_> {
        // There are no system-defined context base types.
        BaseTypeRequest::Absent
    }

    fn apply_parent_type(&mut self, _parent_name: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactState {
    Unknown = 0,
    Pending = 1,
    Live = 2,
    MarkedForDeletion = 3,
    Deleted = 4,
}

impl ArtifactState {
    pub(crate) fn from_code(v: i64) -> Result<Self, ConvertError> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Live),
            3 => Ok(Self::MarkedForDeletion),
            4 => Ok(Self::Deleted),
            _ => Err(ConvertError::UndefinedArtifactState { value: v }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Unknown = 0,
    New = 1,
    Running = 2,
    Complete = 3,
    Failed = 4,
    Cached = 5,
    Canceled = 6,
}

impl ExecutionState {
    pub(crate) fn from_code(v: i64) -> Result<Self, ConvertError> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::New),
            2 => Ok(Self::Running),
            3 => Ok(Self::Complete),
            4 => Ok(Self::Failed),
            5 => Ok(Self::Cached),
            6 => Ok(Self::Canceled),
            _ => Err(ConvertError::UndefinedExecutionState { value: v }),
        }
    }
}

/// A typed data object produced or consumed by a pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: Option<Id>,
    pub type_id: TypeId,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub custom_properties: BTreeMap<String, PropertyValue>,
    pub state: ArtifactState,
    pub create_time_since_epoch: Duration,
    pub last_update_time_since_epoch: Duration,
}

impl Artifact {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            id: None,
            type_id,
            name: None,
            uri: None,
            properties: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
            state: ArtifactState::Unknown,
            create_time_since_epoch: Duration::ZERO,
            last_update_time_since_epoch: Duration::ZERO,
        }
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_owned());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn state(mut self, state: ArtifactState) -> Self {
        self.state = state;
        self
    }

    pub fn property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn custom_property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.custom_properties.insert(key.to_owned(), value.into());
        self
    }
}

/// A typed record of a pipeline step invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub id: Option<Id>,
    pub type_id: TypeId,
    pub name: Option<String>,
    pub last_known_state: ExecutionState,
    pub properties: BTreeMap<String, PropertyValue>,
    pub custom_properties: BTreeMap<String, PropertyValue>,
    pub create_time_since_epoch: Duration,
    pub last_update_time_since_epoch: Duration,
}

impl Execution {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            id: None,
            type_id,
            name: None,
            last_known_state: ExecutionState::Unknown,
            properties: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
            create_time_since_epoch: Duration::ZERO,
            last_update_time_since_epoch: Duration::ZERO,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn last_known_state(mut self, state: ExecutionState) -> Self {
        self.last_known_state = state;
        self
    }

    pub fn property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn custom_property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.custom_properties.insert(key.to_owned(), value.into());
        self
    }
}

/// A named grouping (pipeline run, experiment) artifacts and executions are
/// linked to. The name is required and unique within the context type.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub id: Option<Id>,
    pub type_id: TypeId,
    pub name: String,
    pub properties: BTreeMap<String, PropertyValue>,
    pub custom_properties: BTreeMap<String, PropertyValue>,
    pub create_time_since_epoch: Duration,
    pub last_update_time_since_epoch: Duration,
}

impl Context {
    pub fn new(type_id: TypeId, name: &str) -> Self {
        Self {
            id: None,
            type_id,
            name: name.to_owned(),
            properties: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
            create_time_since_epoch: Duration::ZERO,
            last_update_time_since_epoch: Duration::ZERO,
        }
    }

    pub fn property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn custom_property<T>(mut self, key: &str, value: T) -> Self
    where
        T: Into<PropertyValue>,
    {
        self.custom_properties.insert(key.to_owned(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Unknown = 0,
    DeclaredOutput = 1,
    DeclaredInput = 2,
    Input = 3,
    Output = 4,
    InternalInput = 5,
    InternalOutput = 6,
}

impl EventType {
    pub(crate) fn code(self) -> i64 {
        self as i64
    }

    pub(crate) fn from_code(v: i64) -> Result<Self, ConvertError> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::DeclaredOutput),
            2 => Ok(Self::DeclaredInput),
            3 => Ok(Self::Input),
            4 => Ok(Self::Output),
            5 => Ok(Self::InternalInput),
            6 => Ok(Self::InternalOutput),
            _ => Err(ConvertError::UndefinedEventType { value: v }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventStep {
    Index(i64),
    Key(String),
}

/// An artifact-execution edge carrying a role and an optional path.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub artifact_id: Option<Id>,
    pub execution_id: Option<Id>,
    pub ty: EventType,
    pub path: Vec<EventStep>,
    /// Stamped by the store when absent.
    pub milliseconds_since_epoch: Option<Duration>,
}

impl Event {
    pub fn new(ty: EventType) -> Self {
        Self {
            artifact_id: None,
            execution_id: None,
            ty,
            path: Vec::new(),
            milliseconds_since_epoch: None,
        }
    }

    pub fn artifact_id(mut self, id: Id) -> Self {
        self.artifact_id = Some(id);
        self
    }

    pub fn execution_id(mut self, id: Id) -> Self {
        self.execution_id = Some(id);
        self
    }

    pub fn step(mut self, step: EventStep) -> Self {
        self.path.push(step);
        self
    }
}

/// A context-artifact link. Set semantics: re-insertion is a silent success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attribution {
    pub context_id: Id,
    pub artifact_id: Id,
}

/// A context-execution link. Set semantics: re-insertion is a silent success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Association {
    pub context_id: Id,
    pub execution_id: Id,
}

/// A hierarchical edge between two contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentContext {
    pub child_id: Id,
    pub parent_id: Id,
}

/// The induced subgraph returned by a lineage traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageGraph {
    pub artifact_types: Vec<ArtifactType>,
    pub execution_types: Vec<ExecutionType>,
    pub context_types: Vec<ContextType>,
    pub artifacts: Vec<Artifact>,
    pub executions: Vec<Execution>,
    pub contexts: Vec<Context>,
    pub events: Vec<Event>,
    pub attributions: Vec<Attribution>,
    pub associations: Vec<Association>,
}
