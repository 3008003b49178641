//! The access object: typed CRUD and the lineage walk over the metadata
//! schema.
//!
//! Everything here assumes it runs inside a transaction opened by the
//! executor; nothing commits on its own.
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, UNIX_EPOCH};

use serde::Deserialize;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection as _, Executor as _, Row as _};

use crate::errors::StoreError;
use crate::filter::{self, FilterSql};
use crate::metadata::{
    Artifact, ArtifactState, Association, Attribution, Context, Event, EventStep, EventType,
    Execution, ExecutionState, Id, LineageGraph, PropertiedType, PropertyType, PropertyValue,
    TypeId, TypeKind,
};
use crate::query::{bind_parameters, placeholders, Parameter, Query};
use crate::requests::ListOptions;

/// Version of the physical schema this build reads and writes.
pub(crate) const SCHEMA_VERSION: i64 = 2;

const ARTIFACT_FILTER_COLUMNS: &[&str] = &[
    "id",
    "type_id",
    "name",
    "uri",
    "state",
    "create_time_since_epoch",
    "last_update_time_since_epoch",
];

const EXECUTION_FILTER_COLUMNS: &[&str] = &[
    "id",
    "type_id",
    "name",
    "last_known_state",
    "create_time_since_epoch",
    "last_update_time_since_epoch",
];

const CONTEXT_FILTER_COLUMNS: &[&str] = &[
    "id",
    "type_id",
    "name",
    "create_time_since_epoch",
    "last_update_time_since_epoch",
];

fn current_millis() -> i64 {
    UNIX_EPOCH.elapsed().unwrap_or_default().as_millis() as i64
}

fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Db(sqlx::Error::Decode(e.into()))
}

fn encode_page_token(offset: i64) -> String {
    serde_json::json!({ "offset": offset }).to_string()
}

fn decode_page_token(token: &str) -> Result<i64, StoreError> {
    #[derive(Deserialize)]
    struct PageToken {
        offset: i64,
    }
    serde_json::from_str::<PageToken>(token)
        .map(|token| token.offset)
        .map_err(|e| StoreError::invalid_argument(format!("malformed page token: {}", e)))
}

#[derive(Debug)]
pub(crate) struct AccessObject {
    connection: AnyConnection,
    query: Query,
}

impl AccessObject {
    pub async fn connect(database_uri: &str) -> Result<Self, StoreError> {
        let query = if database_uri.starts_with("sqlite:") {
            Query::sqlite()
        } else if database_uri.starts_with("mysql:") {
            Query::mysql()
        } else {
            return Err(StoreError::invalid_argument(format!(
                "only sqlite: and mysql: database URIs are supported, got {:?}",
                database_uri
            )));
        };
        let connection = AnyConnection::connect(database_uri).await?;
        Ok(Self { connection, query })
    }

    // Transaction statements issued by the executor. These and the DDL below
    // run over the raw (unprepared) protocol; MySQL refuses to prepare them.

    pub async fn begin_transaction(&mut self) -> Result<(), StoreError> {
        self.connection
            .execute(self.query.begin_transaction())
            .await?;
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<(), StoreError> {
        self.connection
            .execute(self.query.commit_transaction())
            .await?;
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> Result<(), StoreError> {
        self.connection
            .execute(self.query.rollback_transaction())
            .await?;
        Ok(())
    }

    // Initialization and migration.

    async fn schema_version(&mut self) -> Result<Option<i64>, StoreError> {
        let rows = match sqlx::query(self.query.select_schema_version())
            .fetch_all(&mut self.connection)
            .await
        {
            Ok(rows) => rows,
            // The version table is missing: an uninitialized database.
            Err(_) => return Ok(None),
        };
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows[0].try_get("schema_version")?)),
            n => Err(StoreError::FailedPrecondition(format!(
                "there are {} MLMDEnv records (only one record is expected)",
                n
            ))),
        }
    }

    async fn create_schema(&mut self) -> Result<(), StoreError> {
        for statement in self.query.create_tables() {
            self.connection.execute(*statement).await?;
        }
        let rows = sqlx::query(self.query.select_schema_version())
            .fetch_all(&mut self.connection)
            .await?;
        if rows.is_empty() {
            sqlx::query(self.query.insert_schema_version())
                .bind(SCHEMA_VERSION)
                .execute(&mut self.connection)
                .await?;
        }
        Ok(())
    }

    pub async fn init_metadata_source(&mut self) -> Result<(), StoreError> {
        if self.schema_version().await?.is_none() {
            self.create_schema().await?;
        }
        match self.schema_version().await? {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(version) => Err(StoreError::FailedPrecondition(format!(
                "schema version {} is not supported (supported version is {})",
                version, SCHEMA_VERSION
            ))),
            None => Err(StoreError::FailedPrecondition(
                "schema initialization did not record a schema version".to_owned(),
            )),
        }
    }

    pub async fn init_metadata_source_if_not_exists(
        &mut self,
        enable_upgrade_migration: bool,
    ) -> Result<(), StoreError> {
        match self.schema_version().await? {
            None => self.create_schema().await,
            Some(SCHEMA_VERSION) => Ok(()),
            Some(version) if version < SCHEMA_VERSION => {
                if !enable_upgrade_migration {
                    return Err(StoreError::FailedPrecondition(format!(
                        "the database is at schema version {} while the library expects {}; \
                         pass enable_upgrade_migration to migrate it",
                        version, SCHEMA_VERSION
                    )));
                }
                self.upgrade_schema(version).await
            }
            Some(version) => Err(StoreError::FailedPrecondition(format!(
                "schema version {} is newer than the supported version {}; \
                 use a newer client",
                version, SCHEMA_VERSION
            ))),
        }
    }

    async fn upgrade_schema(&mut self, from_version: i64) -> Result<(), StoreError> {
        for version in from_version..SCHEMA_VERSION {
            for statement in self.query.upgrade_statements(version) {
                self.connection.execute(*statement).await?;
            }
        }
        sqlx::query(self.query.update_schema_version())
            .bind(SCHEMA_VERSION)
            .execute(&mut self.connection)
            .await?;
        Ok(())
    }

    pub async fn downgrade_metadata_source(&mut self, to_version: i64) -> Result<(), StoreError> {
        if !(0..=SCHEMA_VERSION).contains(&to_version) {
            return Err(StoreError::invalid_argument(format!(
                "cannot downgrade to schema version {} (supported range is 0..={})",
                to_version, SCHEMA_VERSION
            )));
        }
        let current = match self.schema_version().await? {
            Some(version) => version,
            None => return Ok(()),
        };
        if current < to_version {
            return Err(StoreError::invalid_argument(format!(
                "the database is at schema version {} which is below the downgrade target {}",
                current, to_version
            )));
        }
        for version in ((to_version + 1)..=current).rev() {
            for statement in self.query.downgrade_statements(version) {
                self.connection.execute(*statement).await?;
            }
        }
        if to_version > 0 {
            sqlx::query(self.query.update_schema_version())
                .bind(to_version)
                .execute(&mut self.connection)
                .await?;
        }
        Ok(())
    }

    // Types.

    pub async fn create_type<T: PropertiedType>(&mut self, ty: &T) -> Result<TypeId, StoreError> {
        if ty.name().is_empty() {
            return Err(StoreError::invalid_argument(format!(
                "{} type must have a name",
                T::KIND
            )));
        }
        for (name, property_type) in ty.properties() {
            if *property_type == PropertyType::Unknown {
                return Err(StoreError::invalid_argument(format!(
                    "property {:?} of {} type {:?} has an unknown value type",
                    name,
                    T::KIND,
                    ty.name()
                )));
            }
        }
        // The empty string is not a valid version; it is stored as absent.
        let version = ty.version().filter(|version| !version.is_empty());
        let params = vec![
            Parameter::Text(ty.name().to_owned()),
            match version {
                Some(version) => Parameter::Text(version.to_owned()),
                None => Parameter::Null,
            },
            Parameter::Int(T::KIND.code()),
        ];
        bind_parameters(sqlx::query(self.query.insert_type()), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("{} type {:?}", T::KIND, ty.name()),
                )
            })?;
        let type_id = self.last_row_id(self.query.select_last_type_id()).await?;
        for (name, property_type) in ty.properties() {
            sqlx::query(self.query.insert_type_property())
                .bind(type_id)
                .bind(name.as_str())
                .bind(property_type.code())
                .execute(&mut self.connection)
                .await?;
        }
        Ok(TypeId::new(type_id))
    }

    /// Persists schema additions: properties of `merged` that the stored
    /// type does not have yet are inserted, nothing is removed or retyped.
    pub async fn update_type(
        &mut self,
        type_id: TypeId,
        merged: &BTreeMap<String, PropertyType>,
    ) -> Result<(), StoreError> {
        let rows = sqlx::query(self.query.select_type_property_names())
            .bind(type_id.get())
            .fetch_all(&mut self.connection)
            .await?;
        let mut existing = BTreeSet::new();
        for row in rows {
            existing.insert(row.try_get::<String, _>("name")?);
        }
        for (name, property_type) in merged {
            if existing.contains(name) {
                continue;
            }
            sqlx::query(self.query.insert_type_property())
                .bind(type_id.get())
                .bind(name.as_str())
                .bind(property_type.code())
                .execute(&mut self.connection)
                .await?;
        }
        Ok(())
    }

    pub async fn find_type_by_name_and_version<T: PropertiedType>(
        &mut self,
        name: &str,
        version: Option<&str>,
    ) -> Result<T, StoreError> {
        let version = version.filter(|version| !version.is_empty());
        let sql = self.query.select_type_by_name_and_version(version.is_some());
        let mut query = sqlx::query(&sql).bind(T::KIND.code()).bind(name);
        if let Some(version) = version {
            query = query.bind(version);
        }
        let row = query
            .fetch_optional(&mut self.connection)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(format!("{} type {:?} is not found", T::KIND, name))
            })?;
        self.type_from_row(&row).await
    }

    pub async fn find_type_by_id<T: PropertiedType>(
        &mut self,
        type_id: TypeId,
    ) -> Result<T, StoreError> {
        let row = sqlx::query(self.query.select_type_by_id())
            .bind(T::KIND.code())
            .bind(type_id.get())
            .fetch_optional(&mut self.connection)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(format!("{} type {} is not found", T::KIND, type_id))
            })?;
        self.type_from_row(&row).await
    }

    async fn type_from_row<T: PropertiedType>(&mut self, row: &AnyRow) -> Result<T, StoreError> {
        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let version: Option<String> = row.try_get("version")?;
        let properties = self
            .type_properties(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(T::from_parts(TypeId::new(id), name, version, properties))
    }

    pub async fn find_types<T: PropertiedType>(&mut self) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query(self.query.select_types())
            .bind(T::KIND.code())
            .fetch_all(&mut self.connection)
            .await?;
        let mut parts = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let name: String = row.try_get("name")?;
            let version: Option<String> = row.try_get("version")?;
            parts.push((id, name, version));
        }
        let ids: Vec<i64> = parts.iter().map(|(id, _, _)| *id).collect();
        let mut properties = self.type_properties(&ids).await?;
        Ok(parts
            .into_iter()
            .map(|(id, name, version)| {
                T::from_parts(
                    TypeId::new(id),
                    name,
                    version,
                    properties.remove(&id).unwrap_or_default(),
                )
            })
            .collect())
    }

    pub async fn find_type_id_by_name_and_version(
        &mut self,
        kind: TypeKind,
        name: &str,
        version: Option<&str>,
    ) -> Result<TypeId, StoreError> {
        let version = version.filter(|version| !version.is_empty());
        let sql = self.query.select_type_by_name_and_version(version.is_some());
        let mut query = sqlx::query(&sql).bind(kind.code()).bind(name);
        if let Some(version) = version {
            query = query.bind(version);
        }
        let row = query
            .fetch_optional(&mut self.connection)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(format!("{} type {:?} is not found", kind, name))
            })?;
        Ok(TypeId::new(row.try_get("id")?))
    }

    async fn type_properties(
        &mut self,
        type_ids: &[i64],
    ) -> Result<BTreeMap<i64, BTreeMap<String, PropertyType>>, StoreError> {
        let mut properties: BTreeMap<i64, BTreeMap<String, PropertyType>> = BTreeMap::new();
        if type_ids.is_empty() {
            return Ok(properties);
        }
        let sql = self.query.select_type_properties(type_ids.len());
        let params: Vec<Parameter> = type_ids.iter().map(|id| Parameter::Int(*id)).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        for row in rows {
            let type_id: i64 = row.try_get("type_id")?;
            let name: String = row.try_get("name")?;
            let data_type = PropertyType::from_code(row.try_get("data_type")?)
                .map_err(decode_error)?;
            properties.entry(type_id).or_default().insert(name, data_type);
        }
        Ok(properties)
    }

    /// Parent type names keyed by child type id.
    pub async fn find_parent_types_by_type_ids(
        &mut self,
        type_ids: &[TypeId],
    ) -> Result<BTreeMap<TypeId, Vec<String>>, StoreError> {
        let mut parents: BTreeMap<TypeId, Vec<String>> = BTreeMap::new();
        if type_ids.is_empty() {
            return Ok(parents);
        }
        let sql = self.query.select_parent_types(type_ids.len());
        let params: Vec<Parameter> = type_ids.iter().map(|id| Parameter::Int(id.get())).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        for row in rows {
            let child_id: i64 = row.try_get("child_id")?;
            let parent_name: String = row.try_get("parent_name")?;
            parents
                .entry(TypeId::new(child_id))
                .or_default()
                .push(parent_name);
        }
        Ok(parents)
    }

    pub async fn create_parent_type_link(
        &mut self,
        type_id: TypeId,
        parent_type_id: TypeId,
    ) -> Result<(), StoreError> {
        sqlx::query(self.query.insert_parent_type())
            .bind(type_id.get())
            .bind(parent_type_id.get())
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("parent type link for type {}", type_id),
                )
            })?;
        Ok(())
    }

    // Shared item plumbing.

    async fn last_row_id(&mut self, sql: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(sql).fetch_one(&mut self.connection).await?;
        Ok(row.try_get("id")?)
    }

    async fn item_exists(&mut self, kind: TypeKind, id: Id) -> Result<bool, StoreError> {
        let sql = self.query.check_item_id(kind);
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_one(&mut self.connection)
            .await?;
        Ok(row.try_get::<i64, _>("c")? > 0)
    }

    /// Loads the property schema of `type_id`, verifying the type exists in
    /// the given namespace.
    async fn item_type_schema(
        &mut self,
        kind: TypeKind,
        type_id: TypeId,
    ) -> Result<BTreeMap<String, PropertyType>, StoreError> {
        let row = sqlx::query(self.query.select_type_by_id())
            .bind(kind.code())
            .bind(type_id.get())
            .fetch_optional(&mut self.connection)
            .await?;
        if row.is_none() {
            return Err(StoreError::invalid_argument(format!(
                "{} type {} does not exist",
                kind, type_id
            )));
        }
        Ok(self
            .type_properties(&[type_id.get()])
            .await?
            .remove(&type_id.get())
            .unwrap_or_default())
    }

    fn validate_properties(
        kind: TypeKind,
        schema: &BTreeMap<String, PropertyType>,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        for (name, value) in properties {
            match schema.get(name) {
                None => {
                    return Err(StoreError::invalid_argument(format!(
                        "{} has an undefined property {:?}",
                        kind, name
                    )))
                }
                Some(declared) if *declared != value.kind() => {
                    return Err(StoreError::invalid_argument(format!(
                        "property {:?} of {} is declared as {} but the value is {}",
                        name,
                        kind,
                        declared,
                        value.kind()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    async fn write_item_properties(
        &mut self,
        kind: TypeKind,
        id: Id,
        properties: &BTreeMap<String, PropertyValue>,
        is_custom: bool,
        is_update: bool,
    ) -> Result<(), StoreError> {
        if is_update {
            let sql = self.query.delete_item_properties(kind, properties.len());
            let mut params = vec![Parameter::Int(id.get()), Parameter::Int(is_custom as i64)];
            params.extend(properties.keys().map(|name| Parameter::Text(name.clone())));
            bind_parameters(sqlx::query(&sql), &params)
                .execute(&mut self.connection)
                .await?;
        }
        for (name, value) in properties {
            let (column, param) = match value {
                PropertyValue::Int(v) => ("int_value", Parameter::Int(*v)),
                PropertyValue::Double(v) => ("double_value", Parameter::Double(*v)),
                PropertyValue::String(v) => ("string_value", Parameter::Text(v.clone())),
                PropertyValue::Struct(v) => (
                    "struct_value",
                    Parameter::Text(serde_json::to_string(v).map_err(decode_error)?),
                ),
            };
            let sql = self.query.upsert_item_property(kind, column);
            let params = vec![
                Parameter::Int(id.get()),
                Parameter::Text(name.clone()),
                Parameter::Int(is_custom as i64),
                param.clone(),
                param,
            ];
            bind_parameters(sqlx::query(&sql), &params)
                .execute(&mut self.connection)
                .await?;
        }
        Ok(())
    }

    async fn item_properties(
        &mut self,
        kind: TypeKind,
        ids: &[i64],
    ) -> Result<ItemProperties, StoreError> {
        let mut properties: ItemProperties = BTreeMap::new();
        if ids.is_empty() {
            return Ok(properties);
        }
        let sql = self.query.select_item_properties(kind, ids.len());
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(*id)).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let name: String = row.try_get("name")?;
            let is_custom = row.try_get::<i64, _>("is_custom_property")? != 0;
            let int_value: Option<i64> = row.try_get("int_value")?;
            let double_value: Option<f64> = row.try_get("double_value")?;
            let string_value: Option<String> = row.try_get("string_value")?;
            let struct_value: Option<String> = row.try_get("struct_value")?;
            let value = match (int_value, double_value, string_value, struct_value) {
                (Some(v), None, None, None) => PropertyValue::Int(v),
                (None, Some(v), None, None) => PropertyValue::Double(v),
                (None, None, Some(v), None) => PropertyValue::String(v),
                (None, None, None, Some(v)) => {
                    PropertyValue::Struct(serde_json::from_str(&v).map_err(decode_error)?)
                }
                _ => {
                    return Err(StoreError::Db(sqlx::Error::Decode(
                        anyhow::anyhow!(
                            "property {:?} of item {} must have exactly one value",
                            name,
                            id
                        )
                        .into(),
                    )))
                }
            };
            let entry = properties.entry(id).or_default();
            if is_custom {
                entry.1.insert(name, value);
            } else {
                entry.0.insert(name, value);
            }
        }
        Ok(properties)
    }

    async fn fetch_item_rows(
        &mut self,
        kind: TypeKind,
        joins: &str,
        conditions: &[String],
        params: &[Parameter],
        suffix: &str,
    ) -> Result<Vec<AnyRow>, StoreError> {
        let mut sql = self.query.select_items_prefix(kind);
        sql.push_str(joins);
        if !conditions.is_empty() {
            sql.push_str("WHERE ");
            sql.push_str(&conditions.join(" AND "));
            sql.push(' ');
        }
        sql.push_str(suffix);
        Ok(bind_parameters(sqlx::query(&sql), params)
            .fetch_all(&mut self.connection)
            .await?)
    }

    /// Translates list options into (conditions, params, ORDER/LIMIT suffix,
    /// page size, offset).
    fn pagination(
        &self,
        options: &ListOptions,
        columns: &[&str],
    ) -> Result<(Vec<String>, Vec<Parameter>, String, i64, i64), StoreError> {
        let offset = match &options.next_page_token {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };
        if offset < 0 {
            return Err(StoreError::invalid_argument(format!(
                "malformed page token: negative offset {}",
                offset
            )));
        }
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some(expr) = &options.filter_query {
            let FilterSql { clause, params: filter_params } =
                filter::translate(expr, columns, "A.")?;
            conditions.push(format!("({})", clause));
            params.extend(filter_params);
        }
        let page_size = if options.max_result_size > 0 {
            options.max_result_size
        } else {
            ListOptions::default().max_result_size
        };
        let suffix = format!(
            "ORDER BY A.{} {} LIMIT {} OFFSET {}",
            options.order_by_field.column(),
            if options.is_asc { "ASC" } else { "DESC" },
            page_size + 1,
            offset
        );
        Ok((conditions, params, suffix, page_size, offset))
    }

    // Artifacts.

    pub async fn create_artifact(&mut self, artifact: &Artifact) -> Result<Id, StoreError> {
        let schema = self
            .item_type_schema(TypeKind::Artifact, artifact.type_id)
            .await?;
        Self::validate_properties(TypeKind::Artifact, &schema, &artifact.properties)?;
        let now = current_millis();
        let params = vec![
            Parameter::Int(artifact.type_id.get()),
            optional_text(&artifact.name),
            optional_text(&artifact.uri),
            Parameter::Int(artifact.state as i64),
            Parameter::Int(now),
            Parameter::Int(now),
        ];
        bind_parameters(sqlx::query(self.query.insert_artifact()), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("artifact with the name {:?}", artifact.name),
                )
            })?;
        let sql = self.query.select_last_item_id(TypeKind::Artifact);
        let id = Id::new(self.last_row_id(&sql).await?);
        self.write_item_properties(TypeKind::Artifact, id, &artifact.properties, false, false)
            .await?;
        self.write_item_properties(
            TypeKind::Artifact,
            id,
            &artifact.custom_properties,
            true,
            false,
        )
        .await?;
        Ok(id)
    }

    pub async fn update_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError> {
        let id = artifact.id.ok_or_else(|| {
            StoreError::invalid_argument("cannot update an artifact without an id".to_owned())
        })?;
        let schema = self
            .item_type_schema(TypeKind::Artifact, artifact.type_id)
            .await?;
        Self::validate_properties(TypeKind::Artifact, &schema, &artifact.properties)?;
        let sql = self.query.update_artifact();
        let params = vec![
            Parameter::Int(artifact.type_id.get()),
            optional_text(&artifact.name),
            optional_text(&artifact.uri),
            Parameter::Int(artifact.state as i64),
            Parameter::Int(current_millis()),
            Parameter::Int(id.get()),
        ];
        let result = bind_parameters(sqlx::query(&sql), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("artifact with the name {:?}", artifact.name),
                )
            })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("artifact {} is not found", id)));
        }
        self.write_item_properties(TypeKind::Artifact, id, &artifact.properties, false, true)
            .await?;
        self.write_item_properties(
            TypeKind::Artifact,
            id,
            &artifact.custom_properties,
            true,
            true,
        )
        .await?;
        Ok(())
    }

    async fn assemble_artifacts(
        &mut self,
        joins: &str,
        conditions: &[String],
        params: &[Parameter],
        suffix: &str,
    ) -> Result<Vec<Artifact>, StoreError> {
        let rows = self
            .fetch_item_rows(TypeKind::Artifact, joins, conditions, params, suffix)
            .await?;
        let mut artifacts = Vec::with_capacity(rows.len());
        for row in &rows {
            artifacts.push(artifact_from_row(row)?);
        }
        let ids: Vec<i64> = artifacts.iter().filter_map(|a| a.id).map(Id::get).collect();
        let mut properties = self.item_properties(TypeKind::Artifact, &ids).await?;
        for artifact in &mut artifacts {
            if let Some(id) = artifact.id {
                if let Some((plain, custom)) = properties.remove(&id.get()) {
                    artifact.properties = plain;
                    artifact.custom_properties = custom;
                }
            }
        }
        Ok(artifacts)
    }

    pub async fn find_artifacts_by_id(&mut self, ids: &[Id]) -> Result<Vec<Artifact>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = vec![format!("A.id IN ({})", placeholders(ids.len()))];
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(id.get())).collect();
        self.assemble_artifacts("", &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_artifacts(&mut self) -> Result<Vec<Artifact>, StoreError> {
        self.assemble_artifacts("", &[], &[], "ORDER BY A.id").await
    }

    pub async fn list_artifacts(
        &mut self,
        options: &ListOptions,
    ) -> Result<(Vec<Artifact>, Option<String>), StoreError> {
        self.list_artifacts_with("", Vec::new(), Vec::new(), options)
            .await
    }

    async fn list_artifacts_with(
        &mut self,
        joins: &str,
        mut conditions: Vec<String>,
        mut params: Vec<Parameter>,
        options: &ListOptions,
    ) -> Result<(Vec<Artifact>, Option<String>), StoreError> {
        let (extra_conditions, extra_params, suffix, page_size, offset) =
            self.pagination(options, ARTIFACT_FILTER_COLUMNS)?;
        conditions.extend(extra_conditions);
        params.extend(extra_params);
        let mut artifacts = self
            .assemble_artifacts(joins, &conditions, &params, &suffix)
            .await?;
        let next_page_token = if artifacts.len() as i64 > page_size {
            artifacts.truncate(page_size as usize);
            Some(encode_page_token(offset + page_size))
        } else {
            None
        };
        Ok((artifacts, next_page_token))
    }

    pub async fn find_artifacts_by_type_id(
        &mut self,
        type_id: TypeId,
        options: Option<&ListOptions>,
    ) -> Result<(Vec<Artifact>, Option<String>), StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get())];
        match options {
            Some(options) => {
                self.list_artifacts_with("", conditions, params, options)
                    .await
            }
            None => {
                let artifacts = self
                    .assemble_artifacts("", &conditions, &params, "ORDER BY A.id")
                    .await?;
                Ok((artifacts, None))
            }
        }
    }

    pub async fn find_artifact_by_type_id_and_name(
        &mut self,
        type_id: TypeId,
        name: &str,
    ) -> Result<Artifact, StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned(), "A.name = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get()), Parameter::Text(name.to_owned())];
        let artifacts = self.assemble_artifacts("", &conditions, &params, "").await?;
        artifacts.into_iter().next().ok_or_else(|| {
            StoreError::not_found(format!("artifact {:?} of type {} is not found", name, type_id))
        })
    }

    pub async fn find_artifacts_by_uri(&mut self, uri: &str) -> Result<Vec<Artifact>, StoreError> {
        let conditions = vec!["A.uri = ?".to_owned()];
        let params = vec![Parameter::Text(uri.to_owned())];
        self.assemble_artifacts("", &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_artifacts_by_context(
        &mut self,
        context_id: Id,
        options: Option<&ListOptions>,
    ) -> Result<(Vec<Artifact>, Option<String>), StoreError> {
        let joins = "JOIN Attribution AS B ON A.id = B.artifact_id ";
        let conditions = vec!["B.context_id = ?".to_owned()];
        let params = vec![Parameter::Int(context_id.get())];
        match options {
            Some(options) => {
                self.list_artifacts_with(joins, conditions, params, options)
                    .await
            }
            None => {
                let artifacts = self
                    .assemble_artifacts(joins, &conditions, &params, "ORDER BY A.id")
                    .await?;
                Ok((artifacts, None))
            }
        }
    }

    // Executions.

    pub async fn create_execution(&mut self, execution: &Execution) -> Result<Id, StoreError> {
        let schema = self
            .item_type_schema(TypeKind::Execution, execution.type_id)
            .await?;
        Self::validate_properties(TypeKind::Execution, &schema, &execution.properties)?;
        let now = current_millis();
        let params = vec![
            Parameter::Int(execution.type_id.get()),
            optional_text(&execution.name),
            Parameter::Int(execution.last_known_state as i64),
            Parameter::Int(now),
            Parameter::Int(now),
        ];
        bind_parameters(sqlx::query(self.query.insert_execution()), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("execution with the name {:?}", execution.name),
                )
            })?;
        let sql = self.query.select_last_item_id(TypeKind::Execution);
        let id = Id::new(self.last_row_id(&sql).await?);
        self.write_item_properties(TypeKind::Execution, id, &execution.properties, false, false)
            .await?;
        self.write_item_properties(
            TypeKind::Execution,
            id,
            &execution.custom_properties,
            true,
            false,
        )
        .await?;
        Ok(id)
    }

    pub async fn update_execution(&mut self, execution: &Execution) -> Result<(), StoreError> {
        let id = execution.id.ok_or_else(|| {
            StoreError::invalid_argument("cannot update an execution without an id".to_owned())
        })?;
        let schema = self
            .item_type_schema(TypeKind::Execution, execution.type_id)
            .await?;
        Self::validate_properties(TypeKind::Execution, &schema, &execution.properties)?;
        let sql = self.query.update_execution();
        let params = vec![
            Parameter::Int(execution.type_id.get()),
            optional_text(&execution.name),
            Parameter::Int(execution.last_known_state as i64),
            Parameter::Int(current_millis()),
            Parameter::Int(id.get()),
        ];
        let result = bind_parameters(sqlx::query(&sql), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("execution with the name {:?}", execution.name),
                )
            })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "execution {} is not found",
                id
            )));
        }
        self.write_item_properties(TypeKind::Execution, id, &execution.properties, false, true)
            .await?;
        self.write_item_properties(
            TypeKind::Execution,
            id,
            &execution.custom_properties,
            true,
            true,
        )
        .await?;
        Ok(())
    }

    async fn assemble_executions(
        &mut self,
        joins: &str,
        conditions: &[String],
        params: &[Parameter],
        suffix: &str,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = self
            .fetch_item_rows(TypeKind::Execution, joins, conditions, params, suffix)
            .await?;
        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            executions.push(execution_from_row(row)?);
        }
        let ids: Vec<i64> = executions.iter().filter_map(|e| e.id).map(Id::get).collect();
        let mut properties = self.item_properties(TypeKind::Execution, &ids).await?;
        for execution in &mut executions {
            if let Some(id) = execution.id {
                if let Some((plain, custom)) = properties.remove(&id.get()) {
                    execution.properties = plain;
                    execution.custom_properties = custom;
                }
            }
        }
        Ok(executions)
    }

    pub async fn find_executions_by_id(&mut self, ids: &[Id]) -> Result<Vec<Execution>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = vec![format!("A.id IN ({})", placeholders(ids.len()))];
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(id.get())).collect();
        self.assemble_executions("", &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_executions(&mut self) -> Result<Vec<Execution>, StoreError> {
        self.assemble_executions("", &[], &[], "ORDER BY A.id").await
    }

    pub async fn list_executions(
        &mut self,
        options: &ListOptions,
    ) -> Result<(Vec<Execution>, Option<String>), StoreError> {
        self.list_executions_with("", Vec::new(), Vec::new(), options)
            .await
    }

    async fn list_executions_with(
        &mut self,
        joins: &str,
        mut conditions: Vec<String>,
        mut params: Vec<Parameter>,
        options: &ListOptions,
    ) -> Result<(Vec<Execution>, Option<String>), StoreError> {
        let (extra_conditions, extra_params, suffix, page_size, offset) =
            self.pagination(options, EXECUTION_FILTER_COLUMNS)?;
        conditions.extend(extra_conditions);
        params.extend(extra_params);
        let mut executions = self
            .assemble_executions(joins, &conditions, &params, &suffix)
            .await?;
        let next_page_token = if executions.len() as i64 > page_size {
            executions.truncate(page_size as usize);
            Some(encode_page_token(offset + page_size))
        } else {
            None
        };
        Ok((executions, next_page_token))
    }

    pub async fn find_executions_by_type_id(
        &mut self,
        type_id: TypeId,
        options: Option<&ListOptions>,
    ) -> Result<(Vec<Execution>, Option<String>), StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get())];
        match options {
            Some(options) => {
                self.list_executions_with("", conditions, params, options)
                    .await
            }
            None => {
                let executions = self
                    .assemble_executions("", &conditions, &params, "ORDER BY A.id")
                    .await?;
                Ok((executions, None))
            }
        }
    }

    pub async fn find_execution_by_type_id_and_name(
        &mut self,
        type_id: TypeId,
        name: &str,
    ) -> Result<Execution, StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned(), "A.name = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get()), Parameter::Text(name.to_owned())];
        let executions = self.assemble_executions("", &conditions, &params, "").await?;
        executions.into_iter().next().ok_or_else(|| {
            StoreError::not_found(format!(
                "execution {:?} of type {} is not found",
                name, type_id
            ))
        })
    }

    pub async fn find_executions_by_context(
        &mut self,
        context_id: Id,
        options: Option<&ListOptions>,
    ) -> Result<(Vec<Execution>, Option<String>), StoreError> {
        let joins = "JOIN Association AS B ON A.id = B.execution_id ";
        let conditions = vec!["B.context_id = ?".to_owned()];
        let params = vec![Parameter::Int(context_id.get())];
        match options {
            Some(options) => {
                self.list_executions_with(joins, conditions, params, options)
                    .await
            }
            None => {
                let executions = self
                    .assemble_executions(joins, &conditions, &params, "ORDER BY A.id")
                    .await?;
                Ok((executions, None))
            }
        }
    }

    // Contexts.

    pub async fn create_context(&mut self, context: &Context) -> Result<Id, StoreError> {
        if context.name.is_empty() {
            return Err(StoreError::invalid_argument(
                "context must have a non-empty name".to_owned(),
            ));
        }
        let schema = self
            .item_type_schema(TypeKind::Context, context.type_id)
            .await?;
        Self::validate_properties(TypeKind::Context, &schema, &context.properties)?;
        let now = current_millis();
        let params = vec![
            Parameter::Int(context.type_id.get()),
            Parameter::Text(context.name.clone()),
            Parameter::Int(now),
            Parameter::Int(now),
        ];
        bind_parameters(sqlx::query(self.query.insert_context()), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("context with the name {:?}", context.name),
                )
            })?;
        let sql = self.query.select_last_item_id(TypeKind::Context);
        let id = Id::new(self.last_row_id(&sql).await?);
        self.write_item_properties(TypeKind::Context, id, &context.properties, false, false)
            .await?;
        self.write_item_properties(
            TypeKind::Context,
            id,
            &context.custom_properties,
            true,
            false,
        )
        .await?;
        Ok(id)
    }

    pub async fn update_context(&mut self, context: &Context) -> Result<(), StoreError> {
        let id = context.id.ok_or_else(|| {
            StoreError::invalid_argument("cannot update a context without an id".to_owned())
        })?;
        if context.name.is_empty() {
            return Err(StoreError::invalid_argument(
                "context must have a non-empty name".to_owned(),
            ));
        }
        let stored_type_id = self.item_type_id(TypeKind::Context, id).await?.ok_or_else(
            || StoreError::not_found(format!("context {} is not found", id)),
        )?;
        // Moving a context to another type is rejected rather than silently
        // rewriting the (type_id, name) uniqueness domain.
        if stored_type_id != context.type_id.get() {
            return Err(StoreError::invalid_argument(format!(
                "cannot change the type of context {} from {} to {}",
                id, stored_type_id, context.type_id
            )));
        }
        let schema = self
            .item_type_schema(TypeKind::Context, context.type_id)
            .await?;
        Self::validate_properties(TypeKind::Context, &schema, &context.properties)?;
        let sql = self.query.update_context();
        let params = vec![
            Parameter::Text(context.name.clone()),
            Parameter::Int(current_millis()),
            Parameter::Int(id.get()),
        ];
        bind_parameters(sqlx::query(&sql), &params)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("context with the name {:?}", context.name),
                )
            })?;
        self.write_item_properties(TypeKind::Context, id, &context.properties, false, true)
            .await?;
        self.write_item_properties(
            TypeKind::Context,
            id,
            &context.custom_properties,
            true,
            true,
        )
        .await?;
        Ok(())
    }

    async fn item_type_id(&mut self, kind: TypeKind, id: Id) -> Result<Option<i64>, StoreError> {
        let sql = self.query.select_item_type_id(kind);
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut self.connection)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("type_id")?)),
            None => Ok(None),
        }
    }

    async fn assemble_contexts(
        &mut self,
        joins: &str,
        conditions: &[String],
        params: &[Parameter],
        suffix: &str,
    ) -> Result<Vec<Context>, StoreError> {
        let rows = self
            .fetch_item_rows(TypeKind::Context, joins, conditions, params, suffix)
            .await?;
        let mut contexts = Vec::with_capacity(rows.len());
        for row in &rows {
            contexts.push(context_from_row(row)?);
        }
        let ids: Vec<i64> = contexts.iter().filter_map(|c| c.id).map(Id::get).collect();
        let mut properties = self.item_properties(TypeKind::Context, &ids).await?;
        for context in &mut contexts {
            if let Some(id) = context.id {
                if let Some((plain, custom)) = properties.remove(&id.get()) {
                    context.properties = plain;
                    context.custom_properties = custom;
                }
            }
        }
        Ok(contexts)
    }

    pub async fn find_contexts_by_id(&mut self, ids: &[Id]) -> Result<Vec<Context>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = vec![format!("A.id IN ({})", placeholders(ids.len()))];
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(id.get())).collect();
        self.assemble_contexts("", &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_contexts(&mut self) -> Result<Vec<Context>, StoreError> {
        self.assemble_contexts("", &[], &[], "ORDER BY A.id").await
    }

    pub async fn list_contexts(
        &mut self,
        options: &ListOptions,
    ) -> Result<(Vec<Context>, Option<String>), StoreError> {
        self.list_contexts_with("", Vec::new(), Vec::new(), options)
            .await
    }

    async fn list_contexts_with(
        &mut self,
        joins: &str,
        mut conditions: Vec<String>,
        mut params: Vec<Parameter>,
        options: &ListOptions,
    ) -> Result<(Vec<Context>, Option<String>), StoreError> {
        let (extra_conditions, extra_params, suffix, page_size, offset) =
            self.pagination(options, CONTEXT_FILTER_COLUMNS)?;
        conditions.extend(extra_conditions);
        params.extend(extra_params);
        let mut contexts = self
            .assemble_contexts(joins, &conditions, &params, &suffix)
            .await?;
        let next_page_token = if contexts.len() as i64 > page_size {
            contexts.truncate(page_size as usize);
            Some(encode_page_token(offset + page_size))
        } else {
            None
        };
        Ok((contexts, next_page_token))
    }

    pub async fn find_contexts_by_type_id(
        &mut self,
        type_id: TypeId,
        options: Option<&ListOptions>,
    ) -> Result<(Vec<Context>, Option<String>), StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get())];
        match options {
            Some(options) => self.list_contexts_with("", conditions, params, options).await,
            None => {
                let contexts = self
                    .assemble_contexts("", &conditions, &params, "ORDER BY A.id")
                    .await?;
                Ok((contexts, None))
            }
        }
    }

    pub async fn find_context_by_type_id_and_name(
        &mut self,
        type_id: TypeId,
        name: &str,
    ) -> Result<Context, StoreError> {
        let conditions = vec!["A.type_id = ?".to_owned(), "A.name = ?".to_owned()];
        let params = vec![Parameter::Int(type_id.get()), Parameter::Text(name.to_owned())];
        let contexts = self.assemble_contexts("", &conditions, &params, "").await?;
        contexts.into_iter().next().ok_or_else(|| {
            StoreError::not_found(format!("context {:?} of type {} is not found", name, type_id))
        })
    }

    pub async fn find_contexts_by_artifact(
        &mut self,
        artifact_id: Id,
    ) -> Result<Vec<Context>, StoreError> {
        let joins = "JOIN Attribution AS B ON A.id = B.context_id ";
        let conditions = vec!["B.artifact_id = ?".to_owned()];
        let params = vec![Parameter::Int(artifact_id.get())];
        self.assemble_contexts(joins, &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_contexts_by_execution(
        &mut self,
        execution_id: Id,
    ) -> Result<Vec<Context>, StoreError> {
        let joins = "JOIN Association AS B ON A.id = B.context_id ";
        let conditions = vec!["B.execution_id = ?".to_owned()];
        let params = vec![Parameter::Int(execution_id.get())];
        self.assemble_contexts(joins, &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_parent_contexts_by_context_id(
        &mut self,
        context_id: Id,
    ) -> Result<Vec<Context>, StoreError> {
        let joins = "JOIN ParentContext AS P ON A.id = P.parent_context_id ";
        let conditions = vec!["P.context_id = ?".to_owned()];
        let params = vec![Parameter::Int(context_id.get())];
        self.assemble_contexts(joins, &conditions, &params, "ORDER BY A.id")
            .await
    }

    pub async fn find_child_contexts_by_context_id(
        &mut self,
        context_id: Id,
    ) -> Result<Vec<Context>, StoreError> {
        let joins = "JOIN ParentContext AS P ON A.id = P.context_id ";
        let conditions = vec!["P.parent_context_id = ?".to_owned()];
        let params = vec![Parameter::Int(context_id.get())];
        self.assemble_contexts(joins, &conditions, &params, "ORDER BY A.id")
            .await
    }

    // Events.

    pub async fn create_event(&mut self, event: &Event) -> Result<(), StoreError> {
        let artifact_id = event.artifact_id.ok_or_else(|| {
            StoreError::invalid_argument("event must have an artifact_id".to_owned())
        })?;
        let execution_id = event.execution_id.ok_or_else(|| {
            StoreError::invalid_argument("event must have an execution_id".to_owned())
        })?;
        if !self.item_exists(TypeKind::Artifact, artifact_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "event references artifact {} that does not exist",
                artifact_id
            )));
        }
        if !self.item_exists(TypeKind::Execution, execution_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "event references execution {} that does not exist",
                execution_id
            )));
        }
        let milliseconds = event
            .milliseconds_since_epoch
            .map(|d| d.as_millis() as i64)
            .unwrap_or_else(current_millis);
        sqlx::query(self.query.insert_event())
            .bind(artifact_id.get())
            .bind(execution_id.get())
            .bind(event.ty.code())
            .bind(milliseconds)
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!(
                        "event between artifact {} and execution {}",
                        artifact_id, execution_id
                    ),
                )
            })?;
        if event.path.is_empty() {
            return Ok(());
        }
        let event_id = self.last_row_id(self.query.select_last_event_id()).await?;
        for step in &event.path {
            match step {
                EventStep::Index(index) => {
                    sqlx::query(self.query.insert_event_path_index())
                        .bind(event_id)
                        .bind(*index)
                        .execute(&mut self.connection)
                        .await?;
                }
                EventStep::Key(key) => {
                    sqlx::query(self.query.insert_event_path_key())
                        .bind(event_id)
                        .bind(key.as_str())
                        .execute(&mut self.connection)
                        .await?;
                }
            }
        }
        Ok(())
    }

    pub async fn find_events_by_artifacts(&mut self, ids: &[Id]) -> Result<Vec<Event>, StoreError> {
        self.find_events_by_column("artifact_id", ids).await
    }

    pub async fn find_events_by_executions(
        &mut self,
        ids: &[Id],
    ) -> Result<Vec<Event>, StoreError> {
        self.find_events_by_column("execution_id", ids).await
    }

    async fn find_events_by_column(
        &mut self,
        column: &str,
        ids: &[Id],
    ) -> Result<Vec<Event>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.query.select_events_by_column(column, ids.len());
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(id.get())).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        let mut events = Vec::with_capacity(rows.len());
        let mut event_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            event_ids.push(id);
            events.push((id, event_from_row(row)?));
        }
        let mut paths = self.event_paths(&event_ids).await?;
        Ok(events
            .into_iter()
            .map(|(id, mut event)| {
                if let Some(path) = paths.remove(&id) {
                    event.path = path;
                }
                event
            })
            .collect())
    }

    async fn event_paths(
        &mut self,
        event_ids: &[i64],
    ) -> Result<BTreeMap<i64, Vec<EventStep>>, StoreError> {
        let mut paths: BTreeMap<i64, Vec<EventStep>> = BTreeMap::new();
        if event_ids.is_empty() {
            return Ok(paths);
        }
        let sql = self.query.select_event_paths(event_ids.len());
        let params: Vec<Parameter> = event_ids.iter().map(|id| Parameter::Int(*id)).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        for row in rows {
            let event_id: i64 = row.try_get("event_id")?;
            let is_index_step = row.try_get::<i64, _>("is_index_step")? != 0;
            let step = if is_index_step {
                let index: Option<i64> = row.try_get("step_index")?;
                EventStep::Index(index.unwrap_or_default())
            } else {
                let key: Option<String> = row.try_get("step_key")?;
                EventStep::Key(key.unwrap_or_default())
            };
            paths.entry(event_id).or_default().push(step);
        }
        Ok(paths)
    }

    // Context links.

    pub async fn create_attribution(
        &mut self,
        context_id: Id,
        artifact_id: Id,
    ) -> Result<(), StoreError> {
        if !self.item_exists(TypeKind::Context, context_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "attribution references context {} that does not exist",
                context_id
            )));
        }
        if !self.item_exists(TypeKind::Artifact, artifact_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "attribution references artifact {} that does not exist",
                artifact_id
            )));
        }
        sqlx::query(self.query.insert_attribution())
            .bind(context_id.get())
            .bind(artifact_id.get())
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("attribution ({}, {})", context_id, artifact_id),
                )
            })?;
        Ok(())
    }

    pub async fn create_association(
        &mut self,
        context_id: Id,
        execution_id: Id,
    ) -> Result<(), StoreError> {
        if !self.item_exists(TypeKind::Context, context_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "association references context {} that does not exist",
                context_id
            )));
        }
        if !self.item_exists(TypeKind::Execution, execution_id).await? {
            return Err(StoreError::invalid_argument(format!(
                "association references execution {} that does not exist",
                execution_id
            )));
        }
        sqlx::query(self.query.insert_association())
            .bind(context_id.get())
            .bind(execution_id.get())
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("association ({}, {})", context_id, execution_id),
                )
            })?;
        Ok(())
    }

    pub async fn create_parent_context(
        &mut self,
        parent_id: Id,
        child_id: Id,
    ) -> Result<(), StoreError> {
        if parent_id == child_id {
            return Err(StoreError::invalid_argument(format!(
                "context {} cannot be its own parent",
                child_id
            )));
        }
        for id in [parent_id, child_id] {
            if !self.item_exists(TypeKind::Context, id).await? {
                return Err(StoreError::invalid_argument(format!(
                    "parent context link references context {} that does not exist",
                    id
                )));
            }
        }
        sqlx::query(self.query.insert_parent_context())
            .bind(child_id.get())
            .bind(parent_id.get())
            .execute(&mut self.connection)
            .await
            .map_err(|e| {
                StoreError::from_insert_conflict(
                    e,
                    format!("parent context link ({}, {})", parent_id, child_id),
                )
            })?;
        Ok(())
    }

    // Lineage traversal.

    /// Bounded expansion from `seeds`. One hop crosses the adjacent
    /// executions from the current artifact ring to the next one, so an
    /// `a0 -> e0 -> a1 -> ...` chain reaches `a{k}` after `k` hops.
    /// Boundary nodes are neither expanded nor returned.
    pub async fn query_lineage_graph(
        &mut self,
        seeds: &[Artifact],
        max_num_hops: i64,
        max_node_size: Option<i64>,
        boundary_artifacts: Option<&str>,
        boundary_executions: Option<&str>,
    ) -> Result<LineageGraph, StoreError> {
        let artifact_boundary = boundary_artifacts
            .map(|expr| filter::translate(expr, ARTIFACT_FILTER_COLUMNS, "A."))
            .transpose()?;
        let execution_boundary = boundary_executions
            .map(|expr| filter::translate(expr, EXECUTION_FILTER_COLUMNS, "A."))
            .transpose()?;

        let mut artifact_ids: BTreeSet<i64> =
            seeds.iter().filter_map(|a| a.id).map(Id::get).collect();
        let mut execution_ids: BTreeSet<i64> = BTreeSet::new();
        let mut frontier: Vec<i64> = artifact_ids.iter().copied().collect();

        for _ in 0..max_num_hops {
            if frontier.is_empty() {
                break;
            }
            if node_budget_left(max_node_size, &artifact_ids, &execution_ids) == 0 {
                break;
            }
            // Artifact ring -> adjacent executions.
            let edges = self.event_edges("artifact_id", &frontier).await?;
            let mut new_executions: Vec<i64> = dedupe(
                edges
                    .iter()
                    .map(|(_, execution_id)| *execution_id)
                    .filter(|id| !execution_ids.contains(id)),
            );
            if let Some(boundary) = &execution_boundary {
                let excluded = self
                    .boundary_matches(TypeKind::Execution, &new_executions, boundary)
                    .await?;
                new_executions.retain(|id| !excluded.contains(id));
            }
            let budget = node_budget_left(max_node_size, &artifact_ids, &execution_ids);
            new_executions.truncate(budget);
            if new_executions.is_empty() {
                break;
            }
            execution_ids.extend(new_executions.iter().copied());

            // Adjacent executions -> next artifact ring.
            let edges = self.event_edges("execution_id", &new_executions).await?;
            let mut new_artifacts: Vec<i64> = dedupe(
                edges
                    .iter()
                    .map(|(artifact_id, _)| *artifact_id)
                    .filter(|id| !artifact_ids.contains(id)),
            );
            if let Some(boundary) = &artifact_boundary {
                let excluded = self
                    .boundary_matches(TypeKind::Artifact, &new_artifacts, boundary)
                    .await?;
                new_artifacts.retain(|id| !excluded.contains(id));
            }
            let budget = node_budget_left(max_node_size, &artifact_ids, &execution_ids);
            new_artifacts.truncate(budget);
            artifact_ids.extend(new_artifacts.iter().copied());
            frontier = new_artifacts;
        }

        let artifact_id_list: Vec<Id> = artifact_ids.iter().map(|id| Id::new(*id)).collect();
        let execution_id_list: Vec<Id> = execution_ids.iter().map(|id| Id::new(*id)).collect();
        let artifacts = self.find_artifacts_by_id(&artifact_id_list).await?;
        let executions = self.find_executions_by_id(&execution_id_list).await?;

        // Edges induced on the collected node set.
        let events: Vec<Event> = self
            .find_events_by_artifacts(&artifact_id_list)
            .await?
            .into_iter()
            .filter(|event| {
                event
                    .execution_id
                    .map(|id| execution_ids.contains(&id.get()))
                    .unwrap_or(false)
            })
            .collect();
        let attributions = self.attributions_by_artifacts(&artifact_id_list).await?;
        let associations = self.associations_by_executions(&execution_id_list).await?;

        let context_ids: BTreeSet<i64> = attributions
            .iter()
            .map(|a| a.context_id.get())
            .chain(associations.iter().map(|a| a.context_id.get()))
            .collect();
        let context_id_list: Vec<Id> = context_ids.iter().map(|id| Id::new(*id)).collect();
        let contexts = self.find_contexts_by_id(&context_id_list).await?;

        let artifact_types = self
            .types_of_items(artifacts.iter().map(|a| a.type_id))
            .await?;
        let execution_types = self
            .types_of_items(executions.iter().map(|e| e.type_id))
            .await?;
        let context_types = self
            .types_of_items(contexts.iter().map(|c| c.type_id))
            .await?;

        Ok(LineageGraph {
            artifact_types,
            execution_types,
            context_types,
            artifacts,
            executions,
            contexts,
            events,
            attributions,
            associations,
        })
    }

    async fn types_of_items<T: PropertiedType>(
        &mut self,
        type_ids: impl Iterator<Item = TypeId>,
    ) -> Result<Vec<T>, StoreError> {
        let distinct: BTreeSet<TypeId> = type_ids.collect();
        let mut types = Vec::with_capacity(distinct.len());
        for type_id in distinct {
            match self.find_type_by_id::<T>(type_id).await {
                Ok(ty) => types.push(ty),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(types)
    }

    async fn event_edges(
        &mut self,
        column: &str,
        ids: &[i64],
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.query.select_event_edges(column, ids.len());
        let params: Vec<Parameter> = ids.iter().map(|id| Parameter::Int(*id)).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push((row.try_get("artifact_id")?, row.try_get("execution_id")?));
        }
        Ok(edges)
    }

    async fn boundary_matches(
        &mut self,
        kind: TypeKind,
        candidate_ids: &[i64],
        boundary: &FilterSql,
    ) -> Result<BTreeSet<i64>, StoreError> {
        if candidate_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let sql = format!(
            "SELECT A.id FROM {} AS A WHERE A.id IN ({}) AND ({})",
            kind.item_table_name(),
            placeholders(candidate_ids.len()),
            boundary.clause
        );
        let mut params: Vec<Parameter> =
            candidate_ids.iter().map(|id| Parameter::Int(*id)).collect();
        params.extend(boundary.params.iter().cloned());
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        let mut matches = BTreeSet::new();
        for row in rows {
            matches.insert(row.try_get("id")?);
        }
        Ok(matches)
    }

    async fn attributions_by_artifacts(
        &mut self,
        artifact_ids: &[Id],
    ) -> Result<Vec<Attribution>, StoreError> {
        if artifact_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.query.select_attributions_by_artifacts(artifact_ids.len());
        let params: Vec<Parameter> = artifact_ids.iter().map(|id| Parameter::Int(id.get())).collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        let mut attributions = Vec::with_capacity(rows.len());
        for row in rows {
            attributions.push(Attribution {
                context_id: Id::new(row.try_get("context_id")?),
                artifact_id: Id::new(row.try_get("artifact_id")?),
            });
        }
        Ok(attributions)
    }

    async fn associations_by_executions(
        &mut self,
        execution_ids: &[Id],
    ) -> Result<Vec<Association>, StoreError> {
        if execution_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self
            .query
            .select_associations_by_executions(execution_ids.len());
        let params: Vec<Parameter> = execution_ids
            .iter()
            .map(|id| Parameter::Int(id.get()))
            .collect();
        let rows = bind_parameters(sqlx::query(&sql), &params)
            .fetch_all(&mut self.connection)
            .await?;
        let mut associations = Vec::with_capacity(rows.len());
        for row in rows {
            associations.push(Association {
                context_id: Id::new(row.try_get("context_id")?),
                execution_id: Id::new(row.try_get("execution_id")?),
            });
        }
        Ok(associations)
    }
}

type ItemProperties =
    BTreeMap<i64, (BTreeMap<String, PropertyValue>, BTreeMap<String, PropertyValue>)>;

fn optional_text(value: &Option<String>) -> Parameter {
    match value {
        Some(text) => Parameter::Text(text.clone()),
        None => Parameter::Null,
    }
}

fn dedupe(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn node_budget_left(
    max_node_size: Option<i64>,
    artifact_ids: &BTreeSet<i64>,
    execution_ids: &BTreeSet<i64>,
) -> usize {
    match max_node_size {
        Some(max) if max > 0 => {
            let used = (artifact_ids.len() + execution_ids.len()) as i64;
            (max - used).max(0) as usize
        }
        _ => usize::MAX,
    }
}

fn artifact_from_row(row: &AnyRow) -> Result<Artifact, StoreError> {
    let state: Option<i64> = row.try_get("state")?;
    Ok(Artifact {
        id: Some(Id::new(row.try_get("id")?)),
        type_id: TypeId::new(row.try_get("type_id")?),
        name: row.try_get("name")?,
        uri: row.try_get("uri")?,
        properties: BTreeMap::new(),
        custom_properties: BTreeMap::new(),
        state: ArtifactState::from_code(state.unwrap_or_default()).map_err(decode_error)?,
        create_time_since_epoch: duration_from_row(row, "create_time_since_epoch")?,
        last_update_time_since_epoch: duration_from_row(row, "last_update_time_since_epoch")?,
    })
}

fn execution_from_row(row: &AnyRow) -> Result<Execution, StoreError> {
    let state: Option<i64> = row.try_get("last_known_state")?;
    Ok(Execution {
        id: Some(Id::new(row.try_get("id")?)),
        type_id: TypeId::new(row.try_get("type_id")?),
        name: row.try_get("name")?,
        last_known_state: ExecutionState::from_code(state.unwrap_or_default())
            .map_err(decode_error)?,
        properties: BTreeMap::new(),
        custom_properties: BTreeMap::new(),
        create_time_since_epoch: duration_from_row(row, "create_time_since_epoch")?,
        last_update_time_since_epoch: duration_from_row(row, "last_update_time_since_epoch")?,
    })
}

fn context_from_row(row: &AnyRow) -> Result<Context, StoreError> {
    Ok(Context {
        id: Some(Id::new(row.try_get("id")?)),
        type_id: TypeId::new(row.try_get("type_id")?),
        name: row.try_get("name")?,
        properties: BTreeMap::new(),
        custom_properties: BTreeMap::new(),
        create_time_since_epoch: duration_from_row(row, "create_time_since_epoch")?,
        last_update_time_since_epoch: duration_from_row(row, "last_update_time_since_epoch")?,
    })
}

fn event_from_row(row: &AnyRow) -> Result<Event, StoreError> {
    Ok(Event {
        artifact_id: Some(Id::new(row.try_get("artifact_id")?)),
        execution_id: Some(Id::new(row.try_get("execution_id")?)),
        ty: EventType::from_code(row.try_get("type")?).map_err(decode_error)?,
        path: Vec::new(),
        milliseconds_since_epoch: Some(duration_from_row(row, "milliseconds_since_epoch")?),
    })
}

fn duration_from_row(row: &AnyRow, column: &str) -> Result<Duration, StoreError> {
    let millis: Option<i64> = row.try_get(column)?;
    Ok(Duration::from_millis(millis.unwrap_or_default().max(0) as u64))
}
