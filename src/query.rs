//! SQL text for the supported backends.
//!
//! Everything the access object sends to the database lives here, so the
//! dialect differences (upsert syntax, index DDL, `GREATEST` vs `MAX`) stay
//! in one place.
use crate::metadata::TypeKind;

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Parameter {
    Int(i64),
    Double(f64),
    Text(String),
    Null,
}

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

pub(crate) fn bind_parameters<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    params: &'q [Parameter],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    let mut query = query;
    for param in params {
        query = match param {
            Parameter::Int(v) => query.bind(*v),
            Parameter::Double(v) => query.bind(*v),
            Parameter::Text(v) => query.bind(v.as_str()),
            Parameter::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

#[derive(Debug, Clone)]
pub(crate) enum Query {
    Sqlite(SqliteQuery),
    Mysql(MysqlQuery),
}

impl Query {
    pub fn sqlite() -> Self {
        Self::Sqlite(SqliteQuery)
    }

    pub fn mysql() -> Self {
        Self::Mysql(MysqlQuery)
    }

    pub fn begin_transaction(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "BEGIN",
            Self::Mysql(_) => "START TRANSACTION",
        }
    }

    pub fn commit_transaction(&self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_transaction(&self) -> &'static str {
        "ROLLBACK"
    }

    pub fn create_tables(&self) -> &'static [&'static str] {
        match self {
            Self::Sqlite(x) => x.create_tables(),
            Self::Mysql(x) => x.create_tables(),
        }
    }

    /// DDL applied when upgrading from `from_version` to `from_version + 1`.
    pub fn upgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match self {
            Self::Sqlite(x) => x.upgrade_statements(from_version),
            Self::Mysql(x) => x.upgrade_statements(from_version),
        }
    }

    /// DDL applied when downgrading from `from_version` to `from_version - 1`.
    pub fn downgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match self {
            Self::Sqlite(x) => x.downgrade_statements(from_version),
            Self::Mysql(x) => x.downgrade_statements(from_version),
        }
    }

    pub fn select_schema_version(&self) -> &'static str {
        "SELECT schema_version FROM MLMDEnv"
    }

    pub fn insert_schema_version(&self) -> &'static str {
        "INSERT INTO MLMDEnv VALUES (?)"
    }

    pub fn update_schema_version(&self) -> &'static str {
        "UPDATE MLMDEnv SET schema_version = ?"
    }

    // Types.

    pub fn insert_type(&self) -> &'static str {
        "INSERT INTO Type (name, version, type_kind) VALUES (?, ?, ?)"
    }

    pub fn insert_type_property(&self) -> &'static str {
        "INSERT INTO TypeProperty (type_id, name, data_type) VALUES (?, ?, ?)"
    }

    pub fn select_last_type_id(&self) -> &'static str {
        "SELECT id FROM Type ORDER BY id DESC LIMIT 1"
    }

    pub fn select_type_by_name_and_version(&self, has_version: bool) -> String {
        let version_condition = if has_version {
            "version = ?"
        } else {
            "version IS NULL"
        };
        format!(
            "SELECT id, name, version FROM Type WHERE type_kind = ? AND name = ? AND {}",
            version_condition
        )
    }

    pub fn select_type_by_id(&self) -> &'static str {
        "SELECT id, name, version FROM Type WHERE type_kind = ? AND id = ?"
    }

    pub fn select_types(&self) -> &'static str {
        "SELECT id, name, version FROM Type WHERE type_kind = ? ORDER BY id"
    }

    pub fn select_type_properties(&self, n_ids: usize) -> String {
        format!(
            "SELECT type_id, name, data_type FROM TypeProperty WHERE type_id IN ({})",
            placeholders(n_ids)
        )
    }

    pub fn select_type_property_names(&self) -> &'static str {
        "SELECT name FROM TypeProperty WHERE type_id = ?"
    }

    pub fn select_parent_types(&self, n_ids: usize) -> String {
        format!(
            concat!(
                "SELECT PT.type_id AS child_id, T.name AS parent_name ",
                "FROM ParentType AS PT JOIN Type AS T ON T.id = PT.parent_type_id ",
                "WHERE PT.type_id IN ({})"
            ),
            placeholders(n_ids)
        )
    }

    pub fn insert_parent_type(&self) -> &'static str {
        "INSERT INTO ParentType (type_id, parent_type_id) VALUES (?, ?)"
    }

    // Artifacts, executions and contexts.

    pub fn insert_artifact(&self) -> &'static str {
        concat!(
            "INSERT INTO Artifact ",
            "(type_id, name, uri, state, create_time_since_epoch, last_update_time_since_epoch) ",
            "VALUES (?, ?, ?, ?, ?, ?)"
        )
    }

    /// The update bumps `last_update_time_since_epoch` to
    /// `max(now, stored + 1)` so it strictly increases even when two
    /// updates land within the same millisecond.
    pub fn update_artifact(&self) -> String {
        format!(
            concat!(
                "UPDATE Artifact SET type_id = ?, name = ?, uri = ?, state = ?, ",
                "last_update_time_since_epoch = {} WHERE id = ?"
            ),
            self.monotonic_update_time()
        )
    }

    pub fn insert_execution(&self) -> &'static str {
        concat!(
            "INSERT INTO Execution ",
            "(type_id, name, last_known_state, create_time_since_epoch, last_update_time_since_epoch) ",
            "VALUES (?, ?, ?, ?, ?)"
        )
    }

    pub fn update_execution(&self) -> String {
        format!(
            concat!(
                "UPDATE Execution SET type_id = ?, name = ?, last_known_state = ?, ",
                "last_update_time_since_epoch = {} WHERE id = ?"
            ),
            self.monotonic_update_time()
        )
    }

    pub fn insert_context(&self) -> &'static str {
        concat!(
            "INSERT INTO Context ",
            "(type_id, name, create_time_since_epoch, last_update_time_since_epoch) ",
            "VALUES (?, ?, ?, ?)"
        )
    }

    pub fn update_context(&self) -> String {
        format!(
            concat!(
                "UPDATE Context SET name = ?, ",
                "last_update_time_since_epoch = {} WHERE id = ?"
            ),
            self.monotonic_update_time()
        )
    }

    fn monotonic_update_time(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "MAX(?, last_update_time_since_epoch + 1)",
            Self::Mysql(_) => "GREATEST(?, last_update_time_since_epoch + 1)",
        }
    }

    pub fn select_last_item_id(&self, kind: TypeKind) -> String {
        format!(
            "SELECT id FROM {} ORDER BY id DESC LIMIT 1",
            kind.item_table_name()
        )
    }

    pub fn check_item_id(&self, kind: TypeKind) -> String {
        format!(
            "SELECT COUNT(*) AS c FROM {} WHERE id = ?",
            kind.item_table_name()
        )
    }

    pub fn select_item_type_id(&self, kind: TypeKind) -> String {
        format!("SELECT type_id FROM {} WHERE id = ?", kind.item_table_name())
    }

    /// SELECT prefix for item queries; the main table is aliased `A` so the
    /// caller can append joins and conditions.
    pub fn select_items_prefix(&self, kind: TypeKind) -> String {
        let columns = match kind {
            TypeKind::Artifact => {
                "A.id, A.type_id, A.name, A.uri, A.state, A.create_time_since_epoch, A.last_update_time_since_epoch"
            }
            TypeKind::Execution => {
                "A.id, A.type_id, A.name, A.last_known_state, A.create_time_since_epoch, A.last_update_time_since_epoch"
            }
            TypeKind::Context => {
                "A.id, A.type_id, A.name, A.create_time_since_epoch, A.last_update_time_since_epoch"
            }
        };
        format!("SELECT {} FROM {} AS A ", columns, kind.item_table_name())
    }

    pub fn select_item_properties(&self, kind: TypeKind, n_ids: usize) -> String {
        format!(
            concat!(
                "SELECT {kind}_id AS id, name, is_custom_property, ",
                "int_value, double_value, string_value, struct_value ",
                "FROM {table}Property WHERE {kind}_id IN ({ids})"
            ),
            kind = kind,
            table = kind.item_table_name(),
            ids = placeholders(n_ids)
        )
    }

    pub fn upsert_item_property(&self, kind: TypeKind, value_column: &str) -> String {
        match self {
            Self::Sqlite(x) => x.upsert_item_property(kind, value_column),
            Self::Mysql(x) => x.upsert_item_property(kind, value_column),
        }
    }

    pub fn delete_item_properties(&self, kind: TypeKind, n_kept: usize) -> String {
        let mut sql = format!(
            "DELETE FROM {}Property WHERE {}_id = ? AND is_custom_property = ?",
            kind.item_table_name(),
            kind
        );
        if n_kept > 0 {
            sql += &format!(" AND name NOT IN ({})", placeholders(n_kept));
        }
        sql
    }

    // Events.

    pub fn insert_event(&self) -> &'static str {
        "INSERT INTO Event (artifact_id, execution_id, type, milliseconds_since_epoch) VALUES (?, ?, ?, ?)"
    }

    pub fn select_last_event_id(&self) -> &'static str {
        "SELECT id FROM Event ORDER BY id DESC LIMIT 1"
    }

    pub fn insert_event_path_index(&self) -> &'static str {
        "INSERT INTO EventPath (event_id, is_index_step, step_index) VALUES (?, 1, ?)"
    }

    pub fn insert_event_path_key(&self) -> &'static str {
        "INSERT INTO EventPath (event_id, is_index_step, step_key) VALUES (?, 0, ?)"
    }

    pub fn select_events_by_column(&self, column: &str, n_ids: usize) -> String {
        format!(
            concat!(
                "SELECT id, artifact_id, execution_id, type, milliseconds_since_epoch ",
                "FROM Event WHERE {} IN ({}) ORDER BY id"
            ),
            column,
            placeholders(n_ids)
        )
    }

    pub fn select_event_paths(&self, n_ids: usize) -> String {
        format!(
            concat!(
                "SELECT event_id, is_index_step, step_index, step_key ",
                "FROM EventPath WHERE event_id IN ({})"
            ),
            placeholders(n_ids)
        )
    }

    // Context links.

    pub fn insert_attribution(&self) -> &'static str {
        "INSERT INTO Attribution (context_id, artifact_id) VALUES (?, ?)"
    }

    pub fn insert_association(&self) -> &'static str {
        "INSERT INTO Association (context_id, execution_id) VALUES (?, ?)"
    }

    pub fn insert_parent_context(&self) -> &'static str {
        "INSERT INTO ParentContext (context_id, parent_context_id) VALUES (?, ?)"
    }

    pub fn select_attributions_by_artifacts(&self, n_ids: usize) -> String {
        format!(
            "SELECT context_id, artifact_id FROM Attribution WHERE artifact_id IN ({})",
            placeholders(n_ids)
        )
    }

    pub fn select_associations_by_executions(&self, n_ids: usize) -> String {
        format!(
            "SELECT context_id, execution_id FROM Association WHERE execution_id IN ({})",
            placeholders(n_ids)
        )
    }

    pub fn select_event_edges(&self, column: &str, n_ids: usize) -> String {
        format!(
            "SELECT artifact_id, execution_id FROM Event WHERE {} IN ({})",
            column,
            placeholders(n_ids)
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SqliteQuery;

impl SqliteQuery {
    fn create_tables(&self) -> &'static [&'static str] {
        &[
            concat!(
                " CREATE TABLE IF NOT EXISTS `Type` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `version` VARCHAR(255), ",
                "   `type_kind` TINYINT(1) NOT NULL ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `TypeProperty` ( ",
                "   `type_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `data_type` INT NULL, ",
                " PRIMARY KEY (`type_id`, `name`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ParentType` ( ",
                "   `type_id` INT NOT NULL, ",
                "   `parent_type_id` INT NOT NULL, ",
                " PRIMARY KEY (`type_id`, `parent_type_id`));"
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Artifact` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `uri` TEXT, ",
                "   `state` INT, ",
                "   `name` VARCHAR(255), ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ArtifactProperty` ( ",
                "   `artifact_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`artifact_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Execution` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `last_known_state` INT, ",
                "   `name` VARCHAR(255), ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ExecutionProperty` ( ",
                "   `execution_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`execution_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Context` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ContextProperty` ( ",
                "   `context_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`context_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ParentContext` ( ",
                "   `context_id` INT NOT NULL, ",
                "   `parent_context_id` INT NOT NULL, ",
                " PRIMARY KEY (`context_id`, `parent_context_id`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Event` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `artifact_id` INT NOT NULL, ",
                "   `execution_id` INT NOT NULL, ",
                "   `type` INT NOT NULL, ",
                "   `milliseconds_since_epoch` BIGINT ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `EventPath` ( ",
                "   `event_id` INT NOT NULL, ",
                "   `is_index_step` TINYINT(1) NOT NULL, ",
                "   `step_index` INT, ",
                "   `step_key` TEXT ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Association` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `context_id` INT NOT NULL, ",
                "   `execution_id` INT NOT NULL, ",
                "   UNIQUE(`context_id`, `execution_id`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Attribution` ( ",
                "   `id` INTEGER PRIMARY KEY AUTOINCREMENT, ",
                "   `context_id` INT NOT NULL, ",
                "   `artifact_id` INT NOT NULL, ",
                "   UNIQUE(`context_id`, `artifact_id`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `MLMDEnv` ( ",
                "   `schema_version` INTEGER PRIMARY KEY ",
                " ); "
            ),
            " CREATE INDEX IF NOT EXISTS `idx_artifact_uri` ON `Artifact`(`uri`); ",
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_artifact_create_time_since_epoch` ",
                " ON `Artifact`(`create_time_since_epoch`); "
            ),
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_artifact_last_update_time_since_epoch` ",
                " ON `Artifact`(`last_update_time_since_epoch`); "
            ),
            " CREATE INDEX IF NOT EXISTS `idx_event_artifact_id` ON `Event`(`artifact_id`); ",
            " CREATE INDEX IF NOT EXISTS `idx_event_execution_id` ON `Event`(`execution_id`); ",
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_parentcontext_parent_context_id` ",
                " ON `ParentContext`(`parent_context_id`); "
            ),
            " CREATE INDEX IF NOT EXISTS `idx_type_name` ON `Type`(`name`); ",
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_execution_create_time_since_epoch` ",
                " ON `Execution`(`create_time_since_epoch`); "
            ),
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_execution_last_update_time_since_epoch` ",
                " ON `Execution`(`last_update_time_since_epoch`); "
            ),
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_context_create_time_since_epoch` ",
                " ON `Context`(`create_time_since_epoch`); "
            ),
            concat!(
                " CREATE INDEX IF NOT EXISTS `idx_context_last_update_time_since_epoch` ",
                " ON `Context`(`last_update_time_since_epoch`); "
            ),
            // Schema version 2.
            concat!(
                " CREATE UNIQUE INDEX IF NOT EXISTS `uniq_type_name_version_kind` ",
                " ON `Type`(`name`, `version`, `type_kind`); "
            ),
            concat!(
                " CREATE UNIQUE INDEX IF NOT EXISTS `uniq_event_artifact_execution_type` ",
                " ON `Event`(`artifact_id`, `execution_id`, `type`); "
            ),
        ]
    }

    fn upgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match from_version {
            1 => &[
                concat!(
                    " CREATE UNIQUE INDEX IF NOT EXISTS `uniq_type_name_version_kind` ",
                    " ON `Type`(`name`, `version`, `type_kind`); "
                ),
                concat!(
                    " CREATE UNIQUE INDEX IF NOT EXISTS `uniq_event_artifact_execution_type` ",
                    " ON `Event`(`artifact_id`, `execution_id`, `type`); "
                ),
            ],
            _ => &[],
        }
    }

    fn downgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match from_version {
            2 => &[
                "DROP INDEX IF EXISTS `uniq_type_name_version_kind`;",
                "DROP INDEX IF EXISTS `uniq_event_artifact_execution_type`;",
            ],
            1 => &[
                "DROP TABLE IF EXISTS `TypeProperty`;",
                "DROP TABLE IF EXISTS `ParentType`;",
                "DROP TABLE IF EXISTS `ArtifactProperty`;",
                "DROP TABLE IF EXISTS `ExecutionProperty`;",
                "DROP TABLE IF EXISTS `ContextProperty`;",
                "DROP TABLE IF EXISTS `ParentContext`;",
                "DROP TABLE IF EXISTS `EventPath`;",
                "DROP TABLE IF EXISTS `Event`;",
                "DROP TABLE IF EXISTS `Association`;",
                "DROP TABLE IF EXISTS `Attribution`;",
                "DROP TABLE IF EXISTS `Artifact`;",
                "DROP TABLE IF EXISTS `Execution`;",
                "DROP TABLE IF EXISTS `Context`;",
                "DROP TABLE IF EXISTS `Type`;",
                "DROP TABLE IF EXISTS `MLMDEnv`;",
            ],
            _ => &[],
        }
    }

    fn upsert_item_property(&self, kind: TypeKind, value_column: &str) -> String {
        format!(
            concat!(
                "INSERT INTO {table}Property ",
                "({kind}_id, name, is_custom_property, {column}) ",
                "VALUES (?, ?, ?, ?) ",
                "ON CONFLICT ({kind}_id, name, is_custom_property) ",
                "DO UPDATE SET {assignments}"
            ),
            table = kind.item_table_name(),
            kind = kind,
            column = value_column,
            assignments = property_value_assignments(value_column)
        )
    }
}

/// One assignment per value column: the active one gets a placeholder, the
/// rest are nulled so a re-typed custom property never keeps a stale value.
fn property_value_assignments(value_column: &str) -> String {
    ["int_value", "double_value", "string_value", "struct_value"]
        .iter()
        .map(|column| {
            if *column == value_column {
                format!("{} = ?", column)
            } else {
                format!("{} = NULL", column)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub(crate) struct MysqlQuery;

impl MysqlQuery {
    fn create_tables(&self) -> &'static [&'static str] {
        &[
            concat!(
                " CREATE TABLE IF NOT EXISTS `Type` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `version` VARCHAR(255), ",
                "   `type_kind` TINYINT(1) NOT NULL ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `TypeProperty` ( ",
                "   `type_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `data_type` INT NULL, ",
                " PRIMARY KEY (`type_id`, `name`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ParentType` ( ",
                "   `type_id` INT NOT NULL, ",
                "   `parent_type_id` INT NOT NULL, ",
                " PRIMARY KEY (`type_id`, `parent_type_id`));"
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Artifact` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `uri` TEXT, ",
                "   `state` INT, ",
                "   `name` VARCHAR(255), ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   CONSTRAINT UniqueArtifactTypeName UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ArtifactProperty` ( ",
                "   `artifact_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`artifact_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Execution` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `last_known_state` INT, ",
                "   `name` VARCHAR(255), ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   CONSTRAINT UniqueExecutionTypeName UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ExecutionProperty` ( ",
                "   `execution_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`execution_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Context` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `type_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `create_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   `last_update_time_since_epoch` BIGINT NOT NULL DEFAULT 0, ",
                "   UNIQUE(`type_id`, `name`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ContextProperty` ( ",
                "   `context_id` INT NOT NULL, ",
                "   `name` VARCHAR(255) NOT NULL, ",
                "   `is_custom_property` TINYINT(1) NOT NULL, ",
                "   `int_value` INT, ",
                "   `double_value` DOUBLE, ",
                "   `string_value` TEXT, ",
                "   `struct_value` TEXT, ",
                " PRIMARY KEY (`context_id`, `name`, `is_custom_property`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `ParentContext` ( ",
                "   `context_id` INT NOT NULL, ",
                "   `parent_context_id` INT NOT NULL, ",
                " PRIMARY KEY (`context_id`, `parent_context_id`)); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Event` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `artifact_id` INT NOT NULL, ",
                "   `execution_id` INT NOT NULL, ",
                "   `type` INT NOT NULL, ",
                "   `milliseconds_since_epoch` BIGINT ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `EventPath` ( ",
                "   `event_id` INT NOT NULL, ",
                "   `is_index_step` TINYINT(1) NOT NULL, ",
                "   `step_index` INT, ",
                "   `step_key` TEXT ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Association` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `context_id` INT NOT NULL, ",
                "   `execution_id` INT NOT NULL, ",
                "   UNIQUE(`context_id`, `execution_id`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `Attribution` ( ",
                "   `id` INT PRIMARY KEY AUTO_INCREMENT, ",
                "   `context_id` INT NOT NULL, ",
                "   `artifact_id` INT NOT NULL, ",
                "   UNIQUE(`context_id`, `artifact_id`) ",
                " ); "
            ),
            concat!(
                " CREATE TABLE IF NOT EXISTS `MLMDEnv` ( ",
                "   `schema_version` INTEGER PRIMARY KEY ",
                " ); "
            ),
            concat!(
                " ALTER TABLE `Artifact` ",
                "  ADD INDEX `idx_artifact_uri`(`uri`(255)), ",
                "  ADD INDEX `idx_artifact_create_time_since_epoch` ",
                "             (`create_time_since_epoch`), ",
                "  ADD INDEX `idx_artifact_last_update_time_since_epoch` ",
                "             (`last_update_time_since_epoch`); "
            ),
            concat!(
                " ALTER TABLE `Event` ",
                " ADD INDEX `idx_event_artifact_id` (`artifact_id`), ",
                " ADD INDEX `idx_event_execution_id` (`execution_id`), ",
                " ADD UNIQUE INDEX `uniq_event_artifact_execution_type` ",
                "     (`artifact_id`, `execution_id`, `type`); "
            ),
            concat!(
                " ALTER TABLE `ParentContext` ",
                " ADD INDEX `idx_parentcontext_parent_context_id` (`parent_context_id`); "
            ),
            concat!(
                " ALTER TABLE `Type` ",
                " ADD INDEX `idx_type_name` (`name`), ",
                " ADD UNIQUE INDEX `uniq_type_name_version_kind` ",
                "     (`name`, `version`, `type_kind`); "
            ),
            concat!(
                " ALTER TABLE `Execution` ",
                "  ADD INDEX `idx_execution_create_time_since_epoch` ",
                "             (`create_time_since_epoch`), ",
                "  ADD INDEX `idx_execution_last_update_time_since_epoch` ",
                "             (`last_update_time_since_epoch`); "
            ),
            concat!(
                " ALTER TABLE `Context` ",
                "  ADD INDEX `idx_context_create_time_since_epoch` ",
                "             (`create_time_since_epoch`), ",
                "  ADD INDEX `idx_context_last_update_time_since_epoch` ",
                "             (`last_update_time_since_epoch`); "
            ),
        ]
    }

    fn upgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match from_version {
            1 => &[
                concat!(
                    " ALTER TABLE `Type` ADD UNIQUE INDEX ",
                    " `uniq_type_name_version_kind` (`name`, `version`, `type_kind`); "
                ),
                concat!(
                    " ALTER TABLE `Event` ADD UNIQUE INDEX ",
                    " `uniq_event_artifact_execution_type` ",
                    " (`artifact_id`, `execution_id`, `type`); "
                ),
            ],
            _ => &[],
        }
    }

    fn downgrade_statements(&self, from_version: i64) -> &'static [&'static str] {
        match from_version {
            2 => &[
                " ALTER TABLE `Type` DROP INDEX `uniq_type_name_version_kind`; ",
                " ALTER TABLE `Event` DROP INDEX `uniq_event_artifact_execution_type`; ",
            ],
            1 => &[
                "DROP TABLE IF EXISTS `TypeProperty`;",
                "DROP TABLE IF EXISTS `ParentType`;",
                "DROP TABLE IF EXISTS `ArtifactProperty`;",
                "DROP TABLE IF EXISTS `ExecutionProperty`;",
                "DROP TABLE IF EXISTS `ContextProperty`;",
                "DROP TABLE IF EXISTS `ParentContext`;",
                "DROP TABLE IF EXISTS `EventPath`;",
                "DROP TABLE IF EXISTS `Event`;",
                "DROP TABLE IF EXISTS `Association`;",
                "DROP TABLE IF EXISTS `Attribution`;",
                "DROP TABLE IF EXISTS `Artifact`;",
                "DROP TABLE IF EXISTS `Execution`;",
                "DROP TABLE IF EXISTS `Context`;",
                "DROP TABLE IF EXISTS `Type`;",
                "DROP TABLE IF EXISTS `MLMDEnv`;",
            ],
            _ => &[],
        }
    }

    fn upsert_item_property(&self, kind: TypeKind, value_column: &str) -> String {
        format!(
            concat!(
                "INSERT INTO {table}Property ",
                "({kind}_id, name, is_custom_property, {column}) ",
                "VALUES (?, ?, ?, ?) ",
                "ON DUPLICATE KEY UPDATE {assignments}"
            ),
            table = kind.item_table_name(),
            kind = kind,
            column = value_column,
            assignments = property_value_assignments(value_column)
        )
    }
}
