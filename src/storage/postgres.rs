//! PostgreSQL storage backend
//!
//! Multi-statement operations run in one transaction. Profile writes take
//! `FOR SHARE` locks on the referenced account and type rows, which makes them
//! serialize against `begin_account_deletion` and `delete_type`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    AccountDirectory, FieldDefinitionStore, FieldValueStore, ProfileRecordStore, ProfileTypeStore,
    Storage,
};
use crate::domain::profiles::NewProfileRecord;
use crate::domain::{
    Account, AccountId, AccountStatus, Cardinality, DisplayConfig, FieldDefinition, FieldKind,
    FieldValue, FieldValues, NewAccount, ProfileId, ProfileRecord, ProfileType, WidgetConfig,
};
use crate::error::{ProfileError, ProfileResult};

/// Storage backend on a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn records_with_values(&self, rows: Vec<ProfileRow>) -> ProfileResult<Vec<ProfileRecord>> {
        let ids: Vec<ProfileId> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.pool.acquire().await?;
        let mut values = load_values(&mut conn, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let fields = values.remove(&row.id).unwrap_or_default();
                row.into_record(fields)
            })
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    name: String,
    mail: String,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            mail: row.mail,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileTypeRow {
    id: String,
    label: String,
    weight: i32,
    registration: bool,
}

impl From<ProfileTypeRow> for ProfileType {
    fn from(row: ProfileTypeRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            weight: row.weight,
            registration: row.registration,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FieldDefinitionRow {
    type_id: String,
    name: String,
    label: String,
    kind: String,
    cardinality: i32,
    required: bool,
    widget: Json<WidgetConfig>,
    display: Json<DisplayConfig>,
}

impl TryFrom<FieldDefinitionRow> for FieldDefinition {
    type Error = ProfileError;

    fn try_from(row: FieldDefinitionRow) -> Result<Self, Self::Error> {
        let kind = FieldKind::parse(&row.kind).ok_or_else(|| {
            ProfileError::Database(sqlx::Error::Decode(
                format!("unknown field kind {}", row.kind).into(),
            ))
        })?;
        Ok(Self {
            type_id: row.type_id,
            name: row.name,
            label: row.label,
            kind,
            cardinality: Cardinality::from_storage(row.cardinality),
            required: row.required,
            widget: row.widget.0,
            display: row.display.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    uuid: Uuid,
    type_id: String,
    uid: i64,
    created: DateTime<Utc>,
    changed: DateTime<Utc>,
}

impl ProfileRow {
    fn into_record(self, fields: FieldValues) -> ProfileRecord {
        ProfileRecord {
            id: self.id,
            uuid: self.uuid,
            profile_type: self.type_id,
            uid: self.uid,
            created: self.created,
            changed: self.changed,
            fields,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FieldValueRow {
    profile_id: i64,
    field_name: String,
    value: Json<FieldValue>,
}

const PROFILE_COLUMNS: &str = "id, uuid, type AS type_id, uid, created, changed";

async fn load_values(
    conn: &mut PgConnection,
    ids: &[ProfileId],
) -> ProfileResult<HashMap<ProfileId, FieldValues>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, FieldValueRow>(
        r#"
        SELECT profile_id, field_name, value
        FROM profile_field_values
        WHERE profile_id = ANY($1)
        ORDER BY profile_id, field_name, delta
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut values: HashMap<ProfileId, FieldValues> = HashMap::new();
    for row in rows {
        values
            .entry(row.profile_id)
            .or_default()
            .entry(row.field_name)
            .or_default()
            .push(row.value.0);
    }
    Ok(values)
}

async fn write_field(
    conn: &mut PgConnection,
    profile_id: ProfileId,
    field_name: &str,
    values: &[FieldValue],
) -> ProfileResult<()> {
    sqlx::query("DELETE FROM profile_field_values WHERE profile_id = $1 AND field_name = $2")
        .bind(profile_id)
        .bind(field_name)
        .execute(&mut *conn)
        .await?;

    for (delta, value) in values.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO profile_field_values (profile_id, field_name, delta, value)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(profile_id)
        .bind(field_name)
        .bind(delta as i32)
        .bind(Json(value))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_values(
    conn: &mut PgConnection,
    profile_id: ProfileId,
    fields: &FieldValues,
) -> ProfileResult<()> {
    sqlx::query("DELETE FROM profile_field_values WHERE profile_id = $1")
        .bind(profile_id)
        .execute(&mut *conn)
        .await?;

    for (name, values) in fields {
        write_field(conn, profile_id, name, values).await?;
    }
    Ok(())
}

/// Locks the referenced type and account rows for the rest of the transaction.
async fn lock_references(
    conn: &mut PgConnection,
    profile_type: &str,
    uid: AccountId,
) -> ProfileResult<()> {
    let type_found: Option<String> =
        sqlx::query_scalar("SELECT id FROM profile_types WHERE id = $1 FOR SHARE")
            .bind(profile_type)
            .fetch_optional(&mut *conn)
            .await?;
    if type_found.is_none() {
        return Err(ProfileError::reference(format!(
            "Profile type {} does not exist",
            profile_type
        )));
    }

    let account_found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 AND status = $2 FOR SHARE")
            .bind(uid)
            .bind(AccountStatus::Active.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    if account_found.is_none() {
        return Err(ProfileError::reference(format!("Account {} does not exist", uid)));
    }
    Ok(())
}

#[async_trait]
impl AccountDirectory for PgStorage {
    async fn create_account(&self, account: &NewAccount) -> ProfileResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (name, mail, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, mail, created_at
            "#,
        )
        .bind(&account.name)
        .bind(&account.mail)
        .bind(AccountStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::from).ok_or_else(|| {
            ProfileError::conflict(format!("The username {} is already taken.", account.name))
        })
    }

    async fn account(&self, uid: AccountId) -> ProfileResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, name, mail, created_at FROM accounts WHERE id = $1 AND status = $2",
        )
        .bind(uid)
        .bind(AccountStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn account_by_name(&self, name: &str) -> ProfileResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, name, mail, created_at FROM accounts WHERE name = $1 AND status = $2",
        )
        .bind(name)
        .bind(AccountStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn account_exists(&self, uid: AccountId) -> ProfileResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1 AND status = $2)",
        )
        .bind(uid)
        .bind(AccountStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn account_display_name(&self, uid: AccountId) -> ProfileResult<Option<String>> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM accounts WHERE id = $1 AND status = $2")
                .bind(uid)
                .bind(AccountStatus::Active.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(name)
    }

    async fn begin_account_deletion(&self, uid: AccountId) -> ProfileResult<bool> {
        let result = sqlx::query("UPDATE accounts SET status = $2 WHERE id = $1 AND status = $3")
            .bind(uid)
            .bind(AccountStatus::Deleting.as_str())
            .bind(AccountStatus::Active.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn finish_account_deletion(&self, uid: AccountId) -> ProfileResult<()> {
        let mut tx = self.pool.begin().await?;

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE uid = $1")
            .bind(uid)
            .fetch_one(&mut *tx)
            .await?;
        if remaining > 0 {
            return Err(ProfileError::reference(format!(
                "Account {} still owns {} profiles",
                uid, remaining
            )));
        }

        sqlx::query("DELETE FROM accounts WHERE id = $1 AND status = $2")
            .bind(uid)
            .bind(AccountStatus::Deleting.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn abort_account_deletion(&self, uid: AccountId) -> ProfileResult<()> {
        sqlx::query("UPDATE accounts SET status = $2 WHERE id = $1")
            .bind(uid)
            .bind(AccountStatus::Active.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileTypeStore for PgStorage {
    async fn insert_type(&self, profile_type: &ProfileType) -> ProfileResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO profile_types (id, label, weight, registration)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&profile_type.id)
        .bind(&profile_type.label)
        .bind(profile_type.weight)
        .bind(profile_type.registration)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProfileError::conflict(format!(
                "Profile type {} already exists",
                profile_type.id
            )));
        }
        Ok(())
    }

    async fn update_type(&self, profile_type: &ProfileType) -> ProfileResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profile_types
            SET label = $2, weight = $3, registration = $4
            WHERE id = $1
            "#,
        )
        .bind(&profile_type.id)
        .bind(&profile_type.label)
        .bind(profile_type.weight)
        .bind(profile_type.registration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_type(&self, id: &str) -> ProfileResult<Option<ProfileType>> {
        let row = sqlx::query_as::<_, ProfileTypeRow>(
            "SELECT id, label, weight, registration FROM profile_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProfileType::from))
    }

    async fn list_types(&self) -> ProfileResult<Vec<ProfileType>> {
        let rows = sqlx::query_as::<_, ProfileTypeRow>(
            "SELECT id, label, weight, registration FROM profile_types ORDER BY weight, label",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProfileType::from).collect())
    }

    async fn delete_type(&self, id: &str) -> ProfileResult<bool> {
        let mut tx = self.pool.begin().await?;

        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM profile_types WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Ok(false);
        }

        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE type = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if in_use > 0 {
            return Err(ProfileError::conflict(format!(
                "Profile type {} is used by {} profiles",
                id, in_use
            )));
        }

        // Field definitions go with the type (ON DELETE CASCADE)
        sqlx::query("DELETE FROM profile_types WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl FieldDefinitionStore for PgStorage {
    async fn insert_definition(&self, definition: &FieldDefinition) -> ProfileResult<()> {
        let mut tx = self.pool.begin().await?;

        let type_found: Option<String> =
            sqlx::query_scalar("SELECT id FROM profile_types WHERE id = $1 FOR SHARE")
                .bind(&definition.type_id)
                .fetch_optional(&mut *tx)
                .await?;
        if type_found.is_none() {
            return Err(ProfileError::reference(format!(
                "Profile type {} does not exist",
                definition.type_id
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO profile_fields
                (type_id, name, label, kind, cardinality, required, widget, display)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (type_id, name) DO NOTHING
            "#,
        )
        .bind(&definition.type_id)
        .bind(&definition.name)
        .bind(&definition.label)
        .bind(definition.kind.as_str())
        .bind(definition.cardinality.to_storage())
        .bind(definition.required)
        .bind(Json(&definition.widget))
        .bind(Json(&definition.display))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProfileError::conflict(format!(
                "Field {} is already attached to {}",
                definition.name, definition.type_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn field_definitions(&self, type_id: &str) -> ProfileResult<Vec<FieldDefinition>> {
        let rows = sqlx::query_as::<_, FieldDefinitionRow>(
            r#"
            SELECT type_id, name, label, kind, cardinality, required, widget, display
            FROM profile_fields
            WHERE type_id = $1
            ORDER BY position
            "#,
        )
        .bind(type_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FieldDefinition::try_from).collect()
    }
}

#[async_trait]
impl FieldValueStore for PgStorage {
    async fn get_value(&self, profile_id: ProfileId, field_name: &str) -> ProfileResult<Vec<FieldValue>> {
        let values: Vec<Json<FieldValue>> = sqlx::query_scalar(
            r#"
            SELECT value FROM profile_field_values
            WHERE profile_id = $1 AND field_name = $2
            ORDER BY delta
            "#,
        )
        .bind(profile_id)
        .bind(field_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(values.into_iter().map(|v| v.0).collect())
    }

    async fn set_value(
        &self,
        profile_id: ProfileId,
        field_name: &str,
        values: &[FieldValue],
    ) -> ProfileResult<()> {
        let mut tx = self.pool.begin().await?;

        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(profile_id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Err(ProfileError::reference(format!(
                "Profile {} does not exist",
                profile_id
            )));
        }

        write_field(&mut tx, profile_id, field_name, values).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRecordStore for PgStorage {
    async fn insert_profile(&self, record: &NewProfileRecord) -> ProfileResult<ProfileId> {
        let mut tx = self.pool.begin().await?;

        lock_references(&mut tx, &record.profile_type, record.uid).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO profiles (uuid, type, uid, created, changed)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(record.uuid)
        .bind(&record.profile_type)
        .bind(record.uid)
        .bind(record.created)
        .bind(record.changed)
        .fetch_one(&mut *tx)
        .await?;

        write_values(&mut tx, id, &record.fields).await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update_profile(&self, record: &ProfileRecord) -> ProfileResult<()> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String, i64)> =
            sqlx::query_as("SELECT type, uid FROM profiles WHERE id = $1 FOR UPDATE")
                .bind(record.id)
                .fetch_optional(&mut *tx)
                .await?;
        let (profile_type, uid) = existing.ok_or_else(|| {
            ProfileError::reference(format!("Profile {} has been deleted", record.id))
        })?;

        lock_references(&mut tx, &profile_type, uid).await?;

        sqlx::query("UPDATE profiles SET changed = $2 WHERE id = $1")
            .bind(record.id)
            .bind(record.changed)
            .execute(&mut *tx)
            .await?;

        write_values(&mut tx, record.id, &record.fields).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_profile(&self, id: ProfileId) -> ProfileResult<Option<ProfileRecord>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.records_with_values(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn profiles_by_owner(
        &self,
        uid: AccountId,
        profile_type: Option<&str>,
    ) -> ProfileResult<Vec<ProfileRecord>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE uid = $1 AND ($2::TEXT IS NULL OR type = $2) ORDER BY id",
            PROFILE_COLUMNS
        ))
        .bind(uid)
        .bind(profile_type)
        .fetch_all(&self.pool)
        .await?;

        self.records_with_values(rows).await
    }

    async fn delete_profile(&self, id: ProfileId) -> ProfileResult<bool> {
        // Field values go with the row (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_profiles_by_owner(&self, uid: AccountId) -> ProfileResult<Vec<ProfileId>> {
        let mut ids: Vec<i64> = sqlx::query_scalar("DELETE FROM profiles WHERE uid = $1 RETURNING id")
            .bind(uid)
            .fetch_all(&self.pool)
            .await?;
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl Storage for PgStorage {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> bool {
        crate::db::health_check(&self.pool).await
    }
}
