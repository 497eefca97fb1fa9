//! Postgres-backed `ClaimStore`
//!
//! Every statement is parameterized via `Statement::from_sql_and_values`;
//! caller-supplied values are never interpolated into query text. Singleton
//! upserts load the current row, merge in Rust (the same coalesce logic the
//! in-memory store uses), and write the whole row back with
//! `ON CONFLICT DO UPDATE`.

use super::ClaimStore;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult,
    Statement, Value,
};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Self::connect(&config.url, config).await?;

        let replica = if let Some(ref read_url) = config.read_url {
            info!("Connecting to read replica...");
            Some(Self::connect(read_url, config).await?)
        } else {
            None
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    async fn connect(url: &str, config: &DatabaseConfig) -> Result<DatabaseConnection> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        Database::connect(opts).await.map_err(|e| AppError::Connection {
            message: format!("Failed to connect: {}", e),
        })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }
}

/// Postgres `ClaimStore` over a `DbPool`
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn stmt(sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }
}

/// Map driver errors onto the gateway taxonomy: unreachable store becomes a
/// connection error, key/check violations become constraint errors with the
/// violated constraint name when the driver reports one.
fn map_db_err(err: DbErr) -> AppError {
    match err {
        DbErr::Conn(e) => AppError::Connection {
            message: e.to_string(),
        },
        DbErr::ConnectionAcquire(e) => AppError::Connection {
            message: e.to_string(),
        },
        other => {
            let message = other.to_string();
            if message.contains("violates") {
                let field = message
                    .split('"')
                    .nth(1)
                    .unwrap_or("unknown")
                    .to_string();
                AppError::Constraint { field, message }
            } else {
                AppError::Database(other)
            }
        }
    }
}

fn parse_col<T>(raw: String, what: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(|e| AppError::Internal {
        message: format!("corrupt {what} column: {e}"),
    })
}

// ============================================================================
// Row mapping
// ============================================================================

fn personal_info_from_row(row: &QueryResult) -> Result<PersonalInfo> {
    Ok(PersonalInfo {
        first_name: row.try_get("", "first_name").map_err(map_db_err)?,
        middle_name: row.try_get("", "middle_name").map_err(map_db_err)?,
        last_name: row.try_get("", "last_name").map_err(map_db_err)?,
        date_of_birth: row.try_get("", "date_of_birth").map_err(map_db_err)?,
        ssn_last_four: row.try_get("", "ssn_last_four").map_err(map_db_err)?,
        phone: row.try_get("", "phone").map_err(map_db_err)?,
        email: row.try_get("", "email").map_err(map_db_err)?,
        street_address: row.try_get("", "street_address").map_err(map_db_err)?,
        city: row.try_get("", "city").map_err(map_db_err)?,
        state: row.try_get("", "state").map_err(map_db_err)?,
        postal_code: row.try_get("", "postal_code").map_err(map_db_err)?,
    })
}

fn military_service_from_row(row: &QueryResult) -> Result<MilitaryService> {
    let branch: Option<String> = row.try_get("", "branch").map_err(map_db_err)?;
    let retirement: Option<String> = row.try_get("", "retirement_type").map_err(map_db_err)?;
    Ok(MilitaryService {
        branch: branch.map(|s| parse_col(s, "branch")).transpose()?,
        service_start_date: row.try_get("", "service_start_date").map_err(map_db_err)?,
        service_end_date: row.try_get("", "service_end_date").map_err(map_db_err)?,
        discharge_type: row.try_get("", "discharge_type").map_err(map_db_err)?,
        rank_at_separation: row.try_get("", "rank_at_separation").map_err(map_db_err)?,
        retirement_type: retirement
            .map(|s| parse_col(s, "retirement_type"))
            .transpose()?,
        currently_serving: row.try_get("", "currently_serving").map_err(map_db_err)?,
    })
}

fn va_disability_from_row(row: &QueryResult) -> Result<VaDisabilityInfo> {
    Ok(VaDisabilityInfo {
        has_existing_rating: row.try_get("", "has_existing_rating").map_err(map_db_err)?,
        combined_rating: row.try_get("", "combined_rating").map_err(map_db_err)?,
        monthly_compensation_cents: row
            .try_get("", "monthly_compensation_cents")
            .map_err(map_db_err)?,
        effective_date: row.try_get("", "effective_date").map_err(map_db_err)?,
    })
}

fn claim_from_row(row: &QueryResult) -> Result<DisabilityClaim> {
    let combat: Option<String> = row.try_get("", "combat_related").map_err(map_db_err)?;
    Ok(DisabilityClaim {
        id: row.try_get("", "id").map_err(map_db_err)?,
        user_id: row.try_get("", "user_id").map_err(map_db_err)?,
        title: row.try_get("", "title").map_err(map_db_err)?,
        diagnostic_code: row.try_get("", "diagnostic_code").map_err(map_db_err)?,
        description: row.try_get("", "description").map_err(map_db_err)?,
        claimed_rating: row.try_get("", "claimed_rating").map_err(map_db_err)?,
        combat_related: combat.map(|s| parse_col(s, "combat_related")).transpose()?,
        onset_date: row.try_get("", "onset_date").map_err(map_db_err)?,
        treatment_facility: row.try_get("", "treatment_facility").map_err(map_db_err)?,
        created_at: row.try_get("", "created_at").map_err(map_db_err)?,
    })
}

fn user_from_row(row: &QueryResult) -> Result<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("", "id").map_err(map_db_err)?,
        email: row.try_get("", "email").map_err(map_db_err)?,
        is_admin: row.try_get("", "is_admin").map_err(map_db_err)?,
        veteran_verified: row.try_get("", "veteran_verified").map_err(map_db_err)?,
        verified_at: row.try_get("", "verified_at").map_err(map_db_err)?,
        created_at: row.try_get("", "created_at").map_err(map_db_err)?,
    })
}

fn document_from_row(row: &QueryResult) -> Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.try_get("", "id").map_err(map_db_err)?,
        user_id: row.try_get("", "user_id").map_err(map_db_err)?,
        document_type: row.try_get("", "document_type").map_err(map_db_err)?,
        filename: row.try_get("", "filename").map_err(map_db_err)?,
        size_bytes: row.try_get("", "size_bytes").map_err(map_db_err)?,
        mime_type: row.try_get("", "mime_type").map_err(map_db_err)?,
        storage_path: row.try_get("", "storage_path").map_err(map_db_err)?,
        created_at: row.try_get("", "created_at").map_err(map_db_err)?,
    })
}

fn turn_from_row(row: &QueryResult) -> Result<ConversationTurn> {
    let role: String = row.try_get("", "role").map_err(map_db_err)?;
    Ok(ConversationTurn {
        id: row.try_get("", "id").map_err(map_db_err)?,
        role: parse_col(role, "role")?,
        text: row.try_get("", "text").map_err(map_db_err)?,
        created_at: row.try_get("", "created_at").map_err(map_db_err)?,
    })
}

fn step_from_row(row: &QueryResult) -> Result<StepStatusRow> {
    let step: String = row.try_get("", "step").map_err(map_db_err)?;
    let status: String = row.try_get("", "status").map_err(map_db_err)?;
    Ok(StepStatusRow {
        step: parse_col(step, "step")?,
        status: parse_col(status, "status")?,
        completed_at: row.try_get("", "completed_at").map_err(map_db_err)?,
        updated_at: row.try_get("", "updated_at").map_err(map_db_err)?,
    })
}

fn payment_from_row(row: &QueryResult) -> Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: row.try_get("", "id").map_err(map_db_err)?,
        user_id: row.try_get("", "user_id").map_err(map_db_err)?,
        provider_ref: row.try_get("", "provider_ref").map_err(map_db_err)?,
        amount_cents: row.try_get("", "amount_cents").map_err(map_db_err)?,
        status: row.try_get("", "status").map_err(map_db_err)?,
        paid_at: row.try_get("", "paid_at").map_err(map_db_err)?,
        created_at: row.try_get("", "created_at").map_err(map_db_err)?,
    })
}

#[async_trait]
impl ClaimStore for PgStore {
    // ------------------------------------------------------------------
    // User
    // ------------------------------------------------------------------

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT id, email, is_admin, veteran_verified, verified_at, created_at \
                 FROM users WHERE id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert_user(&self, user_id: &str, patch: UserPatch) -> Result<UserProfile> {
        let mut user = self
            .get_user(user_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(user_id));
        user.merge(patch);

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO users (id, email, is_admin, veteran_verified, verified_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET \
                   email = EXCLUDED.email, \
                   is_admin = EXCLUDED.is_admin, \
                   veteran_verified = EXCLUDED.veteran_verified, \
                   verified_at = EXCLUDED.verified_at",
                vec![
                    user.id.clone().into(),
                    user.email.clone().into(),
                    user.is_admin.into(),
                    user.veteran_verified.into(),
                    user.verified_at.into(),
                    user.created_at.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(user)
    }

    // ------------------------------------------------------------------
    // Singleton-per-user records
    // ------------------------------------------------------------------

    async fn get_personal_info(&self, user_id: &str) -> Result<Option<PersonalInfo>> {
        let row = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT first_name, middle_name, last_name, date_of_birth, ssn_last_four, \
                        phone, email, street_address, city, state, postal_code \
                 FROM personal_info WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        row.as_ref().map(personal_info_from_row).transpose()
    }

    async fn upsert_personal_info(
        &self,
        user_id: &str,
        patch: PersonalInfoPatch,
    ) -> Result<PersonalInfo> {
        let mut info = self.get_personal_info(user_id).await?.unwrap_or_default();
        info.merge(patch);

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO personal_info \
                   (user_id, first_name, middle_name, last_name, date_of_birth, ssn_last_four, \
                    phone, email, street_address, city, state, postal_code, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                   first_name = EXCLUDED.first_name, \
                   middle_name = EXCLUDED.middle_name, \
                   last_name = EXCLUDED.last_name, \
                   date_of_birth = EXCLUDED.date_of_birth, \
                   ssn_last_four = EXCLUDED.ssn_last_four, \
                   phone = EXCLUDED.phone, \
                   email = EXCLUDED.email, \
                   street_address = EXCLUDED.street_address, \
                   city = EXCLUDED.city, \
                   state = EXCLUDED.state, \
                   postal_code = EXCLUDED.postal_code, \
                   updated_at = EXCLUDED.updated_at",
                vec![
                    user_id.into(),
                    info.first_name.clone().into(),
                    info.middle_name.clone().into(),
                    info.last_name.clone().into(),
                    info.date_of_birth.into(),
                    info.ssn_last_four.clone().into(),
                    info.phone.clone().into(),
                    info.email.clone().into(),
                    info.street_address.clone().into(),
                    info.city.clone().into(),
                    info.state.clone().into(),
                    info.postal_code.clone().into(),
                    Utc::now().into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(info)
    }

    async fn get_military_service(&self, user_id: &str) -> Result<Option<MilitaryService>> {
        let row = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT branch, service_start_date, service_end_date, discharge_type, \
                        rank_at_separation, retirement_type, currently_serving \
                 FROM military_service WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        row.as_ref().map(military_service_from_row).transpose()
    }

    async fn upsert_military_service(
        &self,
        user_id: &str,
        patch: MilitaryServicePatch,
    ) -> Result<MilitaryService> {
        let mut svc = self.get_military_service(user_id).await?.unwrap_or_default();
        svc.merge(patch);

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO military_service \
                   (user_id, branch, service_start_date, service_end_date, discharge_type, \
                    rank_at_separation, retirement_type, currently_serving, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                   branch = EXCLUDED.branch, \
                   service_start_date = EXCLUDED.service_start_date, \
                   service_end_date = EXCLUDED.service_end_date, \
                   discharge_type = EXCLUDED.discharge_type, \
                   rank_at_separation = EXCLUDED.rank_at_separation, \
                   retirement_type = EXCLUDED.retirement_type, \
                   currently_serving = EXCLUDED.currently_serving, \
                   updated_at = EXCLUDED.updated_at",
                vec![
                    user_id.into(),
                    svc.branch.map(|b| b.as_str().to_string()).into(),
                    svc.service_start_date.into(),
                    svc.service_end_date.into(),
                    svc.discharge_type.clone().into(),
                    svc.rank_at_separation.clone().into(),
                    svc.retirement_type.map(|r| r.as_str().to_string()).into(),
                    svc.currently_serving.into(),
                    Utc::now().into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(svc)
    }

    async fn get_va_disability_info(&self, user_id: &str) -> Result<Option<VaDisabilityInfo>> {
        let row = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT has_existing_rating, combined_rating, monthly_compensation_cents, \
                        effective_date \
                 FROM va_disability_info WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        row.as_ref().map(va_disability_from_row).transpose()
    }

    async fn upsert_va_disability_info(
        &self,
        user_id: &str,
        patch: VaDisabilityInfoPatch,
    ) -> Result<VaDisabilityInfo> {
        let mut info = self
            .get_va_disability_info(user_id)
            .await?
            .unwrap_or_default();
        info.merge(patch);

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO va_disability_info \
                   (user_id, has_existing_rating, combined_rating, monthly_compensation_cents, \
                    effective_date, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                   has_existing_rating = EXCLUDED.has_existing_rating, \
                   combined_rating = EXCLUDED.combined_rating, \
                   monthly_compensation_cents = EXCLUDED.monthly_compensation_cents, \
                   effective_date = EXCLUDED.effective_date, \
                   updated_at = EXCLUDED.updated_at",
                vec![
                    user_id.into(),
                    info.has_existing_rating.into(),
                    info.combined_rating.into(),
                    info.monthly_compensation_cents.into(),
                    info.effective_date.into(),
                    Utc::now().into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(info)
    }

    // ------------------------------------------------------------------
    // Disability claims
    // ------------------------------------------------------------------

    async fn list_claims(&self, user_id: &str) -> Result<Vec<DisabilityClaim>> {
        let rows = self
            .pool
            .read()
            .query_all(Self::stmt(
                "SELECT id, user_id, title, diagnostic_code, description, claimed_rating, \
                        combat_related, onset_date, treatment_facility, created_at \
                 FROM disability_claims WHERE user_id = $1 ORDER BY created_at ASC",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        rows.iter().map(claim_from_row).collect()
    }

    async fn create_claim(&self, user_id: &str, input: ClaimInput) -> Result<DisabilityClaim> {
        let claim = DisabilityClaim::from_input(user_id, input);

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO disability_claims \
                   (id, user_id, title, diagnostic_code, description, claimed_rating, \
                    combat_related, onset_date, treatment_facility, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                vec![
                    claim.id.into(),
                    claim.user_id.clone().into(),
                    claim.title.clone().into(),
                    claim.diagnostic_code.clone().into(),
                    claim.description.clone().into(),
                    claim.claimed_rating.into(),
                    claim.combat_related.map(|c| c.as_str().to_string()).into(),
                    claim.onset_date.into(),
                    claim.treatment_facility.clone().into(),
                    claim.created_at.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(claim)
    }

    async fn update_claim(
        &self,
        user_id: &str,
        claim_id: Uuid,
        patch: ClaimPatch,
    ) -> Result<Option<DisabilityClaim>> {
        // Owner scoping happens on the read; a mismatched pair finds nothing
        let row = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT id, user_id, title, diagnostic_code, description, claimed_rating, \
                        combat_related, onset_date, treatment_facility, created_at \
                 FROM disability_claims WHERE id = $1 AND user_id = $2",
                vec![claim_id.into(), user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut claim = claim_from_row(&row)?;
        claim.merge(patch);

        self.pool
            .write()
            .execute(Self::stmt(
                "UPDATE disability_claims SET \
                   title = $3, diagnostic_code = $4, description = $5, claimed_rating = $6, \
                   combat_related = $7, onset_date = $8, treatment_facility = $9 \
                 WHERE id = $1 AND user_id = $2",
                vec![
                    claim_id.into(),
                    user_id.into(),
                    claim.title.clone().into(),
                    claim.diagnostic_code.clone().into(),
                    claim.description.clone().into(),
                    claim.claimed_rating.into(),
                    claim.combat_related.map(|c| c.as_str().to_string()).into(),
                    claim.onset_date.into(),
                    claim.treatment_facility.clone().into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(Some(claim))
    }

    async fn delete_claim(&self, user_id: &str, claim_id: Uuid) -> Result<()> {
        self.pool
            .write()
            .execute(Self::stmt(
                "DELETE FROM disability_claims WHERE id = $1 AND user_id = $2",
                vec![claim_id.into(), user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>> {
        let rows = self
            .pool
            .read()
            .query_all(Self::stmt(
                "SELECT id, user_id, document_type, filename, size_bytes, mime_type, \
                        storage_path, created_at \
                 FROM documents WHERE user_id = $1 ORDER BY created_at ASC",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn create_document(
        &self,
        user_id: &str,
        input: DocumentInput,
    ) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            document_type: input.document_type,
            filename: input.filename,
            size_bytes: input.size_bytes,
            mime_type: input.mime_type,
            storage_path: input.storage_path,
            created_at: Utc::now(),
        };

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO documents \
                   (id, user_id, document_type, filename, size_bytes, mime_type, \
                    storage_path, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                vec![
                    record.id.into(),
                    record.user_id.clone().into(),
                    record.document_type.clone().into(),
                    record.filename.clone().into(),
                    record.size_bytes.into(),
                    record.mime_type.clone().into(),
                    record.storage_path.clone().into(),
                    record.created_at.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(record)
    }

    async fn delete_document(&self, user_id: &str, document_id: Uuid) -> Result<()> {
        self.pool
            .write()
            .execute(Self::stmt(
                "DELETE FROM documents WHERE id = $1 AND user_id = $2",
                vec![document_id.into(), user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------

    async fn list_turns(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = self
            .pool
            .read()
            .query_all(Self::stmt(
                "SELECT id, role, text, created_at \
                 FROM conversation_turns WHERE user_id = $1 ORDER BY seq ASC",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        rows.iter().map(turn_from_row).collect()
    }

    async fn append_turn(
        &self,
        user_id: &str,
        role: Role,
        text: &str,
    ) -> Result<ConversationTurn> {
        let turn = ConversationTurn {
            id: Uuid::new_v4(),
            role,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO conversation_turns (id, user_id, role, text, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                vec![
                    turn.id.into(),
                    user_id.into(),
                    role.as_str().into(),
                    turn.text.clone().into(),
                    turn.created_at.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(turn)
    }

    async fn clear_turns(&self, user_id: &str) -> Result<()> {
        self.pool
            .write()
            .execute(Self::stmt(
                "DELETE FROM conversation_turns WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Step statuses
    // ------------------------------------------------------------------

    async fn list_steps(&self, user_id: &str) -> Result<Vec<StepStatusRow>> {
        let rows = self
            .pool
            .read()
            .query_all(Self::stmt(
                "SELECT step, status, completed_at, updated_at \
                 FROM step_statuses WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        rows.iter().map(step_from_row).collect()
    }

    async fn set_step(
        &self,
        user_id: &str,
        step: ApplicationStep,
        status: StepState,
    ) -> Result<StepStatusRow> {
        let now = Utc::now();

        let existing = self
            .pool
            .read()
            .query_one(Self::stmt(
                "SELECT step, status, completed_at, updated_at \
                 FROM step_statuses WHERE user_id = $1 AND step = $2",
                vec![user_id.into(), step.as_str().into()],
            ))
            .await
            .map_err(map_db_err)?
            .as_ref()
            .map(step_from_row)
            .transpose()?;

        // Completion timestamp is set on the transition into completed and
        // cleared on any other status
        let completed_at: Option<DateTime<Utc>> = match status {
            StepState::Completed => match &existing {
                Some(prev) if prev.status == StepState::Completed => prev.completed_at,
                _ => Some(now),
            },
            _ => None,
        };

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO step_statuses (user_id, step, status, completed_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (user_id, step) DO UPDATE SET \
                   status = EXCLUDED.status, \
                   completed_at = EXCLUDED.completed_at, \
                   updated_at = EXCLUDED.updated_at",
                vec![
                    user_id.into(),
                    step.as_str().into(),
                    status.as_str().into(),
                    completed_at.into(),
                    now.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(StepStatusRow {
            step,
            status,
            completed_at,
            updated_at: now,
        })
    }

    async fn clear_steps(&self, user_id: &str) -> Result<()> {
        self.pool
            .write()
            .execute(Self::stmt(
                "DELETE FROM step_statuses WHERE user_id = $1",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        let rows = self
            .pool
            .read()
            .query_all(Self::stmt(
                "SELECT id, user_id, provider_ref, amount_cents, status, paid_at, created_at \
                 FROM payments WHERE user_id = $1 ORDER BY created_at ASC",
                vec![user_id.into()],
            ))
            .await
            .map_err(map_db_err)?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn create_payment(&self, user_id: &str, input: PaymentInput) -> Result<PaymentRecord> {
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            provider_ref: input.provider_ref,
            amount_cents: input.amount_cents,
            status: input.status,
            paid_at: input.paid_at,
            created_at: Utc::now(),
        };

        self.pool
            .write()
            .execute(Self::stmt(
                "INSERT INTO payments \
                   (id, user_id, provider_ref, amount_cents, status, paid_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                vec![
                    record.id.into(),
                    record.user_id.clone().into(),
                    record.provider_ref.clone().into(),
                    record.amount_cents.into(),
                    record.status.clone().into(),
                    record.paid_at.into(),
                    record.created_at.into(),
                ],
            ))
            .await
            .map_err(map_db_err)?;

        Ok(record)
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    async fn ping(&self) -> Result<()> {
        self.pool
            .primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::Connection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.pool.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::Connection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_carry_the_field() {
        let err = map_db_err(DbErr::Custom(
            "duplicate key value violates unique constraint \"step_statuses_pkey\"".into(),
        ));
        match err {
            AppError::Constraint { field, .. } => assert_eq!(field, "step_statuses_pkey"),
            other => panic!("expected constraint error, got {other:?}"),
        }
    }

    #[test]
    fn connection_errors_map_to_connection_variant() {
        let err = map_db_err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "pool timed out".into(),
        )));
        assert!(matches!(err, AppError::Connection { .. }));
    }
}
