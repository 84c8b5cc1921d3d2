//! PostgreSQL database service for the identity store.
//!
//! All lookups exclude soft-deleted rows; uniqueness invariants are
//! enforced by the partial indexes in the schema, so concurrent writers
//! cannot slip duplicates past the application.

use identity_core::error::AppError;
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Application, ApplicationDetail, ApplicationResponse, Client, ClientDetail,
    CreateApplicationRequest, CreateClientRequest, CreateCredentialRequest,
    CreateOrganizationRequest, CreateRoleRequest, CreateUserRequest, Credential,
    CredentialResponse, Organization, OrganizationResponse, Role, RoleResponse,
    UpdateApplicationRequest, UpdateClientRequest, UpdateCredentialRequest,
    UpdateOrganizationRequest, UpdateRoleRequest, UpdateUserRequest, User, UserDetail,
    UserResponse,
};
use crate::services::metrics::{
    DB_QUERY_DURATION, ENTITIES_CREATED_TOTAL, ENTITIES_DELETED_TOTAL,
};
use crate::utils::{self, Plaintext};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Resolve a live client's internal id by external uuid.
async fn resolve_client_id(
    conn: &mut sqlx::PgConnection,
    client_uuid: Uuid,
) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM clients WHERE uuid = $1 AND deleted_at IS NULL")
        .bind(client_uuid)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve client: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_uuid)))
}

/// Resolve a live (user, application) pair to internal ids.
async fn resolve_user_and_application(
    conn: &mut sqlx::PgConnection,
    user_uuid: Uuid,
    application_uuid: Uuid,
) -> Result<(i64, i64), AppError> {
    let user_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM users WHERE uuid = $1 AND deleted_at IS NULL",
    )
    .bind(user_uuid)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve user: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", user_uuid)))?;

    let application_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM applications WHERE uuid = $1 AND deleted_at IS NULL",
    )
    .bind(application_uuid)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve application: {}", e)))?
    .ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!("Application {} not found", application_uuid))
    })?;

    Ok((user_id, application_id))
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    // ==================== Client Operations ====================

    /// Create a new client. The plaintext password is hashed before the
    /// row is written; only the hash is stored.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_client(&self, input: &CreateClientRequest) -> Result<Client, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let uuid = Uuid::new_v4();
        let password_hash = utils::hash_secret(&Plaintext::new(input.password.clone()))?;

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(&input.name)
        .bind(&input.address_line1)
        .bind(&input.address_line2)
        .bind(&input.address_line3)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Client with email '{}' already exists",
                    input.email
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e)),
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL.with_label_values(&["client"]).inc();

        info!(client_uuid = %client.uuid, "Client created");

        Ok(client)
    }

    /// Get a live client by uuid.
    #[instrument(skip(self))]
    pub async fn get_client(&self, uuid: Uuid) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
            FROM clients
            WHERE uuid = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", uuid)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// Find a live client by email.
    #[instrument(skip(self, email))]
    pub async fn find_client_by_email(&self, email: &str) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
            FROM clients
            WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find client: {}", e)))
    }

    /// Get a client together with its organizations and applications.
    #[instrument(skip(self))]
    pub async fn get_client_with_relations(&self, uuid: Uuid) -> Result<ClientDetail, AppError> {
        let client = self.get_client(uuid).await?;

        let organizations = sqlx::query_as::<_, Organization>(
            r#"
            SELECT o.id, o.uuid, o.client_id, c.uuid AS client_uuid, o.name, o.category, o.comments, o.jwt_secret, o.created_at, o.updated_at, o.deleted_at
            FROM organizations o
            JOIN clients c ON c.id = o.client_id
            WHERE c.uuid = $1 AND o.deleted_at IS NULL
            ORDER BY o.uuid
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list organizations: {}", e))
        })?;

        let applications = sqlx::query_as::<_, Application>(
            r#"
            SELECT a.id, a.uuid, a.client_id, c.uuid AS client_uuid, a.name, a.category, a.api_key, a.redirect_route, a.description, a.created_at, a.updated_at, a.deleted_at
            FROM applications a
            JOIN clients c ON c.id = a.client_id
            WHERE c.uuid = $1 AND a.deleted_at IS NULL
            ORDER BY a.uuid
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list applications: {}", e))
        })?;

        Ok(ClientDetail {
            client: client.sanitized(),
            organizations: organizations
                .into_iter()
                .map(OrganizationResponse::from)
                .collect(),
            applications: applications
                .into_iter()
                .map(ApplicationResponse::from)
                .collect(),
        })
    }

    /// Update a client. Absent fields are left unchanged; `new_pwd`
    /// replaces the stored hash.
    #[instrument(skip(self, input))]
    pub async fn update_client(
        &self,
        uuid: Uuid,
        input: &UpdateClientRequest,
    ) -> Result<Client, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let new_hash = match &input.new_pwd {
            Some(pwd) => Some(utils::hash_secret(&Plaintext::new(pwd.clone()))?),
            None => None,
        };

        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = COALESCE($2, name),
                address_line1 = COALESCE($3, address_line1),
                address_line2 = COALESCE($4, address_line2),
                address_line3 = COALESCE($5, address_line3),
                phone = COALESCE($6, phone),
                email = COALESCE($7, email),
                password_hash = COALESCE($8, password_hash),
                updated_at = NOW()
            WHERE uuid = $1 AND deleted_at IS NULL
            RETURNING id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.name.as_deref())
        .bind(input.address_line1.as_deref())
        .bind(input.address_line2.as_deref())
        .bind(input.address_line3.as_deref())
        .bind(input.phone.as_deref())
        .bind(input.email.as_deref())
        .bind(new_hash.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Client email already in use"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update client: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", uuid)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// Soft-delete a client. The row stays in place; default lookups
    /// stop returning it.
    #[instrument(skip(self))]
    pub async fn delete_client(&self, uuid: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE clients SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete client: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Client {} not found",
                uuid
            )));
        }

        timer.observe_duration();
        ENTITIES_DELETED_TOTAL.with_label_values(&["client"]).inc();

        info!(client_uuid = %uuid, "Client soft-deleted");

        Ok(())
    }

    /// List live clients, cursor-paginated by uuid.
    #[instrument(skip(self))]
    pub async fn list_clients(
        &self,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Client>, AppError> {
        let limit = page_size.clamp(1, 100) as i64;

        let clients = if let Some(cursor) = page_token {
            sqlx::query_as::<_, Client>(
                r#"
                SELECT id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
                FROM clients
                WHERE deleted_at IS NULL AND uuid > $1
                ORDER BY uuid
                LIMIT $2
                "#,
            )
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Client>(
                r#"
                SELECT id, uuid, name, address_line1, address_line2, address_line3, phone, email, password_hash, created_at, updated_at, deleted_at
                FROM clients
                WHERE deleted_at IS NULL
                ORDER BY uuid
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        Ok(clients)
    }

    // ==================== Organization Operations ====================

    /// Create an organization under a client. A signing secret is issued
    /// at creation and never leaves the store in serialized form.
    #[instrument(skip(self, input), fields(client_uuid = %client_uuid, name = %input.name))]
    pub async fn create_organization(
        &self,
        client_uuid: Uuid,
        input: &CreateOrganizationRequest,
    ) -> Result<Organization, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_organization"])
            .start_timer();

        let uuid = Uuid::new_v4();
        let jwt_secret = utils::generate_signing_secret();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let client_id = resolve_client_id(&mut tx, client_uuid).await?;

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (uuid, client_id, name, category, comments, jwt_secret)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, uuid, client_id, $7::uuid AS client_uuid, name, category, comments, jwt_secret, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(&input.comments)
        .bind(&jwt_secret)
        .bind(client_uuid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Organization '{}' already exists for this client",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create organization: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL
            .with_label_values(&["organization"])
            .inc();

        info!(organization_uuid = %organization.uuid, "Organization created");

        Ok(organization)
    }

    /// Get a live organization by uuid.
    #[instrument(skip(self))]
    pub async fn get_organization(&self, uuid: Uuid) -> Result<Organization, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_organization"])
            .start_timer();

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            SELECT o.id, o.uuid, o.client_id, c.uuid AS client_uuid, o.name, o.category, o.comments, o.jwt_secret, o.created_at, o.updated_at, o.deleted_at
            FROM organizations o
            JOIN clients c ON c.id = o.client_id
            WHERE o.uuid = $1 AND o.deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get organization: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization {} not found", uuid)))?;

        timer.observe_duration();

        Ok(organization)
    }

    /// Update an organization. Absent fields are left unchanged.
    #[instrument(skip(self, input))]
    pub async fn update_organization(
        &self,
        uuid: Uuid,
        input: &UpdateOrganizationRequest,
    ) -> Result<Organization, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_organization"])
            .start_timer();

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                comments = COALESCE($4, comments),
                updated_at = NOW()
            FROM clients
            WHERE organizations.uuid = $1
              AND organizations.deleted_at IS NULL
              AND clients.id = organizations.client_id
            RETURNING organizations.id, organizations.uuid, organizations.client_id, clients.uuid AS client_uuid, organizations.name, organizations.category, organizations.comments, organizations.jwt_secret, organizations.created_at, organizations.updated_at, organizations.deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.name.as_deref())
        .bind(input.category.as_deref())
        .bind(input.comments.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Organization name already in use for this client"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update organization: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization {} not found", uuid)))?;

        timer.observe_duration();

        Ok(organization)
    }

    /// Soft-delete an organization.
    #[instrument(skip(self))]
    pub async fn delete_organization(&self, uuid: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE organizations SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete organization: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Organization {} not found",
                uuid
            )));
        }

        ENTITIES_DELETED_TOTAL
            .with_label_values(&["organization"])
            .inc();

        info!(organization_uuid = %uuid, "Organization soft-deleted");

        Ok(())
    }

    /// List a client's live organizations, cursor-paginated by uuid.
    #[instrument(skip(self))]
    pub async fn list_organizations(
        &self,
        client_uuid: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Organization>, AppError> {
        let limit = page_size.clamp(1, 100) as i64;

        let organizations = if let Some(cursor) = page_token {
            sqlx::query_as::<_, Organization>(
                r#"
                SELECT o.id, o.uuid, o.client_id, c.uuid AS client_uuid, o.name, o.category, o.comments, o.jwt_secret, o.created_at, o.updated_at, o.deleted_at
                FROM organizations o
                JOIN clients c ON c.id = o.client_id
                WHERE c.uuid = $1 AND o.deleted_at IS NULL AND o.uuid > $2
                ORDER BY o.uuid
                LIMIT $3
                "#,
            )
            .bind(client_uuid)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Organization>(
                r#"
                SELECT o.id, o.uuid, o.client_id, c.uuid AS client_uuid, o.name, o.category, o.comments, o.jwt_secret, o.created_at, o.updated_at, o.deleted_at
                FROM organizations o
                JOIN clients c ON c.id = o.client_id
                WHERE c.uuid = $1 AND o.deleted_at IS NULL
                ORDER BY o.uuid
                LIMIT $2
                "#,
            )
            .bind(client_uuid)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list organizations: {}", e))
        })?;

        Ok(organizations)
    }

    // ==================== Application Operations ====================

    /// Create an application under a client. An API key is generated at
    /// creation; rotate it with [`Database::rotate_application_api_key`].
    #[instrument(skip(self, input), fields(client_uuid = %client_uuid, name = %input.name))]
    pub async fn create_application(
        &self,
        client_uuid: Uuid,
        input: &CreateApplicationRequest,
    ) -> Result<Application, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_application"])
            .start_timer();

        let uuid = Uuid::new_v4();
        let api_key = utils::generate_api_key();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let client_id = resolve_client_id(&mut tx, client_uuid).await?;

        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (uuid, client_id, name, category, api_key, redirect_route, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, uuid, client_id, $8::uuid AS client_uuid, name, category, api_key, redirect_route, description, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(&api_key)
        .bind(&input.redirect_route)
        .bind(&input.description)
        .bind(client_uuid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Application '{}' already exists for this client",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create application: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL
            .with_label_values(&["application"])
            .inc();

        info!(application_uuid = %application.uuid, "Application created");

        Ok(application)
    }

    /// Get a live application by uuid.
    #[instrument(skip(self))]
    pub async fn get_application(&self, uuid: Uuid) -> Result<Application, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_application"])
            .start_timer();

        let application = sqlx::query_as::<_, Application>(
            r#"
            SELECT a.id, a.uuid, a.client_id, c.uuid AS client_uuid, a.name, a.category, a.api_key, a.redirect_route, a.description, a.created_at, a.updated_at, a.deleted_at
            FROM applications a
            JOIN clients c ON c.id = a.client_id
            WHERE a.uuid = $1 AND a.deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get application: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application {} not found", uuid)))?;

        timer.observe_duration();

        Ok(application)
    }

    /// Get an application together with its roles and enrolled users.
    #[instrument(skip(self))]
    pub async fn get_application_with_relations(
        &self,
        uuid: Uuid,
    ) -> Result<ApplicationDetail, AppError> {
        let application = self.get_application(uuid).await?;

        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.uuid, r.user_id, r.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, r.name, r.created_at, r.updated_at, r.deleted_at
            FROM roles r
            JOIN users u ON u.id = r.user_id
            JOIN applications a ON a.id = r.application_id
            WHERE a.uuid = $1 AND r.deleted_at IS NULL
            ORDER BY r.uuid
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list roles: {}", e)))?;

        let users = self.list_users_for_application(uuid).await?;

        Ok(ApplicationDetail {
            application: application.sanitized(),
            roles: roles.into_iter().map(RoleResponse::from).collect(),
            users: users.into_iter().map(UserResponse::from).collect(),
        })
    }

    /// Update an application. Absent fields are left unchanged.
    #[instrument(skip(self, input))]
    pub async fn update_application(
        &self,
        uuid: Uuid,
        input: &UpdateApplicationRequest,
    ) -> Result<Application, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_application"])
            .start_timer();

        let application = sqlx::query_as::<_, Application>(
            r#"
            UPDATE applications
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                redirect_route = COALESCE($4, redirect_route),
                description = COALESCE($5, description),
                updated_at = NOW()
            FROM clients
            WHERE applications.uuid = $1
              AND applications.deleted_at IS NULL
              AND clients.id = applications.client_id
            RETURNING applications.id, applications.uuid, applications.client_id, clients.uuid AS client_uuid, applications.name, applications.category, applications.api_key, applications.redirect_route, applications.description, applications.created_at, applications.updated_at, applications.deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.name.as_deref())
        .bind(input.category.as_deref())
        .bind(input.redirect_route.as_deref())
        .bind(input.description.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Application name already in use for this client"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update application: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application {} not found", uuid)))?;

        timer.observe_duration();

        Ok(application)
    }

    /// Replace an application's API key with a freshly generated one.
    #[instrument(skip(self))]
    pub async fn rotate_application_api_key(&self, uuid: Uuid) -> Result<Application, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["rotate_application_api_key"])
            .start_timer();

        let api_key = utils::generate_api_key();

        let application = sqlx::query_as::<_, Application>(
            r#"
            UPDATE applications
            SET api_key = $2, updated_at = NOW()
            FROM clients
            WHERE applications.uuid = $1
              AND applications.deleted_at IS NULL
              AND clients.id = applications.client_id
            RETURNING applications.id, applications.uuid, applications.client_id, clients.uuid AS client_uuid, applications.name, applications.category, applications.api_key, applications.redirect_route, applications.description, applications.created_at, applications.updated_at, applications.deleted_at
            "#,
        )
        .bind(uuid)
        .bind(&api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to rotate API key: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Application {} not found", uuid)))?;

        timer.observe_duration();

        info!(application_uuid = %uuid, "Application API key rotated");

        Ok(application)
    }

    /// Soft-delete an application.
    #[instrument(skip(self))]
    pub async fn delete_application(&self, uuid: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE applications SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete application: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Application {} not found",
                uuid
            )));
        }

        ENTITIES_DELETED_TOTAL
            .with_label_values(&["application"])
            .inc();

        info!(application_uuid = %uuid, "Application soft-deleted");

        Ok(())
    }

    /// List a client's live applications, cursor-paginated by uuid.
    #[instrument(skip(self))]
    pub async fn list_applications(
        &self,
        client_uuid: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Application>, AppError> {
        let limit = page_size.clamp(1, 100) as i64;

        let applications = if let Some(cursor) = page_token {
            sqlx::query_as::<_, Application>(
                r#"
                SELECT a.id, a.uuid, a.client_id, c.uuid AS client_uuid, a.name, a.category, a.api_key, a.redirect_route, a.description, a.created_at, a.updated_at, a.deleted_at
                FROM applications a
                JOIN clients c ON c.id = a.client_id
                WHERE c.uuid = $1 AND a.deleted_at IS NULL AND a.uuid > $2
                ORDER BY a.uuid
                LIMIT $3
                "#,
            )
            .bind(client_uuid)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Application>(
                r#"
                SELECT a.id, a.uuid, a.client_id, c.uuid AS client_uuid, a.name, a.category, a.api_key, a.redirect_route, a.description, a.created_at, a.updated_at, a.deleted_at
                FROM applications a
                JOIN clients c ON c.id = a.client_id
                WHERE c.uuid = $1 AND a.deleted_at IS NULL
                ORDER BY a.uuid
                LIMIT $2
                "#,
            )
            .bind(client_uuid)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list applications: {}", e))
        })?;

        Ok(applications)
    }

    // ==================== User Operations ====================

    /// Create a new user.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: &CreateUserRequest) -> Result<User, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let uuid = Uuid::new_v4();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(&input.first_name)
        .bind(&input.middle_name)
        .bind(&input.last_name)
        .bind(&input.preferred_name)
        .bind(&input.email)
        .bind(&input.email2)
        .bind(&input.phone1)
        .bind(&input.phone2)
        .bind(&input.address_line1)
        .bind(&input.address_line2)
        .bind(&input.address_line3)
        .bind(&input.location)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "User with email '{}' already exists",
                    input.email
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL.with_label_values(&["user"]).inc();

        info!(user_uuid = %user.uuid, "User created");

        Ok(user)
    }

    /// Get a live user by uuid.
    #[instrument(skip(self))]
    pub async fn get_user(&self, uuid: Uuid) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
            FROM users
            WHERE uuid = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", uuid)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Find a live user by email.
    #[instrument(skip(self, email))]
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
            FROM users
            WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find user: {}", e)))
    }

    /// Get a user together with roles, credentials and application
    /// memberships.
    #[instrument(skip(self))]
    pub async fn get_user_with_relations(&self, uuid: Uuid) -> Result<UserDetail, AppError> {
        let user = self.get_user(uuid).await?;

        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.uuid, r.user_id, r.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, r.name, r.created_at, r.updated_at, r.deleted_at
            FROM roles r
            JOIN users u ON u.id = r.user_id
            JOIN applications a ON a.id = r.application_id
            WHERE u.uuid = $1 AND r.deleted_at IS NULL
            ORDER BY r.uuid
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list roles: {}", e)))?;

        let credentials = sqlx::query_as::<_, Credential>(
            r#"
            SELECT cr.id, cr.uuid, cr.user_id, cr.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, cr.user_name, cr.password_hash, cr.created_at, cr.updated_at, cr.deleted_at
            FROM credentials cr
            JOIN users u ON u.id = cr.user_id
            JOIN applications a ON a.id = cr.application_id
            WHERE u.uuid = $1 AND cr.deleted_at IS NULL
            ORDER BY cr.uuid
            "#,
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list credentials: {}", e))
        })?;

        let applications = self.list_applications_for_user(uuid).await?;

        Ok(UserDetail {
            user: user.sanitized(),
            roles: roles.into_iter().map(RoleResponse::from).collect(),
            credentials: credentials
                .into_iter()
                .map(CredentialResponse::from)
                .collect(),
            applications: applications
                .into_iter()
                .map(ApplicationResponse::from)
                .collect(),
        })
    }

    /// Update a user. Absent fields are left unchanged.
    #[instrument(skip(self, input))]
    pub async fn update_user(
        &self,
        uuid: Uuid,
        input: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                middle_name = COALESCE($3, middle_name),
                last_name = COALESCE($4, last_name),
                preferred_name = COALESCE($5, preferred_name),
                email = COALESCE($6, email),
                email2 = COALESCE($7, email2),
                phone1 = COALESCE($8, phone1),
                phone2 = COALESCE($9, phone2),
                address_line1 = COALESCE($10, address_line1),
                address_line2 = COALESCE($11, address_line2),
                address_line3 = COALESCE($12, address_line3),
                location = COALESCE($13, location),
                updated_at = NOW()
            WHERE uuid = $1 AND deleted_at IS NULL
            RETURNING id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.first_name.as_deref())
        .bind(input.middle_name.as_deref())
        .bind(input.last_name.as_deref())
        .bind(input.preferred_name.as_deref())
        .bind(input.email.as_deref())
        .bind(input.email2.as_deref())
        .bind(input.phone1.as_deref())
        .bind(input.phone2.as_deref())
        .bind(input.address_line1.as_deref())
        .bind(input.address_line2.as_deref())
        .bind(input.address_line3.as_deref())
        .bind(input.location.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("User email already in use"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update user: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", uuid)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Flip the persisted logged-in flag. Called by the external session
    /// collaborator on login and logout.
    #[instrument(skip(self))]
    pub async fn set_user_logged_in(&self, uuid: Uuid, logged_in: bool) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET logged_in = $2, updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .bind(logged_in)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update login state: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User {} not found",
                uuid
            )));
        }

        Ok(())
    }

    /// Soft-delete a user.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, uuid: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User {} not found",
                uuid
            )));
        }

        ENTITIES_DELETED_TOTAL.with_label_values(&["user"]).inc();

        info!(user_uuid = %uuid, "User soft-deleted");

        Ok(())
    }

    /// List live users, cursor-paginated by uuid.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<User>, AppError> {
        let limit = page_size.clamp(1, 100) as i64;

        let users = if let Some(cursor) = page_token {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
                FROM users
                WHERE deleted_at IS NULL AND uuid > $1
                ORDER BY uuid
                LIMIT $2
                "#,
            )
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, uuid, first_name, middle_name, last_name, preferred_name, email, email2, phone1, phone2, address_line1, address_line2, address_line3, location, logged_in, created_at, updated_at, deleted_at
                FROM users
                WHERE deleted_at IS NULL
                ORDER BY uuid
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list users: {}", e)))?;

        Ok(users)
    }

    // ==================== Membership Operations ====================

    /// Enroll a user into an application.
    #[instrument(skip(self))]
    pub async fn add_user_to_application(
        &self,
        user_uuid: Uuid,
        application_uuid: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_user_to_application"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (user_id, application_id) =
            resolve_user_and_application(&mut tx, user_uuid, application_uuid).await?;

        sqlx::query("INSERT INTO user_application (user_id, application_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(application_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "User is already enrolled in this application"
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to enroll user: {}", e)),
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(user_uuid = %user_uuid, application_uuid = %application_uuid, "User enrolled in application");

        Ok(())
    }

    /// Remove a user from an application. The membership row is removed
    /// outright; roles and credentials are separate entities and keep
    /// their own lifecycle.
    #[instrument(skip(self))]
    pub async fn remove_user_from_application(
        &self,
        user_uuid: Uuid,
        application_uuid: Uuid,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_application
            USING users, applications
            WHERE user_application.user_id = users.id
              AND user_application.application_id = applications.id
              AND users.uuid = $1
              AND applications.uuid = $2
            "#,
        )
        .bind(user_uuid)
        .bind(application_uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to remove user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User {} is not enrolled in application {}",
                user_uuid,
                application_uuid
            )));
        }

        info!(user_uuid = %user_uuid, application_uuid = %application_uuid, "User removed from application");

        Ok(())
    }

    /// List the live applications a user is enrolled in.
    #[instrument(skip(self))]
    pub async fn list_applications_for_user(
        &self,
        user_uuid: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        sqlx::query_as::<_, Application>(
            r#"
            SELECT a.id, a.uuid, a.client_id, c.uuid AS client_uuid, a.name, a.category, a.api_key, a.redirect_route, a.description, a.created_at, a.updated_at, a.deleted_at
            FROM applications a
            JOIN clients c ON c.id = a.client_id
            JOIN user_application ua ON ua.application_id = a.id
            JOIN users u ON u.id = ua.user_id
            WHERE u.uuid = $1 AND a.deleted_at IS NULL
            ORDER BY a.uuid
            "#,
        )
        .bind(user_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list applications: {}", e))
        })
    }

    /// List the live users enrolled in an application.
    #[instrument(skip(self))]
    pub async fn list_users_for_application(
        &self,
        application_uuid: Uuid,
    ) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.uuid, u.first_name, u.middle_name, u.last_name, u.preferred_name, u.email, u.email2, u.phone1, u.phone2, u.address_line1, u.address_line2, u.address_line3, u.location, u.logged_in, u.created_at, u.updated_at, u.deleted_at
            FROM users u
            JOIN user_application ua ON ua.user_id = u.id
            JOIN applications a ON a.id = ua.application_id
            WHERE a.uuid = $1 AND u.deleted_at IS NULL
            ORDER BY u.uuid
            "#,
        )
        .bind(application_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list users: {}", e)))
    }

    // ==================== Role Operations ====================

    /// Grant a role to a user within an application. A user cannot hold
    /// the same named role twice in one application.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_role(&self, input: &CreateRoleRequest) -> Result<Role, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_role"])
            .start_timer();

        let uuid = Uuid::new_v4();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (user_id, application_id) =
            resolve_user_and_application(&mut tx, input.user_uuid, input.application_uuid).await?;

        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (uuid, user_id, application_id, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, uuid, user_id, application_id, $5::uuid AS user_uuid, $6::uuid AS application_uuid, name, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(user_id)
        .bind(application_id)
        .bind(&input.name)
        .bind(input.user_uuid)
        .bind(input.application_uuid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Role '{}' already granted to this user in this application",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create role: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL.with_label_values(&["role"]).inc();

        info!(role_uuid = %role.uuid, "Role created");

        Ok(role)
    }

    /// Get a live role by uuid.
    #[instrument(skip(self))]
    pub async fn get_role(&self, uuid: Uuid) -> Result<Role, AppError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.uuid, r.user_id, r.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, r.name, r.created_at, r.updated_at, r.deleted_at
            FROM roles r
            JOIN users u ON u.id = r.user_id
            JOIN applications a ON a.id = r.application_id
            WHERE r.uuid = $1 AND r.deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get role: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role {} not found", uuid)))
    }

    /// Rename a role. Renaming into an existing grant is a conflict.
    #[instrument(skip(self, input))]
    pub async fn update_role(
        &self,
        uuid: Uuid,
        input: &UpdateRoleRequest,
    ) -> Result<Role, AppError> {
        input.validate()?;

        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                updated_at = NOW()
            FROM users, applications
            WHERE roles.uuid = $1
              AND roles.deleted_at IS NULL
              AND users.id = roles.user_id
              AND applications.id = roles.application_id
            RETURNING roles.id, roles.uuid, roles.user_id, roles.application_id, users.uuid AS user_uuid, applications.uuid AS application_uuid, roles.name, roles.created_at, roles.updated_at, roles.deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.name.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Role name already granted to this user in this application"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update role: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role {} not found", uuid)))?;

        Ok(role)
    }

    /// Soft-delete a role.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, uuid: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE roles SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete role: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Role {} not found",
                uuid
            )));
        }

        ENTITIES_DELETED_TOTAL.with_label_values(&["role"]).inc();

        info!(role_uuid = %uuid, "Role soft-deleted");

        Ok(())
    }

    /// List the live roles a user holds within an application.
    #[instrument(skip(self))]
    pub async fn list_roles(
        &self,
        user_uuid: Uuid,
        application_uuid: Uuid,
    ) -> Result<Vec<Role>, AppError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.uuid, r.user_id, r.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, r.name, r.created_at, r.updated_at, r.deleted_at
            FROM roles r
            JOIN users u ON u.id = r.user_id
            JOIN applications a ON a.id = r.application_id
            WHERE u.uuid = $1 AND a.uuid = $2 AND r.deleted_at IS NULL
            ORDER BY r.name
            "#,
        )
        .bind(user_uuid)
        .bind(application_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list roles: {}", e)))
    }

    // ==================== Credential Operations ====================

    /// Create a credential for a user within an application. The
    /// plaintext password is hashed before the row is written.
    #[instrument(skip(self, input), fields(username = %input.user_name))]
    pub async fn create_credential(
        &self,
        input: &CreateCredentialRequest,
    ) -> Result<Credential, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_credential"])
            .start_timer();

        let uuid = Uuid::new_v4();
        let password_hash = utils::hash_secret(&Plaintext::new(input.password.clone()))?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (user_id, application_id) =
            resolve_user_and_application(&mut tx, input.user_uuid, input.application_uuid).await?;

        let credential = sqlx::query_as::<_, Credential>(
            r#"
            INSERT INTO credentials (uuid, user_id, application_id, user_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, uuid, user_id, application_id, $6::uuid AS user_uuid, $7::uuid AS application_uuid, user_name, password_hash, created_at, updated_at, deleted_at
            "#,
        )
        .bind(uuid)
        .bind(user_id)
        .bind(application_id)
        .bind(&input.user_name)
        .bind(&password_hash)
        .bind(input.user_uuid)
        .bind(input.application_uuid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Credential '{}' already exists for this user in this application",
                    input.user_name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create credential: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        ENTITIES_CREATED_TOTAL
            .with_label_values(&["credential"])
            .inc();

        info!(credential_uuid = %credential.uuid, "Credential created");

        Ok(credential)
    }

    /// Get a live credential by uuid.
    #[instrument(skip(self))]
    pub async fn get_credential(&self, uuid: Uuid) -> Result<Credential, AppError> {
        sqlx::query_as::<_, Credential>(
            r#"
            SELECT cr.id, cr.uuid, cr.user_id, cr.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, cr.user_name, cr.password_hash, cr.created_at, cr.updated_at, cr.deleted_at
            FROM credentials cr
            JOIN users u ON u.id = cr.user_id
            JOIN applications a ON a.id = cr.application_id
            WHERE cr.uuid = $1 AND cr.deleted_at IS NULL
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get credential: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Credential {} not found", uuid)))
    }

    /// Find a live credential by username within an application. Used by
    /// the external authentication collaborator to resolve logins.
    #[instrument(skip(self, user_name))]
    pub async fn find_credential_by_username(
        &self,
        application_uuid: Uuid,
        user_name: &str,
    ) -> Result<Option<Credential>, AppError> {
        sqlx::query_as::<_, Credential>(
            r#"
            SELECT cr.id, cr.uuid, cr.user_id, cr.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, cr.user_name, cr.password_hash, cr.created_at, cr.updated_at, cr.deleted_at
            FROM credentials cr
            JOIN users u ON u.id = cr.user_id
            JOIN applications a ON a.id = cr.application_id
            WHERE a.uuid = $1 AND cr.user_name = $2 AND cr.deleted_at IS NULL
            "#,
        )
        .bind(application_uuid)
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find credential: {}", e)))
    }

    /// Update a credential. `new_pwd` replaces the stored hash.
    #[instrument(skip(self, input))]
    pub async fn update_credential(
        &self,
        uuid: Uuid,
        input: &UpdateCredentialRequest,
    ) -> Result<Credential, AppError> {
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_credential"])
            .start_timer();

        let new_hash = match &input.new_pwd {
            Some(pwd) => Some(utils::hash_secret(&Plaintext::new(pwd.clone()))?),
            None => None,
        };

        let credential = sqlx::query_as::<_, Credential>(
            r#"
            UPDATE credentials
            SET user_name = COALESCE($2, user_name),
                password_hash = COALESCE($3, password_hash),
                updated_at = NOW()
            FROM users, applications
            WHERE credentials.uuid = $1
              AND credentials.deleted_at IS NULL
              AND users.id = credentials.user_id
              AND applications.id = credentials.application_id
            RETURNING credentials.id, credentials.uuid, credentials.user_id, credentials.application_id, users.uuid AS user_uuid, applications.uuid AS application_uuid, credentials.user_name, credentials.password_hash, credentials.created_at, credentials.updated_at, credentials.deleted_at
            "#,
        )
        .bind(uuid)
        .bind(input.user_name.as_deref())
        .bind(new_hash.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Credential username already in use for this user in this application"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update credential: {}", e)),
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Credential {} not found", uuid)))?;

        timer.observe_duration();

        Ok(credential)
    }

    /// Soft-delete a credential.
    #[instrument(skip(self))]
    pub async fn delete_credential(&self, uuid: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE credentials SET deleted_at = NOW(), updated_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete credential: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Credential {} not found",
                uuid
            )));
        }

        ENTITIES_DELETED_TOTAL
            .with_label_values(&["credential"])
            .inc();

        info!(credential_uuid = %uuid, "Credential soft-deleted");

        Ok(())
    }

    /// List the live credentials a user holds within an application.
    #[instrument(skip(self))]
    pub async fn list_credentials(
        &self,
        user_uuid: Uuid,
        application_uuid: Uuid,
    ) -> Result<Vec<Credential>, AppError> {
        sqlx::query_as::<_, Credential>(
            r#"
            SELECT cr.id, cr.uuid, cr.user_id, cr.application_id, u.uuid AS user_uuid, a.uuid AS application_uuid, cr.user_name, cr.password_hash, cr.created_at, cr.updated_at, cr.deleted_at
            FROM credentials cr
            JOIN users u ON u.id = cr.user_id
            JOIN applications a ON a.id = cr.application_id
            WHERE u.uuid = $1 AND a.uuid = $2 AND cr.deleted_at IS NULL
            ORDER BY cr.user_name
            "#,
        )
        .bind(user_uuid)
        .bind(application_uuid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list credentials: {}", e)))
    }
}
