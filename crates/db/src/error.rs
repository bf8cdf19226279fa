/// Failure reported by any store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. `field` names the
    /// conflicting attribute (`email`, `username`).
    #[error("Duplicate {field}")]
    Conflict { field: &'static str },

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Map PostgreSQL unique violations (code 23505) on the user constraints to
/// [`StoreError::Conflict`]; everything else stays a database error.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                match db_err.constraint() {
                    Some("uq_users_email") => return Self::Conflict { field: "email" },
                    Some("uq_users_username") => return Self::Conflict { field: "username" },
                    _ => {}
                }
            }
        }
        Self::Database(err)
    }
}
