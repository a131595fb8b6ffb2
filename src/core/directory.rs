use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

use crate::core::error::Result;

/// Minimal view of a student as the ledger needs it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentRef {
    pub id: String,
    pub school_id: String,
    pub class_id: Option<String>,
    pub name: String,
}

/// Lookup port for students
///
/// Identity and enrollment are owned elsewhere in the backend; the ledger
/// only checks that a billed student exists in the school and reads the
/// class for the structure's class restriction.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn find_student(&self, school_id: &str, student_id: &str)
        -> Result<Option<StudentRef>>;
}

/// MySQL-backed directory reading the backend's students table
pub struct MySqlStudentDirectory {
    pool: MySqlPool,
}

impl MySqlStudentDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentDirectory for MySqlStudentDirectory {
    async fn find_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Option<StudentRef>> {
        let student = sqlx::query_as::<_, StudentRef>(
            r#"
            SELECT id, school_id, class_id, name
            FROM students
            WHERE id = ? AND school_id = ?
            "#,
        )
        .bind(student_id)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }
}
