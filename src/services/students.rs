use sqlx::PgPool;
use uuid::Uuid;

use crate::models::student::{Class, CreateStudentRequest, Student, UpdateStudentRequest};

pub struct StudentService;

impl StudentService {
    pub async fn list(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE is_active = TRUE ORDER BY native_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(students)
    }

    /// Parents only see their own children, via the junction table.
    pub async fn list_for_parent(pool: &PgPool, parent_id: Uuid) -> anyhow::Result<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT s.* FROM students s
             JOIN student_parents sp ON sp.student_id = s.id
             WHERE sp.user_id = $1 AND s.is_active = TRUE
             ORDER BY s.native_name",
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(students)
    }

    pub async fn is_parent_of(pool: &PgPool, student_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM student_parents WHERE student_id = $1 AND user_id = $2)",
        )
        .bind(student_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    pub async fn create(pool: &PgPool, req: &CreateStudentRequest) -> anyhow::Result<Student> {
        let student = sqlx::query_as::<_, Student>(
            "INSERT INTO students (native_name, english_name, campus, class_id, contact_phone)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(&req.native_name)
        .bind(&req.english_name)
        .bind(&req.campus)
        .bind(req.class_id)
        .bind(&req.contact_phone)
        .fetch_one(pool)
        .await?;
        Ok(student)
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateStudentRequest) -> anyhow::Result<Student> {
        let student = sqlx::query_as::<_, Student>(
            "UPDATE students
             SET native_name   = COALESCE($1, native_name),
                 english_name  = COALESCE($2, english_name),
                 campus        = COALESCE($3, campus),
                 class_id      = COALESCE($4, class_id),
                 contact_phone = COALESCE($5, contact_phone),
                 is_active     = COALESCE($6, is_active),
                 updated_at    = NOW()
             WHERE id = $7
             RETURNING *",
        )
        .bind(&req.native_name)
        .bind(&req.english_name)
        .bind(&req.campus)
        .bind(req.class_id)
        .bind(&req.contact_phone)
        .bind(req.is_active)
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(student)
    }

    pub async fn list_classes(pool: &PgPool) -> anyhow::Result<Vec<Class>> {
        let classes = sqlx::query_as::<_, Class>("SELECT * FROM classes ORDER BY campus, name")
            .fetch_all(pool)
            .await?;
        Ok(classes)
    }

    /// Classes taught by one teacher.
    pub async fn classes_for_teacher(pool: &PgPool, teacher_id: Uuid) -> anyhow::Result<Vec<Class>> {
        let classes = sqlx::query_as::<_, Class>(
            "SELECT * FROM classes WHERE homeroom_teacher_id = $1 ORDER BY name",
        )
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(classes)
    }

    /// Parent user ids for every student in a class, for report pushes.
    pub async fn parents_of_class(pool: &PgPool, class_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT sp.user_id
             FROM student_parents sp
             JOIN students s ON s.id = sp.student_id
             WHERE s.class_id = $1 AND s.is_active = TRUE",
        )
        .bind(class_id)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }
}
