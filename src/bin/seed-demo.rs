//! Seeds a demo campus: one user per role, a class with students, a shuttle
//! route with three stops, and today's curriculum items.
//!
//! Usage: DATABASE_URL=... cargo run --bin seed-demo

use chrono::{NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use campus_api::db;

const DEMO_PASSWORD: &str = "demo1234";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Missing required env var: DATABASE_URL"))?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let hash = bcrypt::hash(DEMO_PASSWORD, bcrypt::DEFAULT_COST)?;

    let admin = insert_user(&pool, "admin@campus.demo", &hash, "Dana", "Park", "admin").await?;
    let teacher = insert_user(&pool, "teacher@campus.demo", &hash, "Minji", "Seo", "teacher").await?;
    let driver = insert_user(&pool, "driver@campus.demo", &hash, "Hoon", "Choi", "driver").await?;
    let parent = insert_user(&pool, "parent@campus.demo", &hash, "Jiyoung", "Kim", "parent").await?;

    let class_id: Uuid = sqlx::query_scalar(
        "INSERT INTO classes (name, campus, homeroom_teacher_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind("Maple 3")
    .bind("main")
    .bind(teacher)
    .fetch_one(&pool)
    .await?;

    let students = [
        ("김하은", Some("Amy"), Some("010-1111-2222")),
        ("이준서", Some("Leo"), Some("010-3333-4444")),
        ("박서연", None, None),
    ];
    let mut student_ids = Vec::new();
    for (native, english, phone) in students {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO students (native_name, english_name, campus, class_id, contact_phone)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(native)
        .bind(english)
        .bind("main")
        .bind(class_id)
        .bind(phone)
        .fetch_one(&pool)
        .await?;
        student_ids.push(id);
    }

    sqlx::query("INSERT INTO student_parents (student_id, user_id) VALUES ($1, $2)")
        .bind(student_ids[0])
        .bind(parent)
        .execute(&pool)
        .await?;

    let slot_id: Uuid = sqlx::query_scalar(
        "INSERT INTO time_slots (direction, label, departure) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind("pickup")
    .bind("Morning A")
    .bind(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
    .fetch_one(&pool)
    .await?;

    let vehicle_id: Uuid = sqlx::query_scalar(
        "INSERT INTO vehicles (name, plate, driver_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind("Bus 1")
    .bind("12가3456")
    .bind(driver)
    .fetch_one(&pool)
    .await?;

    let stops = [(1, "Riverside Gate", 5), (2, "Central Market", 10), (3, "Hilltop Apartments", 0)];
    for (i, (position, label, leg_minutes)) in stops.into_iter().enumerate() {
        let block_id: Uuid = sqlx::query_scalar(
            "INSERT INTO route_blocks (vehicle_id, slot_id, position, label, leg_minutes)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(vehicle_id)
        .bind(slot_id)
        .bind(position)
        .bind(label)
        .bind(leg_minutes)
        .fetch_one(&pool)
        .await?;

        if let Some(student_id) = student_ids.get(i) {
            sqlx::query("INSERT INTO block_students (block_id, student_id) VALUES ($1, $2)")
                .bind(block_id)
                .bind(student_id)
                .execute(&pool)
                .await?;
        }
    }

    let today = Utc::now().date_naive();
    for (subject, title) in [("reading", "Storybook p.12-15"), ("math", "Worksheet 7")] {
        sqlx::query(
            "INSERT INTO curriculum_items (class_id, subject, title, scheduled_date)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(class_id)
        .bind(subject)
        .bind(title)
        .bind(today)
        .execute(&pool)
        .await?;
    }

    println!("Seeded demo campus.");
    println!("  admin:   admin@campus.demo / {DEMO_PASSWORD}");
    println!("  teacher: teacher@campus.demo / {DEMO_PASSWORD}");
    println!("  driver:  driver@campus.demo / {DEMO_PASSWORD}");
    println!("  parent:  parent@campus.demo / {DEMO_PASSWORD}");
    println!("  admin id: {admin}");

    Ok(())
}

async fn insert_user(
    pool: &PgPool,
    email: &str,
    hash: &str,
    first: &str,
    last: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name, role)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(email)
    .bind(hash)
    .bind(first)
    .bind(last)
    .bind(role)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
