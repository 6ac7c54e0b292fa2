//! Seeds a demo school into Postgres: one admin, one teacher with a class,
//! one pupil and their parent. Reads `APP__DATABASE__URL`.

use anyhow::Context;
use storage_adapters::PgStore;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let url = std::env::var("APP__DATABASE__URL")
        .context("APP__DATABASE__URL must be set")?;

    let store = PgStore::connect(&url, 2).await?;
    store.migrate().await?;
    let pool = store.pool();
    let mut tx = pool.begin().await?;

    let school = Uuid::new_v4();
    sqlx::query("INSERT INTO schools (id, name) VALUES ($1, $2)")
        .bind(school)
        .bind("Riverside Primary")
        .execute(&mut *tx)
        .await?;

    let admin = Uuid::new_v4();
    let teacher = Uuid::new_v4();
    let parent = Uuid::new_v4();
    for (id, name, role, school_id) in [
        (admin, "Alex Morgan", "ADMIN", Some(school)),
        (teacher, "Jamie Chen", "TEACHER", Some(school)),
        (parent, "Sam Patel", "PARENT", None),
    ] {
        sqlx::query("INSERT INTO users (id, name, role, school_id) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(name)
            .bind(role)
            .bind(school_id)
            .execute(&mut *tx)
            .await?;
    }

    let class = Uuid::new_v4();
    sqlx::query("INSERT INTO classes (id, name, teacher_id, school_id) VALUES ($1, $2, $3, $4)")
        .bind(class)
        .bind("Year 3 Oak")
        .bind(teacher)
        .bind(school)
        .execute(&mut *tx)
        .await?;

    let student = Uuid::new_v4();
    sqlx::query("INSERT INTO students (id, name, class_id) VALUES ($1, $2, $3)")
        .bind(student)
        .bind("Priya Patel")
        .bind(class)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO parent_children (parent_id, student_id) VALUES ($1, $2)")
        .bind(parent)
        .bind(student)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    println!("school  {school}");
    println!("admin   {admin}");
    println!("teacher {teacher}");
    println!("parent  {parent}");
    Ok(())
}
