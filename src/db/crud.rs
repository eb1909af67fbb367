use chrono::Utc;
use sqlx::Result;

use super::model::*;
use super::Database;

/// 新增坑洞记录，单事务提交
pub async fn insert_pothole(pool: &Database, new: &NewPothole) -> Result<PotholeRecord> {
    let mut tx = pool.begin().await?;
    let record = sqlx::query_as::<_, PotholeRecord>(
        r#"
        INSERT INTO pothole (image_name, detected_image_path, location, latitude, longitude, created_at, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.image_name)
    .bind(&new.detected_image_path)
    .bind(&new.location)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(Utc::now().naive_utc())
    .bind(&new.status)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(record)
}

/// 新增垃圾记录，单事务提交
pub async fn insert_waste(pool: &Database, new: &NewWaste) -> Result<WasteRecord> {
    let mut tx = pool.begin().await?;
    let record = sqlx::query_as::<_, WasteRecord>(
        r#"
        INSERT INTO waste (
            image_name, detected_image_path, location, latitude, longitude, created_at,
            detection_status, is_waste, waste_category, is_recyclable, is_decomposable
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.image_name)
    .bind(&new.detected_image_path)
    .bind(&new.location)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(Utc::now().naive_utc())
    .bind(&new.detection_status)
    .bind(&new.waste_category)
    .bind(new.is_recyclable)
    .bind(new.is_decomposable)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(record)
}

/// 查询全部坑洞记录
pub async fn list_pothole(pool: &Database) -> Result<Vec<PotholeRecord>> {
    sqlx::query_as("SELECT * FROM pothole ORDER BY id").fetch_all(pool).await
}

/// 查询全部垃圾记录
pub async fn list_waste(pool: &Database) -> Result<Vec<WasteRecord>> {
    sqlx::query_as("SELECT * FROM waste ORDER BY id").fetch_all(pool).await
}

/// 按 ID 查询坑洞记录
pub async fn get_pothole(pool: &Database, id: i64) -> Result<Option<PotholeRecord>> {
    sqlx::query_as("SELECT * FROM pothole WHERE id = ?").bind(id).fetch_optional(pool).await
}

/// 按 ID 查询垃圾记录
pub async fn get_waste(pool: &Database, id: i64) -> Result<Option<WasteRecord>> {
    sqlx::query_as("SELECT * FROM waste WHERE id = ?").bind(id).fetch_optional(pool).await
}

/// 部分更新坑洞记录，缺省字段保持原值
pub async fn update_pothole(
    pool: &Database,
    id: i64,
    update: &DetectionUpdate,
) -> Result<Option<PotholeRecord>> {
    sqlx::query_as(
        r#"
        UPDATE pothole SET
            location = COALESCE(?, location),
            latitude = COALESCE(?, latitude),
            longitude = COALESCE(?, longitude),
            status = COALESCE(?, status)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&update.location)
    .bind(update.latitude)
    .bind(update.longitude)
    .bind(&update.status)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// 部分更新垃圾记录，缺省字段保持原值
pub async fn update_waste(
    pool: &Database,
    id: i64,
    update: &DetectionUpdate,
) -> Result<Option<WasteRecord>> {
    sqlx::query_as(
        r#"
        UPDATE waste SET
            location = COALESCE(?, location),
            latitude = COALESCE(?, latitude),
            longitude = COALESCE(?, longitude),
            detection_status = COALESCE(?, detection_status),
            waste_category = COALESCE(?, waste_category),
            is_recyclable = COALESCE(?, is_recyclable),
            is_decomposable = COALESCE(?, is_decomposable)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&update.location)
    .bind(update.latitude)
    .bind(update.longitude)
    .bind(&update.detection_status)
    .bind(&update.waste_category)
    .bind(update.is_recyclable)
    .bind(update.is_decomposable)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// 删除坑洞记录，返回被删除的行，调用方负责回收文件
pub async fn delete_pothole(pool: &Database, id: i64) -> Result<Option<PotholeRecord>> {
    sqlx::query_as("DELETE FROM pothole WHERE id = ? RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// 删除垃圾记录，返回被删除的行，调用方负责回收文件
pub async fn delete_waste(pool: &Database, id: i64) -> Result<Option<WasteRecord>> {
    sqlx::query_as("DELETE FROM waste WHERE id = ? RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    /// 内存数据库必须限制为单连接，否则每个连接各有一份数据
    async fn test_db() -> Database {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    fn new_waste() -> NewWaste {
        NewWaste {
            image_name: "1700000000000_0_bottle.jpg".to_string(),
            detected_image_path: Some("1700000000000_1_bottle.jpg".to_string()),
            location: "Main St".to_string(),
            latitude: 27.7,
            longitude: 85.3,
            detection_status: "Plastic detected".to_string(),
            waste_category: "Plastic".to_string(),
            is_recyclable: true,
            is_decomposable: false,
        }
    }

    #[tokio::test]
    async fn test_waste_roundtrip() {
        let pool = test_db().await;
        let inserted = insert_waste(&pool, &new_waste()).await.unwrap();
        assert!(inserted.is_waste);

        // 按 ID 取回的记录应当和插入返回的完全一致
        let fetched = get_waste(&pool, inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(fetched.to_json(), inserted.to_json());
    }

    #[tokio::test]
    async fn test_pothole_roundtrip() {
        let pool = test_db().await;
        let new = NewPothole {
            image_name: "1700000000000_2_road.jpg".to_string(),
            detected_image_path: None,
            location: "Ring Rd".to_string(),
            latitude: 27.68,
            longitude: 85.35,
            status: "Pothole detected".to_string(),
        };
        let inserted = insert_pothole(&pool, &new).await.unwrap();

        let fetched = get_pothole(&pool, inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched, inserted);
        // 没有标注图时对应的 URL 序列化为 null
        assert!(fetched.to_json()["detected_image_url"].is_null());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let pool = test_db().await;
        let inserted = insert_waste(&pool, &new_waste()).await.unwrap();

        let update = DetectionUpdate {
            location: Some("New Rd".to_string()),
            ..Default::default()
        };
        let updated = update_waste(&pool, inserted.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.location, "New Rd");
        // 未提供的字段保持原值
        assert_eq!(updated.latitude, inserted.latitude);
        assert_eq!(updated.waste_category, inserted.waste_category);
        assert_eq!(updated.created_at, inserted.created_at);

        // 不存在的 ID 返回 None
        assert!(update_waste(&pool, 9999, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = test_db().await;
        let inserted = insert_waste(&pool, &new_waste()).await.unwrap();

        let deleted = delete_waste(&pool, inserted.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, inserted.id);
        assert!(get_waste(&pool, inserted.id).await.unwrap().is_none());
        assert!(delete_waste(&pool, inserted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_order() {
        let pool = test_db().await;
        let a = insert_waste(&pool, &new_waste()).await.unwrap();
        let b = insert_waste(&pool, &new_waste()).await.unwrap();

        let all = list_waste(&pool).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(list_pothole(&pool).await.unwrap().is_empty());
    }
}
