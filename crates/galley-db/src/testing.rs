use crate::fixtures::seed_demo_kitchen;
use crate::pool::{Database, DbConfig};

pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub(crate) async fn seed_kitchen(db: &Database) {
    seed_demo_kitchen(db).await.unwrap();
}
