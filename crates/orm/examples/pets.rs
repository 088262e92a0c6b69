//! Pets Example
//!
//! Defines a small schema on the in-memory adapter, registers a hook and
//! issues a few calls.

use std::sync::Arc;

use elif_graph_orm::{hook_fn, HookError, HookKind, MemoryAdapter, ModelDefinition, Orm, OrmResult};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> OrmResult<()> {
    let orm = Orm::builder()
        .datastore("default", Arc::new(MemoryAdapter::new().with_unique("pets", "pet_name")))
        .model(
            ModelDefinition::new("Pet")
                .with_table_name("pets")
                .with_attribute("id", json!({"type": "number"}))
                .with_attribute("name", json!({"type": "string", "required": true, "columnName": "pet_name"}))
                .with_attribute("toys", json!({"collection": "toy", "via": "owner"})),
        )
        .model(ModelDefinition::new("Toy").with_attribute("owner", json!({"model": "pet"})))
        .hook(
            "pet",
            HookKind::BeforeCreate,
            hook_fn(|record| match record.get("name").and_then(Value::as_str) {
                Some(name) if name.trim().is_empty() => Err(HookError::rejected("Pets need a name")),
                _ => Ok(()),
            }),
        )
        .initialize()?;

    let pets = orm.model("pet")?;

    let rex = pets.create(json!({"name": "Rex", "toys": ["ball", "bone"]})).fetch().await?;
    println!("created: {}", rex.unwrap_or_default());

    pets.create_each(json!([{"name": "Fido"}, {"name": "Tom"}])).await?;

    let page = pets.find(Value::Null).sort(json!("name ASC")).limit(2).await?;
    println!("first page: {}", page.unwrap_or_default());

    if let Err(error) = pets.create(json!({"name": "Rex"})).await {
        println!("duplicate rejected: {}", error);
    }

    let remaining = pets.count(json!({"name": {"!=": "Tom"}})).await?;
    println!("not named Tom: {}", remaining.unwrap_or_default());

    Ok(())
}
