use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One priced line of an order. Name and unit price are copied from the
/// catalog or service tier at order time and are never touched again, even
/// if the referenced product is later edited or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,

    /// Internal catalog product, when the line came from the storefront.
    /// Service bookings carry no catalog reference.
    pub product_id: Option<Uuid>,

    /// Payment-provider product identifier, always present.
    pub external_product_id: String,
    /// Pre-priced tier reference for service bookings; catalog lines resolve
    /// their price dynamically at checkout instead.
    pub external_price_id: Option<String>,

    pub name: String,
    /// Minor currency units, frozen at order creation.
    pub unit_price: i64,
    pub quantity: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
