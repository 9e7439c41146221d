use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of an order.
///
/// `pending` is set at intake; payment webhooks drive the transitions into
/// `paid`, `failed` and `cancelled`; `shipped` and `delivered` are reached
/// only through the administrative status override. The full transition
/// table lives in [`ALLOWED_TRANSITIONS`] so illegal moves (for example
/// `cancelled -> paid`) are rejected by construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Shipped,
    Delivered,
}

/// Every legal (from, to) status move. Anything absent from this table is
/// rejected; in particular no terminal status ever returns to `pending`.
pub const ALLOWED_TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Paid),
    (OrderStatus::Pending, OrderStatus::Failed),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Paid, OrderStatus::Shipped),
    (OrderStatus::Paid, OrderStatus::Cancelled),
    (OrderStatus::Shipped, OrderStatus::Delivered),
];

impl OrderStatus {
    /// Returns true when moving to `next` is legal. A same-status move is
    /// treated as a permitted no-op so replayed webhook deliveries stay
    /// idempotent.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self == next || ALLOWED_TRANSITIONS.contains(&(self, next))
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Failed | OrderStatus::Cancelled | OrderStatus::Delivered
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user, taken from the authenticated identity at intake.
    pub user_id: Uuid,

    /// Frozen total in minor currency units (fils/cents). Always equals the
    /// sum of `unit_price * quantity` over the order's items at creation
    /// time; never recomputed from catalog prices afterwards.
    pub total_amount: i64,
    pub currency: String,
    pub status: String,

    /// Contact details captured at order time, independent of later profile
    /// edits.
    pub customer_email: String,
    pub customer_name: String,

    /// Structured addresses serialized as JSON text.
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,

    /// Hosted checkout session identifier, recorded once by the checkout
    /// broker. The join key the reconciler uses lives in the session
    /// metadata, not here.
    pub checkout_session_id: Option<String>,
    /// Provider payment-intent identifier, recorded the first time a
    /// succeeded-class event names this order.
    pub payment_intent_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status_enum(&self) -> Result<OrderStatus, String> {
        OrderStatus::from_str(&self.status)
            .map_err(|_| format!("order {} has unknown status '{}'", self.id, self.status))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Paid, true)]
    #[case(OrderStatus::Pending, OrderStatus::Failed, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Paid, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Paid, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Paid, OrderStatus::Failed, false)]
    #[case(OrderStatus::Paid, OrderStatus::Pending, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Paid, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Paid, false)]
    #[case(OrderStatus::Failed, OrderStatus::Pending, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Shipped, false)]
    fn transition_table(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed, "{from} -> {to}");
    }

    #[test]
    fn terminal_statuses() {
        for status in [
            OrderStatus::Failed,
            OrderStatus::Cancelled,
            OrderStatus::Delivered,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn same_status_is_a_permitted_noop() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let text = status.to_string();
            assert_eq!(OrderStatus::from_str(&text).unwrap(), status);
        }
    }
}
