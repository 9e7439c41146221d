use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Structured postal address, stored on the order as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    #[validate(length(min = 1))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 1))]
    pub country: String,
}

/// One submitted line item. Prices arrive in minor currency units and are
/// frozen into the order as-is; the total is always recomputed server-side.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineInput {
    /// Internal catalog product, absent for service bookings.
    pub product_id: Option<Uuid>,

    #[validate(length(min = 1, message = "external product id is required"))]
    pub external_product_id: String,

    /// Pre-priced tier reference for service bookings.
    pub external_price_id: Option<String>,

    #[validate(length(min = 1, message = "item name is required"))]
    pub name: String,

    /// Minor currency units.
    #[validate(range(min = 0, message = "unit price must not be negative"))]
    pub unit_price: i64,

    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,

    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one line item"))]
    pub items: Vec<OrderLineInput>,

    #[validate]
    pub shipping_address: Option<Address>,
    #[validate]
    pub billing_address: Option<Address>,

    /// Overrides for the contact captured on the order; the authenticated
    /// identity's email/name are used when absent.
    #[validate(email(message = "customer email must be a valid address"))]
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    /// Minor currency units.
    pub total_amount: i64,
    pub currency: String,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub external_product_id: String,
    pub external_price_id: Option<String>,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub notes: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
}

/// Order intake, per-user queries and the administrative status override.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    events: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Converts a cart snapshot into a durable order.
    ///
    /// The order and all of its items are written in one transaction, so a
    /// failure at any point leaves no trace and an order with zero items can
    /// never persist. The total is recomputed here from the submitted lines;
    /// any client-side total is ignored.
    #[instrument(skip(self, request), fields(user_id = %user.id, line_count = request.items.len()))]
    pub async fn create_order(
        &self,
        user: &AuthUser,
        request: CreateOrderRequest,
        currency: &str,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for item in &request.items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let total_amount = compute_total(&request.items)?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let shipping = encode_address(request.shipping_address.as_ref())?;
        let billing = encode_address(request.billing_address.as_ref())?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            total_amount: Set(total_amount),
            currency: Set(currency.to_string()),
            status: Set(OrderStatus::Pending.to_string()),
            customer_email: Set(request
                .customer_email
                .clone()
                .unwrap_or_else(|| user.email.clone())),
            customer_name: Set(request
                .customer_name
                .clone()
                .unwrap_or_else(|| user.display_name())),
            shipping_address: Set(shipping),
            billing_address: Set(billing),
            notes: Set(request.notes.clone()),
            checkout_session_id: Set(None),
            payment_intent_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let item_models: Vec<order_item::ActiveModel> = request
            .items
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                external_product_id: Set(line.external_product_id.clone()),
                external_price_id: Set(line.external_price_id.clone()),
                name: Set(line.name.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                image_url: Set(line.image_url.clone()),
                created_at: Set(now),
            })
            .collect();

        let txn = self.db.begin().await?;
        order_model.insert(&txn).await?;
        OrderItemEntity::insert_many(item_models).exec(&txn).await?;
        txn.commit().await?;

        info!(%order_id, total_amount, "order created");
        self.events
            .send(Event::OrderCreated {
                order_id,
                user_id: user.id,
                total_amount,
            })
            .await;

        Ok(CreateOrderResponse {
            order_id,
            total_amount,
            currency: currency.to_string(),
            status: OrderStatus::Pending,
        })
    }

    /// Returns the caller's orders, newest first, each with its items.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        // Id as tie-break keeps pages stable when timestamps collide.
        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(&*self.db, per_page.clamp(1, 100));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !order_ids.is_empty() {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .all(&*self.db)
                .await?;
            for item in items {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let responses = orders
            .into_iter()
            .map(|model| {
                let items = items_by_order.remove(&model.id).unwrap_or_default();
                model_to_response(model, items)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((responses, total))
    }

    /// Loads an order the given user owns. Callers outside the owner see a
    /// plain not-found, leaking nothing about other users' orders.
    pub async fn get_owned(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))
    }

    /// Records the hosted checkout session identifier on an order, exactly
    /// once per brokered session.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn record_checkout_session(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::CheckoutSessionId,
                Expr::value(Some(session_id.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "order {order_id} not found"
            )));
        }

        self.events
            .send(Event::CheckoutSessionCreated {
                order_id: Some(order_id),
                session_id: session_id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Administrative status override (`paid -> shipped -> delivered`,
    /// manual cancellation). Illegal moves are rejected by the transition
    /// table; payment-driven transitions belong to the reconciler, not here.
    #[instrument(skip(self, request), fields(order_id = %order_id, new_status = %request.status))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        let current = order
            .status_enum()
            .map_err(ServiceError::InternalError)?;
        let next = request.status;

        if current != next && !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(next.to_string());
        active.updated_at = Set(Utc::now());
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(&*self.db).await?;

        if current != next {
            info!(%order_id, %current, %next, "order status overridden");
            self.events
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: current,
                    new_status: next,
                })
                .await;
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        model_to_response(updated, items)
    }
}

/// Σ(unit_price × quantity) with overflow checking; the client-submitted
/// total, if any, never participates.
fn compute_total(items: &[OrderLineInput]) -> Result<i64, ServiceError> {
    let mut total: i64 = 0;
    for line in items {
        let line_total = line
            .unit_price
            .checked_mul(i64::from(line.quantity))
            .ok_or_else(|| ServiceError::ValidationError("line total overflows".to_string()))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| ServiceError::ValidationError("order total overflows".to_string()))?;
    }
    Ok(total)
}

fn encode_address(address: Option<&Address>) -> Result<Option<String>, ServiceError> {
    address
        .map(|a| {
            serde_json::to_string(a)
                .map_err(|e| ServiceError::InternalError(format!("address encoding failed: {e}")))
        })
        .transpose()
}

fn decode_address(raw: Option<&str>) -> Option<Address> {
    raw.and_then(|text| match serde_json::from_str(text) {
        Ok(address) => Some(address),
        Err(e) => {
            warn!("stored address failed to decode: {}", e);
            None
        }
    })
}

fn model_to_response(
    model: order::Model,
    items: Vec<order_item::Model>,
) -> Result<OrderResponse, ServiceError> {
    let status = model.status_enum().map_err(ServiceError::InternalError)?;
    Ok(OrderResponse {
        id: model.id,
        status,
        total_amount: model.total_amount,
        currency: model.currency,
        customer_email: model.customer_email,
        customer_name: model.customer_name,
        shipping_address: decode_address(model.shipping_address.as_deref()),
        billing_address: decode_address(model.billing_address.as_deref()),
        notes: model.notes,
        checkout_session_id: model.checkout_session_id,
        payment_intent_id: model.payment_intent_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                external_product_id: item.external_product_id,
                external_price_id: item.external_price_id,
                name: item.name,
                unit_price: item.unit_price,
                quantity: item.quantity,
                image_url: item.image_url,
            })
            .collect(),
    })
}
