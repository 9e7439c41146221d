use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::webhook::{PaymentEvent, SessionMetadata},
};

/// What a single webhook delivery did to local state. Everything except a
/// parse/storage failure is acknowledged to the provider, so replays of
/// already-applied events and events for unknown orders both land here as
/// benign outcomes rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An order's status was moved.
    Updated(Uuid, OrderStatus),
    /// The matched order was already consistent with the event, or the
    /// transition table refused the move.
    Unchanged(Uuid),
    /// Sentinel metadata: a standalone single-product session, no order to
    /// touch.
    SkippedSentinel,
    /// No local order matched the event's join key.
    Unmatched,
    /// An event type this service does not consume.
    Ignored,
}

/// The only writer of post-pending order status.
///
/// Deliveries are at-least-once and arbitrarily ordered, so every write is a
/// conditional update keyed on the order id and the expected prior status;
/// replaying an event or receiving a late contradictory one can never move a
/// settled order.
pub struct ReconciliationService {
    db: Arc<DbPool>,
    events: EventSender,
}

impl ReconciliationService {
    pub fn new(db: Arc<DbPool>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Applies one verified provider event.
    #[instrument(skip(self, event))]
    pub async fn apply(&self, event: PaymentEvent) -> Result<ReconcileOutcome, ServiceError> {
        match event {
            PaymentEvent::CheckoutSessionCompleted {
                session_id,
                payment_intent_id,
                metadata,
            } => {
                self.session_completed(&session_id, payment_intent_id.as_deref(), &metadata)
                    .await
            }
            PaymentEvent::CheckoutSessionExpired {
                session_id,
                metadata,
            } => self.session_expired(&session_id, &metadata).await,
            PaymentEvent::PaymentIntentSucceeded { payment_intent_id } => {
                self.intent_outcome(&payment_intent_id, OrderStatus::Paid)
                    .await
            }
            PaymentEvent::PaymentIntentFailed { payment_intent_id } => {
                self.intent_outcome(&payment_intent_id, OrderStatus::Failed)
                    .await
            }
            PaymentEvent::Ignored { event_type } => {
                debug!(%event_type, "ignoring unconsumed event type");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    async fn session_completed(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        metadata: &SessionMetadata,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let Some(order_id) = self.order_ref(metadata, session_id) else {
            return Ok(if metadata.is_sentinel() {
                ReconcileOutcome::SkippedSentinel
            } else {
                ReconcileOutcome::Unmatched
            });
        };

        let Some(order) = OrderEntity::find_by_id(order_id).one(&*self.db).await? else {
            warn!(%order_id, session_id, "completed session names an unknown order");
            return Ok(ReconcileOutcome::Unmatched);
        };

        // Record the intent id the first time a succeeded-class event names
        // this order; conditional on the column still being empty so replays
        // cannot overwrite it.
        if let Some(intent) = payment_intent_id {
            OrderEntity::update_many()
                .col_expr(
                    order::Column::PaymentIntentId,
                    Expr::value(Some(intent.to_string())),
                )
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::PaymentIntentId.is_null())
                .exec(&*self.db)
                .await?;
        }

        self.transition(&order, OrderStatus::Pending, OrderStatus::Paid)
            .await
    }

    async fn session_expired(
        &self,
        session_id: &str,
        metadata: &SessionMetadata,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let Some(order_id) = self.order_ref(metadata, session_id) else {
            return Ok(if metadata.is_sentinel() {
                ReconcileOutcome::SkippedSentinel
            } else {
                ReconcileOutcome::Unmatched
            });
        };

        let Some(order) = OrderEntity::find_by_id(order_id).one(&*self.db).await? else {
            warn!(%order_id, session_id, "expired session names an unknown order");
            return Ok(ReconcileOutcome::Unmatched);
        };

        self.transition(&order, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
    }

    /// Succeeded/failed intent events join on the recorded intent id. An
    /// intent event arriving before the completed-session event simply finds
    /// no order yet; the completed event will settle the status on its own.
    async fn intent_outcome(
        &self,
        payment_intent_id: &str,
        target: OrderStatus,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let Some(order) = OrderEntity::find()
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?
        else {
            info!(payment_intent_id, %target, "no order recorded for payment intent");
            return Ok(ReconcileOutcome::Unmatched);
        };

        self.transition(&order, OrderStatus::Pending, target).await
    }

    /// Conditional status move. Payment events may only settle orders that
    /// are still in `expected_from` (always `pending` today); a late or
    /// contradictory delivery for an already-settled order is a no-op, so
    /// for example an expired-session event can never cancel a paid order.
    /// The write itself is an optimistic match on the expected prior status,
    /// so concurrent handler invocations cannot double-apply.
    async fn transition(
        &self,
        order: &order::Model,
        expected_from: OrderStatus,
        next: OrderStatus,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let current = order
            .status_enum()
            .map_err(ServiceError::InternalError)?;

        if current == next {
            debug!(order_id = %order.id, status = %current, "event replay, already consistent");
            return Ok(ReconcileOutcome::Unchanged(order.id));
        }
        if current != expected_from {
            warn!(
                order_id = %order.id,
                status = %current,
                event_target = %next,
                "order already settled, ignoring late payment event"
            );
            return Ok(ReconcileOutcome::Unchanged(order.id));
        }
        if !current.can_transition_to(next) {
            warn!(
                order_id = %order.id,
                from = %current,
                to = %next,
                "refusing illegal status transition from payment event"
            );
            return Ok(ReconcileOutcome::Unchanged(order.id));
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(next.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(current.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Another delivery won the race; the order is already settled.
            info!(order_id = %order.id, "concurrent update already applied");
            return Ok(ReconcileOutcome::Unchanged(order.id));
        }

        info!(order_id = %order.id, from = %current, to = %next, "order status reconciled");
        self.events
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: current,
                new_status: next,
            })
            .await;
        if next == OrderStatus::Paid {
            self.events.send(Event::OrderPaid { order_id: order.id }).await;
        }

        Ok(ReconcileOutcome::Updated(order.id, next))
    }

    /// Resolves the metadata order reference. Returns `None` for the
    /// sentinel marker, a missing key, or an unparsable id; callers decide
    /// whether that is a skip or an unmatched event.
    fn order_ref(&self, metadata: &SessionMetadata, session_id: &str) -> Option<Uuid> {
        if metadata.is_sentinel() {
            debug!(session_id, "standalone session, no order to reconcile");
            return None;
        }
        match metadata.order_id.as_deref() {
            None => {
                warn!(session_id, "session event carries no order id metadata");
                None
            }
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(session_id, order_ref = raw, "unparsable order id in metadata");
                    None
                }
            },
        }
    }
}
