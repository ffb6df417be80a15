//! Child-order lifecycle manager.
//!
//! Owns every child order produced by a routed plan and drives it through
//! the order state machine as venue notifications arrive:
//!
//! 1. split: plan -> N `PENDING` children
//! 2. ack: `PENDING -> OPEN`
//! 3. fill: `-> PARTIAL | CLOSED`, deduplicated per order
//! 4. reject: backoff and re-queue, or `FAILED`
//! 5. escalation: aged or dust-remainder makers -> `ESCALATED` IOC
//! 6. cleanup: external trigger -> `CLEANUP`, then cancel -> `CLOSED`
//!
//! All mutable state sits behind one mutex. Audit events are collected
//! under the lock and emitted after it is released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};
use vela_core::{
    emit_guarded, event_codes, ChildOrder, CleanupTrigger, EventFields, EventSink, Fill,
    OrderMode, OrderState, Price, RejectReason, RouteMode, RoutedOrderPlan, Size,
};

use crate::backoff::{self, Backoff};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::requote::RequoteGuard;

/// Result of feeding one notification into the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// State changed; snapshot after the change.
    Applied(ChildOrder),
    /// Same notification already applied.
    Duplicate,
    /// Order is retired or in cleanup; forwarded to audit only.
    Late,
    /// Unknown order or not valid in the current state.
    Ignored,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn order(&self) -> Option<&ChildOrder> {
        match self {
            Self::Applied(order) => Some(order),
            _ => None,
        }
    }
}

struct Slot {
    order: ChildOrder,
    tick: Price,
    lot: Size,
    fill_keys: HashSet<String>,
    reject_keys: HashSet<u64>,
}

#[derive(Default)]
struct OrderTable {
    active: HashMap<String, Slot>,
    /// Retired order id -> correlation id.
    retired: HashMap<String, String>,
    retired_fifo: VecDeque<String>,
    requotes: RequoteGuard,
}

impl OrderTable {
    fn retire(&mut self, order_id: &str, capacity: usize) -> Option<Slot> {
        let slot = self.active.remove(order_id)?;
        if self
            .retired
            .insert(order_id.to_string(), slot.order.correlation_id.clone())
            .is_none()
        {
            self.retired_fifo.push_back(order_id.to_string());
        }
        while self.retired_fifo.len() > capacity {
            if let Some(evicted) = self.retired_fifo.pop_front() {
                self.retired.remove(&evicted);
            }
        }
        Some(slot)
    }
}

type Outbox = Vec<(&'static str, EventFields)>;

pub struct ChildOrderLifecycleManager {
    config: LifecycleConfig,
    table: Mutex<OrderTable>,
    sink: Arc<dyn EventSink>,
}

impl ChildOrderLifecycleManager {
    pub fn new(config: LifecycleConfig, sink: Arc<dyn EventSink>) -> LifecycleResult<Self> {
        config.validate()?;
        let table = OrderTable {
            requotes: RequoteGuard::new(config.requote_window_ms, config.max_requotes_per_min),
            ..Default::default()
        };
        Ok(Self {
            config,
            table: Mutex::new(table),
            sink,
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Count a decision against the symbol's re-quote window.
    ///
    /// Returns `false` when the window is exhausted.
    pub fn try_requote(&self, symbol: &str, now_ms: u64) -> bool {
        self.table.lock().requotes.try_acquire(symbol, now_ms)
    }

    /// Split a routed plan into `PENDING` children.
    ///
    /// Every child lands on the venue `lot` grid and is at least `min_lot`.
    /// A plan too small for one such child is refused with `BelowMinLot`.
    ///
    /// Child ids derive from the plan's group id, so splitting the same plan
    /// twice returns the existing children.
    pub fn split(
        &self,
        plan: &RoutedOrderPlan,
        tick: Price,
        lot: Size,
        now_ms: u64,
    ) -> LifecycleResult<Vec<ChildOrder>> {
        if !plan.quantity.is_positive() {
            return Err(LifecycleError::InvalidPlan(format!(
                "plan {} has non-positive quantity {}",
                plan.group_id, plan.quantity
            )));
        }
        let quantities = split_quantity(
            plan.quantity,
            lot,
            self.config.min_lot,
            self.config.max_children,
        );
        if quantities.is_empty() {
            debug!(
                correlation_id = %plan.correlation_id,
                qty = %plan.quantity,
                lot = %lot,
                min_lot = %self.config.min_lot,
                "plan below minimum child size"
            );
            return Err(LifecycleError::BelowMinLot {
                qty: plan.quantity.to_string(),
                min: min_child(lot, self.config.min_lot).to_string(),
            });
        }
        let (mode, price) = match plan.mode {
            RouteMode::Maker { price } => (OrderMode::Maker, Some(price)),
            RouteMode::Taker => (OrderMode::Taker, None),
        };

        let mut table = self.table.lock();
        let mut children = Vec::with_capacity(quantities.len());
        for (i, qty) in quantities.into_iter().enumerate() {
            let id = format!("{}-{}", plan.group_id, i);
            if let Some(existing) = table.active.get(&id) {
                debug!(order_id = %id, "child already exists, split skipped");
                children.push(existing.order.clone());
                continue;
            }
            if table.retired.contains_key(&id) {
                debug!(order_id = %id, "child already retired, split skipped");
                continue;
            }
            let order = ChildOrder {
                id: id.clone(),
                correlation_id: plan.correlation_id.clone(),
                group_id: plan.group_id.clone(),
                symbol: plan.symbol.clone(),
                side: plan.side,
                target_qty: qty,
                filled_qty: Size::ZERO,
                price,
                state: OrderState::Pending,
                mode,
                ttl_ms: self.config.ttl_child_ms,
                created_ms: now_ms,
                updated_ms: now_ms,
                fills: Vec::new(),
                reject_reason: None,
                retries: 0,
            };
            children.push(order.clone());
            table.active.insert(
                id,
                Slot {
                    order,
                    tick,
                    lot,
                    fill_keys: HashSet::new(),
                    reject_keys: HashSet::new(),
                },
            );
        }

        debug!(
            correlation_id = %plan.correlation_id,
            symbol = %plan.symbol,
            children = children.len(),
            "plan split into child orders"
        );
        Ok(children)
    }

    /// Venue acknowledgment. Only `PENDING` children move to `OPEN`.
    pub fn on_ack(&self, order_id: &str, ts_ms: u64, latency_ms: f64) -> Transition {
        let mut outbox = Outbox::new();
        let result = {
            let mut table = self.table.lock();
            match table.active.get_mut(order_id) {
                None => {
                    trace!(order_id, "ack for unknown order ignored");
                    Transition::Ignored
                }
                Some(slot) if slot.order.state != OrderState::Pending => {
                    trace!(order_id, state = %slot.order.state, "ack ignored");
                    Transition::Ignored
                }
                Some(slot) => {
                    set_state(&mut slot.order, OrderState::Open, ts_ms);
                    let mut fields = base_fields(&slot.order);
                    fields.insert("ts_ms".into(), json!(ts_ms));
                    fields.insert("latency_ms".into(), finite_or_null(latency_ms));
                    outbox.push((event_codes::ORDER_ACK, fields));
                    Transition::Applied(slot.order.clone())
                }
            }
        };
        self.flush(outbox);
        result
    }

    /// Execution report.
    ///
    /// Duplicates (same trade id, or same ts/qty/price without one) are
    /// dropped. Fills for retired or cleaning-up orders are audited as late
    /// and never touch state.
    pub fn on_fill(&self, order_id: &str, fill: Fill) -> Transition {
        let mut outbox = Outbox::new();
        let result = {
            let mut guard = self.table.lock();
            let table = &mut *guard;
            match table.active.get_mut(order_id) {
                None => {
                    let correlation = table.retired.get(order_id).cloned();
                    warn!(
                        order_id,
                        known = correlation.is_some(),
                        "fill for inactive order, forwarded as late"
                    );
                    outbox.push((
                        event_codes::FILL_EVENT,
                        late_fill_fields(order_id, correlation.map(Value::from), &fill),
                    ));
                    Transition::Late
                }
                Some(slot) if !slot.order.state.accepts_fills()
                    || slot.order.state == OrderState::Cleanup =>
                {
                    warn!(
                        order_id,
                        state = %slot.order.state,
                        "fill during cleanup, forwarded as late"
                    );
                    outbox.push((
                        event_codes::FILL_EVENT,
                        late_fill_fields(
                            order_id,
                            Some(Value::from(slot.order.correlation_id.clone())),
                            &fill,
                        ),
                    ));
                    Transition::Late
                }
                Some(slot) => {
                    let key = fill.dedup_key();
                    if !fill.qty.is_positive() {
                        debug!(order_id, qty = %fill.qty, "non-positive fill ignored");
                        Transition::Ignored
                    } else if !slot.fill_keys.insert(key.clone()) {
                        debug!(order_id, %key, "Skipping duplicate fill");
                        Transition::Duplicate
                    } else {
                        let order = &mut slot.order;
                        order.filled_qty = order.filled_qty + fill.qty;
                        order.fills.push(fill.clone());
                        let next = if order.is_fully_filled() {
                            OrderState::Closed
                        } else if order.state == OrderState::Escalated {
                            OrderState::Escalated
                        } else {
                            OrderState::Partial
                        };
                        set_state(order, next, fill.ts_ms);

                        let mut fields = base_fields(order);
                        fields.insert("trade_id".into(), json!(fill.trade_id));
                        fields.insert("ts_ms".into(), json!(fill.ts_ms));
                        fields.insert("qty".into(), json!(fill.qty.to_string()));
                        fields.insert("price".into(), json!(fill.price.to_string()));
                        fields.insert("filled_qty".into(), json!(order.filled_qty.to_string()));
                        fields.insert("late".into(), json!(false));
                        outbox.push((event_codes::FILL_EVENT, fields));

                        let due = escalate_if_due(&mut slot.order, &self.config, fill.ts_ms);
                        if let Some(fields) = due {
                            outbox.push((event_codes::ORDER_ESCALATE, fields));
                        }
                        let snapshot = slot.order.clone();
                        if snapshot.state.is_terminal() {
                            info!(
                                order_id,
                                correlation_id = %snapshot.correlation_id,
                                filled = %snapshot.filled_qty,
                                "child order filled"
                            );
                            table.retire(order_id, self.config.late_id_capacity);
                        }
                        Transition::Applied(snapshot)
                    }
                }
            }
        };
        self.flush(outbox);
        result
    }

    /// Cancel confirmation. Closes any non-terminal child.
    pub fn on_cancel(&self, order_id: &str, ts_ms: u64) -> Transition {
        let mut table = self.table.lock();
        let Some(slot) = table.active.get_mut(order_id) else {
            trace!(order_id, "cancel for inactive order ignored");
            return Transition::Ignored;
        };
        if !set_state(&mut slot.order, OrderState::Closed, ts_ms) {
            return Transition::Ignored;
        }
        let snapshot = slot.order.clone();
        table.retire(order_id, self.config.late_id_capacity);
        debug!(
            order_id,
            correlation_id = %snapshot.correlation_id,
            filled = %snapshot.filled_qty,
            "child order cancelled"
        );
        Transition::Applied(snapshot)
    }

    /// Venue reject for a `PENDING` child.
    ///
    /// Applies the reason's backoff and re-queues, or fails the child once
    /// the retry budget is spent. Deduplicated on `(order_id, ts_ms)`.
    pub fn on_reject(&self, order_id: &str, reason: RejectReason, ts_ms: u64) -> Transition {
        let mut outbox = Outbox::new();
        let result = {
            let mut table = self.table.lock();
            match table.active.get_mut(order_id) {
                None => {
                    trace!(order_id, %reason, "reject for inactive order ignored");
                    Transition::Ignored
                }
                Some(slot) if slot.order.state != OrderState::Pending => {
                    debug!(order_id, state = %slot.order.state, %reason, "reject ignored");
                    Transition::Ignored
                }
                Some(slot) if slot.reject_keys.contains(&ts_ms) => Transition::Duplicate,
                Some(slot) => {
                    slot.reject_keys.insert(ts_ms);
                    let (tick, lot) = (slot.tick, slot.lot);
                    let order = &mut slot.order;
                    set_state(order, OrderState::Rejected, ts_ms);
                    order.reject_reason = Some(reason);
                    order.retries += 1;

                    let step = if order.retries > self.config.max_retries {
                        Backoff::Exhausted
                    } else {
                        backoff::apply(reason, order, tick, lot, self.config.min_lot)
                    };
                    let terminal = match step {
                        Backoff::Retry { target_qty, price } => {
                            order.target_qty = target_qty;
                            order.price = price;
                            set_state(order, OrderState::Pending, ts_ms);
                            debug!(
                                order_id,
                                %reason,
                                retries = order.retries,
                                target_qty = %target_qty,
                                "child re-queued after reject"
                            );
                            false
                        }
                        Backoff::Exhausted => {
                            set_state(order, OrderState::Failed, ts_ms);
                            warn!(
                                order_id,
                                %reason,
                                retries = order.retries,
                                "child failed, retries exhausted"
                            );
                            true
                        }
                    };

                    let mut fields = base_fields(order);
                    fields.insert("reason".into(), json!(reason.as_str()));
                    fields.insert("retries".into(), json!(order.retries));
                    fields.insert("final".into(), json!(terminal));
                    fields.insert("target_qty".into(), json!(order.target_qty.to_string()));
                    fields.insert("price".into(), json!(order.price.map(|p| p.to_string())));
                    outbox.push((event_codes::ORDER_REJECT, fields));

                    let snapshot = order.clone();
                    if terminal {
                        table.retire(order_id, self.config.late_id_capacity);
                    }
                    Transition::Applied(snapshot)
                }
            }
        };
        self.flush(outbox);
        result
    }

    /// Escalate due children of one decision.
    pub fn check_escalations(&self, correlation_id: &str, now_ms: u64) -> Vec<ChildOrder> {
        self.escalate_where(now_ms, |order| order.correlation_id == correlation_id)
    }

    /// Escalate every aged or dust-remainder child across all decisions.
    pub fn sweep_expired(&self, now_ms: u64) -> Vec<ChildOrder> {
        self.escalate_where(now_ms, |_| true)
    }

    /// Move every active child of `correlation_id` to `CLEANUP`.
    pub fn cleanup(
        &self,
        correlation_id: &str,
        trigger: CleanupTrigger,
        now_ms: u64,
    ) -> Vec<ChildOrder> {
        let mut outbox = Outbox::new();
        let mut cleaned = Vec::new();
        {
            let mut table = self.table.lock();
            for slot in table.active.values_mut() {
                let order = &mut slot.order;
                if order.correlation_id != correlation_id || !order.state.is_active() {
                    continue;
                }
                set_state(order, OrderState::Cleanup, now_ms);
                let mut fields = base_fields(order);
                fields.insert("trigger".into(), json!(trigger.to_string()));
                fields.insert("ts_ms".into(), json!(now_ms));
                outbox.push((event_codes::CLEANUP, fields));
                cleaned.push(order.clone());
            }
        }
        if !cleaned.is_empty() {
            info!(
                correlation_id,
                %trigger,
                count = cleaned.len(),
                "cleanup requested"
            );
        }
        cleaned.sort_by(|a, b| a.id.cmp(&b.id));
        self.flush(outbox);
        cleaned
    }

    /// Snapshot of an active child.
    pub fn order(&self, order_id: &str) -> Option<ChildOrder> {
        self.table
            .lock()
            .active
            .get(order_id)
            .map(|slot| slot.order.clone())
    }

    /// Active children of one decision, ordered by id.
    pub fn children_of(&self, correlation_id: &str) -> Vec<ChildOrder> {
        let mut children: Vec<ChildOrder> = self
            .table
            .lock()
            .active
            .values()
            .filter(|slot| slot.order.correlation_id == correlation_id)
            .map(|slot| slot.order.clone())
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    pub fn active_count(&self) -> usize {
        self.table.lock().active.len()
    }

    /// Whether `order_id` was retired and is still remembered.
    pub fn is_retired(&self, order_id: &str) -> bool {
        self.table.lock().retired.contains_key(order_id)
    }

    fn escalate_where<F>(&self, now_ms: u64, filter: F) -> Vec<ChildOrder>
    where
        F: Fn(&ChildOrder) -> bool,
    {
        let mut outbox = Outbox::new();
        let mut escalated = Vec::new();
        {
            let mut table = self.table.lock();
            for slot in table.active.values_mut() {
                if !filter(&slot.order) {
                    continue;
                }
                if let Some(fields) = escalate_if_due(&mut slot.order, &self.config, now_ms) {
                    outbox.push((event_codes::ORDER_ESCALATE, fields));
                    escalated.push(slot.order.clone());
                }
            }
        }
        escalated.sort_by(|a, b| a.id.cmp(&b.id));
        self.flush(outbox);
        escalated
    }

    fn flush(&self, outbox: Outbox) {
        for (code, fields) in outbox {
            emit_guarded(self.sink.as_ref(), code, &fields);
        }
    }
}

/// Smallest child the venue and config both accept: `min_lot` rounded up
/// onto the `lot` grid.
fn min_child(lot: Size, min_lot: Size) -> Size {
    let grid = if lot.is_positive() { lot } else { min_lot };
    min_lot.max(grid).ceil_to_lot(grid)
}

/// Equal split into at most `max_children` pieces on the `lot` grid, each
/// at least `min_child`; the last absorbs the remainder. Empty when the
/// total cannot fund one child.
fn split_quantity(total: Size, lot: Size, min_lot: Size, max_children: u32) -> Vec<Size> {
    let grid = if lot.is_positive() { lot } else { min_lot };
    let floor_qty = min_child(lot, min_lot);
    let usable = total.floor_to_lot(grid);
    if !floor_qty.is_positive() || usable < floor_qty {
        return Vec::new();
    }

    let fits = (usable.inner() / floor_qty.inner()).floor();
    let n = Decimal::from(max_children.max(1)).min(fits);
    let count = n.to_usize().unwrap_or(1).max(1);
    if count == 1 {
        return vec![usable];
    }
    let piece = Size::new(usable.inner() / n).floor_to_lot(grid);
    let mut out = vec![piece; count - 1];
    out.push(usable - piece * Decimal::from(count - 1));
    out
}

/// Apply a transition if the state machine allows it.
fn set_state(order: &mut ChildOrder, next: OrderState, ts_ms: u64) -> bool {
    if !order.state.can_transition(next) {
        debug!(
            order_id = %order.id,
            from = %order.state,
            to = %next,
            "transition refused"
        );
        return false;
    }
    order.state = next;
    order.updated_ms = order.updated_ms.max(ts_ms);
    true
}

/// Escalate an `OPEN`/`PARTIAL` maker that aged past its TTL or whose
/// remainder fell below `min_lot` after a partial fill.
fn escalate_if_due(
    order: &mut ChildOrder,
    config: &LifecycleConfig,
    now_ms: u64,
) -> Option<EventFields> {
    if !matches!(order.state, OrderState::Open | OrderState::Partial) {
        return None;
    }
    let age_ms = order.age_ms(now_ms);
    let remaining = order.remaining();
    let trigger = if age_ms > order.ttl_ms {
        "ttl"
    } else if order.state == OrderState::Partial
        && remaining.is_positive()
        && remaining < config.min_lot
    {
        "residual"
    } else {
        return None;
    };

    set_state(order, OrderState::Escalated, now_ms);
    order.mode = OrderMode::Ioc;
    order.price = None;
    debug!(
        order_id = %order.id,
        trigger,
        age_ms,
        remaining = %remaining,
        "child escalated to IOC"
    );

    let mut fields = base_fields(order);
    fields.insert("trigger".into(), json!(trigger));
    fields.insert("age_ms".into(), json!(age_ms));
    fields.insert("remaining".into(), json!(remaining.to_string()));
    Some(fields)
}

fn base_fields(order: &ChildOrder) -> EventFields {
    let mut fields = EventFields::new();
    fields.insert("correlation_id".into(), json!(order.correlation_id));
    fields.insert("order_id".into(), json!(order.id));
    fields.insert("symbol".into(), json!(order.symbol));
    fields.insert("state".into(), json!(order.state.to_string()));
    fields.insert("mode".into(), json!(order.mode.to_string()));
    fields
}

fn late_fill_fields(order_id: &str, correlation_id: Option<Value>, fill: &Fill) -> EventFields {
    let mut fields = EventFields::new();
    fields.insert(
        "correlation_id".into(),
        correlation_id.unwrap_or(Value::Null),
    );
    fields.insert("order_id".into(), json!(order_id));
    fields.insert("trade_id".into(), json!(fill.trade_id));
    fields.insert("ts_ms".into(), json!(fill.ts_ms));
    fields.insert("qty".into(), json!(fill.qty.to_string()));
    fields.insert("price".into(), json!(fill.price.to_string()));
    fields.insert("late".into(), json!(true));
    fields
}

fn finite_or_null(value: f64) -> Value {
    if value.is_finite() {
        json!(value)
    } else {
        Value::Null
    }
}
