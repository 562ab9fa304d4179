//! Order drafts as edited by staff, and the checks run before planning.

use order_store::{
    CustomerId, LineItemId, OrderStatus, PaymentTypeId, PersistedLineItem, PersistedOrder,
    StockEntryId,
};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// A line item as edited, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLineItem {
    /// Persisted identity, `None` for lines added in this session.
    #[serde(default)]
    pub original_id: Option<LineItemId>,

    /// Selected stock entry, `None` until a book is picked.
    #[serde(default)]
    pub stock_entry_id: Option<StockEntryId>,

    pub quantity: u32,
}

impl DraftLineItem {
    /// A newly added line.
    pub fn new(stock_entry_id: StockEntryId, quantity: u32) -> Self {
        Self {
            original_id: None,
            stock_entry_id: Some(stock_entry_id),
            quantity,
        }
    }

    /// A line that already exists in the persisted order.
    pub fn existing(original_id: LineItemId, stock_entry_id: StockEntryId, quantity: u32) -> Self {
        Self {
            original_id: Some(original_id),
            stock_entry_id: Some(stock_entry_id),
            quantity,
        }
    }

    /// A newly added line with no book picked yet.
    pub fn unselected() -> Self {
        Self {
            original_id: None,
            stock_entry_id: None,
            quantity: 1,
        }
    }
}

impl From<&PersistedLineItem> for DraftLineItem {
    fn from(item: &PersistedLineItem) -> Self {
        Self::existing(item.id, item.stock_entry_id, item.quantity)
    }
}

/// A validated line item: a book is selected and the quantity is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub original_id: Option<LineItemId>,
    pub stock_entry_id: StockEntryId,
    pub quantity: u32,
}

impl LineItem {
    /// A newly added line.
    pub fn new(stock_entry_id: StockEntryId, quantity: u32) -> Self {
        Self {
            original_id: None,
            stock_entry_id,
            quantity,
        }
    }

    /// A line that already exists in the persisted order.
    pub fn existing(original_id: LineItemId, stock_entry_id: StockEntryId, quantity: u32) -> Self {
        Self {
            original_id: Some(original_id),
            stock_entry_id,
            quantity,
        }
    }
}

impl From<&PersistedLineItem> for LineItem {
    fn from(item: &PersistedLineItem) -> Self {
        Self::existing(item.id, item.stock_entry_id, item.quantity)
    }
}

/// The state of the order editor when staff press save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub payment_type_id: PaymentTypeId,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<DraftLineItem>,
}

impl OrderDraft {
    /// Starts an empty draft for a customer, in the `Created` status.
    pub fn new(customer_id: CustomerId, payment_type_id: PaymentTypeId) -> Self {
        Self {
            customer_id: Some(customer_id),
            payment_type_id,
            status: OrderStatus::Created,
            items: Vec::new(),
        }
    }

    /// Opens a persisted order for editing.
    pub fn from_order(order: &PersistedOrder) -> Self {
        Self {
            customer_id: Some(order.customer_id),
            payment_type_id: order.payment_type_id,
            status: order.status,
            items: order.items.iter().map(DraftLineItem::from).collect(),
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Appends a line item.
    pub fn with_item(mut self, item: DraftLineItem) -> Self {
        self.items.push(item);
        self
    }

    /// Total copies across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Runs the fail-fast checks that precede reconciliation.
    ///
    /// Checks, in order: a customer is selected, there is at least one line,
    /// every line has a book, every quantity is at least one. Line numbers in
    /// errors are 1-based.
    pub fn validate(&self) -> Result<ValidatedDraft, OrderError> {
        let customer_id = self.customer_id.ok_or(OrderError::CustomerRequired)?;

        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        if let Some(line) = self.items.iter().position(|i| i.stock_entry_id.is_none()) {
            return Err(OrderError::MissingSelection { line: line + 1 });
        }

        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                if item.quantity == 0 {
                    return Err(OrderError::InvalidQuantity {
                        line: idx + 1,
                        quantity: item.quantity,
                    });
                }
                let stock_entry_id = item
                    .stock_entry_id
                    .ok_or(OrderError::MissingSelection { line: idx + 1 })?;
                Ok(LineItem {
                    original_id: item.original_id,
                    stock_entry_id,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedDraft {
            customer_id,
            payment_type_id: self.payment_type_id,
            status: self.status,
            items,
        })
    }
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub customer_id: CustomerId,
    pub payment_type_id: PaymentTypeId,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use order_store::OrderId;

    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft::new(CustomerId::new(), PaymentTypeId::new())
    }

    #[test]
    fn missing_customer_is_rejected_first() {
        let mut draft = draft();
        draft.customer_id = None;
        assert_eq!(draft.validate(), Err(OrderError::CustomerRequired));
    }

    #[test]
    fn empty_order_is_rejected() {
        assert_eq!(draft().validate(), Err(OrderError::NoItems));
    }

    #[test]
    fn unselected_line_is_rejected() {
        let draft = draft()
            .with_item(DraftLineItem::new(StockEntryId::new(), 1))
            .with_item(DraftLineItem::unselected());

        assert_eq!(
            draft.validate(),
            Err(OrderError::MissingSelection { line: 2 })
        );
    }

    #[test]
    fn missing_selection_wins_over_bad_quantity() {
        let draft = draft()
            .with_item(DraftLineItem::new(StockEntryId::new(), 0))
            .with_item(DraftLineItem::unselected());

        assert_eq!(
            draft.validate(),
            Err(OrderError::MissingSelection { line: 2 })
        );
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let draft = draft().with_item(DraftLineItem::new(StockEntryId::new(), 0));

        assert_eq!(
            draft.validate(),
            Err(OrderError::InvalidQuantity {
                line: 1,
                quantity: 0
            })
        );
    }

    #[test]
    fn valid_draft_resolves_selections() {
        let entry = StockEntryId::new();
        let line = LineItemId::new();
        let draft = draft()
            .with_status(OrderStatus::AwaitingPickup)
            .with_item(DraftLineItem::existing(line, entry, 2))
            .with_item(DraftLineItem::new(entry, 1));

        let validated = draft.validate().unwrap();
        assert_eq!(validated.status, OrderStatus::AwaitingPickup);
        assert_eq!(
            validated.items,
            vec![LineItem::existing(line, entry, 2), LineItem::new(entry, 1)]
        );
    }

    #[test]
    fn from_order_keeps_identities() {
        let item = PersistedLineItem {
            id: LineItemId::new(),
            stock_entry_id: StockEntryId::new(),
            quantity: 3,
        };
        let order = PersistedOrder {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            payment_type_id: PaymentTypeId::new(),
            status: OrderStatus::AwaitingPickup,
            ordered_on: Utc::now(),
            items: vec![item.clone()],
        };

        let draft = OrderDraft::from_order(&order);
        assert_eq!(draft.customer_id, Some(order.customer_id));
        assert_eq!(draft.status, OrderStatus::AwaitingPickup);
        assert_eq!(draft.items, vec![DraftLineItem::from(&item)]);
        assert_eq!(draft.total_quantity(), 3);
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let entry = StockEntryId::new();
        let json = serde_json::json!({
            "customer_id": CustomerId::new(),
            "payment_type_id": PaymentTypeId::new(),
            "items": [{ "stock_entry_id": entry, "quantity": 2 }]
        });

        let draft: OrderDraft = serde_json::from_value(json).unwrap();
        assert_eq!(draft.status, OrderStatus::Created);
        assert_eq!(draft.items, vec![DraftLineItem::new(entry, 2)]);
    }
}
