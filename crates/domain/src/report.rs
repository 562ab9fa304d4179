//! Sales reports: units sold and revenue per book for one store.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use order_store::{Money, PersistedOrder, StoreId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::StockLevels;

/// Errors that can occur when building a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("Invalid report period: {start} is after {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// An inclusive reporting period. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl ReportPeriod {
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, ReportError> {
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(ReportError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// A period covering every order.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Builds a period from calendar dates. The end date is included up to
    /// its last nanosecond.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ReportError> {
        let start = start.map(|date| date.and_time(NaiveTime::MIN).and_utc());
        let end = end.and_then(|date| {
            date.and_hms_nano_opt(23, 59, 59, 999_999_999)
                .map(|end_of_day| end_of_day.and_utc())
        });
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Returns true if the timestamp lies within the period.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at <= end)
    }
}

/// Sales of one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReportRow {
    pub title: String,
    pub author: String,
    pub units_sold: u64,
    pub revenue: Money,
}

/// Sales of a store over a period, one row per book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    pub store_id: StoreId,
    pub period: ReportPeriod,
    /// Sorted by revenue, highest first.
    pub rows: Vec<SalesReportRow>,
    pub total_revenue: Money,
}

impl SalesReport {
    /// Aggregates the lines of `orders` that reference stock entries of
    /// `store_id`.
    ///
    /// Orders outside the period and lines whose stock entry is missing from
    /// `stock` or belongs to another store are skipped. Lines are grouped by
    /// title and author, so copies of one book held in several stock entries
    /// end up in one row.
    pub fn build(
        orders: &[PersistedOrder],
        stock: &StockLevels,
        store_id: StoreId,
        period: ReportPeriod,
    ) -> Self {
        let mut by_book: HashMap<(String, String), SalesReportRow> = HashMap::new();

        for order in orders.iter().filter(|o| period.contains(o.ordered_on)) {
            for item in &order.items {
                let Some(entry) = stock
                    .get(&item.stock_entry_id)
                    .filter(|entry| entry.store_id == store_id)
                else {
                    continue;
                };

                let row = by_book
                    .entry((entry.title.clone(), entry.author.clone()))
                    .or_insert_with(|| SalesReportRow {
                        title: entry.title.clone(),
                        author: entry.author.clone(),
                        units_sold: 0,
                        revenue: Money::zero(),
                    });
                row.units_sold += u64::from(item.quantity);
                row.revenue += entry.price.multiply(item.quantity);
            }
        }

        let mut rows: Vec<SalesReportRow> = by_book.into_values().collect();
        rows.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.author.cmp(&b.author))
        });
        let total_revenue = rows.iter().map(|row| row.revenue).sum();

        tracing::debug!(%store_id, books = rows.len(), "sales report built");

        Self {
            store_id,
            period,
            rows,
            total_revenue,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use order_store::{
        CustomerId, LineItemId, OrderId, OrderStatus, PaymentTypeId, PersistedLineItem,
        StockEntry, StockEntryId,
    };

    use super::*;

    fn entry(store_id: StoreId, title: &str, price_cents: i64) -> StockEntry {
        StockEntry {
            id: StockEntryId::new(),
            store_id,
            title: title.to_string(),
            author: "Chekhov A.P.".to_string(),
            price: Money::from_cents(price_cents),
            quantity: Some(10),
            is_available: true,
        }
    }

    fn order(ordered_on: DateTime<Utc>, lines: &[(&StockEntry, u32)]) -> PersistedOrder {
        PersistedOrder {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            payment_type_id: PaymentTypeId::new(),
            status: OrderStatus::Received,
            ordered_on,
            items: lines
                .iter()
                .map(|(entry, quantity)| PersistedLineItem {
                    id: LineItemId::new(),
                    stock_entry_id: entry.id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    fn levels(entries: &[&StockEntry]) -> StockLevels {
        entries
            .iter()
            .map(|entry| (entry.id, (*entry).clone()))
            .collect()
    }

    #[test]
    fn groups_by_book_and_sorts_by_revenue() {
        let store_id = StoreId::new();
        let cheap = entry(store_id, "The Steppe", 500);
        let dear = entry(store_id, "Ward No. 6", 2000);
        let dear_again = entry(store_id, "Ward No. 6", 2000);
        let now = Utc::now();
        let orders = vec![
            order(now, &[(&cheap, 3), (&dear, 1)]),
            order(now, &[(&dear_again, 2)]),
        ];

        let report = SalesReport::build(
            &orders,
            &levels(&[&cheap, &dear, &dear_again]),
            store_id,
            ReportPeriod::unbounded(),
        );

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].title, "Ward No. 6");
        assert_eq!(report.rows[0].units_sold, 3);
        assert_eq!(report.rows[0].revenue, Money::from_cents(6000));
        assert_eq!(report.rows[1].units_sold, 3);
        assert_eq!(report.total_revenue, Money::from_cents(7500));
    }

    #[test]
    fn skips_other_stores_and_orders_outside_period() {
        let store_id = StoreId::new();
        let ours = entry(store_id, "The Steppe", 500);
        let theirs = entry(StoreId::new(), "The Steppe", 500);
        let now = Utc::now();
        let orders = vec![
            order(now, &[(&ours, 1), (&theirs, 4)]),
            order(now - Duration::days(30), &[(&ours, 7)]),
        ];
        let period = ReportPeriod::new(Some(now - Duration::days(1)), Some(now)).unwrap();

        let report = SalesReport::build(&orders, &levels(&[&ours, &theirs]), store_id, period);

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].units_sold, 1);
        assert_eq!(report.total_revenue, Money::from_cents(500));
    }

    #[test]
    fn empty_period_gives_empty_report() {
        let report = SalesReport::build(
            &[],
            &StockLevels::new(),
            StoreId::new(),
            ReportPeriod::unbounded(),
        );

        assert!(report.is_empty());
        assert!(report.total_revenue.is_zero());
    }

    #[test]
    fn inverted_period_is_rejected() {
        let start = NaiveDate::from_ymd_opt(2026, 10, 16);
        let end = NaiveDate::from_ymd_opt(2026, 10, 1);

        assert!(matches!(
            ReportPeriod::from_dates(start, end),
            Err(ReportError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn date_period_includes_the_whole_end_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 16);
        let period = ReportPeriod::from_dates(day, day).unwrap();

        assert!(period.contains(Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap()));
        assert!(period.contains(Utc.with_ymd_and_hms(2026, 10, 16, 23, 59, 59).unwrap()));
        assert!(!period.contains(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()));
    }

    #[test]
    fn date_period_includes_fractional_seconds_of_the_end_day() {
        let period = ReportPeriod::from_dates(None, NaiveDate::from_ymd_opt(2026, 10, 16)).unwrap();
        let last_second = Utc.with_ymd_and_hms(2026, 10, 16, 23, 59, 59).unwrap();

        assert!(period.contains(last_second + Duration::milliseconds(500)));
        assert!(period.contains(last_second + Duration::nanoseconds(999_999_999)));
        assert!(!period.contains(last_second + Duration::seconds(1)));
    }
}
