//! Order list query and paged response types

use crate::models::{Order, OrderStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Default page size for order lists
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Number of pages needed for `total_count` records (0 when `per_page` is 0)
pub fn total_pages_for(total_count: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    total_count.div_ceil(u64::from(per_page)) as u32
}

/// Sort direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Set of statuses an order list is restricted to
///
/// Serialized as a comma-separated list (`pending,confirmed`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter(Vec<OrderStatus>);

impl StatusFilter {
    pub fn new(statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        let mut list: Vec<OrderStatus> = Vec::new();
        for status in statuses {
            if !list.contains(&status) {
                list.push(status);
            }
        }
        Self(list)
    }

    pub fn only(status: OrderStatus) -> Self {
        Self(vec![status])
    }

    /// Statuses still being worked on (not terminal, not failed)
    pub fn active() -> Self {
        Self::new([
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
        ])
    }

    /// An empty filter matches nothing
    pub fn matches(&self, status: OrderStatus) -> bool {
        self.0.contains(&status)
    }

    pub fn statuses(&self) -> &[OrderStatus] {
        &self.0
    }

    pub fn to_query_value(&self) -> String {
        self.0
            .iter()
            .map(OrderStatus::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Serialize for StatusFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_query_value())
    }
}

/// `GET /orders` query parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderQuery {
    /// Page number (1-based)
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<SortDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            status: None,
            sort_by: None,
            sort_direction: None,
            date_from: None,
            date_to: None,
            search: None,
            restaurant_id: None,
        }
    }
}

impl OrderQuery {
    /// Query for one page
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, filter: StatusFilter) -> Self {
        self.status = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_direction = Some(direction);
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_restaurant(mut self, restaurant_id: impl Into<String>) -> Self {
        self.restaurant_id = Some(restaurant_id.into());
        self
    }
}

/// `GET /orders` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_count: u64,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

impl OrderPage {
    pub fn new(orders: Vec<Order>, total_count: u64, page: u32, per_page: u32) -> Self {
        Self {
            orders,
            total_count,
            page,
            per_page,
            total_pages: total_pages_for(total_count, per_page),
        }
    }
}
