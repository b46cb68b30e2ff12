//! Pagination window: the materialized page of orders plus its counters

use shared::query::DEFAULT_PER_PAGE;
use shared::{Order, OrderPage, total_pages_for};

/// The currently displayed page
///
/// `total_pages` is recomputed from `total_count` on every mutation, and the
/// list only ever holds orders of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationWindow {
    page: u32,
    per_page: u32,
    total_count: u64,
    total_pages: u32,
    orders: Vec<Order>,
}

impl Default for PaginationWindow {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

impl PaginationWindow {
    /// Empty window for `page`
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page,
            total_count: 0,
            total_pages: 0,
            orders: Vec::new(),
        }
    }

    /// Window holding a fetched page
    pub fn from_page(page: OrderPage) -> Self {
        let mut window = Self::new(page.page, page.per_page);
        window.orders = page.orders;
        window.set_total_count(page.total_count);
        window
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn into_orders(self) -> Vec<Order> {
        self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.orders.iter().map(|o| o.id.as_str()).collect()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.orders.iter().position(|o| o.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Replace the record with the same id in place
    pub fn replace(&mut self, order: Order) -> bool {
        match self.position(&order.id) {
            Some(index) => {
                self.orders[index] = order;
                true
            }
            None => false,
        }
    }

    /// Replace the record `id` in place with `order`, which may carry a new id
    pub fn replace_id(&mut self, id: &str, order: Order) -> bool {
        match self.position(id) {
            Some(index) => {
                self.orders[index] = order;
                true
            }
            None => false,
        }
    }

    /// Prepend, keeping at most `per_page` confirmed records
    ///
    /// Placeholders of creates still in flight are never evicted; they sit
    /// past the page end until the backend answers.
    pub fn insert_front(&mut self, order: Order) {
        self.orders.insert(0, order);
        if self.per_page == 0 {
            return;
        }
        let limit = self.per_page as usize;
        let mut kept = 0;
        self.orders.retain(|o| {
            if o.is_placeholder() {
                return true;
            }
            kept += 1;
            kept <= limit
        });
    }

    pub fn push_back(&mut self, order: Order) {
        self.orders.push(order);
    }

    /// Insert at `index`, clamped to the list length
    pub fn insert_at(&mut self, index: usize, order: Order) {
        let index = index.min(self.orders.len());
        self.orders.insert(index, order);
    }

    /// Remove `id`, returning its former position and the record
    pub fn remove(&mut self, id: &str) -> Option<(usize, Order)> {
        let index = self.position(id)?;
        Some((index, self.orders.remove(index)))
    }

    pub fn set_total_count(&mut self, total_count: u64) {
        self.total_count = total_count;
        self.total_pages = total_pages_for(total_count, self.per_page);
    }

    pub fn increment_total(&mut self) {
        self.set_total_count(self.total_count.saturating_add(1));
    }

    pub fn decrement_total(&mut self) {
        self.set_total_count(self.total_count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderDraft, Role, Session};

    fn order(id: &str) -> Order {
        Order::placeholder(id, &OrderDraft::default(), &Session::new("u-1", Role::Admin))
    }

    fn window_with(n: usize, per_page: u32, total: u64) -> PaginationWindow {
        let orders = (0..n).map(|i| order(&format!("{}", 100 + i))).collect();
        PaginationWindow::from_page(OrderPage::new(orders, total, 1, per_page))
    }

    #[test]
    fn test_from_page_recomputes_total_pages() {
        let mut page = OrderPage::new(vec![], 25, 1, 10);
        page.total_pages = 99;
        let window = PaginationWindow::from_page(page);
        assert_eq!(window.total_pages(), 3);
    }

    #[test]
    fn test_insert_front_truncates_to_page_size() {
        let mut window = window_with(10, 10, 25);
        window.insert_front(order("500"));
        assert_eq!(window.len(), 10);
        assert_eq!(window.ids()[0], "500");
        assert!(!window.contains("109"));
    }

    #[test]
    fn test_insert_front_keeps_placeholders() {
        let mut window = window_with(10, 10, 25);
        window.push_back(order("temp-1700000000000"));
        window.insert_front(order("500"));

        assert_eq!(window.len(), 11);
        assert_eq!(window.ids()[0], "500");
        assert!(!window.contains("109"));
        assert_eq!(window.ids()[10], "temp-1700000000000");
    }

    #[test]
    fn test_counters_stay_consistent() {
        let mut window = window_with(2, 10, 30);
        window.increment_total();
        assert_eq!((window.total_count(), window.total_pages()), (31, 4));
        window.decrement_total();
        window.decrement_total();
        assert_eq!((window.total_count(), window.total_pages()), (29, 3));

        let mut empty = PaginationWindow::new(1, 10);
        empty.decrement_total();
        assert_eq!(empty.total_count(), 0);
    }

    #[test]
    fn test_remove_and_insert_at() {
        let mut window = window_with(3, 10, 3);
        let (index, removed) = window.remove("101").unwrap();
        assert_eq!(index, 1);
        assert_eq!(window.ids(), vec!["100", "102"]);

        window.insert_at(index, removed);
        assert_eq!(window.ids(), vec!["100", "101", "102"]);
        window.insert_at(99, order("103"));
        assert_eq!(window.ids()[3], "103");
        assert!(window.remove("nope").is_none());
    }
}
