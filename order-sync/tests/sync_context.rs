//! SyncContext behaviour against in-process mocks
//!
//! All tests run on paused time; sleeping advances the clock once every
//! spawned task is idle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use order_sync::{
    ClientError, ClientResult, ConnectionState, EventKind, MutationKind, OrdersApi, PushChannel,
    PushError, PushEvent, SyncConfig, SyncContext, SyncError,
};
use shared::message::BusMessage;
use shared::{
    Order, OrderDraft, OrderOrigin, OrderPage, OrderPatch, OrderQuery, OrderStatus, Role, Session,
    StatusFilter,
};
use tokio::sync::broadcast;

// ========== Mocks ==========

struct MockApi {
    page: Mutex<Option<OrderPage>>,
    created: Mutex<Option<Order>>,
    accept_updates: AtomicBool,
    delay: Mutex<Duration>,
    queries: Mutex<Vec<OrderQuery>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MockApi {
    fn new(page: OrderPage) -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(Some(page)),
            created: Mutex::new(None),
            accept_updates: AtomicBool::new(true),
            delay: Mutex::new(Duration::ZERO),
            queries: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        })
    }

    fn set_page(&self, page: Option<OrderPage>) {
        *self.page.lock().unwrap() = page;
    }

    fn set_created(&self, order: Option<Order>) {
        *self.created.lock().unwrap() = order;
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OrdersApi for MockApi {
    async fn list_orders(&self, query: &OrderQuery) -> ClientResult<OrderPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        self.wait().await;
        let page = self.page.lock().unwrap().clone();
        match page {
            Some(mut page) => {
                page.page = query.page;
                Ok(page)
            }
            None => Err(ClientError::Internal("backend down".to_string())),
        }
    }

    async fn create_order(&self, _draft: &OrderDraft) -> ClientResult<Order> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let created = self.created.lock().unwrap().clone();
        created.ok_or_else(|| ClientError::Validation("items required".to_string()))
    }

    async fn update_order(&self, id: &str, patch: &OrderPatch) -> ClientResult<Order> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if !self.accept_updates.load(Ordering::SeqCst) {
            return Err(ClientError::Validation("invalid transition".to_string()));
        }
        let mut confirmed = order(id, patch.status.unwrap_or_default());
        confirmed.pickup_time = patch.pickup_time;
        Ok(confirmed)
    }
}

struct MockPush {
    accept: AtomicBool,
    connected: AtomicBool,
    connects: AtomicUsize,
    events: broadcast::Sender<BusMessage>,
}

impl MockPush {
    fn new(accept: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            accept: AtomicBool::new(accept),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            events,
        })
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn emit(&self, kind: EventKind, order: Order) {
        let _ = self
            .events
            .send(PushEvent::new(kind, order).to_bus_message(1));
    }
}

#[async_trait]
impl PushChannel for MockPush {
    async fn connect(&self, _tenant_id: &str) -> Result<(), PushError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.accept.load(Ordering::SeqCst) {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(PushError::Connection("connection refused".to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.events.subscribe()
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

// ========== Helpers ==========

const PER_PAGE: u32 = 10;

fn order(id: &str, status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        id: id.to_string(),
        status,
        items: Vec::new(),
        total: 10.0,
        customer_name: None,
        customer_phone: None,
        customer_email: None,
        notes: None,
        pickup_time: None,
        created_at: now,
        updated_at: now,
        origin: OrderOrigin::Customer,
        created_by: None,
        restaurant_id: Some("42".to_string()),
    }
}

/// A page of `PER_PAGE` pending orders numbered from `first`
fn page_of(first: u32, total_count: u64) -> OrderPage {
    let orders = (first..first + PER_PAGE)
        .map(|n| order(&n.to_string(), OrderStatus::Pending))
        .collect();
    OrderPage::new(orders, total_count, 1, PER_PAGE)
}

fn manager() -> Session {
    Session::new("manager-1", Role::Manager)
}

fn context(api: &Arc<MockApi>, push: &Arc<MockPush>, session: Session) -> SyncContext {
    let config = SyncConfig::new("http://localhost:3000").with_per_page(PER_PAGE);
    SyncContext::new(config, api.clone(), push.clone(), session)
}

fn query(page: u32) -> OrderQuery {
    OrderQuery::page(page, PER_PAGE).with_restaurant("42")
}

/// Let spawned tasks drain without crossing a timer boundary
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ========== Fetching ==========

#[tokio::test(start_paused = true)]
async fn test_fetch_page_replaces_window() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());

    sync.fetch_page(query(1)).await.unwrap();

    let window = sync.window();
    assert_eq!(window.page(), 1);
    assert_eq!(window.len(), 10);
    assert_eq!(window.total_count(), 25);
    assert_eq!(window.total_pages(), 3);
    assert!(!sync.is_loading());
    assert_eq!(sync.last_query(), query(1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_previous_window() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();

    api.set_page(None);
    let err = sync.fetch_page(query(2)).await.unwrap_err();

    assert!(matches!(err, SyncError::Fetch(ClientError::Internal(_))));
    assert_eq!(sync.window().page(), 1);
    assert_eq!(sync.window().len(), 10);
    assert!(!sync.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_loading_only_for_loud_fetches() {
    let api = MockApi::new(page_of(1, 25));
    api.set_delay(Duration::from_secs(1));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));

    let loud = tokio::spawn({
        let sync = sync.clone();
        async move { sync.fetch_page(query(1)).await }
    });
    settle().await;
    assert!(sync.is_loading());
    loud.await.unwrap().unwrap();
    assert!(!sync.is_loading());

    let quiet = tokio::spawn({
        let sync = sync.clone();
        async move { sync.fetch_page_quietly(query(1)).await }
    });
    settle().await;
    assert!(!sync.is_loading());
    quiet.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_page_does_not_overwrite_newer_query() {
    let api = MockApi::new(page_of(1, 25));
    api.set_delay(Duration::from_secs(2));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));

    let first = tokio::spawn({
        let sync = sync.clone();
        async move { sync.fetch_page(query(1)).await }
    });
    settle().await;
    api.set_delay(Duration::ZERO);
    sync.fetch_page(query(3)).await.unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(sync.window().page(), 3);
    assert_eq!(sync.last_query(), query(3));
}

// ========== Supervisor ==========

#[tokio::test(start_paused = true)]
async fn test_start_with_push() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());

    sync.start("tenant-1").await;

    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPush);
    assert_eq!(sync.tenant_id().as_deref(), Some("tenant-1"));
    assert!(!sync.is_polling());
    assert_eq!(sync.active_timers(), 1);
    assert!(sync.router().is_registered(EventKind::OrderCreated, sync.source_id()));
    assert!(sync.router().is_registered(EventKind::OrderUpdated, sync.source_id()));
}

#[tokio::test(start_paused = true)]
async fn test_start_falls_back_to_polling() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    let before = api.list_calls();

    sync.start("tenant-1").await;
    settle().await;

    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPoll);
    assert!(sync.is_polling());
    assert_eq!(sync.polling_params(), Some(query(1)));
    // first poll is immediate
    assert_eq!(api.list_calls(), before + 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.list_calls(), before + 2);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.list_calls(), before + 3);
}

#[tokio::test(start_paused = true)]
async fn test_poll_replaces_window_wholesale() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;
    settle().await;

    api.set_page(Some(page_of(100, 31)));
    tokio::time::sleep(Duration::from_secs(30)).await;

    let window = sync.window();
    assert_eq!(window.orders()[0].id, "100");
    assert_eq!(window.total_count(), 31);
    assert_eq!(window.total_pages(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_fetched_page() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());
    sync.start("tenant-1").await;
    settle().await;

    sync.fetch_page(query(2)).await.unwrap();
    assert_eq!(sync.polling_params(), Some(query(2)));

    tokio::time::sleep(Duration::from_secs(30)).await;
    let last = api.queries.lock().unwrap().last().cloned();
    assert_eq!(last, Some(query(2)));
    assert_eq!(sync.window().page(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_falls_back_and_recovers() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;
    let before = api.list_calls();
    api.set_page(Some(page_of(100, 31)));

    push.set_connected(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPoll);
    assert!(sync.is_polling());
    assert_eq!(api.list_calls(), before + 1);
    assert_eq!(api.queries.lock().unwrap().last().cloned(), Some(query(1)));
    // the first poll replaces list and counters
    let window = sync.window();
    assert_eq!(window.orders()[0].id, "100");
    assert_eq!(window.total_count(), 31);
    assert_eq!(window.total_pages(), 4);

    push.set_connected(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPush);
    assert!(!sync.is_polling());
    assert_eq!(sync.active_timers(), 1);

    let calls = api.list_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_poll_start_switches_to_push_once_available() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;
    settle().await;
    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPoll);

    // still refused: keeps polling
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPoll);
    assert_eq!(push.connects.load(Ordering::SeqCst), 2);

    push.accept.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(sync.connection_state(), ConnectionState::ConnectedPush);
    assert!(!sync.is_polling());
    assert_eq!(sync.active_timers(), 1);

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;
    assert_eq!(sync.window().ids()[0], "500");
    assert_eq!(sync.window().total_count(), 26);
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());

    sync.start("tenant-1").await;
    sync.start("tenant-1").await;

    assert_eq!(sync.active_timers(), 1);
    assert_eq!(sync.router().handler_count(), 2);
    assert_eq!(push.connects.load(Ordering::SeqCst), 2);

    // one handler per event: a push event is merged once
    sync.fetch_page(query(1)).await.unwrap();
    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;
    assert_eq!(sync.window().total_count(), 26);
}

#[tokio::test(start_paused = true)]
async fn test_restart_in_poll_mode_keeps_one_poller() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());

    sync.start("tenant-1").await;
    sync.start("tenant-1").await;
    settle().await;

    // one poller plus one health check
    assert_eq!(sync.active_timers(), 2);
    let calls = api.list_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.list_calls(), calls + 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_everything() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(false);
    let sync = context(&api, &push, manager());
    sync.start("tenant-1").await;
    settle().await;

    sync.stop();
    sync.stop();

    assert_eq!(sync.connection_state(), ConnectionState::Disconnected);
    assert_eq!(sync.active_timers(), 0);
    assert_eq!(sync.router().handler_count(), 0);

    let calls = api.list_calls();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_inside_handler() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    let weak = Arc::downgrade(&sync);
    sync.router()
        .register(EventKind::OrderCreated, "observer", move |_order| {
            if let Some(sync) = weak.upgrade() {
                sync.stop();
            }
        });

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;

    assert_eq!(sync.connection_state(), ConnectionState::Disconnected);
    assert_eq!(sync.active_timers(), 0);
    assert!(!sync.router().is_registered(EventKind::OrderCreated, sync.source_id()));
    assert!(sync.router().is_registered(EventKind::OrderCreated, "observer"));
    // the context's own handler ran before the observer
    assert_eq!(sync.window().orders()[0].id, "500");
}

// ========== Push merging ==========

#[tokio::test(start_paused = true)]
async fn test_created_event_on_first_page() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;
    let calls = api.list_calls();

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;

    let window = sync.window();
    assert_eq!(window.orders()[0].id, "500");
    assert_eq!(window.len(), 10);
    assert_eq!(window.total_count(), 26);
    assert_eq!(window.total_pages(), 3);
    assert_eq!(api.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_created_event_off_first_page_refetches_once() {
    let api = MockApi::new(page_of(11, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(2)).await.unwrap();
    sync.start("tenant-1").await;
    let calls = api.list_calls();

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;

    assert_eq!(api.list_calls(), calls + 1);
    assert_eq!(api.queries.lock().unwrap().last().cloned(), Some(query(2)));
    assert!(!sync.window().contains("500"));
    assert!(!sync.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_updated_event_replaces_or_ignores() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    push.emit(EventKind::OrderUpdated, order("3", OrderStatus::Ready));
    push.emit(EventKind::OrderUpdated, order("999", OrderStatus::Ready));
    settle().await;

    let window = sync.window();
    assert_eq!(window.position("3"), Some(2));
    assert_eq!(window.get("3").unwrap().status, OrderStatus::Ready);
    assert!(!window.contains("999"));
    assert_eq!(window.total_count(), 25);
}

#[tokio::test(start_paused = true)]
async fn test_staff_sees_only_own_created_orders() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, Session::new("staff-7", Role::Staff));
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));

    let mut own = order("501", OrderStatus::Pending);
    own.origin = OrderOrigin::Staff;
    own.created_by = Some("staff-7".to_string());
    push.emit(EventKind::OrderCreated, own);

    let mut colleague = order("502", OrderStatus::Pending);
    colleague.origin = OrderOrigin::Staff;
    colleague.created_by = Some("staff-8".to_string());
    push.emit(EventKind::OrderCreated, colleague);

    // updates are not filtered
    push.emit(EventKind::OrderUpdated, order("2", OrderStatus::Confirmed));
    settle().await;

    let window = sync.window();
    assert!(!window.contains("500"));
    assert!(!window.contains("502"));
    assert_eq!(window.orders()[0].id, "501");
    assert_eq!(window.total_count(), 26);
    assert_eq!(window.get("2").unwrap().status, OrderStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_events_ignored_after_stop() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;
    sync.stop();

    push.emit(EventKind::OrderCreated, order("500", OrderStatus::Pending));
    settle().await;

    assert!(!sync.window().contains("500"));
    assert_eq!(sync.window().total_count(), 25);
}

// ========== Optimistic create ==========

fn draft() -> OrderDraft {
    OrderDraft {
        total: 42.50,
        customer_name: Some("Ana".to_string()),
        restaurant_id: Some("42".to_string()),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_replaces_placeholder_in_place() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();

    let mut confirmed = order("9981", OrderStatus::Pending);
    confirmed.total = 42.50;
    api.set_created(Some(confirmed));
    api.set_delay(Duration::from_secs(1));

    let create = tokio::spawn({
        let sync = sync.clone();
        async move { sync.create_order(draft()).await }
    });
    settle().await;

    let window = sync.window();
    assert_eq!(window.len(), 11);
    let placeholder = &window.orders()[10];
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.total, 42.50);
    assert_eq!(placeholder.created_by.as_deref(), Some("manager-1"));
    assert_eq!(sync.pending_mutations().len(), 1);
    assert_eq!(sync.pending_mutations()[0].kind, MutationKind::Create);

    let created = create.await.unwrap().unwrap();
    assert_eq!(created.id, "9981");

    let window = sync.window();
    assert_eq!(window.position("9981"), Some(10));
    assert_eq!(window.get("9981").unwrap().total, 42.50);
    assert!(window.orders().iter().all(|o| !o.is_placeholder()));
    assert_eq!(window.total_count(), 26);
    assert_eq!(window.total_pages(), 3);
    assert!(sync.pending_mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_response_then_push_counts_once() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    let confirmed = order("9981", OrderStatus::Pending);
    api.set_created(Some(confirmed.clone()));
    sync.create_order(draft()).await.unwrap();
    assert_eq!(sync.window().total_count(), 26);

    push.emit(EventKind::OrderCreated, confirmed);
    settle().await;

    let window = sync.window();
    assert_eq!(window.total_count(), 26);
    assert_eq!(window.total_pages(), 3);
    assert_eq!(window.len(), 11);
    assert_eq!(window.ids().iter().filter(|id| **id == "9981").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_order_event_keeps_placeholder_in_flight() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    api.set_created(Some(order("9981", OrderStatus::Pending)));
    api.set_delay(Duration::from_secs(1));
    let create = tokio::spawn({
        let sync = sync.clone();
        async move { sync.create_order(draft()).await }
    });
    settle().await;

    push.emit(EventKind::OrderCreated, order("777", OrderStatus::Pending));
    settle().await;
    let window = sync.window();
    assert_eq!(window.ids()[0], "777");
    assert!(!window.contains("10"));
    assert!(window.orders().last().unwrap().is_placeholder());

    create.await.unwrap().unwrap();

    let window = sync.window();
    assert_eq!(window.ids()[0], "777");
    assert_eq!(window.position("9981"), Some(10));
    assert!(window.orders().iter().all(|o| !o.is_placeholder()));
    assert_eq!(window.total_count(), 27);
}

#[tokio::test(start_paused = true)]
async fn test_create_after_refetch_lands_on_first_page() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();

    api.set_created(Some(order("9981", OrderStatus::Pending)));
    api.set_delay(Duration::from_secs(1));
    let create = tokio::spawn({
        let sync = sync.clone();
        async move { sync.create_order(draft()).await }
    });
    settle().await;

    // the refetch wipes the placeholder before the create settles
    api.set_delay(Duration::ZERO);
    sync.fetch_page_quietly(query(1)).await.unwrap();
    assert!(sync.window().orders().iter().all(|o| !o.is_placeholder()));

    create.await.unwrap().unwrap();

    let window = sync.window();
    assert_eq!(window.ids()[0], "9981");
    assert_eq!(window.len(), 10);
    assert_eq!(window.total_count(), 26);
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_removes_placeholder() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    let before = sync.window();

    let err = sync.create_order(draft()).await.unwrap_err();

    match err {
        SyncError::Mutation { kind, id, source } => {
            assert_eq!(kind, MutationKind::Create);
            assert!(id.starts_with("temp-"));
            assert!(matches!(source, ClientError::Validation(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(sync.window(), before);
    assert!(sync.pending_mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_push_event_beats_create_response() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();
    sync.start("tenant-1").await;

    let confirmed = order("9981", OrderStatus::Pending);
    api.set_created(Some(confirmed.clone()));
    api.set_delay(Duration::from_secs(1));

    let create = tokio::spawn({
        let sync = sync.clone();
        async move { sync.create_order(draft()).await }
    });
    settle().await;
    push.emit(EventKind::OrderCreated, confirmed);
    settle().await;
    create.await.unwrap().unwrap();

    let window = sync.window();
    assert_eq!(window.ids().iter().filter(|id| **id == "9981").count(), 1);
    assert_eq!(window.orders()[0].id, "9981");
    assert!(window.orders().iter().all(|o| !o.is_placeholder()));
    assert_eq!(window.total_count(), 26);
}

// ========== Optimistic update ==========

#[tokio::test(start_paused = true)]
async fn test_update_applies_locally_then_confirms() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = Arc::new(context(&api, &push, manager()));
    sync.fetch_page(query(1)).await.unwrap();
    api.set_delay(Duration::from_secs(1));

    let update = tokio::spawn({
        let sync = sync.clone();
        async move {
            sync.update_order_status("4", OrderStatus::Preparing, None, None)
                .await
        }
    });
    settle().await;
    assert_eq!(
        sync.window().get("4").unwrap().status,
        OrderStatus::Preparing
    );
    assert_eq!(sync.pending_mutations()[0].kind, MutationKind::Update);

    update.await.unwrap().unwrap();
    assert_eq!(sync.window().position("4"), Some(3));
    assert_eq!(
        sync.window().get("4").unwrap().status,
        OrderStatus::Preparing
    );
    assert!(sync.pending_mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_leaving_filter_removes_order() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();

    let filter = StatusFilter::active();
    sync.update_order_status("4", OrderStatus::Completed, None, Some(&filter))
        .await
        .unwrap();

    let window = sync.window();
    assert!(!window.contains("4"));
    assert_eq!(window.len(), 9);
    assert_eq!(window.total_count(), 24);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_update_rolls_back_and_refetches() {
    let api = MockApi::new(page_of(1, 25));
    api.accept_updates.store(false, Ordering::SeqCst);
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    let calls = api.list_calls();

    let filter = StatusFilter::active();
    let err = sync
        .update_order_status("4", OrderStatus::Cancelled, None, Some(&filter))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Mutation { kind: MutationKind::Update, ref id, .. } if id == "4"
    ));
    let window = sync.window();
    assert_eq!(window.position("4"), Some(3));
    assert_eq!(window.get("4").unwrap().status, OrderStatus::Pending);
    assert_eq!(window.total_count(), 25);
    assert_eq!(api.list_calls(), calls + 1);
    assert!(sync.pending_mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rollback_survives_failed_refetch() {
    let api = MockApi::new(page_of(1, 25));
    api.accept_updates.store(false, Ordering::SeqCst);
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    api.set_page(None);

    let pickup = Utc::now();
    let err = sync
        .update_order_status("2", OrderStatus::Ready, Some(pickup), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Mutation { .. }));
    let restored = sync.window().get("2").cloned().unwrap();
    assert_eq!(restored.status, OrderStatus::Pending);
    assert_eq!(restored.pickup_time, None);
}

#[tokio::test(start_paused = true)]
async fn test_update_outside_window() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    sync.fetch_page(query(1)).await.unwrap();
    let before = sync.window();

    sync.update_order_status("777", OrderStatus::Confirmed, None, None)
        .await
        .unwrap();

    assert_eq!(sync.window(), before);
}

#[tokio::test(start_paused = true)]
async fn test_revision_bumps_on_change() {
    let api = MockApi::new(page_of(1, 25));
    let push = MockPush::new(true);
    let sync = context(&api, &push, manager());
    let revisions = sync.subscribe();
    let start = *revisions.borrow();

    sync.fetch_page(query(1)).await.unwrap();

    assert!(*revisions.borrow() > start);
}
