//! Many threads contend for a small pool; the loan bound must hold throughout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use mq_http_core::{Connection, ConnectionPool, Connector, HttpRequest, HttpResponse, MqError, Result};

/// Tracks how many connections are in use at once.
#[derive(Default)]
struct Gauge {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
}

struct GaugeConnector(Arc<Gauge>);

struct GaugeConnection(Arc<Gauge>);

impl Connection for GaugeConnection {
    fn execute(&mut self, _request: &HttpRequest) -> Result<HttpResponse> {
        let now = self.0.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        self.0.in_use.fetch_sub(1, Ordering::SeqCst);
        Ok(HttpResponse::default())
    }
}

impl Connector for GaugeConnector {
    type Connection = GaugeConnection;

    fn connect(&self) -> Result<GaugeConnection> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(GaugeConnection(Arc::clone(&self.0)))
    }
}

fn request() -> HttpRequest {
    HttpRequest {
        method: mq_http_core::HttpMethod::Get,
        url: "http://unused/topics/t/messages".to_string(),
        headers: Vec::new(),
        body: None,
    }
}

#[test]
fn outstanding_never_exceeds_max_size() {
    const MAX: usize = 3;
    const THREADS: usize = 16;
    const ROUNDS: usize = 25;

    let gauge = Arc::new(Gauge::default());
    let pool = Arc::new(ConnectionPool::new(
        GaugeConnector(Arc::clone(&gauge)),
        MAX,
        Duration::from_secs(10),
        Duration::from_secs(60),
    ));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    let mut connection = pool.acquire().unwrap();
                    assert!(pool.status().outstanding <= MAX);
                    connection.execute(&request()).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(gauge.peak.load(Ordering::SeqCst) <= MAX);
    assert!(gauge.opened.load(Ordering::SeqCst) <= MAX);
    let status = pool.status();
    assert_eq!(status.outstanding, 0);
    assert!(status.idle <= MAX);
}

#[test]
fn broken_connections_are_replaced_under_contention() {
    const MAX: usize = 2;

    let gauge = Arc::new(Gauge::default());
    let pool = Arc::new(ConnectionPool::new(
        GaugeConnector(Arc::clone(&gauge)),
        MAX,
        Duration::from_secs(10),
        Duration::from_secs(60),
    ));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for round in 0..10 {
                    let mut connection = pool.acquire().unwrap();
                    if (i + round) % 3 == 0 {
                        connection.mark_broken();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let status = pool.status();
    assert_eq!(status.outstanding, 0);
    assert!(status.idle <= MAX);
    // Every broken handle forced a fresh connect.
    assert!(gauge.opened.load(Ordering::SeqCst) > MAX);
}

#[test]
fn waiters_time_out_when_nothing_is_released() {
    let gauge = Arc::new(Gauge::default());
    let pool = Arc::new(ConnectionPool::new(
        GaugeConnector(gauge),
        1,
        Duration::from_millis(50),
        Duration::from_secs(60),
    ));
    let _held = pool.acquire().unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.acquire().err())
        })
        .collect();
    for waiter in waiters {
        assert!(matches!(waiter.join().unwrap(), Some(MqError::PoolExhausted { .. })));
    }
}
